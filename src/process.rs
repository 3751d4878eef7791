//! Running external commands.
//!
//! Failures are reported as [`Error::Command`] carrying the command line and
//! the most useful line of stderr. Nothing here retries.

use crate::error::{Error, Result};
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Run `program args..` and capture its output, failing on timeout only.
pub async fn run_capture(program: &str, args: &[&str], cwd: Option<&Path>) -> Result<Output> {
    run_capture_with_env(program, args, &[], cwd).await
}

/// [`run_capture`] with extra environment variables for the child.
///
/// Secrets belong in `env`, never in `args`: arguments are shown in logs and
/// error messages (and to anyone running `ps`).
pub async fn run_capture_with_env(
    program: &str,
    args: &[&str],
    env: &[(&str, &str)],
    cwd: Option<&Path>,
) -> Result<Output> {
    let shown = command_line(program, args);
    let mut command = Command::new(program);
    command
        .args(args)
        .envs(env.iter().copied())
        .stdin(Stdio::null())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    tracing::debug!("Running `{}`", shown);
    tokio::time::timeout(COMMAND_TIMEOUT, command.output())
        .await
        .map_err(|_| Error::Timeout(shown.clone()))?
        .map_err(|e| Error::Command {
            command: shown,
            message: e.to_string(),
        })
}

/// Run `program args..`, returning trimmed stdout when it exits successfully.
pub async fn run_checked(program: &str, args: &[&str], cwd: Option<&Path>) -> Result<String> {
    run_checked_with_env(program, args, &[], cwd).await
}

/// [`run_checked`] with extra environment variables for the child.
pub async fn run_checked_with_env(
    program: &str,
    args: &[&str],
    env: &[(&str, &str)],
    cwd: Option<&Path>,
) -> Result<String> {
    let output = run_capture_with_env(program, args, env, cwd).await?;
    if !output.status.success() {
        return Err(Error::Command {
            command: command_line(program, args),
            message: redact_url_credentials(&best_error_line(&String::from_utf8_lossy(
                &output.stderr,
            ))),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run a shell command with inherited stdio. No timeout: these are
/// long-running installs the user watches.
pub async fn run_shell(command_text: &str, cwd: &Path) -> Result<()> {
    tracing::debug!("Running `{}` in {}", command_text, cwd.display());
    let status = Command::new("sh")
        .arg("-c")
        .arg(command_text)
        .current_dir(cwd)
        .status()
        .await
        .map_err(|e| Error::Command {
            command: command_text.to_string(),
            message: e.to_string(),
        })?;

    if !status.success() {
        return Err(Error::Command {
            command: command_text.to_string(),
            message: match status.code() {
                Some(code) => format!("exited with code {}", code),
                None => "terminated by signal".to_string(),
            },
        });
    }
    Ok(())
}

fn command_line(program: &str, args: &[&str]) -> String {
    redact_url_credentials(
        &std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" "),
    )
}

/// Replace the password of every `scheme://user:password@` in `text` with `***`.
pub fn redact_url_credentials(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(scheme_end) = rest.find("://") {
        let authority_start = scheme_end + 3;
        out.push_str(&rest[..authority_start]);
        rest = &rest[authority_start..];

        let authority_len = rest
            .find(|c: char| c == '/' || c == '?' || c == '#' || c.is_whitespace())
            .unwrap_or(rest.len());
        let authority = &rest[..authority_len];
        match authority.rfind('@') {
            Some(at) => {
                let userinfo = &authority[..at];
                match userinfo.split_once(':') {
                    Some((user, _password)) => {
                        out.push_str(user);
                        out.push_str(":***");
                    }
                    None => out.push_str(userinfo),
                }
                out.push_str(&authority[at..]);
            }
            None => out.push_str(authority),
        }
        rest = &rest[authority_len..];
    }

    out.push_str(rest);
    out
}

/// Prefer lines mentioning an error; fall back to the first non-empty line.
pub(crate) fn best_error_line(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    lines
        .iter()
        .find(|line| {
            let lower = line.to_ascii_lowercase();
            lower.starts_with("fatal:") || lower.starts_with("error:") || lower.contains("error")
        })
        .or_else(|| lines.first())
        .map(|line| line.to_string())
        .unwrap_or_else(|| "no error output".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_error_line_prefers_fatal() {
        let stderr = "Preparing worktree\nfatal: 'x' is already checked out\n";
        assert_eq!(best_error_line(stderr), "fatal: 'x' is already checked out");
    }

    #[test]
    fn test_best_error_line_falls_back_to_first_line() {
        assert_eq!(best_error_line("\n  something odd\nmore\n"), "something odd");
        assert_eq!(best_error_line(""), "no error output");
    }

    #[test]
    fn test_redact_url_credentials() {
        assert_eq!(
            redact_url_credentials("psql postgresql://u:s3cret@h:5432/app?schema=public -c x"),
            "psql postgresql://u:***@h:5432/app?schema=public -c x"
        );
        assert_eq!(
            redact_url_credentials("a redis://h:6379/0 and postgres://user@h/db"),
            "a redis://h:6379/0 and postgres://user@h/db"
        );
        assert_eq!(redact_url_credentials("no urls here"), "no urls here");
    }

    #[tokio::test]
    async fn test_failure_message_hides_passwords() {
        let err = run_checked(
            "sh",
            &[
                "-c",
                "echo \"could not connect to postgres://u:s3cret@h/db\" >&2; exit 1",
                "postgres://u:s3cret@h/db",
            ],
            None,
        )
        .await
        .unwrap_err();

        let text = err.to_string();
        assert!(!text.contains("s3cret"), "password leaked: {}", text);
        assert!(text.contains("postgres://u:***@h/db"));
    }

    #[tokio::test]
    async fn test_env_reaches_child() {
        let out = run_checked_with_env("sh", &["-c", "printf %s \"$WTENV_TEST\""], &[("WTENV_TEST", "hi")], None)
            .await
            .unwrap();
        assert_eq!(out, "hi");
    }

    #[tokio::test]
    async fn test_run_checked_reports_failure() {
        let err = run_checked("sh", &["-c", "echo boom >&2; exit 3"], None)
            .await
            .unwrap_err();
        match err {
            Error::Command { command, message } => {
                assert!(command.starts_with("sh -c"));
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_shell_exit_code() {
        let dir = std::env::temp_dir();
        let err = run_shell("exit 7", &dir).await.unwrap_err();
        assert!(err.to_string().contains("exited with code 7"));
        run_shell("true", &dir).await.unwrap();
    }
}
