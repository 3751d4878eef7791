use serde::Serialize;

/// Abstraction over user-facing output.
///
/// Command modules use this trait instead of `println!`/`eprintln!`. With
/// `--json` a command emits exactly one [`UserOutput::json`] document.
pub trait UserOutput: Send + Sync {
    /// Informational status message (e.g., "Slot 3 allocated")
    fn status(&self, message: &str);

    /// Success message (e.g., "Worktree ready")
    fn success(&self, message: &str);

    /// Warning message (e.g., "No database connection configured")
    fn warning(&self, message: &str);

    /// A blank line separator.
    fn blank(&self);

    /// Machine-readable document on stdout.
    fn json(&self, value: &serde_json::Value);
}

/// Standard CLI output - writes to stdout/stderr with ANSI colors.
pub struct CliOutput;

impl UserOutput for CliOutput {
    fn status(&self, message: &str) {
        println!("{}", message);
    }

    fn success(&self, message: &str) {
        println!("\x1b[32m{}\x1b[0m", message);
    }

    fn warning(&self, message: &str) {
        eprintln!("\x1b[33m{}\x1b[0m", message);
    }

    fn blank(&self) {
        println!();
    }

    fn json(&self, value: &serde_json::Value) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to render JSON: {}", e),
        }
    }
}

/// Serialize `value` for [`UserOutput::json`].
pub fn to_json<T: Serialize>(value: &T) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}
