// Allow unused_assignments at module level because thiserror's generated code
// for struct variants triggers false positive warnings - the fields ARE used
// in the Display impl but rustc's lint pass doesn't see this.
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(code(wtenv::config::error))]
    Config(String),

    #[error("Invalid data: {0}")]
    #[diagnostic(
        code(wtenv::validation),
        help("Run `wtenv validate` to check your wtenv.yaml")
    )]
    Validation(String),

    #[error("Not found: {0}")]
    #[diagnostic(
        code(wtenv::not_found),
        help("List allocated slots with `wtenv list`")
    )]
    NotFound(String),

    #[error("Conflict: {0}")]
    #[diagnostic(code(wtenv::conflict))]
    Conflict(String),

    #[error("Cannot patch '{var}': {reason}")]
    #[diagnostic(
        code(wtenv::patch::failed),
        help("Check the `service` of this patch against the services listed in wtenv.yaml")
    )]
    Patch { var: String, reason: String },

    #[error("`{command}` failed: {message}")]
    #[diagnostic(code(wtenv::command::failed))]
    Command { command: String, message: String },

    #[error("Timeout waiting for `{0}`")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn patch(var: &str, reason: impl Into<String>) -> Self {
        Error::Patch {
            var: var.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::Config(msg) if msg.contains("Could not find") => {
                Some("Create one with: wtenv init".to_string())
            }
            Error::Config(_) | Error::Validation(_) => {
                Some("Validate your config with: wtenv validate".to_string())
            }
            Error::NotFound(_) => Some("List allocated slots with: wtenv list".to_string()),
            Error::Conflict(msg) if msg.contains("lock") => Some(
                "Another wtenv command is working on this repository; retry when it finishes."
                    .to_string(),
            ),
            Error::Conflict(msg) if msg.contains("No free slot") => Some(
                "Remove an unused worktree with `wtenv rm <slot>` or run `wtenv prune`.".to_string(),
            ),
            Error::Conflict(_) => Some(
                "Omit --slot to take the lowest free slot, or check `wtenv list`.".to_string(),
            ),
            Error::Patch { .. } => Some(
                "Every `port` and `url` patch must name a service from the `services` list."
                    .to_string(),
            ),
            Error::Command { command, .. } if command.starts_with("psql") => Some(
                "Check that `psql` is installed and that databaseUrl points at a reachable server."
                    .to_string(),
            ),
            Error::Command { command, .. } if command.starts_with("git") => {
                Some("Run the git command by hand to see the full output.".to_string())
            }
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}
