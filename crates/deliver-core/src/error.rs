//! Domain-specific errors for resolve and deploy operations

use std::path::PathBuf;

use deliver_schema::{RequirementError, VersionError};
use thiserror::Error;

/// Errors that escape the solver and installer.
///
/// Resolution problems are not errors: they are recorded on manifest entries
/// as a status. Only configuration problems, unreadable definitions and
/// failing external commands surface here.
#[derive(Error, Debug)]
pub enum DeliverError {
    /// Settings are missing or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A package definition could not be read.
    #[error("Invalid package definition {}: {message}", .path.display())]
    Definition {
        /// Definition file or package directory.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// A build, release or helper command exited unsuccessfully.
    #[error("{command} failed with exit code {code:?}{}", format_tail(.tail))]
    ExternalProcess {
        /// The command line that was run.
        command: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Log file holding the full output, if output was captured.
        log: Option<PathBuf>,
        /// The last lines of captured output.
        tail: String,
    },

    /// A request string could not be parsed or is not allowed here.
    #[error("Invalid request: {0}")]
    Request(String),

    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

fn format_tail(tail: &str) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!("\n{tail}")
    }
}

impl DeliverError {
    /// Create a definition error for `path`.
    pub fn definition(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Definition {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<anyhow::Error> for DeliverError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}

impl From<RequirementError> for DeliverError {
    fn from(err: RequirementError) -> Self {
        Self::Request(err.to_string())
    }
}

impl From<VersionError> for DeliverError {
    fn from(err: VersionError) -> Self {
        Self::Request(err.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T, E = DeliverError> = std::result::Result<T, E>;
