use std::fmt::Display;
use std::path::PathBuf;

use crate::core::domain::{CompilationError, Language};

/// Host-level failures. Compile diagnostics are data and never travel through this type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("Invalid argument `{arg}`: {msg}")]
    InvalidArgument { arg: String, msg: String },

    #[error("No compiler registered for language {0}")]
    NotRegistered(Language),

    #[error("A compiler is already registered for language {0}")]
    AlreadyRegistered(Language),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("I/O error on {}: {msg}", .path.display())]
    Io { path: PathBuf, msg: String },

    #[error("Invalid reference `{name}`: {msg}")]
    InvalidReference { name: String, msg: String },

    #[error("{msg}")]
    Failed { msg: String },

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Internal error: {msg}")]
    Internal { msg: String },
}

impl CompileError {
    pub fn invalid_argument(arg: &str, msg: &str) -> Self {
        CompileError::InvalidArgument {
            arg: arg.to_string(),
            msg: msg.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        CompileError::Io {
            path: path.into(),
            msg: err.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CompileError::Cancelled)
    }
}

pub const HOST_ERROR_ID: &str = "HOST";

/// Turns a fault caught on the host side into a single error diagnostic.
pub fn to_error<E: Display + ?Sized>(fault: &E) -> CompilationError {
    CompilationError::error(HOST_ERROR_ID, fault.to_string())
}

/// Checks the mandatory compile inputs shared by every backend.
pub fn validate_inputs(name: &str, sources: &[String]) -> Result<(), CompileError> {
    if name.trim().is_empty() {
        return Err(CompileError::invalid_argument("name", "must not be empty"));
    }
    if name.contains(['/', '\\', '\0']) || name == "." || name == ".." {
        return Err(CompileError::invalid_argument(
            "name",
            "must be a plain file name without path separators",
        ));
    }
    if sources.is_empty() {
        return Err(CompileError::invalid_argument(
            "sources",
            "at least one source is required",
        ));
    }
    Ok(())
}
