use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JunctionError {
    #[error("Target does not exist: {0}")]
    TargetNotFound(PathBuf),

    #[error("Target is not a directory: {0}")]
    TargetNotADirectory(PathBuf),

    #[error("Link path already exists: {0}")]
    LinkAlreadyExists(PathBuf),

    #[error("Not a junction: {0}")]
    NotAJunction(PathBuf),

    #[error("Corrupt reparse buffer: {0}")]
    CorruptReparseBuffer(String),

    #[error("Target path too long for the reparse path buffer")]
    PathTooLong,

    #[error("Path is not valid Unicode text: {0}")]
    InvalidPath(PathBuf),

    #[error("System call failed during {operation}: OS error {code}")]
    OsFailure { operation: &'static str, code: u32 },

    #[error("Platform not supported: {0}")]
    PlatformNotSupported(String),
}

impl JunctionError {
    /// Wrap an I/O error, capturing its OS code before anything can
    /// overwrite it.
    pub fn os_failure(operation: &'static str, err: &std::io::Error) -> Self {
        JunctionError::OsFailure {
            operation,
            code: err.raw_os_error().unwrap_or(0) as u32,
        }
    }

    /// The underlying OS error code, if this error carries one.
    pub fn os_code(&self) -> Option<u32> {
        match self {
            JunctionError::OsFailure { code, .. } => Some(*code),
            _ => None,
        }
    }
}
