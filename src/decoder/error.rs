//! Error types for savegame decoding.

use std::io;
use thiserror::Error;

/// Errors from decoding a single save file.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("file is locked by another process ({0})")]
    Locked(#[source] io::Error),

    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("invalid savegame: {0}")]
    Format(String),
}

impl DecodeError {
    /// Classify an I/O error, splitting out busy/locked conditions.
    pub fn from_io(err: io::Error) -> Self {
        if is_lock_error(&err) {
            DecodeError::Locked(err)
        } else {
            DecodeError::Io(err)
        }
    }

    /// Whether a retry might succeed once the game releases the file.
    pub fn is_locked(&self) -> bool {
        matches!(self, DecodeError::Locked(_))
    }
}

/// Check whether an I/O error means "file in use".
pub fn is_lock_error(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::ResourceBusy | io::ErrorKind::WouldBlock
    ) {
        return true;
    }

    match err.raw_os_error() {
        // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
        #[cfg(windows)]
        Some(32) | Some(33) => true,
        // EBUSY
        #[cfg(unix)]
        Some(16) => true,
        _ => false,
    }
}
