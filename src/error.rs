//! Error types for rawcopy
//!
//! Fatal errors terminate the run; per-block operation failures are not
//! errors at this level — they travel back through completion results and
//! are logged by the scheduler.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for rawcopy operations
#[derive(Error, Debug)]
pub enum RawCopyError {
    /// A backend could not be opened against its target
    #[error("failed to open '{path}': {source}")]
    Open {
        /// Target that failed to open
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Destination provisioning failed
    #[error("destination setup failed at '{path}': {source}")]
    Setup {
        /// Destination being provisioned
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Destination device is smaller than the source image
    #[error("insufficient space on '{path}': {available} bytes available, {required} bytes required")]
    InsufficientSpace {
        /// Destination device
        path: PathBuf,
        /// Bytes the transfer needs
        required: u64,
        /// Bytes the device offers
        available: u64,
    },

    /// User declined the overwrite prompt
    #[error("aborted by user")]
    Aborted,

    /// Block buffer allocation failed
    #[error("buffer allocation of {bytes} bytes failed")]
    Allocation {
        /// Requested allocation size
        bytes: usize,
    },

    /// A backend refused to queue an operation
    #[error("backend queue rejected block {index} at offset {offset}")]
    QueueFull {
        /// Correlation id of the rejected block
        index: u64,
        /// Byte offset of the rejected block
        offset: u64,
    },

    /// Flushing queued operations to the kernel failed
    #[error("failed to submit queued operations: {0}")]
    Submit(#[source] std::io::Error),

    /// The readiness wait itself failed
    #[error("readiness wait failed: {0}")]
    Wait(#[source] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl RawCopyError {
    /// Create an open error with target context
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }

    /// Create a setup error with destination context
    pub fn setup(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Setup {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Open { path, .. }
            | Self::Setup { path, .. }
            | Self::InsufficientSpace { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Result type alias for rawcopy operations
pub type Result<T> = std::result::Result<T, RawCopyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such image");
        let err = RawCopyError::open("/test/image", io_err);
        assert_eq!(err.path().unwrap(), &PathBuf::from("/test/image"));
    }

    #[test]
    fn test_display_includes_context() {
        let err = RawCopyError::InsufficientSpace {
            path: PathBuf::from("/dev/sdz"),
            required: 4096,
            available: 512,
        };
        let rendered = err.to_string();
        assert!(rendered.contains("/dev/sdz"));
        assert!(rendered.contains("4096"));
    }

    #[test]
    fn test_queue_full_has_no_path() {
        let err = RawCopyError::QueueFull {
            index: 3,
            offset: 12288,
        };
        assert!(err.path().is_none());
    }
}
