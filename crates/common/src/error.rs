//! Error types shared across Phosphor crates.

use std::path::PathBuf;

/// Top-level error type for Phosphor operations.
///
/// Export failures collapse into exactly one of these; there is no
/// partial-success reporting. `Cancelled` is the only variant that a
/// frontend should present as a neutral notice rather than a failure.
#[derive(Debug, thiserror::Error)]
pub enum PhosphorError {
    #[error("Export cancelled: {message}")]
    Cancelled { message: String },

    #[error("{stage} subprocess error: {message}")]
    Subprocess { stage: Stage, message: String },

    #[error("Worker failed on frame {frame_index}: {message}")]
    WorkerEncode { frame_index: u64, message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Archive error: {message}")]
    Archive { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Pipeline stage that a subprocess error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decode,
    Encode,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Decode => write!(f, "Decode"),
            Stage::Encode => write!(f, "Encode"),
        }
    }
}

/// Result type alias using PhosphorError.
pub type PhosphorResult<T> = Result<T, PhosphorError>;

impl PhosphorError {
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled {
            message: msg.into(),
        }
    }

    pub fn subprocess(stage: Stage, msg: impl Into<String>) -> Self {
        Self::Subprocess {
            stage,
            message: msg.into(),
        }
    }

    pub fn worker(frame_index: u64, msg: impl Into<String>) -> Self {
        Self::WorkerEncode {
            frame_index,
            message: msg.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive {
            message: msg.into(),
        }
    }

    /// Whether this error is a user/environment cancellation rather
    /// than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_distinguished_from_failures() {
        assert!(PhosphorError::cancelled("view lost focus").is_cancellation());
        assert!(!PhosphorError::subprocess(Stage::Encode, "exit 1").is_cancellation());
        assert!(!PhosphorError::worker(7, "oom").is_cancellation());
    }

    #[test]
    fn test_worker_error_carries_frame_index() {
        let err = PhosphorError::worker(42, "encode failed");
        assert!(err.to_string().contains("42"));
    }
}
