use thiserror::Error;

/// Errors surfaced by cascade loading and detection.
///
/// Every variant is reported once and aborts the operation; nothing fails
/// half-way through a scan.
#[derive(Debug, Error)]
pub enum DetectError {
    /// Empty, zero-sized or inconsistent pixel buffer.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Cascade definition could not be turned into a valid model.
    #[error("malformed cascade: {0}")]
    MalformedCascade(String),

    /// Search or merge parameters out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Cascade file could not be read.
    #[error("failed to read cascade: {0}")]
    Io(#[from] std::io::Error),

    /// The caller's cancel token fired between scale levels.
    #[error("search cancelled")]
    Cancelled,
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DetectError>;

impl DetectError {
    /// Prefix a cascade error with its location in the definition
    pub(crate) fn context(self, at: &str) -> Self {
        match self {
            DetectError::MalformedCascade(msg) => {
                DetectError::MalformedCascade(format!("{}: {}", at, msg))
            }
            other => other,
        }
    }
}

pub(crate) fn malformed(msg: impl Into<String>) -> DetectError {
    DetectError::MalformedCascade(msg.into())
}
