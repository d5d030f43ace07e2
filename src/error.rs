// Error types - Failure taxonomy shared by the scheduler, partitioner and dispatcher

use thiserror::Error;

/// Errors surfaced by the playback engine.
///
/// None of these are retried internally: they all signal a caller or data
/// contract violation rather than a transient condition.
#[derive(Debug, Error)]
pub enum PerformerError {
    /// A required argument or callback was missing at call time
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Operation invoked in a state that forbids it (e.g. pausing a stopped sequence)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Moments with mismatched positions were combined
    #[error("Precomposition error: {0}")]
    Precomposition(String),

    /// Partitioning could not locate an expected boundary moment
    #[error("Lookup failed: {0}")]
    Lookup(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("MIDI device error: {0}")]
    Device(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),

    #[error("RON parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),
}

pub type PerformerResult<T> = Result<T, PerformerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PerformerError::InvalidState("attempt to pause a stopped sequence".into());
        assert_eq!(
            err.to_string(),
            "Invalid state: attempt to pause a stopped sequence"
        );

        let err = PerformerError::Lookup("no boundary".into());
        assert!(err.to_string().starts_with("Lookup failed"));
    }

    #[test]
    fn test_io_error_conversion() {
        fn open_missing() -> PerformerResult<()> {
            std::fs::File::open("/definitely/not/here.ron")?;
            Ok(())
        }

        assert!(matches!(open_missing(), Err(PerformerError::Io(_))));
    }
}
