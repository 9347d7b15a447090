//! Error type shared by the engine, history, I/O and CLI layers.

use thiserror::Error;

/// Every failure the redaction core can report.
///
/// The history-navigation variants are boundary signals rather than faults;
/// they exist so callers can tell "nothing happened" apart from a successful
/// restore of an empty mask.
#[derive(Error, Debug)]
pub enum RedactError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Surface unavailable: {0}")]
    ContextUnavailable(String),

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error("History index {index} out of range (len {len})")]
    OutOfRange { index: usize, len: usize },

    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("A load is already in progress")]
    LoadInProgress,

    #[error("Decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RedactError {
    /// True for the undo/redo/goto boundary signals.
    pub fn is_history_boundary(&self) -> bool {
        matches!(
            self,
            RedactError::NothingToUndo | RedactError::NothingToRedo | RedactError::OutOfRange { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RedactError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_variants_are_flagged() {
        assert!(RedactError::NothingToUndo.is_history_boundary());
        assert!(RedactError::OutOfRange { index: 4, len: 2 }.is_history_boundary());
        assert!(!RedactError::InvalidInput("x".into()).is_history_boundary());
    }

    #[test]
    fn messages_carry_context() {
        let e = RedactError::OutOfRange { index: 7, len: 3 };
        assert_eq!(e.to_string(), "History index 7 out of range (len 3)");
    }
}
