//! Crate-level error type.
//!
//! Parse-level tolerance means parsing never produces an error at all, and
//! merge-level invariant violations (orphaned comments) are logged drops, not
//! failures. What remains are collaborator failures and cycle-guard
//! rejections, all of which are terminal for the current cycle: no partial
//! write is ever committed, and no automatic retry is performed.

use thiserror::Error;

/// Errors surfaced by the orchestrator and its collaborators.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The generation collaborator failed or returned unusable content.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The generation call did not complete within the configured deadline.
    #[error("generation timed out after {0:?}")]
    GenerationTimeout(std::time::Duration),

    /// A cycle was requested while another is in flight.
    #[error("merge cycle already in flight")]
    Busy,

    /// The transcript-write collaborator rejected the mutation.
    #[error("transcript write rejected for message {index}")]
    WriteRejected { index: usize },

    /// The transcript holds no message to carry the managed block.
    #[error("transcript has no floor message")]
    MissingFloor,

    /// A cycle was pre-empted by a forced trigger before its write step.
    #[error("cycle pre-empted by a forced trigger")]
    Preempted,

    /// Settings file could not be read or written.
    #[error("settings io: {0}")]
    SettingsIo(#[from] std::io::Error),

    /// Settings file is not valid TOML.
    #[error("settings parse: {0}")]
    SettingsParse(#[from] toml::de::Error),

    /// Settings could not be rendered as TOML.
    #[error("settings encode: {0}")]
    SettingsEncode(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages_are_stable() {
        assert_eq!(FeedError::Busy.to_string(), "merge cycle already in flight");
        assert_eq!(
            FeedError::WriteRejected { index: 0 }.to_string(),
            "transcript write rejected for message 0"
        );
        assert_eq!(
            FeedError::Generation("boom".to_string()).to_string(),
            "generation failed: boom"
        );
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: FeedError = io.into();
        assert!(matches!(err, FeedError::SettingsIo(_)));
    }
}
