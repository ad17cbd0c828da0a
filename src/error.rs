use std::path::PathBuf;

/// Terminal faults of a stability session.
///
/// End of stream and user cancellation are not errors; they surface as
/// `SessionOutcome::Exhausted` and `SessionOutcome::Cancelled`.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    /// The camera could not be opened, or the first frame could not be read.
    #[error("frame source unavailable: {0:#}")]
    SourceUnavailable(anyhow::Error),
    /// The detector failed on a frame; the detection stream is no longer trusted.
    #[error("detector failed on frame {frame}: {cause:#}")]
    Detector { frame: u64, cause: anyhow::Error },
    /// Writing the captured crop failed.
    #[error("failed to persist capture to {}: {cause:#}", path.display())]
    PersistenceFailure { path: PathBuf, cause: anyhow::Error },
    /// The triggering box does not overlap the frame.
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),
}
