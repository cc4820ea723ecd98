use thiserror::Error;

#[derive(Debug, Error)]
pub enum StabilizerError {
    /// The frame source cannot produce frames. Fatal to the pipeline.
    #[error("frame source unavailable: {0}")]
    SourceUnavailable(String),

    /// A single classifier call failed, timed out or returned a malformed vector.
    #[error("classifier failure: {0}")]
    ClassifierFailure(String),

    #[error("stale result: sequence {sequence} is not newer than {last_accepted}")]
    StaleResult { sequence: u64, last_accepted: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("pipeline already running")]
    AlreadyRunning,
}

impl StabilizerError {
    pub fn source_unavailable(reason: impl Into<String>) -> Self {
        Self::SourceUnavailable(reason.into())
    }

    pub fn classifier_failure(reason: impl Into<String>) -> Self {
        Self::ClassifierFailure(reason.into())
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SourceUnavailable(_))
    }
}
