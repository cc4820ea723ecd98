use crate::config::Config;
use crate::decision::core::{DecisionState, Reason, Status};
use crate::quality_gate::QualityScore;
use crate::temporal_aggregator::SmoothedEstimate;
use chrono::{DateTime, Utc};

/// What the most recent cycle contributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationKind {
    None,
    Admitted,
    QualityRejected,
    NoCandidate,
    ClassifierFailure,
}

/// Immutable view of the stabilized verdict handed to readers.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub sequence: u64,
    pub status: Status,
    pub reason: Reason,
    pub locked_label: Option<String>,
    pub locked_confidence: f64,

    pub top_label: Option<String>,
    pub top_confidence: f64,
    pub margin: f64,
    pub entropy: f64,
    pub vote_ratio: f64,
    pub stability: f64,

    pub observation: ObservationKind,
    pub quality: Option<QualityScore>,
    pub updated_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn initial() -> Self {
        Self {
            sequence: 0,
            status: Status::Scanning,
            reason: Reason::Startup,
            locked_label: None,
            locked_confidence: 0.0,
            top_label: None,
            top_confidence: 0.0,
            margin: 0.0,
            entropy: 0.0,
            vote_ratio: 0.0,
            stability: 0.0,
            observation: ObservationKind::None,
            quality: None,
            updated_at: Utc::now(),
        }
    }

    pub fn build(
        config: &Config,
        sequence: u64,
        state: &DecisionState,
        estimate: &SmoothedEstimate,
        observation: ObservationKind,
        quality: Option<QualityScore>,
    ) -> Self {
        let name = |label: usize| config.label_name(label).map(str::to_string);
        Self {
            sequence,
            status: state.status.clone(),
            reason: state.reason,
            locked_label: state.locked_label().and_then(name),
            locked_confidence: state.locked_confidence,
            top_label: estimate.top_label.and_then(name),
            top_confidence: estimate.top_confidence,
            margin: estimate.margin,
            entropy: estimate.entropy,
            vote_ratio: estimate.vote_ratio,
            stability: estimate.stability,
            observation,
            quality,
            updated_at: Utc::now(),
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.status, Status::Locked { .. })
    }
}
