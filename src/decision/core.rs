use crate::config::{Config, FailureCounting};
use crate::temporal_aggregator::SmoothedEstimate;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Scanning,
    Unstable,
    Locked { label: usize },
    Unknown,
}

impl Status {
    pub fn locked_label(&self) -> Option<usize> {
        match self {
            Status::Locked { label } => Some(*label),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Status::Scanning => "SCANNING",
            Status::Unstable => "UNSTABLE",
            Status::Locked { .. } => "LOCKED",
            Status::Unknown => "UNKNOWN",
        }
    }
}

/// Why the engine is in its current status. Lets the presentation layer tell
/// "nothing usable in view" apart from "the object changed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Startup,
    Locked,
    Relocked,
    QualityLoss,
    ConfidenceLoss,
    LowConfidence,
    HighEntropy,
    Recovered,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionState {
    pub status: Status,
    pub reason: Reason,
    pub entered_at: Instant,
    pub locked_confidence: f64,

    pub candidate: Option<usize>,
    pub candidate_streak: u32,
    /// Consecutive cycles where the candidate met both lock thresholds.
    pub qualifying_streak: u32,
    pub quality_failures: u32,
    /// Consecutive admitted cycles below `unknown_conf` without a lockable candidate.
    pub low_confidence_streak: u32,
    /// Consecutive cycles where the locked label sat below `unknown_conf`.
    pub locked_low_streak: u32,
}

#[derive(Debug, Clone)]
pub enum Event {
    QualityFailed(Instant),
    /// Quality passed but the classifier produced nothing usable.
    NoVote(Instant),
    Estimate(Instant, SmoothedEstimate),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ResetAggregator,
    StateChanged {
        from: Status,
        to: Status,
        reason: Reason,
    },
}

impl DecisionState {
    pub fn new(now: Instant) -> Self {
        Self {
            status: Status::Scanning,
            reason: Reason::Startup,
            entered_at: now,
            locked_confidence: 0.0,
            candidate: None,
            candidate_streak: 0,
            qualifying_streak: 0,
            quality_failures: 0,
            low_confidence_streak: 0,
            locked_low_streak: 0,
        }
    }

    pub fn locked_label(&self) -> Option<usize> {
        self.status.locked_label()
    }

    fn reset_counters(&mut self) {
        self.candidate = None;
        self.candidate_streak = 0;
        self.qualifying_streak = 0;
        self.quality_failures = 0;
        self.low_confidence_streak = 0;
        self.locked_low_streak = 0;
    }

    fn break_candidate(&mut self) {
        self.candidate = None;
        self.candidate_streak = 0;
        self.qualifying_streak = 0;
    }

    fn enter(&mut self, status: Status, reason: Reason, now: Instant, effects: &mut Vec<Effect>) {
        if !matches!(status, Status::Locked { .. }) {
            self.locked_confidence = 0.0;
        }
        effects.push(Effect::StateChanged {
            from: self.status.clone(),
            to: status.clone(),
            reason,
        });
        self.status = status;
        self.reason = reason;
        self.entered_at = now;
    }
}

pub fn init(now: Instant) -> DecisionState {
    DecisionState::new(now)
}

pub fn transition(config: &Config, state: DecisionState, event: Event) -> (DecisionState, Vec<Effect>) {
    let mut state = state;
    let mut effects = vec![];

    match event {
        Event::QualityFailed(now) => on_quality_failure(config, &mut state, now, &mut effects),
        Event::NoVote(now) => {
            state.break_candidate();
            if config.null_vote_counts_as_quality_failure {
                on_quality_failure(config, &mut state, now, &mut effects);
            } else {
                state.quality_failures = 0;
                recover_if_unstable(&mut state, Reason::Recovered, now, &mut effects);
            }
        }
        Event::Estimate(now, estimate) => on_estimate(config, &mut state, now, &estimate, &mut effects),
    }

    (state, effects)
}

fn on_quality_failure(
    config: &Config,
    state: &mut DecisionState,
    now: Instant,
    effects: &mut Vec<Effect>,
) {
    state.quality_failures += 1;

    if config.failure_counting == FailureCounting::Shared {
        state.break_candidate();
        if let Status::Locked { .. } = state.status {
            state.locked_low_streak += 1;
            if state.locked_low_streak >= config.persistence_frames {
                let quality_failures = state.quality_failures;
                unlock(state, Reason::QualityLoss, now, effects);
                effects.push(Effect::ResetAggregator);
                state.quality_failures = quality_failures;
            }
        }
    }

    if matches!(state.status, Status::Locked { .. })
        && state.quality_failures >= config.quality_fail_persist
    {
        state.enter(Status::Unstable, Reason::QualityLoss, now, effects);
        state.reset_counters();
        effects.push(Effect::ResetAggregator);
    }
}

fn on_estimate(
    config: &Config,
    state: &mut DecisionState,
    now: Instant,
    estimate: &SmoothedEstimate,
    effects: &mut Vec<Effect>,
) {
    state.quality_failures = 0;
    recover_if_unstable(state, Reason::Recovered, now, effects);

    let top = estimate.top_label;
    if top.is_some() && top == state.candidate {
        state.candidate_streak += 1;
    } else {
        state.candidate = top;
        state.candidate_streak = u32::from(top.is_some());
        state.qualifying_streak = 0;
    }

    if top.is_none() {
        // Empty window: scanning with no candidate.
        return;
    }

    let qualifies = estimate.top_confidence >= config.lock_min_conf
        && estimate.margin >= config.lock_min_margin;
    if qualifies {
        state.qualifying_streak += 1;
    } else {
        state.qualifying_streak = 0;
    }
    let lockable = qualifies && state.candidate_streak >= config.persistence_frames;
    let relockable = qualifies && state.qualifying_streak >= config.persistence_frames;
    let high_entropy = config
        .unknown_max_entropy
        .is_some_and(|max| estimate.mean_entropy > max);

    if state.status == Status::Unknown && qualifies {
        state.enter(Status::Scanning, Reason::Recovered, now, effects);
        state.low_confidence_streak = 0;
    }

    match state.status.clone() {
        Status::Scanning | Status::Unstable => {
            if let (true, Some(label)) = (lockable, state.candidate) {
                lock(state, label, Reason::Locked, estimate, now, effects);
                return;
            }
            let weak = estimate.top_confidence < config.unknown_conf || high_entropy;
            if qualifies || !weak {
                state.low_confidence_streak = 0;
            } else {
                state.low_confidence_streak += 1;
            }
            if state.status == Status::Scanning
                && state.low_confidence_streak as usize >= config.window_size
            {
                let reason = if high_entropy {
                    Reason::HighEntropy
                } else {
                    Reason::LowConfidence
                };
                state.enter(Status::Unknown, reason, now, effects);
                state.low_confidence_streak = 0;
            }
        }
        Status::Locked { label } => {
            if let (true, Some(candidate)) = (relockable, state.candidate) {
                if candidate != label {
                    lock(state, candidate, Reason::Relocked, estimate, now, effects);
                    return;
                }
            }

            let locked_confidence = estimate.confidence_of(label);
            state.locked_confidence = locked_confidence;
            if locked_confidence < config.unknown_conf {
                state.locked_low_streak += 1;
            } else {
                state.locked_low_streak = 0;
            }

            let replacement_accruing = qualifies && state.candidate.is_some_and(|c| c != label);
            if state.locked_low_streak >= config.persistence_frames && !replacement_accruing {
                unlock(state, Reason::ConfidenceLoss, now, effects);
                recover_if_unstable(state, Reason::ConfidenceLoss, now, effects);
            }
        }
        Status::Unknown => {}
    }
}

fn lock(
    state: &mut DecisionState,
    label: usize,
    reason: Reason,
    estimate: &SmoothedEstimate,
    now: Instant,
    effects: &mut Vec<Effect>,
) {
    state.enter(Status::Locked { label }, reason, now, effects);
    state.locked_confidence = estimate.confidence_of(label);
    state.reset_counters();
}

fn unlock(state: &mut DecisionState, reason: Reason, now: Instant, effects: &mut Vec<Effect>) {
    state.enter(Status::Unstable, reason, now, effects);
    state.reset_counters();
}

/// UNSTABLE resumes scanning on the first usable cycle, from a clean window.
fn recover_if_unstable(
    state: &mut DecisionState,
    reason: Reason,
    now: Instant,
    effects: &mut Vec<Effect>,
) {
    if state.status == Status::Unstable {
        state.enter(Status::Scanning, reason, now, effects);
        state.reset_counters();
        effects.push(Effect::ResetAggregator);
    }
}
