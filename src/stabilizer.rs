use crate::config::Config;
use crate::decision::core::{init, transition, DecisionState, Effect, Event};
use crate::error::StabilizerError;
use crate::image_classifier::interface::ClassifierOutput;
use crate::image_classifier::probabilities::normalize;
use crate::library::logger::interface::Logger;
use crate::quality_gate::QualityScore;
use crate::snapshot::{ObservationKind, Snapshot};
use crate::temporal_aggregator::{SmoothedEstimate, TemporalAggregator};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub enum Observation {
    QualityRejected(QualityScore),
    /// No region and the pipeline is configured not to guess one.
    NoCandidate,
    ClassifierFailed {
        quality: QualityScore,
        message: String,
    },
    Classified {
        quality: QualityScore,
        output: ClassifierOutput,
        latency: Duration,
    },
}

#[derive(Debug, Clone)]
pub struct Cycle {
    pub sequence: u64,
    pub captured_at: Instant,
    pub observation: Observation,
}

/// Sole owner of the aggregator and the decision state. Cycles must arrive
/// with strictly increasing sequence numbers; anything else is discarded.
pub struct Stabilizer {
    config: Config,
    logger: Arc<dyn Logger + Send + Sync>,
    aggregator: TemporalAggregator,
    state: DecisionState,
    estimate: SmoothedEstimate,
    last_accepted: Option<u64>,
    stale_results: u64,
}

impl Stabilizer {
    pub fn new(config: Config, logger: Arc<dyn Logger + Send + Sync>) -> Self {
        let aggregator =
            TemporalAggregator::new(config.labels.len(), config.window_size, config.ema_alpha);
        Self {
            config,
            logger: logger.with_namespace("stabilizer"),
            aggregator,
            state: init(Instant::now()),
            estimate: SmoothedEstimate::empty(),
            last_accepted: None,
            stale_results: 0,
        }
    }

    pub fn stale_results(&self) -> u64 {
        self.stale_results
    }

    /// Decision events carry the capture time of the frame, not the time
    /// its result arrived.
    pub fn apply(&mut self, cycle: Cycle) -> Result<Snapshot, StabilizerError> {
        if let Some(last_accepted) = self.last_accepted {
            if cycle.sequence <= last_accepted {
                self.stale_results += 1;
                return Err(StabilizerError::StaleResult {
                    sequence: cycle.sequence,
                    last_accepted,
                });
            }
        }
        self.last_accepted = Some(cycle.sequence);

        let now = cycle.captured_at;
        let (event, kind, quality) = match cycle.observation {
            Observation::QualityRejected(quality) => (
                Event::QualityFailed(now),
                ObservationKind::QualityRejected,
                Some(quality),
            ),
            Observation::NoCandidate => (Event::NoVote(now), ObservationKind::NoCandidate, None),
            Observation::ClassifierFailed { quality, message } => {
                let _ = self.logger.warn(&format!(
                    "Frame {}: classifier failure, counting as no vote: {}",
                    cycle.sequence, message
                ));
                (
                    Event::NoVote(now),
                    ObservationKind::ClassifierFailure,
                    Some(quality),
                )
            }
            Observation::Classified {
                quality,
                output,
                latency,
            } => {
                let accepted = normalize(&output, self.config.labels.len())
                    .and_then(|probabilities| self.aggregator.update(&probabilities));
                match accepted {
                    Ok(estimate) => {
                        self.estimate = estimate.clone();
                        (
                            Event::Estimate(now, estimate),
                            ObservationKind::Admitted,
                            Some(quality),
                        )
                    }
                    Err(err) => {
                        let _ = self.logger.warn(&format!(
                            "Frame {}: rejected classifier output after {:?}: {}",
                            cycle.sequence, latency, err
                        ));
                        (
                            Event::NoVote(now),
                            ObservationKind::ClassifierFailure,
                            Some(quality),
                        )
                    }
                }
            }
        };

        let (state, effects) = transition(&self.config, self.state.clone(), event);
        self.state = state;
        for effect in effects {
            self.interpret_effect(cycle.sequence, effect);
        }

        Ok(Snapshot::build(
            &self.config,
            cycle.sequence,
            &self.state,
            &self.estimate,
            kind,
            quality,
        ))
    }

    fn interpret_effect(&mut self, sequence: u64, effect: Effect) {
        match effect {
            Effect::ResetAggregator => {
                self.aggregator.reset();
                self.estimate = SmoothedEstimate::empty();
            }
            Effect::StateChanged { from, to, reason } => {
                let label = to
                    .locked_label()
                    .and_then(|label| self.config.label_name(label))
                    .map(|name| format!(" ({})", name))
                    .unwrap_or_default();
                let _ = self.logger.info(&format!(
                    "Frame {}: {} -> {}{} [{:?}]",
                    sequence,
                    from.name(),
                    to.name(),
                    label,
                    reason
                ));
            }
        }
    }
}

#[cfg(test)]
impl Stabilizer {
    pub fn state(&self) -> &DecisionState {
        &self.state
    }

    pub fn estimate(&self) -> &SmoothedEstimate {
        &self.estimate
    }

    pub fn window_len(&self) -> usize {
        self.aggregator.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::core::{Reason, Status};
    use crate::image_classifier::impl_fake::distribution;
    use crate::library::logger::impl_fake::LoggerFake;

    const PET: usize = 1;

    fn good_quality() -> QualityScore {
        QualityScore {
            sharpness: 500.0,
            brightness: 120.0,
            passed: true,
            is_blurry: false,
            is_too_dark: false,
            region_area_ratio: 1.0,
        }
    }

    fn bad_quality() -> QualityScore {
        QualityScore {
            sharpness: 3.0,
            brightness: 120.0,
            passed: false,
            is_blurry: true,
            is_too_dark: false,
            region_area_ratio: 1.0,
        }
    }

    struct Feeder {
        stabilizer: Stabilizer,
        logger: LoggerFake,
        sequence: u64,
    }

    impl Feeder {
        fn new(config: Config) -> Self {
            let logger = LoggerFake::new();
            Self {
                stabilizer: Stabilizer::new(config, Arc::new(logger.clone())),
                logger,
                sequence: 0,
            }
        }

        fn cycle(&mut self, observation: Observation) -> Snapshot {
            self.sequence += 1;
            self.stabilizer
                .apply(Cycle {
                    sequence: self.sequence,
                    captured_at: Instant::now(),
                    observation,
                })
                .unwrap()
        }

        fn probabilities(&mut self, probabilities: Vec<f32>) -> Snapshot {
            self.cycle(Observation::Classified {
                quality: good_quality(),
                output: ClassifierOutput::Probabilities(probabilities),
                latency: Duration::from_millis(30),
            })
        }

        fn label(&mut self, label: usize, confidence: f32) -> Snapshot {
            self.probabilities(distribution(4, label, confidence))
        }
    }

    #[test]
    fn test_scenario_steady_label_locks_and_stays_locked() {
        let config = Config::default();
        let persistence = config.persistence_frames as u64;
        let mut feeder = Feeder::new(config);

        let mut locked_at = None;
        for cycle in 1..=25u64 {
            let snapshot = feeder.probabilities(vec![0.05, 0.9, 0.03, 0.02]);
            if snapshot.is_locked() && locked_at.is_none() {
                locked_at = Some(cycle);
            }
            if let Some(at) = locked_at {
                assert!(cycle < at || snapshot.locked_label.as_deref() == Some("PET"));
            }
        }
        assert_eq!(locked_at, Some(persistence));
        assert_eq!(
            feeder.stabilizer.state().status,
            Status::Locked { label: PET }
        );
    }

    #[test]
    fn test_scenario_confidence_drop_unlocks_through_unstable() {
        let mut feeder = Feeder::new(Config::default());
        for _ in 0..25 {
            feeder.label(PET, 0.9);
        }
        assert!(feeder.stabilizer.state().status == Status::Locked { label: PET });

        let mut statuses = vec![];
        for _ in 0..6 {
            let snapshot = feeder.label(PET, 0.3);
            statuses.push(snapshot.status.clone());
        }
        assert!(statuses.iter().all(|s| *s != Status::Unknown));
        assert_eq!(statuses.last(), Some(&Status::Scanning));

        let lines = feeder.logger.lines();
        let unstable = lines
            .iter()
            .position(|l| l.contains("LOCKED -> UNSTABLE"))
            .expect("unlock logged");
        let scanning = lines
            .iter()
            .position(|l| l.contains("UNSTABLE -> SCANNING"))
            .expect("recovery logged");
        assert!(unstable < scanning);
        assert_eq!(feeder.stabilizer.state().reason, Reason::ConfidenceLoss);
    }

    #[test]
    fn test_scenario_sustained_low_confidence_is_unknown_when_window_full() {
        let config = Config::default();
        let window = config.window_size;
        let mut feeder = Feeder::new(config);

        for cycle in 1..=window {
            let snapshot = feeder.probabilities(vec![0.2, 0.5, 0.2, 0.1]);
            if cycle < window {
                assert_eq!(snapshot.status, Status::Scanning, "cycle {}", cycle);
            } else {
                assert_eq!(snapshot.status, Status::Unknown);
            }
        }
        assert_eq!(feeder.stabilizer.window_len(), window);
    }

    #[test]
    fn test_scenario_classifier_failure_delays_lock_without_clearing_window() {
        let config = Config::default();
        let persistence = config.persistence_frames as u64;
        let mut feeder = Feeder::new(config);

        feeder.label(PET, 0.9);
        feeder.label(PET, 0.9);
        let snapshot = feeder.cycle(Observation::ClassifierFailed {
            quality: good_quality(),
            message: "timed out".to_string(),
        });
        assert_eq!(snapshot.observation, ObservationKind::ClassifierFailure);

        let mut locked_at = None;
        for cycle in 4..=20u64 {
            if feeder.label(PET, 0.9).is_locked() {
                locked_at = Some(cycle);
                break;
            }
        }
        assert_eq!(locked_at, Some(3 + persistence));
        assert_eq!(feeder.stabilizer.window_len(), 2 + persistence as usize);
    }

    #[test]
    fn test_quality_loss_clears_window() {
        let config = Config::default();
        let persist = config.quality_fail_persist;
        let mut feeder = Feeder::new(config);
        for _ in 0..10 {
            feeder.label(PET, 0.9);
        }
        for _ in 0..persist {
            feeder.cycle(Observation::QualityRejected(bad_quality()));
        }
        assert_eq!(feeder.stabilizer.state().status, Status::Unstable);
        assert_eq!(feeder.stabilizer.state().reason, Reason::QualityLoss);
        assert_eq!(feeder.stabilizer.window_len(), 0);
        assert_eq!(feeder.stabilizer.estimate().top_label, None);
    }

    #[test]
    fn test_stale_results_are_discarded() {
        let mut feeder = Feeder::new(Config::default());
        feeder.label(PET, 0.9);
        feeder.label(PET, 0.9);

        let stale = feeder.stabilizer.apply(Cycle {
            sequence: 1,
            captured_at: Instant::now(),
            observation: Observation::Classified {
                quality: good_quality(),
                output: ClassifierOutput::Probabilities(distribution(4, 0, 0.99)),
                latency: Duration::ZERO,
            },
        });
        assert!(matches!(
            stale,
            Err(StabilizerError::StaleResult {
                sequence: 1,
                last_accepted: 2
            })
        ));
        assert_eq!(feeder.stabilizer.stale_results(), 1);
        assert_eq!(feeder.stabilizer.window_len(), 2);
        assert_eq!(feeder.stabilizer.estimate().top_label, Some(PET));
    }

    #[test]
    fn test_malformed_output_is_a_classifier_failure() {
        let mut feeder = Feeder::new(Config::default());
        let snapshot = feeder.probabilities(vec![0.9, 0.9, 0.9, 0.9]);
        assert_eq!(snapshot.observation, ObservationKind::ClassifierFailure);
        assert_eq!(feeder.stabilizer.window_len(), 0);

        let snapshot = feeder.probabilities(vec![0.5, 0.5]);
        assert_eq!(snapshot.observation, ObservationKind::ClassifierFailure);
        assert_eq!(snapshot.status, Status::Scanning);
    }

    #[test]
    fn test_logits_are_accepted() {
        let mut feeder = Feeder::new(Config::default());
        let snapshot = feeder.cycle(Observation::Classified {
            quality: good_quality(),
            output: ClassifierOutput::Logits(vec![0.0, 5.0, 0.0, 0.0]),
            latency: Duration::ZERO,
        });
        assert_eq!(snapshot.observation, ObservationKind::Admitted);
        assert_eq!(snapshot.top_label.as_deref(), Some("PET"));
    }

    #[test]
    fn test_startup_snapshot_has_no_candidate() {
        let mut feeder = Feeder::new(Config::default());
        let snapshot = feeder.cycle(Observation::NoCandidate);
        assert_eq!(snapshot.status, Status::Scanning);
        assert_eq!(snapshot.top_label, None);
        assert_eq!(snapshot.top_confidence, 0.0);
    }

    #[test]
    fn test_state_times_follow_frame_capture() {
        let mut feeder = Feeder::new(Config::default());
        let captured = Instant::now();
        for offset in 0..5u64 {
            feeder.sequence += 1;
            let cycle = Cycle {
                sequence: feeder.sequence,
                captured_at: captured + Duration::from_millis(100 * offset),
                observation: Observation::Classified {
                    quality: good_quality(),
                    output: ClassifierOutput::Probabilities(distribution(4, PET, 0.9)),
                    latency: Duration::from_millis(30),
                },
            };
            feeder.stabilizer.apply(cycle).unwrap();
        }
        let state = feeder.stabilizer.state();
        assert_eq!(state.status, Status::Locked { label: PET });
        assert_eq!(state.entered_at, captured + Duration::from_millis(400));
    }
}
