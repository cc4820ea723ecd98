use crate::error::StabilizerError;
use std::collections::VecDeque;

const STABILITY_VOTE_WEIGHT: f64 = 0.7;
const STABILITY_MARGIN_WEIGHT: f64 = 0.3;
const STABILITY_FULL_MARGIN: f64 = 0.5;

/// Per-frame statistics of one admitted probability vector.
#[derive(Debug, Clone, Copy, PartialEq)]
struct WindowEntry {
    label: usize,
    top: f64,
    margin: f64,
    entropy: f64,
}

/// The aggregator's current belief. `top_label` is `None` until the first
/// admitted update.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedEstimate {
    pub probabilities: Vec<f64>,
    pub top_label: Option<usize>,
    pub top_confidence: f64,
    pub margin: f64,
    pub entropy: f64,

    pub vote_label: Option<usize>,
    pub vote_ratio: f64,
    pub mean_margin: f64,
    pub mean_entropy: f64,
    pub stability: f64,
    pub window_len: usize,
}

impl SmoothedEstimate {
    pub fn empty() -> Self {
        Self {
            probabilities: Vec::new(),
            top_label: None,
            top_confidence: 0.0,
            margin: 0.0,
            entropy: 0.0,
            vote_label: None,
            vote_ratio: 0.0,
            mean_margin: 0.0,
            mean_entropy: 0.0,
            stability: 0.0,
            window_len: 0,
        }
    }

    /// Smoothed probability of `label`, 0 when nothing has been seen.
    pub fn confidence_of(&self, label: usize) -> f64 {
        self.probabilities.get(label).copied().unwrap_or(0.0)
    }
}

/// Rolling window of admitted frames plus an exponential moving average of
/// their probability vectors. The window drives vote statistics, the EMA
/// drives the reported label and confidence.
#[derive(Debug, Clone)]
pub struct TemporalAggregator {
    label_count: usize,
    window_size: usize,
    alpha: f64,
    window: VecDeque<WindowEntry>,
    ema: Option<Vec<f64>>,
}

impl TemporalAggregator {
    pub fn new(label_count: usize, window_size: usize, alpha: f64) -> Self {
        Self {
            label_count,
            window_size: window_size.max(1),
            alpha,
            window: VecDeque::with_capacity(window_size.max(1)),
            ema: None,
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.ema = None;
    }

    pub fn update(&mut self, probabilities: &[f64]) -> Result<SmoothedEstimate, StabilizerError> {
        if probabilities.len() != self.label_count {
            return Err(StabilizerError::classifier_failure(format!(
                "aggregator expects {} probabilities, got {}",
                self.label_count,
                probabilities.len()
            )));
        }

        let (label, top, second) = top_two(probabilities);
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(WindowEntry {
            label,
            top,
            margin: top - second,
            entropy: entropy(probabilities),
        });

        let next = match self.ema.take() {
            None => probabilities.to_vec(),
            Some(previous) => previous
                .iter()
                .zip(probabilities)
                .map(|(old, new)| self.alpha * new + (1.0 - self.alpha) * old)
                .collect(),
        };
        self.ema = Some(renormalize(next));

        Ok(self.estimate())
    }

    pub fn estimate(&self) -> SmoothedEstimate {
        let (Some(ema), false) = (self.ema.as_ref(), self.window.is_empty()) else {
            return SmoothedEstimate::empty();
        };

        let (top_label, top_confidence, second) = top_two(ema);
        let len = self.window.len() as f64;
        let mean_margin = self.window.iter().map(|e| e.margin).sum::<f64>() / len;
        let mean_entropy = self.window.iter().map(|e| e.entropy).sum::<f64>() / len;
        let (vote_label, vote_count) = self.vote();
        let vote_ratio = vote_count as f64 / len;
        let normalized_margin = (mean_margin / STABILITY_FULL_MARGIN).clamp(0.0, 1.0);
        let stability = (STABILITY_VOTE_WEIGHT * vote_ratio
            + STABILITY_MARGIN_WEIGHT * normalized_margin)
            .clamp(0.0, 1.0);

        SmoothedEstimate {
            probabilities: ema.clone(),
            top_label: Some(top_label),
            top_confidence,
            margin: top_confidence - second,
            entropy: entropy(ema),
            vote_label: Some(vote_label),
            vote_ratio,
            mean_margin,
            mean_entropy,
            stability,
            window_len: self.window.len(),
        }
    }

    /// Most frequent per-frame label; ties go to the higher mean top probability.
    fn vote(&self) -> (usize, usize) {
        let mut counts = vec![0usize; self.label_count];
        let mut top_sums = vec![0.0f64; self.label_count];
        for entry in &self.window {
            counts[entry.label] += 1;
            top_sums[entry.label] += entry.top;
        }
        let mut best = (0usize, 0usize, f64::NEG_INFINITY);
        for label in 0..self.label_count {
            if counts[label] == 0 {
                continue;
            }
            let mean_top = top_sums[label] / counts[label] as f64;
            if counts[label] > best.1 || (counts[label] == best.1 && mean_top > best.2) {
                best = (label, counts[label], mean_top);
            }
        }
        (best.0, best.1)
    }
}

fn top_two(values: &[f64]) -> (usize, f64, f64) {
    let mut top = (0usize, f64::NEG_INFINITY);
    let mut second = f64::NEG_INFINITY;
    for (i, &value) in values.iter().enumerate() {
        if value > top.1 {
            second = top.1;
            top = (i, value);
        } else if value > second {
            second = value;
        }
    }
    let second = if second.is_finite() { second } else { 0.0 };
    (top.0, top.1.max(0.0), second)
}

fn entropy(probabilities: &[f64]) -> f64 {
    probabilities
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.ln())
        .sum()
}

fn renormalize(values: Vec<f64>) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 && total.is_finite() {
        values.into_iter().map(|v| v / total).collect()
    } else {
        let uniform = 1.0 / values.len().max(1) as f64;
        vec![uniform; values.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn vector(label: usize, confidence: f64) -> Vec<f64> {
        let rest = (1.0 - confidence) / 3.0;
        (0..4)
            .map(|i| if i == label { confidence } else { rest })
            .collect()
    }

    #[test]
    fn test_empty_window_reports_no_label() {
        let aggregator = TemporalAggregator::new(4, 20, 0.5);
        let estimate = aggregator.estimate();
        assert_eq!(estimate.top_label, None);
        assert_eq!(estimate.top_confidence, 0.0);
        assert_eq!(estimate.confidence_of(1), 0.0);
    }

    #[test]
    fn test_first_update_is_taken_as_is() {
        let mut aggregator = TemporalAggregator::new(4, 20, 0.5);
        let estimate = aggregator.update(&vector(1, 0.9)).unwrap();
        assert_eq!(estimate.top_label, Some(1));
        assert!((estimate.top_confidence - 0.9).abs() < 1e-9);
        assert!((estimate.margin - (0.9 - 0.1 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_ema_blends_with_alpha() {
        let mut aggregator = TemporalAggregator::new(4, 20, 0.5);
        aggregator.update(&vector(1, 0.9)).unwrap();
        let estimate = aggregator.update(&vector(1, 0.3)).unwrap();
        assert!((estimate.confidence_of(1) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_ema_always_sums_to_one() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut aggregator = TemporalAggregator::new(4, 20, 0.4);
        for _ in 0..500 {
            let raw: Vec<f64> = (0..4).map(|_| rng.random_range(0.0..1.0)).collect();
            let total: f64 = raw.iter().sum();
            let probabilities: Vec<f64> = raw.iter().map(|v| v / total).collect();
            let estimate = aggregator.update(&probabilities).unwrap();
            let sum: f64 = estimate.probabilities.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_window_is_bounded() {
        let mut aggregator = TemporalAggregator::new(4, 5, 0.5);
        for _ in 0..12 {
            aggregator.update(&vector(0, 0.8)).unwrap();
        }
        assert_eq!(aggregator.len(), 5);
    }

    #[test]
    fn test_vote_statistics() {
        let mut aggregator = TemporalAggregator::new(4, 4, 0.5);
        aggregator.update(&vector(2, 0.8)).unwrap();
        aggregator.update(&vector(2, 0.8)).unwrap();
        aggregator.update(&vector(2, 0.8)).unwrap();
        let estimate = aggregator.update(&vector(3, 0.9)).unwrap();
        assert_eq!(estimate.vote_label, Some(2));
        assert!((estimate.vote_ratio - 0.75).abs() < 1e-9);
        assert!(estimate.stability > 0.5 && estimate.stability <= 1.0);
    }

    #[test]
    fn test_vote_tie_prefers_higher_confidence() {
        let mut aggregator = TemporalAggregator::new(4, 4, 0.5);
        aggregator.update(&vector(0, 0.6)).unwrap();
        aggregator.update(&vector(3, 0.95)).unwrap();
        let estimate = aggregator.estimate();
        assert_eq!(estimate.vote_label, Some(3));
    }

    #[test]
    fn test_entropy_of_uniform() {
        let mut aggregator = TemporalAggregator::new(4, 4, 0.5);
        let estimate = aggregator.update(&[0.25, 0.25, 0.25, 0.25]).unwrap();
        assert!((estimate.entropy - 4.0f64.ln()).abs() < 1e-9);
        assert_eq!(estimate.margin, 0.0);
    }

    #[test]
    fn test_rejects_wrong_length() {
        let mut aggregator = TemporalAggregator::new(4, 4, 0.5);
        assert!(aggregator.update(&[0.5, 0.5]).is_err());
        assert!(aggregator.is_empty());
    }

    #[test]
    fn test_reset_clears_window_and_ema() {
        let mut aggregator = TemporalAggregator::new(4, 4, 0.5);
        aggregator.update(&vector(1, 0.9)).unwrap();
        aggregator.reset();
        assert!(aggregator.is_empty());
        let estimate = aggregator.update(&vector(2, 0.7)).unwrap();
        assert!((estimate.confidence_of(2) - 0.7).abs() < 1e-9);
    }
}
