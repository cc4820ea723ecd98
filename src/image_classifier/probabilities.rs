use crate::error::StabilizerError;
use crate::image_classifier::interface::ClassifierOutput;

const SUM_TOLERANCE: f64 = 0.01;
const MIN_PROBABILITY: f64 = 1e-8;

pub fn softmax(logits: &[f32]) -> Vec<f64> {
    let max = logits
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max) as f64;
    let exps: Vec<f64> = logits.iter().map(|&l| (l as f64 - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Turns a classifier output into a probability vector over `label_count`
/// labels. Malformed outputs are classifier failures.
pub fn normalize(
    output: &ClassifierOutput,
    label_count: usize,
) -> Result<Vec<f64>, StabilizerError> {
    let values = match output {
        ClassifierOutput::Probabilities(values) | ClassifierOutput::Logits(values) => values,
    };
    if values.len() != label_count {
        return Err(StabilizerError::classifier_failure(format!(
            "expected {} scores, got {}",
            label_count,
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(StabilizerError::classifier_failure(
            "scores contain non-finite values",
        ));
    }

    let probabilities = match output {
        ClassifierOutput::Logits(logits) => softmax(logits),
        ClassifierOutput::Probabilities(probabilities) => {
            if probabilities.iter().any(|&p| p < 0.0) {
                return Err(StabilizerError::classifier_failure(
                    "negative probability",
                ));
            }
            let total: f64 = probabilities.iter().map(|&p| p as f64).sum();
            if (total - 1.0).abs() > SUM_TOLERANCE {
                return Err(StabilizerError::classifier_failure(format!(
                    "probabilities sum to {:.4}",
                    total
                )));
            }
            probabilities.iter().map(|&p| p as f64).collect()
        }
    };

    let clamped: Vec<f64> = probabilities
        .into_iter()
        .map(|p| p.clamp(MIN_PROBABILITY, 1.0))
        .collect();
    let total: f64 = clamped.iter().sum();
    Ok(clamped.into_iter().map(|p| p / total).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(values: &[f64]) -> f64 {
        values.iter().sum()
    }

    #[test]
    fn test_softmax_is_stable_for_large_logits() {
        let probabilities = softmax(&[1000.0, 1000.0, 998.0]);
        assert!((sum(&probabilities) - 1.0).abs() < 1e-12);
        assert!((probabilities[0] - probabilities[1]).abs() < 1e-12);
        assert!(probabilities[2] < probabilities[0]);
    }

    #[test]
    fn test_logits_are_softmaxed() {
        let output = ClassifierOutput::Logits(vec![2.0, 1.0, 0.0, -1.0]);
        let probabilities = normalize(&output, 4).unwrap();
        assert!((sum(&probabilities) - 1.0).abs() < 1e-9);
        assert!(probabilities[0] > probabilities[1]);
    }

    #[test]
    fn test_probabilities_are_clamped_and_renormalized() {
        let output = ClassifierOutput::Probabilities(vec![1.0, 0.0, 0.0, 0.0]);
        let probabilities = normalize(&output, 4).unwrap();
        assert!(probabilities.iter().all(|&p| p > 0.0));
        assert!((sum(&probabilities) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_wrong_cardinality() {
        let output = ClassifierOutput::Probabilities(vec![0.5, 0.5]);
        assert!(matches!(
            normalize(&output, 4),
            Err(StabilizerError::ClassifierFailure(_))
        ));
    }

    #[test]
    fn test_rejects_bad_sum() {
        let output = ClassifierOutput::Probabilities(vec![0.5, 0.5, 0.5, 0.5]);
        assert!(normalize(&output, 4).is_err());
    }

    #[test]
    fn test_rejects_nan() {
        let output = ClassifierOutput::Logits(vec![0.1, f32::NAN, 0.2, 0.3]);
        assert!(normalize(&output, 4).is_err());
    }
}
