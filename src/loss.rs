//! Loss functions for network training.
//!
//! Losses work on single output vectors. The sequence helpers are built on top
//! of the single-step contract and are what recurrent processors consume.

use crate::error::{NetworkError, Result};
use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};

/// Probabilities are floored at this value before taking a logarithm.
pub const EPSILON: f64 = 1e-12;

/// Enumeration of available loss functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossFunction {
    /// Mean Squared Error: 0.5 (y - t)^2 per component
    MeanSquaredError,
    /// Mean Absolute Error: |y - t| per component
    MeanAbsoluteError,
    /// Cross-entropy over a softmax output; errors are taken w.r.t. the logits
    SoftmaxCrossEntropy,
    /// Binary cross-entropy over a sigmoid output; errors are taken w.r.t. the logits
    BinaryCrossEntropy,
}

impl LossFunction {
    /// Compute the loss of each output component.
    pub fn calculate_loss(&self, output: &Array1<f64>, gold: &Array1<f64>) -> Result<Array1<f64>> {
        check_shapes(output, gold)?;

        let loss = match self {
            LossFunction::MeanSquaredError => {
                Zip::from(output).and(gold).map_collect(|&y, &t| 0.5 * (y - t).powi(2))
            }
            LossFunction::MeanAbsoluteError => {
                Zip::from(output).and(gold).map_collect(|&y, &t| (y - t).abs())
            }
            LossFunction::SoftmaxCrossEntropy => Zip::from(output)
                .and(gold)
                .map_collect(|&y, &t| -t * y.max(EPSILON).ln()),
            LossFunction::BinaryCrossEntropy => Zip::from(output).and(gold).map_collect(|&y, &t| {
                let p = y.max(EPSILON).min(1.0 - EPSILON);
                -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
            }),
        };

        Ok(loss)
    }

    /// Compute the errors to inject at the output of the network.
    pub fn calculate_errors(
        &self,
        output: &Array1<f64>,
        gold: &Array1<f64>,
    ) -> Result<Array1<f64>> {
        check_shapes(output, gold)?;

        let errors = match self {
            LossFunction::MeanSquaredError
            | LossFunction::SoftmaxCrossEntropy
            | LossFunction::BinaryCrossEntropy => output - gold,
            LossFunction::MeanAbsoluteError => (output - gold).mapv(|d| if d == 0.0 { 0.0 } else { d.signum() }),
        };

        Ok(errors)
    }

    /// Compute the errors of each step of a sequence.
    pub fn calculate_errors_sequence(
        &self,
        outputs: &[Array1<f64>],
        golds: &[Array1<f64>],
    ) -> Result<Vec<Array1<f64>>> {
        check_sequence_lengths(outputs, golds)?;

        outputs
            .iter()
            .zip(golds)
            .map(|(output, gold)| self.calculate_errors(output, gold))
            .collect()
    }

    /// Average over the steps of a sequence of the summed per-step loss.
    pub fn calculate_mean_loss(
        &self,
        outputs: &[Array1<f64>],
        golds: &[Array1<f64>],
    ) -> Result<f64> {
        check_sequence_lengths(outputs, golds)?;

        if outputs.is_empty() {
            return Err(NetworkError::numerical(
                "Cannot compute the mean loss of an empty sequence",
            ));
        }

        let mut total = 0.0;
        for (output, gold) in outputs.iter().zip(golds) {
            total += self.calculate_loss(output, gold)?.sum();
        }

        Ok(total / outputs.len() as f64)
    }

    /// Get the name of the loss function.
    pub fn name(&self) -> &'static str {
        match self {
            LossFunction::MeanSquaredError => "MeanSquaredError",
            LossFunction::MeanAbsoluteError => "MeanAbsoluteError",
            LossFunction::SoftmaxCrossEntropy => "SoftmaxCrossEntropy",
            LossFunction::BinaryCrossEntropy => "BinaryCrossEntropy",
        }
    }
}

fn check_shapes(output: &Array1<f64>, gold: &Array1<f64>) -> Result<()> {
    if output.len() != gold.len() {
        return Err(NetworkError::size_mismatch("gold", output.len(), gold.len()));
    }
    Ok(())
}

fn check_sequence_lengths(outputs: &[Array1<f64>], golds: &[Array1<f64>]) -> Result<()> {
    if outputs.len() != golds.len() {
        return Err(NetworkError::dimension_mismatch(
            format!("{} gold steps", outputs.len()),
            format!("{} gold steps", golds.len()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_mse_errors_and_loss() {
        let output = Array1::from(vec![0.0, 0.1, 0.2, 0.3]);
        let gold = Array1::from(vec![0.3, 0.2, 0.1, 0.0]);

        let errors = LossFunction::MeanSquaredError
            .calculate_errors(&output, &gold)
            .unwrap();
        let loss = LossFunction::MeanSquaredError
            .calculate_loss(&output, &gold)
            .unwrap();

        for (e, expected) in errors.iter().zip([-0.3, -0.1, 0.1, 0.3]) {
            assert_abs_diff_eq!(*e, expected, epsilon = 1e-12);
        }
        for (l, expected) in loss.iter().zip([0.045, 0.005, 0.005, 0.045]) {
            assert_abs_diff_eq!(*l, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_cross_entropy_floors_zero_probability() {
        let output = Array1::from(vec![0.0, 1.0]);
        let gold = Array1::from(vec![1.0, 0.0]);

        let loss = LossFunction::SoftmaxCrossEntropy
            .calculate_loss(&output, &gold)
            .unwrap();

        assert!(loss[0].is_finite());
        assert_abs_diff_eq!(loss[0], -EPSILON.ln(), epsilon = 1e-9);
        assert_eq!(loss[1], 0.0);
    }

    #[test]
    fn test_sequence_helpers() {
        let outputs = vec![
            Array1::from(vec![0.5, 0.5]),
            Array1::from(vec![1.0, 0.0]),
        ];
        let golds = vec![
            Array1::from(vec![0.0, 0.5]),
            Array1::from(vec![1.0, 1.0]),
        ];

        let errors = LossFunction::MeanSquaredError
            .calculate_errors_sequence(&outputs, &golds)
            .unwrap();
        assert_eq!(errors.len(), 2);
        assert_abs_diff_eq!(errors[1][1], -1.0, epsilon = 1e-12);

        let mean = LossFunction::MeanSquaredError
            .calculate_mean_loss(&outputs, &golds)
            .unwrap();
        // (0.125 + 0.5) / 2
        assert_abs_diff_eq!(mean, 0.3125, epsilon = 1e-12);
    }

    #[test]
    fn test_shape_mismatch() {
        let output = Array1::from(vec![0.0, 0.1]);
        let gold = Array1::from(vec![0.3]);

        let result = LossFunction::MeanSquaredError.calculate_errors(&output, &gold);
        assert!(matches!(
            result,
            Err(NetworkError::DimensionMismatch { .. })
        ));
    }
}
