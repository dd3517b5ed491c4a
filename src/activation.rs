//! Activation functions and their derivatives.
//!
//! Layers only rely on two operations: `f(x) -> y` and the derivative
//! `dy/dx`. Functions whose derivative can be written in terms of their own
//! output (Sigmoid, Tanh, Softmax, ...) report it through
//! [`ActivationFunction::has_optimized_derivative`], and the derivative is
//! then computed from the activated values instead of the pre-activation.

use crate::error::{NetworkError, Result};
use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};

/// Enumeration of available activation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationFunction {
    /// Sigmoid activation: f(x) = 1 / (1 + e^(-x))
    Sigmoid,
    /// Hyperbolic tangent: f(x) = tanh(x)
    Tanh,
    /// Rectified Linear Unit: f(x) = max(0, x)
    ReLU,
    /// Leaky ReLU: f(x) = max(αx, x) with α = 0.01
    LeakyReLU,
    /// Exponential Linear Unit: f(x) = x if x > 0, α(e^x - 1) if x ≤ 0
    ELU,
    /// Softsign: f(x) = x / (1 + |x|)
    Softsign,
    /// Softplus activation: f(x) = ln(1 + e^x)
    Softplus,
    /// Hard Sigmoid: f(x) = max(0, min(1, (x + 1) / 2))
    HardSigmoid,
    /// Hard Tanh: f(x) = max(-1, min(1, x))
    HardTanh,
    /// Softmax activation (vector-level normalization)
    Softmax,
}

impl ActivationFunction {
    /// Apply the activation function to a single value.
    ///
    /// Softmax has no scalar form and returns `e^x` here; use [`Self::f`].
    pub fn apply_scalar(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => sigmoid(x),
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::ReLU => x.max(0.0),
            ActivationFunction::LeakyReLU => leaky_relu(x, LEAKY_RELU_SLOPE),
            ActivationFunction::ELU => elu(x, ELU_ALPHA),
            ActivationFunction::Softsign => x / (1.0 + x.abs()),
            ActivationFunction::Softplus => softplus(x),
            ActivationFunction::HardSigmoid => hard_sigmoid(x),
            ActivationFunction::HardTanh => hard_tanh(x),
            ActivationFunction::Softmax => x.exp(),
        }
    }

    /// Apply the activation function to a vector.
    pub fn f(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        match self {
            ActivationFunction::Softmax => softmax(x),
            _ => Ok(x.mapv(|val| self.apply_scalar(val))),
        }
    }

    /// Whether the derivative is computed from the activated output.
    pub fn has_optimized_derivative(&self) -> bool {
        matches!(
            self,
            ActivationFunction::Sigmoid
                | ActivationFunction::Tanh
                | ActivationFunction::ReLU
                | ActivationFunction::Softsign
                | ActivationFunction::HardTanh
                | ActivationFunction::Softmax
        )
    }

    /// Derivative from the activated value `y` (optimized functions only).
    fn derivative_from_output(&self, y: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid | ActivationFunction::Softmax => y * (1.0 - y),
            ActivationFunction::Tanh => 1.0 - y * y,
            ActivationFunction::ReLU => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            ActivationFunction::Softsign => (1.0 - y.abs()).powi(2),
            ActivationFunction::HardTanh => {
                if y > -1.0 && y < 1.0 {
                    1.0
                } else {
                    0.0
                }
            }
            _ => self.derivative_scalar(y),
        }
    }

    /// Derivative from the pre-activation value `x`.
    pub fn derivative_scalar(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid | ActivationFunction::Softmax => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
            ActivationFunction::Tanh => 1.0 - x.tanh().powi(2),
            ActivationFunction::ReLU => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            ActivationFunction::LeakyReLU => {
                if x > 0.0 {
                    1.0
                } else {
                    LEAKY_RELU_SLOPE
                }
            }
            ActivationFunction::ELU => {
                if x > 0.0 {
                    1.0
                } else {
                    ELU_ALPHA * x.exp()
                }
            }
            ActivationFunction::Softsign => 1.0 / (1.0 + x.abs()).powi(2),
            ActivationFunction::Softplus => sigmoid(x),
            ActivationFunction::HardSigmoid => {
                if (-1.0..=1.0).contains(&x) {
                    0.5
                } else {
                    0.0
                }
            }
            ActivationFunction::HardTanh => {
                if (-1.0..=1.0).contains(&x) {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Element-wise derivative `dy/dx`.
    ///
    /// `activated` and `not_activated` must describe the same array.
    pub fn df(&self, activated: &Array1<f64>, not_activated: &Array1<f64>) -> Array1<f64> {
        if self.has_optimized_derivative() {
            activated.mapv(|y| self.derivative_from_output(y))
        } else {
            not_activated.mapv(|x| self.derivative_scalar(x))
        }
    }

    /// Convert errors w.r.t. the activated output into errors w.r.t. the
    /// pre-activation.
    ///
    /// Softmax uses its full Jacobian: `y ⊙ (g - <g, y>)`.
    pub fn backward(
        &self,
        activated: &Array1<f64>,
        not_activated: &Array1<f64>,
        errors: &Array1<f64>,
    ) -> Array1<f64> {
        match self {
            ActivationFunction::Softmax => {
                let weighted = errors.dot(activated);
                Zip::from(activated)
                    .and(errors)
                    .map_collect(|&y, &g| y * (g - weighted))
            }
            _ => errors * &self.df(activated, not_activated),
        }
    }

    /// Get the name of the activation function as a string.
    pub fn name(&self) -> &'static str {
        match self {
            ActivationFunction::Sigmoid => "Sigmoid",
            ActivationFunction::Tanh => "Tanh",
            ActivationFunction::ReLU => "ReLU",
            ActivationFunction::LeakyReLU => "LeakyReLU",
            ActivationFunction::ELU => "ELU",
            ActivationFunction::Softsign => "Softsign",
            ActivationFunction::Softplus => "Softplus",
            ActivationFunction::HardSigmoid => "HardSigmoid",
            ActivationFunction::HardTanh => "HardTanh",
            ActivationFunction::Softmax => "Softmax",
        }
    }
}

const LEAKY_RELU_SLOPE: f64 = 0.01;
const ELU_ALPHA: f64 = 1.0;

/// Sigmoid function: 1 / (1 + e^(-x))
#[inline]
pub(crate) fn sigmoid(x: f64) -> f64 {
    if x > 500.0 {
        1.0
    } else if x < -500.0 {
        0.0
    } else {
        1.0 / (1.0 + (-x).exp())
    }
}

#[inline]
fn leaky_relu(x: f64, alpha: f64) -> f64 {
    if x > 0.0 {
        x
    } else {
        alpha * x
    }
}

#[inline]
fn elu(x: f64, alpha: f64) -> f64 {
    if x > 0.0 {
        x
    } else {
        alpha * (x.exp() - 1.0)
    }
}

#[inline]
fn softplus(x: f64) -> f64 {
    if x > 500.0 {
        x
    } else {
        (1.0 + x.exp()).ln()
    }
}

#[inline]
fn hard_sigmoid(x: f64) -> f64 {
    0.0_f64.max(1.0_f64.min((x + 1.0) / 2.0))
}

#[inline]
fn hard_tanh(x: f64) -> f64 {
    (-1.0_f64).max(1.0_f64.min(x))
}

/// Softmax function for vectors
pub(crate) fn softmax(x: &Array1<f64>) -> Result<Array1<f64>> {
    if x.is_empty() {
        return Err(NetworkError::numerical(
            "Cannot compute softmax of empty vector",
        ));
    }

    // Subtract max for numerical stability
    let max_val = x.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
    let exp_vals = x.mapv(|val| (val - max_val).exp());
    let sum = exp_vals.sum();

    if sum == 0.0 || !sum.is_finite() {
        return Err(NetworkError::numerical(
            "Softmax computation resulted in invalid sum",
        ));
    }

    Ok(exp_vals / sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::E;

    #[test]
    fn test_sigmoid() {
        assert_abs_diff_eq!(
            ActivationFunction::Sigmoid.apply_scalar(0.0),
            0.5,
            epsilon = 1e-10
        );
        assert_abs_diff_eq!(
            ActivationFunction::Sigmoid.apply_scalar(-1.0),
            1.0 / (1.0 + E),
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_relu() {
        assert_eq!(ActivationFunction::ReLU.apply_scalar(5.0), 5.0);
        assert_eq!(ActivationFunction::ReLU.apply_scalar(-3.0), 0.0);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let input = Array1::from(vec![1000.0, 1001.0, 1002.0]);
        let result = ActivationFunction::Softmax.f(&input).unwrap();

        assert_abs_diff_eq!(result.sum(), 1.0, epsilon = 1e-10);
        assert!(result.iter().all(|&x| x > 0.0));
    }

    #[test]
    fn test_optimized_derivative_matches_plain() {
        let x = Array1::from(vec![-1.2, -0.3, 0.0, 0.4, 2.0]);

        for activation in [
            ActivationFunction::Sigmoid,
            ActivationFunction::Tanh,
            ActivationFunction::Softsign,
        ] {
            let y = activation.f(&x).unwrap();
            let from_output = activation.df(&y, &x);
            let from_input = x.mapv(|v| activation.derivative_scalar(v));

            for (a, b) in from_output.iter().zip(from_input.iter()) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_non_optimized_derivative_uses_pre_activation() {
        let x = Array1::from(vec![-2.0, 0.5]);
        let y = ActivationFunction::ELU.f(&x).unwrap();
        let df = ActivationFunction::ELU.df(&y, &x);

        assert!(!ActivationFunction::ELU.has_optimized_derivative());
        assert_abs_diff_eq!(df[0], (-2.0_f64).exp(), epsilon = 1e-10);
        assert_abs_diff_eq!(df[1], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_softmax_backward_jacobian() {
        let x = Array1::from(vec![0.1, 0.2, 0.3]);
        let y = ActivationFunction::Softmax.f(&x).unwrap();
        let g = Array1::from(vec![1.0, 0.0, 0.0]);

        let dx = ActivationFunction::Softmax.backward(&y, &x, &g);

        // d y0 / d x_j = y0 (δ0j - y_j)
        assert_abs_diff_eq!(dx[0], y[0] * (1.0 - y[0]), epsilon = 1e-12);
        assert_abs_diff_eq!(dx[1], -y[0] * y[1], epsilon = 1e-12);
        assert_abs_diff_eq!(dx[2], -y[0] * y[2], epsilon = 1e-12);
        assert_abs_diff_eq!(dx.sum(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_softmax_is_error() {
        let empty: Array1<f64> = Array1::zeros(0);
        assert!(ActivationFunction::Softmax.f(&empty).is_err());
    }
}
