//! Update rules.
//!
//! Each rule updates a parameter from its averaged gradient and a set of
//! support buffers (velocity, squared-gradient sums, moments) of the same
//! shape as the parameter. Sparse gradients only touch the active columns
//! of the parameter and of its buffers.

use crate::error::{NetworkError, Result};
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Zip};
use serde::{Deserialize, Serialize};

/// Update rule of a [`super::ParamsOptimizer`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UpdateMethod {
    /// `w -= lr * g`, with `lr = lr0 / (1 + decay * epoch)` floored at
    /// `min_learning_rate`
    LearningRate {
        learning_rate: f64,
        decay: f64,
        min_learning_rate: f64,
    },
    /// `v = μv - lr * g; w += v`
    Momentum { learning_rate: f64, momentum: f64 },
    /// Look-ahead momentum: `w += -μv + (1 + μ)v'`
    Nesterov { learning_rate: f64, momentum: f64 },
    /// `s += g²; w -= lr * g / (√s + ε)`
    AdaGrad { learning_rate: f64, epsilon: f64 },
    /// Bias-corrected first and second moments
    Adam {
        step_size: f64,
        beta1: f64,
        beta2: f64,
        epsilon: f64,
    },
    /// `s = d * s + (1 - d) * g²; w -= lr * g / (√s + ε)`
    RmsProp {
        learning_rate: f64,
        decay: f64,
        epsilon: f64,
    },
}

impl Default for UpdateMethod {
    fn default() -> Self {
        UpdateMethod::LearningRate {
            learning_rate: 0.01,
            decay: 0.0,
            min_learning_rate: 0.0,
        }
    }
}

/// Buffers kept for one parameter across updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportStructure {
    /// One buffer per quantity tracked by the rule
    pub buffers: Vec<ArrayD<f64>>,
}

impl SupportStructure {
    /// Zero buffers for a parameter of the given shape.
    pub fn zeros(method: &UpdateMethod, shape: &[usize]) -> Self {
        Self {
            buffers: (0..method.support_size())
                .map(|_| ArrayD::zeros(shape))
                .collect(),
        }
    }
}

/// Schedule-dependent values of a rule at the time of an update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StepState {
    pub learning_rate: f64,
    /// ADAM `α = step * √(1 - β2ᵗ) / (1 - β1ᵗ)`
    pub adam_alpha: f64,
}

impl UpdateMethod {
    /// Learning rate with a default schedule.
    pub fn learning_rate(learning_rate: f64) -> Self {
        UpdateMethod::LearningRate {
            learning_rate,
            decay: 0.0,
            min_learning_rate: 0.0,
        }
    }

    /// ADAM with the usual moment rates.
    pub fn adam(step_size: f64) -> Self {
        UpdateMethod::Adam {
            step_size,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }

    /// Name of the rule.
    pub fn name(&self) -> &'static str {
        match self {
            UpdateMethod::LearningRate { .. } => "LearningRate",
            UpdateMethod::Momentum { .. } => "Momentum",
            UpdateMethod::Nesterov { .. } => "Nesterov",
            UpdateMethod::AdaGrad { .. } => "AdaGrad",
            UpdateMethod::Adam { .. } => "Adam",
            UpdateMethod::RmsProp { .. } => "RmsProp",
        }
    }

    /// Number of buffers kept per parameter.
    pub fn support_size(&self) -> usize {
        match self {
            UpdateMethod::LearningRate { .. } => 0,
            UpdateMethod::Adam { .. } => 2,
            _ => 1,
        }
    }

    /// Check the hyperparameters.
    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, value: f64| {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(NetworkError::invalid_parameter(name, value.to_string(), "must be positive"))
            }
        };
        let unit_interval = |name: &str, value: f64| {
            if (0.0..1.0).contains(&value) {
                Ok(())
            } else {
                Err(NetworkError::invalid_parameter(name, value.to_string(), "must be in [0, 1)"))
            }
        };

        match *self {
            UpdateMethod::LearningRate {
                learning_rate,
                decay,
                min_learning_rate,
            } => {
                positive("learning_rate", learning_rate)?;
                if decay < 0.0 {
                    return Err(NetworkError::invalid_parameter(
                        "decay",
                        decay.to_string(),
                        "must not be negative",
                    ));
                }
                if !(0.0..=learning_rate).contains(&min_learning_rate) {
                    return Err(NetworkError::invalid_parameter(
                        "min_learning_rate",
                        min_learning_rate.to_string(),
                        "must be in [0, learning_rate]",
                    ));
                }
                Ok(())
            }
            UpdateMethod::Momentum {
                learning_rate,
                momentum,
            }
            | UpdateMethod::Nesterov {
                learning_rate,
                momentum,
            } => {
                positive("learning_rate", learning_rate)?;
                unit_interval("momentum", momentum)
            }
            UpdateMethod::AdaGrad {
                learning_rate,
                epsilon,
            } => {
                positive("learning_rate", learning_rate)?;
                positive("epsilon", epsilon)
            }
            UpdateMethod::Adam {
                step_size,
                beta1,
                beta2,
                epsilon,
            } => {
                positive("step_size", step_size)?;
                unit_interval("beta1", beta1)?;
                unit_interval("beta2", beta2)?;
                positive("epsilon", epsilon)
            }
            UpdateMethod::RmsProp {
                learning_rate,
                decay,
                epsilon,
            } => {
                positive("learning_rate", learning_rate)?;
                unit_interval("decay", decay)?;
                positive("epsilon", epsilon)
            }
        }
    }

    /// Base learning rate, or step size for ADAM.
    pub fn base_learning_rate(&self) -> f64 {
        match *self {
            UpdateMethod::LearningRate { learning_rate, .. }
            | UpdateMethod::Momentum { learning_rate, .. }
            | UpdateMethod::Nesterov { learning_rate, .. }
            | UpdateMethod::AdaGrad { learning_rate, .. }
            | UpdateMethod::RmsProp { learning_rate, .. } => learning_rate,
            UpdateMethod::Adam { step_size, .. } => step_size,
        }
    }

    /// Learning rate after `epoch` completed epochs.
    pub fn scheduled_learning_rate(&self, epoch: usize) -> f64 {
        match *self {
            UpdateMethod::LearningRate {
                learning_rate,
                decay,
                min_learning_rate,
            } if decay > 0.0 => {
                (learning_rate / (1.0 + decay * epoch as f64)).max(min_learning_rate)
            }
            _ => self.base_learning_rate(),
        }
    }

    /// Bias-corrected ADAM step after `t` examples (`t` counts from 1).
    pub(crate) fn adam_alpha(&self, t: usize) -> f64 {
        match *self {
            UpdateMethod::Adam {
                step_size,
                beta1,
                beta2,
                ..
            } => {
                let t = t.max(1) as i32;
                step_size * (1.0 - beta2.powi(t)).sqrt() / (1.0 - beta1.powi(t))
            }
            _ => 0.0,
        }
    }

    /// Apply the rule to `params` in place.
    ///
    /// `params`, `gradient` and every buffer must have the same shape.
    pub(crate) fn apply(
        &self,
        step: StepState,
        mut params: ArrayViewMutD<'_, f64>,
        gradient: ArrayViewD<'_, f64>,
        buffers: &mut [ArrayViewMutD<'_, f64>],
    ) -> Result<()> {
        if let Some(buffer) = buffers.iter().find(|b| b.shape() != params.shape()) {
            return Err(NetworkError::dimension_mismatch(
                format!("support buffer of shape {:?}", params.shape()),
                format!("{:?}", buffer.shape()),
            ));
        }
        if gradient.shape() != params.shape() {
            return Err(NetworkError::dimension_mismatch(
                format!("{:?}", params.shape()),
                format!("{:?}", gradient.shape()),
            ));
        }
        let lr = step.learning_rate;

        match (*self, buffers) {
            (UpdateMethod::LearningRate { .. }, _) => params.scaled_add(-lr, &gradient),
            (UpdateMethod::Momentum { momentum, .. }, [velocity]) => {
                Zip::from(&mut params)
                    .and(velocity)
                    .and(&gradient)
                    .for_each(|w, v, &g| {
                        *v = momentum * *v - lr * g;
                        *w += *v;
                    })
            }
            (UpdateMethod::Nesterov { momentum, .. }, [velocity]) => {
                Zip::from(&mut params)
                    .and(velocity)
                    .and(&gradient)
                    .for_each(|w, v, &g| {
                        let prev = *v;
                        *v = momentum * prev - lr * g;
                        *w += -momentum * prev + (1.0 + momentum) * *v;
                    })
            }
            (UpdateMethod::AdaGrad { epsilon, .. }, [squares]) => Zip::from(&mut params)
                .and(squares)
                .and(&gradient)
                .for_each(|w, s, &g| {
                    *s += g * g;
                    *w -= lr * g / (s.sqrt() + epsilon);
                }),
            (
                UpdateMethod::Adam {
                    beta1,
                    beta2,
                    epsilon,
                    ..
                },
                [first, second],
            ) => {
                let alpha = step.adam_alpha;
                Zip::from(&mut params)
                    .and(first)
                    .and(second)
                    .and(&gradient)
                    .for_each(|w, m, v, &g| {
                        *m = beta1 * *m + (1.0 - beta1) * g;
                        *v = beta2 * *v + (1.0 - beta2) * g * g;
                        *w -= alpha * *m / (v.sqrt() + epsilon);
                    })
            }
            (UpdateMethod::RmsProp { decay, epsilon, .. }, [squares]) => Zip::from(&mut params)
                .and(squares)
                .and(&gradient)
                .for_each(|w, s, &g| {
                    *s = decay * *s + (1.0 - decay) * g * g;
                    *w -= lr * g / (s.sqrt() + epsilon);
                }),
            (method, buffers) => {
                return Err(NetworkError::optimizer(format!(
                    "{} needs {} support buffers, got {}",
                    method.name(),
                    method.support_size(),
                    buffers.len()
                )))
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_schedule() {
        let method = UpdateMethod::LearningRate {
            learning_rate: 0.1,
            decay: 0.5,
            min_learning_rate: 0.04,
        };
        assert_abs_diff_eq!(method.scheduled_learning_rate(0), 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(method.scheduled_learning_rate(2), 0.05, epsilon = 1e-12);
        assert_abs_diff_eq!(method.scheduled_learning_rate(4), 0.04, epsilon = 1e-12);
        assert_abs_diff_eq!(
            UpdateMethod::adam(0.001).scheduled_learning_rate(9),
            0.001,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_adam_alpha_floors_t() {
        let method = UpdateMethod::adam(0.001);
        assert_abs_diff_eq!(method.adam_alpha(0), method.adam_alpha(1), epsilon = 1e-15);
        assert_abs_diff_eq!(
            method.adam_alpha(1),
            0.001 * (0.001_f64).sqrt() / 0.1,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_validation() {
        assert!(UpdateMethod::learning_rate(0.0).validate().is_err());
        assert!(UpdateMethod::Momentum {
            learning_rate: 0.1,
            momentum: 1.0
        }
        .validate()
        .is_err());
        assert!(UpdateMethod::Adam {
            step_size: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 0.0
        }
        .validate()
        .is_err());
        assert!(UpdateMethod::default().validate().is_ok());
    }

    #[test]
    fn test_missing_buffers() {
        let method = UpdateMethod::adam(0.001);
        let mut params = ArrayD::<f64>::zeros(vec![2]);
        let gradient = ArrayD::<f64>::ones(vec![2]);
        let step = StepState {
            learning_rate: 0.001,
            adam_alpha: 0.001,
        };
        assert!(method
            .apply(step, params.view_mut(), gradient.view(), &mut [])
            .is_err());
    }
}
