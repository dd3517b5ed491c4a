//! Random initialization of weight matrices.

use crate::error::{NetworkError, Result};
use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

/// Weight initialization strategies.
///
/// Fan-in is the number of columns (input size) and fan-out the number of
/// rows (output size) of the `(out, in)` matrix being filled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum WeightInitialization {
    /// Zero initialization
    Zeros,
    /// Random uniform initialization in `[min, max)`
    Uniform { min: f64, max: f64 },
    /// Random normal initialization
    Normal { mean: f64, std: f64 },
    /// Xavier/Glorot uniform initialization
    #[default]
    XavierUniform,
    /// Xavier/Glorot normal initialization
    XavierNormal,
    /// He uniform initialization (good for ReLU)
    HeUniform,
    /// He normal initialization (good for ReLU)
    HeNormal,
    /// LeCun uniform initialization
    LeCunUniform,
    /// LeCun normal initialization
    LeCunNormal,
}

impl WeightInitialization {
    /// Build an `(output_dim, input_dim)` matrix.
    pub fn initialize_weights<R: Rng + ?Sized>(
        &self,
        output_dim: usize,
        input_dim: usize,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        let mut weights = Array2::zeros((output_dim, input_dim));
        self.fill(&mut weights, rng)?;
        Ok(weights)
    }

    /// Overwrite every element of `weights` with a fresh draw.
    pub fn fill<R: Rng + ?Sized>(&self, weights: &mut Array2<f64>, rng: &mut R) -> Result<()> {
        let (fan_out, fan_in) = weights.dim();
        let fan_sum = (fan_in + fan_out).max(1) as f64;
        let fan_in = fan_in.max(1) as f64;

        match *self {
            WeightInitialization::Zeros => weights.fill(0.0),
            WeightInitialization::Uniform { min, max } => {
                if min >= max {
                    return Err(NetworkError::invalid_parameter(
                        "uniform range",
                        &format!("[{}, {})", min, max),
                        "min must be lower than max",
                    ));
                }
                sample_into(weights, Uniform::new(min, max), rng)
            }
            WeightInitialization::Normal { mean, std } => {
                sample_into(weights, normal(mean, std, "Normal")?, rng)
            }
            WeightInitialization::XavierUniform => {
                sample_into(weights, symmetric_uniform(6.0 / fan_sum), rng)
            }
            WeightInitialization::XavierNormal => {
                sample_into(weights, normal(0.0, (2.0 / fan_sum).sqrt(), "Xavier normal")?, rng)
            }
            WeightInitialization::HeUniform => {
                sample_into(weights, symmetric_uniform(6.0 / fan_in), rng)
            }
            WeightInitialization::HeNormal => {
                sample_into(weights, normal(0.0, (2.0 / fan_in).sqrt(), "He normal")?, rng)
            }
            WeightInitialization::LeCunUniform => {
                sample_into(weights, symmetric_uniform(3.0 / fan_in), rng)
            }
            WeightInitialization::LeCunNormal => {
                sample_into(weights, normal(0.0, (1.0 / fan_in).sqrt(), "LeCun normal")?, rng)
            }
        }

        Ok(())
    }
}

fn symmetric_uniform(limit_squared: f64) -> Uniform<f64> {
    let limit = limit_squared.sqrt();
    Uniform::new(-limit, limit)
}

fn normal(mean: f64, std: f64, name: &str) -> Result<Normal<f64>> {
    Normal::new(mean, std).map_err(|e| {
        NetworkError::configuration(format!("{} initialization failed: {}", name, e))
    })
}

fn sample_into<D, R>(weights: &mut Array2<f64>, distribution: D, rng: &mut R)
where
    D: Distribution<f64>,
    R: Rng + ?Sized,
{
    weights.mapv_inplace(|_| distribution.sample(rng));
}
