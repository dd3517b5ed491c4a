//! Parameter optimization.
//!
//! A [`ParamsOptimizer`] collects gradients through a
//! [`GradientAccumulator`] and, on [`ParamsOptimizer::update`], averages
//! them, clips them, regularizes the weights and applies its
//! [`UpdateMethod`]. Support buffers are created lazily per parameter name
//! and survive across updates.

pub mod accumulator;
pub mod method;

pub use accumulator::GradientAccumulator;
pub use method::{SupportStructure, UpdateMethod};

use crate::error::{NetworkError, Result};
use crate::params::{Gradient, ParamsArray, ParamsErrors};
use method::StepState;
use ndarray::{ArrayViewMutD, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Weight regularization applied right before the update rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Regularization {
    /// `w -= λ * sign(w)`
    L1(f64),
    /// `w -= λ * w`
    L2(f64),
}

impl Regularization {
    fn apply(&self, mut values: ArrayViewMutD<'_, f64>) {
        match *self {
            Regularization::L1(lambda) => values.mapv_inplace(|w| {
                if w == 0.0 {
                    w
                } else {
                    w - lambda * w.signum()
                }
            }),
            Regularization::L2(lambda) => values.mapv_inplace(|w| w - lambda * w),
        }
    }

    fn lambda(&self) -> f64 {
        match *self {
            Regularization::L1(lambda) | Regularization::L2(lambda) => lambda,
        }
    }
}

/// Clipping of the averaged gradients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GradientClipping {
    /// Clamp every component to `[-v, v]`
    ByValue(f64),
    /// Rescale a gradient whose norm exceeds `n`
    ByNorm(f64),
}

impl GradientClipping {
    fn apply(&self, gradient: &mut Gradient) {
        match *self {
            GradientClipping::ByValue(limit) => gradient.map_inplace(|g| g.clamp(-limit, limit)),
            GradientClipping::ByNorm(max_norm) => {
                let norm = gradient.norm();
                if norm > max_norm {
                    let scale = max_norm / norm;
                    gradient.map_inplace(|g| g * scale);
                }
            }
        }
    }

    fn threshold(&self) -> f64 {
        match *self {
            GradientClipping::ByValue(threshold) | GradientClipping::ByNorm(threshold) => threshold,
        }
    }
}

/// Configuration of a [`ParamsOptimizer`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Update rule
    pub method: UpdateMethod,
    /// Optional weight regularization
    #[serde(default)]
    pub regularization: Option<Regularization>,
    /// Optional gradient clipping
    #[serde(default)]
    pub clipping: Option<GradientClipping>,
}

/// Optimizer of a set of named parameters.
#[derive(Debug, Clone)]
pub struct ParamsOptimizer {
    config: OptimizerConfig,
    accumulator: GradientAccumulator,
    support: HashMap<String, SupportStructure>,
    epoch: usize,
    batch: usize,
    examples: usize,
    learning_rate: f64,
}

impl ParamsOptimizer {
    /// Create an optimizer, validating its configuration.
    pub fn new(config: OptimizerConfig) -> Result<Self> {
        config.method.validate()?;
        if let Some(regularization) = config.regularization {
            if !(0.0..1.0).contains(&regularization.lambda()) {
                return Err(NetworkError::invalid_parameter(
                    "regularization",
                    regularization.lambda().to_string(),
                    "must be in [0, 1)",
                ));
            }
        }
        if let Some(clipping) = config.clipping {
            if clipping.threshold() <= 0.0 {
                return Err(NetworkError::invalid_parameter(
                    "clipping",
                    clipping.threshold().to_string(),
                    "must be positive",
                ));
            }
        }

        let learning_rate = config.method.scheduled_learning_rate(0);
        Ok(Self {
            config,
            accumulator: GradientAccumulator::new(),
            support: HashMap::new(),
            epoch: 0,
            batch: 0,
            examples: 0,
            learning_rate,
        })
    }

    /// Optimizer with the given update rule only.
    pub fn with_method(method: UpdateMethod) -> Result<Self> {
        Self::new(OptimizerConfig {
            method,
            ..Default::default()
        })
    }

    /// Plain gradient descent.
    pub fn sgd(learning_rate: f64) -> Result<Self> {
        Self::with_method(UpdateMethod::learning_rate(learning_rate))
    }

    /// ADAM with the usual moment rates.
    pub fn adam(step_size: f64) -> Result<Self> {
        Self::with_method(UpdateMethod::adam(step_size))
    }

    /// Add weight regularization.
    pub fn with_regularization(self, regularization: Regularization) -> Result<Self> {
        Self::new(OptimizerConfig {
            regularization: Some(regularization),
            ..self.config
        })
    }

    /// Add gradient clipping.
    pub fn with_clipping(self, clipping: GradientClipping) -> Result<Self> {
        Self::new(OptimizerConfig {
            clipping: Some(clipping),
            ..self.config
        })
    }

    /// Configuration.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Current learning rate.
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Number of completed epochs.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Number of started batches.
    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Number of examples seen, the ADAM time step.
    pub fn examples(&self) -> usize {
        self.examples
    }

    /// Support buffers of the parameter called `name`, once updated.
    pub fn support(&self, name: &str) -> Option<&SupportStructure> {
        self.support.get(name)
    }

    /// Pending gradients.
    pub fn accumulator(&self) -> &GradientAccumulator {
        &self.accumulator
    }

    /// Add a copy of `errors` to the pending gradients.
    pub fn accumulate(&mut self, errors: &ParamsErrors) -> Result<()> {
        self.accumulator.accumulate(errors)
    }

    /// Add `errors` to the pending gradients, by move when they are the
    /// first ones.
    pub fn accumulate_owned(&mut self, errors: ParamsErrors) -> Result<()> {
        self.accumulator.accumulate_owned(errors)
    }

    /// Start a new epoch and apply the learning-rate schedule.
    pub fn new_epoch(&mut self) {
        self.epoch += 1;
        self.learning_rate = self.config.method.scheduled_learning_rate(self.epoch);
        log::debug!(
            "Epoch {}: learning rate {}",
            self.epoch,
            self.learning_rate
        );
    }

    /// Start a new batch.
    pub fn new_batch(&mut self) {
        self.batch += 1;
    }

    /// Start a new example: ticks the ADAM bias correction.
    pub fn new_example(&mut self) {
        self.examples += 1;
    }

    /// Update `params` with the pending gradients, then drop them.
    ///
    /// Parameters without a pending gradient are left untouched. Every
    /// pending gradient must match one of `params` by name and shape;
    /// otherwise nothing is updated and the gradients stay pending.
    pub fn update<'a>(&mut self, params: impl IntoIterator<Item = &'a mut ParamsArray>) -> Result<()> {
        if self.accumulator.is_empty() {
            log::warn!("Optimizer update without accumulated errors");
            return Ok(());
        }

        let params: Vec<&'a mut ParamsArray> = params.into_iter().collect();
        for entry in self.accumulator.errors().iter() {
            let param = params
                .iter()
                .find(|param| param.name == entry.name)
                .ok_or_else(|| {
                    NetworkError::optimizer(format!(
                        "Errors of {} match no parameter being updated",
                        entry.name
                    ))
                })?;
            if entry.gradient.shape() != param.shape() {
                return Err(NetworkError::optimizer(format!(
                    "Errors of {} have shape {:?}, the parameter {:?}",
                    param.name,
                    entry.gradient.shape(),
                    param.shape()
                )));
            }
        }

        self.accumulator.average_errors();
        let step = StepState {
            learning_rate: self.learning_rate,
            adam_alpha: self.config.method.adam_alpha(self.examples),
        };
        let method = self.config.method;
        let regularization = self.config.regularization;
        let clipping = self.config.clipping;

        let mut updated = 0;
        for param in params {
            let Some(entry) = self
                .accumulator
                .errors_mut()
                .gradients
                .iter_mut()
                .find(|e| e.name == param.name)
            else {
                continue;
            };

            if let Some(clipping) = clipping {
                clipping.apply(&mut entry.gradient);
            }

            let support = self
                .support
                .entry(param.name.clone())
                .or_insert_with(|| SupportStructure::zeros(&method, param.shape()));
            let regularization = regularization.filter(|_| param.is_weights());

            match &entry.gradient {
                Gradient::Dense(gradient) => {
                    if let Some(regularization) = regularization {
                        regularization.apply(param.values.view_mut());
                    }
                    let mut buffers: Vec<_> =
                        support.buffers.iter_mut().map(|b| b.view_mut()).collect();
                    method.apply(step, param.values.view_mut(), gradient.view(), &mut buffers)?;
                }
                Gradient::Sparse(gradient) => {
                    for (&column, values) in gradient.columns() {
                        let mut target = param.values.index_axis_mut(Axis(1), column);
                        if let Some(regularization) = regularization {
                            regularization.apply(target.view_mut());
                        }
                        let mut buffers: Vec<_> = support
                            .buffers
                            .iter_mut()
                            .map(|b| b.index_axis_mut(Axis(1), column))
                            .collect();
                        method.apply(step, target, values.view().into_dyn(), &mut buffers)?;
                    }
                }
            }
            updated += 1;
        }

        log::trace!("Updated {} parameters with {}", updated, method.name());
        self.accumulator.reset();
        Ok(())
    }
}
