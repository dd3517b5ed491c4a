//! Processor of sequences.
//!
//! The structures of the steps live in an arena that grows on demand and is
//! reused across sequences: `used` counts the steps of the current
//! sequence, the structures beyond it are stale. Each call builds a
//! [`ContextWindow`] around the step being propagated.

use super::{processor_rng, NeuralProcessor};
use crate::array::InputArray;
use crate::error::{NetworkError, Result};
use crate::layers::LayerInterface;
use crate::optimizer::GradientAccumulator;
use crate::params::{ParamsErrors, StackedParams};
use crate::structure::{ContextWindow, StackedLayers};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::RngCore;

/// Forward of a sequence step by step, backward of the whole sequence.
#[derive(Debug, Clone)]
pub struct RecurrentProcessor {
    id: usize,
    interfaces: Vec<LayerInterface>,
    sequence: Vec<StackedLayers>,
    used: usize,
    current_index: usize,
    propagate_to_input: bool,
    accumulator: GradientAccumulator,
    rng: StdRng,
}

impl RecurrentProcessor {
    /// Create a processor for the layers described by `interfaces`.
    pub fn new(
        id: usize,
        interfaces: &[LayerInterface],
        propagate_to_input: bool,
        seed: Option<u64>,
    ) -> Result<Self> {
        crate::layers::validate_interfaces(interfaces)?;
        log::debug!(
            "Recurrent processor {} created with {} layers",
            id,
            interfaces.len() - 1
        );
        Ok(Self {
            id,
            interfaces: interfaces.to_vec(),
            sequence: Vec::new(),
            used: 0,
            current_index: 0,
            propagate_to_input,
            accumulator: GradientAccumulator::new(),
            rng: processor_rng(seed),
        })
    }

    /// Number of steps of the current sequence.
    pub fn sequence_len(&self) -> usize {
        self.used
    }

    /// Number of structures allocated so far.
    pub fn capacity(&self) -> usize {
        self.sequence.len()
    }

    /// Index of the step propagated last.
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Structure of `step` in the current sequence.
    pub fn structure(&self, step: usize) -> Result<&StackedLayers> {
        self.sequence[..self.used].get(step).ok_or_else(|| {
            NetworkError::propagation(format!(
                "Step {} is outside a sequence of {} steps",
                step, self.used
            ))
        })
    }

    /// Forward the next step of the sequence.
    ///
    /// `first_state` starts a new sequence: the previous steps are
    /// forgotten and their structures reused.
    pub fn forward(
        &mut self,
        params: &StackedParams,
        features: InputArray,
        first_state: bool,
        use_dropout: bool,
    ) -> Result<&Array1<f64>> {
        if first_state {
            if self.used > 0 {
                log::trace!("Processor {}: new sequence", self.id);
            }
            self.used = 0;
        } else if self.used == 0 {
            return Err(NetworkError::propagation(
                "The first step of a sequence must be marked as first state",
            ));
        }
        self.accumulator.reset();

        let index = self.used;
        if index == self.sequence.len() {
            self.sequence.push(StackedLayers::new(&self.interfaces)?);
        }
        self.used += 1;
        self.current_index = index;

        let (window, structure) = ContextWindow::around(&mut self.sequence[..self.used], index)?;
        let rng = if use_dropout {
            Some(&mut self.rng as &mut dyn RngCore)
        } else {
            None
        };
        structure.forward(params, features, window, rng)
    }

    /// Forward a whole sequence and return the output of every step.
    pub fn forward_sequence(
        &mut self,
        params: &StackedParams,
        features: Vec<InputArray>,
        use_dropout: bool,
    ) -> Result<Vec<Array1<f64>>> {
        features
            .into_iter()
            .enumerate()
            .map(|(step, x)| {
                self.forward(params, x, step == 0, use_dropout)
                    .map(|output| output.clone())
            })
            .collect()
    }

    /// Backward the current sequence, one output error per step.
    ///
    /// Steps are propagated in reverse order; the gradients of every step
    /// are accumulated and averaged over the sequence.
    pub fn backward(&mut self, params: &StackedParams, output_errors: &[Array1<f64>]) -> Result<()> {
        if output_errors.len() != self.used {
            return Err(NetworkError::dimension_mismatch(
                format!("{} output errors", self.used),
                format!("{}", output_errors.len()),
            ));
        }
        self.accumulator.reset();

        for index in (0..self.used).rev() {
            self.current_index = index;
            let (window, structure) =
                ContextWindow::around(&mut self.sequence[..self.used], index)?;
            structure.backward(params, &output_errors[index], window, self.propagate_to_input)?;
            self.accumulator
                .accumulate_owned(structure.params_errors(params)?)?;
        }
        self.accumulator.average_errors();

        log::trace!(
            "Processor {}: sequence of {} steps backwarded",
            self.id,
            self.used
        );
        Ok(())
    }

    /// Output of `step`.
    pub fn output(&self, step: usize) -> Result<&Array1<f64>> {
        self.structure(step)?.output()
    }

    /// Errors of the features of `step`.
    pub fn input_errors(&self, step: usize) -> Result<&Array1<f64>> {
        self.structure(step)?.input_errors().ok_or_else(|| {
            NetworkError::propagation(format!(
                "Step {} has no input errors: backward was not called or does not propagate to the input",
                step
            ))
        })
    }
}

impl NeuralProcessor for RecurrentProcessor {
    fn id(&self) -> usize {
        self.id
    }

    fn params_errors(&self) -> Result<&ParamsErrors> {
        if self.accumulator.is_empty() {
            return Err(NetworkError::propagation(format!(
                "Processor {} has no params errors: backward was not called",
                self.id
            )));
        }
        Ok(self.accumulator.errors())
    }
}
