//! Stacked structure of layers.
//!
//! Layer `i` reads the output array of layer `i - 1` in place; the first
//! layer reads the features owned by the structure, several arrays when it
//! is a merge or attention layer. Errors travel the other way: the input
//! errors of layer `i` become the output errors of layer `i - 1`.

pub mod window;

pub use window::ContextWindow;

use crate::array::{InputArray, InputView};
use crate::error::{NetworkError, Result};
use crate::layers::{validate_interfaces, Layer, LayerInterface};
use crate::params::{ParamsErrors, StackedParams};
use ndarray::Array1;
use rand::RngCore;

/// Layers of one time step.
#[derive(Debug, Clone, PartialEq)]
pub struct StackedLayers {
    layers: Vec<Layer>,
    inputs: Vec<InputArray>,
    input_errors: Option<Vec<Array1<f64>>>,
}

impl StackedLayers {
    /// Build `n` layers from `n + 1` interfaces.
    pub fn new(interfaces: &[LayerInterface]) -> Result<Self> {
        validate_interfaces(interfaces)?;
        let layers = interfaces
            .windows(2)
            .map(|pair| Layer::new(&pair[0], &pair[1]))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            layers,
            inputs: Vec::new(),
            input_errors: None,
        })
    }

    /// Layers in index order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the structure has no layer.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Features of the last forward (the first one for a multi-input
    /// structure).
    pub fn input(&self) -> Option<&InputArray> {
        self.inputs.first()
    }

    /// Every feature array of the last forward.
    pub fn inputs(&self) -> &[InputArray] {
        &self.inputs
    }

    /// Activated output of the last layer.
    pub fn output(&self) -> Result<&Array1<f64>> {
        self.layers
            .last()
            .map(|layer| layer.output().values())
            .ok_or_else(|| NetworkError::architecture("Empty structure"))
    }

    /// `dL/dx` of the last backward, when it was propagated to the input
    /// (the first input for a multi-input structure).
    pub fn input_errors(&self) -> Option<&Array1<f64>> {
        self.input_errors.as_ref().and_then(|errors| errors.first())
    }

    /// `dL/dx` of every input of the last backward.
    pub fn inputs_errors(&self) -> Option<&[Array1<f64>]> {
        self.input_errors.as_deref()
    }

    /// Forward `features` through every layer in index order.
    pub fn forward(
        &mut self,
        params: &StackedParams,
        features: InputArray,
        window: ContextWindow<'_>,
        dropout_rng: Option<&mut dyn RngCore>,
    ) -> Result<&Array1<f64>> {
        self.forward_inputs(params, vec![features], window, dropout_rng)
    }

    /// Forward several feature arrays; only a merge or attention first layer
    /// accepts more than one.
    pub fn forward_inputs(
        &mut self,
        params: &StackedParams,
        inputs: Vec<InputArray>,
        window: ContextWindow<'_>,
        mut dropout_rng: Option<&mut dyn RngCore>,
    ) -> Result<&Array1<f64>> {
        self.check_params(params)?;
        self.input_errors = None;
        self.inputs = inputs;

        let Self { layers, inputs, .. } = self;
        for index in 0..layers.len() {
            let (before, rest) = layers.split_at_mut(index);
            let rng = dropout_rng
                .as_mut()
                .map(|rng| &mut **rng as &mut dyn RngCore);
            let layer_params = params.layer(index)?;
            match before.last() {
                Some(prev) => {
                    let input = InputView::Dense(prev.output().values().view());
                    rest[0].forward(layer_params, input, window.peers(index), rng)?
                }
                None => {
                    rest[0].forward_inputs(layer_params, inputs.as_slice(), window.peers(index), rng)?
                }
            }
        }

        self.output()
    }

    /// Backward `output_errors` through every layer in reverse order.
    ///
    /// Interior layers always propagate their input errors; the first layer
    /// only when `propagate_to_input` is set.
    pub fn backward(
        &mut self,
        params: &StackedParams,
        output_errors: &Array1<f64>,
        window: ContextWindow<'_>,
        propagate_to_input: bool,
    ) -> Result<()> {
        self.check_params(params)?;
        if self.inputs.is_empty() {
            return Err(NetworkError::propagation("Cannot backward a structure before forward"));
        }
        if let Some(last) = self.layers.last_mut() {
            last.assign_output_errors(output_errors)?;
        }

        let Self {
            layers,
            inputs,
            input_errors,
        } = self;
        for index in (1..layers.len()).rev() {
            let (before, rest) = layers.split_at_mut(index);
            let prev = &mut before[index - 1];
            let input = InputView::Dense(prev.output().values().view());
            let errors = rest[0]
                .backward(params.layer(index)?, input, window.peers(index), true)?
                .ok_or_else(|| {
                    NetworkError::propagation(format!(
                        "Layer {} did not propagate its input errors",
                        index
                    ))
                })?;
            prev.assign_output_errors(&errors)?;
        }
        if let Some(first) = layers.first_mut() {
            *input_errors =
                first.backward_inputs(params.layer(0)?, inputs.as_slice(), window.peers(0), propagate_to_input)?;
        }

        log::trace!("Structure of {} layers backwarded", self.layers.len());
        Ok(())
    }

    /// Named gradients of every layer, in parameter order.
    pub fn params_errors(&self, params: &StackedParams) -> Result<ParamsErrors> {
        self.check_params(params)?;
        let mut errors = ParamsErrors::new();
        for (layer, layer_params) in self.layers.iter().zip(&params.layers) {
            errors.extend(layer.params_errors(layer_params)?);
        }
        Ok(errors)
    }

    /// Propagate `output_relevance` down to the features and return their
    /// relevance.
    pub fn propagate_relevance(
        &mut self,
        params: &StackedParams,
        output_relevance: Array1<f64>,
        epsilon: f64,
    ) -> Result<Array1<f64>> {
        self.check_params(params)?;
        let features = match self.inputs.as_slice() {
            [features] => features,
            [] => return Err(NetworkError::propagation("Cannot propagate relevance before forward")),
            _ => {
                return Err(NetworkError::propagation(
                    "Relevance propagation needs a single input",
                ))
            }
        };

        let mut relevance = output_relevance;
        for index in (0..self.layers.len()).rev() {
            let (before, rest) = self.layers.split_at_mut(index);
            rest[0].assign_output_relevance(relevance)?;
            let input = match before.last() {
                Some(prev) => InputView::Dense(prev.output().values().view()),
                None => features.view(),
            };
            relevance = rest[0].propagate_relevance(params.layer(index)?, input, epsilon)?;
        }
        Ok(relevance)
    }

    fn check_params(&self, params: &StackedParams) -> Result<()> {
        if params.len() != self.layers.len() {
            return Err(NetworkError::architecture(format!(
                "Structure of {} layers given parameters for {} layers",
                self.layers.len(),
                params.len()
            )));
        }
        Ok(())
    }
}
