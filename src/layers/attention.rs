//! Attention over a set of arrays.
//!
//! Each input `x_i` is transformed into `a_i = tanh(W·x_i + b)` and scored
//! against a learned context vector: `α = softmax(cv · a_i)`. The output is
//! the weighted sum `y = Σ α_i x_i`, activated when the layer has an
//! activation.

use super::unit::{params_gradients, GateUnit};
use super::MultiBackwardOutput;
use crate::activation::{softmax, ActivationFunction};
use crate::array::{AugmentedArray, InputView};
use crate::error::{NetworkError, Result};
use crate::params::{Gradient, LayerParameters, UnitErrors};
use ndarray::{Array1, ArrayView1};

const TANH: Option<ActivationFunction> = Some(ActivationFunction::Tanh);

/// Transformed inputs and scores of the last forward.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttentionState {
    /// `tanh(W·x_i + b)` for every input
    pub transformed: Vec<GateUnit>,
    scores: Option<Array1<f64>>,
}

impl AttentionState {
    /// Attention scores `α` of the last forward.
    pub fn attention_scores(&self) -> Option<&Array1<f64>> {
        self.scores.as_ref()
    }
}

fn context_vector(params: &LayerParameters) -> Result<ArrayView1<'_, f64>> {
    params
        .context_vector
        .as_ref()
        .ok_or_else(|| NetworkError::architecture("Attention parameters have no context vector"))?
        .as_vector()
}

fn check_inputs(size: usize, inputs: &[ArrayView1<'_, f64>]) -> Result<()> {
    if inputs.is_empty() {
        return Err(NetworkError::architecture("Attention needs at least one input"));
    }
    if let Some(x) = inputs.iter().find(|x| x.len() != size) {
        return Err(NetworkError::size_mismatch("attention input", size, x.len()));
    }
    Ok(())
}

pub(crate) fn forward(
    state: &mut AttentionState,
    output: &mut AugmentedArray,
    params: &LayerParameters,
    activation: Option<ActivationFunction>,
    inputs: &[ArrayView1<'_, f64>],
) -> Result<()> {
    check_inputs(output.size(), inputs)?;
    let transform = params.unit("transform")?;
    let context_vector = context_vector(params)?;

    let mut transformed = Vec::with_capacity(inputs.len());
    for x in inputs {
        let mut gate = GateUnit::new(context_vector.len());
        gate.forward_activated(transform, InputView::Dense(x.view()), None, TANH)?;
        transformed.push(gate);
    }

    let logits = transformed
        .iter()
        .map(|a| a.values().dot(&context_vector))
        .collect::<Array1<f64>>();
    let scores = softmax(&logits)?;

    let mut weighted = Array1::zeros(output.size());
    for (x, &alpha) in inputs.iter().zip(scores.iter()) {
        weighted.scaled_add(alpha, x);
    }
    output.assign_values(weighted)?;
    output.activate(activation)?;

    state.transformed = transformed;
    state.scores = Some(scores);
    Ok(())
}

pub(crate) fn backward(
    state: &mut AttentionState,
    output: &mut AugmentedArray,
    params: &LayerParameters,
    activation: Option<ActivationFunction>,
    inputs: &[ArrayView1<'_, f64>],
) -> Result<MultiBackwardOutput> {
    check_inputs(output.size(), inputs)?;
    let scores = state
        .scores
        .as_ref()
        .ok_or_else(|| NetworkError::propagation("Cannot backward attention before forward"))?;
    if scores.len() != inputs.len() || state.transformed.len() != inputs.len() {
        return Err(NetworkError::size_mismatch("attention inputs", scores.len(), inputs.len()));
    }
    let transform = params.unit("transform")?;
    let context_vector = context_vector(params)?;

    output.activation_backward(activation);
    let g = output.errors();

    let score_errors = inputs.iter().map(|x| g.dot(x)).collect::<Array1<f64>>();
    let logit_errors = ActivationFunction::Softmax.backward(scores, scores, &score_errors);

    let mut context_errors = Array1::zeros(context_vector.len());
    let mut transform_errors = UnitErrors {
        weights: transform.weights.zeros_gradient(),
        biases: transform.biases.zeros_gradient(),
        recurrent_weights: None,
    };
    let mut input_errors = Vec::with_capacity(inputs.len());

    for (((x, gate), &alpha), &logit_error) in inputs
        .iter()
        .zip(state.transformed.iter_mut())
        .zip(scores.iter())
        .zip(logit_errors.iter())
    {
        context_errors.scaled_add(logit_error, gate.values());

        let activated_errors = context_vector.mapv(|cv| cv * logit_error);
        gate.assign_errors(activated_errors * &gate.derivative(TANH))?;

        let step = params_gradients(transform, gate.errors(), InputView::Dense(x.view()), None);
        transform_errors.weights.add_assign(&step.weights)?;
        transform_errors.biases.add_assign(&step.biases)?;

        input_errors.push(g * alpha + gate.input_errors(transform)?);
    }

    Ok(MultiBackwardOutput {
        units: vec![transform_errors],
        context_vector: Some(Gradient::Dense(context_errors.into_dyn())),
        input_errors,
    })
}
