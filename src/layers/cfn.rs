//! Chaos-free network layer.
//!
//! ```text
//! η = σ(Wi·x + bi + Wri·y_prev)      θ = σ(Wf·x + bf + Wrf·y_prev)
//! c = g(Wc·x + bc)
//! y = η ⊙ c + θ ⊙ g(y_prev)
//! ```

use super::unit::GateUnit;
use super::{prev_output, sum_errors, BackwardOutput, Layer};
use crate::activation::ActivationFunction;
use crate::array::{AugmentedArray, InputView};
use crate::error::Result;
use crate::params::{LayerParameters, UnitParams};
use ndarray::Array1;

const SIGMOID: Option<ActivationFunction> = Some(ActivationFunction::Sigmoid);

/// Gates of a CFN layer.
#[derive(Debug, Clone, PartialEq)]
pub struct CfnState {
    /// Input gate `η`
    pub input_gate: GateUnit,
    /// Forget gate `θ`
    pub forget_gate: GateUnit,
    /// Candidate `c`
    pub candidate: GateUnit,
    /// `y_prev` (not activated) and `g(y_prev)` (values)
    pub activated_prev: Option<AugmentedArray>,
}

impl CfnState {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            input_gate: GateUnit::new(size),
            forget_gate: GateUnit::new(size),
            candidate: GateUnit::new(size),
            activated_prev: None,
        }
    }
}

fn units(params: &LayerParameters) -> Result<[&UnitParams; 3]> {
    Ok([
        params.unit("input_gate")?,
        params.unit("forget_gate")?,
        params.unit("candidate")?,
    ])
}

pub(crate) fn forward(
    state: &mut CfnState,
    output: &mut AugmentedArray,
    params: &LayerParameters,
    activation: Option<ActivationFunction>,
    input: InputView<'_>,
    prev: Option<&Layer>,
) -> Result<()> {
    let [input_params, forget_params, candidate_params] = units(params)?;
    let y_prev = prev_output(prev);

    state
        .input_gate
        .forward_activated(input_params, input, y_prev, SIGMOID)?;
    state
        .forget_gate
        .forward_activated(forget_params, input, y_prev, SIGMOID)?;
    state
        .candidate
        .forward_activated(candidate_params, input, None, activation)?;

    let mut y = state.input_gate.values() * state.candidate.values();
    state.activated_prev = match y_prev {
        Some(y_prev) => {
            let mut activated = AugmentedArray::zeros(y_prev.len());
            activated.assign_values(y_prev.clone())?;
            activated.activate(activation)?;
            y += &(state.forget_gate.values() * activated.values());
            Some(activated)
        }
        None => None,
    };
    output.assign_values(y)
}

pub(crate) fn backward(
    state: &mut CfnState,
    output: &mut AugmentedArray,
    params: &LayerParameters,
    activation: Option<ActivationFunction>,
    input: InputView<'_>,
    prev: Option<&Layer>,
    propagate_to_input: bool,
) -> Result<BackwardOutput> {
    let [input_params, forget_params, candidate_params] = units(params)?;
    let y_prev = prev_output(prev);
    let gy = output.errors();

    let input_errors = gy * state.candidate.values() * &state.input_gate.derivative(SIGMOID);
    let candidate_errors =
        gy * state.input_gate.values() * &state.candidate.derivative(activation);
    let (forget_errors, through_prev) = match &state.activated_prev {
        Some(activated) => (
            gy * activated.values() * &state.forget_gate.derivative(SIGMOID),
            Some(
                gy * state.forget_gate.values() * &activated.activation_derivative(activation),
            ),
        ),
        None => (Array1::zeros(gy.len()), None),
    };

    state.input_gate.assign_errors(input_errors)?;
    state.forget_gate.assign_errors(forget_errors)?;
    state.candidate.assign_errors(candidate_errors)?;

    let gates = [
        (&state.input_gate, input_params),
        (&state.forget_gate, forget_params),
        (&state.candidate, candidate_params),
    ];

    let units = gates
        .iter()
        .map(|(gate, unit)| gate.assign_params_gradients(unit, input, y_prev))
        .collect();

    let input_errors = if propagate_to_input {
        Some(sum_errors(
            gates.iter().map(|(gate, unit)| gate.input_errors(unit)),
            input.size(),
        )?)
    } else {
        None
    };

    let recurrent_errors = match (y_prev, through_prev) {
        (Some(_), Some(mut errors)) => {
            errors += &state.input_gate.recurrent_errors(input_params)?;
            errors += &state.forget_gate.recurrent_errors(forget_params)?;
            Some(errors)
        }
        _ => None,
    };

    Ok(BackwardOutput {
        units,
        input_errors,
        recurrent_errors,
    })
}
