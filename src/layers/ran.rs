//! Recurrent additive network layer.
//!
//! ```text
//! i = σ(Wi·x + bi + Wri·y_prev)      f = σ(Wf·x + bf + Wrf·y_prev)
//! c = Wc·x + bc
//! y = g(i ⊙ c + f ⊙ y_prev)
//! ```

use super::unit::GateUnit;
use super::{prev_output, sum_errors, BackwardOutput, Layer};
use crate::activation::ActivationFunction;
use crate::array::{AugmentedArray, InputView};
use crate::error::Result;
use crate::params::{LayerParameters, UnitParams};
use ndarray::Array1;

const SIGMOID: Option<ActivationFunction> = Some(ActivationFunction::Sigmoid);

/// Gates of a RAN layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RanState {
    /// Input gate `i`
    pub input_gate: GateUnit,
    /// Forget gate `f`
    pub forget_gate: GateUnit,
    /// Linear candidate `c`
    pub candidate: GateUnit,
}

impl RanState {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            input_gate: GateUnit::new(size),
            forget_gate: GateUnit::new(size),
            candidate: GateUnit::new(size),
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
    state: &mut RanState,
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
        .forward_activated(candidate_params, input, None, None)?;

    let mut y = state.input_gate.values() * state.candidate.values();
    if let Some(y_prev) = y_prev {
        y += &(state.forget_gate.values() * y_prev);
    }
    output.assign_values(y)?;
    output.activate(activation)
}

pub(crate) fn backward(
    state: &mut RanState,
    output: &mut AugmentedArray,
    params: &LayerParameters,
    activation: Option<ActivationFunction>,
    input: InputView<'_>,
    prev: Option<&Layer>,
    propagate_to_input: bool,
) -> Result<BackwardOutput> {
    output.activation_backward(activation);

    let [input_params, forget_params, candidate_params] = units(params)?;
    let y_prev = prev_output(prev);
    let g = output.errors();

    let input_errors = g * state.candidate.values() * &state.input_gate.derivative(SIGMOID);
    let forget_errors = match y_prev {
        Some(y_prev) => g * y_prev * &state.forget_gate.derivative(SIGMOID),
        None => Array1::zeros(g.len()),
    };
    let candidate_errors = g * state.input_gate.values();

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

    let recurrent_errors = match y_prev {
        Some(_) => {
            let mut errors = g * state.forget_gate.values();
            errors += &state.input_gate.recurrent_errors(input_params)?;
            errors += &state.forget_gate.recurrent_errors(forget_params)?;
            Some(errors)
        }
        None => None,
    };

    Ok(BackwardOutput {
        units,
        input_errors,
        recurrent_errors,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::{gradient_check, layer_and_params};
    use super::super::{LayerPeers, LayerState, LayerType};
    use crate::array::InputArray;
    use ndarray::arr1;

    #[test]
    fn test_gradients_match_finite_differences() {
        gradient_check(LayerType::Ran);
    }

    #[test]
    fn test_forget_gate_errors_are_zero_without_previous_state() {
        let (mut layer, params) = layer_and_params(LayerType::Ran, 3, 2);
        let x = InputArray::Dense(arr1(&[0.2, 0.4, -0.6]));
        layer
            .forward(&params, x.view(), LayerPeers::default(), None)
            .unwrap();
        layer.assign_output_errors(&arr1(&[1.0, -1.0])).unwrap();
        layer
            .backward(&params, x.view(), LayerPeers::default(), false)
            .unwrap();

        match layer.state() {
            LayerState::Ran(state) => {
                assert!(state.forget_gate.errors().iter().all(|&e| e == 0.0));
            }
            _ => unreachable!(),
        }
    }
}
