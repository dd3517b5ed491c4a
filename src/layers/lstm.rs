//! Long short-term memory layer.
//!
//! ```text
//! i = σ(Wi·x + bi + Wri·y_prev)      o = σ(Wo·x + bo + Wro·y_prev)
//! f = σ(Wf·x + bf + Wrf·y_prev)      c̃ = tanh(Wc·x + bc + Wrc·y_prev)
//! c = i ⊙ c̃ + f ⊙ c_prev             y = o ⊙ g(c)
//! ```
//!
//! `g` is the activation of the layer. The cell error of the next step
//! flows back into this step's cell through the next forget gate.

use super::unit::GateUnit;
use super::{prev_output, sum_errors, BackwardOutput, Layer, LayerPeers, LayerState};
use crate::activation::ActivationFunction;
use crate::array::{AugmentedArray, InputView};
use crate::error::{NetworkError, Result};
use crate::params::{LayerParameters, UnitParams};
use ndarray::Array1;

const SIGMOID: Option<ActivationFunction> = Some(ActivationFunction::Sigmoid);
const TANH: Option<ActivationFunction> = Some(ActivationFunction::Tanh);

/// Gates and cell of an LSTM layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LstmState {
    /// Input gate `i`
    pub input_gate: GateUnit,
    /// Output gate `o`
    pub output_gate: GateUnit,
    /// Forget gate `f`
    pub forget_gate: GateUnit,
    /// Candidate `c̃`
    pub candidate: GateUnit,
    /// Cell `c` (not activated) and `g(c)` (values)
    pub cell: AugmentedArray,
}

impl LstmState {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            input_gate: GateUnit::new(size),
            output_gate: GateUnit::new(size),
            forget_gate: GateUnit::new(size),
            candidate: GateUnit::new(size),
            cell: AugmentedArray::zeros(size),
        }
    }
}

fn peer(layer: &Layer) -> Result<&LstmState> {
    match layer.state() {
        LayerState::Lstm(state) => Ok(state),
        _ => Err(NetworkError::propagation(format!(
            "An LSTM layer cannot use a {} peer",
            layer.layer_type().name()
        ))),
    }
}

fn units(params: &LayerParameters) -> Result<[&UnitParams; 4]> {
    Ok([
        params.unit("input_gate")?,
        params.unit("output_gate")?,
        params.unit("forget_gate")?,
        params.unit("candidate")?,
    ])
}

pub(crate) fn forward(
    state: &mut LstmState,
    output: &mut AugmentedArray,
    params: &LayerParameters,
    activation: Option<ActivationFunction>,
    input: InputView<'_>,
    prev: Option<&Layer>,
) -> Result<()> {
    let [input_params, output_params, forget_params, candidate_params] = units(params)?;
    let prev_state = prev.map(peer).transpose()?;
    let y_prev = prev_output(prev);

    for (gate, unit, gate_activation) in [
        (&mut state.input_gate, input_params, SIGMOID),
        (&mut state.output_gate, output_params, SIGMOID),
        (&mut state.forget_gate, forget_params, SIGMOID),
        (&mut state.candidate, candidate_params, TANH),
    ] {
        gate.forward_activated(unit, input, y_prev, gate_activation)?;
    }

    let mut cell = state.input_gate.values() * state.candidate.values();
    if let Some(prev_state) = prev_state {
        cell += &(state.forget_gate.values() * prev_state.cell.not_activated());
    }
    state.cell.assign_values(cell)?;
    state.cell.activate(activation)?;

    output.assign_values(state.output_gate.values() * state.cell.values())
}

pub(crate) fn backward(
    state: &mut LstmState,
    output: &mut AugmentedArray,
    params: &LayerParameters,
    activation: Option<ActivationFunction>,
    input: InputView<'_>,
    peers: LayerPeers<'_>,
    propagate_to_input: bool,
) -> Result<BackwardOutput> {
    let [input_params, output_params, forget_params, candidate_params] = units(params)?;
    let prev_state = peers.prev.map(peer).transpose()?;
    let next_state = peers.next.map(peer).transpose()?;
    let y_prev = prev_output(peers.prev);
    let gy = output.errors();

    let output_errors =
        gy * state.cell.values() * &state.output_gate.derivative(SIGMOID);

    let mut cell_errors =
        gy * state.output_gate.values() * &state.cell.activation_derivative(activation);
    if let Some(next_state) = next_state {
        cell_errors += &(next_state.cell.errors() * next_state.forget_gate.values());
    }

    let input_errors =
        &cell_errors * state.candidate.values() * &state.input_gate.derivative(SIGMOID);
    let forget_errors = match prev_state {
        Some(prev_state) => {
            &cell_errors * prev_state.cell.not_activated() * &state.forget_gate.derivative(SIGMOID)
        }
        None => Array1::zeros(cell_errors.len()),
    };
    let candidate_errors =
        &cell_errors * state.input_gate.values() * &state.candidate.derivative(TANH);

    state.cell.assign_errors(cell_errors)?;
    state.input_gate.assign_errors(input_errors)?;
    state.output_gate.assign_errors(output_errors)?;
    state.forget_gate.assign_errors(forget_errors)?;
    state.candidate.assign_errors(candidate_errors)?;

    let gates = [
        (&state.input_gate, input_params),
        (&state.output_gate, output_params),
        (&state.forget_gate, forget_params),
        (&state.candidate, candidate_params),
    ];

    Ok(BackwardOutput {
        units: gates
            .iter()
            .map(|(gate, unit)| gate.assign_params_gradients(unit, input, y_prev))
            .collect(),
        input_errors: if propagate_to_input {
            Some(sum_errors(
                gates.iter().map(|(gate, unit)| gate.input_errors(unit)),
                input.size(),
            )?)
        } else {
            None
        },
        recurrent_errors: match y_prev {
            Some(y_prev) => Some(sum_errors(
                gates.iter().map(|(gate, unit)| gate.recurrent_errors(unit)),
                y_prev.len(),
            )?),
            None => None,
        },
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
        gradient_check(LayerType::Lstm);
    }

    #[test]
    fn test_forget_gate_errors_are_zero_without_previous_state() {
        let (mut layer, params) = layer_and_params(LayerType::Lstm, 3, 2);
        let x = InputArray::Dense(arr1(&[0.2, 0.4, -0.6]));
        layer
            .forward(&params, x.view(), LayerPeers::default(), None)
            .unwrap();
        layer.assign_output_errors(&arr1(&[1.0, -1.0])).unwrap();
        layer
            .backward(&params, x.view(), LayerPeers::default(), false)
            .unwrap();

        match layer.state() {
            LayerState::Lstm(state) => {
                assert!(state.forget_gate.errors().iter().all(|&e| e == 0.0));
                assert!(state.input_gate.errors().iter().any(|&e| e != 0.0));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_cell_without_previous_state() {
        let (mut layer, params) = layer_and_params(LayerType::Lstm, 3, 2);
        let x = InputArray::Dense(arr1(&[0.2, 0.4, -0.6]));
        layer
            .forward(&params, x.view(), LayerPeers::default(), None)
            .unwrap();

        match layer.state() {
            LayerState::Lstm(state) => {
                let expected = state.input_gate.values() * state.candidate.values();
                assert_eq!(state.cell.not_activated(), &expected);
                let y = state.output_gate.values() * &expected.mapv(f64::tanh);
                for (a, b) in layer.output().values().iter().zip(y.iter()) {
                    assert!((a - b).abs() < 1e-12);
                }
            }
            _ => unreachable!(),
        }
    }
}
