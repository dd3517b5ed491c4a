//! Gated recurrent unit layer.
//!
//! ```text
//! r = σ(Wr·x + br + Wrr·y_prev)      p = σ(Wp·x + bp + Wrp·y_prev)
//! c = g(Wc·x + bc + Wrc·(r ⊙ y_prev))
//! y = p ⊙ c + (1 - p) ⊙ y_prev
//! ```

use super::unit::{params_gradients, GateUnit};
use super::{prev_output, sum_errors, BackwardOutput, Layer};
use crate::activation::ActivationFunction;
use crate::array::{AugmentedArray, InputView};
use crate::error::Result;
use crate::params::{LayerParameters, UnitParams};
use ndarray::Array1;

const SIGMOID: Option<ActivationFunction> = Some(ActivationFunction::Sigmoid);

/// Gates of a GRU layer.
#[derive(Debug, Clone, PartialEq)]
pub struct GruState {
    /// Candidate `c`
    pub candidate: GateUnit,
    /// Reset gate `r`
    pub reset_gate: GateUnit,
    /// Partition gate `p`
    pub partition_gate: GateUnit,
}

impl GruState {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            candidate: GateUnit::new(size),
            reset_gate: GateUnit::new(size),
            partition_gate: GateUnit::new(size),
        }
    }
}

fn units(params: &LayerParameters) -> Result<[&UnitParams; 3]> {
    Ok([
        params.unit("candidate")?,
        params.unit("reset_gate")?,
        params.unit("partition_gate")?,
    ])
}

pub(crate) fn forward(
    state: &mut GruState,
    output: &mut AugmentedArray,
    params: &LayerParameters,
    activation: Option<ActivationFunction>,
    input: InputView<'_>,
    prev: Option<&Layer>,
) -> Result<()> {
    let [candidate_params, reset_params, partition_params] = units(params)?;
    let y_prev = prev_output(prev);

    state
        .reset_gate
        .forward_activated(reset_params, input, y_prev, SIGMOID)?;
    state
        .partition_gate
        .forward_activated(partition_params, input, y_prev, SIGMOID)?;

    let reset_prev = y_prev.map(|y_prev| state.reset_gate.values() * y_prev);
    state
        .candidate
        .forward_activated(candidate_params, input, reset_prev.as_ref(), activation)?;

    let p = state.partition_gate.values();
    let mut y = p * state.candidate.values();
    if let Some(y_prev) = y_prev {
        y += &(p.mapv(|p| 1.0 - p) * y_prev);
    }
    output.assign_values(y)
}

pub(crate) fn backward(
    state: &mut GruState,
    output: &mut AugmentedArray,
    params: &LayerParameters,
    activation: Option<ActivationFunction>,
    input: InputView<'_>,
    prev: Option<&Layer>,
    propagate_to_input: bool,
) -> Result<BackwardOutput> {
    let [candidate_params, reset_params, partition_params] = units(params)?;
    let y_prev = prev_output(prev);
    let gy = output.errors();

    let p = state.partition_gate.values().clone();
    let r = state.reset_gate.values().clone();

    let partition_errors = match y_prev {
        Some(y_prev) => gy * &(state.candidate.values() - y_prev),
        None => gy * state.candidate.values(),
    } * &state.partition_gate.derivative(SIGMOID);
    let candidate_errors = gy * &p * &state.candidate.derivative(activation);
    state.candidate.assign_errors(candidate_errors)?;

    let reset_errors = match y_prev {
        Some(y_prev) => {
            state.candidate.recurrent_errors(candidate_params)?
                * y_prev
                * &state.reset_gate.derivative(SIGMOID)
        }
        None => Array1::zeros(p.len()),
    };
    state.partition_gate.assign_errors(partition_errors)?;
    state.reset_gate.assign_errors(reset_errors)?;

    let reset_prev = y_prev.map(|y_prev| &r * y_prev);
    let units = vec![
        params_gradients(
            candidate_params,
            state.candidate.errors(),
            input,
            reset_prev.as_ref(),
        ),
        state
            .reset_gate
            .assign_params_gradients(reset_params, input, y_prev),
        state
            .partition_gate
            .assign_params_gradients(partition_params, input, y_prev),
    ];

    let gates = [
        (&state.candidate, candidate_params),
        (&state.reset_gate, reset_params),
        (&state.partition_gate, partition_params),
    ];

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
            let mut errors = gy * &p.mapv(|p| 1.0 - p);
            errors += &state.partition_gate.recurrent_errors(partition_params)?;
            errors += &state.reset_gate.recurrent_errors(reset_params)?;
            errors += &(state.candidate.recurrent_errors(candidate_params)? * &r);
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
