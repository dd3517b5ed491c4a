//! Simple recurrent layer: `y = f(W·x + b + Wrec·y_prev)`.

use super::unit::{affine, params_gradients};
use super::{prev_output, BackwardOutput, Layer};
use crate::activation::ActivationFunction;
use crate::array::{AugmentedArray, InputView};
use crate::error::Result;
use crate::params::LayerParameters;

pub(crate) fn forward(
    output: &mut AugmentedArray,
    params: &LayerParameters,
    activation: Option<ActivationFunction>,
    input: InputView<'_>,
    prev: Option<&Layer>,
) -> Result<()> {
    let unit = params.unit("unit")?;
    let mut values = affine(unit, input)?;
    if let Some(y_prev) = prev_output(prev) {
        values += &unit.w_rec()?.dot(y_prev);
    }
    output.assign_values(values)?;
    output.activate(activation)
}

pub(crate) fn backward(
    output: &mut AugmentedArray,
    params: &LayerParameters,
    activation: Option<ActivationFunction>,
    input: InputView<'_>,
    prev: Option<&Layer>,
    propagate_to_input: bool,
) -> Result<BackwardOutput> {
    output.activation_backward(activation);

    let unit = params.unit("unit")?;
    let errors = output.errors();
    let y_prev = prev_output(prev);

    Ok(BackwardOutput {
        units: vec![params_gradients(unit, errors, input, y_prev)],
        input_errors: if propagate_to_input {
            Some(unit.w()?.t().dot(errors))
        } else {
            None
        },
        recurrent_errors: match y_prev {
            Some(_) => Some(unit.w_rec()?.t().dot(errors)),
            None => None,
        },
    })
}
