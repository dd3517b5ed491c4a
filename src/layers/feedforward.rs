//! Feedforward layer: `y = f(W·x + b)`.

use super::unit::{affine, params_gradients};
use super::BackwardOutput;
use crate::activation::ActivationFunction;
use crate::array::{me_prop_mask, AugmentedArray, InputView};
use crate::error::{NetworkError, Result};
use crate::params::{LayerParameters, UnitParams};
use ndarray::{Array1, Zip};

fn unit(params: &LayerParameters) -> Result<&UnitParams> {
    params.unit("unit")
}

pub(crate) fn forward(
    output: &mut AugmentedArray,
    params: &LayerParameters,
    activation: Option<ActivationFunction>,
    input: InputView<'_>,
) -> Result<()> {
    output.assign_values(affine(unit(params)?, input)?)?;
    output.activate(activation)
}

pub(crate) fn backward(
    output: &mut AugmentedArray,
    params: &LayerParameters,
    activation: Option<ActivationFunction>,
    me_prop_k: Option<usize>,
    input: InputView<'_>,
    propagate_to_input: bool,
) -> Result<BackwardOutput> {
    output.activation_backward(activation);
    if let Some(k) = me_prop_k {
        let masked = me_prop_mask(output.errors(), k);
        output.assign_errors(masked)?;
    }

    let unit = unit(params)?;
    let errors = output.errors();

    Ok(BackwardOutput {
        units: vec![params_gradients(unit, errors, input, None)],
        input_errors: if propagate_to_input {
            Some(unit.w()?.t().dot(errors))
        } else {
            None
        },
        recurrent_errors: None,
    })
}

/// ε-rule layer-wise relevance propagation.
///
/// `R_j = x_j · Σ_i W_ij · R_i / (z_i + ε·sign(z_i))` where `z` is the
/// pre-activation output.
pub(crate) fn relevance(
    output: &AugmentedArray,
    params: &LayerParameters,
    input: InputView<'_>,
    epsilon: f64,
) -> Result<Array1<f64>> {
    let relevance = output.relevance().ok_or_else(|| {
        NetworkError::propagation("The output relevance must be assigned before propagation")
    })?;

    let ratios = Zip::from(relevance)
        .and(output.not_activated())
        .map_collect(|&r, &z| r / (z + epsilon.copysign(z)));

    Ok(input.to_dense() * unit(params)?.w()?.t().dot(&ratios))
}

#[cfg(test)]
mod tests {
    use super::super::{Layer, LayerInterface, LayerPeers, LayerType};
    use crate::array::InputArray;
    use crate::params::{Gradient, StackedParams};
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2, Array1};

    fn layer(me_prop_k: Option<usize>) -> (Layer, crate::params::LayerParameters) {
        let mut output = LayerInterface::new(3).with_connection(LayerType::Feedforward);
        output.me_prop_k = me_prop_k;
        let interfaces = [LayerInterface::new(2), output];

        let mut params = StackedParams::new(&interfaces).unwrap();
        params.layers[0].units[0].weights.values =
            arr2(&[[0.5, -1.0], [0.25, 0.75], [-0.5, 0.5]]).into_dyn();
        (
            Layer::new(&interfaces[0], &interfaces[1]).unwrap(),
            params.layers.remove(0),
        )
    }

    #[test]
    fn test_me_prop_keeps_top_k_errors() {
        let (mut layer, params) = layer(Some(1));
        let x = InputArray::Dense(arr1(&[1.0, 2.0]));
        layer
            .forward(&params, x.view(), LayerPeers::default(), None)
            .unwrap();
        layer.assign_output_errors(&arr1(&[0.1, -0.7, 0.3])).unwrap();
        let input_errors = layer
            .backward(&params, x.view(), LayerPeers::default(), true)
            .unwrap()
            .unwrap();

        let errors = layer.params_errors(&params).unwrap();
        assert_eq!(
            errors.get("layer0.unit.biases"),
            Some(&Gradient::Dense(arr1(&[0.0, -0.7, 0.0]).into_dyn()))
        );
        assert_abs_diff_eq!(input_errors[0], -0.175, epsilon = 1e-12);
        assert_abs_diff_eq!(input_errors[1], -0.525, epsilon = 1e-12);
    }

    #[test]
    fn test_relevance_is_conserved_without_biases() {
        let (mut layer, params) = layer(None);
        let x = InputArray::Dense(arr1(&[1.0, 2.0]));
        layer
            .forward(&params, x.view(), LayerPeers::default(), None)
            .unwrap();
        let output_relevance = Array1::from(vec![0.2, 0.5, 0.3]);
        layer.assign_output_relevance(output_relevance).unwrap();

        let relevance = layer.propagate_relevance(&params, x.view(), 1e-9).unwrap();
        assert_abs_diff_eq!(relevance.sum(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_relevance_requires_output_relevance() {
        let (mut layer, params) = layer(None);
        let x = InputArray::Dense(arr1(&[1.0, 2.0]));
        layer
            .forward(&params, x.view(), LayerPeers::default(), None)
            .unwrap();
        assert!(layer.propagate_relevance(&params, x.view(), 0.01).is_err());
    }
}
