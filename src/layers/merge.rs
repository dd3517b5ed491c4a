//! Merge layers: combine several arrays of the same step into one.
//!
//! A merge has no parameters. Its inputs all have the size of the layer
//! input; a concatenation of `k` inputs produces `k` times that size, the
//! other kinds produce the input size.

use crate::activation::ActivationFunction;
use crate::array::AugmentedArray;
use crate::error::{NetworkError, Result};
use ndarray::{s, Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// How the inputs are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergeType {
    /// Concatenation in input order
    Concat,
    /// Element-wise sum
    Sum,
    /// Element-wise average
    Avg,
    /// Element-wise product
    Product,
    /// Difference of exactly two inputs
    Sub,
}

impl MergeType {
    /// Size of the merged array of `count` inputs of size `input_size`.
    pub fn output_size(&self, input_size: usize, count: usize) -> usize {
        match self {
            MergeType::Concat => input_size * count,
            _ => input_size,
        }
    }
}

pub(crate) fn forward(
    merge_type: MergeType,
    output: &mut AugmentedArray,
    activation: Option<ActivationFunction>,
    inputs: &[ArrayView1<'_, f64>],
) -> Result<()> {
    check_inputs(merge_type, output.size(), inputs)?;

    let merged = match merge_type {
        MergeType::Concat => {
            let mut merged = Vec::with_capacity(output.size());
            for x in inputs {
                merged.extend(x.iter().copied());
            }
            Array1::from(merged)
        }
        MergeType::Sum => sum(inputs),
        MergeType::Avg => sum(inputs) / inputs.len() as f64,
        MergeType::Product => inputs[1..]
            .iter()
            .fold(inputs[0].to_owned(), |acc, x| acc * x),
        MergeType::Sub => &inputs[0] - &inputs[1],
    };

    output.assign_values(merged)?;
    output.activate(activation)
}

/// Errors of each input given the output errors.
pub(crate) fn backward(
    merge_type: MergeType,
    output: &mut AugmentedArray,
    activation: Option<ActivationFunction>,
    inputs: &[ArrayView1<'_, f64>],
) -> Result<Vec<Array1<f64>>> {
    check_inputs(merge_type, output.size(), inputs)?;
    output.activation_backward(activation);
    let g = output.errors();
    let n = inputs.len();

    Ok(match merge_type {
        MergeType::Concat => {
            let size = inputs[0].len();
            (0..n)
                .map(|i| g.slice(s![i * size..(i + 1) * size]).to_owned())
                .collect()
        }
        MergeType::Sum => vec![g.clone(); n],
        MergeType::Avg => vec![g / n as f64; n],
        MergeType::Product => (0..n)
            .map(|i| {
                inputs
                    .iter()
                    .enumerate()
                    .filter(|&(j, _)| j != i)
                    .fold(g.clone(), |acc, (_, x)| acc * x)
            })
            .collect(),
        MergeType::Sub => vec![g.clone(), -g],
    })
}

fn check_inputs(merge_type: MergeType, output_size: usize, inputs: &[ArrayView1<'_, f64>]) -> Result<()> {
    if inputs.is_empty() {
        return Err(NetworkError::architecture("A merge layer needs at least one input"));
    }
    if merge_type == MergeType::Sub && inputs.len() != 2 {
        return Err(NetworkError::architecture(format!(
            "A Sub merge needs exactly 2 inputs, got {}",
            inputs.len()
        )));
    }
    let size = inputs[0].len();
    if let Some(other) = inputs.iter().find(|x| x.len() != size) {
        return Err(NetworkError::size_mismatch("merge input", size, other.len()));
    }
    let merged = merge_type.output_size(size, inputs.len());
    if merged != output_size {
        return Err(NetworkError::size_mismatch("merged output", output_size, merged));
    }
    Ok(())
}

fn sum(inputs: &[ArrayView1<'_, f64>]) -> Array1<f64> {
    inputs[1..]
        .iter()
        .fold(inputs[0].to_owned(), |acc, x| acc + x)
}

#[cfg(test)]
mod tests {
    use super::super::{Layer, LayerInterface, LayerPeers, LayerType};
    use super::*;
    use crate::array::InputArray;
    use crate::params::StackedParams;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    fn merge_layer(
        merge_type: MergeType,
        input: usize,
        output: usize,
        activation: Option<ActivationFunction>,
    ) -> (Layer, StackedParams) {
        let mut output = LayerInterface::new(output).with_connection(LayerType::Merge(merge_type));
        output.activation = activation;
        let interfaces = vec![LayerInterface::new(input), output];
        let params = StackedParams::new(&interfaces).unwrap();
        (Layer::new(&interfaces[0], &interfaces[1]).unwrap(), params)
    }

    fn dense(values: &[Array1<f64>]) -> Vec<InputArray> {
        values.iter().cloned().map(InputArray::Dense).collect()
    }

    #[test]
    fn test_concat_splits_errors() {
        let (mut layer, params) = merge_layer(MergeType::Concat, 2, 4, None);
        let inputs = dense(&[arr1(&[1.0, 2.0]), arr1(&[3.0, 4.0])]);

        layer
            .forward_inputs(&params.layers[0], &inputs, LayerPeers::default(), None)
            .unwrap();
        assert_eq!(layer.output().values(), &arr1(&[1.0, 2.0, 3.0, 4.0]));

        layer.assign_output_errors(&arr1(&[0.1, 0.2, 0.3, 0.4])).unwrap();
        let errors = layer
            .backward_inputs(&params.layers[0], &inputs, LayerPeers::default(), true)
            .unwrap()
            .unwrap();
        assert_eq!(errors, vec![arr1(&[0.1, 0.2]), arr1(&[0.3, 0.4])]);
        assert!(layer.params_errors(&params.layers[0]).unwrap().is_empty());
    }

    #[test]
    fn test_product_errors() {
        let (mut layer, params) = merge_layer(MergeType::Product, 2, 2, None);
        let inputs = dense(&[arr1(&[2.0, 0.0]), arr1(&[3.0, 4.0]), arr1(&[0.5, 1.0])]);

        layer
            .forward_inputs(&params.layers[0], &inputs, LayerPeers::default(), None)
            .unwrap();
        assert_eq!(layer.output().values(), &arr1(&[3.0, 0.0]));

        layer.assign_output_errors(&arr1(&[1.0, 1.0])).unwrap();
        let errors = layer
            .backward_inputs(&params.layers[0], &inputs, LayerPeers::default(), true)
            .unwrap()
            .unwrap();
        assert_eq!(errors[0], arr1(&[1.5, 4.0]));
        assert_eq!(errors[1], arr1(&[1.0, 0.0]));
        assert_eq!(errors[2], arr1(&[6.0, 0.0]));
    }

    #[test]
    fn test_avg_and_sub() {
        let inputs = dense(&[arr1(&[1.0, 3.0]), arr1(&[3.0, 5.0])]);

        let (mut avg, params) = merge_layer(MergeType::Avg, 2, 2, None);
        avg.forward_inputs(&params.layers[0], &inputs, LayerPeers::default(), None)
            .unwrap();
        assert_eq!(avg.output().values(), &arr1(&[2.0, 4.0]));
        avg.assign_output_errors(&arr1(&[1.0, -1.0])).unwrap();
        let errors = avg
            .backward_inputs(&params.layers[0], &inputs, LayerPeers::default(), true)
            .unwrap()
            .unwrap();
        assert_abs_diff_eq!(errors[1][1], -0.5, epsilon = 1e-12);

        let (mut sub, params) = merge_layer(MergeType::Sub, 2, 2, Some(ActivationFunction::Tanh));
        sub.forward_inputs(&params.layers[0], &inputs, LayerPeers::default(), None)
            .unwrap();
        let output = sub.output().values().clone();
        assert_abs_diff_eq!(output[0], (-2.0_f64).tanh(), epsilon = 1e-12);

        sub.assign_output_errors(&arr1(&[1.0, 1.0])).unwrap();
        let errors = sub
            .backward_inputs(&params.layers[0], &inputs, LayerPeers::default(), true)
            .unwrap()
            .unwrap();
        assert_abs_diff_eq!(errors[0][0], 1.0 - output[0].powi(2), epsilon = 1e-12);
        assert_abs_diff_eq!(errors[1][0], -(1.0 - output[0].powi(2)), epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_inputs() {
        let (mut sum, params) = merge_layer(MergeType::Sum, 2, 2, None);
        let short = dense(&[arr1(&[1.0, 3.0]), arr1(&[3.0])]);
        assert!(matches!(
            sum.forward_inputs(&params.layers[0], &short, LayerPeers::default(), None),
            Err(NetworkError::DimensionMismatch { .. })
        ));

        let (mut sub, params) = merge_layer(MergeType::Sub, 2, 2, None);
        let single = dense(&[arr1(&[1.0, 3.0])]);
        assert!(sub
            .forward_inputs(&params.layers[0], &single, LayerPeers::default(), None)
            .is_err());
        assert!(sub
            .backward_inputs(&params.layers[0], &single, LayerPeers::default(), true)
            .is_err());

        let (mut concat, params) = merge_layer(MergeType::Concat, 2, 4, None);
        let three = dense(&[arr1(&[1.0, 3.0]), arr1(&[3.0, 1.0]), arr1(&[0.0, 0.0])]);
        assert!(matches!(
            concat.forward_inputs(&params.layers[0], &three, LayerPeers::default(), None),
            Err(NetworkError::DimensionMismatch { .. })
        ));

        let sparse = vec![InputArray::sparse_binary(2, vec![1]).unwrap(), InputArray::Dense(arr1(&[0.0, 1.0]))];
        assert!(concat
            .forward_inputs(&params.layers[0], &sparse, LayerPeers::default(), None)
            .is_err());
    }
}
