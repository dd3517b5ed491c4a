//! Processor of a single structure.

use super::{processor_rng, NeuralProcessor};
use crate::array::InputArray;
use crate::error::{NetworkError, Result};
use crate::layers::LayerInterface;
use crate::params::{ParamsErrors, StackedParams};
use crate::structure::{ContextWindow, StackedLayers};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::RngCore;

/// Forward and backward of one example at a time.
#[derive(Debug, Clone)]
pub struct FeedforwardProcessor {
    id: usize,
    structure: StackedLayers,
    propagate_to_input: bool,
    rng: StdRng,
    params_errors: Option<ParamsErrors>,
}

impl FeedforwardProcessor {
    /// Create a processor for the layers described by `interfaces`.
    ///
    /// `seed` makes dropout reproducible.
    pub fn new(
        id: usize,
        interfaces: &[LayerInterface],
        propagate_to_input: bool,
        seed: Option<u64>,
    ) -> Result<Self> {
        let structure = StackedLayers::new(interfaces)?;
        log::debug!(
            "Feedforward processor {} created with {} layers",
            id,
            structure.len()
        );
        Ok(Self {
            id,
            structure,
            propagate_to_input,
            rng: processor_rng(seed),
            params_errors: None,
        })
    }

    /// Underlying structure.
    pub fn structure(&self) -> &StackedLayers {
        &self.structure
    }

    /// Whether backward computes the errors of the features.
    pub fn propagates_to_input(&self) -> bool {
        self.propagate_to_input
    }

    /// Forward `features`; dropout is applied when `use_dropout` is set.
    pub fn forward(
        &mut self,
        params: &StackedParams,
        features: InputArray,
        use_dropout: bool,
    ) -> Result<&Array1<f64>> {
        self.forward_inputs(params, vec![features], use_dropout)
    }

    /// Forward the feature arrays of a merge or attention first layer.
    pub fn forward_inputs(
        &mut self,
        params: &StackedParams,
        inputs: Vec<InputArray>,
        use_dropout: bool,
    ) -> Result<&Array1<f64>> {
        self.params_errors = None;
        let rng = if use_dropout {
            Some(&mut self.rng as &mut dyn RngCore)
        } else {
            None
        };
        self.structure
            .forward_inputs(params, inputs, ContextWindow::empty(), rng)
    }

    /// Backward `output_errors` and compute the gradients.
    pub fn backward(&mut self, params: &StackedParams, output_errors: &Array1<f64>) -> Result<()> {
        self.structure.backward(
            params,
            output_errors,
            ContextWindow::empty(),
            self.propagate_to_input,
        )?;
        self.params_errors = Some(self.structure.params_errors(params)?);
        Ok(())
    }

    /// Output of the last forward.
    pub fn output(&self) -> Result<&Array1<f64>> {
        self.structure.output()
    }

    /// Errors of the features of the last backward.
    pub fn input_errors(&self) -> Result<&Array1<f64>> {
        self.structure.input_errors().ok_or_else(|| {
            NetworkError::propagation(format!(
                "Processor {} has no input errors: backward was not called or does not propagate to the input",
                self.id
            ))
        })
    }

    /// Errors of every feature array of the last backward.
    pub fn inputs_errors(&self) -> Result<&[Array1<f64>]> {
        self.structure.inputs_errors().ok_or_else(|| {
            NetworkError::propagation(format!(
                "Processor {} has no input errors: backward was not called or does not propagate to the input",
                self.id
            ))
        })
    }

    /// Relevance of the features w.r.t. `output_relevance`.
    pub fn propagate_relevance(
        &mut self,
        params: &StackedParams,
        output_relevance: Array1<f64>,
        epsilon: f64,
    ) -> Result<Array1<f64>> {
        self.structure
            .propagate_relevance(params, output_relevance, epsilon)
    }
}

impl NeuralProcessor for FeedforwardProcessor {
    fn id(&self) -> usize {
        self.id
    }

    fn params_errors(&self) -> Result<&ParamsErrors> {
        self.params_errors.as_ref().ok_or_else(|| {
            NetworkError::propagation(format!(
                "Processor {} has no params errors: backward was not called",
                self.id
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use crate::layers::LayerType;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2};

    fn interfaces() -> Vec<LayerInterface> {
        vec![
            LayerInterface::new(4),
            LayerInterface::new(5)
                .with_connection(LayerType::Feedforward)
                .with_activation(ActivationFunction::Tanh),
            LayerInterface::new(3).with_connection(LayerType::Feedforward),
        ]
    }

    fn params() -> StackedParams {
        let mut params = StackedParams::new(&interfaces()).unwrap();

        let hidden = &mut params.layers[0].units[0];
        hidden.weights.values = arr2(&[
            [0.5, 0.6, -0.8, -0.6],
            [0.7, -0.4, 0.1, -0.8],
            [0.7, -0.7, 0.3, 0.5],
            [0.5, 0.0, -0.4, 0.7],
            [-0.3, 0.5, -0.2, -0.9],
        ])
        .into_dyn();
        hidden.biases.values = arr1(&[0.4, -0.3, 0.1, 0.2, -0.5]).into_dyn();

        let output = &mut params.layers[1].units[0];
        output.weights.values = arr2(&[
            [-0.4, -0.1, 0.6, -0.5, 0.3],
            [0.2, 0.6, -0.3, 0.5, -0.9],
            [0.8, -0.5, 0.3, -0.2, 0.4],
        ])
        .into_dyn();
        output.biases.values = arr1(&[0.3, -0.2, 0.1]).into_dyn();

        params
    }

    fn assert_close(actual: &Array1<f64>, expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, b) in actual.iter().zip(expected) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_forward_and_backward() {
        let params = params();
        let mut processor = FeedforwardProcessor::new(0, &interfaces(), true, None).unwrap();

        // Expected values recomputed from the weights of this fixture
        let output = processor
            .forward(&params, arr1(&[-0.8, -0.9, -0.9, 1.0]).into(), false)
            .unwrap();
        assert_close(output, &[0.159430, 0.227355, -0.157892]);

        processor
            .backward(&params, &arr1(&[-0.4, -0.4, -0.3]))
            .unwrap();
        assert_close(
            processor.input_errors().unwrap(),
            &[-0.192796, 0.061600, 0.035544, -0.000660],
        );

        let errors = processor.params_errors().unwrap();
        assert_eq!(errors.len(), 4);
        let hidden_biases = errors.get("layer0.unit.biases").unwrap().to_dense();
        let expected = [-0.134791, -0.011000, -0.179684, 0.030914, 0.024592];
        for (a, b) in hidden_biases.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_no_input_errors_unless_requested() {
        let params = params();
        let mut processor = FeedforwardProcessor::new(1, &interfaces(), false, None).unwrap();
        processor
            .forward(&params, arr1(&[-0.8, -0.9, -0.9, 1.0]).into(), false)
            .unwrap();
        processor
            .backward(&params, &arr1(&[-0.4, -0.4, -0.3]))
            .unwrap();
        assert!(processor.input_errors().is_err());
        assert!(processor.params_errors().is_ok());
        assert_eq!(processor.id(), 1);
    }

    #[test]
    fn test_params_errors_cleared_by_forward() {
        let params = params();
        let mut processor = FeedforwardProcessor::new(0, &interfaces(), false, None).unwrap();
        let x = arr1(&[0.1, 0.2, 0.3, 0.4]);
        processor.forward(&params, x.clone().into(), false).unwrap();
        processor.backward(&params, &arr1(&[1.0, 0.0, 0.0])).unwrap();
        processor.forward(&params, x.into(), false).unwrap();
        assert!(processor.params_errors().is_err());
    }

    #[test]
    fn test_sum_merge_inputs() {
        let interfaces = vec![
            LayerInterface::new(2),
            LayerInterface::new(2).with_connection(LayerType::Merge(crate::layers::MergeType::Sum)),
            LayerInterface::new(1).with_connection(LayerType::Feedforward),
        ];
        let mut params = StackedParams::new(&interfaces).unwrap();
        params.layers[1].units[0].weights.values = arr2(&[[2.0, -1.0]]).into_dyn();
        let mut processor = FeedforwardProcessor::new(0, &interfaces, true, None).unwrap();

        let inputs = vec![arr1(&[1.0, 2.0]).into(), arr1(&[0.5, 0.5]).into(), arr1(&[0.0, 1.0]).into()];
        let output = processor.forward_inputs(&params, inputs, false).unwrap();
        assert_close(output, &[2.0 * 1.5 - 3.5]);

        processor.backward(&params, &arr1(&[1.0])).unwrap();
        let errors = processor.inputs_errors().unwrap();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| *e == arr1(&[2.0, -1.0])));
        assert!(processor.params_errors().unwrap().get("layer0.unit.weights").is_none());
    }

    #[test]
    fn test_dropout_is_seeded() {
        let interfaces = vec![
            LayerInterface::new(4),
            LayerInterface::new(5)
                .with_connection(LayerType::Feedforward)
                .with_dropout(0.5),
        ];
        let params = StackedParams::new(&interfaces).unwrap();
        let x = arr1(&[1.0, 2.0, 3.0, 4.0]);

        let run = || {
            let mut processor = FeedforwardProcessor::new(0, &interfaces, false, Some(3)).unwrap();
            processor.forward(&params, x.clone().into(), true).unwrap();
            processor.structure().layers()[0].clone()
        };
        assert_eq!(run(), run());
    }
}
