//! Learnable parameters.
//!
//! Every learnable array is a named [`ParamsArray`]. The name is the stable
//! key used by accumulators and optimizers to find a parameter again across
//! calls, e.g. `layer0.input_gate.weights`. Containers always iterate in the
//! same order: for every gate in declaration order its weights and then its
//! recurrent weights, then the context vector of attention layers, followed
//! by the biases of every gate.

pub mod gradient;
pub mod init;

pub use gradient::{Gradient, ParamsErrors, ParamsGradient, SparseGradient, UnitErrors};
pub use init::WeightInitialization;

use crate::error::{NetworkError, Result};
use crate::layers::{LayerInterface, LayerType};
use ndarray::{ArrayD, ArrayView1, ArrayView2, Ix1, Ix2, IxDyn};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Role of a parameter array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamsKind {
    /// Input weights `W`
    Weights,
    /// Recurrent weights `Wrec`
    RecurrentWeights,
    /// Biases `b`
    Biases,
}

/// A named array of learnable values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamsArray {
    /// Stable identifier
    pub name: String,
    /// Role of the array
    pub kind: ParamsKind,
    /// Values
    pub values: ArrayD<f64>,
    /// Whether the array is declared sparse
    pub sparse: bool,
}

impl ParamsArray {
    /// Zero matrix of shape `(rows, cols)`.
    pub fn matrix(name: impl Into<String>, kind: ParamsKind, rows: usize, cols: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            values: ArrayD::zeros(IxDyn(&[rows, cols])),
            sparse: false,
        }
    }

    /// Zero vector of the given size.
    pub fn vector(name: impl Into<String>, kind: ParamsKind, size: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            values: ArrayD::zeros(IxDyn(&[size])),
            sparse: false,
        }
    }

    /// Shape of the values.
    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    /// Number of scalars.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the array holds no scalar.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the array is a weights matrix (input or recurrent).
    pub fn is_weights(&self) -> bool {
        self.kind != ParamsKind::Biases
    }

    /// View as a matrix.
    pub fn as_matrix(&self) -> Result<ArrayView2<'_, f64>> {
        Ok(self.values.view().into_dimensionality::<Ix2>()?)
    }

    /// View as a vector.
    pub fn as_vector(&self) -> Result<ArrayView1<'_, f64>> {
        Ok(self.values.view().into_dimensionality::<Ix1>()?)
    }

    /// Dense zero gradient with the shape of the array.
    pub fn zeros_gradient(&self) -> Gradient {
        Gradient::zeros(self.shape())
    }

    /// Check that `other` has the same shape.
    pub fn check_compatible(&self, other: &ParamsArray) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(NetworkError::dimension_mismatch(
                format!("{} of shape {:?}", self.name, self.shape()),
                format!("{} of shape {:?}", other.name, other.shape()),
            ));
        }
        Ok(())
    }

    /// Copy the values of `other`, which must have the same shape.
    pub fn assign_values(&mut self, other: &ParamsArray) -> Result<()> {
        self.check_compatible(other)?;
        self.values.assign(&other.values);
        Ok(())
    }
}

/// Parameters of one gate unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitParams {
    /// Gate name (`input_gate`, `candidate`, ...)
    pub name: String,
    /// Input weights of shape `(out, in)`
    pub weights: ParamsArray,
    /// Biases of size `out`
    pub biases: ParamsArray,
    /// Recurrent weights of shape `(out, out)`
    pub recurrent_weights: Option<ParamsArray>,
}

impl UnitParams {
    /// Zero-valued unit named `{prefix}.{name}`.
    pub fn new(
        prefix: &str,
        name: &str,
        input_size: usize,
        output_size: usize,
        recurrent: bool,
    ) -> Self {
        let key = format!("{}.{}", prefix, name);
        Self {
            name: name.to_string(),
            weights: ParamsArray::matrix(
                format!("{}.weights", key),
                ParamsKind::Weights,
                output_size,
                input_size,
            ),
            biases: ParamsArray::vector(format!("{}.biases", key), ParamsKind::Biases, output_size),
            recurrent_weights: recurrent.then(|| {
                ParamsArray::matrix(
                    format!("{}.recurrent_weights", key),
                    ParamsKind::RecurrentWeights,
                    output_size,
                    output_size,
                )
            }),
        }
    }

    /// Input weights as a matrix.
    pub fn w(&self) -> Result<ArrayView2<'_, f64>> {
        self.weights.as_matrix()
    }

    /// Biases as a vector.
    pub fn b(&self) -> Result<ArrayView1<'_, f64>> {
        self.biases.as_vector()
    }

    /// Recurrent weights as a matrix.
    pub fn w_rec(&self) -> Result<ArrayView2<'_, f64>> {
        self.recurrent_weights
            .as_ref()
            .ok_or_else(|| {
                NetworkError::architecture(format!("Unit '{}' has no recurrent weights", self.name))
            })?
            .as_matrix()
    }

    fn initialize<R: Rng + ?Sized>(
        &mut self,
        init: &WeightInitialization,
        bias_value: f64,
        rng: &mut R,
    ) -> Result<()> {
        for array in std::iter::once(&mut self.weights).chain(self.recurrent_weights.as_mut()) {
            if array.sparse {
                return Err(NetworkError::configuration(format!(
                    "Cannot randomize the sparse array '{}'",
                    array.name
                )));
            }
            let (rows, cols) = (array.shape()[0], array.shape()[1]);
            array.values = init.initialize_weights(rows, cols, rng)?.into_dyn();
        }
        self.biases.values.fill(bias_value);
        Ok(())
    }
}

/// Parameters of one layer of a stacked structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerParameters {
    /// Kind of layer the parameters belong to
    pub layer_type: LayerType,
    /// Size of the layer input
    pub input_size: usize,
    /// Size of the layer output
    pub output_size: usize,
    /// Whether the layer receives sparse input
    pub sparse_input: bool,
    /// Gate units in declaration order
    pub units: Vec<UnitParams>,
    /// Context vector of an attention layer
    #[serde(default)]
    pub context_vector: Option<ParamsArray>,
}

impl LayerParameters {
    /// Zero-valued parameters with the gate list of `layer_type`.
    pub fn new(
        prefix: &str,
        layer_type: LayerType,
        input_size: usize,
        output_size: usize,
        sparse_input: bool,
    ) -> Self {
        let units = layer_type
            .gates()
            .iter()
            .map(|&(name, recurrent)| UnitParams::new(prefix, name, input_size, output_size, recurrent))
            .collect();
        let context_vector = (layer_type == LayerType::Attention).then(|| {
            ParamsArray::vector(format!("{}.context_vector", prefix), ParamsKind::Weights, output_size)
        });

        Self {
            layer_type,
            input_size,
            output_size,
            sparse_input,
            units,
            context_vector,
        }
    }

    /// Zero-valued attention parameters transforming the inputs into arrays
    /// of `attention_size`.
    pub fn attention(prefix: &str, input_size: usize, attention_size: usize) -> Self {
        Self {
            layer_type: LayerType::Attention,
            input_size,
            output_size: input_size,
            sparse_input: false,
            units: vec![UnitParams::new(prefix, "transform", input_size, attention_size, false)],
            context_vector: Some(ParamsArray::vector(
                format!("{}.context_vector", prefix),
                ParamsKind::Weights,
                attention_size,
            )),
        }
    }

    /// Declare the input weights sparse. Sparse weights cannot be randomized.
    pub fn with_sparse_weights(mut self) -> Self {
        for unit in &mut self.units {
            unit.weights.sparse = true;
        }
        self
    }

    /// Randomize the weights and set every bias to `bias_value`.
    pub fn initialize<R: Rng + ?Sized>(
        &mut self,
        init: &WeightInitialization,
        bias_value: f64,
        rng: &mut R,
    ) -> Result<()> {
        for unit in &mut self.units {
            unit.initialize(init, bias_value, rng)?;
        }
        if let Some(context_vector) = self.context_vector.as_mut() {
            let size = context_vector.len();
            context_vector.values = init
                .initialize_weights(1, size, rng)?
                .into_shape(size)?
                .into_dyn();
        }
        Ok(())
    }

    /// Structurally identical copy with independent storage.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Check that `other` has the same layout, array by array.
    pub fn check_compatible(&self, other: &LayerParameters) -> Result<()> {
        let targets = self.iter();
        let sources = other.iter();
        if self.layer_type != other.layer_type
            || self.units.len() != other.units.len()
            || targets.len() != sources.len()
        {
            return Err(NetworkError::architecture(format!(
                "Cannot assign {:?} parameters to {:?} parameters",
                other.layer_type, self.layer_type
            )));
        }
        for (target, source) in targets.into_iter().zip(sources) {
            target.check_compatible(source)?;
        }
        Ok(())
    }

    /// Copy the values of `other` array-wise.
    ///
    /// Nothing is written unless the whole layout matches.
    pub fn assign_values(&mut self, other: &LayerParameters) -> Result<()> {
        self.check_compatible(other)?;
        for (target, source) in self.iter_mut().into_iter().zip(other.iter()) {
            target.values.assign(&source.values);
        }
        Ok(())
    }

    /// Unit called `name`.
    pub fn unit(&self, name: &str) -> Result<&UnitParams> {
        self.units
            .iter()
            .find(|unit| unit.name == name)
            .ok_or_else(|| {
                NetworkError::architecture(format!(
                    "{:?} layer has no unit '{}'",
                    self.layer_type, name
                ))
            })
    }

    /// All arrays in iteration order.
    pub fn iter(&self) -> Vec<&ParamsArray> {
        let mut arrays = self.weights();
        arrays.extend(self.biases());
        arrays
    }

    /// All arrays in iteration order, mutably.
    pub fn iter_mut(&mut self) -> Vec<&mut ParamsArray> {
        let mut weights = Vec::new();
        let mut biases = Vec::new();
        for unit in &mut self.units {
            weights.push(&mut unit.weights);
            if let Some(recurrent) = unit.recurrent_weights.as_mut() {
                weights.push(recurrent);
            }
            biases.push(&mut unit.biases);
        }
        weights.extend(self.context_vector.as_mut());
        weights.extend(biases);
        weights
    }

    /// Weights and recurrent weights of every unit, then the context vector.
    pub fn weights(&self) -> Vec<&ParamsArray> {
        self.units
            .iter()
            .flat_map(|unit| std::iter::once(&unit.weights).chain(unit.recurrent_weights.as_ref()))
            .chain(self.context_vector.as_ref())
            .collect()
    }

    /// Biases of every unit.
    pub fn biases(&self) -> Vec<&ParamsArray> {
        self.units.iter().map(|unit| &unit.biases).collect()
    }

    /// Name the unit gradients in iteration order.
    ///
    /// Missing recurrent and context vector gradients are filled with zeros.
    pub fn collect_errors(
        &self,
        errors: &[UnitErrors],
        context_vector: Option<&Gradient>,
    ) -> Result<ParamsErrors> {
        if errors.len() != self.units.len() {
            return Err(NetworkError::dimension_mismatch(
                format!("{} unit errors", self.units.len()),
                format!("{} unit errors", errors.len()),
            ));
        }

        let mut params_errors = ParamsErrors::new();
        for (unit, unit_errors) in self.units.iter().zip(errors) {
            params_errors.push(unit.weights.name.clone(), unit_errors.weights.clone());
            if let Some(recurrent) = &unit.recurrent_weights {
                let gradient = unit_errors
                    .recurrent_weights
                    .clone()
                    .unwrap_or_else(|| recurrent.zeros_gradient());
                params_errors.push(recurrent.name.clone(), gradient);
            }
        }
        if let Some(array) = &self.context_vector {
            let gradient = context_vector
                .cloned()
                .unwrap_or_else(|| array.zeros_gradient());
            params_errors.push(array.name.clone(), gradient);
        }
        for (unit, unit_errors) in self.units.iter().zip(errors) {
            params_errors.push(unit.biases.name.clone(), unit_errors.biases.clone());
        }

        Ok(params_errors)
    }

    /// Number of learnable scalars.
    pub fn parameter_count(&self) -> usize {
        self.iter().iter().map(|array| array.len()).sum()
    }
}

/// Parameters of a stacked structure, one entry per layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackedParams {
    /// Layer parameters in index order
    pub layers: Vec<LayerParameters>,
}

impl StackedParams {
    /// Zero-valued parameters for the layers described by `interfaces`.
    ///
    /// Layer `i` reads `interfaces[i]` and produces `interfaces[i + 1]`,
    /// whose connection type selects the gate list.
    pub fn new(interfaces: &[LayerInterface]) -> Result<Self> {
        crate::layers::validate_interfaces(interfaces)?;

        let layers = interfaces
            .windows(2)
            .enumerate()
            .map(|(index, pair)| {
                let connection = pair[1].connection.ok_or_else(|| {
                    NetworkError::configuration(format!(
                        "Layer interface {} has no connection type",
                        index + 1
                    ))
                })?;
                let prefix = format!("layer{}", index);
                Ok(match (connection, pair[1].attention_size) {
                    (LayerType::Attention, Some(attention_size)) => {
                        LayerParameters::attention(&prefix, pair[0].size, attention_size)
                    }
                    _ => LayerParameters::new(
                        &prefix,
                        connection,
                        pair[0].size,
                        pair[1].size,
                        pair[0].input_type.is_sparse(),
                    ),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { layers })
    }

    /// Randomize every layer.
    pub fn initialize<R: Rng + ?Sized>(
        &mut self,
        init: &WeightInitialization,
        bias_value: f64,
        rng: &mut R,
    ) -> Result<()> {
        for layer in &mut self.layers {
            layer.initialize(init, bias_value, rng)?;
        }
        Ok(())
    }

    /// Structurally identical copy with independent storage.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Check that `other` has the same layout, layer by layer.
    pub fn check_compatible(&self, other: &StackedParams) -> Result<()> {
        if self.layers.len() != other.layers.len() {
            return Err(NetworkError::architecture(format!(
                "Cannot assign {} layers to {} layers",
                other.layers.len(),
                self.layers.len()
            )));
        }
        for (target, source) in self.layers.iter().zip(&other.layers) {
            target.check_compatible(source)?;
        }
        Ok(())
    }

    /// Copy the values of `other` layer-wise.
    ///
    /// Nothing is written unless every layer matches.
    pub fn assign_values(&mut self, other: &StackedParams) -> Result<()> {
        self.check_compatible(other)?;
        for (target, source) in self.layers.iter_mut().zip(&other.layers) {
            target.assign_values(source)?;
        }
        Ok(())
    }

    /// Parameters of layer `index`.
    pub fn layer(&self, index: usize) -> Result<&LayerParameters> {
        self.layers.get(index).ok_or_else(|| {
            NetworkError::architecture(format!("No parameters for layer {}", index))
        })
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether no layer is defined.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// All arrays, layer by layer.
    pub fn iter(&self) -> Vec<&ParamsArray> {
        self.layers.iter().flat_map(|layer| layer.iter()).collect()
    }

    /// All arrays, layer by layer, mutably.
    pub fn iter_mut(&mut self) -> Vec<&mut ParamsArray> {
        self.layers
            .iter_mut()
            .flat_map(|layer| layer.iter_mut())
            .collect()
    }

    /// Weights of every layer.
    pub fn weights(&self) -> Vec<&ParamsArray> {
        self.layers.iter().flat_map(|layer| layer.weights()).collect()
    }

    /// Biases of every layer.
    pub fn biases(&self) -> Vec<&ParamsArray> {
        self.layers.iter().flat_map(|layer| layer.biases()).collect()
    }

    /// Number of learnable scalars.
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.parameter_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use crate::array::InputType;
    use ndarray::Array1;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn biases_from(values: &[f64]) -> ArrayD<f64> {
        Array1::from(values.to_vec()).into_dyn()
    }

    fn lstm_interfaces() -> Vec<LayerInterface> {
        vec![
            LayerInterface::new(3),
            LayerInterface::new(2)
                .with_connection(LayerType::Lstm)
                .with_activation(ActivationFunction::Tanh),
        ]
    }

    #[test]
    fn test_lstm_gate_layout_and_order() {
        let params = StackedParams::new(&lstm_interfaces()).unwrap();
        let names: Vec<&str> = params.iter().iter().map(|a| a.name.as_str()).collect();

        assert_eq!(
            names,
            vec![
                "layer0.input_gate.weights",
                "layer0.input_gate.recurrent_weights",
                "layer0.output_gate.weights",
                "layer0.output_gate.recurrent_weights",
                "layer0.forget_gate.weights",
                "layer0.forget_gate.recurrent_weights",
                "layer0.candidate.weights",
                "layer0.candidate.recurrent_weights",
                "layer0.input_gate.biases",
                "layer0.output_gate.biases",
                "layer0.forget_gate.biases",
                "layer0.candidate.biases",
            ]
        );
        assert_eq!(params.layers[0].units[0].weights.shape(), &[2, 3]);
        assert_eq!(
            params.layers[0].units[0]
                .recurrent_weights
                .as_ref()
                .unwrap()
                .shape(),
            &[2, 2]
        );
        assert_eq!(params.weights().len(), 8);
        assert_eq!(params.biases().len(), 4);
        assert_eq!(params.parameter_count(), 4 * (6 + 4 + 2));
    }

    #[test]
    fn test_cfn_candidate_has_no_recurrent_weights() {
        let params = LayerParameters::new("layer0", LayerType::Cfn, 4, 3, false);
        let recurrent: Vec<bool> = params
            .units
            .iter()
            .map(|u| u.recurrent_weights.is_some())
            .collect();
        assert_eq!(recurrent, vec![true, true, false]);
    }

    #[test]
    fn test_copy_fidelity() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut original = StackedParams::new(&lstm_interfaces()).unwrap();
        original
            .initialize(&WeightInitialization::XavierUniform, 0.1, &mut rng)
            .unwrap();

        let mut copy = original.copy();
        copy.iter_mut()
            .into_iter()
            .for_each(|array| array.values.fill(0.0));
        assert_ne!(copy, original);

        copy.assign_values(&original).unwrap();
        assert_eq!(copy, original);

        copy.layers[0].units[0].weights.values.fill(9.0);
        assert!(original.layers[0].units[0]
            .weights
            .values
            .iter()
            .all(|&v| v != 9.0));

        original.layers[0].units[1].biases.values.fill(-9.0);
        assert!(copy.layers[0].units[1].biases.values.iter().all(|&v| v == 0.1));
    }

    #[test]
    fn test_sparse_weights_cannot_be_randomized() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut params =
            LayerParameters::new("layer0", LayerType::Feedforward, 10, 2, true).with_sparse_weights();

        let result = params.initialize(&WeightInitialization::XavierUniform, 0.0, &mut rng);
        assert!(matches!(result, Err(NetworkError::Configuration { .. })));
    }

    #[test]
    fn test_assign_values_rejects_other_layout() {
        let mut lstm = LayerParameters::new("layer0", LayerType::Lstm, 3, 2, false);
        let gru = LayerParameters::new("layer0", LayerType::Gru, 3, 2, false);
        assert!(lstm.assign_values(&gru).is_err());

        let wider = LayerParameters::new("layer0", LayerType::Lstm, 4, 2, false);
        assert!(matches!(
            lstm.assign_values(&wider),
            Err(NetworkError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_failed_assign_leaves_target_untouched() {
        let interfaces = |output: usize| {
            vec![
                LayerInterface::new(3),
                LayerInterface::new(2).with_connection(LayerType::Feedforward),
                LayerInterface::new(output).with_connection(LayerType::Feedforward),
            ]
        };
        let mut target = StackedParams::new(&interfaces(2)).unwrap();
        let mut source = StackedParams::new(&interfaces(4)).unwrap();
        source.layers[0].units[0].weights.values.fill(7.0);

        assert!(matches!(
            target.assign_values(&source),
            Err(NetworkError::DimensionMismatch { .. })
        ));
        assert!(target.layers[0].units[0]
            .weights
            .values
            .iter()
            .all(|&v| v == 0.0));

        let mut lstm = LayerParameters::new("layer0", LayerType::Lstm, 3, 2, false);
        let mut wider = LayerParameters::new("layer0", LayerType::Lstm, 3, 2, false);
        wider.units[0].weights.values.fill(7.0);
        wider.units[3].biases = ParamsArray::vector("layer0.candidate.biases", ParamsKind::Biases, 5);
        assert!(lstm.assign_values(&wider).is_err());
        assert!(lstm.units[0].weights.values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_attention_layout() {
        let interfaces = vec![
            LayerInterface::new(4),
            LayerInterface::new(4)
                .with_connection(LayerType::Attention)
                .with_attention_size(3),
            LayerInterface::new(2).with_connection(LayerType::Merge(crate::layers::MergeType::Sum))
        ];
        assert!(StackedParams::new(&interfaces).is_err());

        let mut params = StackedParams::new(&interfaces[..2]).unwrap();
        let names: Vec<&str> = params.iter().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["layer0.transform.weights", "layer0.context_vector", "layer0.transform.biases"]
        );
        assert_eq!(params.layers[0].units[0].weights.shape(), &[3, 4]);
        assert_eq!(params.parameter_count(), 12 + 3 + 3);

        let mut rng = StdRng::seed_from_u64(3);
        params
            .initialize(&WeightInitialization::XavierUniform, 0.0, &mut rng)
            .unwrap();
        let context_vector = params.layers[0].context_vector.as_ref().unwrap();
        assert_eq!(context_vector.shape(), &[3]);
        assert!(context_vector.values.iter().any(|&v| v != 0.0));

        let collected = params.layers[0]
            .collect_errors(&[UnitErrors {
                weights: Gradient::zeros(&[3, 4]),
                biases: Gradient::zeros(&[3]),
                recurrent_weights: None,
            }], None)
            .unwrap();
        assert_eq!(collected.get("layer0.context_vector"), Some(&Gradient::zeros(&[3])));
    }

    #[test]
    fn test_merge_has_no_parameters() {
        let params = LayerParameters::new("layer0", LayerType::Merge(crate::layers::MergeType::Concat), 2, 4, false);
        assert!(params.iter().is_empty());
        assert_eq!(params.parameter_count(), 0);
        assert!(params.collect_errors(&[], None).unwrap().is_empty());
    }

    #[test]
    fn test_sparse_first_layer() {
        let interfaces = vec![
            LayerInterface::new(100).with_input_type(InputType::SparseBinary),
            LayerInterface::new(4).with_connection(LayerType::Feedforward),
        ];
        let params = StackedParams::new(&interfaces).unwrap();
        assert!(params.layers[0].sparse_input);
    }

    #[test]
    fn test_collect_errors_fills_missing_recurrent_gradients() {
        let params = LayerParameters::new("layer0", LayerType::SimpleRecurrent, 2, 2, false);
        let errors = vec![UnitErrors {
            weights: Gradient::zeros(&[2, 2]),
            biases: Gradient::Dense(biases_from(&[0.5, 0.5])),
            recurrent_weights: None,
        }];

        let collected = params.collect_errors(&errors, None).unwrap();
        assert_eq!(collected.len(), 3);
        assert_eq!(
            collected.get("layer0.unit.recurrent_weights"),
            Some(&Gradient::zeros(&[2, 2]))
        );
    }
}
