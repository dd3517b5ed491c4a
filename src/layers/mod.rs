//! Neural network layers module
//!
//! A [`Layer`] is a forward/backward state machine over an input and an
//! output array. The layer kinds form a closed set ([`LayerType`]); each kind
//! keeps its own payload in [`LayerState`] and its math in a sibling module.
//!
//! Merge and attention layers read several arrays at once. They can only be
//! the first layer of a structure, which hands them its inputs through
//! [`Layer::forward_inputs`].
//!
//! Recurrent layers never store a time index. They receive the layers at
//! the same position in the previous and next time steps through
//! [`LayerPeers`], built by the caller for each traversal.

use crate::activation::ActivationFunction;
use crate::array::{apply_dropout, AugmentedArray, DropoutMask, InputArray, InputType, InputView};
use crate::error::{NetworkError, Result};
use crate::params::{Gradient, LayerParameters, ParamsErrors, UnitErrors};
use ndarray::{Array1, ArrayView1};
use rand::RngCore;
use serde::{Deserialize, Serialize};

pub mod attention;
pub mod cfn;
pub mod feedforward;
pub mod gru;
pub mod lstm;
pub mod merge;
pub mod ran;
pub mod recurrent;
pub mod unit;

pub use attention::AttentionState;
pub use cfn::CfnState;
pub use gru::GruState;
pub use lstm::LstmState;
pub use merge::MergeType;
pub use ran::RanState;
pub use unit::GateUnit;

/// Kinds of layers a stacked structure can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerType {
    /// Affine transform followed by an activation
    Feedforward,
    /// Elman recurrent layer
    SimpleRecurrent,
    /// Long short-term memory
    Lstm,
    /// Gated recurrent unit
    Gru,
    /// Chaos-free network
    Cfn,
    /// Recurrent additive network
    Ran,
    /// Parameterless combination of several inputs
    Merge(MergeType),
    /// Attention-weighted sum of several inputs
    Attention,
}

impl LayerType {
    /// Gates in declaration order, with whether each has recurrent weights.
    pub fn gates(&self) -> &'static [(&'static str, bool)] {
        match self {
            LayerType::Feedforward => &[("unit", false)],
            LayerType::SimpleRecurrent => &[("unit", true)],
            LayerType::Lstm => &[
                ("input_gate", true),
                ("output_gate", true),
                ("forget_gate", true),
                ("candidate", true),
            ],
            LayerType::Gru => &[
                ("candidate", true),
                ("reset_gate", true),
                ("partition_gate", true),
            ],
            LayerType::Cfn | LayerType::Ran => &[
                ("input_gate", true),
                ("forget_gate", true),
                ("candidate", false),
            ],
            LayerType::Merge(_) => &[],
            LayerType::Attention => &[("transform", false)],
        }
    }

    /// Whether the layer reads the output of the previous time step.
    pub fn is_recurrent(&self) -> bool {
        !matches!(
            self,
            LayerType::Feedforward | LayerType::Merge(_) | LayerType::Attention
        )
    }

    /// Whether the layer reads several arrays of the same step.
    pub fn is_multi_input(&self) -> bool {
        matches!(self, LayerType::Merge(_) | LayerType::Attention)
    }

    /// Get the name of the layer type.
    pub fn name(&self) -> &'static str {
        match self {
            LayerType::Feedforward => "Feedforward",
            LayerType::SimpleRecurrent => "SimpleRecurrent",
            LayerType::Lstm => "LSTM",
            LayerType::Gru => "GRU",
            LayerType::Cfn => "CFN",
            LayerType::Ran => "RAN",
            LayerType::Merge(_) => "Merge",
            LayerType::Attention => "Attention",
        }
    }
}

/// One entry of a layer configuration.
///
/// A configuration of `n + 1` interfaces describes `n` layers: layer `i`
/// reads interface `i` and produces interface `i + 1`, whose connection,
/// activation, dropout and meProp settings belong to that layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerInterface {
    /// Size of the array
    pub size: usize,
    /// Kind of the array (only the first interface may be sparse)
    #[serde(default)]
    pub input_type: InputType,
    /// Activation of the layer producing this interface
    #[serde(default)]
    pub activation: Option<ActivationFunction>,
    /// Type of the layer producing this interface
    #[serde(default)]
    pub connection: Option<LayerType>,
    /// Dropout probability applied to the input of the layer
    #[serde(default)]
    pub dropout: f64,
    /// Propagate only the top-k output errors (feedforward only)
    #[serde(default)]
    pub me_prop_k: Option<usize>,
    /// Size of the transformed inputs of an attention layer (defaults to the
    /// input size)
    #[serde(default)]
    pub attention_size: Option<usize>,
}

impl LayerInterface {
    /// Dense interface of the given size.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            input_type: InputType::Dense,
            activation: None,
            connection: None,
            dropout: 0.0,
            me_prop_k: None,
            attention_size: None,
        }
    }

    /// Set the input type.
    pub fn with_input_type(mut self, input_type: InputType) -> Self {
        self.input_type = input_type;
        self
    }

    /// Set the activation function.
    pub fn with_activation(mut self, activation: ActivationFunction) -> Self {
        self.activation = Some(activation);
        self
    }

    /// Set the connection type.
    pub fn with_connection(mut self, connection: LayerType) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Set the dropout probability.
    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Enable meProp with the given k.
    pub fn with_me_prop(mut self, k: usize) -> Self {
        self.me_prop_k = Some(k);
        self
    }

    /// Set the attention size.
    pub fn with_attention_size(mut self, size: usize) -> Self {
        self.attention_size = Some(size);
        self
    }
}

/// Check a layer configuration.
pub fn validate_interfaces(interfaces: &[LayerInterface]) -> Result<()> {
    if interfaces.len() < 2 {
        return Err(NetworkError::configuration(format!(
            "A layer configuration needs at least 2 interfaces, got {}",
            interfaces.len()
        )));
    }

    for (index, interface) in interfaces.iter().enumerate() {
        if interface.size == 0 {
            return Err(NetworkError::configuration(format!(
                "Interface {} has size 0",
                index
            )));
        }
        if index > 0 && interface.input_type != InputType::Dense {
            return Err(NetworkError::configuration(format!(
                "Only the first interface can be sparse, interface {} is {:?}",
                index, interface.input_type
            )));
        }
        if !(0.0..1.0).contains(&interface.dropout) {
            return Err(NetworkError::invalid_parameter(
                "dropout",
                &interface.dropout.to_string(),
                "must be in [0, 1)",
            ));
        }
        if index > 0 && interface.connection.is_none() {
            return Err(NetworkError::configuration(format!(
                "Interface {} has no connection type",
                index
            )));
        }
        if let Some(k) = interface.me_prop_k {
            if k == 0 {
                return Err(NetworkError::invalid_parameter(
                    "me_prop_k",
                    "0",
                    "must be positive",
                ));
            }
            if interface.connection != Some(LayerType::Feedforward) {
                return Err(NetworkError::configuration(format!(
                    "meProp is only supported by feedforward layers (interface {})",
                    index
                )));
            }
        }
        if let Some(size) = interface.attention_size {
            if size == 0 {
                return Err(NetworkError::invalid_parameter(
                    "attention_size",
                    "0",
                    "must be positive",
                ));
            }
            if interface.connection != Some(LayerType::Attention) {
                return Err(NetworkError::configuration(format!(
                    "Only attention layers have an attention size (interface {})",
                    index
                )));
            }
        }
        if let Some(connection) = interface.connection.filter(LayerType::is_multi_input) {
            validate_multi_input(interfaces, index, connection)?;
        }
    }

    Ok(())
}

fn validate_multi_input(
    interfaces: &[LayerInterface],
    index: usize,
    connection: LayerType,
) -> Result<()> {
    if index != 1 {
        return Err(NetworkError::configuration(format!(
            "{} layers can only be the first layer (interface {})",
            connection.name(),
            index
        )));
    }
    let input = &interfaces[0];
    let output = &interfaces[1];
    if input.input_type != InputType::Dense {
        return Err(NetworkError::configuration(format!(
            "{} layers need dense inputs, got {:?}",
            connection.name(),
            input.input_type
        )));
    }
    if output.dropout > 0.0 {
        return Err(NetworkError::configuration(format!(
            "{} layers do not support dropout",
            connection.name()
        )));
    }
    let valid_size = match connection {
        LayerType::Merge(MergeType::Concat) => output.size % input.size == 0,
        _ => output.size == input.size,
    };
    if !valid_size {
        return Err(NetworkError::configuration(format!(
            "A {:?} layer cannot turn inputs of size {} into an output of size {}",
            connection, input.size, output.size
        )));
    }
    Ok(())
}

/// Stage of a layer within one episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerStage {
    /// Never forwarded
    Uninitialized,
    /// Forwarded, waiting for backward
    Forwarded,
    /// Backward done, gradients available
    BackwardReady,
}

/// Layers at the same position in the neighbouring time steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayerPeers<'a> {
    /// Same layer in the previous time step
    pub prev: Option<&'a Layer>,
    /// Same layer in the next time step
    pub next: Option<&'a Layer>,
}

/// Per-kind payload of a layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerState {
    /// No payload: the output array is the only unit
    Feedforward,
    /// No payload: the output array is the only unit
    SimpleRecurrent,
    /// Gates and cell
    Lstm(LstmState),
    /// Gates and candidate
    Gru(GruState),
    /// Gates, candidate and activated previous output
    Cfn(CfnState),
    /// Gates and candidate
    Ran(RanState),
    /// No payload besides the kind of merge
    Merge(MergeType),
    /// Transformed inputs and scores
    Attention(AttentionState),
}

impl LayerState {
    fn new(layer_type: LayerType, size: usize) -> Self {
        match layer_type {
            LayerType::Feedforward => LayerState::Feedforward,
            LayerType::SimpleRecurrent => LayerState::SimpleRecurrent,
            LayerType::Lstm => LayerState::Lstm(LstmState::new(size)),
            LayerType::Gru => LayerState::Gru(GruState::new(size)),
            LayerType::Cfn => LayerState::Cfn(CfnState::new(size)),
            LayerType::Ran => LayerState::Ran(RanState::new(size)),
            LayerType::Merge(merge_type) => LayerState::Merge(merge_type),
            LayerType::Attention => LayerState::Attention(AttentionState::default()),
        }
    }
}

/// What a per-kind backward hands back to the layer.
#[derive(Debug)]
pub(crate) struct BackwardOutput {
    pub units: Vec<UnitErrors>,
    pub input_errors: Option<Array1<f64>>,
    pub recurrent_errors: Option<Array1<f64>>,
}

/// What a multi-input backward hands back to the layer.
#[derive(Debug)]
pub(crate) struct MultiBackwardOutput {
    pub units: Vec<UnitErrors>,
    pub context_vector: Option<Gradient>,
    pub input_errors: Vec<Array1<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
struct DropoutState {
    input: InputArray,
    mask: DropoutMask,
}

/// A layer of a stacked structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    layer_type: LayerType,
    input_size: usize,
    activation: Option<ActivationFunction>,
    dropout: f64,
    me_prop_k: Option<usize>,
    output: AugmentedArray,
    state: LayerState,
    stage: LayerStage,
    dropout_state: Option<DropoutState>,
    recurrent_errors: Option<Array1<f64>>,
    params_errors: Option<Vec<UnitErrors>>,
    context_errors: Option<Gradient>,
}

impl Layer {
    /// Build the layer reading `input` and producing `output`.
    pub fn new(input: &LayerInterface, output: &LayerInterface) -> Result<Self> {
        let layer_type = output.connection.ok_or_else(|| {
            NetworkError::configuration("The output interface of a layer needs a connection type")
        })?;

        Ok(Self {
            layer_type,
            input_size: input.size,
            activation: output.activation,
            dropout: output.dropout,
            me_prop_k: output.me_prop_k,
            output: AugmentedArray::zeros(output.size),
            state: LayerState::new(layer_type, output.size),
            stage: LayerStage::Uninitialized,
            dropout_state: None,
            recurrent_errors: None,
            params_errors: None,
            context_errors: None,
        })
    }

    /// Kind of the layer.
    pub fn layer_type(&self) -> LayerType {
        self.layer_type
    }

    /// Activation function of the layer.
    pub fn activation(&self) -> Option<ActivationFunction> {
        self.activation
    }

    /// Output array.
    pub fn output(&self) -> &AugmentedArray {
        &self.output
    }

    /// Per-kind payload.
    pub fn state(&self) -> &LayerState {
        &self.state
    }

    /// Current stage.
    pub fn stage(&self) -> LayerStage {
        self.stage
    }

    /// `dL/dy_prev` computed by the last backward, if a previous state existed.
    pub fn recurrent_errors(&self) -> Option<&Array1<f64>> {
        self.recurrent_errors.as_ref()
    }

    /// Unit gradients computed by the last backward.
    pub fn unit_errors(&self) -> Option<&[UnitErrors]> {
        self.params_errors.as_deref()
    }

    /// Named gradients of the last backward.
    pub fn params_errors(&self, params: &LayerParameters) -> Result<ParamsErrors> {
        let errors = self.params_errors.as_ref().ok_or_else(|| {
            NetworkError::propagation("No params errors available: backward was not called")
        })?;
        params.collect_errors(errors, self.context_errors.as_ref())
    }

    /// Set `dL/dy` before backward.
    pub fn assign_output_errors(&mut self, errors: &Array1<f64>) -> Result<()> {
        self.output.assign_errors(errors.clone())
    }

    /// Add to `dL/dy` before backward.
    pub fn add_output_errors(&mut self, errors: &Array1<f64>) -> Result<()> {
        self.output.add_errors(errors)
    }

    /// Set the output relevance before relevance propagation.
    pub fn assign_output_relevance(&mut self, relevance: Array1<f64>) -> Result<()> {
        self.output.assign_relevance(relevance)
    }

    /// Forward `input` into the output array.
    ///
    /// Dropout is applied to the input when `dropout_rng` is given and the
    /// layer has a positive dropout probability. Multi-input layers treat
    /// `input` as their only input.
    pub fn forward(
        &mut self,
        params: &LayerParameters,
        input: InputView<'_>,
        peers: LayerPeers<'_>,
        dropout_rng: Option<&mut dyn RngCore>,
    ) -> Result<()> {
        if self.layer_type.is_multi_input() {
            return self.forward_multi(params, &[dense_input(input)?]);
        }
        self.check_params(params, input.size())?;

        self.dropout_state = match dropout_rng {
            Some(rng) if self.dropout > 0.0 => {
                let (input, mask) = apply_dropout(input, self.dropout, rng);
                Some(DropoutState { input, mask })
            }
            _ => None,
        };

        let Self {
            state,
            output,
            activation,
            dropout_state,
            ..
        } = self;
        let input = match dropout_state.as_ref() {
            Some(dropped) => dropped.input.view(),
            None => input.reborrow(),
        };
        let activation = *activation;

        match state {
            LayerState::Feedforward => feedforward::forward(output, params, activation, input)?,
            LayerState::SimpleRecurrent => {
                recurrent::forward(output, params, activation, input, peers.prev)?
            }
            LayerState::Lstm(lstm) => {
                lstm::forward(lstm, output, params, activation, input, peers.prev)?
            }
            LayerState::Gru(gru) => gru::forward(gru, output, params, activation, input, peers.prev)?,
            LayerState::Cfn(cfn) => cfn::forward(cfn, output, params, activation, input, peers.prev)?,
            LayerState::Ran(ran) => ran::forward(ran, output, params, activation, input, peers.prev)?,
            LayerState::Merge(_) | LayerState::Attention(_) => {
                return Err(single_input_unsupported(self.layer_type))
            }
        }

        self.forwarded();
        Ok(())
    }

    /// Forward the inputs of a first layer.
    ///
    /// Multi-input layers need at least one dense input, the other kinds
    /// exactly one input.
    pub fn forward_inputs(
        &mut self,
        params: &LayerParameters,
        inputs: &[InputArray],
        peers: LayerPeers<'_>,
        dropout_rng: Option<&mut dyn RngCore>,
    ) -> Result<()> {
        if !self.layer_type.is_multi_input() {
            let input = self.single_input(inputs)?;
            return self.forward(params, input.view(), peers, dropout_rng);
        }
        let inputs = inputs
            .iter()
            .map(|input| dense_input(input.view()))
            .collect::<Result<Vec<_>>>()?;
        self.forward_multi(params, &inputs)
    }

    fn forward_multi(&mut self, params: &LayerParameters, inputs: &[ArrayView1<'_, f64>]) -> Result<()> {
        for input in inputs {
            self.check_params(params, input.len())?;
        }
        self.dropout_state = None;

        let Self {
            state,
            output,
            activation,
            ..
        } = self;
        match state {
            LayerState::Merge(merge_type) => merge::forward(*merge_type, output, *activation, inputs)?,
            LayerState::Attention(attention) => {
                attention::forward(attention, output, params, *activation, inputs)?
            }
            _ => return Err(single_input_only(self.layer_type, inputs.len())),
        }

        self.forwarded();
        Ok(())
    }

    fn forwarded(&mut self) {
        self.recurrent_errors = None;
        self.params_errors = None;
        self.context_errors = None;
        self.stage = LayerStage::Forwarded;
        log::trace!("{} layer forwarded", self.layer_type.name());
    }

    /// Backward from the output errors assigned by the caller.
    ///
    /// For recurrent layers the recurrent errors of the next peer are added
    /// to the output errors first. Returns `dL/dx` when `propagate_to_input`
    /// is set.
    pub fn backward(
        &mut self,
        params: &LayerParameters,
        input: InputView<'_>,
        peers: LayerPeers<'_>,
        propagate_to_input: bool,
    ) -> Result<Option<Array1<f64>>> {
        if self.layer_type.is_multi_input() {
            let errors = self.backward_multi(params, &[dense_input(input)?], propagate_to_input)?;
            return Ok(errors.and_then(|errors| errors.into_iter().next()));
        }
        self.check_forwarded()?;
        self.check_params(params, input.size())?;

        if self.layer_type.is_recurrent() {
            if let Some(next) = peers.next {
                let contribution = next.recurrent_errors.as_ref().ok_or_else(|| {
                    NetworkError::propagation(
                        "The next state must be backwarded before the current one",
                    )
                })?;
                self.output.add_errors(contribution)?;
            }
        }

        let Self {
            state,
            output,
            activation,
            me_prop_k,
            dropout_state,
            ..
        } = self;
        let input = match dropout_state.as_ref() {
            Some(dropped) => dropped.input.view(),
            None => input.reborrow(),
        };
        let activation = *activation;
        let propagate = propagate_to_input;

        let result = match state {
            LayerState::Feedforward => {
                feedforward::backward(output, params, activation, *me_prop_k, input, propagate)?
            }
            LayerState::SimpleRecurrent => {
                recurrent::backward(output, params, activation, input, peers.prev, propagate)?
            }
            LayerState::Lstm(lstm) => {
                lstm::backward(lstm, output, params, activation, input, peers, propagate)?
            }
            LayerState::Gru(gru) => {
                gru::backward(gru, output, params, activation, input, peers.prev, propagate)?
            }
            LayerState::Cfn(cfn) => {
                cfn::backward(cfn, output, params, activation, input, peers.prev, propagate)?
            }
            LayerState::Ran(ran) => {
                ran::backward(ran, output, params, activation, input, peers.prev, propagate)?
            }
            LayerState::Merge(_) | LayerState::Attention(_) => {
                return Err(single_input_unsupported(self.layer_type))
            }
        };

        let input_errors = match (result.input_errors, dropout_state.as_ref()) {
            (Some(errors), Some(dropped)) => Some(dropped.mask.apply_to_errors(&errors)),
            (errors, _) => errors,
        };

        self.recurrent_errors = result.recurrent_errors;
        self.params_errors = Some(result.units);
        self.context_errors = None;
        self.stage = LayerStage::BackwardReady;

        log::trace!("{} layer backwarded", self.layer_type.name());
        Ok(input_errors)
    }

    /// Backward a first layer given the inputs of its forward.
    ///
    /// Returns the errors of every input when `propagate_to_input` is set.
    pub fn backward_inputs(
        &mut self,
        params: &LayerParameters,
        inputs: &[InputArray],
        peers: LayerPeers<'_>,
        propagate_to_input: bool,
    ) -> Result<Option<Vec<Array1<f64>>>> {
        if !self.layer_type.is_multi_input() {
            let input = self.single_input(inputs)?;
            let errors = self.backward(params, input.view(), peers, propagate_to_input)?;
            return Ok(errors.map(|errors| vec![errors]));
        }
        let inputs = inputs
            .iter()
            .map(|input| dense_input(input.view()))
            .collect::<Result<Vec<_>>>()?;
        self.backward_multi(params, &inputs, propagate_to_input)
    }

    fn backward_multi(
        &mut self,
        params: &LayerParameters,
        inputs: &[ArrayView1<'_, f64>],
        propagate_to_input: bool,
    ) -> Result<Option<Vec<Array1<f64>>>> {
        self.check_forwarded()?;
        for input in inputs {
            self.check_params(params, input.len())?;
        }

        let Self {
            state,
            output,
            activation,
            ..
        } = self;
        let result = match state {
            LayerState::Merge(merge_type) => MultiBackwardOutput {
                units: Vec::new(),
                context_vector: None,
                input_errors: merge::backward(*merge_type, output, *activation, inputs)?,
            },
            LayerState::Attention(attention) => {
                attention::backward(attention, output, params, *activation, inputs)?
            }
            _ => return Err(single_input_only(self.layer_type, inputs.len())),
        };

        self.recurrent_errors = None;
        self.params_errors = Some(result.units);
        self.context_errors = result.context_vector;
        self.stage = LayerStage::BackwardReady;

        log::trace!(
            "{} layer backwarded over {} inputs",
            self.layer_type.name(),
            inputs.len()
        );
        Ok(propagate_to_input.then_some(result.input_errors))
    }

    /// Propagate the output relevance to the input (ε-rule LRP).
    ///
    /// Only feedforward layers support it.
    pub fn propagate_relevance(
        &self,
        params: &LayerParameters,
        input: InputView<'_>,
        epsilon: f64,
    ) -> Result<Array1<f64>> {
        if self.stage == LayerStage::Uninitialized {
            return Err(NetworkError::propagation(
                "Cannot propagate relevance before forward",
            ));
        }
        match self.state {
            LayerState::Feedforward => {
                let input = match self.dropout_state.as_ref() {
                    Some(dropped) => dropped.input.view(),
                    None => input.reborrow(),
                };
                feedforward::relevance(&self.output, params, input, epsilon)
            }
            _ => Err(NetworkError::propagation(format!(
                "Relevance propagation is unsupported by {} layers",
                self.layer_type.name()
            ))),
        }
    }

    fn check_forwarded(&self) -> Result<()> {
        if self.stage != LayerStage::Forwarded {
            return Err(NetworkError::propagation(format!(
                "Cannot backward a {} layer in stage {:?}",
                self.layer_type.name(),
                self.stage
            )));
        }
        Ok(())
    }

    fn single_input<'i>(&self, inputs: &'i [InputArray]) -> Result<&'i InputArray> {
        match inputs {
            [input] => Ok(input),
            _ => Err(single_input_only(self.layer_type, inputs.len())),
        }
    }

    fn check_params(&self, params: &LayerParameters, input_size: usize) -> Result<()> {
        if params.layer_type != self.layer_type {
            return Err(NetworkError::architecture(format!(
                "{} layer given {} parameters",
                self.layer_type.name(),
                params.layer_type.name()
            )));
        }
        if params.output_size != self.output.size() {
            return Err(NetworkError::size_mismatch(
                "parameters output",
                self.output.size(),
                params.output_size,
            ));
        }
        if input_size != self.input_size || params.input_size != self.input_size {
            return Err(NetworkError::size_mismatch("input", self.input_size, input_size));
        }
        Ok(())
    }
}

fn single_input_only(layer_type: LayerType, count: usize) -> NetworkError {
    NetworkError::architecture(format!(
        "{} layers read exactly one input, got {}",
        layer_type.name(),
        count
    ))
}

fn single_input_unsupported(layer_type: LayerType) -> NetworkError {
    NetworkError::architecture(format!(
        "{} layers are forwarded through their inputs",
        layer_type.name()
    ))
}

/// Dense values of an input of a multi-input layer.
fn dense_input(input: InputView<'_>) -> Result<ArrayView1<'_, f64>> {
    match input {
        InputView::Dense(values) => Ok(values),
        other => Err(NetworkError::configuration(format!(
            "Multi-input layers need dense inputs, got {:?}",
            other.input_type()
        ))),
    }
}

/// Output values of the previous peer.
pub(crate) fn prev_output(prev: Option<&Layer>) -> Option<&Array1<f64>> {
    prev.map(|layer| layer.output().values())
}

/// Sum of `Wᵗ·e` over the given gates.
pub(crate) fn sum_errors(
    contributions: impl IntoIterator<Item = Result<Array1<f64>>>,
    size: usize,
) -> Result<Array1<f64>> {
    let mut total = Array1::zeros(size);
    for contribution in contributions {
        total += &contribution?;
    }
    Ok(total)
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use crate::params::{StackedParams, WeightInitialization};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Single-layer configuration `input -> output`.
    pub fn interfaces(layer_type: LayerType, input: usize, output: usize) -> Vec<LayerInterface> {
        vec![
            LayerInterface::new(input),
            LayerInterface::new(output)
                .with_connection(layer_type)
                .with_activation(ActivationFunction::Tanh),
        ]
    }

    /// Seeded parameters and a fresh layer.
    pub fn layer_and_params(layer_type: LayerType, input: usize, output: usize) -> (Layer, LayerParameters) {
        let interfaces = interfaces(layer_type, input, output);
        let mut params = StackedParams::new(&interfaces).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        params
            .initialize(&WeightInitialization::Uniform { min: -0.5, max: 0.5 }, 0.1, &mut rng)
            .unwrap();
        let layer = Layer::new(&interfaces[0], &interfaces[1]).unwrap();
        (layer, params.layers.remove(0))
    }

    /// Compare the gradients of a two-step sequence with central finite
    /// differences of the loss `e0·y0 + e1·y1`.
    pub fn gradient_check(layer_type: LayerType) {
        let (layer, params) = layer_and_params(layer_type, 3, 2);
        let xs = [
            InputArray::Dense(Array1::from(vec![0.5, -0.4, 0.1])),
            InputArray::Dense(Array1::from(vec![-0.3, 0.8, 0.6])),
        ];
        let es = [Array1::from(vec![0.7, -0.2]), Array1::from(vec![0.3, 0.9])];

        let loss = |params: &LayerParameters| -> f64 {
            let mut first = layer.clone();
            let mut second = layer.clone();
            first
                .forward(params, xs[0].view(), LayerPeers::default(), None)
                .unwrap();
            second
                .forward(params, xs[1].view(), LayerPeers { prev: Some(&first), next: None }, None)
                .unwrap();
            first.output().values().dot(&es[0]) + second.output().values().dot(&es[1])
        };

        let mut first = layer.clone();
        let mut second = layer.clone();
        first
            .forward(&params, xs[0].view(), LayerPeers::default(), None)
            .unwrap();
        second
            .forward(&params, xs[1].view(), LayerPeers { prev: Some(&first), next: None }, None)
            .unwrap();
        second.assign_output_errors(&es[1]).unwrap();
        second
            .backward(&params, xs[1].view(), LayerPeers { prev: Some(&first), next: None }, false)
            .unwrap();
        first.assign_output_errors(&es[0]).unwrap();
        first
            .backward(&params, xs[0].view(), LayerPeers { prev: None, next: Some(&second) }, false)
            .unwrap();

        let mut analytic = first.params_errors(&params).unwrap();
        let second_errors = second.params_errors(&params).unwrap();
        for (total, step) in analytic.gradients.iter_mut().zip(second_errors.iter()) {
            total.gradient.add_assign(&step.gradient).unwrap();
        }

        let h = 1e-6;
        for (index, entry) in analytic.iter().enumerate() {
            let expected = entry.gradient.to_dense();
            for (flat, &value) in expected.iter().enumerate() {
                let mut plus = params.copy();
                let mut minus = params.copy();
                if let Some(value) = plus.iter_mut()[index].values.iter_mut().nth(flat) {
                    *value += h;
                }
                if let Some(value) = minus.iter_mut()[index].values.iter_mut().nth(flat) {
                    *value -= h;
                }

                let numeric = (loss(&plus) - loss(&minus)) / (2.0 * h);
                assert!(
                    (numeric - value).abs() < 1e-6,
                    "{} [{}]: numeric {} analytic {}",
                    entry.name,
                    flat,
                    numeric,
                    value
                );
            }
        }
    }

    /// Forward the three steps `prev`, `current`, `next`, then backward
    /// `next` and, optionally, `current` with the next peer.
    pub fn three_steps(
        layer_type: LayerType,
        inputs: &[Array1<f64>; 3],
    ) -> (LayerParameters, [Layer; 3]) {
        let (layer, params) = layer_and_params(layer_type, inputs[0].len(), 2);
        let mut prev = layer.clone();
        let mut current = layer.clone();
        let mut next = layer;

        let x: Vec<InputArray> = inputs.iter().cloned().map(InputArray::Dense).collect();
        prev.forward(&params, x[0].view(), LayerPeers::default(), None)
            .unwrap();
        current
            .forward(&params, x[1].view(), LayerPeers { prev: Some(&prev), next: None }, None)
            .unwrap();
        next.forward(&params, x[2].view(), LayerPeers { prev: Some(&current), next: None }, None)
            .unwrap();

        next.assign_output_errors(&Array1::from(vec![0.3, -0.2]))
            .unwrap();
        next.backward(&params, x[2].view(), LayerPeers { prev: Some(&current), next: None }, false)
            .unwrap();

        (params, [prev, current, next])
    }
}
