//! Network facade: configuration, parameters and processors.
//!
//! A [`NeuralNetwork`] owns the layer configuration and the parameter tree
//! of a model. Processors are created from it and borrow its parameters on
//! every forward and backward, so one network serves any number of
//! processors.

use crate::activation::ActivationFunction;
use crate::array::InputType;
use crate::error::{NetworkError, Result};
use crate::layers::{validate_interfaces, LayerInterface, LayerType};
use crate::params::{StackedParams, WeightInitialization};
use crate::processor::{FeedforwardProcessor, ProcessorsPool, RecurrentProcessor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Configuration of a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// `n + 1` interfaces describing `n` layers
    pub interfaces: Vec<LayerInterface>,
    /// Initializer of the weights
    #[serde(default)]
    pub weight_initialization: WeightInitialization,
    /// Initial value of the biases
    #[serde(default)]
    pub bias_value: f64,
    /// Seed of the initialization and of the processors' dropout
    #[serde(default)]
    pub seed: Option<u64>,
}

impl NetworkConfig {
    /// Configuration with default initialization.
    pub fn new(interfaces: Vec<LayerInterface>) -> Result<Self> {
        let config = Self {
            interfaces,
            weight_initialization: WeightInitialization::default(),
            bias_value: 0.0,
            seed: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: NetworkConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the layer configuration.
    pub fn validate(&self) -> Result<()> {
        validate_interfaces(&self.interfaces)
    }

    /// Size of the features.
    pub fn input_size(&self) -> usize {
        self.interfaces.first().map_or(0, |i| i.size)
    }

    /// Size of the output.
    pub fn output_size(&self) -> usize {
        self.interfaces.last().map_or(0, |i| i.size)
    }
}

/// Metadata stored with a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Name of the model
    pub name: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Last modified timestamp
    pub modified_at: String,
    /// Crate version that wrote the model
    pub version: String,
}

impl Default for ModelMetadata {
    fn default() -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            name: None,
            description: None,
            created_at: now.clone(),
            modified_at: now,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A model: configuration, parameters and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralNetwork {
    /// Layer configuration
    pub config: NetworkConfig,
    /// Parameters of every layer
    pub params: StackedParams,
    /// Metadata
    pub metadata: ModelMetadata,
}

impl NeuralNetwork {
    /// Network with zero-valued parameters.
    pub fn new(config: NetworkConfig) -> Result<Self> {
        let params = StackedParams::new(&config.interfaces)?;
        log::debug!(
            "Network created: {} layers, {} parameters",
            params.len(),
            params.parameter_count()
        );
        Ok(Self {
            config,
            params,
            metadata: ModelMetadata::default(),
        })
    }

    /// Builder starting from the features.
    pub fn builder(input_size: usize) -> Result<NetworkBuilder> {
        NetworkBuilder::new(input_size)
    }

    /// Randomize the parameters.
    pub fn initialize<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        self.params
            .initialize(&self.config.weight_initialization, self.config.bias_value, rng)?;
        self.touch();
        Ok(())
    }

    /// Randomize the parameters with the configured seed.
    pub fn initialize_seeded(&mut self) -> Result<()> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.initialize(&mut rng)
    }

    /// Copy the values of `params` into the network.
    pub fn assign_params(&mut self, params: &StackedParams) -> Result<()> {
        self.params.assign_values(params)?;
        self.touch();
        Ok(())
    }

    /// Processor of single examples.
    pub fn feedforward_processor(
        &self,
        id: usize,
        propagate_to_input: bool,
    ) -> Result<FeedforwardProcessor> {
        FeedforwardProcessor::new(
            id,
            &self.config.interfaces,
            propagate_to_input,
            self.processor_seed(id),
        )
    }

    /// Processor of sequences.
    pub fn recurrent_processor(
        &self,
        id: usize,
        propagate_to_input: bool,
    ) -> Result<RecurrentProcessor> {
        RecurrentProcessor::new(
            id,
            &self.config.interfaces,
            propagate_to_input,
            self.processor_seed(id),
        )
    }

    /// Pool of feedforward processors of this network.
    pub fn processors_pool(&self, propagate_to_input: bool) -> ProcessorsPool<FeedforwardProcessor> {
        let interfaces = self.config.interfaces.clone();
        let seed = self.config.seed;
        ProcessorsPool::new(move |id| {
            FeedforwardProcessor::new(id, &interfaces, propagate_to_input, derive_seed(seed, id))
        })
    }

    /// Pool of recurrent processors of this network.
    pub fn recurrent_processors_pool(
        &self,
        propagate_to_input: bool,
    ) -> ProcessorsPool<RecurrentProcessor> {
        let interfaces = self.config.interfaces.clone();
        let seed = self.config.seed;
        ProcessorsPool::new(move |id| {
            RecurrentProcessor::new(id, &interfaces, propagate_to_input, derive_seed(seed, id))
        })
    }

    /// Number of learnable scalars.
    pub fn parameter_count(&self) -> usize {
        self.params.parameter_count()
    }

    /// Summary of the layers.
    pub fn summary(&self) -> NetworkSummary {
        let layers = self
            .config
            .interfaces
            .windows(2)
            .zip(&self.params.layers)
            .enumerate()
            .map(|(index, (pair, params))| LayerSummary {
                index,
                layer_type: params.layer_type,
                input_size: pair[0].size,
                output_size: pair[1].size,
                input_type: pair[0].input_type,
                activation: pair[1].activation,
                parameter_count: params.parameter_count(),
            })
            .collect();

        NetworkSummary {
            name: self.metadata.name.clone(),
            input_size: self.config.input_size(),
            output_size: self.config.output_size(),
            total_parameters: self.parameter_count(),
            layers,
        }
    }

    /// Save the model as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &self.stamped())?;
        Ok(())
    }

    /// Load a JSON model.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let network: NeuralNetwork = serde_json::from_reader(reader)?;
        network.checked()
    }

    /// Save the model in binary format.
    pub fn save_binary<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, &self.stamped())?;
        Ok(())
    }

    /// Load a binary model.
    pub fn load_binary<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let network: NeuralNetwork = bincode::deserialize_from(reader)?;
        network.checked()
    }

    fn stamped(&self) -> NeuralNetwork {
        let mut network = self.clone();
        network.touch();
        network
    }

    /// The loaded parameters must fit the loaded configuration.
    fn checked(self) -> Result<Self> {
        self.config.validate()?;
        StackedParams::new(&self.config.interfaces)?.assign_values(&self.params)?;
        Ok(self)
    }

    fn touch(&mut self) {
        self.metadata.modified_at = chrono::Utc::now().to_rfc3339();
    }

    fn processor_seed(&self, id: usize) -> Option<u64> {
        derive_seed(self.config.seed, id)
    }
}

fn derive_seed(seed: Option<u64>, id: usize) -> Option<u64> {
    seed.map(|seed| seed.wrapping_add(id as u64 + 1))
}

/// Fluent construction of a [`NeuralNetwork`].
#[derive(Debug, Clone)]
pub struct NetworkBuilder {
    interfaces: Vec<LayerInterface>,
    weight_initialization: WeightInitialization,
    bias_value: f64,
    seed: Option<u64>,
    metadata: ModelMetadata,
}

impl NetworkBuilder {
    /// Start from dense features of the given size.
    pub fn new(input_size: usize) -> Result<Self> {
        if input_size == 0 {
            return Err(NetworkError::architecture(
                "Input size must be greater than 0",
            ));
        }

        Ok(Self {
            interfaces: vec![LayerInterface::new(input_size)],
            weight_initialization: WeightInitialization::default(),
            bias_value: 0.0,
            seed: None,
            metadata: ModelMetadata::default(),
        })
    }

    /// Set the kind of the features.
    pub fn input_type(mut self, input_type: InputType) -> Self {
        self.interfaces[0].input_type = input_type;
        self
    }

    /// Add a layer of `size` outputs.
    pub fn layer(
        self,
        connection: LayerType,
        size: usize,
        activation: Option<ActivationFunction>,
    ) -> Self {
        let mut interface = LayerInterface::new(size).with_connection(connection);
        interface.activation = activation;
        self.interface(interface)
    }

    /// Add a layer described by its output interface.
    pub fn interface(mut self, interface: LayerInterface) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Set the weight initializer.
    pub fn weight_initialization(mut self, init: WeightInitialization) -> Self {
        self.weight_initialization = init;
        self
    }

    /// Set the initial value of the biases.
    pub fn bias_value(mut self, value: f64) -> Self {
        self.bias_value = value;
        self
    }

    /// Make initialization and dropout reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the model name.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.metadata.name = Some(name.into());
        self
    }

    /// Set the model description.
    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    /// Build and initialize the network.
    pub fn build(self) -> Result<NeuralNetwork> {
        if self.interfaces.len() < 2 {
            return Err(NetworkError::architecture(
                "Network must have at least one layer",
            ));
        }

        let config = NetworkConfig {
            interfaces: self.interfaces,
            weight_initialization: self.weight_initialization,
            bias_value: self.bias_value,
            seed: self.seed,
        };
        config.validate()?;

        let mut network = NeuralNetwork::new(config)?;
        network.metadata = self.metadata;
        network.initialize_seeded()?;
        Ok(network)
    }
}

/// Summary of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSummary {
    /// Position in the stack
    pub index: usize,
    /// Kind of layer
    pub layer_type: LayerType,
    /// Size of the input
    pub input_size: usize,
    /// Size of the output
    pub output_size: usize,
    /// Kind of the input
    pub input_type: InputType,
    /// Activation of the output
    pub activation: Option<ActivationFunction>,
    /// Number of learnable scalars
    pub parameter_count: usize,
}

/// Summary of a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    /// Model name
    pub name: Option<String>,
    /// Size of the features
    pub input_size: usize,
    /// Size of the output
    pub output_size: usize,
    /// Number of learnable scalars
    pub total_parameters: usize,
    /// Per-layer summaries
    pub layers: Vec<LayerSummary>,
}

impl fmt::Display for NetworkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(72))?;
        if let Some(name) = &self.name {
            writeln!(f, "Network: {}", name)?;
        }
        writeln!(f, "Input size: {}", self.input_size)?;
        writeln!(f, "Output size: {}", self.output_size)?;
        writeln!(
            f,
            "{:<8} {:<16} {:<12} {:<12} {:<12}",
            "Layer", "Type", "Shape", "Activation", "Param #"
        )?;
        writeln!(f, "{}", "-".repeat(72))?;
        for layer in &self.layers {
            writeln!(
                f,
                "{:<8} {:<16} {:<12} {:<12} {:<12}",
                layer.index,
                layer.layer_type.name(),
                format!("{}->{}", layer.input_size, layer.output_size),
                layer.activation.map_or("None", |a| a.name()),
                layer.parameter_count
            )?;
        }
        writeln!(f, "{}", "-".repeat(72))?;
        writeln!(f, "Total params: {}", self.total_parameters)?;
        write!(f, "{}", "=".repeat(72))
    }
}
