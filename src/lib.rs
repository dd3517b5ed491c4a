//! # rnnkit - Layered neural network engine
//!
//! A computation engine for stacked feedforward and recurrent neural
//! networks trained with backpropagation through time.
//!
//! ## Features
//!
//! - **Layers**: feedforward, simple recurrent, LSTM, GRU, CFN and RAN, plus
//!   merge and attention layers
//! - **Sparse inputs**: sparse and sparse-binary features with column-sparse
//!   weight gradients
//! - **Context windows**: zero-copy access to the neighbouring time steps
//! - **Training**: gradient accumulation, clipping, L1/L2 regularization and
//!   SGD, momentum, Nesterov, AdaGrad, ADAM and RMSProp updates
//! - **Processors**: reusable per-thread processors and a pool to manage them
//! - **Model persistence**: JSON and binary formats
//!
//! ## Quick Start
//!
//! ```rust
//! use rnnkit::prelude::*;
//! use ndarray::arr1;
//!
//! # fn main() -> rnnkit::Result<()> {
//! let mut network = NeuralNetwork::builder(3)?
//!     .layer(LayerType::Lstm, 8, Some(ActivationFunction::Tanh))
//!     .layer(LayerType::Feedforward, 2, None)
//!     .seed(42)
//!     .build()?;
//!
//! let mut processor = network.recurrent_processor(0, false)?;
//! let mut optimizer = ParamsOptimizer::adam(0.001)?;
//!
//! let sequence = vec![arr1(&[0.1, 0.2, 0.3]).into(), arr1(&[0.3, 0.2, 0.1]).into()];
//! let outputs = processor.forward_sequence(&network.params, sequence, false)?;
//!
//! let errors: Vec<_> = outputs.iter().map(|y| y - &arr1(&[1.0, 0.0])).collect();
//! processor.backward(&network.params, &errors)?;
//!
//! optimizer.accumulate(processor.params_errors()?)?;
//! optimizer.update(network.params.iter_mut())?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

// Core modules
pub mod activation;
pub mod array;
pub mod layers;
pub mod loss;
pub mod network;
pub mod optimizer;
pub mod params;
pub mod processor;
pub mod structure;

// Error handling
pub mod error;

// Re-exports for convenience
pub use error::{NetworkError, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::activation::ActivationFunction;
    pub use crate::array::{InputArray, InputType, SparseBinaryVector, SparseVector};
    pub use crate::error::{NetworkError, Result};
    pub use crate::layers::{
        AttentionState, LayerInterface, LayerState, LayerType, MergeType,
    };
    pub use crate::loss::LossFunction;
    pub use crate::network::{
        ModelMetadata, NetworkBuilder, NetworkConfig, NetworkSummary, NeuralNetwork,
    };
    pub use crate::optimizer::{
        GradientAccumulator, GradientClipping, OptimizerConfig, ParamsOptimizer, Regularization,
        UpdateMethod,
    };
    pub use crate::params::{ParamsErrors, StackedParams, WeightInitialization};
    pub use crate::processor::{
        FeedforwardProcessor, NeuralProcessor, ProcessorsPool, RecurrentProcessor,
    };
    pub use crate::structure::{ContextWindow, StackedLayers};
}
