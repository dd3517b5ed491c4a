//! Processors: the stateful front of a network.
//!
//! A processor owns the layers of one or more time steps and exposes
//! forward, backward and the resulting gradients. Parameters are borrowed
//! on every call, so any number of processors can share one parameter tree.

pub mod feedforward;
pub mod pool;
pub mod recurrent;

pub use feedforward::FeedforwardProcessor;
pub use pool::ProcessorsPool;
pub use recurrent::RecurrentProcessor;

use crate::error::Result;
use crate::params::ParamsErrors;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Common surface of processors.
pub trait NeuralProcessor {
    /// Stable identifier given at creation.
    fn id(&self) -> usize;

    /// Gradients of the last backward.
    fn params_errors(&self) -> Result<&ParamsErrors>;
}

/// Dropout generator of a processor.
pub(crate) fn processor_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
