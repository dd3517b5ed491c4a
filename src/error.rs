//! Error types and handling for the library.

use thiserror::Error;

/// The main error type for the library.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Errors related to network architecture and layer configuration
    #[error("Network architecture error: {message}")]
    Architecture { message: String },

    /// Errors during forward/backward propagation
    #[error("Propagation error: {message}")]
    Propagation { message: String },

    /// Dimension mismatch errors
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    /// Invalid parameter errors
    #[error("Invalid parameter: {parameter} = {value}, reason: {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },

    /// Numerical computation errors
    #[error("Numerical error: {message}")]
    Numerical { message: String },

    /// Optimizer and gradient accumulation errors
    #[error("Optimizer error: {message}")]
    Optimizer { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Processors pool misuse
    #[error("Pool error: {message}")]
    Pool { message: String },

    /// Errors related to input/output operations
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Errors during serialization/deserialization
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// Binary serialization errors
    #[error("Binary serialization error: {source}")]
    BinarySerialization {
        #[from]
        source: bincode::Error,
    },

    /// Shape errors from ndarray
    #[error("Shape error: {source}")]
    Shape {
        #[from]
        source: ndarray::ShapeError,
    },
}

/// Result type alias for the library.
pub type Result<T> = std::result::Result<T, NetworkError>;

impl NetworkError {
    /// Create a new architecture error
    pub fn architecture<S: Into<String>>(message: S) -> Self {
        Self::Architecture {
            message: message.into(),
        }
    }

    /// Create a new propagation error
    pub fn propagation<S: Into<String>>(message: S) -> Self {
        Self::Propagation {
            message: message.into(),
        }
    }

    /// Create a new dimension mismatch error
    pub fn dimension_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a new invalid parameter error
    pub fn invalid_parameter(
        parameter: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a new numerical error
    pub fn numerical<S: Into<String>>(message: S) -> Self {
        Self::Numerical {
            message: message.into(),
        }
    }

    /// Create a new optimizer error
    pub fn optimizer<S: Into<String>>(message: S) -> Self {
        Self::Optimizer {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new pool error
    pub fn pool<S: Into<String>>(message: S) -> Self {
        Self::Pool {
            message: message.into(),
        }
    }

    /// Shorthand for a size mismatch between two vectors.
    pub fn size_mismatch(what: &str, expected: usize, actual: usize) -> Self {
        Self::dimension_mismatch(
            format!("{} of size {}", what, expected),
            format!("size {}", actual),
        )
    }

    /// Check if this error is recoverable.
    ///
    /// A failed forward or backward leaves arrays, accumulators and the
    /// sequence index in an undefined state, so none of the propagation
    /// errors are.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Numerical { .. })
    }

    /// Get the error category
    pub fn category(&self) -> &'static str {
        match self {
            Self::Architecture { .. } => "Architecture",
            Self::Propagation { .. } => "Propagation",
            Self::DimensionMismatch { .. } => "DimensionMismatch",
            Self::InvalidParameter { .. } => "InvalidParameter",
            Self::Numerical { .. } => "Numerical",
            Self::Optimizer { .. } => "Optimizer",
            Self::Configuration { .. } => "Configuration",
            Self::Pool { .. } => "Pool",
            Self::Io { .. } => "IO",
            Self::Serialization { .. } => "Serialization",
            Self::BinarySerialization { .. } => "BinarySerialization",
            Self::Shape { .. } => "Shape",
        }
    }
}
