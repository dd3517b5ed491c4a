//! Gate units: the affine sub-computations recurrent layers are built from.
//!
//! Every gated layer runs the same contract on each of its gates: an affine
//! forward on the input, an optional recurrent term, an activation, and the
//! conversion of the gate error into parameter gradients and back-projected
//! errors.

use crate::activation::ActivationFunction;
use crate::array::{outer, AugmentedArray, InputView};
use crate::error::Result;
use crate::params::{Gradient, UnitErrors, UnitParams};
use ndarray::Array1;

/// `W·x + b`
pub(crate) fn affine(params: &UnitParams, x: InputView<'_>) -> Result<Array1<f64>> {
    let mut values = x.dot(&params.w()?)?;
    values += &params.b()?;
    Ok(values)
}

/// Gradients of a unit given its error `e` w.r.t. the pre-activation.
///
/// The recurrent gradient is `e ⊗ y_prev` when a previous output exists and
/// zero otherwise.
pub(crate) fn params_gradients(
    params: &UnitParams,
    errors: &Array1<f64>,
    x: InputView<'_>,
    y_prev: Option<&Array1<f64>>,
) -> UnitErrors {
    UnitErrors {
        weights: x.outer(errors),
        biases: Gradient::Dense(errors.clone().into_dyn()),
        recurrent_weights: params.recurrent_weights.as_ref().map(|recurrent| match y_prev {
            Some(y_prev) => Gradient::Dense(outer(errors, &y_prev.view()).into_dyn()),
            None => recurrent.zeros_gradient(),
        }),
    }
}

/// A single gate of a layer.
#[derive(Debug, Clone, PartialEq)]
pub struct GateUnit {
    /// Values and errors of the gate
    pub array: AugmentedArray,
}

impl GateUnit {
    /// Zero-filled gate of the given size.
    pub fn new(size: usize) -> Self {
        Self {
            array: AugmentedArray::zeros(size),
        }
    }

    /// Set the gate to `W·x + b`, not yet activated.
    pub fn forward(&mut self, params: &UnitParams, x: InputView<'_>) -> Result<()> {
        self.array.assign_values(affine(params, x)?)
    }

    /// Add `Wrec·y_prev` to the not-activated values.
    pub fn add_recurrent_contribution(
        &mut self,
        params: &UnitParams,
        y_prev: &Array1<f64>,
    ) -> Result<()> {
        let contribution = params.w_rec()?.dot(y_prev);
        self.array.add_to_values(&contribution)
    }

    /// Forward, add the recurrent term when `y_prev` is given, and activate.
    pub fn forward_activated(
        &mut self,
        params: &UnitParams,
        x: InputView<'_>,
        y_prev: Option<&Array1<f64>>,
        activation: Option<ActivationFunction>,
    ) -> Result<()> {
        self.forward(params, x)?;
        if let Some(y_prev) = y_prev {
            self.add_recurrent_contribution(params, y_prev)?;
        }
        self.activate(activation)
    }

    /// Activate the gate.
    pub fn activate(&mut self, activation: Option<ActivationFunction>) -> Result<()> {
        self.array.activate(activation)
    }

    /// Activated values.
    pub fn values(&self) -> &Array1<f64> {
        self.array.values()
    }

    /// Errors w.r.t. the pre-activation.
    pub fn errors(&self) -> &Array1<f64> {
        self.array.errors()
    }

    /// Derivative of the activation at the current values.
    pub fn derivative(&self, activation: Option<ActivationFunction>) -> Array1<f64> {
        self.array.activation_derivative(activation)
    }

    /// Set the errors w.r.t. the pre-activation.
    pub fn assign_errors(&mut self, errors: Array1<f64>) -> Result<()> {
        self.array.assign_errors(errors)
    }

    /// Gradients of the gate parameters from the current errors.
    pub fn assign_params_gradients(
        &self,
        params: &UnitParams,
        x: InputView<'_>,
        y_prev: Option<&Array1<f64>>,
    ) -> UnitErrors {
        params_gradients(params, self.errors(), x, y_prev)
    }

    /// `Wᵗ·e`
    pub fn input_errors(&self, params: &UnitParams) -> Result<Array1<f64>> {
        Ok(params.w()?.t().dot(self.errors()))
    }

    /// `Wrecᵗ·e`
    pub fn recurrent_errors(&self, params: &UnitParams) -> Result<Array1<f64>> {
        Ok(params.w_rec()?.t().dot(self.errors()))
    }
}
