//! Gradients of parameter arrays.

use crate::error::{NetworkError, Result};
use ndarray::{Array1, Array2, ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Gradient of a weight matrix with only the columns of the active inputs.
///
/// A sparse input of size `cols` only touches the weight columns of its
/// non-zero components, so the other columns are implicitly zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseGradient {
    rows: usize,
    cols: usize,
    columns: BTreeMap<usize, Array1<f64>>,
}

impl SparseGradient {
    /// Create a sparse gradient of shape `(rows, cols)`.
    pub fn new(rows: usize, cols: usize, columns: BTreeMap<usize, Array1<f64>>) -> Self {
        Self {
            rows,
            cols,
            columns,
        }
    }

    /// Shape of the full matrix.
    pub fn dim(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Non-zero columns by index.
    pub fn columns(&self) -> &BTreeMap<usize, Array1<f64>> {
        &self.columns
    }

    /// Mutable non-zero columns.
    pub fn columns_mut(&mut self) -> &mut BTreeMap<usize, Array1<f64>> {
        &mut self.columns
    }

    /// Dense matrix with zeros outside the active columns.
    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.rows, self.cols));
        for (&index, column) in &self.columns {
            dense.column_mut(index).assign(column);
        }
        dense
    }
}

/// Gradient of one parameter array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Gradient {
    /// Dense gradient with the shape of the parameter
    Dense(ArrayD<f64>),
    /// Sparse gradient of a weight matrix
    Sparse(SparseGradient),
}

impl Gradient {
    /// Dense zero gradient of the given shape.
    pub fn zeros(shape: &[usize]) -> Self {
        Gradient::Dense(ArrayD::zeros(IxDyn(shape)))
    }

    /// Shape of the gradient.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Gradient::Dense(values) => values.shape().to_vec(),
            Gradient::Sparse(sparse) => vec![sparse.rows, sparse.cols],
        }
    }

    /// Whether the gradient is sparse.
    pub fn is_sparse(&self) -> bool {
        matches!(self, Gradient::Sparse(_))
    }

    /// Dense copy.
    pub fn to_dense(&self) -> ArrayD<f64> {
        match self {
            Gradient::Dense(values) => values.clone(),
            Gradient::Sparse(sparse) => sparse.to_dense().into_dyn(),
        }
    }

    /// Check that `other` can be summed into this gradient.
    pub fn check_compatible(&self, other: &Gradient) -> Result<()> {
        if self.is_sparse() != other.is_sparse() {
            return Err(NetworkError::optimizer(format!(
                "Incompatible gradients: cannot mix {} and {} errors",
                self.kind_name(),
                other.kind_name()
            )));
        }
        if self.shape() != other.shape() {
            return Err(NetworkError::optimizer(format!(
                "Incompatible gradients: shape {:?} vs {:?}",
                self.shape(),
                other.shape()
            )));
        }
        Ok(())
    }

    /// Sum `other` into this gradient.
    pub fn add_assign(&mut self, other: &Gradient) -> Result<()> {
        self.check_compatible(other)?;

        match (self, other) {
            (Gradient::Dense(a), Gradient::Dense(b)) => *a += b,
            (Gradient::Sparse(a), Gradient::Sparse(b)) => {
                for (&index, column) in &b.columns {
                    a.columns
                        .entry(index)
                        .and_modify(|existing| *existing += column)
                        .or_insert_with(|| column.clone());
                }
            }
            _ => unreachable!("compatibility checked above"),
        }

        Ok(())
    }

    /// Divide every element by `divisor`.
    pub fn div_assign(&mut self, divisor: f64) {
        match self {
            Gradient::Dense(values) => values.mapv_inplace(|v| v / divisor),
            Gradient::Sparse(sparse) => {
                for column in sparse.columns.values_mut() {
                    column.mapv_inplace(|v| v / divisor);
                }
            }
        }
    }

    /// Apply `f` to every stored element.
    pub fn map_inplace(&mut self, f: impl Fn(f64) -> f64) {
        match self {
            Gradient::Dense(values) => values.mapv_inplace(&f),
            Gradient::Sparse(sparse) => {
                for column in sparse.columns.values_mut() {
                    column.mapv_inplace(&f);
                }
            }
        }
    }

    /// Euclidean norm of the gradient.
    pub fn norm(&self) -> f64 {
        match self {
            Gradient::Dense(values) => values.mapv(|v| v * v).sum().sqrt(),
            Gradient::Sparse(sparse) => sparse
                .columns
                .values()
                .map(|column| column.mapv(|v| v * v).sum())
                .sum::<f64>()
                .sqrt(),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Gradient::Dense(_) => "dense",
            Gradient::Sparse(_) => "sparse",
        }
    }
}

/// Gradient of a named parameter array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamsGradient {
    /// Name of the parameter array
    pub name: String,
    /// `dL/dparam`
    pub gradient: Gradient,
}

/// Ordered gradients of a parameter tree.
///
/// The order matches the iteration order of the parameters that produced
/// them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamsErrors {
    /// Gradients in parameter order
    pub gradients: Vec<ParamsGradient>,
}

impl ParamsErrors {
    /// Empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the gradient of a parameter.
    pub fn push(&mut self, name: impl Into<String>, gradient: Gradient) {
        self.gradients.push(ParamsGradient {
            name: name.into(),
            gradient,
        });
    }

    /// Append every gradient of `other`.
    pub fn extend(&mut self, other: ParamsErrors) {
        self.gradients.extend(other.gradients);
    }

    /// Gradient of the parameter called `name`.
    pub fn get(&self, name: &str) -> Option<&Gradient> {
        self.gradients
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.gradient)
    }

    /// Iterate over the gradients in order.
    pub fn iter(&self) -> std::slice::Iter<'_, ParamsGradient> {
        self.gradients.iter()
    }

    /// Number of gradients.
    pub fn len(&self) -> usize {
        self.gradients.len()
    }

    /// Whether no gradient is stored.
    pub fn is_empty(&self) -> bool {
        self.gradients.is_empty()
    }
}

impl IntoIterator for ParamsErrors {
    type Item = ParamsGradient;
    type IntoIter = std::vec::IntoIter<ParamsGradient>;

    fn into_iter(self) -> Self::IntoIter {
        self.gradients.into_iter()
    }
}

/// Gradients of one gate unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitErrors {
    /// `dL/dW`
    pub weights: Gradient,
    /// `dL/db`
    pub biases: Gradient,
    /// `dL/dWrec` for units with recurrent weights
    pub recurrent_weights: Option<Gradient>,
}
