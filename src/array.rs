//! Arrays flowing through layers.
//!
//! Inputs may be dense, sparse or sparse-binary; the kind travels with the
//! data as an [`InputArray`] tag so weight products branch in one place.
//! Layer outputs are always dense [`AugmentedArray`]s carrying pre-activation
//! values, activated values, errors and an optional relevance vector.

use crate::activation::ActivationFunction;
use crate::error::{NetworkError, Result};
use crate::params::{Gradient, SparseGradient};
use ndarray::{Array1, ArrayView1, ArrayView2, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of array a layer accepts as input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InputType {
    /// Dense vector
    #[default]
    Dense,
    /// Sparse vector with explicit values
    Sparse,
    /// Sparse vector whose active components are all 1.0
    SparseBinary,
}

impl InputType {
    /// Whether the input is sparse or sparse-binary.
    pub fn is_sparse(&self) -> bool {
        *self != InputType::Dense
    }
}

/// A sparse vector stored as sorted `(index, value)` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    size: usize,
    entries: Vec<(usize, f64)>,
}

impl SparseVector {
    /// Create a sparse vector, sorting the entries by index.
    pub fn new(size: usize, mut entries: Vec<(usize, f64)>) -> Result<Self> {
        entries.sort_by_key(|&(index, _)| index);
        check_indices(size, entries.iter().map(|&(index, _)| index))?;
        Ok(Self { size, entries })
    }

    /// Declared length of the vector.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Non-zero entries in increasing index order.
    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    /// Dense copy of the vector.
    pub fn to_dense(&self) -> Array1<f64> {
        let mut dense = Array1::zeros(self.size);
        for &(index, value) in &self.entries {
            dense[index] = value;
        }
        dense
    }
}

/// A sparse binary vector: only the indices of the ones are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseBinaryVector {
    size: usize,
    active: Vec<usize>,
}

impl SparseBinaryVector {
    /// Create a sparse binary vector from the indices of its ones.
    pub fn new(size: usize, mut active: Vec<usize>) -> Result<Self> {
        active.sort_unstable();
        check_indices(size, active.iter().copied())?;
        Ok(Self { size, active })
    }

    /// Declared length of the vector.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Indices of the ones in increasing order.
    pub fn active(&self) -> &[usize] {
        &self.active
    }
}

fn check_indices(size: usize, indices: impl Iterator<Item = usize>) -> Result<()> {
    let mut previous: Option<usize> = None;
    for index in indices {
        if index >= size {
            return Err(NetworkError::invalid_parameter(
                "index",
                &index.to_string(),
                &format!("must be lower than the vector size {}", size),
            ));
        }
        if previous == Some(index) {
            return Err(NetworkError::invalid_parameter(
                "index",
                &index.to_string(),
                "duplicated entry",
            ));
        }
        previous = Some(index);
    }
    Ok(())
}

/// Features given to the first layer of a structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputArray {
    /// Dense vector
    Dense(Array1<f64>),
    /// Sparse vector
    Sparse(SparseVector),
    /// Sparse binary vector
    SparseBinary(SparseBinaryVector),
}

impl InputArray {
    /// Build a sparse binary input.
    pub fn sparse_binary(size: usize, active: Vec<usize>) -> Result<Self> {
        Ok(Self::SparseBinary(SparseBinaryVector::new(size, active)?))
    }

    /// Build a sparse input.
    pub fn sparse(size: usize, entries: Vec<(usize, f64)>) -> Result<Self> {
        Ok(Self::Sparse(SparseVector::new(size, entries)?))
    }

    /// Borrow the array.
    pub fn view(&self) -> InputView<'_> {
        match self {
            InputArray::Dense(values) => InputView::Dense(values.view()),
            InputArray::Sparse(vector) => InputView::Sparse(vector),
            InputArray::SparseBinary(vector) => InputView::SparseBinary(vector),
        }
    }

    /// Length of the vector.
    pub fn size(&self) -> usize {
        self.view().size()
    }

    /// Kind of the array.
    pub fn input_type(&self) -> InputType {
        self.view().input_type()
    }
}

impl From<Array1<f64>> for InputArray {
    fn from(values: Array1<f64>) -> Self {
        InputArray::Dense(values)
    }
}

/// Borrowed input of a layer.
///
/// Interior layers receive a dense view on the output values of the previous
/// layer, so no copy happens at layer boundaries.
#[derive(Debug, Clone, Copy)]
pub enum InputView<'a> {
    /// Dense view
    Dense(ArrayView1<'a, f64>),
    /// Sparse vector
    Sparse(&'a SparseVector),
    /// Sparse binary vector
    SparseBinary(&'a SparseBinaryVector),
}

impl<'a> InputView<'a> {
    /// Shorter-lived copy of the view.
    pub fn reborrow(&self) -> InputView<'_> {
        match self {
            InputView::Dense(values) => InputView::Dense(values.reborrow()),
            InputView::Sparse(vector) => InputView::Sparse(vector),
            InputView::SparseBinary(vector) => InputView::SparseBinary(vector),
        }
    }

    /// Length of the vector.
    pub fn size(&self) -> usize {
        match self {
            InputView::Dense(values) => values.len(),
            InputView::Sparse(vector) => vector.size(),
            InputView::SparseBinary(vector) => vector.size(),
        }
    }

    /// Kind of the array.
    pub fn input_type(&self) -> InputType {
        match self {
            InputView::Dense(_) => InputType::Dense,
            InputView::Sparse(_) => InputType::Sparse,
            InputView::SparseBinary(_) => InputType::SparseBinary,
        }
    }

    /// Owned copy.
    pub fn to_owned(&self) -> InputArray {
        match self {
            InputView::Dense(values) => InputArray::Dense(values.to_owned()),
            InputView::Sparse(vector) => InputArray::Sparse((*vector).clone()),
            InputView::SparseBinary(vector) => InputArray::SparseBinary((*vector).clone()),
        }
    }

    /// Dense copy.
    pub fn to_dense(&self) -> Array1<f64> {
        match self {
            InputView::Dense(values) => values.to_owned(),
            InputView::Sparse(vector) => vector.to_dense(),
            InputView::SparseBinary(vector) => {
                let mut dense = Array1::zeros(vector.size());
                for &index in vector.active() {
                    dense[index] = 1.0;
                }
                dense
            }
        }
    }

    /// Matrix product `W·x` with `W` of shape `(out, in)`.
    pub fn dot(&self, weights: &ArrayView2<f64>) -> Result<Array1<f64>> {
        if weights.ncols() != self.size() {
            return Err(NetworkError::size_mismatch(
                "input",
                weights.ncols(),
                self.size(),
            ));
        }

        Ok(match self {
            InputView::Dense(values) => weights.dot(values),
            InputView::Sparse(vector) => {
                let mut result = Array1::zeros(weights.nrows());
                for &(index, value) in vector.entries() {
                    result.scaled_add(value, &weights.column(index));
                }
                result
            }
            InputView::SparseBinary(vector) => {
                let mut result = Array1::zeros(weights.nrows());
                for &index in vector.active() {
                    result += &weights.column(index);
                }
                result
            }
        })
    }

    /// Outer product `e ⊗ xᵗ`.
    ///
    /// Sparse inputs give a sparse gradient holding only the columns of the
    /// active input components.
    pub fn outer(&self, errors: &Array1<f64>) -> Gradient {
        match self {
            InputView::Dense(values) => Gradient::Dense(outer(errors, values).into_dyn()),
            InputView::Sparse(vector) => {
                let columns = vector
                    .entries()
                    .iter()
                    .map(|&(index, value)| (index, errors * value))
                    .collect::<BTreeMap<_, _>>();
                Gradient::Sparse(SparseGradient::new(errors.len(), vector.size(), columns))
            }
            InputView::SparseBinary(vector) => {
                let columns = vector
                    .active()
                    .iter()
                    .map(|&index| (index, errors.clone()))
                    .collect::<BTreeMap<_, _>>();
                Gradient::Sparse(SparseGradient::new(errors.len(), vector.size(), columns))
            }
        }
    }
}

/// Outer product of two dense vectors.
pub(crate) fn outer(a: &Array1<f64>, b: &ArrayView1<f64>) -> ndarray::Array2<f64> {
    let column = a.view().insert_axis(ndarray::Axis(1));
    let row = b.view().insert_axis(ndarray::Axis(0));
    column.dot(&row)
}

/// Dense array produced by a layer or a gate.
///
/// `values` mirrors `not_activated` until [`AugmentedArray::activate`] is
/// called with an activation function.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedArray {
    not_activated: Array1<f64>,
    values: Array1<f64>,
    errors: Array1<f64>,
    relevance: Option<Array1<f64>>,
}

impl AugmentedArray {
    /// Zero-filled array of the given size.
    pub fn zeros(size: usize) -> Self {
        Self {
            not_activated: Array1::zeros(size),
            values: Array1::zeros(size),
            errors: Array1::zeros(size),
            relevance: None,
        }
    }

    /// Length of the array.
    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// Current values (activated once `activate` has run).
    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    /// Values before the activation function.
    pub fn not_activated(&self) -> &Array1<f64> {
        &self.not_activated
    }

    /// Errors assigned during backward.
    pub fn errors(&self) -> &Array1<f64> {
        &self.errors
    }

    /// Relevance assigned during relevance propagation.
    pub fn relevance(&self) -> Option<&Array1<f64>> {
        self.relevance.as_ref()
    }

    /// Set new not-activated values; `values` mirrors them.
    pub fn assign_values(&mut self, values: Array1<f64>) -> Result<()> {
        self.check_size("values", values.len())?;
        self.values.assign(&values);
        self.not_activated = values;
        Ok(())
    }

    /// Add to the not-activated values.
    pub fn add_to_values(&mut self, values: &Array1<f64>) -> Result<()> {
        self.check_size("values", values.len())?;
        self.not_activated += values;
        self.values.assign(&self.not_activated);
        Ok(())
    }

    /// Apply the activation function to the not-activated values.
    ///
    /// Running it twice gives the same result.
    pub fn activate(&mut self, activation: Option<ActivationFunction>) -> Result<()> {
        match activation {
            Some(function) => self.values = function.f(&self.not_activated)?,
            None => self.values.assign(&self.not_activated),
        }
        Ok(())
    }

    /// Derivative of the activation at the current values.
    pub fn activation_derivative(&self, activation: Option<ActivationFunction>) -> Array1<f64> {
        match activation {
            Some(function) => function.df(&self.values, &self.not_activated),
            None => Array1::ones(self.size()),
        }
    }

    /// Replace the errors.
    pub fn assign_errors(&mut self, errors: Array1<f64>) -> Result<()> {
        self.check_size("errors", errors.len())?;
        self.errors = errors;
        Ok(())
    }

    /// Add to the errors.
    pub fn add_errors(&mut self, errors: &Array1<f64>) -> Result<()> {
        self.check_size("errors", errors.len())?;
        self.errors += errors;
        Ok(())
    }

    /// Turn the errors w.r.t. the activated values into errors w.r.t. the
    /// not-activated values, in place.
    pub fn activation_backward(&mut self, activation: Option<ActivationFunction>) {
        if let Some(function) = activation {
            self.errors = function.backward(&self.values, &self.not_activated, &self.errors);
        }
    }

    /// Replace the relevance.
    pub fn assign_relevance(&mut self, relevance: Array1<f64>) -> Result<()> {
        self.check_size("relevance", relevance.len())?;
        self.relevance = Some(relevance);
        Ok(())
    }

    fn check_size(&self, what: &str, size: usize) -> Result<()> {
        if size != self.size() {
            return Err(NetworkError::size_mismatch(what, self.size(), size));
        }
        Ok(())
    }
}

/// Components kept by one inverted-dropout draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DropoutMask {
    keep_prob: f64,
    kept: Vec<bool>,
}

impl DropoutMask {
    /// Number of zeroed components.
    pub fn dropped_count(&self) -> usize {
        self.kept.iter().filter(|&&kept| !kept).count()
    }

    /// Whether the component at `index` survived.
    pub fn is_kept(&self, index: usize) -> bool {
        self.kept.get(index).copied().unwrap_or(false)
    }

    /// Errors w.r.t. the original input from errors w.r.t. the dropped input.
    pub fn apply_to_errors(&self, errors: &Array1<f64>) -> Array1<f64> {
        let mut result = errors.clone();
        for (value, &kept) in result.iter_mut().zip(&self.kept) {
            *value = if kept { *value / self.keep_prob } else { 0.0 };
        }
        result
    }
}

/// Inverted dropout: each component is zeroed with probability `rate` and the
/// survivors are divided by `1 - rate`.
///
/// Sparse-binary inputs become sparse inputs since their survivors no longer
/// equal one.
pub fn apply_dropout<R: Rng + ?Sized>(
    input: InputView<'_>,
    rate: f64,
    rng: &mut R,
) -> (InputArray, DropoutMask) {
    let keep_prob = 1.0 - rate;
    let kept: Vec<bool> = (0..input.size())
        .map(|_| rng.gen::<f64>() < keep_prob)
        .collect();

    let dropped = match input {
        InputView::Dense(values) => {
            let mut result = values.to_owned();
            Zip::from(&mut result)
                .and(&Array1::from(kept.clone()))
                .for_each(|v, &k| *v = if k { *v / keep_prob } else { 0.0 });
            InputArray::Dense(result)
        }
        InputView::Sparse(vector) => InputArray::Sparse(SparseVector {
            size: vector.size(),
            entries: vector
                .entries()
                .iter()
                .filter(|&&(index, _)| kept[index])
                .map(|&(index, value)| (index, value / keep_prob))
                .collect(),
        }),
        InputView::SparseBinary(vector) => InputArray::Sparse(SparseVector {
            size: vector.size(),
            entries: vector
                .active()
                .iter()
                .filter(|&&index| kept[index])
                .map(|&index| (index, 1.0 / keep_prob))
                .collect(),
        }),
    };

    (dropped, DropoutMask { keep_prob, kept })
}

/// Keep only the `k` components of largest magnitude (meProp).
pub fn me_prop_mask(errors: &Array1<f64>, k: usize) -> Array1<f64> {
    if k >= errors.len() {
        return errors.clone();
    }

    let mut order: Vec<usize> = (0..errors.len()).collect();
    order.sort_by(|&a, &b| {
        errors[b]
            .abs()
            .partial_cmp(&errors[a].abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut masked = Array1::zeros(errors.len());
    for &index in &order[..k] {
        masked[index] = errors[index];
    }
    masked
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_dot_matches_across_input_types() {
        let weights =
            Array2::from_shape_vec((2, 4), vec![0.1, 0.2, 0.3, 0.4, -0.5, 0.6, -0.7, 0.8]).unwrap();

        let dense = InputArray::Dense(Array1::from(vec![0.0, 1.0, 0.0, 1.0]));
        let sparse = InputArray::sparse(4, vec![(3, 1.0), (1, 1.0)]).unwrap();
        let binary = InputArray::sparse_binary(4, vec![1, 3]).unwrap();

        let expected = dense.view().dot(&weights.view()).unwrap();
        for input in [&sparse, &binary] {
            let result = input.view().dot(&weights.view()).unwrap();
            for (a, b) in result.iter().zip(expected.iter()) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
            }
        }
        assert_abs_diff_eq!(expected[0], 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(expected[1], 1.4, epsilon = 1e-12);
    }

    #[test]
    fn test_sparse_outer_keeps_active_columns() {
        let errors = Array1::from(vec![0.5, -1.0]);
        let input = InputArray::sparse(5, vec![(4, 2.0), (1, -1.0)]).unwrap();

        match input.view().outer(&errors) {
            Gradient::Sparse(gradient) => {
                assert_eq!(gradient.columns().len(), 2);
                assert_eq!(gradient.columns()[&4], Array1::from(vec![1.0, -2.0]));
                assert_eq!(gradient.columns()[&1], Array1::from(vec![-0.5, 1.0]));
            }
            Gradient::Dense(_) => panic!("expected a sparse gradient"),
        }
    }

    #[test]
    fn test_invalid_sparse_indices() {
        assert!(InputArray::sparse_binary(3, vec![0, 3]).is_err());
        assert!(InputArray::sparse(3, vec![(1, 0.5), (1, 0.2)]).is_err());
    }

    #[test]
    fn test_activate_is_idempotent() {
        let mut array = AugmentedArray::zeros(3);
        array
            .assign_values(Array1::from(vec![-1.0, 0.0, 2.0]))
            .unwrap();
        assert_eq!(array.values(), array.not_activated());

        array.activate(Some(ActivationFunction::Tanh)).unwrap();
        let first = array.values().clone();
        array.activate(Some(ActivationFunction::Tanh)).unwrap();

        assert_eq!(&first, array.values());
        assert_abs_diff_eq!(first[2], 2.0_f64.tanh(), epsilon = 1e-12);
    }

    #[test]
    fn test_assign_errors_shape_mismatch() {
        let mut array = AugmentedArray::zeros(3);
        let result = array.assign_errors(Array1::zeros(2));
        assert!(matches!(result, Err(NetworkError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_dropout_expectation() {
        let mut rng = StdRng::seed_from_u64(743);
        let values = Array1::from_elem(100_000, 0.3);
        let keep_prob = 0.75;

        let (dropped, mask) = apply_dropout(InputView::Dense(values.view()), 0.25, &mut rng);
        let dropped = match dropped {
            InputArray::Dense(values) => values,
            _ => panic!("dense input must stay dense"),
        };

        let zeros = dropped.iter().filter(|&&v| v == 0.0).count();
        assert!((24_500..=25_500).contains(&zeros), "zeros = {}", zeros);
        assert_eq!(zeros, mask.dropped_count());

        for (index, &value) in dropped.iter().enumerate() {
            if mask.is_kept(index) {
                assert_eq!(value, 0.3 / keep_prob);
            }
        }
    }

    #[test]
    fn test_dropout_sparse_binary_becomes_sparse() {
        let mut rng = StdRng::seed_from_u64(1);
        let input = InputArray::sparse_binary(6, vec![0, 2, 5]).unwrap();

        let (dropped, mask) = apply_dropout(input.view(), 0.5, &mut rng);
        match dropped {
            InputArray::Sparse(vector) => {
                for &(index, value) in vector.entries() {
                    assert!(mask.is_kept(index));
                    assert_eq!(value, 2.0);
                }
            }
            _ => panic!("expected a sparse input"),
        }
        assert!(!mask.is_kept(6));
        assert!(!mask.is_kept(100));
    }

    #[test]
    fn test_reborrowed_view_matches() {
        let values = Array1::from(vec![0.5, -0.5, 1.0]);
        let view = InputView::Dense(values.view());
        let reborrowed = view.reborrow();
        assert_eq!(reborrowed.size(), 3);
        assert_eq!(reborrowed.to_dense(), values);

        let binary = InputArray::sparse_binary(4, vec![1]).unwrap();
        let view = binary.view();
        assert_eq!(view.reborrow().input_type(), InputType::SparseBinary);
    }

    #[test]
    fn test_me_prop_mask() {
        let errors = Array1::from(vec![0.1, -0.9, 0.4, -0.2]);
        let masked = me_prop_mask(&errors, 2);
        assert_eq!(masked, Array1::from(vec![0.0, -0.9, 0.4, 0.0]));
        assert_eq!(me_prop_mask(&errors, 10), errors);
    }
}
