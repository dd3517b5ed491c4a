//! Accumulation of gradients across examples and time steps.

use crate::error::Result;
use crate::params::{Gradient, ParamsErrors};

/// Running sum of gradients keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradientAccumulator {
    errors: ParamsErrors,
    count: usize,
}

impl GradientAccumulator {
    /// Empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a copy of `errors` to the running sum.
    pub fn accumulate(&mut self, errors: &ParamsErrors) -> Result<()> {
        if self.count == 0 {
            self.errors = errors.clone();
        } else {
            for entry in errors.iter() {
                self.add(&entry.name, &entry.gradient)?;
            }
        }
        self.count += 1;
        Ok(())
    }

    /// Add `errors` to the running sum, storing them by move when the
    /// accumulator is empty.
    pub fn accumulate_owned(&mut self, errors: ParamsErrors) -> Result<()> {
        if self.count == 0 {
            self.errors = errors;
            self.count = 1;
            Ok(())
        } else {
            self.accumulate(&errors)
        }
    }

    /// Divide the sum by the number of accumulations.
    ///
    /// The averaged errors then count as a single accumulation.
    pub fn average_errors(&mut self) {
        if self.count > 1 {
            let count = self.count as f64;
            for entry in &mut self.errors.gradients {
                entry.gradient.div_assign(count);
            }
            self.count = 1;
        }
    }

    /// Drop every accumulated gradient.
    pub fn reset(&mut self) {
        self.errors = ParamsErrors::new();
        self.count = 0;
    }

    /// Whether nothing was accumulated since the last reset.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of accumulations since the last reset.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Accumulated gradient of the parameter called `name`.
    pub fn get(&self, name: &str) -> Option<&Gradient> {
        self.errors.get(name)
    }

    /// Accumulated gradients.
    pub fn errors(&self) -> &ParamsErrors {
        &self.errors
    }

    pub(crate) fn errors_mut(&mut self) -> &mut ParamsErrors {
        &mut self.errors
    }

    fn add(&mut self, name: &str, gradient: &Gradient) -> Result<()> {
        match self.errors.gradients.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.gradient.add_assign(gradient),
            None => {
                self.errors.push(name, gradient.clone());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use crate::params::SparseGradient;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, Array1};
    use std::collections::BTreeMap;

    fn context_vector(values: &[f64]) -> ParamsErrors {
        let mut errors = ParamsErrors::new();
        errors.push("attention.context_vector", Gradient::Dense(arr1(values).into_dyn()));
        errors
    }

    #[test]
    fn test_average_of_two_contributions() {
        let mut accumulator = GradientAccumulator::new();
        accumulator.accumulate(&context_vector(&[0.2, -0.5])).unwrap();
        accumulator
            .accumulate_owned(context_vector(&[0.4, -0.3]))
            .unwrap();
        assert_eq!(accumulator.count(), 2);

        accumulator.average_errors();
        let averaged = accumulator.get("attention.context_vector").unwrap().to_dense();
        assert_abs_diff_eq!(averaged[[0]], 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(averaged[[1]], -0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_accumulate_does_not_alias_the_source() {
        let mut source = context_vector(&[1.0, 1.0]);
        let mut accumulator = GradientAccumulator::new();
        accumulator.accumulate(&source).unwrap();

        source.gradients[0].gradient.map_inplace(|_| 0.0);
        let stored = accumulator.get("attention.context_vector").unwrap();
        assert_eq!(stored.to_dense().sum(), 2.0);
    }

    #[test]
    fn test_reset() {
        let mut accumulator = GradientAccumulator::new();
        accumulator.accumulate(&context_vector(&[1.0, 2.0])).unwrap();
        accumulator.reset();
        assert!(accumulator.is_empty());
        assert!(accumulator.get("attention.context_vector").is_none());
    }

    #[test]
    fn test_incompatible_errors() {
        let mut accumulator = GradientAccumulator::new();
        accumulator.accumulate(&context_vector(&[1.0, 2.0])).unwrap();

        let mut sparse = ParamsErrors::new();
        let mut columns = BTreeMap::new();
        columns.insert(0, Array1::ones(2));
        sparse.push(
            "attention.context_vector",
            Gradient::Sparse(SparseGradient::new(2, 1, columns)),
        );
        assert!(matches!(
            accumulator.accumulate(&sparse),
            Err(NetworkError::Optimizer { .. })
        ));
        assert!(accumulator.accumulate(&context_vector(&[1.0])).is_err());
    }

    #[test]
    fn test_sparse_columns_are_merged() {
        let sparse = |index: usize, value: f64| {
            let mut columns = BTreeMap::new();
            columns.insert(index, Array1::from_elem(2, value));
            let mut errors = ParamsErrors::new();
            errors.push(
                "layer0.unit.weights",
                Gradient::Sparse(SparseGradient::new(2, 4, columns)),
            );
            errors
        };

        let mut accumulator = GradientAccumulator::new();
        accumulator.accumulate(&sparse(1, 1.0)).unwrap();
        accumulator.accumulate(&sparse(3, 3.0)).unwrap();
        accumulator.average_errors();

        match accumulator.get("layer0.unit.weights").unwrap() {
            Gradient::Sparse(gradient) => {
                assert_eq!(gradient.columns().len(), 2);
                assert_eq!(gradient.columns()[&1], Array1::from_elem(2, 0.5));
                assert_eq!(gradient.columns()[&3], Array1::from_elem(2, 1.5));
            }
            _ => panic!("sparse errors expected"),
        }
    }
}
