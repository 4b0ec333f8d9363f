//! Potential tables.

use scirs2_core::ndarray::ArrayD;

use crate::error::{PgmError, Result};

/// A dense, non-negative table over the joint states of a factor's neighbours.
///
/// Represents φ(X₁, X₂, ..., Xₖ) → ℝ⁺ with axis `i` indexed by the states of
/// the factor's `i`-th neighbour. The shape is fixed once the table is placed
/// in a model slot; [`PotentialTable::reset`] replaces the values only.
#[derive(Clone, Debug, PartialEq)]
pub struct PotentialTable {
    values: ArrayD<f64>,
}

impl PotentialTable {
    /// Create a table, rejecting negative or non-finite entries.
    pub fn new(values: ArrayD<f64>) -> Result<Self> {
        if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(PgmError::InvalidDistribution(format!(
                "Potential values must be finite and non-negative, found {}",
                bad
            )));
        }
        Ok(Self { values })
    }

    /// Create a table from a shape and row-major values.
    pub fn from_shape_vec(shape: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        let len = values.len();
        let array = ArrayD::from_shape_vec(shape.clone(), values).map_err(|_| {
            PgmError::DimensionMismatch {
                expected: shape,
                got: vec![len],
            }
        })?;
        Self::new(array)
    }

    /// Create a table filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self {
            values: ArrayD::from_elem(shape.to_vec(), 1.0),
        }
    }

    /// Create a scalar (zero-dimensional) table.
    pub fn scalar(value: f64) -> Result<Self> {
        Self::from_shape_vec(Vec::new(), vec![value])
    }

    /// Table shape, one extent per neighbour.
    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    /// Number of neighbours the table covers.
    pub fn ndim(&self) -> usize {
        self.values.ndim()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The raw values.
    pub fn values(&self) -> &ArrayD<f64> {
        &self.values
    }

    /// Consume the table, returning its values.
    pub fn into_values(self) -> ArrayD<f64> {
        self.values
    }

    /// Value at a joint configuration.
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        self.values.get(index).copied()
    }

    /// Element-wise natural logarithm; zero entries map to `-inf`.
    pub fn log_values(&self) -> ArrayD<f64> {
        self.values.mapv(f64::ln)
    }

    /// Replace the values in place, keeping the shape.
    pub fn reset(&mut self, other: PotentialTable) -> Result<()> {
        check_shape(self.shape(), other.shape())?;
        self.values = other.values;
        Ok(())
    }
}

impl TryFrom<ArrayD<f64>> for PotentialTable {
    type Error = PgmError;

    fn try_from(values: ArrayD<f64>) -> Result<Self> {
        Self::new(values)
    }
}

impl From<PotentialTable> for ArrayD<f64> {
    fn from(table: PotentialTable) -> Self {
        table.values
    }
}

/// Fail with [`PgmError::DimensionMismatch`] unless the shapes agree.
pub(crate) fn check_shape(expected: &[usize], got: &[usize]) -> Result<()> {
    if expected != got {
        return Err(PgmError::DimensionMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray::Array;

    #[test]
    fn test_table_creation() {
        let values = Array::from_shape_vec(vec![2, 3], vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6])
            .unwrap()
            .into_dyn();
        let table = PotentialTable::new(values).unwrap();

        assert_eq!(table.shape(), &[2, 3]);
        assert_eq!(table.ndim(), 2);
        assert_eq!(table.len(), 6);
        assert_eq!(table.get(&[1, 2]), Some(0.6));
        assert_eq!(table.get(&[2, 0]), None);
    }

    #[test]
    fn test_rejects_negative_values() {
        let result = PotentialTable::from_shape_vec(vec![2], vec![0.5, -0.1]);
        assert!(matches!(result, Err(PgmError::InvalidDistribution(_))));
    }

    #[test]
    fn test_rejects_non_finite_values() {
        assert!(PotentialTable::from_shape_vec(vec![2], vec![f64::NAN, 1.0]).is_err());
        assert!(PotentialTable::from_shape_vec(vec![1], vec![f64::INFINITY]).is_err());
    }

    #[test]
    fn test_shape_value_count_mismatch() {
        let result = PotentialTable::from_shape_vec(vec![2, 2], vec![1.0, 2.0, 3.0]);
        assert!(matches!(result, Err(PgmError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_scalar_table() {
        let table = PotentialTable::scalar(3.0).unwrap();
        assert_eq!(table.ndim(), 0);
        assert_eq!(table.get(&[]), Some(3.0));
    }

    #[test]
    fn test_log_values() {
        let table = PotentialTable::from_shape_vec(vec![3], vec![0.0, 1.0, 2.0]).unwrap();
        let logs = table.log_values();

        assert_eq!(logs[[0]], f64::NEG_INFINITY);
        assert_eq!(logs[[1]], 0.0);
        assert!((logs[[2]] - 2.0f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_reset_preserves_shape() {
        let mut table = PotentialTable::ones(&[2, 2]);
        let replacement = PotentialTable::from_shape_vec(vec![2, 2], vec![2.0, 1.0, 1.0, 2.0]).unwrap();
        table.reset(replacement).unwrap();
        assert_eq!(table.get(&[0, 0]), Some(2.0));

        let wrong = PotentialTable::ones(&[2, 3]);
        let err = table.reset(wrong).unwrap_err();
        assert_eq!(
            err,
            PgmError::DimensionMismatch {
                expected: vec![2, 2],
                got: vec![2, 3],
            }
        );
        assert_eq!(table.get(&[0, 0]), Some(2.0));
    }
}
