//! Error types for factor graph operations.

use thiserror::Error;

/// Errors that can occur while building or querying a factor graph.
///
/// Every variant describes a structural precondition violation. Numeric edge
/// cases such as evidence with zero probability are not errors: they surface
/// as `log Z = -inf`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PgmError {
    /// A table does not have the shape its factor requires.
    #[error("Dimension mismatch: expected {expected:?}, got {got:?}")]
    DimensionMismatch { expected: Vec<usize>, got: Vec<usize> },

    /// A reset supplied the wrong number of tables.
    #[error("Expected {expected} potential tables, got {got}")]
    PotentialCount { expected: usize, got: usize },

    /// An evidence vector does not cover every variable.
    #[error("Evidence length mismatch: expected {expected} entries (or none), got {got}")]
    EvidenceLength { expected: usize, got: usize },

    /// An observed state is outside the variable's domain.
    #[error("State {state} out of range for variable {variable} with cardinality {cardinality}")]
    StateOutOfRange {
        variable: usize,
        state: usize,
        cardinality: usize,
    },

    /// A dataset record does not have one entry per variable.
    #[error("Record {record} has {got} columns, expected {expected}")]
    DatasetShape {
        record: usize,
        expected: usize,
        got: usize,
    },

    /// Invalid factor graph structure.
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// Invalid probability distribution or potential values.
    #[error("Invalid distribution: {0}")]
    InvalidDistribution(String),

    /// An expectation was requested before score tables were installed.
    #[error("No score tables installed")]
    MissingScores,
}

/// Result type for factor graph operations.
pub type Result<T> = std::result::Result<T, PgmError>;
