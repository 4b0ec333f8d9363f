//! Exact inference on discrete factor graphs.
//!
//! A [`FactorGraph`] couples discrete variables through non-negative
//! potential tables. Tables live in slots, and several factors may read the
//! same slot (tied parameters). On loop-free graphs this crate computes, in
//! one or two sweeps of log-space message passing:
//!
//! - the normalization constant `Z` and its logarithm ([`SumProduct`]),
//! - variable and factor marginals ([`Beliefs`]),
//! - the most probable joint assignment ([`MaxSum`]),
//! - exact samples from the model or the posterior ([`AncestralSampler`]),
//! - expected sufficient statistics over partially observed data
//!   ([`ExpectedCounts`]), the E-step of expectation-maximization,
//! - log-likelihoods, and expectations and cumulant generating functions
//!   of additive score functions.
//!
//! Evidence is one [`StateMask`] per variable; an empty slice means nothing
//! is observed.
//!
//! # Architecture
//!
//! ```text
//! FactorGraph ──► MessageStore ──► SumProduct ──► Beliefs ──► AncestralSampler
//!   (slots,         (collect /        │                 └────► ExpectedCounts
//!    schedule)       distribute)      └─► MaxSum ──► MapAssignment
//! ```
//!
//! # Example
//!
//! ```
//! use dfgraph::{FactorGraph, MaxSum, PotentialTable, StateMask, SumProduct};
//!
//! let table = PotentialTable::from_shape_vec(vec![2, 2], vec![2.0, 1.0, 1.0, 2.0])?;
//! let graph = FactorGraph::new(vec![2, 2], vec![table], vec![vec![0, 1]], vec![0])?;
//!
//! let beliefs = SumProduct::new().run(&graph, &[])?;
//! assert!((beliefs.norm_const() - 6.0).abs() < 1e-10);
//!
//! let map = MaxSum::new().run(&graph, &[StateMask::Unobserved, StateMask::Observed(1)])?;
//! assert_eq!(map.states, vec![1, 1]);
//! # Ok::<(), dfgraph::PgmError>(())
//! ```

mod config;
mod error;
mod expected_counts;
mod graph;
mod inference;
mod max_sum;
mod message_passing;
mod potential;
mod sampling;
mod semiring;
mod state_mask;
mod sum_product;

pub use config::EngineConfig;
pub use error::{PgmError, Result};
pub use expected_counts::{expected_counts, ExpectedCounts};
pub use graph::{FactorGraph, FactorGraphSpec, FactorNode, TableSpec};
pub use inference::{
    cumulant_generating, expect, expect_conditional, likelihood, log_likelihood, Expectation,
    InferenceEngine,
};
pub use max_sum::{MapAssignment, MaxSum};
pub use message_passing::MessagePassingAlgorithm;
pub use potential::PotentialTable;
pub use sampling::{AncestralSampler, Assignment};
pub use semiring::log_sum_exp;
pub use state_mask::{masks_from_observations, masks_from_record, StateMask};
pub use sum_product::{Beliefs, SumProduct};
