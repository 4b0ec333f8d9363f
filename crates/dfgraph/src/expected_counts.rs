//! Expected sufficient statistics for parameter learning.
//!
//! The E-step of expectation-maximization: for every record of a partially
//! observed dataset, run sum-product under the record's evidence and add each
//! factor's marginal into the table of the potential slot it reads. Factors
//! sharing a slot contribute to the same table. The M-step (turning counts
//! into new potentials) is left to the caller.
//!
//! # Examples
//!
//! ```
//! use dfgraph::{ExpectedCounts, FactorGraph, PotentialTable, StateMask};
//! use scirs2_core::ndarray::Axis;
//!
//! // Hidden variable 0 emits the observed variable 1
//! let mut graph = FactorGraph::new(
//!     vec![2, 2],
//!     vec![
//!         PotentialTable::from_shape_vec(vec![2], vec![0.5, 0.5])?,
//!         PotentialTable::from_shape_vec(vec![2, 2], vec![0.7, 0.3, 0.4, 0.6])?,
//!     ],
//!     vec![vec![0], vec![0, 1]],
//!     vec![0, 1],
//! )?;
//! let records = vec![
//!     vec![StateMask::Unobserved, StateMask::Observed(0)],
//!     vec![StateMask::Unobserved, StateMask::Observed(1)],
//! ];
//!
//! let mut counts = ExpectedCounts::new(&graph);
//! counts.accumulate_dataset(&graph, &records)?;
//! assert_eq!(counts.num_records(), 2);
//!
//! // M-step: normalise the last axis of every table
//! let tables = counts
//!     .counts()
//!     .iter()
//!     .map(|c| {
//!         let last = Axis(c.ndim() - 1);
//!         let totals = c.sum_axis(last).insert_axis(last);
//!         PotentialTable::new(c / &totals)
//!     })
//!     .collect::<dfgraph::Result<Vec<_>>>()?;
//! graph.reset_potentials(tables)?;
//! # Ok::<(), dfgraph::PgmError>(())
//! ```

use scirs2_core::ndarray::ArrayD;

use crate::error::{PgmError, Result};
use crate::graph::FactorGraph;
use crate::potential::check_shape;
use crate::state_mask::StateMask;
use crate::sum_product::SumProduct;

/// Per-slot expected counts accumulated over records.
#[derive(Clone, Debug)]
pub struct ExpectedCounts {
    /// One table per potential slot, same shape as the slot's potential
    counts: Vec<ArrayD<f64>>,
    num_records: usize,
    /// Σ log Z over accumulated records
    log_likelihood: f64,
}

impl ExpectedCounts {
    /// Zeroed counts shaped like the graph's potential slots.
    pub fn new(graph: &FactorGraph) -> Self {
        Self {
            counts: graph
                .potentials()
                .iter()
                .map(|table| ArrayD::zeros(table.values().raw_dim()))
                .collect(),
            num_records: 0,
            log_likelihood: 0.0,
        }
    }

    /// Reset every table to zero.
    pub fn clear(&mut self) {
        for table in &mut self.counts {
            table.fill(0.0);
        }
        self.num_records = 0;
        self.log_likelihood = 0.0;
    }

    /// Add one set of factor marginals (one per factor) into the slot tables.
    pub fn submit(&mut self, graph: &FactorGraph, factor_marginals: &[ArrayD<f64>]) -> Result<()> {
        if factor_marginals.len() != graph.num_factors() {
            return Err(PgmError::DimensionMismatch {
                expected: vec![graph.num_factors()],
                got: vec![factor_marginals.len()],
            });
        }
        if self.counts.len() != graph.num_potentials() {
            return Err(PgmError::PotentialCount {
                expected: graph.num_potentials(),
                got: self.counts.len(),
            });
        }
        for (node, marginal) in graph.factors().iter().zip(factor_marginals) {
            check_shape(self.counts[node.potential].shape(), marginal.shape())?;
        }

        for (node, marginal) in graph.factors().iter().zip(factor_marginals) {
            self.counts[node.potential] += marginal;
        }
        Ok(())
    }

    /// Run sum-product for one record and add its factor marginals.
    ///
    /// Returns the record's `log Z`. A record with impossible evidence adds
    /// nothing to the counts but drives the log-likelihood to `-inf`.
    pub fn accumulate(&mut self, graph: &FactorGraph, masks: &[StateMask]) -> Result<f64> {
        check_record(graph, 0, masks)?;
        self.accumulate_record(graph, masks)
    }

    fn accumulate_record(&mut self, graph: &FactorGraph, masks: &[StateMask]) -> Result<f64> {
        let beliefs = SumProduct.run(graph, masks)?;
        self.submit(graph, &beliefs.factor_marginals())?;
        self.num_records += 1;
        self.log_likelihood += beliefs.log_norm_const();
        Ok(beliefs.log_norm_const())
    }

    /// Clear, then accumulate every record of a dataset.
    ///
    /// Every record must carry exactly one mask per variable. The whole
    /// dataset is checked before anything is accumulated.
    pub fn accumulate_dataset<R: AsRef<[StateMask]>>(
        &mut self,
        graph: &FactorGraph,
        records: &[R],
    ) -> Result<()> {
        for (index, record) in records.iter().enumerate() {
            check_record(graph, index, record.as_ref())?;
        }

        self.clear();
        for (index, record) in records.iter().enumerate() {
            let log_z = self.accumulate_record(graph, record.as_ref())?;
            tracing::trace!(record = index, log_z, "record accumulated");
        }

        tracing::debug!(
            num_records = self.num_records,
            log_likelihood = self.log_likelihood,
            "expected counts pass finished"
        );
        Ok(())
    }

    /// Accumulated tables, in slot order.
    pub fn counts(&self) -> &[ArrayD<f64>] {
        &self.counts
    }

    /// Take the accumulated tables, in slot order.
    pub fn into_counts(self) -> Vec<ArrayD<f64>> {
        self.counts
    }

    /// Number of records accumulated since the last clear.
    pub fn num_records(&self) -> usize {
        self.num_records
    }

    /// Sum of `log Z` over the accumulated records.
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }
}

fn check_record(graph: &FactorGraph, record: usize, masks: &[StateMask]) -> Result<()> {
    if masks.len() != graph.num_variables() {
        return Err(PgmError::DatasetShape {
            record,
            expected: graph.num_variables(),
            got: masks.len(),
        });
    }
    for (variable, (mask, &cardinality)) in masks.iter().zip(graph.cardinalities()).enumerate() {
        if let Some(state) = mask.observed() {
            if state >= cardinality {
                return Err(PgmError::StateOutOfRange {
                    variable,
                    state,
                    cardinality,
                });
            }
        }
    }
    Ok(())
}

/// Expected counts of a whole dataset, one table per potential slot.
pub fn expected_counts<R: AsRef<[StateMask]>>(
    graph: &FactorGraph,
    records: &[R],
) -> Result<Vec<ArrayD<f64>>> {
    let mut counts = ExpectedCounts::new(graph);
    counts.accumulate_dataset(graph, records)?;
    Ok(counts.into_counts())
}
