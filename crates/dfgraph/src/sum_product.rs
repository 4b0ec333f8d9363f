//! Sum-product algorithm (belief propagation).
//!
//! Computes the evidence-restricted normalization constant
//! `Z = Σ_{x consistent with evidence} Π_f φ_f(x_f)` together with exact
//! variable and factor marginals. Everything is evaluated in log space, so
//! long chains neither underflow nor overflow.

use scirs2_core::ndarray::{Array1, ArrayD};

use crate::error::Result;
use crate::graph::{FactorGraph, Node};
use crate::message_passing::{MessagePassingAlgorithm, MessageStore};
use crate::semiring::{log_sum_exp, LogSumExp};
use crate::state_mask::{resolve_masks, StateMask};

/// Sum-product algorithm.
///
/// One upward and one downward sweep over the rooted forest; no convergence
/// loop is needed.
#[derive(Clone, Copy, Debug, Default)]
pub struct SumProduct;

impl SumProduct {
    /// Create the algorithm.
    pub fn new() -> Self {
        Self
    }

    /// Run belief propagation under the given evidence (empty = no evidence).
    pub fn run<'g>(&self, graph: &'g FactorGraph, masks: &[StateMask]) -> Result<Beliefs<'g>> {
        let masks = resolve_masks(graph.cardinalities(), masks)?.into_owned();

        let mut messages = MessageStore::new(graph);
        messages.collect::<LogSumExp>(graph, &masks);
        messages.distribute::<LogSumExp>(graph, &masks);

        let component_log_z: Vec<f64> = graph
            .components()
            .iter()
            .map(|component| match component.root {
                Node::Variable(v) => {
                    log_sum_exp(messages.variable_log_belief(graph, &masks, v).iter().copied())
                }
                Node::Factor(f) => log_sum_exp(graph.log_potential(f).iter().copied()),
            })
            .collect();
        let log_norm_const = component_log_z.iter().sum::<f64>();

        tracing::debug!(
            log_norm_const,
            num_variables = graph.num_variables(),
            num_factors = graph.num_factors(),
            "sum-product finished"
        );
        if log_norm_const == f64::NEG_INFINITY {
            tracing::warn!("evidence has zero probability under the model");
        }

        Ok(Beliefs {
            graph,
            masks,
            messages,
            component_log_z,
            log_norm_const,
        })
    }
}

impl MessagePassingAlgorithm for SumProduct {
    type Output<'g> = Beliefs<'g>;

    fn run<'g>(&self, graph: &'g FactorGraph, masks: &[StateMask]) -> Result<Self::Output<'g>> {
        SumProduct::run(self, graph, masks)
    }

    fn name(&self) -> &str {
        "SumProduct"
    }
}

/// Calibrated messages of one sum-product run.
///
/// Borrows the graph, so the potentials cannot be reset while beliefs are
/// alive. When the evidence is impossible (`Z = 0`) every marginal is
/// reported as all zeros.
#[derive(Clone, Debug)]
pub struct Beliefs<'g> {
    graph: &'g FactorGraph,
    masks: Vec<StateMask>,
    messages: MessageStore,
    component_log_z: Vec<f64>,
    log_norm_const: f64,
}

impl<'g> Beliefs<'g> {
    /// The graph these beliefs were computed on.
    pub fn graph(&self) -> &'g FactorGraph {
        self.graph
    }

    /// Evidence used for this run (one mask per variable).
    pub fn masks(&self) -> &[StateMask] {
        &self.masks
    }

    /// `log Z`; `-inf` when the evidence is impossible.
    pub fn log_norm_const(&self) -> f64 {
        self.log_norm_const
    }

    /// `Z`.
    pub fn norm_const(&self) -> f64 {
        self.log_norm_const.exp()
    }

    /// Whether the evidence has zero probability.
    pub fn is_impossible(&self) -> bool {
        self.log_norm_const == f64::NEG_INFINITY
    }

    /// Posterior distribution of one variable.
    pub fn variable_marginal(&self, variable: usize) -> Option<Array1<f64>> {
        let cardinality = self.graph.cardinality(variable)?;
        if self.is_impossible() {
            return Some(Array1::zeros(cardinality));
        }
        let belief = self
            .messages
            .variable_log_belief(self.graph, &self.masks, variable);
        let log_z = log_sum_exp(belief.iter().copied());
        Some(belief.mapv(|b| (b - log_z).exp()))
    }

    /// Posterior distributions of every variable.
    pub fn variable_marginals(&self) -> Vec<Array1<f64>> {
        (0..self.graph.num_variables())
            .filter_map(|v| self.variable_marginal(v))
            .collect()
    }

    /// Posterior joint distribution over one factor's neighbours.
    ///
    /// Has the same shape as the factor's potential table.
    pub fn factor_marginal(&self, factor: usize) -> Option<ArrayD<f64>> {
        if factor >= self.graph.num_factors() {
            return None;
        }
        if self.is_impossible() {
            return Some(ArrayD::zeros(self.graph.log_potential(factor).raw_dim()));
        }
        let log_z = self.component_log_z[self.graph.component_of_factor(factor)];
        let belief = self.messages.factor_log_belief(self.graph, factor);
        Some(belief.mapv(|b| (b - log_z).exp()))
    }

    /// Posterior joint distributions of every factor.
    pub fn factor_marginals(&self) -> Vec<ArrayD<f64>> {
        (0..self.graph.num_factors())
            .filter_map(|f| self.factor_marginal(f))
            .collect()
    }
}
