//! Message passing over the rooted factor graph.
//!
//! Messages live in log space and are indexed by factor edge
//! (`[factor][axis]`). A full run is one upward sweep (`collect`, leaves to
//! root) optionally followed by one downward sweep (`distribute`, root to
//! leaves); on a forest this yields exact messages without iterating.

use scirs2_core::ndarray::{Array1, ArrayD};

use crate::error::Result;
use crate::graph::{Edge, FactorGraph, Node};
use crate::semiring::Semiring;
use crate::state_mask::StateMask;

/// Trait for message passing algorithms.
pub trait MessagePassingAlgorithm {
    /// Result of a run, possibly borrowing the graph.
    type Output<'g>;

    /// Run the algorithm under the given evidence (empty = no evidence).
    fn run<'g>(&self, graph: &'g FactorGraph, masks: &[StateMask]) -> Result<Self::Output<'g>>;

    /// Get algorithm name.
    fn name(&self) -> &str;
}

/// Message storage for belief propagation.
#[derive(Clone, Debug)]
pub(crate) struct MessageStore {
    /// Messages from variables to factors: `[factor][axis]`
    var_to_factor: Vec<Vec<Array1<f64>>>,
    /// Messages from factors to variables: `[factor][axis]`
    factor_to_var: Vec<Vec<Array1<f64>>>,
}

impl MessageStore {
    /// Unit messages (log 1 = 0) on every edge.
    pub(crate) fn new(graph: &FactorGraph) -> Self {
        let unit: Vec<Vec<Array1<f64>>> = graph
            .factors()
            .iter()
            .map(|node| {
                node.neighbors
                    .iter()
                    .map(|&v| Array1::zeros(graph.cardinalities()[v]))
                    .collect()
            })
            .collect();
        Self {
            var_to_factor: unit.clone(),
            factor_to_var: unit,
        }
    }

    pub(crate) fn var_to_factor(&self, factor: usize) -> &[Array1<f64>] {
        &self.var_to_factor[factor]
    }

    /// Compute variable-to-factor message.
    ///
    /// μ(x→f) = mask(x) + Σ_{g∈N(x)\f} μ(g→x)
    fn var_to_factor_message(
        &self,
        graph: &FactorGraph,
        masks: &[StateMask],
        var: usize,
        target: Edge,
    ) -> Array1<f64> {
        let mask = masks[var];
        let mut message = Array1::from_shape_fn(graph.cardinalities()[var], |s| mask.log_weight(s));
        for &edge in graph.edges(var) {
            if edge != target {
                message += &self.factor_to_var[edge.factor][edge.axis];
            }
        }
        message
    }

    /// Variable-to-factor messages for every edge of `var`, in edge order.
    ///
    /// Exclusive sums come from prefix and suffix accumulations, so the cost
    /// is linear in the variable's degree and `-inf` entries are never
    /// subtracted.
    fn var_to_factor_messages(
        &self,
        graph: &FactorGraph,
        masks: &[StateMask],
        var: usize,
    ) -> Vec<Array1<f64>> {
        let mask = masks[var];
        let edges = graph.edges(var);
        let cardinality = graph.cardinalities()[var];

        let mut prefix = Vec::with_capacity(edges.len());
        let mut running = Array1::from_shape_fn(cardinality, |s| mask.log_weight(s));
        for &edge in edges {
            prefix.push(running.clone());
            running += &self.factor_to_var[edge.factor][edge.axis];
        }

        let mut suffix = Array1::zeros(cardinality);
        for (i, &edge) in edges.iter().enumerate().rev() {
            prefix[i] += &suffix;
            suffix += &self.factor_to_var[edge.factor][edge.axis];
        }
        prefix
    }

    /// Compute factor-to-variable message, reducing with `S`.
    ///
    /// μ(f→x) = ⊕_{~x} [log φ + Σ_{y∈N(f)\x} μ(y→f)]
    fn factor_to_var_message<S: Semiring>(
        &self,
        graph: &FactorGraph,
        factor: usize,
        target_axis: usize,
    ) -> Array1<f64> {
        let log_table = graph.log_potential(factor);
        let incoming = &self.var_to_factor[factor];
        let mut acc = vec![S::empty(); log_table.shape()[target_axis]];

        for (index, &log_value) in log_table.indexed_iter() {
            let mut term = log_value;
            for (axis, message) in incoming.iter().enumerate() {
                if axis != target_axis {
                    term += message[index[axis]];
                }
            }
            S::push(&mut acc[index[target_axis]], term);
        }

        acc.into_iter().map(S::finish).collect()
    }

    /// Log belief of a variable: its mask plus every incoming factor message.
    pub(crate) fn variable_log_belief(
        &self,
        graph: &FactorGraph,
        masks: &[StateMask],
        var: usize,
    ) -> Array1<f64> {
        let mask = masks[var];
        let mut belief = Array1::from_shape_fn(graph.cardinalities()[var], |s| mask.log_weight(s));
        for &edge in graph.edges(var) {
            belief += &self.factor_to_var[edge.factor][edge.axis];
        }
        belief
    }

    /// Log belief of a factor: its log table plus every incoming variable message.
    pub(crate) fn factor_log_belief(&self, graph: &FactorGraph, factor: usize) -> ArrayD<f64> {
        let mut belief = graph.log_potential(factor).clone();
        let incoming = &self.var_to_factor[factor];
        for (index, value) in belief.indexed_iter_mut() {
            for (axis, message) in incoming.iter().enumerate() {
                *value += message[index[axis]];
            }
        }
        belief
    }

    /// Upward sweep: every non-root node sends to its parent, leaves first.
    pub(crate) fn collect<S: Semiring>(&mut self, graph: &FactorGraph, masks: &[StateMask]) {
        for component in graph.components() {
            for &node in component.order.iter().rev() {
                match node {
                    Node::Variable(v) => {
                        if let Some(edge) = graph.var_parent(v) {
                            let message = self.var_to_factor_message(graph, masks, v, edge);
                            self.var_to_factor[edge.factor][edge.axis] = message;
                        }
                    }
                    Node::Factor(f) => {
                        if let Some(axis) = graph.factor_parent(f) {
                            let message = self.factor_to_var_message::<S>(graph, f, axis);
                            self.factor_to_var[f][axis] = message;
                        }
                    }
                }
            }
        }
    }

    /// Downward sweep: every node sends to its children, root first.
    ///
    /// Requires a preceding [`MessageStore::collect`] with the same masks.
    pub(crate) fn distribute<S: Semiring>(&mut self, graph: &FactorGraph, masks: &[StateMask]) {
        for component in graph.components() {
            for &node in &component.order {
                match node {
                    Node::Variable(v) => {
                        let parent = graph.var_parent(v);
                        let messages = self.var_to_factor_messages(graph, masks, v);
                        for (&edge, message) in graph.edges(v).iter().zip(messages) {
                            if Some(edge) != parent {
                                self.var_to_factor[edge.factor][edge.axis] = message;
                            }
                        }
                    }
                    Node::Factor(f) => {
                        let parent = graph.factor_parent(f);
                        for axis in 0..graph.neighbors(f).len() {
                            if Some(axis) != parent {
                                let message = self.factor_to_var_message::<S>(graph, f, axis);
                                self.factor_to_var[f][axis] = message;
                            }
                        }
                    }
                }
            }
        }
    }
}
