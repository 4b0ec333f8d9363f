//! Max-sum algorithm (MAP inference).
//!
//! Runs the upward sweep in the max-plus semiring, then decodes the
//! assignment from each component's root downwards.
//!
//! # Tie-breaking
//!
//! Ties are broken deterministically:
//! - at a root variable, the lowest-index state reaching the maximum wins;
//! - when a factor is decoded given its parent variable's state, the first
//!   maximising configuration in row-major order of the factor table wins.
//!
//! Decoding only visits states allowed by the evidence, so the returned
//! assignment always agrees with the masks, even when its score is `-inf`.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::{FactorGraph, Node};
use crate::message_passing::{MessagePassingAlgorithm, MessageStore};
use crate::semiring::MaxPlus;
use crate::state_mask::{resolve_masks, StateMask};

/// The most probable joint assignment and its score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapAssignment {
    /// One state per variable
    pub states: Vec<usize>,
    /// Sum of log potentials at `states`
    pub log_score: f64,
}

impl MapAssignment {
    /// Product of potentials at the assignment.
    pub fn score(&self) -> f64 {
        self.log_score.exp()
    }
}

/// Max-sum algorithm.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaxSum;

impl MaxSum {
    /// Create the algorithm.
    pub fn new() -> Self {
        Self
    }

    /// Find the highest-scoring assignment consistent with the evidence.
    pub fn run(&self, graph: &FactorGraph, masks: &[StateMask]) -> Result<MapAssignment> {
        let masks = resolve_masks(graph.cardinalities(), masks)?;

        let mut messages = MessageStore::new(graph);
        messages.collect::<MaxPlus>(graph, &masks);

        let mut states = vec![0; graph.num_variables()];
        let mut log_score = 0.0;

        for component in graph.components() {
            let root = match component.root {
                Node::Variable(v) => v,
                Node::Factor(f) => {
                    log_score += graph.log_potential(f).iter().sum::<f64>();
                    continue;
                }
            };

            let belief = messages.variable_log_belief(graph, &masks, root);
            let mut best: Option<(usize, f64)> = None;
            for (state, &value) in belief.iter().enumerate() {
                if !masks[root].allows(state) {
                    continue;
                }
                match best {
                    Some((_, best_value)) if value <= best_value => {}
                    _ => best = Some((state, value)),
                }
            }
            if let Some((state, value)) = best {
                states[root] = state;
                log_score += value;
            }

            for &node in &component.order {
                if let Node::Factor(f) = node {
                    decode_factor(graph, &messages, &masks, f, &mut states);
                }
            }
        }

        tracing::debug!(
            log_score,
            num_variables = graph.num_variables(),
            "max-sum finished"
        );

        Ok(MapAssignment { states, log_score })
    }
}

/// Assign a factor's child variables given its (already decoded) parent.
fn decode_factor(
    graph: &FactorGraph,
    messages: &MessageStore,
    masks: &[StateMask],
    factor: usize,
    states: &mut [usize],
) {
    let Some(parent_axis) = graph.factor_parent(factor) else {
        return;
    };
    let neighbors = graph.neighbors(factor);
    let parent_state = states[neighbors[parent_axis]];
    let incoming = messages.var_to_factor(factor);

    let mut best: Option<(f64, Vec<usize>)> = None;
    for (index, &log_value) in graph.log_potential(factor).indexed_iter() {
        if index[parent_axis] != parent_state {
            continue;
        }
        if (0..neighbors.len()).any(|axis| !masks[neighbors[axis]].allows(index[axis])) {
            continue;
        }

        let mut term = log_value;
        for (axis, message) in incoming.iter().enumerate() {
            if axis != parent_axis {
                term += message[index[axis]];
            }
        }
        match &best {
            Some((best_term, _)) if term <= *best_term => {}
            _ => best = Some((term, (0..neighbors.len()).map(|a| index[a]).collect())),
        }
    }

    if let Some((_, config)) = best {
        for (axis, &v) in neighbors.iter().enumerate() {
            if axis != parent_axis {
                states[v] = config[axis];
            }
        }
    }
}

impl MessagePassingAlgorithm for MaxSum {
    type Output<'g> = MapAssignment;

    fn run<'g>(&self, graph: &'g FactorGraph, masks: &[StateMask]) -> Result<Self::Output<'g>> {
        MaxSum::run(self, graph, masks)
    }

    fn name(&self) -> &str {
        "MaxSum"
    }
}
