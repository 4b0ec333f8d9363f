//! Exact ancestral sampling from calibrated beliefs.
//!
//! A draw walks each component in breadth-first order: the root variable is
//! drawn from its marginal, and every factor then draws its remaining
//! neighbours jointly from its marginal conditioned on the parent variable's
//! state. On a forest this reproduces the model's joint distribution (or the
//! posterior, when the beliefs were computed under evidence).

use scirs2_core::ndarray::{Array1, Array2, ArrayD};
use scirs2_core::random::Rng;

use crate::error::{PgmError, Result};
use crate::graph::{FactorGraph, Node};
use crate::sum_product::Beliefs;

/// A full assignment, one state per variable.
pub type Assignment = Vec<usize>;

/// Distribution of a factor's configurations for one parent state.
#[derive(Clone, Debug, Default)]
struct Conditional {
    weights: Vec<f64>,
    configs: Vec<Vec<usize>>,
}

/// Ancestral sampler over precomputed marginals.
#[derive(Clone, Debug)]
pub struct AncestralSampler<'g> {
    graph: &'g FactorGraph,
    variable_marginals: Vec<Array1<f64>>,
    /// `[factor][parent state]`, empty for factors without a parent
    conditionals: Vec<Vec<Conditional>>,
}

impl<'g> AncestralSampler<'g> {
    /// Build a sampler from sum-product beliefs.
    pub fn new(beliefs: &Beliefs<'g>) -> Result<Self> {
        if beliefs.is_impossible() {
            return Err(PgmError::InvalidDistribution(
                "Cannot sample: the evidence has zero probability".to_string(),
            ));
        }
        Self::from_marginals(
            beliefs.graph(),
            beliefs.variable_marginals(),
            &beliefs.factor_marginals(),
        )
    }

    /// Build a sampler from retained variable and factor marginals.
    pub fn from_marginals(
        graph: &'g FactorGraph,
        variable_marginals: Vec<Array1<f64>>,
        factor_marginals: &[ArrayD<f64>],
    ) -> Result<Self> {
        if variable_marginals.len() != graph.num_variables() {
            return Err(PgmError::DimensionMismatch {
                expected: vec![graph.num_variables()],
                got: vec![variable_marginals.len()],
            });
        }
        if factor_marginals.len() != graph.num_factors() {
            return Err(PgmError::DimensionMismatch {
                expected: vec![graph.num_factors()],
                got: vec![factor_marginals.len()],
            });
        }
        for (v, marginal) in variable_marginals.iter().enumerate() {
            let expected = graph.cardinalities()[v];
            if marginal.len() != expected {
                return Err(PgmError::DimensionMismatch {
                    expected: vec![expected],
                    got: vec![marginal.len()],
                });
            }
        }

        let mut conditionals = Vec::with_capacity(graph.num_factors());
        for (f, marginal) in factor_marginals.iter().enumerate() {
            let expected: Vec<usize> = graph
                .neighbors(f)
                .iter()
                .map(|&v| graph.cardinalities()[v])
                .collect();
            if marginal.shape() != expected.as_slice() {
                return Err(PgmError::DimensionMismatch {
                    expected,
                    got: marginal.shape().to_vec(),
                });
            }

            let mut by_parent_state = Vec::new();
            if let Some(parent_axis) = graph.factor_parent(f) {
                by_parent_state = vec![Conditional::default(); expected[parent_axis]];
                for (index, &weight) in marginal.indexed_iter() {
                    if weight > 0.0 {
                        let conditional = &mut by_parent_state[index[parent_axis]];
                        conditional.weights.push(weight);
                        conditional
                            .configs
                            .push((0..expected.len()).map(|axis| index[axis]).collect());
                    }
                }
            }
            conditionals.push(by_parent_state);
        }

        Ok(Self {
            graph,
            variable_marginals,
            conditionals,
        })
    }

    /// Draw one joint assignment.
    pub fn sample(&self, rng: &mut impl Rng) -> Result<Assignment> {
        let mut states = vec![0; self.graph.num_variables()];

        for component in self.graph.components() {
            let Node::Variable(root) = component.root else {
                continue;
            };
            let weights = self.variable_marginals[root].to_vec();
            states[root] = sample_from_distribution(&weights, rng).ok_or_else(|| {
                PgmError::InvalidDistribution(format!(
                    "Marginal of variable {} has no mass",
                    root
                ))
            })?;

            for &node in &component.order {
                let Node::Factor(f) = node else {
                    continue;
                };
                let Some(parent_axis) = self.graph.factor_parent(f) else {
                    continue;
                };
                let neighbors = self.graph.neighbors(f);
                let parent_state = states[neighbors[parent_axis]];
                let conditional = &self.conditionals[f][parent_state];
                let pick = sample_from_distribution(&conditional.weights, rng).ok_or_else(|| {
                    PgmError::InvalidDistribution(format!(
                        "Factor {} has no mass given state {} of variable {}",
                        f, parent_state, neighbors[parent_axis]
                    ))
                })?;

                for (axis, &v) in neighbors.iter().enumerate() {
                    if axis != parent_axis {
                        states[v] = conditional.configs[pick][axis];
                    }
                }
            }
        }

        Ok(states)
    }

    /// Draw `num_samples` independent assignments as rows of a matrix.
    pub fn sample_n(&self, num_samples: usize, rng: &mut impl Rng) -> Result<Array2<usize>> {
        let mut samples = Array2::zeros((num_samples, self.graph.num_variables()));
        for mut row in samples.rows_mut() {
            let draw = self.sample(rng)?;
            for (dst, src) in row.iter_mut().zip(draw) {
                *dst = src;
            }
        }

        tracing::debug!(
            num_samples,
            num_variables = self.graph.num_variables(),
            "ancestral sampling finished"
        );
        Ok(samples)
    }
}

/// Sample an index proportionally to non-negative weights.
///
/// Returns `None` when the weights carry no mass.
fn sample_from_distribution(weights: &[f64], rng: &mut impl Rng) -> Option<usize> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    let u: f64 = rng.random::<f64>() * total;

    let mut cumulative = 0.0;
    let mut last = None;
    for (idx, &weight) in weights.iter().enumerate() {
        if weight <= 0.0 {
            continue;
        }
        cumulative += weight;
        last = Some(idx);
        if u < cumulative {
            return Some(idx);
        }
    }

    // Rounding can leave u just above the final cumulative sum
    last
}
