//! Factor graph representation.
//!
//! Variables and factors are addressed by index. Factors do not own their
//! tables: each factor names a potential slot, and several factors may share
//! one slot (tied parameters). Resets and expected counts always operate per
//! slot.
//!
//! The graph must be a forest. At construction every connected component is
//! rooted (at its lowest-indexed variable) and traversed breadth-first; the
//! resulting order drives every single-pass algorithm in this crate.

use scirs2_core::ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{PgmError, Result};
use crate::potential::{check_shape, PotentialTable};

/// Factor node: its neighbouring variables and the potential slot it reads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorNode {
    /// Neighbour variable indices, one per table axis
    pub neighbors: Vec<usize>,
    /// Index of the potential slot
    pub potential: usize,
}

/// A node of the bipartite graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Node {
    Variable(usize),
    Factor(usize),
}

/// Link between a variable and one axis of a factor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Edge {
    pub(crate) factor: usize,
    pub(crate) axis: usize,
}

/// A connected component with its breadth-first order (root first).
#[derive(Clone, Debug)]
pub(crate) struct Component {
    pub(crate) root: Node,
    pub(crate) order: Vec<Node>,
}

/// Serializable description of a table (row-major values).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

/// Serializable description of a whole model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FactorGraphSpec {
    /// Cardinality per variable
    pub cardinalities: Vec<usize>,
    /// One table per potential slot
    pub potentials: Vec<TableSpec>,
    /// Neighbour list per factor
    pub neighbors: Vec<Vec<usize>>,
    /// Potential slot per factor
    pub potential_map: Vec<usize>,
}

/// Discrete factor graph with shared potential tables.
#[derive(Clone, Debug)]
pub struct FactorGraph {
    cardinalities: Vec<usize>,
    factors: Vec<FactorNode>,
    potentials: Vec<PotentialTable>,
    /// ln of every slot table, refreshed on reset
    log_potentials: Vec<ArrayD<f64>>,
    scores: Option<Vec<ArrayD<f64>>>,
    /// Adjacency: variable -> factor axes
    var_to_factors: Vec<Vec<Edge>>,
    var_parent: Vec<Option<Edge>>,
    /// Axis of the parent variable, `None` for roots
    factor_parent: Vec<Option<usize>>,
    components: Vec<Component>,
    component_of_factor: Vec<usize>,
}

impl FactorGraph {
    /// Build a model.
    ///
    /// # Arguments
    ///
    /// * `cardinalities` - Number of states per variable
    /// * `potentials` - One table per potential slot
    /// * `neighbors` - Neighbour variables per factor, in table axis order
    /// * `potential_map` - Potential slot per factor
    pub fn new(
        cardinalities: Vec<usize>,
        potentials: Vec<PotentialTable>,
        neighbors: Vec<Vec<usize>>,
        potential_map: Vec<usize>,
    ) -> Result<Self> {
        if let Some(variable) = cardinalities.iter().position(|&c| c == 0) {
            return Err(PgmError::InvalidGraph(format!(
                "Variable {} has cardinality 0",
                variable
            )));
        }
        if neighbors.len() != potential_map.len() {
            return Err(PgmError::InvalidGraph(format!(
                "{} neighbour lists but {} potential map entries",
                neighbors.len(),
                potential_map.len()
            )));
        }

        let num_variables = cardinalities.len();
        let mut factors = Vec::with_capacity(neighbors.len());
        for (factor, (nbs, &slot)) in neighbors.into_iter().zip(&potential_map).enumerate() {
            if let Some(&v) = nbs.iter().find(|&&v| v >= num_variables) {
                return Err(PgmError::InvalidGraph(format!(
                    "Factor {} references variable {} but the model has {} variables",
                    factor, v, num_variables
                )));
            }
            for (i, v) in nbs.iter().enumerate() {
                if nbs[..i].contains(v) {
                    return Err(PgmError::InvalidGraph(format!(
                        "Factor {} lists variable {} twice",
                        factor, v
                    )));
                }
            }
            let table = potentials.get(slot).ok_or_else(|| {
                PgmError::InvalidGraph(format!(
                    "Factor {} uses potential slot {} but only {} tables were given",
                    factor,
                    slot,
                    potentials.len()
                ))
            })?;
            let expected: Vec<usize> = nbs.iter().map(|&v| cardinalities[v]).collect();
            check_shape(&expected, table.shape())?;

            factors.push(FactorNode {
                neighbors: nbs,
                potential: slot,
            });
        }

        let mut var_to_factors = vec![Vec::new(); num_variables];
        for (factor, node) in factors.iter().enumerate() {
            for (axis, &v) in node.neighbors.iter().enumerate() {
                var_to_factors[v].push(Edge { factor, axis });
            }
        }

        let log_potentials = potentials.iter().map(PotentialTable::log_values).collect();
        let num_factors = factors.len();
        let mut graph = Self {
            cardinalities,
            factors,
            potentials,
            log_potentials,
            scores: None,
            var_to_factors,
            var_parent: vec![None; num_variables],
            factor_parent: vec![None; num_factors],
            components: Vec::new(),
            component_of_factor: vec![0; num_factors],
        };
        graph.build_schedule()?;
        Ok(graph)
    }

    /// Build a model from its serializable description.
    pub fn from_spec(spec: FactorGraphSpec) -> Result<Self> {
        let potentials = spec
            .potentials
            .into_iter()
            .map(|t| PotentialTable::from_shape_vec(t.shape, t.values))
            .collect::<Result<Vec<_>>>()?;
        Self::new(
            spec.cardinalities,
            potentials,
            spec.neighbors,
            spec.potential_map,
        )
    }

    /// Describe the model (with its current potentials).
    pub fn to_spec(&self) -> FactorGraphSpec {
        FactorGraphSpec {
            cardinalities: self.cardinalities.clone(),
            potentials: self
                .potentials
                .iter()
                .map(|t| TableSpec {
                    shape: t.shape().to_vec(),
                    values: t.values().iter().copied().collect(),
                })
                .collect(),
            neighbors: self.factors.iter().map(|f| f.neighbors.clone()).collect(),
            potential_map: self.factors.iter().map(|f| f.potential).collect(),
        }
    }

    /// Root every component and record the breadth-first order.
    fn build_schedule(&mut self) -> Result<()> {
        let mut visited_var = vec![false; self.num_variables()];
        let mut visited_factor = vec![false; self.num_factors()];

        for root in 0..self.num_variables() {
            if visited_var[root] {
                continue;
            }
            let id = self.components.len();
            visited_var[root] = true;
            let mut order = Vec::new();
            let mut queue = VecDeque::from([Node::Variable(root)]);

            while let Some(node) = queue.pop_front() {
                order.push(node);
                match node {
                    Node::Variable(v) => {
                        for &edge in &self.var_to_factors[v] {
                            if self.var_parent[v] == Some(edge) {
                                continue;
                            }
                            if visited_factor[edge.factor] {
                                return Err(cycle_error(edge.factor));
                            }
                            visited_factor[edge.factor] = true;
                            self.factor_parent[edge.factor] = Some(edge.axis);
                            queue.push_back(Node::Factor(edge.factor));
                        }
                    }
                    Node::Factor(f) => {
                        self.component_of_factor[f] = id;
                        for (axis, &v) in self.factors[f].neighbors.iter().enumerate() {
                            if self.factor_parent[f] == Some(axis) {
                                continue;
                            }
                            if visited_var[v] {
                                return Err(cycle_error(f));
                            }
                            visited_var[v] = true;
                            self.var_parent[v] = Some(Edge { factor: f, axis });
                            queue.push_back(Node::Variable(v));
                        }
                    }
                }
            }

            self.components.push(Component {
                root: Node::Variable(root),
                order,
            });
        }

        // Only factors without neighbours remain unvisited.
        for f in 0..self.num_factors() {
            if !visited_factor[f] {
                self.component_of_factor[f] = self.components.len();
                self.components.push(Component {
                    root: Node::Factor(f),
                    order: vec![Node::Factor(f)],
                });
            }
        }

        Ok(())
    }

    /// Replace every slot table; count and shapes must match the current ones.
    ///
    /// On error the model is left unchanged.
    pub fn reset_potentials(&mut self, tables: Vec<PotentialTable>) -> Result<()> {
        if tables.len() != self.potentials.len() {
            return Err(PgmError::PotentialCount {
                expected: self.potentials.len(),
                got: tables.len(),
            });
        }
        for (current, new) in self.potentials.iter().zip(&tables) {
            check_shape(current.shape(), new.shape())?;
        }

        for (slot, table) in tables.into_iter().enumerate() {
            self.log_potentials[slot] = table.log_values();
            self.potentials[slot].reset(table)?;
        }
        Ok(())
    }

    /// Current tables, in slot order.
    pub fn potentials(&self) -> &[PotentialTable] {
        &self.potentials
    }

    /// Install score tables (one per slot, same shapes as the potentials).
    ///
    /// Scores define the additive function `s(x) = Σ_f s_slot(f)(x_f)` whose
    /// expectation [`crate::expect`] computes. Unlike potentials they may be
    /// negative, but must be finite.
    pub fn reset_scores(&mut self, scores: Vec<ArrayD<f64>>) -> Result<()> {
        if scores.len() != self.potentials.len() {
            return Err(PgmError::PotentialCount {
                expected: self.potentials.len(),
                got: scores.len(),
            });
        }
        for (table, score) in self.potentials.iter().zip(&scores) {
            check_shape(table.shape(), score.shape())?;
            if score.iter().any(|s| !s.is_finite()) {
                return Err(PgmError::InvalidDistribution(
                    "Score tables must be finite".to_string(),
                ));
            }
        }
        self.scores = Some(scores);
        Ok(())
    }

    /// Installed score tables, if any.
    pub fn scores(&self) -> Option<&[ArrayD<f64>]> {
        self.scores.as_deref()
    }

    /// Copy whose log tables are `log φ + θ·s`, for exponentially tilted
    /// message passing. The copy's plain potentials are left untouched, so
    /// it only serves sum-product runs. `None` without installed scores.
    pub(crate) fn tilted(&self, theta: f64) -> Option<FactorGraph> {
        let scores = self.scores.as_ref()?;
        let mut tilted = self.clone();
        for (log_table, score) in tilted.log_potentials.iter_mut().zip(scores) {
            log_table.zip_mut_with(score, |l, &s| *l += theta * s);
        }
        Some(tilted)
    }

    /// Sum of log potentials at a full assignment (`-inf` if any factor is zero).
    pub fn log_score(&self, states: &[usize]) -> Result<f64> {
        if states.len() != self.num_variables() {
            return Err(PgmError::EvidenceLength {
                expected: self.num_variables(),
                got: states.len(),
            });
        }
        for (variable, (&state, &cardinality)) in
            states.iter().zip(&self.cardinalities).enumerate()
        {
            if state >= cardinality {
                return Err(PgmError::StateOutOfRange {
                    variable,
                    state,
                    cardinality,
                });
            }
        }

        let mut total = 0.0;
        let mut index = Vec::new();
        for (f, node) in self.factors.iter().enumerate() {
            index.clear();
            index.extend(node.neighbors.iter().map(|&v| states[v]));
            total += self.log_potential(f)[index.as_slice()];
        }
        Ok(total)
    }

    /// Product of potentials at a full assignment.
    pub fn score(&self, states: &[usize]) -> Result<f64> {
        self.log_score(states).map(f64::exp)
    }

    /// Get number of variables.
    pub fn num_variables(&self) -> usize {
        self.cardinalities.len()
    }

    /// Get number of factors.
    pub fn num_factors(&self) -> usize {
        self.factors.len()
    }

    /// Get number of potential slots.
    pub fn num_potentials(&self) -> usize {
        self.potentials.len()
    }

    /// Cardinality of a variable.
    pub fn cardinality(&self, variable: usize) -> Option<usize> {
        self.cardinalities.get(variable).copied()
    }

    /// All cardinalities.
    pub fn cardinalities(&self) -> &[usize] {
        &self.cardinalities
    }

    /// Get a factor node.
    pub fn factor(&self, factor: usize) -> Option<&FactorNode> {
        self.factors.get(factor)
    }

    /// All factor nodes.
    pub fn factors(&self) -> &[FactorNode] {
        &self.factors
    }

    /// Neighbour variables of a factor, in table axis order.
    pub fn factor_neighbors(&self, factor: usize) -> Option<&[usize]> {
        self.factors.get(factor).map(|f| f.neighbors.as_slice())
    }

    /// Potential slot read by a factor.
    pub fn factor_slot(&self, factor: usize) -> Option<usize> {
        self.factors.get(factor).map(|f| f.potential)
    }

    /// Factors connected to a variable.
    pub fn adjacent_factors(&self, variable: usize) -> impl Iterator<Item = usize> + '_ {
        self.var_to_factors
            .get(variable)
            .into_iter()
            .flatten()
            .map(|edge| edge.factor)
    }

    /// Number of connected components.
    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    pub(crate) fn log_potential(&self, factor: usize) -> &ArrayD<f64> {
        &self.log_potentials[self.factors[factor].potential]
    }

    pub(crate) fn neighbors(&self, factor: usize) -> &[usize] {
        &self.factors[factor].neighbors
    }

    pub(crate) fn edges(&self, variable: usize) -> &[Edge] {
        &self.var_to_factors[variable]
    }

    pub(crate) fn var_parent(&self, variable: usize) -> Option<Edge> {
        self.var_parent[variable]
    }

    pub(crate) fn factor_parent(&self, factor: usize) -> Option<usize> {
        self.factor_parent[factor]
    }

    pub(crate) fn components(&self) -> &[Component] {
        &self.components
    }

    pub(crate) fn component_of_factor(&self, factor: usize) -> usize {
        self.component_of_factor[factor]
    }
}

fn cycle_error(factor: usize) -> PgmError {
    PgmError::InvalidGraph(format!(
        "Factor {} closes a cycle; exact inference needs a loop-free graph",
        factor
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(shape: &[usize], values: &[f64]) -> PotentialTable {
        PotentialTable::from_shape_vec(shape.to_vec(), values.to_vec()).unwrap()
    }

    fn chain(length: usize) -> FactorGraph {
        let pair = table(&[2, 2], &[2.0, 1.0, 1.0, 2.0]);
        let neighbors = (0..length - 1).map(|i| vec![i, i + 1]).collect::<Vec<_>>();
        let map = vec![0; length - 1];
        FactorGraph::new(vec![2; length], vec![pair], neighbors, map).unwrap()
    }

    #[test]
    fn test_graph_creation() {
        let graph = chain(4);
        assert_eq!(graph.num_variables(), 4);
        assert_eq!(graph.num_factors(), 3);
        assert_eq!(graph.num_potentials(), 1);
        assert_eq!(graph.num_components(), 1);
        assert_eq!(graph.cardinality(2), Some(2));
        assert_eq!(graph.cardinality(9), None);
    }

    #[test]
    fn test_adjacency() {
        let graph = chain(3);
        let adjacent: Vec<usize> = graph.adjacent_factors(1).collect();
        assert_eq!(adjacent, vec![0, 1]);
        assert_eq!(graph.adjacent_factors(0).count(), 1);
        assert_eq!(graph.factor_neighbors(1), Some(&[1, 2][..]));
        assert_eq!(graph.factor_slot(1), Some(0));
        assert_eq!(graph.factor_slot(7), None);
    }

    #[test]
    fn test_breadth_first_schedule() {
        let graph = chain(3);
        let component = &graph.components()[0];
        assert_eq!(component.root, Node::Variable(0));
        assert_eq!(
            component.order,
            vec![
                Node::Variable(0),
                Node::Factor(0),
                Node::Variable(1),
                Node::Factor(1),
                Node::Variable(2)
            ]
        );
        assert_eq!(graph.var_parent(0), None);
        assert_eq!(graph.var_parent(2), Some(Edge { factor: 1, axis: 1 }));
        assert_eq!(graph.factor_parent(1), Some(0));
    }

    #[test]
    fn test_components() {
        // Two disconnected pairs, an isolated variable and a scalar factor
        let pair = table(&[2, 2], &[1.0; 4]);
        let scalar = table(&[], &[3.0]);
        let graph = FactorGraph::new(
            vec![2, 2, 2, 2, 3],
            vec![pair, scalar],
            vec![vec![0, 1], vec![2, 3], vec![]],
            vec![0, 0, 1],
        )
        .unwrap();

        assert_eq!(graph.num_components(), 4);
        assert_eq!(graph.components()[1].root, Node::Variable(2));
        assert_eq!(graph.components()[2].order, vec![Node::Variable(4)]);
        assert_eq!(graph.component_of_factor(2), 3);
        assert_eq!(graph.components()[3].root, Node::Factor(2));
    }

    #[test]
    fn test_rejects_cycle() {
        let pair = table(&[2, 2], &[1.0; 4]);
        let result = FactorGraph::new(
            vec![2, 2, 2],
            vec![pair],
            vec![vec![0, 1], vec![1, 2], vec![2, 0]],
            vec![0, 0, 0],
        );
        assert!(matches!(result, Err(PgmError::InvalidGraph(_))));
    }

    #[test]
    fn test_rejects_parallel_factors() {
        // Two factors over the same pair form a loop of length four
        let pair = table(&[2, 2], &[1.0; 4]);
        let result = FactorGraph::new(vec![2, 2], vec![pair], vec![vec![0, 1], vec![1, 0]], vec![0, 0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_bad_structure() {
        let pair = table(&[2, 2], &[1.0; 4]);

        let zero_card = FactorGraph::new(vec![2, 0], vec![pair.clone()], vec![], vec![]);
        assert!(matches!(zero_card, Err(PgmError::InvalidGraph(_))));

        let unknown_var =
            FactorGraph::new(vec![2, 2], vec![pair.clone()], vec![vec![0, 5]], vec![0]);
        assert!(matches!(unknown_var, Err(PgmError::InvalidGraph(_))));

        let duplicate = FactorGraph::new(vec![2, 2], vec![pair.clone()], vec![vec![1, 1]], vec![0]);
        assert!(matches!(duplicate, Err(PgmError::InvalidGraph(_))));

        let unknown_slot =
            FactorGraph::new(vec![2, 2], vec![pair.clone()], vec![vec![0, 1]], vec![1]);
        assert!(matches!(unknown_slot, Err(PgmError::InvalidGraph(_))));

        let map_len = FactorGraph::new(vec![2, 2], vec![pair], vec![vec![0, 1]], vec![]);
        assert!(matches!(map_len, Err(PgmError::InvalidGraph(_))));
    }

    #[test]
    fn test_rejects_shape_mismatch() {
        let result = FactorGraph::new(
            vec![2, 3],
            vec![table(&[2, 2], &[1.0; 4])],
            vec![vec![0, 1]],
            vec![0],
        );
        assert_eq!(
            result.unwrap_err(),
            PgmError::DimensionMismatch {
                expected: vec![2, 3],
                got: vec![2, 2],
            }
        );
    }

    #[test]
    fn test_shared_slot_must_fit_every_factor() {
        // Slot 0 is 2x2 but the second factor spans a ternary variable
        let result = FactorGraph::new(
            vec![2, 2, 3],
            vec![table(&[2, 2], &[1.0; 4])],
            vec![vec![0, 1], vec![1, 2]],
            vec![0, 0],
        );
        assert!(matches!(result, Err(PgmError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_reset_potentials() {
        let mut graph = chain(3);
        graph
            .reset_potentials(vec![table(&[2, 2], &[1.0, 0.0, 0.0, 1.0])])
            .unwrap();
        assert_eq!(graph.potentials()[0].get(&[0, 1]), Some(0.0));
        assert_eq!(graph.log_potential(1)[[0, 1]], f64::NEG_INFINITY);

        let count = graph.reset_potentials(vec![]);
        assert_eq!(
            count.unwrap_err(),
            PgmError::PotentialCount {
                expected: 1,
                got: 0
            }
        );

        let shape = graph.reset_potentials(vec![table(&[2], &[1.0, 1.0])]);
        assert!(matches!(shape, Err(PgmError::DimensionMismatch { .. })));
        assert_eq!(graph.potentials()[0].get(&[1, 1]), Some(1.0));
    }

    #[test]
    fn test_reset_scores() {
        let mut graph = chain(2);
        assert!(graph.scores().is_none());

        let scores = ArrayD::from_shape_vec(vec![2, 2], vec![-1.0, 0.0, 0.0, 1.0]).unwrap();
        graph.reset_scores(vec![scores]).unwrap();
        assert_eq!(graph.scores().unwrap()[0][[0, 0]], -1.0);

        let bad = ArrayD::from_shape_vec(vec![2, 2], vec![f64::NAN, 0.0, 0.0, 1.0]).unwrap();
        assert!(graph.reset_scores(vec![bad]).is_err());
    }

    #[test]
    fn test_tilted_log_tables() {
        let mut graph = chain(2);
        assert!(graph.tilted(1.0).is_none());

        let scores = ArrayD::from_shape_vec(vec![2, 2], vec![1.0, 0.0, -2.0, 0.5]).unwrap();
        graph.reset_scores(vec![scores]).unwrap();
        let tilted = graph.tilted(2.0).unwrap();
        assert!((tilted.log_potential(0)[[0, 0]] - (2.0f64.ln() + 2.0)).abs() < 1e-12);
        assert!((tilted.log_potential(0)[[1, 0]] - (1.0f64.ln() - 4.0)).abs() < 1e-12);
        assert_eq!(tilted.potentials()[0].get(&[0, 0]), Some(2.0));
    }

    #[test]
    fn test_log_score() {
        let graph = chain(3);
        let log_score = graph.log_score(&[0, 0, 1]).unwrap();
        assert!((log_score - 2.0f64.ln()).abs() < 1e-12);
        assert!((graph.score(&[1, 1, 1]).unwrap() - 4.0).abs() < 1e-12);

        assert!(matches!(
            graph.log_score(&[0, 0]),
            Err(PgmError::EvidenceLength { .. })
        ));
        assert!(matches!(
            graph.log_score(&[0, 2, 0]),
            Err(PgmError::StateOutOfRange { variable: 1, .. })
        ));
    }

    #[test]
    fn test_spec_from_json() {
        let json = r#"{
            "cardinalities": [2, 3],
            "potentials": [{"shape": [2, 3], "values": [1, 2, 3, 4, 5, 6]}],
            "neighbors": [[0, 1]],
            "potential_map": [0]
        }"#;
        let spec: FactorGraphSpec = serde_json::from_str(json).unwrap();
        let graph = FactorGraph::from_spec(spec.clone()).unwrap();

        assert_eq!(graph.potentials()[0].get(&[1, 0]), Some(4.0));
        assert_eq!(graph.to_spec(), spec);
    }
}
