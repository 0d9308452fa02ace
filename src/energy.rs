//! # Binary energy minimization
//!
//! This module provides energies of binary variables made of unary and pairwise terms, minimized
//! exactly by a single min-cut, after ("What Energy Functions can be Minimized via Graph
//! Cuts?")[https://doi.org/10.1109/TPAMI.2004.1262177].
//!
//! Pairwise terms must be regular, `E(0,0) + E(1,1) <= E(0,1) + E(1,0)`. This is not checked, a
//! non-regular term silently gives a wrong minimum.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use crate::graph::{Capacity, Flow, Graph, NodeId, Terminal};

// -----------------------------------------------------------------------------------------------
// TYPES
// -----------------------------------------------------------------------------------------------

/// A binary variable of an [`Energy`].
pub type Var = NodeId;

/// Value of a single term.
pub type Value = Capacity;

/// Value of the whole energy.
pub type TotalValue = Flow;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// An energy function of binary variables.
///
/// A variable is 0 when its node ends up on the source side of the cut, 1 on the sink side.
#[derive(Clone, Debug, Default)]
pub struct Energy {
    graph: Graph,
    constant: TotalValue
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Energy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty energy, reserving room for `vars` variables and `terms` pairwise terms.
    pub fn with_capacity(vars: usize, terms: usize) -> Self {
        Self {
            graph: Graph::with_capacity(vars, terms),
            constant: 0
        }
    }

    pub fn variable_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Add a new variable with unary term `E(0) = cost0`, `E(1) = cost1`.
    pub fn add_variable(&mut self, cost0: Value, cost1: Value) -> Var {
        let var = self.graph.add_node();
        self.add_unary_term(var, cost0, cost1);
        var
    }

    pub fn add_constant(&mut self, c: Value) {
        self.constant += TotalValue::from(c);
    }

    /// Add a term `E(x)` with `E(0) = cost0`, `E(1) = cost1`.
    pub fn add_unary_term(&mut self, x: Var, cost0: Value, cost1: Value) {
        self.graph.add_terminal_weights(x, cost1, cost0);
    }

    /// Add a regular term `E(x, y)` with the given values for `(0,0)`, `(0,1)`, `(1,0)` and
    /// `(1,1)`.
    pub fn add_pairwise_term(
        &mut self,
        x: Var,
        y: Var,
        e00: Value,
        e01: Value,
        e10: Value,
        e11: Value
    ) {
        // E = | e00 e01 | = | e01 e01 | + | e00-e01 0 | + | 0               0 |
        //     | e10 e11 |   | e11 e11 |   | e00-e01 0 |   | e01+e10-e00-e11 0 |
        self.graph.add_terminal_weights(x, e11, e01);
        self.graph.add_terminal_weights(y, 0, e00 - e01);
        self.graph.add_edge(x, y, 0, e01 + e10 - e00 - e11);
    }

    /// Make the assignment `x = 0, y = 1` impossible.
    pub fn forbid_assignment_01(&mut self, x: Var, y: Var) {
        self.graph.add_edge_infinity(x, y);
    }

    /// Minimize the energy and return its minimum.
    ///
    /// Afterwards [`Energy::value`] gives the minimizing assignment.
    pub fn minimize(&mut self) -> TotalValue {
        self.constant + self.graph.max_flow()
    }

    /// Value of `x` in the minimizing assignment.
    pub fn value(&self, x: Var) -> bool {
        self.graph.which_side(x, Terminal::Sink) == Terminal::Sink
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_only() {
        let mut e = Energy::new();
        e.add_constant(5);
        e.add_constant(-2);
        assert_eq!(e.minimize(), 3);
    }

    #[test]
    fn zero_terms_give_the_constant() {
        let mut e = Energy::new();
        let x = e.add_variable(0, 0);
        let y = e.add_variable(0, 0);
        e.add_pairwise_term(x, y, 0, 0, 0, 0);
        e.add_constant(11);
        assert_eq!(e.minimize(), 11);
    }

    #[test]
    fn unary_terms_pick_cheaper_value() {
        let mut e = Energy::new();
        let x = e.add_variable(4, 1);
        let y = e.add_variable(-3, 2);
        let z = e.add_variable(0, 0);
        e.add_unary_term(z, 6, -1);

        assert_eq!(e.minimize(), 1 - 3 - 1);
        assert!(e.value(x));
        assert!(!e.value(y));
        assert!(e.value(z));
        assert_eq!(e.variable_count(), 3);
    }

    #[test]
    fn potts_pair_agrees() {
        let mut e = Energy::new();
        let x = e.add_variable(0, 5);
        let y = e.add_variable(1, 0);
        e.add_pairwise_term(x, y, 0, 10, 10, 0);

        // both 0 costs 1, both 1 costs 5, disagreeing costs at least 10
        assert_eq!(e.minimize(), 1);
        assert!(!e.value(x));
        assert!(!e.value(y));
    }

    #[test]
    fn forbidden_assignment_is_avoided() {
        let mut e = Energy::new();
        let x = e.add_variable(0, 3);
        let y = e.add_variable(2, 0);
        e.forbid_assignment_01(x, y);

        // (0,1) would cost 0, next best is (0,0) = 2
        assert_eq!(e.minimize(), 2);
        assert!(!e.value(x));
        assert!(!e.value(y));
    }
}
