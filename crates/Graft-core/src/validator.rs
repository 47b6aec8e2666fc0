//! # Connection Validation
//!
//! Decides whether a proposed edge may be committed. The acyclicity check
//! runs on a throwaway [`DependencyGraph`] so a rejected edge never touches
//! the real [`Graph`].

use crate::error::ConnectionError;
use crate::graph::Graph;
use crate::model::{Direction, PortId};
use petgraph::algo::{has_path_connecting, is_cyclic_directed};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Data dependencies between ports.
///
/// Every input of a computing node feeds every output of the same node, each
/// edge feeds its destination, and an alias target feeds the aliasing port.
/// Nodes without eval units (containers) only forward through aliases, so
/// their input side and output side stay distinct.
pub(crate) struct DependencyGraph {
    graph: DiGraph<PortId, ()>,
    index: HashMap<PortId, NodeIndex>,
}

impl DependencyGraph {
    pub(crate) fn build(source: &Graph) -> Self {
        let mut graph = DiGraph::<PortId, ()>::new();
        let mut index = HashMap::new();
        for port in source.ports.keys() {
            index.insert(port, graph.add_node(port));
        }
        let mut deps = Self { graph, index };

        for node in source.nodes.values().filter(|n| !n.eval_units.is_empty()) {
            for &input in &node.inputs {
                for &output in &node.outputs {
                    deps.add_dependency(input, output);
                }
            }
        }
        for edge in source.edges.values() {
            deps.add_dependency(edge.source, edge.destination);
        }
        for port in source.ports.values() {
            if let Some(target) = port.alias {
                deps.add_dependency(target, port.id);
            }
        }
        deps
    }

    pub(crate) fn add_dependency(&mut self, from: PortId, to: PortId) {
        if let (Some(&a), Some(&b)) = (self.index.get(&from), self.index.get(&to)) {
            self.graph.add_edge(a, b, ());
        }
    }

    pub(crate) fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Whether adding `from -> to` would close a loop. Cycles elsewhere in
    /// the graph do not count.
    pub(crate) fn closes_loop(&self, from: PortId, to: PortId) -> bool {
        if from == to {
            return true;
        }
        match (self.index.get(&from), self.index.get(&to)) {
            (Some(&a), Some(&b)) => has_path_connecting(&self.graph, b, a, None),
            _ => false,
        }
    }
}

/// Pre-commit checks for a proposed edge.
pub struct ConnectionValidator<'g> {
    graph: &'g Graph,
}

impl<'g> ConnectionValidator<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }

    pub fn can_connect(&self, a: PortId, b: PortId) -> bool {
        self.validate(a, b).is_ok()
    }

    /// Returns the pair ordered as `(output, input)` if the edge is legal.
    pub fn validate(&self, a: PortId, b: PortId) -> Result<(PortId, PortId), ConnectionError> {
        if a == b {
            return Err(ConnectionError::IdentityEdge);
        }
        let pa = self.graph.port(a).ok_or(ConnectionError::PortNotFound(a))?;
        let pb = self.graph.port(b).ok_or(ConnectionError::PortNotFound(b))?;

        if pa.direction == pb.direction {
            return Err(ConnectionError::SameDirection(pa.direction));
        }
        let (src, dst) = match pa.direction {
            Direction::Output => (pa, pb),
            Direction::Input => (pb, pa),
        };

        if src.node == dst.node {
            return Err(ConnectionError::SelfLoop);
        }
        if self.graph.contains(src.node, dst.node) || self.graph.contains(dst.node, src.node) {
            return Err(ConnectionError::NestedScope);
        }

        if self.graph.config().enforce_port_types
            && !src.value_type.is_compatible(dst.value_type)
        {
            return Err(ConnectionError::TypeMismatch {
                from: src.value_type,
                to: dst.value_type,
            });
        }

        let duplicate = src
            .edges
            .iter()
            .filter_map(|e| self.graph.edge(*e))
            .any(|e| e.destination == dst.id);
        if duplicate {
            return Err(ConnectionError::AlreadyConnected);
        }

        if DependencyGraph::build(self.graph).closes_loop(src.id, dst.id) {
            return Err(ConnectionError::Cycle);
        }

        Ok((src.id, dst.id))
    }
}
