//! # Graph
//!
//! [`Graph`] owns every node, port and edge and is the only way to mutate
//! them. Mutations that can change a computed result invalidate the affected
//! node and everything downstream of it.
//!
//! Nodes are also placed in a document outline ([`Tree`]) recording which
//! node lives inside which sub-graph container.

use crate::config::EngineConfig;
use crate::error::{ConnectionError, EvalError, GraphError};
use crate::eval::Evaluator;
use crate::model::{
    Direction, Edge, EdgeId, Node, NodeId, NodeTemplate, OutputSlot, Port, PortFlags, PortId,
    PortSpec, SlotState, Uuid,
};
use crate::ragged::RaggedValue;
use crate::tree::{Tree, TreeItemId};
use crate::validator::{ConnectionValidator, DependencyGraph};
use crate::value::{Nested, Value};
use glam::Vec2;
use slotmap::SlotMap;
use std::collections::{HashMap, HashSet, VecDeque};

/// Payload of an outline item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutlineEntry {
    Root,
    Node(NodeId),
}

/// The entire state of a dataflow document.
#[derive(Debug)]
pub struct Graph {
    pub(crate) nodes: SlotMap<NodeId, Node>,
    pub(crate) ports: SlotMap<PortId, Port>,
    pub(crate) edges: SlotMap<EdgeId, Edge>,
    outline: Tree<OutlineEntry>,
    root: TreeItemId,
    uuid_index: HashMap<Uuid, NodeId>,
    config: EngineConfig,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Graph {
    pub fn new(config: EngineConfig) -> Self {
        let mut outline = Tree::new();
        let root = outline.insert(OutlineEntry::Root);
        Self {
            nodes: SlotMap::with_key(),
            ports: SlotMap::with_key(),
            edges: SlotMap::with_key(),
            outline,
            root,
            uuid_index: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn root_item(&self) -> TreeItemId {
        self.root
    }

    // ---- Node lifecycle ----

    /// Inserts a top-level node built from `template`.
    pub fn add_node(&mut self, template: NodeTemplate) -> Result<NodeId, GraphError> {
        self.insert_node(template, Uuid::new_v4(), self.root)
    }

    /// Inserts a node nested inside `container`.
    pub fn add_node_in(
        &mut self,
        template: NodeTemplate,
        container: NodeId,
    ) -> Result<NodeId, GraphError> {
        let parent = self
            .nodes
            .get(container)
            .ok_or(GraphError::NodeNotFound(container))?
            .outline;
        self.insert_node(template, Uuid::new_v4(), parent)
    }

    pub(crate) fn insert_node(
        &mut self,
        template: NodeTemplate,
        uuid: Uuid,
        parent: TreeItemId,
    ) -> Result<NodeId, GraphError> {
        template.check().map_err(GraphError::InvalidTemplate)?;
        if self.uuid_index.contains_key(&uuid) {
            return Err(GraphError::InvalidTemplate(format!(
                "uuid {} is already in use",
                uuid
            )));
        }

        let NodeTemplate {
            type_tag,
            inputs,
            outputs,
            eval_units,
            properties,
        } = template;

        let outline = self.outline.insert(OutlineEntry::Root);
        let slots = vec![OutputSlot::default(); outputs.len()];
        let id = self.nodes.insert_with_key(|id| Node {
            id,
            uuid,
            type_tag,
            position: Vec2::ZERO,
            properties,
            inputs: Vec::new(),
            outputs: Vec::new(),
            eval_units,
            slots,
            outline,
        });

        let input_ids = self.create_ports(id, Direction::Input, inputs);
        let output_ids = self.create_ports(id, Direction::Output, outputs);
        let node = &mut self.nodes[id];
        node.inputs = input_ids;
        node.outputs = output_ids;

        if let Some(entry) = self.outline.get_mut(outline) {
            *entry = OutlineEntry::Node(id);
        }
        self.outline.append_child(parent, outline);
        self.uuid_index.insert(uuid, id);

        tracing::debug!(node = %uuid, type_tag = %self.nodes[id].type_tag, "Added node");
        Ok(id)
    }

    fn create_ports(
        &mut self,
        node: NodeId,
        direction: Direction,
        specs: Vec<PortSpec>,
    ) -> Vec<PortId> {
        specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| {
                self.ports.insert_with_key(|id| Port {
                    id,
                    node,
                    index,
                    name: spec.name,
                    direction,
                    value_type: spec.value_type,
                    flags: spec.flags,
                    default: spec.default,
                    alias: None,
                    edges: Vec::new(),
                })
            })
            .collect()
    }

    /// Removes a node, the nodes nested inside it, and every edge touching them.
    ///
    /// Aliases pointing at removed ports are cleared and downstream nodes are
    /// invalidated.
    #[tracing::instrument(skip(self))]
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        let item = node.outline;
        let doomed: Vec<NodeId> = std::iter::once(id)
            .chain(self.outline.descendants(item).into_iter().filter_map(|child| {
                match self.outline.get(child) {
                    Some(OutlineEntry::Node(n)) => Some(*n),
                    _ => None,
                }
            }))
            .collect();

        for &node in &doomed {
            self.invalidate(node);
        }

        let doomed_ports: HashSet<PortId> = doomed
            .iter()
            .filter_map(|n| self.nodes.get(*n))
            .flat_map(|n| n.ports())
            .collect();

        let doomed_edges: Vec<EdgeId> = doomed_ports
            .iter()
            .filter_map(|p| self.ports.get(*p))
            .flat_map(|p| p.edges.iter().copied())
            .collect();
        for edge in doomed_edges {
            self.detach_edge(edge);
        }

        for port in self.ports.values_mut() {
            if port.alias.is_some_and(|target| doomed_ports.contains(&target)) {
                port.alias = None;
            }
        }
        for port in &doomed_ports {
            self.ports.remove(*port);
        }
        for node in &doomed {
            if let Some(node) = self.nodes.remove(*node) {
                self.uuid_index.remove(&node.uuid);
            }
        }
        self.outline.take(item);

        tracing::debug!(removed = doomed.len(), "Removed node");
        true
    }

    // ---- Edges ----

    /// Connects two ports after validation. The pair may be given in either order.
    ///
    /// On rejection the graph is left untouched.
    #[tracing::instrument(skip(self))]
    pub fn add_edge(&mut self, a: PortId, b: PortId) -> Result<EdgeId, ConnectionError> {
        let (source, destination) = ConnectionValidator::new(self).validate(a, b)?;
        let id = self.edges.insert_with_key(|id| Edge {
            id,
            source,
            destination,
        });
        self.ports[source].edges.push(id);
        self.ports[destination].edges.push(id);

        let consumer = self.ports[destination].node;
        self.invalidate(consumer);
        Ok(id)
    }

    #[tracing::instrument(skip(self))]
    pub fn remove_edge(&mut self, id: EdgeId) -> bool {
        match self.detach_edge(id) {
            Some(edge) => {
                if let Some(port) = self.ports.get(edge.destination) {
                    let consumer = port.node;
                    self.invalidate(consumer);
                }
                true
            }
            None => false,
        }
    }

    fn detach_edge(&mut self, id: EdgeId) -> Option<Edge> {
        let edge = self.edges.remove(id)?;
        for port in [edge.source, edge.destination] {
            if let Some(port) = self.ports.get_mut(port) {
                port.edges.retain(|e| *e != id);
            }
        }
        Some(edge)
    }

    // ---- Aliases ----

    /// Makes `port` forward resolution to `target`. Both must share a direction,
    /// and the alias must not make `target` depend on `port`.
    pub fn link_alias(&mut self, port: PortId, target: PortId) -> Result<(), GraphError> {
        let expected = self.ports.get(port).ok_or(GraphError::PortNotFound(port))?.direction;
        let got = self
            .ports
            .get(target)
            .ok_or(GraphError::PortNotFound(target))?
            .direction;
        if expected != got {
            return Err(GraphError::DirectionMismatch { expected, got });
        }
        if DependencyGraph::build(self).closes_loop(target, port) {
            return Err(GraphError::AliasCycle { port, target });
        }
        self.ports[port].alias = Some(target);
        let owner = self.ports[port].node;
        self.invalidate(owner);
        Ok(())
    }

    pub fn unlink_alias(&mut self, port: PortId) -> Result<Option<PortId>, GraphError> {
        let entry = self.ports.get_mut(port).ok_or(GraphError::PortNotFound(port))?;
        let previous = entry.alias.take();
        let owner = entry.node;
        if previous.is_some() {
            self.invalidate(owner);
        }
        Ok(previous)
    }

    // ---- Properties ----

    pub fn set_property(
        &mut self,
        node: NodeId,
        key: impl Into<String>,
        value: impl Into<Nested<Value>>,
    ) -> Result<(), GraphError> {
        let entry = self.nodes.get_mut(node).ok_or(GraphError::NodeNotFound(node))?;
        entry.properties.insert(key.into(), value.into());
        self.invalidate(node);
        Ok(())
    }

    /// Moves a node. Layout never affects results, so nothing is invalidated.
    pub fn set_position(&mut self, node: NodeId, position: Vec2) -> Result<(), GraphError> {
        self.nodes
            .get_mut(node)
            .ok_or(GraphError::NodeNotFound(node))?
            .position = position;
        Ok(())
    }

    pub fn set_port_flags(&mut self, port: PortId, flags: PortFlags) -> Result<(), GraphError> {
        let entry = self.ports.get_mut(port).ok_or(GraphError::PortNotFound(port))?;
        entry.flags = flags;
        let owner = entry.node;
        self.invalidate(owner);
        Ok(())
    }

    // ---- Invalidation ----

    /// Marks every output of `node` and of everything downstream as invalid.
    ///
    /// Downstream covers edge consumers, containers whose outputs alias one of
    /// the visited outputs, and nodes whose inputs alias one of the visited inputs.
    pub fn invalidate(&mut self, node: NodeId) {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([node]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            let Some(entry) = self.nodes.get_mut(current) else {
                continue;
            };
            for slot in &mut entry.slots {
                slot.invalid = true;
            }
            queue.extend(self.dependents(current));
        }
    }

    fn dependents(&self, node: NodeId) -> Vec<NodeId> {
        let Some(entry) = self.nodes.get(node) else {
            return Vec::new();
        };
        let mut out: Vec<NodeId> = entry
            .outputs
            .iter()
            .filter_map(|p| self.ports.get(*p))
            .flat_map(|p| p.edges.iter())
            .filter_map(|e| self.edges.get(*e))
            .filter_map(|e| self.ports.get(e.destination))
            .map(|p| p.node)
            .collect();
        out.extend(self.alias_readers(node));
        out
    }

    /// Nodes owning a port that aliases one of `node`'s ports.
    pub fn alias_readers(&self, node: NodeId) -> Vec<NodeId> {
        let Some(entry) = self.nodes.get(node) else {
            return Vec::new();
        };
        let owned: HashSet<PortId> = entry.ports().collect();
        self.ports
            .values()
            .filter(|p| p.alias.is_some_and(|target| owned.contains(&target)))
            .map(|p| p.node)
            .filter(|n| *n != node)
            .collect()
    }

    // ---- Structural queries ----

    /// Nodes with an edge into one of `node`'s inputs.
    pub fn predecessors(&self, node: NodeId) -> Vec<NodeId> {
        self.neighbours(node, Direction::Input)
    }

    /// Nodes fed by one of `node`'s outputs.
    pub fn successors(&self, node: NodeId) -> Vec<NodeId> {
        self.neighbours(node, Direction::Output)
    }

    fn neighbours(&self, node: NodeId, side: Direction) -> Vec<NodeId> {
        let Some(entry) = self.nodes.get(node) else {
            return Vec::new();
        };
        let ports = match side {
            Direction::Input => &entry.inputs,
            Direction::Output => &entry.outputs,
        };
        let mut out = Vec::new();
        for edge in ports
            .iter()
            .filter_map(|p| self.ports.get(*p))
            .flat_map(|p| p.edges.iter())
            .filter_map(|e| self.edges.get(*e))
        {
            let other = match side {
                Direction::Input => edge.source,
                Direction::Output => edge.destination,
            };
            if let Some(port) = self.ports.get(other) {
                if !out.contains(&port.node) {
                    out.push(port.node);
                }
            }
        }
        out
    }

    /// Whether the current edges and aliases contain a dependency cycle.
    pub fn has_cycle(&self) -> bool {
        DependencyGraph::build(self).is_cyclic()
    }

    /// Returns true if `container` encloses `node` in the outline, at any depth.
    pub fn contains(&self, container: NodeId, node: NodeId) -> bool {
        match (self.nodes.get(container), self.nodes.get(node)) {
            (Some(c), Some(n)) => self.outline.is_ancestor(c.outline, n.outline),
            _ => false,
        }
    }

    /// The sub-graph container directly enclosing `node`.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        let item = self.outline.parent(self.nodes.get(node)?.outline)?;
        match self.outline.get(item)? {
            OutlineEntry::Node(parent) => Some(*parent),
            OutlineEntry::Root => None,
        }
    }

    /// Nodes directly nested in `container`, or the top-level nodes for `None`.
    pub fn children(&self, container: Option<NodeId>) -> Vec<NodeId> {
        let item = match container {
            Some(c) => match self.nodes.get(c) {
                Some(n) => n.outline,
                None => return Vec::new(),
            },
            None => self.root,
        };
        self.outline
            .children(item)
            .iter()
            .filter_map(|child| match self.outline.get(*child) {
                Some(OutlineEntry::Node(n)) => Some(*n),
                _ => None,
            })
            .collect()
    }

    /// Every node in outline pre-order: containers before the nodes they hold.
    pub fn nodes_in_outline_order(&self) -> Vec<NodeId> {
        self.outline
            .descendants(self.root)
            .into_iter()
            .filter_map(|item| match self.outline.get(item) {
                Some(OutlineEntry::Node(n)) => Some(*n),
                _ => None,
            })
            .collect()
    }

    /// Re-parents `node` under `container` (or the document root).
    pub(crate) fn move_into(
        &mut self,
        node: NodeId,
        container: Option<NodeId>,
    ) -> Result<(), GraphError> {
        let item = self.nodes.get(node).ok_or(GraphError::NodeNotFound(node))?.outline;
        let parent = match container {
            Some(c) => self.nodes.get(c).ok_or(GraphError::NodeNotFound(c))?.outline,
            None => self.root,
        };
        let previous = self.outline.parent(item).unwrap_or(self.root);
        self.outline.detach(item);
        if !self.outline.append_child(parent, item) {
            self.outline.append_child(previous, item);
            return Err(GraphError::InvalidTemplate(
                "a node cannot be nested inside itself".to_string(),
            ));
        }
        Ok(())
    }

    // ---- Accessors ----

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports.get(id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn find_by_uuid(&self, uuid: Uuid) -> Option<NodeId> {
        self.uuid_index.get(&uuid).copied()
    }

    pub fn input_port(&self, node: NodeId, index: usize) -> Option<PortId> {
        self.nodes.get(node)?.inputs.get(index).copied()
    }

    pub fn output_port(&self, node: NodeId, index: usize) -> Option<PortId> {
        self.nodes.get(node)?.outputs.get(index).copied()
    }

    /// Follows an output's alias chain to the output that actually computes.
    pub fn resolve_output(&self, node: NodeId, output: usize) -> Result<PortId, EvalError> {
        let entry = self.nodes.get(node).ok_or(EvalError::NodeNotFound(node))?;
        let start = *entry
            .outputs
            .get(output)
            .ok_or(EvalError::OutputOutOfRange { node, output })?;
        self.follow_alias(start)
    }

    /// Walks `port`'s alias chain to its end.
    pub(crate) fn follow_alias(&self, port: PortId) -> Result<PortId, EvalError> {
        let chain = self.alias_chain(port)?;
        Ok(chain.last().copied().unwrap_or(port))
    }

    /// `port` followed by every port it forwards to, in hop order.
    pub(crate) fn alias_chain(&self, port: PortId) -> Result<Vec<PortId>, EvalError> {
        let mut chain = vec![port];
        let mut current = port;
        let mut visited = HashSet::new();
        loop {
            let entry = self.ports.get(current).ok_or_else(|| EvalError::InvalidPortAlias {
                port,
                reason: "alias target no longer exists".to_string(),
            })?;
            let Some(next) = entry.alias else {
                return Ok(chain);
            };
            if !visited.insert(current) || visited.len() > self.config.max_alias_hops {
                return Err(EvalError::InvalidPortAlias {
                    port,
                    reason: "alias chain does not terminate".to_string(),
                });
            }
            chain.push(next);
            current = next;
        }
    }

    fn slot(&self, node: NodeId, output: usize) -> Option<&OutputSlot> {
        let port = self.resolve_output(node, output).ok()?;
        let port = self.ports.get(port)?;
        self.nodes.get(port.node)?.slots.get(port.index)
    }

    /// Cache state of an output, after following its alias chain.
    pub fn output_state(&self, node: NodeId, output: usize) -> Option<SlotState> {
        self.slot(node, output).map(OutputSlot::state)
    }

    /// The error retained from the last failed evaluation of an output.
    pub fn last_error(&self, node: NodeId, output: usize) -> Option<&EvalError> {
        self.slot(node, output)?.error.as_ref()
    }

    /// The cached value of an output, possibly stale.
    pub fn cached(&self, node: NodeId, output: usize) -> Option<&RaggedValue> {
        self.slot(node, output)?.cache.as_ref()
    }

    // ---- Evaluation ----

    /// Pulls the value of `node`'s output `output`, computing only what is stale.
    #[tracing::instrument(skip(self))]
    pub fn evaluate(&mut self, node: NodeId, output: usize) -> Result<RaggedValue, EvalError> {
        Evaluator::new(self).evaluate(node, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;

    fn passthrough() -> NodeTemplate {
        NodeTemplate::new("pass")
            .input(PortSpec::new("in", ValueType::Number))
            .output(PortSpec::new("out", ValueType::Number))
            .eval(0, &[0], |inputs| Ok(inputs.get(0)?.clone()))
    }

    #[test]
    fn test_add_node_creates_ports_and_slots() {
        let mut graph = Graph::default();
        let id = graph.add_node(passthrough()).unwrap();
        let node = graph.node(id).unwrap();

        assert_eq!(node.inputs.len(), 1);
        assert_eq!(node.outputs.len(), 1);
        assert_eq!(graph.output_state(id, 0), Some(SlotState::Empty));
        assert_eq!(graph.find_by_uuid(node.uuid), Some(id));
        assert_eq!(graph.port(node.outputs[0]).unwrap().direction, Direction::Output);
    }

    #[test]
    fn test_remove_node_drops_edges_and_nested_nodes() {
        let mut graph = Graph::default();
        let a = graph.add_node(passthrough()).unwrap();
        let b = graph.add_node(passthrough()).unwrap();
        let container = graph.add_node(NodeTemplate::new("group")).unwrap();
        let inner = graph.add_node_in(passthrough(), container).unwrap();

        let out = graph.output_port(a, 0).unwrap();
        let input = graph.input_port(b, 0).unwrap();
        graph.add_edge(out, input).unwrap();

        assert!(graph.remove_node(a));
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.port(input).unwrap().edges.is_empty());

        assert!(graph.contains(container, inner));
        assert!(graph.remove_node(container));
        assert!(graph.node(inner).is_none());
        assert_eq!(graph.node_count(), 1);
        assert!(!graph.remove_node(container));
    }

    #[test]
    fn test_remove_node_clears_aliases() {
        let mut graph = Graph::default();
        let a = graph.add_node(passthrough()).unwrap();
        let b = graph.add_node(passthrough()).unwrap();
        let a_in = graph.input_port(a, 0).unwrap();
        let b_in = graph.input_port(b, 0).unwrap();

        graph.link_alias(b_in, a_in).unwrap();
        graph.remove_node(a);
        assert_eq!(graph.port(b_in).unwrap().alias, None);
    }

    #[test]
    fn test_link_alias_requires_same_direction() {
        let mut graph = Graph::default();
        let a = graph.add_node(passthrough()).unwrap();
        let err = graph
            .link_alias(graph.input_port(a, 0).unwrap(), graph.output_port(a, 0).unwrap())
            .unwrap_err();
        assert!(matches!(err, GraphError::DirectionMismatch { .. }));
    }

    #[test]
    fn test_alias_that_closes_a_loop_is_rejected() {
        let mut graph = Graph::default();
        let a = graph.add_node(passthrough()).unwrap();
        let b = graph.add_node(passthrough()).unwrap();
        let a_in = graph.input_port(a, 0).unwrap();
        let b_in = graph.input_port(b, 0).unwrap();
        graph.add_edge(graph.output_port(a, 0).unwrap(), b_in).unwrap();

        // a.in would read b.in, which already reads a.out.
        assert_eq!(
            graph.link_alias(a_in, b_in),
            Err(GraphError::AliasCycle { port: a_in, target: b_in })
        );
        assert_eq!(
            graph.link_alias(a_in, a_in),
            Err(GraphError::AliasCycle { port: a_in, target: a_in })
        );
        assert_eq!(graph.port(a_in).unwrap().alias, None);
        assert!(!graph.has_cycle());

        let x = graph.add_node(passthrough()).unwrap();
        let y = graph.add_node(passthrough()).unwrap();
        assert!(graph
            .add_edge(graph.output_port(x, 0).unwrap(), graph.input_port(y, 0).unwrap())
            .is_ok());
    }

    #[test]
    fn test_outline_queries() {
        let mut graph = Graph::default();
        let container = graph.add_node(NodeTemplate::new("group")).unwrap();
        let inner = graph.add_node_in(passthrough(), container).unwrap();
        let top = graph.add_node(passthrough()).unwrap();

        assert_eq!(graph.parent(inner), Some(container));
        assert_eq!(graph.parent(top), None);
        assert_eq!(graph.children(Some(container)), vec![inner]);
        assert_eq!(graph.children(None), vec![container, top]);
        assert_eq!(graph.nodes_in_outline_order(), vec![container, inner, top]);
    }

    #[test]
    fn test_invalid_template_is_rejected() {
        let mut graph = Graph::default();
        let template = NodeTemplate::new("bad").eval(0, &[], |_| Ok(RaggedValue::empty()));
        assert!(matches!(
            graph.add_node(template),
            Err(GraphError::InvalidTemplate(_))
        ));
        assert_eq!(graph.node_count(), 0);
    }
}
