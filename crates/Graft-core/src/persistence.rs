use crate::config::EngineConfig;
use crate::error::{GraphError, PersistenceError};
use crate::graph::Graph;
use crate::model::{Direction, NodeId, PortFlags, PortId, Properties};
use crate::registry::NodeRegistry;
use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A serializable representation of an Edge.
///
/// Instead of transient `PortId`s, it uses stable UUIDs for nodes and indices for ports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedEdge {
    pub from_node: Uuid,
    pub from_port: usize,
    pub to_node: Uuid,
    pub to_port: usize,
}

/// A port alias, addressed the same way as [`SavedEdge`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedAlias {
    pub node: Uuid,
    pub direction: Direction,
    pub port: usize,
    pub target_node: Uuid,
    pub target_port: usize,
}

/// A serializable representation of a Node.
///
/// Ports are not stored: the registry rebuilds them from `type_tag` and
/// `properties`. Only per-port flags are kept.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedNode {
    pub uuid: Uuid,
    pub type_tag: String,
    #[serde(default)]
    pub position: Vec2,
    #[serde(default)]
    pub properties: Properties,
    /// Enclosing container, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_flags: Vec<PortFlags>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_flags: Vec<PortFlags>,
}

/// A serializable snapshot of the Graph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedGraph {
    pub nodes: Vec<SavedNode>,
    #[serde(default)]
    pub edges: Vec<SavedEdge>,
    #[serde(default)]
    pub aliases: Vec<SavedAlias>,
}

impl SavedGraph {
    pub fn to_json(&self) -> Result<String, PersistenceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistenceError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_yaml(&self) -> Result<String, PersistenceError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, PersistenceError> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// Trailing default flags are dropped to keep snapshots small.
fn port_flags(graph: &Graph, ports: &[PortId]) -> Vec<PortFlags> {
    let mut flags: Vec<PortFlags> = ports
        .iter()
        .map(|p| graph.port(*p).map(|p| p.flags).unwrap_or_default())
        .collect();
    while flags.last().is_some_and(|f| f.is_empty()) {
        flags.pop();
    }
    flags
}

impl Graph {
    /// Snapshots the graph. Containers come before the nodes they hold.
    pub fn save(&self) -> SavedGraph {
        let order = self.nodes_in_outline_order();
        let uuid_of = |id: NodeId| self.node(id).map(|n| n.uuid);

        let nodes = order
            .iter()
            .filter_map(|&id| {
                let node = self.node(id)?;
                Some(SavedNode {
                    uuid: node.uuid,
                    type_tag: node.type_tag.clone(),
                    position: node.position,
                    properties: node.properties.clone(),
                    parent: self.parent(id).and_then(uuid_of),
                    input_flags: port_flags(self, &node.inputs),
                    output_flags: port_flags(self, &node.outputs),
                })
            })
            .collect();

        // Walk consumers' inputs so every input keeps its producer order.
        let edges = order
            .iter()
            .filter_map(|&id| self.node(id))
            .flat_map(|node| node.inputs.iter())
            .filter_map(|&port| self.port(port))
            .flat_map(|port| port.edges.iter())
            .filter_map(|&edge| self.edge(edge))
            .filter_map(|edge| {
                let from = self.port(edge.source)?;
                let to = self.port(edge.destination)?;
                Some(SavedEdge {
                    from_node: uuid_of(from.node)?,
                    from_port: from.index,
                    to_node: uuid_of(to.node)?,
                    to_port: to.index,
                })
            })
            .collect();

        let aliases = order
            .iter()
            .filter_map(|&id| self.node(id))
            .flat_map(|node| node.ports())
            .filter_map(|id| {
                let port = self.port(id)?;
                let target = self.port(port.alias?)?;
                Some(SavedAlias {
                    node: uuid_of(port.node)?,
                    direction: port.direction,
                    port: port.index,
                    target_node: uuid_of(target.node)?,
                    target_port: target.index,
                })
            })
            .collect();

        SavedGraph {
            nodes,
            edges,
            aliases,
        }
    }

    /// Rebuilds a graph from a snapshot.
    ///
    /// Nodes are created through `registry`, then nested, then aliased, and
    /// finally connected. Every edge goes through the connection validator.
    #[tracing::instrument(skip_all, fields(nodes = saved.nodes.len(), edges = saved.edges.len()))]
    pub fn restore(
        saved: &SavedGraph,
        registry: &NodeRegistry,
        config: EngineConfig,
    ) -> Result<Graph, PersistenceError> {
        let mut graph = Graph::new(config);
        let mut ids: HashMap<Uuid, NodeId> = HashMap::new();

        for saved_node in &saved.nodes {
            if ids.contains_key(&saved_node.uuid) {
                return Err(PersistenceError::DuplicateNode(saved_node.uuid));
            }
            let template = registry
                .create(&saved_node.type_tag, &saved_node.properties)
                .map_err(|err| match err {
                    GraphError::UnknownNodeType(tag) => PersistenceError::UnknownNodeType(tag),
                    other => PersistenceError::Graph(other),
                })?;
            let root = graph.root_item();
            let id = graph.insert_node(template, saved_node.uuid, root)?;
            graph.set_position(id, saved_node.position)?;

            for (direction, flags) in [
                (Direction::Input, &saved_node.input_flags),
                (Direction::Output, &saved_node.output_flags),
            ] {
                for (index, flags) in flags.iter().enumerate() {
                    let port = find_port(&graph, saved_node.uuid, id, direction, index)?;
                    graph.set_port_flags(port, *flags)?;
                }
            }
            ids.insert(saved_node.uuid, id);
        }

        for saved_node in &saved.nodes {
            if let Some(parent) = saved_node.parent {
                let container = *ids
                    .get(&parent)
                    .ok_or(PersistenceError::MissingNode(parent))?;
                let child = *ids
                    .get(&saved_node.uuid)
                    .ok_or(PersistenceError::MissingNode(saved_node.uuid))?;
                graph.move_into(child, Some(container))?;
            }
        }

        for alias in &saved.aliases {
            let port = resolve(&graph, &ids, alias.node, alias.direction, alias.port)?;
            let target = resolve(
                &graph,
                &ids,
                alias.target_node,
                alias.direction,
                alias.target_port,
            )?;
            graph.link_alias(port, target)?;
        }

        for edge in &saved.edges {
            let from = resolve(&graph, &ids, edge.from_node, Direction::Output, edge.from_port)?;
            let to = resolve(&graph, &ids, edge.to_node, Direction::Input, edge.to_port)?;
            if let Err(reason) = graph.add_edge(from, to) {
                tracing::warn!(
                    from = %edge.from_node,
                    to = %edge.to_node,
                    %reason,
                    "Rejected saved edge"
                );
                return Err(PersistenceError::RejectedEdge {
                    from_node: edge.from_node,
                    from_port: edge.from_port,
                    to_node: edge.to_node,
                    to_port: edge.to_port,
                    reason,
                });
            }
        }

        tracing::info!(
            node_count = graph.node_count(),
            edge_count = graph.edge_count(),
            alias_count = saved.aliases.len(),
            "Restored graph"
        );
        Ok(graph)
    }
}

fn resolve(
    graph: &Graph,
    ids: &HashMap<Uuid, NodeId>,
    node: Uuid,
    direction: Direction,
    index: usize,
) -> Result<PortId, PersistenceError> {
    let id = *ids.get(&node).ok_or(PersistenceError::MissingNode(node))?;
    find_port(graph, node, id, direction, index)
}

fn find_port(
    graph: &Graph,
    uuid: Uuid,
    id: NodeId,
    direction: Direction,
    index: usize,
) -> Result<PortId, PersistenceError> {
    let port = match direction {
        Direction::Input => graph.input_port(id, index),
        Direction::Output => graph.output_port(id, index),
    };
    port.ok_or(PersistenceError::PortOutOfRange {
        node: uuid,
        direction,
        index,
    })
}
