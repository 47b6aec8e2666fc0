//! Error types for the engine.

use crate::model::{Direction, NodeId, PortId};
use crate::value::ValueType;
use thiserror::Error;
use uuid::Uuid;

/// Errors produced while evaluating an output.
///
/// Errors are cloned into the failing output slot so a host can show them
/// after the call returns.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Operand lengths could not be matched.
    #[error("shape mismatch: expected {expected} values, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    /// A node function rejected its inputs.
    #[error("compute error: {0}")]
    Compute(String),

    /// A numeric result is undefined (division by zero, zero step, empty operand).
    #[error("degenerate input: {0}")]
    Degenerate(String),

    #[error("type error: expected {expected}, got {got}")]
    TypeMismatch { expected: ValueType, got: ValueType },

    /// An alias chain dangles or loops.
    #[error("invalid port alias on {port:?}: {reason}")]
    InvalidPortAlias { port: PortId, reason: String },

    /// A node feeding this one failed.
    #[error("upstream node {node} failed: {source}")]
    Upstream {
        node: Uuid,
        #[source]
        source: Box<EvalError>,
    },

    #[error("output {output} has no evaluation function")]
    NoEvaluator { output: usize },

    #[error("evaluation depth limit of {limit} exceeded")]
    DepthExceeded { limit: usize },

    #[error("node not found: {0:?}")]
    NodeNotFound(NodeId),

    #[error("node {node:?} has no output {output}")]
    OutputOutOfRange { node: NodeId, output: usize },
}

impl EvalError {
    /// The innermost error, skipping `Upstream` wrappers.
    pub fn root_cause(&self) -> &EvalError {
        match self {
            EvalError::Upstream { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Reasons a proposed edge is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("port not found: {0:?}")]
    PortNotFound(PortId),

    #[error("both ports are {0:?} ports")]
    SameDirection(Direction),

    #[error("cannot connect a node to itself")]
    SelfLoop,

    #[error("cannot connect across nested scopes")]
    NestedScope,

    #[error("source and destination are the same port")]
    IdentityEdge,

    #[error("type mismatch: {from} cannot feed {to}")]
    TypeMismatch { from: ValueType, to: ValueType },

    #[error("ports are already connected")]
    AlreadyConnected,

    #[error("connection would create a cycle")]
    Cycle,
}

/// Structural lookup failures on the graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("node not found: {0:?}")]
    NodeNotFound(NodeId),

    #[error("port not found: {0:?}")]
    PortNotFound(PortId),

    #[error("expected an {expected:?} port, got {got:?}")]
    DirectionMismatch { expected: Direction, got: Direction },

    #[error("invalid node template: {0}")]
    InvalidTemplate(String),

    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("aliasing {port:?} to {target:?} would create a dependency cycle")]
    AliasCycle { port: PortId, target: PortId },
}

/// Failures while saving or restoring a graph.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("duplicate node uuid: {0}")]
    DuplicateNode(Uuid),

    #[error("missing node: {0}")]
    MissingNode(Uuid),

    #[error("node {node} has no {direction:?} port {index}")]
    PortOutOfRange {
        node: Uuid,
        direction: Direction,
        index: usize,
    },

    #[error("edge {from_node}:{from_port} -> {to_node}:{to_port} rejected: {reason}")]
    RejectedEdge {
        from_node: Uuid,
        from_port: usize,
        to_node: Uuid,
        to_port: usize,
        reason: ConnectionError,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
}
