//! # Graft
//!
//! `graft_core` is a lazy, cached dataflow engine. Nodes own typed ports,
//! edges carry data from outputs to inputs, and every output memoizes its last
//! result until something upstream changes.
//!
//! ## Core Architecture
//! - **Model (`src/model.rs`)**: Nodes, ports and edges stored in flat arenas (SlotMap).
//! - **Graph (`src/graph.rs`)**: Sole owner and mutation entry point; invalidates downstream on change.
//! - **Evaluator (`src/eval.rs`)**: Pull-based evaluation with per-output caches.
//! - **Ragged data (`src/ragged.rs`)**: Flat values plus a nesting template, broadcast by node logic.
//! - **Registry (`src/registry.rs`)**: Type tag to factory mapping used to build and restore nodes.

pub mod config;
pub mod error;
pub mod eval;
pub mod graph;
pub mod model;
pub mod nodes;
pub mod persistence;
pub mod ragged;
pub mod registry;
pub mod tree;
pub mod validator;
pub mod value;

// Re-exports for convenience
pub use config::EngineConfig;
pub use error::{ConnectionError, EvalError, GraphError, PersistenceError};
pub use eval::{EvalStats, Evaluator};
pub use graph::Graph;
pub use model::{
    Direction, EdgeId, EvalInputs, NodeId, NodeTemplate, PortFlags, PortId, PortSpec, Properties,
    SlotState, Uuid,
};
pub use persistence::SavedGraph;
pub use ragged::{RaggedValue, Structure, broadcast};
pub use registry::{NodeFactory, NodeMetadata, NodeRegistry};
pub use validator::ConnectionValidator;
pub use value::{Nested, Value, ValueType};
