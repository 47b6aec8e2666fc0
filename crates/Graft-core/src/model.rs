//! # Core Data Models
//!
//! Nodes, ports and edges live in `SlotMap` arenas owned by the
//! [`Graph`](crate::graph::Graph); every cross-reference is an id.
//!
//! A node carries one [`EvalUnit`] per computed output and a parallel
//! [`OutputSlot`] holding that output's cache and state flags.

use crate::error::EvalError;
use crate::ragged::RaggedValue;
use crate::tree::TreeItemId;
use crate::value::{Nested, Value, ValueType};
use bitflags::bitflags;
use glam::Vec2;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub use uuid::Uuid;

new_key_type! {
    /// Unique identifier for a Node.
    pub struct NodeId;
    /// Unique identifier for a Port.
    pub struct PortId;
    /// Unique identifier for an Edge.
    pub struct EdgeId;
}

bitflags! {
    /// Structural transforms applied when a port's data is read.
    ///
    /// Applied in the fixed order flatten, simplify, graft.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct PortFlags: u8 {
        /// Drop one nesting level.
        const FLATTEN = 1 << 0;
        /// Remove singleton wrapper groups.
        const SIMPLIFY = 1 << 1;
        /// Wrap every leaf in its own group.
        const GRAFT = 1 << 2;
    }
}

// Stored as the raw bits so saved graphs stay compact.
impl Serialize for PortFlags {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.bits())
    }
}

impl<'de> Deserialize<'de> for PortFlags {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bits = u8::deserialize(deserializer)?;
        Ok(Self::from_bits_truncate(bits))
    }
}

impl PortFlags {
    pub fn apply(self, mut value: RaggedValue) -> RaggedValue {
        if self.contains(PortFlags::FLATTEN) {
            value = value.flatten();
        }
        if self.contains(PortFlags::SIMPLIFY) {
            value = value.simplify();
        }
        if self.contains(PortFlags::GRAFT) {
            value = value.graft();
        }
        value
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

/// A typed connection point on a Node.
#[derive(Clone, Debug)]
pub struct Port {
    pub id: PortId,
    /// Owning node.
    pub node: NodeId,
    /// Position within the node's inputs or outputs.
    pub index: usize,
    pub name: String,
    pub direction: Direction,
    pub value_type: ValueType,
    pub flags: PortFlags,
    /// Literal used when nothing is connected and no property overrides it.
    pub default: Option<Nested<Value>>,
    /// Port this one forwards resolution to (sub-graph boundaries).
    pub alias: Option<PortId>,
    /// Incident edges, in connection order.
    pub edges: Vec<EdgeId>,
}

/// A directed link from an output port to an input port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub id: EdgeId,
    pub source: PortId,
    pub destination: PortId,
}

/// Named node properties.
pub type Properties = BTreeMap<String, Nested<Value>>;

/// Leaf compute function of a node output.
pub type EvalFn = Arc<dyn Fn(&EvalInputs) -> Result<RaggedValue, EvalError> + Send + Sync>;

/// Computes one output from a subset of the node's inputs.
#[derive(Clone)]
pub struct EvalUnit {
    pub output: usize,
    /// Input port indices read by this unit, in the order handed to `func`.
    pub inputs: Vec<usize>,
    pub func: EvalFn,
}

impl fmt::Debug for EvalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalUnit")
            .field("output", &self.output)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// Resolved inputs handed to an [`EvalFn`].
///
/// Slot `i` corresponds to the `i`-th entry of [`EvalUnit::inputs`] and holds
/// one value per producer.
#[derive(Debug)]
pub struct EvalInputs<'a> {
    values: Vec<Vec<RaggedValue>>,
    properties: &'a Properties,
}

impl<'a> EvalInputs<'a> {
    pub fn new(values: Vec<Vec<RaggedValue>>, properties: &'a Properties) -> Self {
        Self { values, properties }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Every producer feeding slot `i`.
    pub fn all(&self, i: usize) -> &[RaggedValue] {
        self.values.get(i).map_or(&[][..], Vec::as_slice)
    }

    /// The first producer feeding slot `i`.
    pub fn get(&self, i: usize) -> Result<&RaggedValue, EvalError> {
        self.all(i)
            .first()
            .ok_or_else(|| EvalError::Compute(format!("input {} has no value", i)))
    }

    pub fn property(&self, key: &str) -> Option<&Nested<Value>> {
        self.properties.get(key)
    }
}

/// Cache and state flags of one output.
#[derive(Clone, Debug, Default)]
pub struct OutputSlot {
    pub cache: Option<RaggedValue>,
    /// Last evaluation failed.
    pub dirty: bool,
    /// Recompute regardless of the cache.
    pub invalid: bool,
    /// Error retained from the last failed evaluation.
    pub error: Option<EvalError>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    Fresh,
    Dirty,
    Invalid,
    Empty,
}

impl OutputSlot {
    pub fn state(&self) -> SlotState {
        if self.invalid {
            SlotState::Invalid
        } else if self.dirty {
            SlotState::Dirty
        } else if self.cache.is_none() {
            SlotState::Empty
        } else {
            SlotState::Fresh
        }
    }
}

/// A Node in the graph.
#[derive(Clone, Debug)]
pub struct Node {
    /// Self-reference ID.
    pub id: NodeId,
    /// Stable UUID for persistence.
    pub uuid: Uuid,
    /// Registry key the node was built from.
    pub type_tag: String,
    pub position: Vec2,
    pub properties: Properties,
    pub inputs: Vec<PortId>,
    pub outputs: Vec<PortId>,
    pub eval_units: Vec<EvalUnit>,
    /// One slot per output.
    pub slots: Vec<OutputSlot>,
    /// Entry in the document outline.
    pub outline: TreeItemId,
}

impl Node {
    pub fn eval_unit(&self, output: usize) -> Option<&EvalUnit> {
        self.eval_units.iter().find(|unit| unit.output == output)
    }

    pub fn ports(&self) -> impl Iterator<Item = PortId> + '_ {
        self.inputs.iter().chain(self.outputs.iter()).copied()
    }
}

/// Declares one port of a [`NodeTemplate`].
#[derive(Clone, Debug)]
pub struct PortSpec {
    pub name: String,
    pub value_type: ValueType,
    pub flags: PortFlags,
    pub default: Option<Nested<Value>>,
}

impl PortSpec {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            flags: PortFlags::empty(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<Nested<Value>>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_flags(mut self, flags: PortFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Blueprint consumed by [`Graph::add_node`](crate::graph::Graph::add_node).
#[derive(Clone, Debug, Default)]
pub struct NodeTemplate {
    pub type_tag: String,
    pub inputs: Vec<PortSpec>,
    pub outputs: Vec<PortSpec>,
    pub eval_units: Vec<EvalUnit>,
    pub properties: Properties,
}

impl NodeTemplate {
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            ..Default::default()
        }
    }

    pub fn input(mut self, spec: PortSpec) -> Self {
        self.inputs.push(spec);
        self
    }

    pub fn output(mut self, spec: PortSpec) -> Self {
        self.outputs.push(spec);
        self
    }

    /// Registers the compute function of output `output`, reading the given input indices.
    pub fn eval<F>(mut self, output: usize, inputs: &[usize], func: F) -> Self
    where
        F: Fn(&EvalInputs) -> Result<RaggedValue, EvalError> + Send + Sync + 'static,
    {
        self.eval_units.push(EvalUnit {
            output,
            inputs: inputs.to_vec(),
            func: Arc::new(func),
        });
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<Nested<Value>>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Checks that every eval unit addresses existing ports and that no
    /// output is computed twice.
    pub fn check(&self) -> Result<(), String> {
        let mut seen = vec![false; self.outputs.len()];
        for unit in &self.eval_units {
            match seen.get_mut(unit.output) {
                None => return Err(format!("eval unit targets missing output {}", unit.output)),
                Some(true) => return Err(format!("output {} has two eval units", unit.output)),
                Some(slot) => *slot = true,
            }
            if let Some(bad) = unit.inputs.iter().find(|&&i| i >= self.inputs.len()) {
                return Err(format!("eval unit reads missing input {}", bad));
            }
        }
        Ok(())
    }
}
