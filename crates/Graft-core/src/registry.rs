use crate::error::GraphError;
use crate::model::{NodeTemplate, PortSpec, Properties};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortMetadata {
    pub name: String,
    pub data_type: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub inputs: Vec<PortMetadata>,
    pub outputs: Vec<PortMetadata>,
}

impl NodeMetadata {
    pub fn new(id: &str, name: &str, category: &str, description: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            description: description.map(str::to_string),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Copies the port list of `template`.
    pub fn with_ports(mut self, template: &NodeTemplate) -> Self {
        fn describe(spec: &PortSpec) -> PortMetadata {
            PortMetadata {
                name: spec.name.clone(),
                data_type: spec.value_type.to_string(),
            }
        }
        self.inputs = template.inputs.iter().map(describe).collect();
        self.outputs = template.outputs.iter().map(describe).collect();
        self
    }
}

/// Trait for building node templates from a property set.
///
/// Implementing this allows a node type to be registered in the [`NodeRegistry`].
pub trait NodeFactory: Send + Sync {
    /// Builds the node's ports and eval units. `config` overrides the
    /// template's default properties.
    fn build(&self, config: &Properties) -> Result<NodeTemplate, GraphError>;

    /// Returns metadata about the node for UI/docs.
    fn metadata(&self) -> NodeMetadata;
}

/// Maps case-insensitive type tags to factories.
#[derive(Default)]
pub struct NodeRegistry {
    factories: HashMap<String, Box<dyn NodeFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in catalogue.
    pub fn with_core_nodes() -> Self {
        let mut registry = Self::new();
        crate::nodes::register_core_nodes(&mut registry);
        registry
    }

    pub fn register(&mut self, node_type: &str, factory: Box<dyn NodeFactory>) {
        self.factories.insert(node_type.to_lowercase(), factory);
    }

    pub fn get(&self, node_type: &str) -> Option<&dyn NodeFactory> {
        self.factories
            .get(&node_type.to_lowercase())
            .map(|b| b.as_ref())
    }

    /// Builds a template for `node_type`, tagged with the normalized type name.
    pub fn create(&self, node_type: &str, config: &Properties) -> Result<NodeTemplate, GraphError> {
        let key = node_type.to_lowercase();
        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| GraphError::UnknownNodeType(node_type.to_string()))?;
        let mut template = factory.build(config)?;
        template.type_tag = key;
        Ok(template)
    }

    /// Registered type tags, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn metadata(&self) -> Vec<NodeMetadata> {
        let mut all: Vec<NodeMetadata> = self.factories.values().map(|f| f.metadata()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}
