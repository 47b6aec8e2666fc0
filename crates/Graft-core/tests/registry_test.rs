use graft_core::registry::PortMetadata;
use graft_core::{
    Graph, GraphError, NodeFactory, NodeMetadata, NodeRegistry, NodeTemplate, PortSpec,
    Properties, Value, ValueType,
};

struct NegateFactory;

impl NodeFactory for NegateFactory {
    fn build(&self, config: &Properties) -> Result<NodeTemplate, GraphError> {
        let mut template = NodeTemplate::new("negate")
            .input(PortSpec::new("value", ValueType::Number).with_default(0.0))
            .output(PortSpec::new("negated", ValueType::Number))
            .eval(0, &[0], |inputs| {
                let value = inputs.get(0)?;
                let flat = value
                    .flat()
                    .iter()
                    .map(|v| Value::Number(-v.as_f64().unwrap_or_default()))
                    .collect();
                Ok(graft_core::RaggedValue::from_flat(flat))
            });
        template.properties.extend(config.clone());
        Ok(template)
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("negate", "Negate", "Math", None)
    }
}

#[test]
fn test_core_catalogue() {
    let registry = NodeRegistry::with_core_nodes();
    assert_eq!(
        registry.types(),
        vec![
            "add", "divide", "group", "length", "multiply", "number", "point", "range", "subtract",
            "sum"
        ]
    );
}

#[test]
fn test_lookup_is_case_insensitive() {
    let registry = NodeRegistry::with_core_nodes();
    assert!(registry.get("Range").is_some());
    assert!(registry.get("MULTIPLY").is_some());

    let template = registry.create("Range", &Properties::new()).unwrap();
    assert_eq!(template.type_tag, "range");
}

#[test]
fn test_unknown_type() {
    let registry = NodeRegistry::with_core_nodes();
    let result = registry.create("teleport", &Properties::new());
    assert!(matches!(result, Err(GraphError::UnknownNodeType(tag)) if tag == "teleport"));
}

#[test]
fn test_metadata_lists_ports() {
    let registry = NodeRegistry::with_core_nodes();
    let range = registry
        .metadata()
        .into_iter()
        .find(|m| m.id == "range")
        .unwrap();
    let names: Vec<&str> = range.inputs.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["start", "stop", "step"]);
    assert_eq!(range.outputs.len(), 1);
    assert_eq!(
        range.inputs[0],
        PortMetadata {
            name: "start".to_string(),
            data_type: "number".to_string(),
        }
    );
}

#[test]
fn test_custom_factory() {
    let mut registry = NodeRegistry::with_core_nodes();
    registry.register("Negate", Box::new(NegateFactory));
    assert!(registry.types().contains(&"negate"));

    let mut config = Properties::new();
    config.insert("value".to_string(), vec![Value::Number(1.5), Value::Number(-2.0)].into());

    let mut graph = Graph::default();
    let node = graph.add_node(registry.create("negate", &config).unwrap()).unwrap();
    let result = graph.evaluate(node, 0).unwrap();
    assert_eq!(result.flat(), &[Value::Number(-1.5), Value::Number(2.0)]);
}
