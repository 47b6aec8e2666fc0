use glam::Vec2;
use graft_core::persistence::{SavedAlias, SavedEdge, SavedNode};
use graft_core::{
    ConnectionError, Direction, EngineConfig, Graph, GraphError, Nested, NodeId, NodeRegistry, PersistenceError,
    PortFlags, Properties, SavedGraph, Uuid, Value,
};

fn create(
    registry: &NodeRegistry,
    tag: &str,
    props: &[(&str, Nested<Value>)],
) -> graft_core::NodeTemplate {
    let config: Properties = props
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    registry.create(tag, &config).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn connect(graph: &mut Graph, from: NodeId, to: NodeId, input: usize) {
    graph
        .add_edge(
            graph.output_port(from, 0).unwrap(),
            graph.input_port(to, input).unwrap(),
        )
        .unwrap();
}

/// numbers -> range -> group(multiply by 2) -> length, with a grafted input.
fn sample(registry: &NodeRegistry) -> (Graph, NodeId, NodeId) {
    let mut graph = Graph::default();
    let start = graph.add_node(create(registry, "number", &[("value", 1.0.into())])).unwrap();
    let stop = graph.add_node(create(registry, "number", &[("value", 4.0.into())])).unwrap();
    let range = graph.add_node(create(registry, "range", &[])).unwrap();
    connect(&mut graph, start, range, 0);
    connect(&mut graph, stop, range, 1);

    let group = graph.add_node(create(registry, "group", &[])).unwrap();
    let inner = graph
        .add_node_in(create(registry, "multiply", &[("b", 2.0.into())]), group)
        .unwrap();
    graph
        .link_alias(
            graph.input_port(inner, 0).unwrap(),
            graph.input_port(group, 0).unwrap(),
        )
        .unwrap();
    graph
        .link_alias(
            graph.output_port(group, 0).unwrap(),
            graph.output_port(inner, 0).unwrap(),
        )
        .unwrap();
    connect(&mut graph, range, group, 0);

    let length = graph.add_node(create(registry, "length", &[])).unwrap();
    connect(&mut graph, group, length, 0);
    graph
        .set_port_flags(graph.input_port(length, 0).unwrap(), PortFlags::GRAFT)
        .unwrap();
    graph.set_position(length, Vec2::new(320.0, 48.0)).unwrap();

    (graph, group, length)
}

#[test]
fn test_round_trip_through_yaml() {
    init_tracing();
    let registry = NodeRegistry::with_core_nodes();
    let (mut graph, group, length) = sample(&registry);
    let expected_group = graph.evaluate(group, 0).unwrap();
    let expected_length = graph.evaluate(length, 0).unwrap();
    assert_eq!(
        expected_group.flat(),
        &[Value::Number(2.0), Value::Number(4.0), Value::Number(6.0)]
    );

    let saved = graph.save();
    let yaml = saved.to_yaml().unwrap();
    let loaded = SavedGraph::from_yaml(&yaml).unwrap();
    assert_eq!(loaded, saved);

    let mut restored = Graph::restore(&loaded, &registry, EngineConfig::default()).unwrap();
    assert_eq!(restored.node_count(), graph.node_count());
    assert_eq!(restored.edge_count(), graph.edge_count());

    let group_uuid = graph.node(group).unwrap().uuid;
    let length_uuid = graph.node(length).unwrap().uuid;
    let r_group = restored.find_by_uuid(group_uuid).unwrap();
    let r_length = restored.find_by_uuid(length_uuid).unwrap();

    assert_eq!(restored.node(r_length).unwrap().position, Vec2::new(320.0, 48.0));
    assert_eq!(restored.children(Some(r_group)).len(), 1);
    assert_eq!(restored.evaluate(r_group, 0).unwrap(), expected_group);
    assert_eq!(restored.evaluate(r_length, 0).unwrap(), expected_length);

    assert_eq!(restored.save(), saved);
}

#[test]
fn test_round_trip_through_json() {
    let registry = NodeRegistry::with_core_nodes();
    let (graph, _, _) = sample(&registry);
    let saved = graph.save();
    let json = saved.to_json().unwrap();
    assert_eq!(SavedGraph::from_json(&json).unwrap(), saved);
}

#[test]
fn test_unknown_type_is_reported() {
    let registry = NodeRegistry::with_core_nodes();
    let saved = SavedGraph {
        nodes: vec![SavedNode {
            uuid: Uuid::new_v4(),
            type_tag: "teleport".to_string(),
            position: Vec2::ZERO,
            properties: Properties::new(),
            parent: None,
            input_flags: Vec::new(),
            output_flags: Vec::new(),
        }],
        ..Default::default()
    };
    let err = Graph::restore(&saved, &registry, EngineConfig::default()).unwrap_err();
    assert!(matches!(err, PersistenceError::UnknownNodeType(tag) if tag == "teleport"));
}

#[test]
fn test_cyclic_snapshot_is_rejected() {
    init_tracing();
    let registry = NodeRegistry::with_core_nodes();
    let node = |uuid| SavedNode {
        uuid,
        type_tag: "add".to_string(),
        position: Vec2::ZERO,
        properties: Properties::new(),
        parent: None,
        input_flags: Vec::new(),
        output_flags: Vec::new(),
    };
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let saved = SavedGraph {
        nodes: vec![node(a), node(b)],
        edges: vec![
            SavedEdge {
                from_node: a,
                from_port: 0,
                to_node: b,
                to_port: 0,
            },
            SavedEdge {
                from_node: b,
                from_port: 0,
                to_node: a,
                to_port: 0,
            },
        ],
        aliases: Vec::new(),
    };

    let err = Graph::restore(&saved, &registry, EngineConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        PersistenceError::RejectedEdge {
            reason: ConnectionError::Cycle,
            ..
        }
    ));
}

#[test]
fn test_port_index_out_of_range() {
    let registry = NodeRegistry::with_core_nodes();
    let a = Uuid::new_v4();
    let yaml = format!(
        "nodes:\n  - uuid: {a}\n    type_tag: number\n    properties:\n      value: 2.5\nedges:\n  - from_node: {a}\n    from_port: 3\n    to_node: {a}\n    to_port: 0\n"
    );
    let saved = SavedGraph::from_yaml(&yaml).unwrap();
    assert_eq!(
        saved.nodes[0].properties.get("value"),
        Some(&Nested::Leaf(Value::Number(2.5)))
    );

    let err = Graph::restore(&saved, &registry, EngineConfig::default()).unwrap_err();
    assert!(matches!(err, PersistenceError::PortOutOfRange { index: 3, .. }));
}

#[test]
fn test_alias_loop_in_snapshot_is_rejected() {
    let registry = NodeRegistry::with_core_nodes();
    let node = |uuid| SavedNode {
        uuid,
        type_tag: "add".to_string(),
        position: Vec2::ZERO,
        properties: Properties::new(),
        parent: None,
        input_flags: Vec::new(),
        output_flags: Vec::new(),
    };
    let alias = |node, target_node| SavedAlias {
        node,
        direction: Direction::Input,
        port: 0,
        target_node,
        target_port: 0,
    };
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let saved = SavedGraph {
        nodes: vec![node(a), node(b)],
        edges: Vec::new(),
        aliases: vec![alias(a, b), alias(b, a)],
    };

    let err = Graph::restore(&saved, &registry, EngineConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        PersistenceError::Graph(GraphError::AliasCycle { .. })
    ));
}
