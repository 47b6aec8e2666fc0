use graft_core::{ConnectionError, ConnectionValidator, Graph, NodeId, NodeRegistry, Properties};

fn add_nodes(graph: &mut Graph, registry: &NodeRegistry, count: usize) -> Vec<NodeId> {
    (0..count)
        .map(|_| {
            graph
                .add_node(registry.create("add", &Properties::new()).unwrap())
                .unwrap()
        })
        .collect()
}

#[test]
fn test_cycle_is_rejected_and_graph_unchanged() {
    let registry = NodeRegistry::with_core_nodes();
    let mut graph = Graph::default();
    let nodes = add_nodes(&mut graph, &registry, 3);
    let (a, b, c) = (nodes[0], nodes[1], nodes[2]);

    graph
        .add_edge(graph.output_port(a, 0).unwrap(), graph.input_port(b, 0).unwrap())
        .unwrap();
    graph
        .add_edge(graph.output_port(b, 0).unwrap(), graph.input_port(c, 0).unwrap())
        .unwrap();
    assert_eq!(graph.edge_count(), 2);

    let result = graph.add_edge(graph.output_port(c, 0).unwrap(), graph.input_port(a, 0).unwrap());
    assert_eq!(result, Err(ConnectionError::Cycle));
    assert_eq!(graph.edge_count(), 2);
    assert!(graph.port(graph.input_port(a, 0).unwrap()).unwrap().edges.is_empty());
    assert!(!graph.has_cycle());
}

#[test]
fn test_self_loop_is_rejected() {
    let registry = NodeRegistry::with_core_nodes();
    let mut graph = Graph::default();
    let a = add_nodes(&mut graph, &registry, 1)[0];

    for input in 0..2 {
        let result = graph.add_edge(
            graph.output_port(a, 0).unwrap(),
            graph.input_port(a, input).unwrap(),
        );
        assert_eq!(result, Err(ConnectionError::SelfLoop));
    }
    assert_eq!(graph.edge_count(), 0);
}

#[test]
fn test_reversed_pair_is_normalized() {
    let registry = NodeRegistry::with_core_nodes();
    let mut graph = Graph::default();
    let nodes = add_nodes(&mut graph, &registry, 2);
    let out = graph.output_port(nodes[0], 0).unwrap();
    let input = graph.input_port(nodes[1], 1).unwrap();

    let edge = graph.add_edge(input, out).unwrap();
    let edge = graph.edge(edge).unwrap();
    assert_eq!(edge.source, out);
    assert_eq!(edge.destination, input);
    assert_eq!(graph.predecessors(nodes[1]), vec![nodes[0]]);
    assert_eq!(graph.successors(nodes[0]), vec![nodes[1]]);
}

#[test]
fn test_duplicate_edge_is_rejected() {
    let registry = NodeRegistry::with_core_nodes();
    let mut graph = Graph::default();
    let nodes = add_nodes(&mut graph, &registry, 2);
    let out = graph.output_port(nodes[0], 0).unwrap();
    let input = graph.input_port(nodes[1], 0).unwrap();

    graph.add_edge(out, input).unwrap();
    assert_eq!(graph.add_edge(out, input), Err(ConnectionError::AlreadyConnected));
}

#[test]
fn test_remove_edge_invalidates_consumer() {
    let registry = NodeRegistry::with_core_nodes();
    let mut graph = Graph::default();
    let nodes = add_nodes(&mut graph, &registry, 2);
    let edge = graph
        .add_edge(
            graph.output_port(nodes[0], 0).unwrap(),
            graph.input_port(nodes[1], 0).unwrap(),
        )
        .unwrap();

    graph.evaluate(nodes[1], 0).unwrap();
    assert!(graph.remove_edge(edge));
    assert!(!graph.remove_edge(edge));
    assert_eq!(
        graph.output_state(nodes[1], 0),
        Some(graft_core::SlotState::Invalid)
    );
    assert!(graph.predecessors(nodes[1]).is_empty());
}

#[test]
fn test_connection_into_nested_scope_is_rejected() {
    let registry = NodeRegistry::with_core_nodes();
    let mut graph = Graph::default();
    let group = graph
        .add_node(registry.create("group", &Properties::new()).unwrap())
        .unwrap();
    let inner = graph
        .add_node_in(registry.create("add", &Properties::new()).unwrap(), group)
        .unwrap();
    let outside = add_nodes(&mut graph, &registry, 1)[0];

    let validator = ConnectionValidator::new(&graph);
    assert!(!validator.can_connect(
        graph.output_port(group, 0).unwrap(),
        graph.input_port(inner, 0).unwrap()
    ));
    // Crossing into a container from outside is fine at the group boundary.
    assert!(validator.can_connect(
        graph.output_port(outside, 0).unwrap(),
        graph.input_port(group, 0).unwrap()
    ));
}
