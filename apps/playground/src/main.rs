use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use graft_core::{EngineConfig, Graph, NodeId, NodeRegistry, Properties, SavedGraph, Uuid, Value};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
#[command(name = "graft")]
#[command(about = "Evaluate saved Graft graphs from the command line", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a saved graph (YAML or JSON) and print evaluated outputs.
    Eval {
        graph: PathBuf,

        /// Node to evaluate. Defaults to every top-level node nothing reads from.
        #[arg(long)]
        node: Option<Uuid>,

        #[arg(short = 'o', long, default_value_t = 0)]
        output: usize,

        /// Engine tunables (YAML or JSON).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List the built-in node types and their ports.
    Nodes,
    /// Build a small graph in memory, print its snapshot and evaluate it twice.
    Demo,
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = if is_json(path) {
        EngineConfig::from_json_str(&text)?
    } else {
        EngineConfig::from_yaml_str(&text)?
    };
    Ok(config)
}

fn load_graph(path: &Path, registry: &NodeRegistry, config: EngineConfig) -> Result<Graph> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading graph {}", path.display()))?;
    let saved = if is_json(path) {
        SavedGraph::from_json(&text)?
    } else {
        SavedGraph::from_yaml(&text)?
    };
    Graph::restore(&saved, registry, config)
        .with_context(|| format!("restoring graph {}", path.display()))
}

fn print_output(graph: &mut Graph, node: NodeId, output: usize) -> Result<()> {
    let (uuid, tag) = match graph.node(node) {
        Some(n) => (n.uuid, n.type_tag.clone()),
        None => bail!("node {:?} vanished", node),
    };
    match graph.evaluate(node, output) {
        Ok(value) => println!("{} {}[{}] = {}", uuid, tag, output, value.to_jagged()),
        Err(err) => println!("{} {}[{}] failed: {}", uuid, tag, output, err.root_cause()),
    }
    Ok(())
}

fn eval(graph_path: &Path, node: Option<Uuid>, output: usize, config: Option<&Path>) -> Result<()> {
    let registry = NodeRegistry::with_core_nodes();
    let mut graph = load_graph(graph_path, &registry, load_config(config)?)?;

    let targets: Vec<NodeId> = match node {
        Some(uuid) => match graph.find_by_uuid(uuid) {
            Some(id) => vec![id],
            None => bail!("no node {} in {}", uuid, graph_path.display()),
        },
        None => graph
            .children(None)
            .into_iter()
            .filter(|&id| graph.successors(id).is_empty())
            .collect(),
    };
    tracing::info!(targets = targets.len(), "Evaluating");

    for id in targets {
        print_output(&mut graph, id, output)?;
    }
    Ok(())
}

fn list_nodes() {
    for meta in NodeRegistry::with_core_nodes().metadata() {
        let ports = |ports: &[graft_core::registry::PortMetadata]| {
            ports
                .iter()
                .map(|p| format!("{}: {}", p.name, p.data_type))
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!(
            "{:<10} [{}] ({}) -> ({})",
            meta.id,
            meta.category,
            ports(&meta.inputs),
            ports(&meta.outputs)
        );
    }
}

fn demo() -> Result<()> {
    let registry = NodeRegistry::with_core_nodes();
    let mut graph = Graph::default();

    let mut stop = Properties::new();
    stop.insert("value".to_string(), vec![Value::Number(3.0), Value::Number(5.0)].into());
    let mut scale = Properties::new();
    scale.insert("b".to_string(), Value::Number(10.0).into());

    let stop = graph.add_node(registry.create("number", &stop)?)?;
    let range = graph.add_node(registry.create("range", &Properties::new())?)?;
    let multiply = graph.add_node(registry.create("multiply", &scale)?)?;
    graph.set_position(range, glam::Vec2::new(200.0, 0.0))?;
    graph.set_position(multiply, glam::Vec2::new(400.0, 0.0))?;

    let port = |graph: &Graph, node, input: bool, index| {
        let port = if input {
            graph.input_port(node, index)
        } else {
            graph.output_port(node, index)
        };
        port.context("missing port")
    };
    graph.add_edge(port(&graph, stop, false, 0)?, port(&graph, range, true, 1)?)?;
    graph.add_edge(port(&graph, range, false, 0)?, port(&graph, multiply, true, 0)?)?;

    println!("{}", graph.save().to_yaml()?);
    print_output(&mut graph, multiply, 0)?;

    graph.set_property(multiply, "b", Value::Number(-1.0))?;
    print_output(&mut graph, multiply, 0)?;
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Eval {
            graph,
            node,
            output,
            config,
        } => eval(&graph, node, output, config.as_deref())?,
        Commands::Nodes => list_nodes(),
        Commands::Demo => demo()?,
    }
    Ok(())
}
