//! Sub-graph container.
//!
//! A group has no compute functions of its own. Its outputs alias outputs of
//! nested nodes and nested inputs alias its inputs, so reading through the
//! group forwards to whatever it wraps.

use crate::error::GraphError;
use crate::model::{NodeTemplate, PortSpec, Properties};
use crate::value::{Nested, Value, ValueType};

const MAX_GROUP_PORTS: usize = 64;

fn port_count(config: &Properties, key: &str) -> Result<usize, GraphError> {
    let Some(value) = config.get(key) else {
        return Ok(1);
    };
    let count = match value {
        Nested::Leaf(Value::Int(n)) => usize::try_from(*n).ok(),
        Nested::Leaf(v) => v
            .as_f64()
            .filter(|n| n.fract() == 0.0 && *n >= 0.0)
            .map(|n| n as usize),
        Nested::List(_) => None,
    };
    match count {
        Some(n) if n <= MAX_GROUP_PORTS => Ok(n),
        _ => Err(GraphError::InvalidTemplate(format!(
            "group property {:?} must be a port count up to {}",
            key, MAX_GROUP_PORTS
        ))),
    }
}

pub fn group(config: &Properties) -> Result<NodeTemplate, GraphError> {
    let inputs = port_count(config, "inputs")?;
    let outputs = port_count(config, "outputs")?;

    let mut template = NodeTemplate::new("group")
        .property("inputs", Value::Int(inputs as i64))
        .property("outputs", Value::Int(outputs as i64));
    for i in 0..inputs {
        template = template.input(PortSpec::new(format!("in{}", i), ValueType::Any));
    }
    for i in 0..outputs {
        template = template.output(PortSpec::new(format!("out{}", i), ValueType::Any));
    }
    Ok(template)
}
