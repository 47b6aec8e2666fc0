//! Numeric and sequence nodes.
//!
//! Every compute function here is written against one row of scalars; the
//! broadcast helpers take care of matching list lengths and nesting.

use crate::error::{EvalError, GraphError};
use crate::model::{NodeTemplate, PortSpec, Properties};
use crate::ragged::{RaggedValue, broadcast};
use crate::value::{Value, ValueType};
use glam::DVec3;

/// Upper bound on the number of values a single range row may produce.
pub const MAX_RANGE_LEN: usize = 1_000_000;

fn number_of(value: &Value) -> Result<f64, EvalError> {
    value.as_f64().ok_or(EvalError::TypeMismatch {
        expected: ValueType::Number,
        got: value.value_type(),
    })
}

fn finite(x: f64, what: &str) -> Result<Value, EvalError> {
    if x.is_finite() {
        Ok(Value::Number(x))
    } else {
        Err(EvalError::Degenerate(format!("{} produced {}", what, x)))
    }
}

/// Applies `f` to the members of every innermost group.
fn per_group<F>(value: &RaggedValue, f: F) -> Result<RaggedValue, EvalError>
where
    F: Fn(&[&Value]) -> Result<Value, EvalError>,
{
    let flat = value.flat();
    let results = value
        .groups()
        .iter()
        .map(|group| {
            let members: Vec<&Value> = group.iter().filter_map(|&i| flat.get(i)).collect();
            f(&members)
        })
        .collect::<Result<Vec<_>, _>>()?;
    RaggedValue::from_parts(results, value.structure_keep_last())
}

pub fn number(_config: &Properties) -> Result<NodeTemplate, GraphError> {
    Ok(NodeTemplate::new("number")
        .input(PortSpec::new("value", ValueType::Number).with_default(0.0))
        .output(PortSpec::new("out", ValueType::Number))
        .eval(0, &[0], |inputs| Ok(inputs.get(0)?.clone())))
}

pub fn range(_config: &Properties) -> Result<NodeTemplate, GraphError> {
    Ok(NodeTemplate::new("range")
        .input(PortSpec::new("start", ValueType::Number).with_default(0.0))
        .input(PortSpec::new("stop", ValueType::Number).with_default(10.0))
        .input(PortSpec::new("step", ValueType::Number).with_default(1.0))
        .output(PortSpec::new("range", ValueType::Number))
        .eval(0, &[0, 1, 2], |inputs| {
            broadcast(&[inputs.get(0)?, inputs.get(1)?, inputs.get(2)?])?.expand(|row| {
                let start = number_of(row[0])?;
                let stop = number_of(row[1])?;
                let step = number_of(row[2])?;
                if step == 0.0 {
                    return Err(EvalError::Degenerate("range step is zero".to_string()));
                }
                let count = ((stop - start) / step).ceil();
                if !count.is_finite() || count > MAX_RANGE_LEN as f64 {
                    return Err(EvalError::Degenerate(format!(
                        "range {}..{} by {} is too long",
                        start, stop, step
                    )));
                }
                let count = count.max(0.0) as usize;
                Ok((0..count)
                    .map(|i| Value::Number(start + i as f64 * step))
                    .collect())
            })
        }))
}

fn binary(
    tag: &str,
    default_b: f64,
    op: fn(f64, f64) -> Result<f64, EvalError>,
) -> NodeTemplate {
    let what = tag.to_string();
    NodeTemplate::new(tag)
        .input(PortSpec::new("a", ValueType::Number).with_default(0.0))
        .input(PortSpec::new("b", ValueType::Number).with_default(default_b))
        .output(PortSpec::new("result", ValueType::Number))
        .eval(0, &[0, 1], move |inputs| {
            broadcast(&[inputs.get(0)?, inputs.get(1)?])?.map(|row| {
                let result = op(number_of(row[0])?, number_of(row[1])?)?;
                finite(result, &what)
            })
        })
}

pub fn add(_config: &Properties) -> Result<NodeTemplate, GraphError> {
    Ok(binary("add", 0.0, |a, b| Ok(a + b)))
}

pub fn subtract(_config: &Properties) -> Result<NodeTemplate, GraphError> {
    Ok(binary("subtract", 0.0, |a, b| Ok(a - b)))
}

pub fn multiply(_config: &Properties) -> Result<NodeTemplate, GraphError> {
    Ok(binary("multiply", 1.0, |a, b| Ok(a * b)))
}

pub fn divide(_config: &Properties) -> Result<NodeTemplate, GraphError> {
    Ok(binary("divide", 1.0, |a, b| {
        if b == 0.0 {
            Err(EvalError::Degenerate("division by zero".to_string()))
        } else {
            Ok(a / b)
        }
    }))
}

pub fn point(_config: &Properties) -> Result<NodeTemplate, GraphError> {
    Ok(NodeTemplate::new("point")
        .input(PortSpec::new("x", ValueType::Number).with_default(0.0))
        .input(PortSpec::new("y", ValueType::Number).with_default(0.0))
        .input(PortSpec::new("z", ValueType::Number).with_default(0.0))
        .output(PortSpec::new("point", ValueType::Point))
        .eval(0, &[0, 1, 2], |inputs| {
            broadcast(&[inputs.get(0)?, inputs.get(1)?, inputs.get(2)?])?.map(|row| {
                Ok(Value::Point(DVec3::new(
                    number_of(row[0])?,
                    number_of(row[1])?,
                    number_of(row[2])?,
                )))
            })
        }))
}

pub fn length(_config: &Properties) -> Result<NodeTemplate, GraphError> {
    Ok(NodeTemplate::new("length")
        .input(PortSpec::new("list", ValueType::Any))
        .output(PortSpec::new("length", ValueType::Int))
        .eval(0, &[0], |inputs| {
            per_group(inputs.get(0)?, |members| Ok(Value::Int(members.len() as i64)))
        }))
}

pub fn sum(_config: &Properties) -> Result<NodeTemplate, GraphError> {
    Ok(NodeTemplate::new("sum")
        .input(PortSpec::new("list", ValueType::Number))
        .output(PortSpec::new("sum", ValueType::Number))
        .eval(0, &[0], |inputs| {
            per_group(inputs.get(0)?, |members| {
                let total = members
                    .iter()
                    .map(|v| number_of(v))
                    .sum::<Result<f64, _>>()?;
                finite(total, "sum")
            })
        }))
}
