//! # Values
//!
//! Scalar payloads carried through the graph, plus the generic [`Nested`]
//! container used both for jagged user data and for structure templates.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest magnitude below which every integral `f64` is exact.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// A single payload value.
///
/// Geometry results are carried as opaque leaves (currently [`Value::Point`]);
/// the engine never inspects them beyond type checks.
///
/// Serialized untagged: `10` is an `Int`, `10.0` a `Number`, and points are
/// `{x, y, z}` maps so they never read back as a list of three numbers.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Number(f64),
    Text(String),
    Point(#[serde(with = "point_map")] DVec3),
}

mod point_map {
    use glam::DVec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Point {
        x: f64,
        y: f64,
        z: f64,
    }

    pub fn serialize<S: Serializer>(p: &DVec3, serializer: S) -> Result<S::Ok, S::Error> {
        Point {
            x: p.x,
            y: p.y,
            z: p.z,
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DVec3, D::Error> {
        let p = Point::deserialize(deserializer)?;
        Ok(DVec3::new(p.x, p.y, p.z))
    }
}

/// Declared payload type of a port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValueType {
    #[default]
    Any,
    Null,
    Bool,
    Int,
    Number,
    Text,
    Point,
}

impl ValueType {
    fn is_numeric(self) -> bool {
        matches!(self, ValueType::Bool | ValueType::Int | ValueType::Number)
    }

    /// Returns true if a value of type `self` may feed a port declared as `other`.
    ///
    /// `Any` matches everything and numeric types coerce into each other.
    pub fn is_compatible(self, other: ValueType) -> bool {
        self == other
            || self == ValueType::Any
            || other == ValueType::Any
            || (self.is_numeric() && other.is_numeric())
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Any => "any",
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Number => "number",
            ValueType::Text => "text",
            ValueType::Point => "point",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Number(_) => ValueType::Number,
            Value::Text(_) => ValueType::Text,
            Value::Point(_) => ValueType::Point,
        }
    }

    /// Numeric view of the value. Bools coerce to 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_point(&self) -> Option<DVec3> {
        match self {
            Value::Point(p) => Some(*p),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < MAX_EXACT_INT {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Point(p) => write!(f, "({}, {}, {})", p.x, p.y, p.z),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<DVec3> for Value {
    fn from(value: DVec3) -> Self {
        Value::Point(value)
    }
}

/// An arbitrarily nested (jagged) collection.
///
/// `Nested<Value>` is user-facing jagged data; `Nested<usize>` is a structure
/// template whose leaves index into a flat sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Nested<T> {
    Leaf(T),
    List(Vec<Nested<T>>),
}

impl<T> Nested<T> {
    pub fn leaf(value: impl Into<T>) -> Self {
        Nested::Leaf(value.into())
    }

    /// A single group holding the given leaves.
    pub fn flat<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<T>,
    {
        Nested::List(values.into_iter().map(|v| Nested::Leaf(v.into())).collect())
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Nested::Leaf(_))
    }

    /// Nesting depth: a leaf is 0, a list is one more than its deepest child.
    pub fn depth(&self) -> usize {
        match self {
            Nested::Leaf(_) => 0,
            Nested::List(children) => 1 + children.iter().map(Nested::depth).max().unwrap_or(0),
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            Nested::Leaf(_) => 1,
            Nested::List(children) => children.iter().map(Nested::leaf_count).sum(),
        }
    }

    /// Leaves in depth-first order.
    pub fn leaves(&self) -> Vec<&T> {
        let mut out = Vec::with_capacity(self.leaf_count());
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a T>) {
        match self {
            Nested::Leaf(v) => out.push(v),
            Nested::List(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// Same shape, every leaf mapped through `f`.
    pub fn map<U>(&self, f: &mut impl FnMut(&T) -> U) -> Nested<U> {
        match self {
            Nested::Leaf(v) => Nested::Leaf(f(v)),
            Nested::List(children) => Nested::List(children.iter().map(|c| c.map(f)).collect()),
        }
    }

    /// Replaces every leaf by a whole subtree.
    pub fn substitute<U>(&self, f: &mut impl FnMut(&T) -> Nested<U>) -> Nested<U> {
        match self {
            Nested::Leaf(v) => f(v),
            Nested::List(children) => {
                Nested::List(children.iter().map(|c| c.substitute(f)).collect())
            }
        }
    }
}

impl<T> From<Vec<T>> for Nested<T> {
    fn from(values: Vec<T>) -> Self {
        Nested::List(values.into_iter().map(Nested::Leaf).collect())
    }
}

impl From<Value> for Nested<Value> {
    fn from(value: Value) -> Self {
        Nested::Leaf(value)
    }
}

impl From<f64> for Nested<Value> {
    fn from(value: f64) -> Self {
        Nested::Leaf(Value::Number(value))
    }
}

impl<T: fmt::Display> fmt::Display for Nested<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Nested::Leaf(v) => write!(f, "{}", v),
            Nested::List(children) => {
                write!(f, "[")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, "]")
            }
        }
    }
}
