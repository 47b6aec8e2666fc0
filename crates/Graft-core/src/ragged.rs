//! # Ragged Data
//!
//! A [`RaggedValue`] keeps payload leaves in one flat vector and describes
//! their nesting with a separate [`Structure`] template. Node logic works on
//! flat rows produced by [`broadcast`]; the template decides how results are
//! re-nested.
//!
//! Leaves of a structure are always numbered `0..len` in depth-first order, so
//! structural rewrites (flatten, simplify, graft) never touch the flat data.

use crate::error::EvalError;
use crate::value::{Nested, Value};
use serde::{Deserialize, Serialize};

/// Nesting template whose leaves index into a flat value vector.
pub type Structure = Nested<usize>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaggedValue {
    flat: Vec<Value>,
    structure: Structure,
}

impl Default for RaggedValue {
    fn default() -> Self {
        Self::empty()
    }
}

impl RaggedValue {
    /// Flattens `input` depth-first and records its shape.
    pub fn from_jagged(input: &Nested<Value>) -> Self {
        let mut next = 0;
        let structure = input.map(&mut |_| {
            next += 1;
            next - 1
        });
        let flat = input.leaves().into_iter().cloned().collect();
        Self { flat, structure }
    }

    /// A single bare leaf.
    pub fn scalar(value: impl Into<Value>) -> Self {
        Self {
            flat: vec![value.into()],
            structure: Nested::Leaf(0),
        }
    }

    /// One group holding every value.
    pub fn from_flat(values: Vec<Value>) -> Self {
        let structure = Nested::List((0..values.len()).map(Nested::Leaf).collect());
        Self {
            flat: values,
            structure,
        }
    }

    /// An empty group.
    pub fn empty() -> Self {
        Self {
            flat: Vec::new(),
            structure: Nested::List(Vec::new()),
        }
    }

    /// Pairs `flat` with an arbitrary `structure`.
    ///
    /// Every leaf index of `structure` must be in range and each flat value
    /// referenced exactly once. The result is renumbered depth-first.
    pub fn from_parts(flat: Vec<Value>, structure: Structure) -> Result<Self, EvalError> {
        let indices = structure.leaves();
        if indices.len() != flat.len() {
            return Err(EvalError::ShapeMismatch {
                expected: indices.len(),
                found: flat.len(),
            });
        }
        let mut seen = vec![false; flat.len()];
        for &&i in &indices {
            match seen.get_mut(i) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(EvalError::Compute(format!(
                        "structure leaf {} does not address a unique value",
                        i
                    )));
                }
            }
        }

        let mut next = 0;
        let renumbered = structure.map(&mut |_| {
            next += 1;
            next - 1
        });
        let mut slots: Vec<Option<Value>> = flat.into_iter().map(Some).collect();
        let ordered = indices
            .into_iter()
            .filter_map(|&i| slots[i].take())
            .collect();
        Ok(Self {
            flat: ordered,
            structure: renumbered,
        })
    }

    pub fn flat(&self) -> &[Value] {
        &self.flat
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    pub fn into_flat(self) -> Vec<Value> {
        self.flat
    }

    pub fn len(&self) -> usize {
        self.flat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flat.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.structure.depth()
    }

    /// The first leaf, if any.
    pub fn first(&self) -> Option<&Value> {
        self.flat.first()
    }

    /// Re-nests the flat values against the structure.
    pub fn to_jagged(&self) -> Nested<Value> {
        self.structure
            .map(&mut |i| self.flat.get(*i).cloned().unwrap_or_default())
    }

    /// Re-nests the data and normalizes it to at most two levels.
    ///
    /// Each leaf stays with the siblings of its nearest enclosing group; any
    /// outer levels above those groups are dropped.
    pub fn data_keep_last(&self) -> Nested<Value> {
        if self.structure.depth() <= 2 {
            return self.to_jagged();
        }
        let mut groups = Vec::new();
        collect_runs(&self.structure, &mut groups);
        Nested::List(
            groups
                .into_iter()
                .map(|run| {
                    Nested::List(
                        run.into_iter()
                            .map(|i| Nested::Leaf(self.flat.get(i).cloned().unwrap_or_default()))
                            .collect(),
                    )
                })
                .collect(),
        )
    }

    /// Collapses the innermost level: every group made only of leaves
    /// becomes a single leaf.
    pub fn structure_keep_last(&self) -> Structure {
        let mut groups = Vec::new();
        collapse(&self.structure, &mut groups)
    }

    /// Flat indices gathered under each leaf of [`Self::structure_keep_last`],
    /// in the same order.
    pub fn groups(&self) -> Vec<Vec<usize>> {
        let mut groups = Vec::new();
        collapse(&self.structure, &mut groups);
        groups
    }

    /// Drops one nesting level by splicing each group's children into its parent.
    pub fn flatten(&self) -> Self {
        let structure = match &self.structure {
            Nested::Leaf(i) => Nested::Leaf(*i),
            Nested::List(children) => Nested::List(
                children
                    .iter()
                    .flat_map(|child| match child {
                        Nested::Leaf(i) => vec![Nested::Leaf(*i)],
                        Nested::List(inner) => inner.clone(),
                    })
                    .collect(),
            ),
        };
        Self {
            flat: self.flat.clone(),
            structure,
        }
    }

    /// Removes wrapper groups whose only child is another group.
    pub fn simplify(&self) -> Self {
        Self {
            flat: self.flat.clone(),
            structure: simplify(&self.structure),
        }
    }

    /// Wraps every leaf in its own group.
    pub fn graft(&self) -> Self {
        Self {
            flat: self.flat.clone(),
            structure: self
                .structure
                .substitute(&mut |i| Nested::List(vec![Nested::Leaf(*i)])),
        }
    }

    /// Replaces leaf `k` of `structure` (depth-first) with a group holding `groups[k]`.
    pub fn expand(structure: &Structure, groups: Vec<Vec<Value>>) -> Result<Self, EvalError> {
        let expected = structure.leaf_count();
        if groups.len() != expected {
            return Err(EvalError::ShapeMismatch {
                expected,
                found: groups.len(),
            });
        }
        let mut flat = Vec::with_capacity(groups.iter().map(Vec::len).sum());
        let mut groups = groups.into_iter();
        let structure = structure.substitute(&mut |_| {
            let group = groups.next().unwrap_or_default();
            let start = flat.len();
            flat.extend(group);
            Nested::List((start..flat.len()).map(Nested::Leaf).collect())
        });
        Ok(Self { flat, structure })
    }
}

impl From<Nested<Value>> for RaggedValue {
    fn from(value: Nested<Value>) -> Self {
        Self::from_jagged(&value)
    }
}

fn collect_runs(node: &Structure, out: &mut Vec<Vec<usize>>) {
    let Nested::List(children) = node else {
        if let Nested::Leaf(i) = node {
            out.push(vec![*i]);
        }
        return;
    };
    let mut run = Vec::new();
    for child in children {
        match child {
            Nested::Leaf(i) => run.push(*i),
            Nested::List(_) => {
                if !run.is_empty() {
                    out.push(std::mem::take(&mut run));
                }
                collect_runs(child, out);
            }
        }
    }
    if !run.is_empty() {
        out.push(run);
    }
}

fn collapse(node: &Structure, groups: &mut Vec<Vec<usize>>) -> Structure {
    match node {
        Nested::Leaf(i) => {
            groups.push(vec![*i]);
            Nested::Leaf(groups.len() - 1)
        }
        Nested::List(children) if children.iter().all(Nested::is_leaf) => {
            groups.push(children.iter().flat_map(|c| c.leaves()).copied().collect());
            Nested::Leaf(groups.len() - 1)
        }
        Nested::List(children) => {
            Nested::List(children.iter().map(|c| collapse(c, groups)).collect())
        }
    }
}

fn simplify(node: &Structure) -> Structure {
    match node {
        Nested::List(children) if children.len() == 1 && !children[0].is_leaf() => {
            simplify(&children[0])
        }
        Nested::List(children) => Nested::List(children.iter().map(simplify).collect()),
        Nested::Leaf(i) => Nested::Leaf(*i),
    }
}

/// Length-matched view over several operands.
///
/// Operands of length 1 repeat; all others must share the broadcast length.
#[derive(Debug)]
pub struct Broadcast<'a> {
    inputs: Vec<&'a RaggedValue>,
    len: usize,
    structure: Structure,
}

/// Matches operand lengths for element-wise node logic.
///
/// The result structure is the deepest among operands whose length equals the
/// broadcast length; the first one wins on ties.
pub fn broadcast<'a>(inputs: &[&'a RaggedValue]) -> Result<Broadcast<'a>, EvalError> {
    if inputs.is_empty() {
        return Err(EvalError::Degenerate("nothing to broadcast".to_string()));
    }
    if inputs.iter().any(|v| v.is_empty()) {
        return Err(EvalError::Degenerate("empty operand".to_string()));
    }
    let len = inputs.iter().map(|v| v.len()).max().unwrap_or(0);
    if let Some(bad) = inputs.iter().find(|v| v.len() != len && v.len() != 1) {
        return Err(EvalError::ShapeMismatch {
            expected: len,
            found: bad.len(),
        });
    }

    let mut chosen: Option<&RaggedValue> = None;
    for input in inputs.iter().filter(|v| v.len() == len) {
        if chosen.is_none_or(|c| input.depth() > c.depth()) {
            chosen = Some(input);
        }
    }
    let structure = chosen.map_or_else(|| Nested::Leaf(0), |c| c.structure.clone());

    Ok(Broadcast {
        inputs: inputs.to_vec(),
        len,
        structure,
    })
}

impl<'a> Broadcast<'a> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    /// The `i`-th row: one value per operand.
    pub fn row(&self, i: usize) -> Vec<&'a Value> {
        self.inputs
            .iter()
            .map(|&v| {
                let flat = v.flat();
                if flat.len() == 1 { &flat[0] } else { &flat[i] }
            })
            .collect()
    }

    /// One output value per row, nested like the chosen structure.
    pub fn map<F>(&self, mut f: F) -> Result<RaggedValue, EvalError>
    where
        F: FnMut(&[&Value]) -> Result<Value, EvalError>,
    {
        let flat = (0..self.len)
            .map(|i| f(&self.row(i)))
            .collect::<Result<Vec<_>, _>>()?;
        RaggedValue::from_parts(flat, self.structure.clone())
    }

    /// A group of output values per row; every leaf of the chosen structure
    /// becomes one group.
    pub fn expand<F>(&self, mut f: F) -> Result<RaggedValue, EvalError>
    where
        F: FnMut(&[&Value]) -> Result<Vec<Value>, EvalError>,
    {
        let groups = (0..self.len)
            .map(|i| f(&self.row(i)))
            .collect::<Result<Vec<_>, _>>()?;
        RaggedValue::expand(&self.structure, groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Nested<Value> {
        Nested::Leaf(Value::Number(n))
    }

    fn list(items: Vec<Nested<Value>>) -> Nested<Value> {
        Nested::List(items)
    }

    #[test]
    fn test_from_jagged_indexes_leaves_depth_first() {
        let jagged = list(vec![list(vec![num(1.0), num(2.0)]), list(vec![num(3.0)])]);
        let ragged = RaggedValue::from_jagged(&jagged);

        assert_eq!(
            ragged.flat(),
            &[Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]
        );
        assert_eq!(
            ragged.structure(),
            &Nested::List(vec![Nested::flat([0usize, 1]), Nested::flat([2usize])])
        );
        assert_eq!(ragged.data_keep_last(), jagged);
    }

    #[test]
    fn test_data_keep_last_drops_outer_levels() {
        let jagged = list(vec![
            list(vec![list(vec![num(1.0), num(2.0)]), list(vec![num(3.0)])]),
            list(vec![list(vec![num(4.0)])]),
        ]);
        let ragged = RaggedValue::from_jagged(&jagged);
        assert_eq!(
            ragged.data_keep_last(),
            list(vec![
                list(vec![num(1.0), num(2.0)]),
                list(vec![num(3.0)]),
                list(vec![num(4.0)]),
            ])
        );

        // Shallow values come back unchanged.
        assert_eq!(RaggedValue::scalar(5.0).data_keep_last(), num(5.0));
    }

    #[test]
    fn test_structure_keep_last_reduces_one_level() {
        let jagged = list(vec![list(vec![num(1.0), num(2.0)]), list(vec![num(3.0)])]);
        let ragged = RaggedValue::from_jagged(&jagged);

        let collapsed = ragged.structure_keep_last();
        assert_eq!(collapsed, Nested::flat([0usize, 1]));
        assert_eq!(collapsed.depth(), ragged.depth() - 1);
        assert_eq!(ragged.groups(), vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_port_transforms_keep_flat_order() {
        let jagged = list(vec![list(vec![list(vec![num(1.0), num(2.0)])]), list(vec![num(3.0)])]);
        let ragged = RaggedValue::from_jagged(&jagged);

        let simplified = ragged.simplify();
        assert_eq!(simplified.flat(), ragged.flat());
        assert_eq!(
            simplified.structure(),
            &Nested::List(vec![Nested::flat([0usize, 1]), Nested::flat([2usize])])
        );

        let flattened = ragged.flatten();
        assert_eq!(flattened.flat(), ragged.flat());
        assert_eq!(
            flattened.structure(),
            &Nested::List(vec![Nested::flat([0usize, 1]), Nested::Leaf(2)])
        );
    }

    #[test]
    fn test_flatten_undoes_graft_for_single_leaf() {
        let single = RaggedValue::from_flat(vec![Value::Number(4.0)]);
        let grafted = single.graft();
        assert_eq!(grafted.depth(), 2);
        assert_eq!(grafted.flatten(), single);
    }

    #[test]
    fn test_from_parts_rejects_bad_structure() {
        let err = RaggedValue::from_parts(vec![Value::Int(1)], Nested::flat([0usize, 1]))
            .unwrap_err();
        assert!(matches!(err, EvalError::ShapeMismatch { expected: 2, found: 1 }));

        let err = RaggedValue::from_parts(
            vec![Value::Int(1), Value::Int(2)],
            Nested::flat([0usize, 0]),
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::Compute(_)));
    }

    #[test]
    fn test_from_parts_reorders_to_depth_first() {
        let ragged = RaggedValue::from_parts(
            vec![Value::Int(1), Value::Int(2)],
            Nested::flat([1usize, 0]),
        )
        .unwrap();
        assert_eq!(ragged.flat(), &[Value::Int(2), Value::Int(1)]);
        assert_eq!(ragged.structure(), &Nested::flat([0usize, 1]));
    }

    #[test]
    fn test_broadcast_repeats_length_one() {
        let a = RaggedValue::from_flat(vec![Value::Number(1.0), Value::Number(2.0)]);
        let b = RaggedValue::from_flat(vec![Value::Number(10.0)]);
        let sum = broadcast(&[&a, &b])
            .unwrap()
            .map(|row| Ok(Value::Number(row[0].as_f64().unwrap() + row[1].as_f64().unwrap())))
            .unwrap();
        assert_eq!(sum.flat(), &[Value::Number(11.0), Value::Number(12.0)]);
        assert_eq!(sum.structure(), a.structure());
    }

    #[test]
    fn test_broadcast_takes_deepest_matching_structure() {
        let shallow = RaggedValue::from_flat(vec![Value::Int(1), Value::Int(2)]);
        let deep = RaggedValue::from_jagged(&list(vec![
            list(vec![Nested::leaf(Value::Int(1))]),
            list(vec![Nested::leaf(Value::Int(2))]),
        ]));
        let one = RaggedValue::scalar(Value::Int(0));

        let b = broadcast(&[&shallow, &one, &deep]).unwrap();
        assert_eq!(b.len(), 2);
        assert_eq!(b.structure(), deep.structure());
    }

    #[test]
    fn test_broadcast_errors() {
        let two = RaggedValue::from_flat(vec![Value::Int(1), Value::Int(2)]);
        let three = RaggedValue::from_flat(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let none = RaggedValue::empty();

        assert!(matches!(
            broadcast(&[&two, &three]).unwrap_err(),
            EvalError::ShapeMismatch { expected: 3, found: 2 }
        ));
        assert!(matches!(
            broadcast(&[&two, &none]).unwrap_err(),
            EvalError::Degenerate(_)
        ));
    }

    #[test]
    fn test_expand_keeps_caller_nesting() {
        let starts = RaggedValue::from_flat(vec![Value::Int(0), Value::Int(10)]);
        let out = broadcast(&[&starts])
            .unwrap()
            .expand(|row| {
                let s = row[0].as_f64().unwrap();
                Ok(vec![Value::Number(s), Value::Number(s + 1.0)])
            })
            .unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out.depth(), 2);
        assert_eq!(out.groups(), vec![vec![0, 1], vec![2, 3]]);
    }
}
