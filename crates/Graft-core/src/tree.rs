//! # Tree
//!
//! Generic ordered n-ary tree backed by a `SlotMap` arena.
//!
//! Items are created detached and attached with [`Tree::insert_child`] or
//! [`Tree::append_child`]. Detaching an item with [`Tree::remove_child`] keeps it
//! alive in the arena; [`Tree::take`] destroys an item and its whole subtree.

use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// Unique identifier for an item in a [`Tree`].
    pub struct TreeItemId;
}

/// A single tree item.
#[derive(Clone, Debug)]
pub struct TreeItem<T> {
    pub data: T,
    parent: Option<TreeItemId>,
    children: Vec<TreeItemId>,
}

#[derive(Clone, Debug)]
pub struct Tree<T> {
    items: SlotMap<TreeItemId, TreeItem<T>>,
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self {
            items: SlotMap::with_key(),
        }
    }
}

impl<T> Tree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a detached item.
    pub fn insert(&mut self, data: T) -> TreeItemId {
        self.items.insert(TreeItem {
            data,
            parent: None,
            children: Vec::new(),
        })
    }

    pub fn get(&self, id: TreeItemId) -> Option<&T> {
        self.items.get(id).map(|item| &item.data)
    }

    pub fn get_mut(&mut self, id: TreeItemId) -> Option<&mut T> {
        self.items.get_mut(id).map(|item| &mut item.data)
    }

    pub fn contains(&self, id: TreeItemId) -> bool {
        self.items.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Attaches `child` under `parent` at `row`, clamped into `[0, child_count]`.
    ///
    /// The child must be detached. Returns false if either id is unknown or
    /// the insertion would make an item its own ancestor.
    pub fn insert_child(&mut self, parent: TreeItemId, row: usize, child: TreeItemId) -> bool {
        if parent == child || !self.items.contains_key(parent) || !self.items.contains_key(child) {
            return false;
        }
        debug_assert!(
            self.items[child].parent.is_none(),
            "child must be detached before insertion"
        );
        if self.is_ancestor(child, parent) {
            return false;
        }
        let siblings = &mut self.items[parent].children;
        let row = row.min(siblings.len());
        siblings.insert(row, child);
        self.items[child].parent = Some(parent);
        true
    }

    pub fn append_child(&mut self, parent: TreeItemId, child: TreeItemId) -> bool {
        let row = self.child_count(parent);
        self.insert_child(parent, row, child)
    }

    /// Detaches the child at `row`. The detached item stays in the arena.
    pub fn remove_child(&mut self, parent: TreeItemId, row: usize) -> bool {
        let Some(item) = self.items.get_mut(parent) else {
            return false;
        };
        if row >= item.children.len() {
            return false;
        }
        let child = item.children.remove(row);
        if let Some(child) = self.items.get_mut(child) {
            child.parent = None;
        }
        true
    }

    /// Detaches `id` from its parent, if any.
    pub fn detach(&mut self, id: TreeItemId) -> bool {
        match (self.parent(id), self.item_row(id)) {
            (Some(parent), Some(row)) => self.remove_child(parent, row),
            _ => false,
        }
    }

    /// Destroys `id` and its whole subtree, returning the payloads in pre-order.
    pub fn take(&mut self, id: TreeItemId) -> Vec<T> {
        if !self.items.contains_key(id) {
            return Vec::new();
        }
        self.detach(id);
        let doomed: Vec<TreeItemId> = std::iter::once(id).chain(self.descendants(id)).collect();
        doomed
            .into_iter()
            .filter_map(|item| self.items.remove(item).map(|item| item.data))
            .collect()
    }

    pub fn child(&self, parent: TreeItemId, row: usize) -> Option<TreeItemId> {
        self.items.get(parent)?.children.get(row).copied()
    }

    pub fn child_count(&self, parent: TreeItemId) -> usize {
        self.items.get(parent).map_or(0, |item| item.children.len())
    }

    pub fn children(&self, parent: TreeItemId) -> &[TreeItemId] {
        self.items
            .get(parent)
            .map_or(&[][..], |item| item.children.as_slice())
    }

    /// Index of `id` within its parent's children.
    pub fn item_row(&self, id: TreeItemId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.items[parent].children.iter().position(|c| *c == id)
    }

    pub fn parent(&self, id: TreeItemId) -> Option<TreeItemId> {
        self.items.get(id)?.parent
    }

    /// Walks from the parent of `id` up to the root.
    pub fn ancestors(&self, id: TreeItemId) -> impl Iterator<Item = TreeItemId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    pub fn is_ancestor(&self, ancestor: TreeItemId, id: TreeItemId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// All items below `id` in pre-order, excluding `id` itself.
    pub fn descendants(&self, id: TreeItemId) -> Vec<TreeItemId> {
        let mut out = Vec::new();
        let mut stack: Vec<TreeItemId> = self.children(id).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }
}
