//! Tree-shaped parameter data.
//!
//! The proxy never inspects these values. It only carries them from the host
//! into the wrapped evaluation and back.

use std::collections::BTreeMap;
use std::fmt;

use ordered_float::OrderedFloat;

/// Path of a branch inside a tree, displayed as `{0;2}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TreePath(pub Vec<u32>);

impl TreePath {
    pub fn new(indices: &[u32]) -> Self {
        Self(indices.to_vec())
    }

    pub fn root() -> Self {
        Self(vec![0])
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "{{{}}}", parts.join(";"))
    }
}

/// A single value held in a branch.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Goo {
    Number(OrderedFloat<f64>),
    Integer(i64),
    Text(String),
    Boolean(bool),
}

impl Goo {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Goo::Number(n) => Some(n.into_inner()),
            Goo::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl From<f64> for Goo {
    fn from(value: f64) -> Self {
        Goo::Number(OrderedFloat(value))
    }
}

impl From<i64> for Goo {
    fn from(value: i64) -> Self {
        Goo::Integer(value)
    }
}

impl From<bool> for Goo {
    fn from(value: bool) -> Self {
        Goo::Boolean(value)
    }
}

impl From<String> for Goo {
    fn from(value: String) -> Self {
        Goo::Text(value)
    }
}

impl From<&str> for Goo {
    fn from(value: &str) -> Self {
        Goo::Text(value.to_string())
    }
}

/// Hierarchical, path-indexed collection of values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DataTree {
    branches: BTreeMap<TreePath, Vec<Goo>>,
}

impl DataTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tree with one item on the `{0}` branch.
    pub fn from_item(item: impl Into<Goo>) -> Self {
        Self::from_list(std::iter::once(item.into()))
    }

    /// A tree with every item on the `{0}` branch.
    pub fn from_list<I, G>(items: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<Goo>,
    {
        let mut tree = Self::new();
        let branch = tree.branches.entry(TreePath::root()).or_default();
        branch.extend(items.into_iter().map(Into::into));
        tree
    }

    pub fn append(&mut self, path: TreePath, item: impl Into<Goo>) {
        self.branches.entry(path).or_default().push(item.into());
    }

    pub fn branch(&self, path: &TreePath) -> Option<&[Goo]> {
        self.branches.get(path).map(|b| b.as_slice())
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    pub fn data_count(&self) -> usize {
        self.branches.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.data_count() == 0
    }

    /// All items in path order.
    pub fn items(&self) -> impl Iterator<Item = &Goo> {
        self.branches.values().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_are_visited_in_path_order() {
        let mut tree = DataTree::new();
        tree.append(TreePath::new(&[1]), 3.0);
        tree.append(TreePath::new(&[0, 2]), "b");
        tree.append(TreePath::new(&[0, 1]), "a");

        let items: Vec<&Goo> = tree.items().collect();
        assert_eq!(items[0], &Goo::from("a"));
        assert_eq!(items[1], &Goo::from("b"));
        assert_eq!(items[2].as_number(), Some(3.0));
        assert_eq!(tree.branch_count(), 3);
        assert_eq!(tree.data_count(), 3);
    }

    #[test]
    fn test_path_display() {
        assert_eq!(TreePath::new(&[0, 2]).to_string(), "{0;2}");
        assert_eq!(TreePath::root().to_string(), "{0}");
    }

    #[test]
    fn test_empty_tree() {
        let tree = DataTree::new();
        assert!(tree.is_empty());
        assert!(tree.branch(&TreePath::root()).is_none());
        assert!(!DataTree::from_item(true).is_empty());
    }
}
