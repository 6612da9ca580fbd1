//! Input transaction trees

use crate::DepKind;
use std::collections::BTreeSet;

/// One node of a nested transaction, as declared by the transaction source.
///
/// A top-level transaction is a `TxNode` whose children (if any) carry a
/// STRONG or WEAK tag. Costs are execution-time estimates in abstract time
/// units; keys are opaque strings.
#[derive(Clone, Debug, Default)]
pub struct TxNode {
    /// Execution cost of this unit alone
    pub cost: u64,
    /// Keys read by this unit
    pub reads: BTreeSet<String>,
    /// Keys written by this unit
    pub writes: BTreeSet<String>,
    /// Nested sub-transactions with their dependency tags
    pub children: Vec<(TxNode, DepKind)>,
}

impl TxNode {
    /// Create a leaf node with the given cost
    pub fn new(cost: u64) -> Self {
        Self {
            cost,
            ..Default::default()
        }
    }

    /// Record a key read
    pub fn read(mut self, key: impl Into<String>) -> Self {
        self.reads.insert(key.into());
        self
    }

    /// Record a key write
    pub fn write(mut self, key: impl Into<String>) -> Self {
        self.writes.insert(key.into());
        self
    }

    /// Attach a child with the given dependency tag
    pub fn child(mut self, node: TxNode, dep: DepKind) -> Self {
        self.children.push((node, dep));
        self
    }

    /// Whether this node has any nested children
    pub fn is_nested(&self) -> bool {
        !self.children.is_empty()
    }

    /// Total number of nodes in the tree
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|(c, _)| c.node_count())
            .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_node() {
        let tx = TxNode::new(10).read("a").write("b");
        assert_eq!(tx.cost, 10);
        assert!(tx.reads.contains("a"));
        assert!(tx.writes.contains("b"));
        assert!(!tx.is_nested());
        assert_eq!(tx.node_count(), 1);
    }

    #[test]
    fn test_nested_node() {
        let tx = TxNode::new(5)
            .child(TxNode::new(3).write("x"), DepKind::Strong)
            .child(TxNode::new(2).read("x"), DepKind::Weak);
        assert!(tx.is_nested());
        assert_eq!(tx.node_count(), 3);
    }
}
