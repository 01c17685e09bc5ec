//! Execution step ordering
//!
//! Children run before their parent, siblings left to right. The resulting
//! "Step 1, Step 2, ..." order is what annotations and narration refer to.

use super::{NodeId, PlanNode, PlanTree};

/// Linearizes plan trees into bottom-up execution order
pub struct StepSequencer;

impl StepSequencer {
    /// Post-order sequence of the tree; the root is always last
    pub fn sequence(tree: &PlanTree) -> StepSequence {
        // Pre-order visiting the last child first, reversed, is post-order
        // visiting the first child first.
        let mut order = Vec::with_capacity(tree.len());
        let mut stack = vec![tree.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(tree.node(id).children.iter().copied());
        }
        order.reverse();

        let mut positions = vec![usize::MAX; tree.len()];
        for (pos, id) in order.iter().enumerate() {
            positions[id.0] = pos;
        }

        StepSequence { order, positions }
    }
}

/// Ordered view of a tree's nodes, by id
#[derive(Debug, Clone, PartialEq)]
pub struct StepSequence {
    order: Vec<NodeId>,
    /// Arena index → step position
    positions: Vec<usize>,
}

impl StepSequence {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Node at step position `pos` (0-based)
    pub fn get(&self, pos: usize) -> Option<NodeId> {
        self.order.get(pos).copied()
    }

    /// Step position (0-based) of a node
    pub fn position_of(&self, id: NodeId) -> Option<usize> {
        self.positions.get(id.0).copied().filter(|&p| p != usize::MAX)
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.order
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = NodeId> + ExactSizeIterator + '_ {
        self.order.iter().copied()
    }

    /// Resolve the sequence against its tree
    pub fn nodes<'a>(&'a self, tree: &'a PlanTree) -> impl Iterator<Item = &'a PlanNode> + 'a {
        self.order.iter().map(move |&id| tree.node(id))
    }
}
