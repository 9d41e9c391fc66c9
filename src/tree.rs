//! Addressing of the implicit complete binary tree behind a q-digest.
//!
//! Nodes are numbered with the heap convention: the root is `1` and the
//! children of `n` are `2n` and `2n + 1`. With a tree of height
//! `log_capacity`, the leaf of value `v` is `2^log_capacity + v`.

/// Identifier of a node in the implicit tree.
///
/// Wider than the values so that a tree of height 64 (covering the whole
/// `u64` domain) can still number its leaves.
pub(crate) type NodeId = u128;

/// The root node.
pub(crate) const ROOT: NodeId = 1;

/// Shape of the implicit tree, determined by its height.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Tree {
    log_capacity: u32,
}

impl Tree {
    /// Largest supported height, enough to address every `u64`.
    pub(crate) const MAX_LOG_CAPACITY: u32 = u64::BITS;

    pub(crate) fn new(log_capacity: u32) -> Self {
        debug_assert!(log_capacity <= Self::MAX_LOG_CAPACITY);
        Self { log_capacity }
    }

    /// Returns the lowest tree able to hold `value`.
    pub(crate) fn fitting(value: u64) -> Self {
        Self::new(u64::BITS - value.leading_zeros())
    }

    #[inline]
    pub(crate) fn log_capacity(self) -> u32 {
        self.log_capacity
    }

    /// Number of leaves, i.e. the first leaf id.
    #[inline]
    fn capacity(self) -> NodeId {
        ROOT << self.log_capacity
    }

    #[inline]
    pub(crate) fn contains(self, value: u64) -> bool {
        NodeId::from(value) < self.capacity()
    }

    /// Returns `true` if `id` addresses a node of this tree.
    #[inline]
    pub(crate) fn is_node(self, id: NodeId) -> bool {
        id >= ROOT && id < self.capacity() << 1
    }

    #[inline]
    pub(crate) fn value_to_leaf(self, value: u64) -> NodeId {
        debug_assert!(self.contains(value));
        self.capacity() + NodeId::from(value)
    }

    #[inline]
    pub(crate) fn leaf_to_value(self, id: NodeId) -> u64 {
        debug_assert!(self.is_leaf(id));
        (id - self.capacity()) as u64
    }

    #[inline]
    pub(crate) fn is_root(self, id: NodeId) -> bool {
        id == ROOT
    }

    #[inline]
    pub(crate) fn is_leaf(self, id: NodeId) -> bool {
        id >= self.capacity()
    }

    #[inline]
    pub(crate) fn sibling(self, id: NodeId) -> NodeId {
        if id % 2 == 0 { id + 1 } else { id - 1 }
    }

    #[inline]
    pub(crate) fn parent(self, id: NodeId) -> NodeId {
        id / 2
    }

    #[inline]
    pub(crate) fn left_child(self, id: NodeId) -> NodeId {
        2 * id
    }

    #[inline]
    pub(crate) fn right_child(self, id: NodeId) -> NodeId {
        2 * id + 1
    }

    /// Smallest value covered by the subtree rooted at `id`.
    pub(crate) fn range_left(self, mut id: NodeId) -> u64 {
        while !self.is_leaf(id) {
            id = self.left_child(id);
        }
        self.leaf_to_value(id)
    }

    /// Largest value covered by the subtree rooted at `id`.
    pub(crate) fn range_right(self, mut id: NodeId) -> u64 {
        while !self.is_leaf(id) {
            id = self.right_child(id);
        }
        self.leaf_to_value(id)
    }
}
