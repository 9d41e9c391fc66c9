#![warn(missing_docs)]

//! A Rust library for estimating quantiles of a stream of non-negative
//! integers, using the [q-digest][Shrivastava04] data structure.
//!
//! A q-digest keeps counts on the nodes of an implicit binary tree laid over
//! the value domain. Sparse nodes are folded into their parents, so memory
//! stays around `3 * compression` nodes while the rank error of any query is
//! bounded by `log2(max) / compression` of the stream length. Two q-digests
//! can be merged, making the data structure well suited for map-reduce
//! settings.
//!
//! [Shrivastava04]: https://www.cs.virginia.edu/~son/cs851/papers/ucsb.sensys04.pdf
//!
//! Compared to the paper, the compression is split in two:
//!
//! - each insertion compresses along the path from the new leaf to the root;
//! - the whole tree is compressed when it grows past its theoretical size, and
//!   after the operations that can break the invariant sideways (growing the
//!   tree, merging).
//!
//! # Examples
//!
//! ```
//! use qdigest::QDigest;
//!
//! let mut digest = QDigest::new(100.0);
//!
//! // Add some elements.
//! digest.insert(1);
//! digest.insert(2);
//! digest.insert(3);
//!
//! // Estimate the median of the distribution.
//! assert_eq!(digest.quantile(0.5), Some(3));
//! ```

use std::collections::{BTreeMap, VecDeque};

use tracing::debug;

mod error;
mod tree;

pub use error::Error;
use tree::{NodeId, Tree};

/// Values covered by a stored node, along with the node's count.
///
/// Returned by [`QDigest::ascending_ranges`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeRange {
    /// Smallest value covered by the node.
    pub left: u64,
    /// Largest value covered by the node.
    pub right: u64,
    /// Number of values counted on the node.
    pub count: u64,
}

impl NodeRange {
    /// Returns `right - left`.
    #[inline]
    pub fn width(&self) -> u64 {
        self.right - self.left
    }
}

/// Q-digest data structure for approximating the quantiles of a stream of
/// non-negative integers.
///
/// The `compression` factor trades memory for accuracy: the digest keeps at
/// most about `3 * compression` nodes, and the rank of an estimated quantile
/// is off by at most `log_capacity / compression` of the total count.
///
/// # Examples
///
/// ```
/// use qdigest::QDigest;
///
/// let mut digest = QDigest::new(10.0);
/// digest.extend(0..100);
///
/// assert_eq!(digest.len(), 100);
/// assert_eq!(digest.log_capacity(), 7);
/// assert!(digest.node_count() <= 30);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct QDigest {
    compression: f64,
    tree: Tree,
    size: u64,
    nodes: BTreeMap<NodeId, u64>,
}

impl QDigest {
    /// Creates an empty `QDigest`.
    ///
    /// # Panics
    ///
    /// Panics if `compression` is not finite or not positive. See
    /// [`QDigest::try_new`] for a non-panicking version.
    ///
    /// # Examples
    ///
    /// ```
    /// use qdigest::QDigest;
    /// let digest = QDigest::new(100.0);
    /// ```
    #[must_use]
    pub fn new(compression: f64) -> Self {
        match Self::try_new(compression) {
            Ok(digest) => digest,
            Err(err) => panic!("{err}"),
        }
    }

    /// Creates an empty `QDigest`, failing if `compression` is not finite or
    /// not positive.
    ///
    /// # Examples
    ///
    /// ```
    /// use qdigest::{Error, QDigest};
    ///
    /// assert!(QDigest::try_new(100.0).is_ok());
    /// assert_eq!(QDigest::try_new(0.0), Err(Error::InvalidCompression(0.0)));
    /// ```
    pub fn try_new(compression: f64) -> Result<Self, Error> {
        if !(compression.is_finite() && compression > 0.0) {
            return Err(Error::InvalidCompression(compression));
        }
        Ok(Self {
            compression,
            tree: Tree::new(0),
            size: 0,
            nodes: BTreeMap::new(),
        })
    }

    /// Returns the compression factor.
    #[inline]
    pub fn compression(&self) -> f64 {
        self.compression
    }

    /// Returns the number of values added to the q-digest.
    ///
    /// # Examples
    ///
    /// ```
    /// use qdigest::QDigest;
    ///
    /// let mut digest = QDigest::new(100.0);
    /// assert_eq!(digest.len(), 0);
    /// digest.insert(1);
    /// assert_eq!(digest.len(), 1);
    /// ```
    #[inline]
    pub fn len(&self) -> u64 {
        self.size
    }

    /// Returns `true` if the q-digest contains no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the height of the tree: values in `0..2^log_capacity` can be
    /// stored without growing it.
    #[inline]
    pub fn log_capacity(&self) -> u32 {
        self.tree.log_capacity()
    }

    /// Returns the number of nodes holding a count.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Clears the q-digest, removing all values.
    ///
    /// The compression factor is kept.
    ///
    /// # Examples
    ///
    /// ```
    /// use qdigest::QDigest;
    ///
    /// let mut digest = QDigest::new(100.0);
    /// digest.insert(1_000);
    /// digest.clear();
    /// assert!(digest.is_empty());
    /// assert_eq!(digest.log_capacity(), 0);
    /// ```
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.tree = Tree::new(0);
        self.size = 0;
    }

    /// Adds a value to the q-digest.
    ///
    /// # Examples
    ///
    /// ```
    /// use qdigest::QDigest;
    ///
    /// let mut digest = QDigest::new(100.0);
    ///
    /// digest.insert(1);
    /// digest.insert(2);
    /// assert_eq!(digest.len(), 2);
    /// ```
    #[inline]
    pub fn insert(&mut self, value: u64) {
        self.insert_many(value, 1);
    }

    /// Adds multiple occurrences of a value to the q-digest.
    ///
    /// # Panics
    ///
    /// Panics if the total number of observed values would overflow `u64`.
    ///
    /// # Examples
    ///
    /// ```
    /// use qdigest::QDigest;
    ///
    /// let mut digest = QDigest::new(100.0);
    ///
    /// digest.insert_many(1, 1);
    /// digest.insert_many(2, 2);
    /// assert_eq!(digest.len(), 3);
    /// ```
    pub fn insert_many(&mut self, value: u64, count: u64) {
        if count == 0 {
            return;
        }
        let Some(size) = self.size.checked_add(count) else {
            panic!("observed count overflows u64");
        };
        if !self.tree.contains(value) {
            self.rebuild(Tree::fitting(value));
            self.compress_fully();
        }

        let leaf = self.tree.value_to_leaf(value);
        // No node holds more than `size`, so the leaf cannot overflow.
        *self.nodes.entry(leaf).or_insert(0) += count;
        self.size = size;

        self.compress_upward(leaf);
        if self.nodes.len() as f64 > 3. * self.compression {
            self.compress_fully();
        }
    }

    /// Returns the union of `a` and `b` as a new `QDigest`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CompressionMismatch`] if the digests do not share the
    /// same compression factor.
    ///
    /// # Panics
    ///
    /// Panics if the combined observed count would overflow `u64`.
    ///
    /// # Examples
    ///
    /// ```
    /// use qdigest::QDigest;
    ///
    /// let mut a = QDigest::new(5.0);
    /// a.extend([0, 1, 2]);
    /// let mut b = QDigest::new(5.0);
    /// b.extend([100, 101, 102]);
    ///
    /// let c = QDigest::union_of(&a, &b)?;
    ///
    /// assert_eq!(c.len(), 6);
    /// assert_eq!(c.quantile(0.0), Some(1));
    /// assert_eq!(c.quantile(1.0), Some(127));
    /// # Ok::<(), qdigest::Error>(())
    /// ```
    pub fn union_of(a: &QDigest, b: &QDigest) -> Result<QDigest, Error> {
        let mut union = a.clone();
        union.merge(b)?;
        Ok(union)
    }

    /// Merges `other` into `self`.
    ///
    /// On error, `self` is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CompressionMismatch`] if the digests do not share the
    /// same compression factor.
    ///
    /// # Panics
    ///
    /// Panics if the combined observed count would overflow `u64`.
    ///
    /// # Examples
    ///
    /// ```
    /// use qdigest::{Error, QDigest};
    ///
    /// let mut a = QDigest::new(100.0);
    /// a.extend([1, 2, 3]);
    /// let b = QDigest::new(50.0);
    ///
    /// assert_eq!(
    ///     a.merge(&b),
    ///     Err(Error::CompressionMismatch { left: 100.0, right: 50.0 }),
    /// );
    /// ```
    pub fn merge(&mut self, other: &QDigest) -> Result<(), Error> {
        if self.compression != other.compression {
            return Err(Error::CompressionMismatch {
                left: self.compression,
                right: other.compression,
            });
        }
        let Some(size) = self.size.checked_add(other.size) else {
            panic!("observed count overflows u64");
        };

        let tree = Tree::new(self.log_capacity().max(other.log_capacity()));
        debug!(
            left = self.size,
            right = other.size,
            log_capacity = tree.log_capacity(),
            "merging q-digests"
        );

        self.size = size;
        self.rebuild(tree);
        for (id, count) in readdress(other.nodes.clone(), other.tree, tree) {
            *self.nodes.entry(id).or_insert(0) += count;
        }
        self.compress_fully();
        Ok(())
    }

    /// Returns the ranges covered by the stored nodes, sorted by their right
    /// bound, then by their width.
    ///
    /// The counts of the ranges sum up to [`len`](QDigest::len).
    ///
    /// # Examples
    ///
    /// ```
    /// use qdigest::{NodeRange, QDigest};
    ///
    /// let mut digest = QDigest::new(100.0);
    /// digest.extend([3, 1, 1]);
    ///
    /// assert_eq!(
    ///     digest.ascending_ranges(),
    ///     [
    ///         NodeRange { left: 1, right: 1, count: 2 },
    ///         NodeRange { left: 3, right: 3, count: 1 },
    ///     ],
    /// );
    /// ```
    pub fn ascending_ranges(&self) -> Vec<NodeRange> {
        let mut ranges: Vec<_> = self
            .nodes
            .iter()
            .map(|(&id, &count)| NodeRange {
                left: self.tree.range_left(id),
                right: self.tree.range_right(id),
                count,
            })
            .collect();
        ranges.sort_by_key(|range| (range.right, range.width()));
        ranges
    }

    /// Returns the estimated quantile of the q-digest, or `None` if it is
    /// empty.
    ///
    /// The result is the right bound of the first range preceded by more than
    /// `level * len` values. If you need several quantiles, consider using
    /// [`quantiles`](QDigest::quantiles) instead.
    ///
    /// # Examples
    ///
    /// ```
    /// use qdigest::QDigest;
    ///
    /// let mut digest = QDigest::new(100.0);
    /// assert_eq!(digest.quantile(0.5), None);
    ///
    /// digest.extend([1, 2, 3, 4, 5]);
    /// assert_eq!(digest.quantile(0.0), Some(2));
    /// assert_eq!(digest.quantile(0.5), Some(4));
    /// assert_eq!(digest.quantile(1.0), Some(5));
    /// ```
    pub fn quantile(&self, level: f64) -> Option<u64> {
        self.quantiles().get(level)
    }

    /// Creates a quantile estimator from a snapshot of the q-digest.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::thread;
    ///
    /// use qdigest::QDigest;
    ///
    /// let mut digest = QDigest::new(100.0);
    /// digest.extend([1, 2, 3, 4, 5]);
    /// let quantiles = digest.quantiles();
    ///
    /// thread::scope(|s| {
    ///     s.spawn(|| {
    ///         assert_eq!(quantiles.get(0.5), Some(4));
    ///     });
    ///     s.spawn(|| {
    ///         assert_eq!(quantiles.get(1.0), Some(5));
    ///     });
    /// });
    /// ```
    pub fn quantiles(&self) -> Quantiles {
        Quantiles {
            ranges: self.ascending_ranges(),
            len: self.size,
        }
    }

    #[inline]
    fn threshold(&self) -> u64 {
        (self.size as f64 / self.compression).floor() as u64
    }

    #[inline]
    fn count(&self, id: NodeId) -> u64 {
        self.nodes.get(&id).copied().unwrap_or(0)
    }

    /// Moves the counts of `node` and its sibling to their parent, which ends
    /// up holding `total`.
    fn fold(&mut self, node: NodeId, total: u64) {
        debug_assert!(self.tree.is_node(node) && !self.tree.is_root(node));
        self.nodes.insert(self.tree.parent(node), total);
        self.nodes.remove(&node);
        self.nodes.remove(&self.tree.sibling(node));
    }

    /// Restores property 2 along the path from `node` to the root. The
    /// property may break in sibling subtrees; `compress_fully` fixes those.
    fn compress_upward(&mut self, mut node: NodeId) {
        let threshold = self.threshold();
        let mut at_node = self.count(node);
        while !self.tree.is_root(node) {
            if at_node > threshold {
                break;
            }
            let at_sibling = self.count(self.tree.sibling(node));
            if at_node + at_sibling > threshold {
                break;
            }
            let at_parent = self.count(self.tree.parent(node));
            if at_node + at_sibling + at_parent > threshold {
                break;
            }

            at_node += at_sibling + at_parent;
            self.fold(node, at_node);
            node = self.tree.parent(node);
        }
    }

    /// Restores property 2 on the whole tree.
    ///
    /// A fold into an empty parent creates a node whose own triple was never
    /// checked, so that parent is queued as well. This keeps the invariant
    /// exact at some cost in precision: a lone count can keep climbing, and
    /// its range widens with every level (a single 102 among small values can
    /// end up on the node covering 64..=127).
    fn compress_fully(&mut self) {
        let threshold = self.threshold();
        let before = self.nodes.len();

        let mut queue: VecDeque<NodeId> = self.nodes.keys().copied().collect();
        while let Some(node) = queue.pop_front() {
            if self.tree.is_root(node) {
                continue;
            }
            let sibling = self.tree.sibling(node);
            let at_node = self.count(node);
            let at_sibling = self.count(sibling);
            if at_node == 0 && at_sibling == 0 {
                continue;
            }
            let parent = self.tree.parent(node);
            let at_parent = self.count(parent);
            let total = at_node + at_sibling + at_parent;
            if total > threshold {
                continue;
            }

            self.fold(node, total);
            // A parent that was empty has never had its own triple checked.
            if at_parent == 0 && !self.tree.is_root(parent) {
                queue.push_back(parent);
            }
            // Both subtrees lost their parent's count.
            if !self.tree.is_leaf(node) {
                queue.push_back(self.tree.left_child(node));
                queue.push_back(self.tree.left_child(sibling));
            }
        }

        debug!(
            before,
            after = self.nodes.len(),
            threshold,
            "compressed q-digest"
        );
    }

    /// Grows the tree to `tree`, the current tree becoming its leftmost
    /// subtree. Does not compress.
    fn rebuild(&mut self, tree: Tree) {
        debug_assert!(tree.log_capacity() >= self.tree.log_capacity());
        if tree == self.tree {
            return;
        }
        debug!(
            from = self.tree.log_capacity(),
            to = tree.log_capacity(),
            nodes = self.nodes.len(),
            "rebuilding q-digest"
        );
        self.nodes = readdress(std::mem::take(&mut self.nodes), self.tree, tree);
        self.tree = tree;
    }
}

/// Maps the nodes of `from` to the same value ranges in the taller `to`.
///
/// A node at depth `d` moves right by `2^d * (2^(to - from) - 1)`. Ids are
/// visited in ascending order, so the depth scale only ever grows.
fn readdress(nodes: BTreeMap<NodeId, u64>, from: Tree, to: Tree) -> BTreeMap<NodeId, u64> {
    let scale_r = (tree::ROOT << (to.log_capacity() - from.log_capacity())) - 1;
    let mut scale_l: NodeId = 1;
    nodes
        .into_iter()
        .map(|(id, count)| {
            while scale_l <= id / 2 {
                scale_l <<= 1;
            }
            (id + scale_l * scale_r, count)
        })
        .collect()
}

impl Extend<u64> for QDigest {
    fn extend<I: IntoIterator<Item = u64>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

impl<'a> Extend<&'a u64> for QDigest {
    fn extend<I: IntoIterator<Item = &'a u64>>(&mut self, iter: I) {
        self.extend(iter.into_iter().copied());
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for QDigest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let nodes: Vec<(NodeId, u64)> = self.nodes.iter().map(|(&id, &count)| (id, count)).collect();
        serde::Serialize::serialize(
            &(self.compression, self.log_capacity(), self.size, nodes),
            serializer,
        )
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for QDigest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error as _;

        let (compression, log_capacity, size, nodes): (f64, u32, u64, Vec<(NodeId, u64)>) =
            serde::Deserialize::deserialize(deserializer)?;

        let mut digest = QDigest::try_new(compression).map_err(D::Error::custom)?;
        if log_capacity > Tree::MAX_LOG_CAPACITY {
            return Err(D::Error::custom(format!(
                "log capacity {log_capacity} exceeds {}",
                Tree::MAX_LOG_CAPACITY
            )));
        }
        digest.tree = Tree::new(log_capacity);

        let mut total: u64 = 0;
        for (id, count) in nodes {
            if !digest.tree.is_node(id) {
                return Err(D::Error::custom(format!(
                    "node {id} is outside a tree of height {log_capacity}"
                )));
            }
            if count == 0 {
                return Err(D::Error::custom(format!("node {id} has a zero count")));
            }
            total = total
                .checked_add(count)
                .ok_or_else(|| D::Error::custom("node counts overflow"))?;
            digest.nodes.insert(id, count);
        }
        if total != size {
            return Err(D::Error::custom(format!(
                "node counts sum up to {total}, expected {size}"
            )));
        }
        digest.size = size;
        Ok(digest)
    }
}

/// Estimates quantiles of a q-digest.
///
/// This `struct` is created by the [`quantiles`] method on [`QDigest`]. It
/// holds the sorted ranges of the digest, so that successive queries do not
/// sort them again. See its documentation for more.
///
/// [`quantiles`]: QDigest::quantiles
#[derive(Clone, Debug)]
pub struct Quantiles {
    ranges: Vec<NodeRange>,
    len: u64,
}

impl Quantiles {
    /// Returns the estimated quantile, or `None` if the digest was empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use qdigest::QDigest;
    ///
    /// let mut digest = QDigest::new(100.0);
    /// digest.extend([1, 2, 3, 4, 5]);
    /// let quantiles = digest.quantiles();
    /// assert_eq!(quantiles.get(0.0), Some(2));
    /// assert_eq!(quantiles.get(0.5), Some(4));
    /// assert_eq!(quantiles.get(1.0), Some(5));
    /// ```
    pub fn get(&self, level: f64) -> Option<u64> {
        let rank = level * self.len as f64;
        let mut sum = 0;
        for range in &self.ranges {
            if sum as f64 > rank {
                return Some(range.right);
            }
            sum += range.count;
        }
        self.ranges.last().map(|range| range.right)
    }

    /// Returns the ranges the estimates are computed from, in ascending order.
    #[inline]
    pub fn ranges(&self) -> &[NodeRange] {
        &self.ranges
    }
}
