//! Centred interval tree over `[start, end]` time ranges.
//!
//! Each node keeps a `center` (median endpoint of its subtree at build time)
//! and three buckets: intervals entirely left of the centre, entirely right
//! of it, and those containing it. The containing bucket is sorted by start
//! so scans can stop at the first interval starting past the query.
//!
//! Single inserts never rebalance. After many inserts on top of a build the
//! tree degrades; call [`IntervalTree::rebalanced`] to rebuild it.

use crate::compute::validation::validate_interval;
use crate::error::{FramedexError, Result};
use tokio_util::sync::CancellationToken;

/// A closed time range carrying a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval<T> {
    pub start: f64,
    pub end: f64,
    pub payload: T,
}

impl<T> Interval<T> {
    /// Create an interval, rejecting `start > end` and non-finite bounds.
    pub fn new(start: f64, end: f64, payload: T) -> Result<Self> {
        validate_interval(start, end)?;
        Ok(Self {
            start,
            end,
            payload,
        })
    }

    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t <= self.end
    }

    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.start <= end && start <= self.end
    }

    fn midpoint(&self) -> f64 {
        self.start + (self.end - self.start) / 2.0
    }
}

#[derive(Debug)]
struct Node<T> {
    center: f64,
    left: Option<Box<Node<T>>>,
    right: Option<Box<Node<T>>>,
    /// Intervals containing `center`, sorted by start.
    overlapping: Vec<Interval<T>>,
}

impl<T> Node<T> {
    fn leaf(interval: Interval<T>) -> Self {
        Self {
            center: interval.midpoint(),
            left: None,
            right: None,
            overlapping: vec![interval],
        }
    }

}

/// Interval index answering point-containment and range-overlap queries.
///
/// # Examples
///
/// ```
/// use framedex::compute::temporal::{Interval, IntervalTree};
///
/// let tree = IntervalTree::build(vec![
///     Interval::new(0.0, 10.0, "a")?,
///     Interval::new(5.0, 6.0, "b")?,
///     Interval::new(20.0, 30.0, "c")?,
/// ]);
///
/// let mut hits: Vec<_> = tree.query_point(5.5).iter().map(|iv| iv.payload).collect();
/// hits.sort();
/// assert_eq!(hits, vec!["a", "b"]);
/// assert_eq!(tree.query_interval(11.0, 19.0).len(), 0);
/// # Ok::<(), framedex::FramedexError>(())
/// ```
#[derive(Debug)]
pub struct IntervalTree<T> {
    root: Option<Box<Node<T>>>,
    len: usize,
}

impl<T> IntervalTree<T> {
    pub fn new() -> Self {
        Self { root: None, len: 0 }
    }

    /// Build a balanced tree from scratch in O(n log n).
    pub fn build(intervals: Vec<Interval<T>>) -> Self {
        let len = intervals.len();
        Self {
            root: Self::build_node(intervals),
            len,
        }
    }

    /// Replace the whole index with `intervals`.
    pub fn rebuild(&mut self, intervals: Vec<Interval<T>>) {
        *self = Self::build(intervals);
    }

    /// Rebuild from the current contents, restoring balance after inserts.
    pub fn rebalanced(self) -> Self {
        Self::build(self.into_intervals())
    }

    fn build_node(intervals: Vec<Interval<T>>) -> Option<Box<Node<T>>> {
        if intervals.is_empty() {
            return None;
        }

        let mut endpoints: Vec<f64> = intervals.iter().flat_map(|iv| [iv.start, iv.end]).collect();
        endpoints.sort_by(f64::total_cmp);
        // The median endpoint belongs to some interval, so the centre bucket
        // is never empty and both children are strictly smaller.
        let center = endpoints[endpoints.len() / 2];

        let mut left = Vec::new();
        let mut right = Vec::new();
        let mut overlapping = Vec::new();
        for iv in intervals {
            if iv.end < center {
                left.push(iv);
            } else if iv.start > center {
                right.push(iv);
            } else {
                overlapping.push(iv);
            }
        }
        overlapping.sort_by(|a, b| a.start.total_cmp(&b.start));

        Some(Box::new(Node {
            center,
            left: Self::build_node(left),
            right: Self::build_node(right),
            overlapping,
        }))
    }

    /// Add one interval without rebuilding.
    ///
    /// Walks down by comparing against existing centres; when the target
    /// subtree is empty a new node centred on the interval's midpoint is
    /// created.
    pub fn insert(&mut self, interval: Interval<T>) {
        let mut slot = &mut self.root;
        while let Some(node) = slot {
            if interval.end < node.center {
                slot = &mut node.left;
            } else if interval.start > node.center {
                slot = &mut node.right;
            } else {
                let pos = node
                    .overlapping
                    .partition_point(|iv| iv.start <= interval.start);
                node.overlapping.insert(pos, interval);
                self.len += 1;
                return;
            }
        }
        *slot = Some(Box::new(Node::leaf(interval)));
        self.len += 1;
    }

    /// All intervals with `start <= t <= end`.
    pub fn query_point(&self, t: f64) -> Vec<&Interval<T>> {
        let mut results = Vec::new();
        let mut node = self.root.as_deref();

        while let Some(n) = node {
            for iv in &n.overlapping {
                if iv.start > t {
                    break;
                }
                if iv.end >= t {
                    results.push(iv);
                }
            }

            node = if t < n.center {
                n.left.as_deref()
            } else if t > n.center {
                n.right.as_deref()
            } else {
                None
            };
        }

        results
    }

    /// All intervals overlapping `[start, end]`.
    pub fn query_interval(&self, start: f64, end: f64) -> Vec<&Interval<T>> {
        self.overlapping_until(start, end, || false)
            .unwrap_or_default()
    }

    /// Like [`query_interval`](Self::query_interval), but checks `cancel`
    /// before visiting each node.
    pub fn query_interval_cancellable(
        &self,
        start: f64,
        end: f64,
        cancel: &CancellationToken,
    ) -> Result<Vec<&Interval<T>>> {
        self.overlapping_until(start, end, || cancel.is_cancelled())
            .ok_or(FramedexError::Cancelled)
    }

    /// Returns `None` if `stop` fired before the scan completed.
    fn overlapping_until(
        &self,
        start: f64,
        end: f64,
        stop: impl Fn() -> bool,
    ) -> Option<Vec<&Interval<T>>> {
        let mut results = Vec::new();
        let mut stack: Vec<&Node<T>> = self.root.as_deref().into_iter().collect();

        while let Some(n) = stack.pop() {
            if stop() {
                return None;
            }

            for iv in &n.overlapping {
                if iv.start > end {
                    break;
                }
                if iv.end >= start {
                    results.push(iv);
                }
            }

            if start < n.center
                && let Some(left) = n.left.as_deref()
            {
                stack.push(left);
            }
            if end > n.center
                && let Some(right) = n.right.as_deref()
            {
                stack.push(right);
            }
        }

        Some(results)
    }

    /// Every stored interval, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Interval<T>> {
        let mut stack: Vec<&Node<T>> = self.root.as_deref().into_iter().collect();
        let mut all = Vec::with_capacity(self.len);
        while let Some(n) = stack.pop() {
            all.extend(n.overlapping.iter());
            stack.extend(n.left.as_deref());
            stack.extend(n.right.as_deref());
        }
        all.into_iter()
    }

    pub fn into_intervals(mut self) -> Vec<Interval<T>> {
        let mut all = Vec::with_capacity(self.len);
        let mut stack: Vec<Box<Node<T>>> = self.root.take().into_iter().collect();
        while let Some(node) = stack.pop() {
            let Node {
                left,
                right,
                overlapping,
                ..
            } = *node;
            all.extend(overlapping);
            stack.extend(left);
            stack.extend(right);
        }
        all
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Height of the tree; 0 when empty.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack: Vec<(&Node<T>, usize)> =
            self.root.as_deref().map(|n| (n, 1)).into_iter().collect();
        while let Some((n, level)) = stack.pop() {
            deepest = deepest.max(level);
            stack.extend(n.left.as_deref().map(|c| (c, level + 1)));
            stack.extend(n.right.as_deref().map(|c| (c, level + 1)));
        }
        deepest
    }
}

// Sorted single inserts grow a chain as long as the input; the derived drop
// would recurse once per node.
impl<T> Drop for IntervalTree<T> {
    fn drop(&mut self) {
        let mut stack: Vec<Box<Node<T>>> = self.root.take().into_iter().collect();
        while let Some(mut node) = stack.pop() {
            stack.extend(node.left.take());
            stack.extend(node.right.take());
        }
    }
}

impl<T> Default for IntervalTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Whole-number bounds, so many intervals share endpoints.
    fn random_intervals(seed: u64, n: usize) -> Vec<Interval<usize>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|i| {
                let start = rng.gen_range(0..100) as f64;
                let len = rng.gen_range(0..15) as f64;
                Interval::new(start, start + len, i).unwrap()
            })
            .collect()
    }

    fn ids(hits: Vec<&Interval<usize>>) -> Vec<usize> {
        let mut ids: Vec<usize> = hits.into_iter().map(|iv| iv.payload).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_empty_tree() {
        let tree: IntervalTree<u32> = IntervalTree::new();
        assert!(tree.query_point(1.0).is_empty());
        assert!(tree.query_interval(0.0, 100.0).is_empty());
        assert_eq!(tree.depth(), 0);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_interval_rejects_inverted_bounds() {
        assert!(Interval::new(5.0, 1.0, ()).is_err());
        assert!(Interval::new(f64::NEG_INFINITY, 1.0, ()).is_err());
        assert!(Interval::new(1.0, 1.0, ()).is_ok());
    }

    #[test]
    fn test_point_query_matches_brute_force() {
        let intervals = random_intervals(7, 300);
        let tree = IntervalTree::build(intervals.clone());

        for p in 0..120 {
            let p = p as f64 + 0.5 * (p % 2) as f64;
            let expected: Vec<usize> = intervals
                .iter()
                .filter(|iv| iv.start <= p && p <= iv.end)
                .map(|iv| iv.payload)
                .collect();
            assert_eq!(ids(tree.query_point(p)), expected, "point {}", p);
        }
    }

    #[test]
    fn test_interval_query_matches_brute_force() {
        let intervals = random_intervals(42, 300);
        let tree = IntervalTree::build(intervals.clone());

        for s in (0..110).step_by(3) {
            for len in [0.0, 1.0, 4.5, 20.0] {
                let (qs, qe) = (s as f64, s as f64 + len);
                let expected: Vec<usize> = intervals
                    .iter()
                    .filter(|iv| iv.start <= qe && qs <= iv.end)
                    .map(|iv| iv.payload)
                    .collect();
                assert_eq!(ids(tree.query_interval(qs, qe)), expected);
            }
        }
    }

    #[test]
    fn test_results_independent_of_insertion_order() {
        let intervals = random_intervals(99, 200);
        let built = IntervalTree::build(intervals.clone());

        let mut forward = IntervalTree::new();
        for iv in intervals.iter().cloned() {
            forward.insert(iv);
        }
        let mut backward = IntervalTree::new();
        for iv in intervals.iter().rev().cloned() {
            backward.insert(iv);
        }
        assert_eq!(forward.len(), 200);

        for p in (0..115).map(|p| p as f64) {
            let expected = ids(built.query_point(p));
            assert_eq!(ids(forward.query_point(p)), expected);
            assert_eq!(ids(backward.query_point(p)), expected);
        }
    }

    #[test]
    fn test_insert_after_build() {
        let mut tree = IntervalTree::build(vec![
            Interval::new(0.0, 10.0, 0).unwrap(),
            Interval::new(2.0, 4.0, 1).unwrap(),
        ]);
        tree.insert(Interval::new(50.0, 60.0, 2).unwrap());
        tree.insert(Interval::new(-5.0, -1.0, 3).unwrap());
        tree.insert(Interval::new(3.0, 3.0, 4).unwrap());

        assert_eq!(ids(tree.query_point(55.0)), vec![2]);
        assert_eq!(ids(tree.query_point(-3.0)), vec![3]);
        assert_eq!(ids(tree.query_point(3.0)), vec![0, 1, 4]);
        assert_eq!(ids(tree.query_interval(-1.0, 50.0)), vec![0, 1, 2, 3, 4]);
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let tree = IntervalTree::build(vec![Interval::new(1.0, 2.0, 0).unwrap()]);
        assert_eq!(ids(tree.query_point(1.0)), vec![0]);
        assert_eq!(ids(tree.query_point(2.0)), vec![0]);
        assert_eq!(ids(tree.query_interval(2.0, 3.0)), vec![0]);
        assert!(tree.query_interval(2.1, 3.0).is_empty());
    }

    #[test]
    fn test_rebalanced_keeps_contents() {
        let mut tree = IntervalTree::new();
        for i in 0..64 {
            let s = i as f64 * 10.0;
            tree.insert(Interval::new(s, s + 1.0, i).unwrap());
        }
        let unbalanced_depth = tree.depth();
        let tree = tree.rebalanced();
        assert!(tree.depth() < unbalanced_depth);
        assert_eq!(tree.len(), 64);
        assert_eq!(tree.iter().count(), 64);
        assert_eq!(ids(tree.query_point(305.0)), vec![30]);
    }

    #[test]
    fn test_long_insert_chain_drops_on_small_stack() {
        // Each sorted insert lands right of every existing centre.
        let handle = std::thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn(|| {
                let mut tree = IntervalTree::new();
                for i in 0..30_000usize {
                    let s = i as f64;
                    tree.insert(Interval::new(s, s + 0.5, i).unwrap());
                }
                assert_eq!(tree.depth(), 30_000);
                assert_eq!(ids(tree.query_point(15_000.25)), vec![15_000]);
                drop(tree);
            })
            .unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_cancelled_query() {
        let tree = IntervalTree::build(random_intervals(3, 50));
        let cancel = CancellationToken::new();
        assert!(tree.query_interval_cancellable(0.0, 50.0, &cancel).is_ok());

        cancel.cancel();
        assert!(matches!(
            tree.query_interval_cancellable(0.0, 50.0, &cancel),
            Err(FramedexError::Cancelled)
        ));
    }
}
