//! Arena-based kd-tree store.
//!
//! Nodes live in a flat `Vec` and reference entries by index; no boxed
//! recursion. Inserts append a leaf (the tree may drift out of balance),
//! removals tombstone the entry, and [`NeighborStore::optimize`] rebuilds a
//! balanced tree over the live entries. Queries are exact branch-and-bound
//! k-NN with the same (distance, insertion sequence) ordering the linear
//! backend uses, so both backends agree on every result.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::distance::squared_euclidean_distance;
use crate::store::{cmp_by_distance, NeighborStore, StoreEntry};
use crate::{BehaviorError, Descriptor, Result};

#[derive(Debug, Clone)]
struct Node {
    entry: usize,
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// Max-heap item; the heap root is the worst of the current k candidates.
#[derive(Debug)]
struct HeapItem {
    dist: f64,
    seq: u64,
    entry: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_by_distance(self.dist, self.seq, other.dist, other.seq)
    }
}

#[derive(Debug, Clone)]
pub struct KdTreeStore<V> {
    dim: usize,
    entries: Vec<StoreEntry<V>>,
    dead: Vec<bool>,
    nodes: Vec<Node>,
    root: Option<usize>,
    live: usize,
    next_seq: u64,
}

impl<V> KdTreeStore<V> {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            entries: Vec::new(),
            dead: Vec::new(),
            nodes: Vec::new(),
            root: None,
            live: 0,
            next_seq: 0,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Find the live node holding exactly `point`.
    ///
    /// Median rebuilds may place equal axis coordinates on either side of a
    /// split, so an equal coordinate descends both subtrees.
    fn find_node(&self, node: Option<usize>, point: &[f64]) -> Option<usize> {
        let n = node?;
        let nd = &self.nodes[n];
        if !self.dead[nd.entry] && self.entries[nd.entry].point.as_slice() == point {
            return Some(n);
        }
        let split = self.entries[nd.entry].point[nd.axis];
        let q = point[nd.axis];
        if q < split {
            self.find_node(nd.left, point)
        } else if q > split {
            self.find_node(nd.right, point)
        } else {
            self.find_node(nd.left, point)
                .or_else(|| self.find_node(nd.right, point))
        }
    }

    fn search(&self, node: usize, query: &[f64], k: usize, heap: &mut BinaryHeap<HeapItem>) {
        let nd = &self.nodes[node];
        if !self.dead[nd.entry] {
            let e = &self.entries[nd.entry];
            let item = HeapItem {
                dist: squared_euclidean_distance(query, &e.point),
                seq: e.seq,
                entry: nd.entry,
            };
            if heap.len() < k {
                heap.push(item);
            } else if let Some(worst) = heap.peek() {
                if item.cmp(worst) == Ordering::Less {
                    heap.pop();
                    heap.push(item);
                }
            }
        }

        let split = self.entries[nd.entry].point[nd.axis];
        let delta = query[nd.axis] - split;
        let (near, far) = if delta < 0.0 {
            (nd.left, nd.right)
        } else {
            (nd.right, nd.left)
        };

        if let Some(child) = near {
            self.search(child, query, k, heap);
        }
        // The far side can only matter if the splitting plane is at least as
        // close as the current worst candidate (ties included, for the
        // sequence-number tie-break).
        let visit_far = heap.len() < k
            || heap
                .peek()
                .map_or(true, |worst| delta * delta <= worst.dist);
        if visit_far {
            if let Some(child) = far {
                self.search(child, query, k, heap);
            }
        }
    }

    fn knn_indices(&self, query: &[f64], k: usize) -> Vec<usize> {
        let k = k.min(self.live);
        if k == 0 {
            return Vec::new();
        }
        let mut heap = BinaryHeap::with_capacity(k + 1);
        if let Some(root) = self.root {
            self.search(root, query, k, &mut heap);
        }
        heap.into_sorted_vec().into_iter().map(|i| i.entry).collect()
    }

    fn build_subtree(&mut self, idxs: &mut [usize], depth: usize) -> Option<usize> {
        if idxs.is_empty() {
            return None;
        }
        let axis = depth % self.dim;
        idxs.sort_by(|&a, &b| {
            self.entries[a].point[axis]
                .partial_cmp(&self.entries[b].point[axis])
                .unwrap_or(Ordering::Equal)
                .then(self.entries[a].seq.cmp(&self.entries[b].seq))
        });
        let mid = idxs.len() / 2;
        let node_idx = self.nodes.len();
        self.nodes.push(Node {
            entry: idxs[mid],
            axis,
            left: None,
            right: None,
        });
        let (lo, rest) = idxs.split_at_mut(mid);
        let left = self.build_subtree(lo, depth + 1);
        let right = self.build_subtree(&mut rest[1..], depth + 1);
        self.nodes[node_idx].left = left;
        self.nodes[node_idx].right = right;
        Some(node_idx)
    }
}

impl<V: Send + Sync> NeighborStore<V> for KdTreeStore<V> {
    fn insert(&mut self, point: Descriptor, value: V) -> Result<()> {
        if point.dim() != self.dim {
            return Err(BehaviorError::DimensionMismatch {
                expected: self.dim,
                got: point.dim(),
            });
        }

        let entry_idx = self.entries.len();
        self.entries.push(StoreEntry {
            point,
            value,
            seq: self.next_seq,
        });
        self.dead.push(false);
        self.next_seq += 1;
        self.live += 1;

        let node_idx = self.nodes.len();
        self.nodes.push(Node {
            entry: entry_idx,
            axis: 0,
            left: None,
            right: None,
        });

        let Some(mut cur) = self.root else {
            self.root = Some(node_idx);
            return Ok(());
        };
        loop {
            let axis = self.nodes[cur].axis;
            let split = self.entries[self.nodes[cur].entry].point[axis];
            let q = self.entries[entry_idx].point[axis];
            // equal coordinates go right, matching the find_node descent
            if q < split {
                match self.nodes[cur].left {
                    Some(child) => cur = child,
                    None => {
                        self.nodes[cur].left = Some(node_idx);
                        self.nodes[node_idx].axis = (axis + 1) % self.dim;
                        break;
                    }
                }
            } else {
                match self.nodes[cur].right {
                    Some(child) => cur = child,
                    None => {
                        self.nodes[cur].right = Some(node_idx);
                        self.nodes[node_idx].axis = (axis + 1) % self.dim;
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn remove(&mut self, point: &[f64]) -> bool {
        match self.find_node(self.root, point) {
            Some(node) => {
                // Lazy deletion: the node keeps partitioning its subtree,
                // the entry stops matching queries until the next rebuild.
                let entry = self.nodes[node].entry;
                self.dead[entry] = true;
                self.live -= 1;
                true
            }
            None => false,
        }
    }

    fn contains(&self, point: &[f64]) -> bool {
        self.find_node(self.root, point).is_some()
    }

    fn nearest(&self, query: &[f64]) -> &StoreEntry<V> {
        assert!(self.live > 0, "nearest() on empty store");
        let idxs = self.knn_indices(query, 1);
        &self.entries[idxs[0]]
    }

    fn knn(&self, query: &[f64], k: usize) -> Vec<&StoreEntry<V>> {
        self.knn_indices(query, k)
            .into_iter()
            .map(|i| &self.entries[i])
            .collect()
    }

    fn len(&self) -> usize {
        self.live
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &StoreEntry<V>> + '_> {
        Box::new(
            self.entries
                .iter()
                .zip(self.dead.iter())
                .filter(|(_, dead)| !**dead)
                .map(|(e, _)| e),
        )
    }

    /// Drop tombstoned entries and rebuild a balanced tree.
    ///
    /// Entry order and sequence numbers are preserved, so iteration order
    /// and tie-breaking are unaffected by rebuilds.
    fn optimize(&mut self) {
        let old_entries = std::mem::take(&mut self.entries);
        let old_dead = std::mem::take(&mut self.dead);
        self.entries = old_entries
            .into_iter()
            .zip(old_dead)
            .filter(|(_, dead)| !dead)
            .map(|(e, _)| e)
            .collect();
        self.dead = vec![false; self.entries.len()];
        self.live = self.entries.len();

        self.nodes.clear();
        let mut idxs: Vec<usize> = (0..self.entries.len()).collect();
        self.root = self.build_subtree(&mut idxs, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_query() {
        let mut store = KdTreeStore::new(2);
        store.insert(Descriptor::new(vec![0.1, 0.1]), "a").unwrap();
        store.insert(Descriptor::new(vec![0.9, 0.9]), "b").unwrap();
        store.insert(Descriptor::new(vec![0.5, 0.4]), "c").unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.nearest(&[0.45, 0.45]).value, "c");
        let nn = store.knn(&[0.0, 0.0], 2);
        assert_eq!(nn[0].value, "a");
        assert_eq!(nn[1].value, "c");
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut store = KdTreeStore::new(2);
        let result = store.insert(Descriptor::new(vec![0.1, 0.2, 0.3]), 0);
        assert!(matches!(
            result,
            Err(BehaviorError::DimensionMismatch { expected: 2, got: 3 })
        ));
    }

    #[test]
    fn test_remove_and_tombstones() {
        let mut store = KdTreeStore::new(2);
        store.insert(Descriptor::new(vec![0.2, 0.2]), 0).unwrap();
        store.insert(Descriptor::new(vec![0.8, 0.8]), 1).unwrap();
        assert!(!store.remove(&[0.5, 0.5]));
        assert!(store.remove(&[0.2, 0.2]));
        assert_eq!(store.len(), 1);
        assert!(!store.contains(&[0.2, 0.2]));
        // removed entry no longer matches queries even before a rebuild
        assert_eq!(store.nearest(&[0.0, 0.0]).value, 1);
        let values: Vec<i32> = store.iter().map(|e| e.value).collect();
        assert_eq!(values, vec![1]);
    }

    #[test]
    fn test_optimize_after_degenerate_inserts() {
        // Sorted inserts build a chain; optimize rebalances without changing
        // any query result.
        let mut store = KdTreeStore::new(1);
        for i in 0..64 {
            store.insert(Descriptor::new(vec![i as f64]), i).unwrap();
        }
        let before: Vec<i32> = store.knn(&[31.6], 5).iter().map(|e| e.value).collect();
        store.optimize();
        let after: Vec<i32> = store.knn(&[31.6], 5).iter().map(|e| e.value).collect();
        assert_eq!(before, after);
        assert_eq!(after, vec![32, 31, 33, 30, 34]);
    }

    #[test]
    fn test_optimize_drops_tombstones() {
        let mut store = KdTreeStore::new(2);
        for i in 0..10 {
            let p = Descriptor::new(vec![i as f64 * 0.1, 0.5]);
            store.insert(p, i).unwrap();
        }
        store.remove(&[0.3, 0.5]);
        store.remove(&[0.7, 0.5]);
        store.optimize();
        assert_eq!(store.len(), 8);
        let values: Vec<i32> = store.iter().map(|e| e.value).collect();
        assert_eq!(values, vec![0, 1, 2, 4, 5, 6, 8, 9]);
        // reinsert at a removed location works
        store.insert(Descriptor::new(vec![0.3, 0.5]), 42).unwrap();
        assert_eq!(store.nearest(&[0.3, 0.5]).value, 42);
    }

    #[test]
    fn test_duplicate_axis_coordinates_found_after_rebuild() {
        // Equal splitting coordinates can land on either side of a median;
        // exact lookups must still find them.
        let mut store = KdTreeStore::new(2);
        for i in 0..7 {
            store
                .insert(Descriptor::new(vec![0.5, i as f64 * 0.1]), i)
                .unwrap();
        }
        store.optimize();
        for i in 0..7 {
            assert!(store.contains(&[0.5, i as f64 * 0.1]), "missing {}", i);
        }
        assert!(store.remove(&[0.5, 0.3]));
        assert_eq!(store.len(), 6);
    }

    #[test]
    #[should_panic(expected = "empty store")]
    fn test_nearest_on_empty_panics() {
        let store: KdTreeStore<i32> = KdTreeStore::new(2);
        store.nearest(&[0.0, 0.0]);
    }
}
