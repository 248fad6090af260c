//! Brute-force linear-scan store.
//!
//! Keeps entries in a flat `Vec` in insertion order and scans it per query.
//! k-NN uses partial selection (`select_nth_unstable_by`) so only the top-k
//! prefix gets sorted. No per-generation maintenance needed.

use crate::distance::{batch_squared_distances, squared_euclidean_distance};
use crate::store::{cmp_by_distance, NeighborStore, StoreEntry};
use crate::{BehaviorError, Descriptor, Result};

#[derive(Debug, Clone)]
pub struct LinearScanStore<V> {
    dim: usize,
    entries: Vec<StoreEntry<V>>,
    next_seq: u64,
}

impl<V> LinearScanStore<V> {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn position(&self, point: &[f64]) -> Option<usize> {
        self.entries.iter().position(|e| e.point.as_slice() == point)
    }
}

impl<V: Send + Sync> NeighborStore<V> for LinearScanStore<V> {
    fn insert(&mut self, point: Descriptor, value: V) -> Result<()> {
        if point.dim() != self.dim {
            return Err(BehaviorError::DimensionMismatch {
                expected: self.dim,
                got: point.dim(),
            });
        }
        self.entries.push(StoreEntry {
            point,
            value,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        Ok(())
    }

    fn remove(&mut self, point: &[f64]) -> bool {
        match self.position(point) {
            Some(idx) => {
                // Vec::remove keeps the remaining entries in insertion order
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    fn contains(&self, point: &[f64]) -> bool {
        self.position(point).is_some()
    }

    fn nearest(&self, query: &[f64]) -> &StoreEntry<V> {
        assert!(!self.entries.is_empty(), "nearest() on empty store");
        let mut best = &self.entries[0];
        let mut best_d = squared_euclidean_distance(query, &best.point);
        for e in &self.entries[1..] {
            let d = squared_euclidean_distance(query, &e.point);
            if cmp_by_distance(d, e.seq, best_d, best.seq).is_lt() {
                best = e;
                best_d = d;
            }
        }
        best
    }

    fn knn(&self, query: &[f64], k: usize) -> Vec<&StoreEntry<V>> {
        let k = k.min(self.entries.len());
        if k == 0 {
            return Vec::new();
        }

        let points: Vec<&[f64]> = self.entries.iter().map(|e| e.point.as_slice()).collect();
        let dists = batch_squared_distances(query, &points);

        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        let cmp = |&a: &usize, &b: &usize| {
            cmp_by_distance(dists[a], self.entries[a].seq, dists[b], self.entries[b].seq)
        };
        if k < order.len() {
            order.select_nth_unstable_by(k - 1, cmp);
            order.truncate(k);
        }
        order.sort_by(cmp);
        order.into_iter().map(|i| &self.entries[i]).collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &StoreEntry<V>> + '_> {
        Box::new(self.entries.iter())
    }

    fn optimize(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_len() {
        let mut store = LinearScanStore::new(2);
        assert!(store.is_empty());
        store.insert(Descriptor::new(vec![0.1, 0.2]), "a").unwrap();
        store.insert(Descriptor::new(vec![0.3, 0.4]), "b").unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut store = LinearScanStore::new(3);
        let result = store.insert(Descriptor::new(vec![0.1, 0.2]), 0);
        assert!(matches!(
            result,
            Err(BehaviorError::DimensionMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn test_knn_order_and_clamp() {
        let mut store = LinearScanStore::new(1);
        for (i, x) in [0.9, 0.1, 0.5, 0.3].iter().enumerate() {
            store.insert(Descriptor::new(vec![*x]), i).unwrap();
        }
        let nn = store.knn(&[0.0], 3);
        let values: Vec<usize> = nn.iter().map(|e| e.value).collect();
        assert_eq!(values, vec![1, 3, 2]);

        // k larger than the store clamps
        assert_eq!(store.knn(&[0.0], 100).len(), 4);
        assert_eq!(store.knn(&[0.0], 0).len(), 0);
    }

    #[test]
    fn test_tie_broken_by_insertion_order() {
        let mut store = LinearScanStore::new(1);
        store.insert(Descriptor::new(vec![1.0]), "first").unwrap();
        store.insert(Descriptor::new(vec![-1.0]), "second").unwrap();
        // both at distance 1 from the query
        assert_eq!(store.nearest(&[0.0]).value, "first");
        let nn = store.knn(&[0.0], 2);
        assert_eq!(nn[0].value, "first");
        assert_eq!(nn[1].value, "second");
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut store = LinearScanStore::new(2);
        store.insert(Descriptor::new(vec![0.1, 0.2]), 0).unwrap();
        assert!(!store.remove(&[0.9, 0.9]));
        assert_eq!(store.len(), 1);
        assert!(store.remove(&[0.1, 0.2]));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_iter_insertion_order_after_remove() {
        let mut store = LinearScanStore::new(1);
        for i in 0..4 {
            store.insert(Descriptor::new(vec![i as f64]), i).unwrap();
        }
        store.remove(&[1.0]);
        let values: Vec<i32> = store.iter().map(|e| e.value).collect();
        assert_eq!(values, vec![0, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "empty store")]
    fn test_nearest_on_empty_panics() {
        let store: LinearScanStore<i32> = LinearScanStore::new(2);
        store.nearest(&[0.0, 0.0]);
    }
}
