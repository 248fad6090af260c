//! Exact nearest-neighbor stores over behavior descriptors.
//!
//! Containers keep their members in one of these stores and query it during
//! admission (nearest neighbor, k-nearest) and metric updates. Two backends
//! implement the same [`NeighborStore`] contract:
//!
//! - [`LinearScanStore`]: brute-force scan with partial selection, no build
//!   cost, best for small archives
//! - [`KdTreeStore`]: arena kd-tree with lazy deletion and periodic
//!   rebalancing via [`NeighborStore::optimize`]
//!
//! Both backends return *identical* results for identical inputs, including
//! tie situations: neighbors at equal distance are ordered by insertion
//! sequence. Admission decisions therefore do not depend on which backend a
//! container was configured with.

pub mod kdtree;
pub mod linear;

pub use kdtree::KdTreeStore;
pub use linear::LinearScanStore;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{Descriptor, Result};

/// One stored point with its payload.
///
/// `seq` is the insertion sequence number, assigned monotonically by the
/// store and stable across [`NeighborStore::optimize`]. It breaks distance
/// ties in queries and keeps iteration in insertion order.
#[derive(Debug, Clone)]
pub struct StoreEntry<V> {
    pub point: Descriptor,
    pub value: V,
    pub seq: u64,
}

/// Contract shared by all nearest-neighbor backends.
///
/// Stores are fixed-dimension: `insert` rejects points of the wrong
/// dimensionality. Duplicate points are accepted here; point uniqueness is a
/// container-level concern enforced through `contains` before insertion.
pub trait NeighborStore<V>: Send + Sync {
    /// Insert a point with its payload.
    fn insert(&mut self, point: Descriptor, value: V) -> Result<()>;

    /// Remove the entry whose point equals `point` exactly.
    ///
    /// Returns false (and changes nothing) when no such entry exists.
    fn remove(&mut self, point: &[f64]) -> bool;

    /// Whether an entry with exactly this point exists.
    fn contains(&self, point: &[f64]) -> bool;

    /// The entry nearest to `query`.
    ///
    /// # Panics
    /// Panics if the store is empty; querying an empty store is a contract
    /// violation, not a recoverable condition.
    fn nearest(&self, query: &[f64]) -> &StoreEntry<V>;

    /// The `k` entries nearest to `query`, closest first.
    ///
    /// `k` is clamped to the store size; ties are broken by insertion
    /// sequence.
    fn knn(&self, query: &[f64], k: usize) -> Vec<&StoreEntry<V>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate entries in insertion order.
    fn iter(&self) -> Box<dyn Iterator<Item = &StoreEntry<V>> + '_>;

    /// Housekeeping hook called once per generation (rebalancing, compaction).
    fn optimize(&mut self);
}

/// Backend selection for a [`DescriptorStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StoreBackend {
    /// Brute-force scan.
    LinearScan,
    /// kd-tree with periodic rebuild.
    #[default]
    KdTree,
}

/// A `NeighborStore` resolved at configuration time.
#[derive(Debug, Clone)]
pub enum DescriptorStore<V> {
    Linear(LinearScanStore<V>),
    KdTree(KdTreeStore<V>),
}

impl<V: Send + Sync> DescriptorStore<V> {
    pub fn new(backend: StoreBackend, dim: usize) -> Self {
        match backend {
            StoreBackend::LinearScan => Self::Linear(LinearScanStore::new(dim)),
            StoreBackend::KdTree => Self::KdTree(KdTreeStore::new(dim)),
        }
    }

    pub fn backend(&self) -> StoreBackend {
        match self {
            Self::Linear(_) => StoreBackend::LinearScan,
            Self::KdTree(_) => StoreBackend::KdTree,
        }
    }
}

impl<V: Send + Sync> NeighborStore<V> for DescriptorStore<V> {
    fn insert(&mut self, point: Descriptor, value: V) -> Result<()> {
        match self {
            Self::Linear(s) => s.insert(point, value),
            Self::KdTree(s) => s.insert(point, value),
        }
    }

    fn remove(&mut self, point: &[f64]) -> bool {
        match self {
            Self::Linear(s) => s.remove(point),
            Self::KdTree(s) => s.remove(point),
        }
    }

    fn contains(&self, point: &[f64]) -> bool {
        match self {
            Self::Linear(s) => s.contains(point),
            Self::KdTree(s) => s.contains(point),
        }
    }

    fn nearest(&self, query: &[f64]) -> &StoreEntry<V> {
        match self {
            Self::Linear(s) => s.nearest(query),
            Self::KdTree(s) => s.nearest(query),
        }
    }

    fn knn(&self, query: &[f64], k: usize) -> Vec<&StoreEntry<V>> {
        match self {
            Self::Linear(s) => s.knn(query, k),
            Self::KdTree(s) => s.knn(query, k),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Linear(s) => s.len(),
            Self::KdTree(s) => s.len(),
        }
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &StoreEntry<V>> + '_> {
        match self {
            Self::Linear(s) => s.iter(),
            Self::KdTree(s) => s.iter(),
        }
    }

    fn optimize(&mut self) {
        match self {
            Self::Linear(s) => s.optimize(),
            Self::KdTree(s) => s.optimize(),
        }
    }
}

/// Neighbor ordering: ascending distance, insertion sequence on ties.
#[inline]
pub(crate) fn cmp_by_distance(d1: f64, s1: u64, d2: f64, s2: u64) -> Ordering {
    d1.partial_cmp(&d2)
        .unwrap_or(Ordering::Equal)
        .then(s1.cmp(&s2))
}
