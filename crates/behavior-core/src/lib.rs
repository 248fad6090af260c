//! Behavior-space primitives for quality-diversity search.
//!
//! This crate provides the building blocks that QD containers are made of:
//!
//! - [`Descriptor`]: a fixed-dimensionality behavior coordinate vector
//! - [`store`]: exact nearest-neighbor stores (linear scan and kd-tree)
//!   behind a common trait, with deterministic tie-breaking
//! - [`distance`] / [`simd`]: f64 Euclidean kernels with NEON acceleration
//!   on aarch64 and portable SIMD elsewhere

pub mod distance;
pub mod simd;
pub mod store;

pub use distance::{euclidean_distance, squared_euclidean_distance};
pub use store::{DescriptorStore, NeighborStore, StoreBackend, StoreEntry};

use serde::{Deserialize, Serialize};

/// A point in behavior space.
///
/// Descriptors are plain `f64` vectors; equality is exact element-wise
/// comparison, which is what duplicate suppression in the containers relies
/// on. Values are not clamped or normalized here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor(pub Vec<f64>);

impl Descriptor {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    /// Create a zero descriptor of the given dimension.
    pub fn zeros(dim: usize) -> Self {
        Self(vec![0.0; dim])
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Euclidean distance to another descriptor.
    pub fn distance_to(&self, other: &Descriptor) -> f64 {
        euclidean_distance(&self.0, &other.0)
    }
}

impl std::ops::Deref for Descriptor {
    type Target = Vec<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for Descriptor {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<f64>> for Descriptor {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl From<&[f64]> for Descriptor {
    fn from(values: &[f64]) -> Self {
        Self(values.to_vec())
    }
}

/// Errors from behavior-space operations.
#[derive(Debug, thiserror::Error)]
pub enum BehaviorError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, BehaviorError>;
