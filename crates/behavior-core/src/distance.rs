//! Distance functions over behavior descriptors.
//!
//! Behavior space is Euclidean throughout; these are thin wrappers over the
//! SIMD kernels in [`crate::simd`].

use crate::simd;

/// Euclidean distance between two descriptors.
#[inline]
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    simd::squared_euclidean_simd(a, b).sqrt()
}

/// Squared Euclidean distance (avoids the sqrt where only ordering matters).
#[inline]
pub fn squared_euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    simd::squared_euclidean_simd(a, b)
}

/// Squared distances from a query to each point, in input order.
#[inline]
pub fn batch_squared_distances(query: &[f64], points: &[&[f64]]) -> Vec<f64> {
    points
        .iter()
        .map(|p| simd::squared_euclidean_simd(query, p))
        .collect()
}

/// Parallel batch squared distances using rayon.
#[cfg(feature = "parallel")]
pub fn batch_squared_distances_parallel(query: &[f64], points: &[&[f64]]) -> Vec<f64> {
    use rayon::prelude::*;

    points
        .par_iter()
        .map(|p| simd::squared_euclidean_simd(query, p))
        .collect()
}
