//! Engine configuration.
//!
//! A [`QdConfig`] fully determines a run: behavior-space geometry, batch
//! sizes, container strategy, selection strategy, and the RNG seed.
//! Validation happens once, up front, and names the offending parameter;
//! nothing downstream re-checks.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use behavior_core::StoreBackend;

use crate::selector::Selector;
use crate::{QdError, Result};

/// Novelty-related parameters shared by the containers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NoveltyParams {
    /// Archive admission threshold: a candidate farther than `l` from its
    /// nearest neighbor is always admitted.
    pub l: f64,
    /// Neighborhood size for novelty and local-quality computation.
    pub k: usize,
    /// Relative tolerance for the archive's exclusive-competition band.
    pub eps: f64,
    /// Grid neighborhood radius, in cells per dimension.
    pub deep: usize,
}

impl Default for NoveltyParams {
    fn default() -> Self {
        Self {
            l: 0.01,
            k: 15,
            eps: 0.1,
            deep: 3,
        }
    }
}

/// CVT construction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvtParams {
    /// Number of niches (centroids).
    pub niches: usize,
    /// Number of uniform samples used to fit the centroids.
    pub samples: usize,
    /// k-means iteration cap per restart.
    pub max_iterations: usize,
    /// Independent k-means restarts; the lowest-loss run wins.
    pub restarts: usize,
    /// Stop a restart once the loss improvement falls below this.
    pub tolerance: f64,
    /// Optional centroid cache file; a valid cache skips k-means entirely.
    pub cache_path: Option<PathBuf>,
}

impl Default for CvtParams {
    fn default() -> Self {
        Self {
            niches: 1000,
            samples: 10_000,
            max_iterations: 100,
            restarts: 1,
            tolerance: 1e-7,
            cache_path: None,
        }
    }
}

/// Which container strategy the run uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ContainerConfig {
    /// Unbounded novelty-gated archive.
    Archive { storage: StoreBackend },
    /// Fixed grid over [0, 1]^d with the given cells per dimension.
    Grid { shape: Vec<usize> },
    /// Centroidal Voronoi tessellation niches.
    Cvt {
        params: CvtParams,
        storage: StoreBackend,
    },
}

/// Full engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdConfig {
    /// Behavior descriptor dimensionality.
    pub behavior_dim: usize,
    /// Offspring produced and evaluated per generation. Must be even
    /// (parents are crossed in pairs), and a multiple of 4 under Pareto
    /// selection.
    pub batch_size: usize,
    /// Size of each of the two random initialization passes.
    pub initial_size: usize,
    /// Generation budget for `run()`.
    pub generations: u64,
    /// Seed for the engine's random stream.
    pub seed: u64,
    pub novelty: NoveltyParams,
    pub container: ContainerConfig,
    pub selector: Selector,
}

impl QdConfig {
    /// Novelty-archive configuration with admission threshold `l`.
    pub fn archive(behavior_dim: usize, l: f64) -> Self {
        Self {
            behavior_dim,
            batch_size: 200,
            initial_size: 200,
            generations: 1000,
            seed: 0,
            novelty: NoveltyParams {
                l,
                ..NoveltyParams::default()
            },
            container: ContainerConfig::Archive {
                storage: StoreBackend::default(),
            },
            selector: Selector::default(),
        }
    }

    /// Grid configuration; the behavior dimension follows the shape.
    pub fn grid(shape: Vec<usize>) -> Self {
        Self {
            behavior_dim: shape.len(),
            batch_size: 200,
            initial_size: 200,
            generations: 1000,
            seed: 0,
            novelty: NoveltyParams::default(),
            container: ContainerConfig::Grid { shape },
            selector: Selector::default(),
        }
    }

    /// CVT configuration with the given niche count.
    pub fn cvt(behavior_dim: usize, niches: usize) -> Self {
        Self {
            behavior_dim,
            batch_size: 200,
            initial_size: 200,
            generations: 1000,
            seed: 0,
            novelty: NoveltyParams::default(),
            container: ContainerConfig::Cvt {
                params: CvtParams {
                    niches,
                    ..CvtParams::default()
                },
                storage: StoreBackend::default(),
            },
            selector: Selector::default(),
        }
    }

    /// Validate the whole configuration, naming the first offending
    /// parameter.
    pub fn validate(&self) -> Result<()> {
        if self.behavior_dim == 0 {
            return Err(invalid("behavior_dim", "must be at least 1"));
        }
        if self.batch_size == 0 || self.batch_size % 2 != 0 {
            return Err(invalid("batch_size", "must be non-zero and even"));
        }
        if self.selector.is_pareto() && self.batch_size % 4 != 0 {
            return Err(invalid(
                "batch_size",
                "must be a multiple of 4 under Pareto selection",
            ));
        }
        if self.initial_size == 0 {
            return Err(invalid("initial_size", "must be at least 1"));
        }
        if self.novelty.k == 0 {
            return Err(invalid("novelty.k", "must be at least 1"));
        }
        if !(0.0..1.0).contains(&self.novelty.eps) {
            return Err(invalid("novelty.eps", "must be in [0, 1)"));
        }

        match &self.container {
            ContainerConfig::Archive { .. } => {
                if !self.novelty.l.is_finite() || self.novelty.l <= 0.0 {
                    return Err(invalid(
                        "novelty.l",
                        "must be finite and positive for an archive container",
                    ));
                }
            }
            ContainerConfig::Grid { shape } => {
                if shape.len() != self.behavior_dim {
                    return Err(invalid(
                        "container.shape",
                        "length must equal behavior_dim",
                    ));
                }
                if shape.iter().any(|&cells| cells < 2) {
                    return Err(invalid(
                        "container.shape",
                        "every dimension needs at least 2 cells",
                    ));
                }
            }
            ContainerConfig::Cvt { params, .. } => {
                if params.niches == 0 {
                    return Err(invalid("cvt.niches", "must be at least 1"));
                }
                if params.samples < params.niches {
                    return Err(invalid(
                        "cvt.samples",
                        "must be at least the number of niches",
                    ));
                }
                if params.max_iterations == 0 {
                    return Err(invalid("cvt.max_iterations", "must be at least 1"));
                }
                if params.restarts == 0 {
                    return Err(invalid("cvt.restarts", "must be at least 1"));
                }
                if !(params.tolerance > 0.0 && params.tolerance.is_finite()) {
                    return Err(invalid("cvt.tolerance", "must be finite and positive"));
                }
            }
        }
        Ok(())
    }
}

fn invalid(parameter: &'static str, reason: &str) -> QdError {
    QdError::InvalidConfig {
        parameter,
        reason: reason.to_string(),
    }
}
