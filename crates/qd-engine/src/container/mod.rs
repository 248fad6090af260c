//! Container strategies.
//!
//! A container is the authoritative store of retained solutions. Three
//! strategies implement the same narrow interface (`add`, `direct_add`,
//! `update`, `content`, `len`), resolved at configuration time through the
//! [`Container`] enum so the per-candidate admission path stays free of
//! virtual dispatch:
//!
//! - [`NoveltyArchive`]: unbounded, admission gated by a novelty threshold
//!   and a local quality/novelty trade-off
//! - [`GridContainer`]: one solution per cell of a fixed behavior grid
//! - [`CvtContainer`]: one solution per precomputed Voronoi niche
//!
//! `add` applies the strategy's admission policy and reports whether the
//! candidate was stored. `direct_add` bypasses the policy (bulk restore
//! paths). `update` runs once per generation after the batch has been
//! offered, refreshing the stored solutions' metrics and those of the
//! offspring and parent batches.

pub mod archive;
pub mod cvt;
pub mod grid;

pub use archive::NoveltyArchive;
pub use cvt::CvtContainer;
pub use grid::GridContainer;

use rand_chacha::ChaCha8Rng;

use behavior_core::Descriptor;

use crate::config::{ContainerConfig, QdConfig};
use crate::solution::SolutionRef;
use crate::{QdError, Result};

/// A container strategy resolved from configuration.
#[derive(Debug)]
pub enum Container<G> {
    Archive(NoveltyArchive<G>),
    Grid(GridContainer<G>),
    Cvt(CvtContainer<G>),
}

impl<G: Send + Sync> Container<G> {
    /// Build the configured container. CVT construction may run k-means,
    /// drawing from `rng`.
    pub fn from_config(config: &QdConfig, rng: &mut ChaCha8Rng) -> Result<Self> {
        match &config.container {
            ContainerConfig::Archive { storage } => Ok(Self::Archive(NoveltyArchive::new(
                config.behavior_dim,
                config.novelty,
                *storage,
            ))),
            ContainerConfig::Grid { shape } => Ok(Self::Grid(GridContainer::new(
                shape.clone(),
                config.novelty.deep,
            ))),
            ContainerConfig::Cvt { params, storage } => {
                let centroids =
                    cvt::load_or_compute_centroids(config.behavior_dim, params, rng)?;
                Ok(Self::Cvt(CvtContainer::new(centroids, *storage)?))
            }
        }
    }

    /// Rebuild an empty container for a resume: same strategy as
    /// [`Container::from_config`], but CVT centroids come from the snapshot
    /// rather than from k-means.
    pub(crate) fn from_snapshot_parts(
        config: &QdConfig,
        centroids: Option<Vec<Descriptor>>,
    ) -> Result<Self> {
        match &config.container {
            ContainerConfig::Archive { storage } => Ok(Self::Archive(NoveltyArchive::new(
                config.behavior_dim,
                config.novelty,
                *storage,
            ))),
            ContainerConfig::Grid { shape } => Ok(Self::Grid(GridContainer::new(
                shape.clone(),
                config.novelty.deep,
            ))),
            ContainerConfig::Cvt { storage, .. } => {
                let centroids = centroids
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        QdError::SnapshotMismatch(
                            "snapshot carries no centroids for a CVT configuration".to_string(),
                        )
                    })?;
                Ok(Self::Cvt(CvtContainer::new(centroids, *storage)?))
            }
        }
    }

    /// Offer a candidate under the admission policy.
    pub fn add(&mut self, indiv: &SolutionRef<G>) -> Result<bool> {
        match self {
            Self::Archive(c) => c.add(indiv),
            Self::Grid(c) => Ok(c.add(indiv)),
            Self::Cvt(c) => Ok(c.add(indiv)),
        }
    }

    /// Insert bypassing the admission policy (restore paths).
    pub fn direct_add(&mut self, indiv: SolutionRef<G>) -> Result<()> {
        match self {
            Self::Archive(c) => c.direct_add(&indiv),
            Self::Grid(c) => {
                c.direct_add(indiv);
                Ok(())
            }
            Self::Cvt(c) => {
                c.direct_add(indiv);
                Ok(())
            }
        }
    }

    /// Per-generation metric refresh over stored solutions and the current
    /// batches.
    pub fn update(&mut self, offspring: &[SolutionRef<G>], parents: &[SolutionRef<G>]) {
        match self {
            Self::Archive(c) => c.update(offspring, parents),
            Self::Grid(c) => c.update(offspring, parents),
            Self::Cvt(c) => c.update(offspring, parents),
        }
    }

    /// All stored solutions, in the strategy's deterministic order.
    pub fn content(&self) -> Vec<SolutionRef<G>> {
        match self {
            Self::Archive(c) => c.content(),
            Self::Grid(c) => c.content(),
            Self::Cvt(c) => c.content(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Archive(c) => c.len(),
            Self::Grid(c) => c.len(),
            Self::Cvt(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// CVT centroids, when the strategy has them (snapshotting).
    pub fn centroids(&self) -> Option<&[Descriptor]> {
        match self {
            Self::Cvt(c) => Some(c.centroids()),
            _ => None,
        }
    }
}
