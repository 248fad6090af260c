//! CVT (centroidal Voronoi tessellation) container.
//!
//! Behavior space is partitioned into a fixed number of niches around
//! precomputed centroids; each niche keeps the single fittest solution ever
//! routed to it. Centroids come from k-means over a uniform sample cloud,
//! fitted once per configuration and optionally cached to disk. Niche
//! lookup goes through the same nearest-neighbor store the archive uses,
//! so routing stays fast at high niche counts.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use behavior_core::simd::scale_simd;
use behavior_core::store::NeighborStore;
use behavior_core::{euclidean_distance, Descriptor, DescriptorStore, StoreBackend};

use crate::config::CvtParams;
use crate::solution::SolutionRef;
use crate::{QdError, Result};

#[derive(Debug)]
pub struct CvtContainer<G> {
    centroids: Vec<Descriptor>,
    /// Maps each centroid to its slot index for nearest-niche routing.
    lookup: DescriptorStore<usize>,
    slots: Vec<Option<SolutionRef<G>>>,
}

impl<G: Send + Sync> CvtContainer<G> {
    pub fn new(centroids: Vec<Descriptor>, backend: StoreBackend) -> Result<Self> {
        assert!(!centroids.is_empty(), "CVT container needs centroids");
        let mut lookup = DescriptorStore::new(backend, centroids[0].dim());
        for (niche, centroid) in centroids.iter().enumerate() {
            lookup.insert(centroid.clone(), niche)?;
        }
        let slots = vec![None; centroids.len()];
        Ok(Self {
            centroids,
            lookup,
            slots,
        })
    }

    /// Offer a candidate to its nearest niche. It is stored when the niche
    /// is empty or when it is strictly fitter than the occupant.
    pub fn add(&mut self, indiv: &SolutionRef<G>) -> bool {
        if indiv.dead() {
            return false;
        }
        let niche = self.lookup.nearest(indiv.descriptor().as_slice()).value;
        let admit = match &self.slots[niche] {
            None => true,
            Some(incumbent) => indiv.fitness() > incumbent.fitness(),
        };
        if admit {
            self.slots[niche] = Some(indiv.clone());
        }
        admit
    }

    /// Overwrite the candidate's niche regardless of fitness (restore paths).
    pub fn direct_add(&mut self, indiv: SolutionRef<G>) {
        let niche = self.lookup.nearest(indiv.descriptor().as_slice()).value;
        self.slots[niche] = Some(indiv);
    }

    /// Niches define membership, not a neighborhood, so there are no stored
    /// metrics to refresh.
    pub fn update(&self, _offspring: &[SolutionRef<G>], _parents: &[SolutionRef<G>]) {}

    /// Stored solutions in niche index order.
    pub fn content(&self) -> Vec<SolutionRef<G>> {
        self.slots.iter().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_none())
    }

    pub fn centroids(&self) -> &[Descriptor] {
        &self.centroids
    }
}

/// On-disk centroid cache.
#[derive(Serialize, Deserialize)]
struct CachedCentroids {
    dim: usize,
    centroids: Vec<Descriptor>,
}

/// Load centroids from the configured cache, or fit them with k-means and
/// write the cache back. A cache that exists but disagrees with the
/// configured geometry is an error, not a silent recompute.
pub(crate) fn load_or_compute_centroids(
    behavior_dim: usize,
    params: &CvtParams,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<Descriptor>> {
    if let Some(path) = &params.cache_path {
        if path.exists() {
            return load_cached(path, behavior_dim, params.niches);
        }
    }

    info!(
        niches = params.niches,
        dim = behavior_dim,
        samples = params.samples,
        "fitting CVT centroids"
    );
    let centroids = fit_centroids(behavior_dim, params, rng);

    if let Some(path) = &params.cache_path {
        if let Err(error) = store_cached(path, behavior_dim, &centroids) {
            warn!(path = %path.display(), %error, "centroid cache write failed");
        }
    }
    Ok(centroids)
}

fn load_cached(path: &Path, behavior_dim: usize, niches: usize) -> Result<Vec<Descriptor>> {
    let mismatch = |reason: String| QdError::CentroidCache {
        path: path.display().to_string(),
        reason,
    };
    let file = File::open(path)?;
    let cached: CachedCentroids = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| mismatch(format!("unreadable cache: {e}")))?;
    if cached.dim != behavior_dim {
        return Err(mismatch(format!(
            "cached for dimension {}, configured {}",
            cached.dim, behavior_dim
        )));
    }
    if cached.centroids.len() != niches {
        return Err(mismatch(format!(
            "cached {} niches, configured {}",
            cached.centroids.len(),
            niches
        )));
    }
    if cached.centroids.iter().any(|c| c.dim() != behavior_dim) {
        return Err(mismatch("ragged centroid rows".to_string()));
    }
    debug!(path = %path.display(), niches, "loaded centroid cache");
    Ok(cached.centroids)
}

fn store_cached(path: &Path, dim: usize, centroids: &[Descriptor]) -> Result<()> {
    let cached = CachedCentroids {
        dim,
        centroids: centroids.to_vec(),
    };
    let file = File::create(path)?;
    serde_json::to_writer(BufWriter::new(file), &cached)?;
    Ok(())
}

/// Best-of-restarts k-means over one shared uniform sample cloud.
fn fit_centroids(dim: usize, params: &CvtParams, rng: &mut ChaCha8Rng) -> Vec<Descriptor> {
    let samples: Vec<Descriptor> = (0..params.samples)
        .map(|_| Descriptor::new((0..dim).map(|_| rng.r#gen::<f64>()).collect()))
        .collect();

    let mut best_loss = f64::INFINITY;
    let mut best_centroids = Vec::new();
    for restart in 0..params.restarts {
        let (loss, centroids) = lloyd(&samples, params, rng);
        debug!(restart, loss, "k-means restart finished");
        if loss < best_loss {
            best_loss = loss;
            best_centroids = centroids;
        }
    }
    info!(loss = best_loss, "CVT centroids fitted");
    best_centroids
}

/// One k-means restart: the initial centroids are a shuffled draw of
/// distinct samples, then Lloyd iterations until the mean-distance loss
/// stops moving or the iteration cap is hit.
fn lloyd(
    samples: &[Descriptor],
    params: &CvtParams,
    rng: &mut ChaCha8Rng,
) -> (f64, Vec<Descriptor>) {
    let dim = samples[0].dim();
    let mut indices: Vec<usize> = (0..samples.len()).collect();
    indices.shuffle(rng);
    let mut centroids: Vec<Descriptor> = indices[..params.niches]
        .iter()
        .map(|&i| samples[i].clone())
        .collect();

    let mut prev_loss = 0.0;
    let mut loss = 0.0;
    for _ in 0..params.max_iterations {
        let assignments = assign(samples, &centroids);
        loss = assignments.iter().map(|a| a.distance).sum::<f64>() / samples.len() as f64;
        if (prev_loss - loss).abs() < params.tolerance {
            break;
        }
        prev_loss = loss;

        // move each centroid to the mean of its cluster; a cluster that
        // captured nothing keeps its previous position
        let mut sums = vec![vec![0.0; dim]; params.niches];
        let mut counts = vec![0usize; params.niches];
        for (sample, a) in samples.iter().zip(&assignments) {
            for (slot, &coord) in sums[a.niche].iter_mut().zip(sample.as_slice()) {
                *slot += coord;
            }
            counts[a.niche] += 1;
        }
        for (niche, &count) in counts.iter().enumerate() {
            if count > 0 {
                let mut mean = vec![0.0; dim];
                scale_simd(&sums[niche], 1.0 / count as f64, &mut mean);
                centroids[niche] = Descriptor::new(mean);
            }
        }
    }
    (loss, centroids)
}

struct Assignment {
    niche: usize,
    distance: f64,
}

/// Nearest-centroid assignment for every sample, ties to the lowest niche
/// index. Runs in parallel with a stable output order, so the accumulation
/// downstream is deterministic.
fn assign(samples: &[Descriptor], centroids: &[Descriptor]) -> Vec<Assignment> {
    samples
        .par_iter()
        .map(|sample| {
            let mut niche = 0usize;
            let mut best = f64::INFINITY;
            for (i, centroid) in centroids.iter().enumerate() {
                let d = euclidean_distance(sample.as_slice(), centroid.as_slice());
                if d < best {
                    best = d;
                    niche = i;
                }
                if best == 0.0 {
                    break;
                }
            }
            Assignment {
                niche,
                distance: best,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solution::{Evaluation, Solution};
    use rand::SeedableRng;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn indiv(desc: Vec<f64>, fitness: f64) -> SolutionRef<()> {
        Arc::new(Solution::new((), Evaluation::new(fitness, desc)))
    }

    fn two_niche_container() -> CvtContainer<()> {
        CvtContainer::new(
            vec![Descriptor::new(vec![0.25]), Descriptor::new(vec![0.75])],
            StoreBackend::default(),
        )
        .unwrap()
    }

    fn small_params(cache: Option<PathBuf>) -> CvtParams {
        CvtParams {
            niches: 8,
            samples: 512,
            max_iterations: 50,
            restarts: 2,
            tolerance: 1e-9,
            cache_path: cache,
        }
    }

    #[test]
    fn test_niche_replacement() {
        let mut cvt = two_niche_container();
        assert!(cvt.add(&indiv(vec![0.2], 0.0)));
        // same niche, strictly fitter: replaces
        assert!(cvt.add(&indiv(vec![0.3], 1.0)));
        assert_eq!(cvt.len(), 1);
        // equal fitness is not enough
        assert!(!cvt.add(&indiv(vec![0.26], 1.0)));
        assert!(cvt.add(&indiv(vec![0.8], 0.5)));
        assert_eq!(cvt.len(), 2);
        let fitnesses: Vec<f64> = cvt.content().iter().map(|s| s.fitness()).collect();
        assert_eq!(fitnesses, vec![1.0, 0.5]);
    }

    #[test]
    fn test_equidistant_descriptor_takes_first_niche() {
        let mut cvt = two_niche_container();
        assert!(cvt.add(&indiv(vec![0.5], 9.0)));
        assert!(cvt.add(&indiv(vec![0.8], 1.0)));
        let fitnesses: Vec<f64> = cvt.content().iter().map(|s| s.fitness()).collect();
        assert_eq!(fitnesses, vec![9.0, 1.0]);
    }

    #[test]
    fn test_dead_is_rejected() {
        let mut cvt = two_niche_container();
        let dead: SolutionRef<()> = Arc::new(Solution::new((), Evaluation::dead()));
        assert!(!cvt.add(&dead));
        assert!(cvt.is_empty());
    }

    #[test]
    fn test_direct_add_bypasses_fitness() {
        let mut cvt = two_niche_container();
        assert!(cvt.add(&indiv(vec![0.2], 5.0)));
        cvt.direct_add(indiv(vec![0.3], 1.0));
        assert_eq!(cvt.len(), 1);
        assert_eq!(cvt.content()[0].fitness(), 1.0);
    }

    #[test]
    fn test_kmeans_is_deterministic() {
        let params = small_params(None);
        let a =
            load_or_compute_centroids(2, &params, &mut ChaCha8Rng::seed_from_u64(11)).unwrap();
        let b =
            load_or_compute_centroids(2, &params, &mut ChaCha8Rng::seed_from_u64(11)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert!(a
            .iter()
            .all(|c| c.iter().all(|&x| (0.0..=1.0).contains(&x))));
    }

    #[test]
    fn test_kmeans_spreads_centroids() {
        // uniform samples on a line, two niches: the centroids settle in
        // opposite halves, near 1/4 and 3/4
        let params = CvtParams {
            niches: 2,
            samples: 1024,
            max_iterations: 100,
            restarts: 1,
            tolerance: 1e-9,
            cache_path: None,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut centroids = load_or_compute_centroids(1, &params, &mut rng).unwrap();
        centroids.sort_by(|a, b| a[0].partial_cmp(&b[0]).unwrap());
        assert!(centroids[0][0] < 0.45);
        assert!(centroids[1][0] > 0.55);
    }

    #[test]
    fn test_centroid_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("centroids.json");
        let params = small_params(Some(path.clone()));

        let computed =
            load_or_compute_centroids(2, &params, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        assert!(path.exists());
        // a different seed must not matter once the cache exists
        let cached =
            load_or_compute_centroids(2, &params, &mut ChaCha8Rng::seed_from_u64(2)).unwrap();
        assert_eq!(computed, cached);
    }

    #[test]
    fn test_centroid_cache_mismatch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("centroids.json");
        load_or_compute_centroids(
            2,
            &small_params(Some(path.clone())),
            &mut ChaCha8Rng::seed_from_u64(1),
        )
        .unwrap();

        let mut wrong_niches = small_params(Some(path.clone()));
        wrong_niches.niches = 9;
        assert!(matches!(
            load_or_compute_centroids(2, &wrong_niches, &mut ChaCha8Rng::seed_from_u64(1)),
            Err(QdError::CentroidCache { .. })
        ));
        assert!(matches!(
            load_or_compute_centroids(3, &small_params(Some(path)), &mut ChaCha8Rng::seed_from_u64(1)),
            Err(QdError::CentroidCache { .. })
        ));
    }
}
