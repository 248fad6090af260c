//! Unbounded novelty-gated archive.
//!
//! Admission keeps the archive sparse in behavior space: a candidate farther
//! than the threshold `l` from every stored solution opens a new region and
//! is admitted outright; a candidate inside an existing region has to beat
//! the incumbent nearest neighbor on a fitness/novelty trade-off to replace
//! it. The archive never shrinks except through replacement.

use rayon::prelude::*;

use behavior_core::store::NeighborStore;
use behavior_core::{euclidean_distance, DescriptorStore, StoreBackend};

use crate::config::NoveltyParams;
use crate::solution::SolutionRef;
use crate::Result;

/// `-1` for negative values, `+1` otherwise (zero counts as positive).
#[inline]
fn sign(x: f64) -> f64 {
    if x < 0.0 {
        -1.0
    } else {
        1.0
    }
}

#[derive(Debug)]
pub struct NoveltyArchive<G> {
    store: DescriptorStore<SolutionRef<G>>,
    params: NoveltyParams,
}

impl<G: Send + Sync> NoveltyArchive<G> {
    pub fn new(behavior_dim: usize, params: NoveltyParams, backend: StoreBackend) -> Self {
        Self {
            store: DescriptorStore::new(backend, behavior_dim),
            params,
        }
    }

    /// Offer a candidate to the archive.
    ///
    /// Dead candidates are always rejected. Otherwise:
    /// 1. empty archive, or nearest neighbor farther than `l`: admit;
    /// 2. single-member archive and the candidate is within `l`: reject;
    /// 3. closer than `(1 - eps) * l` to its *second* nearest neighbor:
    ///    reject (the region is already densely covered);
    /// 4. otherwise the candidate competes with its nearest neighbor on
    ///    (fitness, novelty): it must be within the eps-band on both
    ///    objectives and strictly ahead on the cross-multiplied trade-off.
    ///    Exact ties on both objectives keep the incumbent, which is what
    ///    makes re-adding a stored solution a no-op.
    pub fn add(&mut self, indiv: &SolutionRef<G>) -> Result<bool> {
        if indiv.dead() {
            return Ok(false);
        }
        if self.store.is_empty() {
            self.direct_add(indiv)?;
            return Ok(true);
        }

        let desc = indiv.descriptor().as_slice();
        let nearest_dist = euclidean_distance(desc, &self.store.nearest(desc).point);
        if nearest_dist > self.params.l {
            self.direct_add(indiv)?;
            return Ok(true);
        }
        if self.store.len() == 1 {
            return Ok(false);
        }

        let (second_dist, nn_point, nn_fitness) = {
            let neigh = self.store.knn(desc, 2);
            (
                euclidean_distance(desc, &neigh[1].point),
                neigh[0].point.clone(),
                neigh[0].value.fitness(),
            )
        };
        if second_dist < (1.0 - self.params.eps) * self.params.l {
            return Ok(false);
        }

        let cand_score = [indiv.fitness(), self.novelty(desc)];
        let nn_score = [nn_fitness, self.novelty(&nn_point)];

        let eps = self.params.eps;
        let within_band = cand_score[0] >= (1.0 - sign(nn_score[0]) * eps) * nn_score[0]
            && cand_score[1] >= (1.0 - sign(nn_score[1]) * eps) * nn_score[1];
        // cross-multiplied trade-off, avoids dividing by near-zero scores
        let trade_off = (cand_score[0] - nn_score[0]) * nn_score[1].abs()
            > -(cand_score[1] - nn_score[1]) * nn_score[0].abs();

        if within_band && trade_off {
            self.store.remove(&nn_point);
            self.direct_add(indiv)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Insert unless a solution with exactly this descriptor is stored.
    pub fn direct_add(&mut self, indiv: &SolutionRef<G>) -> Result<()> {
        let desc = indiv.descriptor();
        if !self.store.contains(desc) {
            self.store.insert(desc.clone(), indiv.clone())?;
        }
        Ok(())
    }

    /// Refresh novelty and local quality: archive members in parallel, then
    /// the offspring and parent batches.
    pub fn update(&mut self, offspring: &[SolutionRef<G>], parents: &[SolutionRef<G>]) {
        self.store.optimize();

        let members: Vec<SolutionRef<G>> =
            self.store.iter().map(|entry| entry.value.clone()).collect();
        let this = &*self;
        members
            .par_iter()
            .for_each(|indiv| this.update_metrics(indiv));
        for indiv in offspring {
            self.update_metrics(indiv);
        }
        for indiv in parents {
            self.update_metrics(indiv);
        }
    }

    /// Stored solutions in insertion order.
    pub fn content(&self) -> Vec<SolutionRef<G>> {
        self.store.iter().map(|entry| entry.value.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Mean distance over the neighborhood of `desc`.
    ///
    /// Queries k+1 neighbors (clamped to the archive size) and skips entries
    /// at exactly `desc`, so the same function serves both stored solutions
    /// (whose nearest neighbor is themselves) and outside candidates.
    fn novelty(&self, desc: &[f64]) -> f64 {
        self.nov_and_lq(desc, f64::NEG_INFINITY).0
    }

    fn nov_and_lq(&self, desc: &[f64], fitness: f64) -> (f64, f64) {
        debug_assert!(!self.store.is_empty());
        let m = (self.params.k + 1).min(self.store.len());
        let mut sum = 0.0;
        let mut worse = 0usize;
        for entry in self.store.knn(desc, m) {
            if entry.point.as_slice() == desc {
                continue;
            }
            sum += euclidean_distance(desc, &entry.point);
            if entry.value.fitness() < fitness {
                worse += 1;
            }
        }
        (sum / m as f64, worse as f64)
    }

    fn update_metrics(&self, indiv: &SolutionRef<G>) {
        if indiv.dead() {
            indiv.set_novelty(f64::NEG_INFINITY);
            indiv.set_local_quality(f64::NEG_INFINITY);
            return;
        }
        let (novelty, local_quality) =
            self.nov_and_lq(indiv.descriptor().as_slice(), indiv.fitness());
        indiv.set_novelty(novelty);
        indiv.set_local_quality(local_quality);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solution::{Evaluation, Solution};
    use std::sync::Arc;

    const L: f64 = 0.0075;

    fn params() -> NoveltyParams {
        NoveltyParams {
            l: L,
            k: 24,
            eps: 0.1,
            deep: 2,
        }
    }

    fn indiv(x: f64, y: f64, fitness: f64) -> SolutionRef<()> {
        Arc::new(Solution::new((), Evaluation::new(fitness, vec![x, y])))
    }

    fn archive(backend: StoreBackend) -> NoveltyArchive<()> {
        NoveltyArchive::new(2, params(), backend)
    }

    fn run_admission_sequence(mut archive: NoveltyArchive<()>) {
        // empty archive always admits
        let first = indiv(0.5, 0.5, 0.0);
        assert!(archive.add(&first).unwrap());

        // the same solution twice is never stored again
        assert!(!archive.add(&first).unwrap());
        assert_eq!(archive.len(), 1);

        // too close to the only member
        assert!(!archive.add(&indiv(0.5 + 0.5 * L, 0.5, 0.0)).unwrap());

        // far enough to open a new region
        assert!(archive.add(&indiv(0.5 + 1.1 * L, 0.5, 0.0)).unwrap());
        assert_eq!(archive.len(), 2);

        // between the two members with equal fitness: no strict trade-off
        // advantage over the nearest neighbor
        assert!(!archive.add(&indiv(0.5 + 0.95 * L, 0.5, 0.0)).unwrap());
        assert_eq!(archive.len(), 2);

        // same position as the nearest neighbor but better quality replaces
        assert!(archive.add(&indiv(0.5 + 1.1 * L, 0.5, 1.0)).unwrap());
        assert_eq!(archive.len(), 2);

        // slightly worse quality but clearly more novel also replaces
        assert!(archive.add(&indiv(0.5 + 1.4 * L, 0.5, 0.95)).unwrap());
        assert_eq!(archive.len(), 2);
    }

    #[test]
    fn test_admission_sequence_linear() {
        run_admission_sequence(archive(StoreBackend::LinearScan));
    }

    #[test]
    fn test_admission_sequence_kdtree() {
        run_admission_sequence(archive(StoreBackend::KdTree));
    }

    #[test]
    fn test_dead_is_rejected() {
        let mut archive = archive(StoreBackend::default());
        let dead: SolutionRef<()> = Arc::new(Solution::new((), Evaluation::dead()));
        assert!(!archive.add(&dead).unwrap());
        assert!(archive.is_empty());
    }

    #[test]
    fn test_early_reject_inside_dense_band() {
        let mut archive = archive(StoreBackend::default());
        assert!(archive.add(&indiv(0.5, 0.5, 0.0)).unwrap());
        assert!(archive.add(&indiv(0.5 + 1.1 * L, 0.5, 0.0)).unwrap());
        // second nearest neighbor at 0.6*l < (1-eps)*l = 0.9*l: early reject
        // regardless of fitness
        assert!(!archive.add(&indiv(0.5 + 0.5 * L, 0.5, 100.0)).unwrap());
        assert_eq!(archive.len(), 2);
    }

    #[test]
    fn test_equal_candidate_keeps_incumbent() {
        let mut archive = archive(StoreBackend::default());
        assert!(archive.add(&indiv(0.5, 0.5, 0.25)).unwrap());
        assert!(archive.add(&indiv(0.5 + 1.1 * L, 0.5, 0.25)).unwrap());
        // identical position and fitness: ties on both objectives, incumbent
        // stays
        assert!(!archive.add(&indiv(0.5 + 1.1 * L, 0.5, 0.25)).unwrap());
        assert_eq!(archive.len(), 2);
    }

    #[test]
    fn test_update_refreshes_metrics() {
        let mut archive = archive(StoreBackend::default());
        let a = indiv(0.1, 0.1, 0.0);
        let b = indiv(0.5, 0.5, 1.0);
        let c = indiv(0.9, 0.9, 2.0);
        for s in [&a, &b, &c] {
            assert!(archive.add(s).unwrap());
        }
        assert_eq!(a.novelty(), f64::NEG_INFINITY);

        archive.update(&[], &[]);
        // k=24 clamps to the archive size; three members see their two
        // real neighbors, divided by three
        let d = euclidean_distance(&[0.1, 0.1], &[0.5, 0.5]);
        assert!((b.novelty() - (2.0 * d) / 3.0).abs() < 1e-12);
        assert_eq!(a.local_quality(), 0.0);
        assert_eq!(b.local_quality(), 1.0);
        assert_eq!(c.local_quality(), 2.0);
    }

    #[test]
    fn test_update_pins_dead_batches() {
        let mut archive = archive(StoreBackend::default());
        assert!(archive.add(&indiv(0.2, 0.2, 0.0)).unwrap());
        let dead: SolutionRef<()> = Arc::new(Solution::new((), Evaluation::dead()));
        archive.update(&[dead.clone()], &[]);
        assert_eq!(dead.novelty(), f64::NEG_INFINITY);
        assert_eq!(dead.local_quality(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_content_in_insertion_order() {
        let mut archive = archive(StoreBackend::default());
        let points = [(0.1, 0.1), (0.5, 0.5), (0.9, 0.1)];
        for (x, y) in points {
            assert!(archive.add(&indiv(x, y, 0.0)).unwrap());
        }
        let content = archive.content();
        for (s, (x, y)) in content.iter().zip(points) {
            assert_eq!(s.descriptor().as_slice(), &[x, y]);
        }
    }
}
