//! Fixed-grid container.
//!
//! Behavior space is the unit hypercube, discretized into a configured
//! number of cells per dimension. Each cell holds at most one solution: a
//! candidate routed to an occupied cell must strictly beat the incumbent's
//! fitness, or tie it from a position closer to the cell center. Novelty is
//! local here: the negated count of occupied cells within a window of
//! `deep` cells per axis, not a global k-NN query.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::solution::SolutionRef;

#[derive(Debug)]
pub struct GridContainer<G> {
    shape: Vec<usize>,
    deep: usize,
    /// Occupied cells, keyed by cell coordinates. The map order makes
    /// `content` deterministic.
    cells: BTreeMap<Vec<usize>, SolutionRef<G>>,
}

impl<G: Send + Sync> GridContainer<G> {
    pub fn new(shape: Vec<usize>, deep: usize) -> Self {
        debug_assert!(shape.iter().all(|&cells| cells >= 2));
        Self {
            shape,
            deep,
            cells: BTreeMap::new(),
        }
    }

    /// Offer a candidate to its cell.
    ///
    /// Dead candidates are always rejected. The candidate is stored when its
    /// cell is empty, when it is strictly fitter than the incumbent, or when
    /// it ties the incumbent's fitness from closer to the cell center.
    pub fn add(&mut self, indiv: &SolutionRef<G>) -> bool {
        if indiv.dead() {
            return false;
        }
        let cell = self.cell_of(indiv.descriptor().as_slice());
        let admit = match self.cells.get(&cell) {
            None => true,
            Some(incumbent) => {
                let diff = indiv.fitness() - incumbent.fitness();
                diff > 0.0
                    || (diff == 0.0
                        && self.distance_to_center(indiv.descriptor().as_slice())
                            < self.distance_to_center(incumbent.descriptor().as_slice()))
            }
        };
        if admit {
            self.cells.insert(cell, indiv.clone());
        }
        admit
    }

    /// Overwrite the candidate's cell regardless of fitness (restore paths).
    pub fn direct_add(&mut self, indiv: SolutionRef<G>) {
        let cell = self.cell_of(indiv.descriptor().as_slice());
        self.cells.insert(cell, indiv);
    }

    /// Refresh novelty and local quality: stored solutions in parallel, then
    /// the offspring and parent batches.
    pub fn update(&self, offspring: &[SolutionRef<G>], parents: &[SolutionRef<G>]) {
        let members: Vec<&SolutionRef<G>> = self.cells.values().collect();
        members
            .par_iter()
            .for_each(|indiv| self.update_metrics(indiv));
        for indiv in offspring {
            self.update_metrics(indiv);
        }
        for indiv in parents {
            self.update_metrics(indiv);
        }
    }

    /// Stored solutions in cell lexicographic order.
    pub fn content(&self) -> Vec<SolutionRef<G>> {
        self.cells.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell coordinates for a descriptor, each axis clamped to [0, 1] and
    /// rounded to the nearest cell.
    fn cell_of(&self, desc: &[f64]) -> Vec<usize> {
        debug_assert_eq!(desc.len(), self.shape.len());
        self.shape
            .iter()
            .zip(desc)
            .map(|(&cells, &coord)| (coord.clamp(0.0, 1.0) * (cells - 1) as f64).round() as usize)
            .collect()
    }

    /// Distance from a descriptor to the center of its own cell.
    fn distance_to_center(&self, desc: &[f64]) -> f64 {
        let mut sum = 0.0;
        for (&cells, &coord) in self.shape.iter().zip(desc) {
            let steps = (cells - 1) as f64;
            let p = coord.clamp(0.0, 1.0);
            let center = (p * steps).round() / steps;
            sum += (p - center) * (p - center);
        }
        sum.sqrt()
    }

    fn update_metrics(&self, indiv: &SolutionRef<G>) {
        if indiv.dead() {
            indiv.set_novelty(f64::NEG_INFINITY);
            indiv.set_local_quality(f64::NEG_INFINITY);
            return;
        }
        let mut filled = 0usize;
        let mut worse = 0usize;
        self.visit_window(&self.cell_of(indiv.descriptor().as_slice()), |neighbor| {
            filled += 1;
            if neighbor.fitness() < indiv.fitness() {
                worse += 1;
            }
        });
        indiv.set_novelty(-(filled as f64));
        indiv.set_local_quality(worse as f64);
    }

    /// Visit every stored solution within `deep` cells of `center` on each
    /// axis, the center cell included. Window bounds clamp at the grid edge.
    fn visit_window(&self, center: &[usize], mut visit: impl FnMut(&SolutionRef<G>)) {
        let lo: Vec<usize> = center
            .iter()
            .map(|&c| c.saturating_sub(self.deep))
            .collect();
        let hi: Vec<usize> = center
            .iter()
            .zip(&self.shape)
            .map(|(&c, &cells)| (c + self.deep).min(cells - 1))
            .collect();

        let mut cursor = lo.clone();
        'cells: loop {
            if let Some(member) = self.cells.get(&cursor) {
                visit(member);
            }
            for axis in (0..cursor.len()).rev() {
                if cursor[axis] < hi[axis] {
                    cursor[axis] += 1;
                    continue 'cells;
                }
                cursor[axis] = lo[axis];
            }
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solution::{Evaluation, Solution};
    use std::sync::Arc;

    fn indiv(x: f64, y: f64, fitness: f64) -> SolutionRef<()> {
        Arc::new(Solution::new((), Evaluation::new(fitness, vec![x, y])))
    }

    fn grid() -> GridContainer<()> {
        GridContainer::new(vec![10, 10], 1)
    }

    #[test]
    fn test_routing_to_cells() {
        let mut grid = grid();
        assert!(grid.add(&indiv(0.0, 0.0, 0.0)));
        assert!(grid.add(&indiv(1.0, 1.0, 0.0)));
        // 0.04 * 9 rounds to cell 0, already held by a fitter solution
        assert!(!grid.add(&indiv(0.04, 0.0, -1.0)));
        assert_eq!(grid.len(), 2);
        // 0.06 * 9 rounds to cell 1
        assert!(grid.add(&indiv(0.06, 0.0, -1.0)));
        assert_eq!(grid.len(), 3);
        // out-of-range coordinates clamp to the boundary cells
        assert!(grid.add(&indiv(1.2, -0.3, 0.0)));
        assert_eq!(grid.len(), 4);
    }

    #[test]
    fn test_cell_uniqueness() {
        let mut grid = grid();
        let low = indiv(0.47, 0.47, 1.0);
        let high = indiv(0.45, 0.45, 2.0);
        // both round to cell (4, 4)
        assert!(grid.add(&low));
        assert!(grid.add(&high));
        assert_eq!(grid.len(), 1);
        assert!(Arc::ptr_eq(&grid.content()[0], &high));
        assert!(!grid.add(&low));
    }

    #[test]
    fn test_tie_goes_to_cell_center() {
        let mut grid = grid();
        let off_center = indiv(0.47, 0.47, 1.0);
        let near_center = indiv(0.45, 0.45, 1.0);
        assert!(grid.add(&off_center));
        // equal fitness, but closer to the cell center at 4/9
        assert!(grid.add(&near_center));
        assert_eq!(grid.len(), 1);
        assert!(Arc::ptr_eq(&grid.content()[0], &near_center));
        // the farther solution cannot win the tie back
        assert!(!grid.add(&off_center));
    }

    #[test]
    fn test_dead_is_rejected() {
        let mut grid = grid();
        let dead: SolutionRef<()> = Arc::new(Solution::new((), Evaluation::dead()));
        assert!(!grid.add(&dead));
        assert!(grid.is_empty());
    }

    #[test]
    fn test_window_novelty() {
        let mut grid = GridContainer::new(vec![8, 8], 1);
        let step = 1.0 / 7.0;
        let a = indiv(0.0, 0.0, 2.0);
        let b = indiv(0.0, step, 1.0);
        let c = indiv(step, step, 3.0);
        let d = indiv(5.0 * step, 5.0 * step, 0.0);
        for s in [&a, &b, &c, &d] {
            assert!(grid.add(s));
        }
        grid.update(&[], &[]);

        // the three corner cells all see each other in a radius-1 window;
        // the (5, 5) cell sees only itself
        assert_eq!(a.novelty(), -3.0);
        assert_eq!(b.novelty(), -3.0);
        assert_eq!(c.novelty(), -3.0);
        assert_eq!(d.novelty(), -1.0);

        assert_eq!(a.local_quality(), 1.0);
        assert_eq!(b.local_quality(), 0.0);
        assert_eq!(c.local_quality(), 2.0);
        assert_eq!(d.local_quality(), 0.0);
    }

    #[test]
    fn test_update_covers_rejected_offspring() {
        let mut grid = GridContainer::new(vec![8, 8], 1);
        let kept = indiv(0.0, 0.0, 5.0);
        assert!(grid.add(&kept));
        let rejected = indiv(0.0, 0.0, 1.0);
        assert!(!grid.add(&rejected));
        let dead: SolutionRef<()> = Arc::new(Solution::new((), Evaluation::dead()));
        grid.update(&[rejected.clone(), dead.clone()], &[]);
        // the rejected offspring still sees the incumbent in its window
        assert_eq!(rejected.novelty(), -1.0);
        assert_eq!(rejected.local_quality(), 0.0);
        assert_eq!(dead.novelty(), f64::NEG_INFINITY);
        assert_eq!(dead.local_quality(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_content_in_cell_order() {
        let mut grid = grid();
        for s in [
            indiv(0.9, 0.9, 3.0),
            indiv(0.0, 0.5, 1.0),
            indiv(0.0, 0.0, 2.0),
        ] {
            assert!(grid.add(&s));
        }
        let fitnesses: Vec<f64> = grid.content().iter().map(|s| s.fitness()).collect();
        assert_eq!(fitnesses, vec![2.0, 1.0, 3.0]);
    }

    #[test]
    fn test_direct_add_bypasses_fitness() {
        let mut grid = grid();
        assert!(grid.add(&indiv(0.45, 0.45, 9.0)));
        grid.direct_add(indiv(0.47, 0.47, 1.0));
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.content()[0].fitness(), 1.0);
    }
}
