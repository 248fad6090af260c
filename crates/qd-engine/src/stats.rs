//! Per-generation run statistics.

use crate::solution::SolutionRef;

/// Summary of the container after one generation.
///
/// `qd_score` is the sum of stored fitness, the usual single-number view of
/// a quality-diversity run (coverage and quality together). On an empty
/// container `best_fitness` is negative infinity and the means are zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationStats {
    pub generation: u64,
    pub container_size: usize,
    pub best_fitness: f64,
    pub mean_fitness: f64,
    pub qd_score: f64,
    pub mean_novelty: f64,
    /// Offspring admitted this generation.
    pub added: usize,
}

impl GenerationStats {
    pub fn from_population<G>(
        generation: u64,
        added: usize,
        population: &[SolutionRef<G>],
    ) -> Self {
        let mut best = f64::NEG_INFINITY;
        let mut fitness_sum = 0.0;
        let mut novelty_sum = 0.0;
        for s in population {
            best = best.max(s.fitness());
            fitness_sum += s.fitness();
            novelty_sum += s.novelty();
        }
        let (mean_fitness, mean_novelty) = if population.is_empty() {
            (0.0, 0.0)
        } else {
            let n = population.len() as f64;
            (fitness_sum / n, novelty_sum / n)
        };
        Self {
            generation,
            container_size: population.len(),
            best_fitness: best,
            mean_fitness,
            qd_score: fitness_sum,
            mean_novelty,
            added,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solution::{Evaluation, Solution};
    use std::sync::Arc;

    #[test]
    fn test_summary_over_population() {
        let population: Vec<SolutionRef<()>> = [1.0, 3.0, 2.0]
            .iter()
            .map(|&f| {
                let s = Arc::new(Solution::new((), Evaluation::new(f, vec![0.5])));
                s.set_novelty(f * 10.0);
                s
            })
            .collect();
        let stats = GenerationStats::from_population(7, 2, &population);
        assert_eq!(stats.generation, 7);
        assert_eq!(stats.container_size, 3);
        assert_eq!(stats.best_fitness, 3.0);
        assert_eq!(stats.mean_fitness, 2.0);
        assert_eq!(stats.qd_score, 6.0);
        assert_eq!(stats.mean_novelty, 20.0);
        assert_eq!(stats.added, 2);
    }

    #[test]
    fn test_empty_population() {
        let stats = GenerationStats::from_population::<()>(0, 0, &[]);
        assert_eq!(stats.container_size, 0);
        assert_eq!(stats.best_fitness, f64::NEG_INFINITY);
        assert_eq!(stats.mean_fitness, 0.0);
        assert_eq!(stats.qd_score, 0.0);
    }
}
