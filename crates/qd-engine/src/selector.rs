//! Parent selection strategies.
//!
//! Every generation the engine fills a batch of parent slots by sampling
//! from its current pools: the population (mirroring container content) or
//! the parent and offspring batches of the previous generation. Variants
//! differ only in the sampling distribution. All of them fall back to fresh
//! random genotypes while the pools are still empty.

use std::cmp::Ordering;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::solution::{Solution, SolutionRef};

/// Scalar score a selector can rank solutions by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionMetric {
    Fitness,
    Novelty,
    Curiosity,
    LocalQuality,
}

impl SelectionMetric {
    pub fn value<G>(&self, s: &Solution<G>) -> f64 {
        match self {
            Self::Fitness => s.fitness(),
            Self::Novelty => s.novelty(),
            Self::Curiosity => s.curiosity(),
            Self::LocalQuality => s.local_quality(),
        }
    }
}

/// Which pool a selector draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionPool {
    /// The current population, mirroring container content.
    Container,
    /// The parent and offspring batches of the previous generation.
    ParentsAndOffspring,
}

/// Read-only view of the pools a selector may draw from.
pub struct PoolView<'a, G> {
    pub population: &'a [SolutionRef<G>],
    pub parents: &'a [SolutionRef<G>],
    pub offspring: &'a [SolutionRef<G>],
}

impl<G> PoolView<'_, G> {
    fn gather(&self, pool: SelectionPool) -> Vec<SolutionRef<G>> {
        match pool {
            SelectionPool::Container => self.population.to_vec(),
            SelectionPool::ParentsAndOffspring => {
                let mut members =
                    Vec::with_capacity(self.parents.len() + self.offspring.len());
                members.extend_from_slice(self.parents);
                members.extend_from_slice(self.offspring);
                members
            }
        }
    }
}

/// Parent selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selector {
    /// Uniform draw (MAP-Elites style).
    Uniform { pool: SelectionPool },
    /// Two uniform draws; the higher metric wins, ties go to the second.
    Tournament {
        metric: SelectionMetric,
        pool: SelectionPool,
    },
    /// Roulette wheel weighted by the metric, shifted to be non-negative.
    ScoreProportionate {
        metric: SelectionMetric,
        pool: SelectionPool,
    },
    /// NSGA-II style rank and crowding over two metrics, drawing from the
    /// parent and offspring batches.
    Pareto { objectives: [SelectionMetric; 2] },
    /// Fresh random genotypes every generation (random-search baseline).
    FreshRandom,
}

impl Default for Selector {
    fn default() -> Self {
        Self::Uniform {
            pool: SelectionPool::Container,
        }
    }
}

impl Selector {
    pub fn is_pareto(&self) -> bool {
        matches!(self, Self::Pareto { .. })
    }

    /// Fill `count` parent slots. `fresh` supplies an unevaluated random
    /// solution; it serves the random-search baseline and the
    /// generation-zero case where every pool is still empty.
    pub fn select<G, F>(
        &self,
        count: usize,
        pools: &PoolView<'_, G>,
        rng: &mut ChaCha8Rng,
        mut fresh: F,
    ) -> Vec<SolutionRef<G>>
    where
        F: FnMut(&mut ChaCha8Rng) -> SolutionRef<G>,
    {
        let members = match self {
            Self::FreshRandom => Vec::new(),
            Self::Uniform { pool }
            | Self::Tournament { pool, .. }
            | Self::ScoreProportionate { pool, .. } => pools.gather(*pool),
            Self::Pareto { .. } => pools.gather(SelectionPool::ParentsAndOffspring),
        };
        if members.is_empty() {
            return (0..count).map(|_| fresh(rng)).collect();
        }

        match self {
            Self::Uniform { .. } => uniform(count, &members, rng),
            Self::Tournament { metric, .. } => tournament(count, *metric, &members, rng),
            Self::ScoreProportionate { metric, .. } => roulette(count, *metric, &members, rng),
            Self::Pareto { objectives } => pareto(count, *objectives, &members, rng),
            Self::FreshRandom => (0..count).map(|_| fresh(rng)).collect(),
        }
    }
}

fn uniform<G>(
    count: usize,
    members: &[SolutionRef<G>],
    rng: &mut ChaCha8Rng,
) -> Vec<SolutionRef<G>> {
    (0..count)
        .map(|_| members[rng.gen_range(0..members.len())].clone())
        .collect()
}

fn tournament<G>(
    count: usize,
    metric: SelectionMetric,
    members: &[SolutionRef<G>],
    rng: &mut ChaCha8Rng,
) -> Vec<SolutionRef<G>> {
    (0..count)
        .map(|_| {
            let a = &members[rng.gen_range(0..members.len())];
            let b = &members[rng.gen_range(0..members.len())];
            if metric.value(a) > metric.value(b) {
                a.clone()
            } else {
                b.clone()
            }
        })
        .collect()
}

/// Roulette wheel over `metric`. Weights are shifted by `min(0, lowest
/// score)`, so all-positive scores stay untouched while negative scores
/// (curiosity debits) become valid weights.
fn roulette<G>(
    count: usize,
    metric: SelectionMetric,
    members: &[SolutionRef<G>],
    rng: &mut ChaCha8Rng,
) -> Vec<SolutionRef<G>> {
    let min = members
        .iter()
        .map(|s| metric.value(s))
        .fold(0.0, f64::min);
    let sum: f64 = members.iter().map(|s| metric.value(s) - min).sum();
    (0..count)
        .map(|_| {
            let mut r = if sum > 0.0 {
                rng.gen_range(0.0..sum)
            } else {
                0.0
            };
            let mut chosen = members.len() - 1;
            for (i, s) in members.iter().enumerate() {
                let weight = metric.value(s) - min;
                if weight >= r {
                    chosen = i;
                    break;
                }
                r -= weight;
            }
            members[chosen].clone()
        })
        .collect()
}

/// NSGA-II style selection: non-dominated sort of the pool, survivors by
/// whole fronts plus the crowding-sorted remainder of the boundary front,
/// then crowded tournaments over two shuffled index passes, four winners
/// per window.
fn pareto<G>(
    count: usize,
    objectives: [SelectionMetric; 2],
    members: &[SolutionRef<G>],
    rng: &mut ChaCha8Rng,
) -> Vec<SolutionRef<G>> {
    if count == 0 {
        return Vec::new();
    }
    let scores: Vec<[f64; 2]> = members
        .iter()
        .map(|s| [objectives[0].value(s), objectives[1].value(s)])
        .collect();
    let fronts = nondominated_fronts(&scores);
    let crowds = crowding_distances(&scores, &fronts);

    let mut survivors: Vec<usize> = Vec::with_capacity(count);
    for front in &fronts {
        if survivors.len() + front.len() < count {
            survivors.extend_from_slice(front);
        } else {
            let mut boundary = front.clone();
            boundary.sort_by(|&a, &b| {
                crowds[b].partial_cmp(&crowds[a]).unwrap_or(Ordering::Equal)
            });
            boundary.truncate(count - survivors.len());
            survivors.extend(boundary);
            break;
        }
    }

    let mut a1: Vec<usize> = (0..survivors.len()).collect();
    let mut a2 = a1.clone();
    a1.shuffle(rng);
    a2.shuffle(rng);

    let s = survivors.len();
    let pick = |i: usize, j: usize, rng: &mut ChaCha8Rng| -> usize {
        let (a, b) = (survivors[i], survivors[j]);
        match dominance(&scores[a], &scores[b]) {
            Ordering::Greater => a,
            Ordering::Less => b,
            Ordering::Equal => {
                if crowds[a] > crowds[b] {
                    a
                } else if crowds[a] < crowds[b] {
                    b
                } else if rng.gen_bool(0.5) {
                    a
                } else {
                    b
                }
            }
        }
    };

    // indices wrap when the pool is smaller than the batch; inside the
    // engine loop the survivor set always matches the batch size
    let mut out = Vec::with_capacity(count);
    let mut base = 0usize;
    while out.len() < count {
        for perm in [&a1, &a2] {
            for pair in [base, base + 2] {
                if out.len() == count {
                    break;
                }
                let winner = pick(perm[pair % s], perm[(pair + 1) % s], rng);
                out.push(members[winner].clone());
            }
        }
        base += 4;
    }
    out
}

/// Pareto dominance on maximized objectives: `Greater` when `a` is at
/// least as good everywhere and strictly better somewhere.
fn dominance(a: &[f64; 2], b: &[f64; 2]) -> Ordering {
    let mut a_better = false;
    let mut b_better = false;
    for k in 0..2 {
        if a[k] > b[k] {
            a_better = true;
        } else if a[k] < b[k] {
            b_better = true;
        }
    }
    match (a_better, b_better) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

/// Fast non-dominated sort. Front 0 holds the non-dominated members; each
/// later front becomes non-dominated once the earlier ones are removed.
fn nondominated_fronts(scores: &[[f64; 2]]) -> Vec<Vec<usize>> {
    let n = scores.len();
    let mut dominates: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut dominated_count = vec![0usize; n];
    for i in 0..n {
        for j in (i + 1)..n {
            match dominance(&scores[i], &scores[j]) {
                Ordering::Greater => {
                    dominates[i].push(j);
                    dominated_count[j] += 1;
                }
                Ordering::Less => {
                    dominates[j].push(i);
                    dominated_count[i] += 1;
                }
                Ordering::Equal => {}
            }
        }
    }

    let mut fronts: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&i| dominated_count[i] == 0).collect();
    while !current.is_empty() {
        let mut next = Vec::new();
        for &i in &current {
            for &j in &dominates[i] {
                dominated_count[j] -= 1;
                if dominated_count[j] == 0 {
                    next.push(j);
                }
            }
        }
        fronts.push(std::mem::replace(&mut current, next));
    }
    fronts
}

/// NSGA-II crowding distance. Boundary members of each front get infinity;
/// interior members the neighbor span along each objective, normalized by
/// the front's extent.
fn crowding_distances(scores: &[[f64; 2]], fronts: &[Vec<usize>]) -> Vec<f64> {
    let mut crowds = vec![0.0; scores.len()];
    for front in fronts {
        if front.len() == 1 {
            crowds[front[0]] = f64::INFINITY;
            continue;
        }
        for k in 0..2 {
            let mut order = front.clone();
            order.sort_by(|&a, &b| {
                scores[a][k]
                    .partial_cmp(&scores[b][k])
                    .unwrap_or(Ordering::Equal)
            });
            let lo = scores[order[0]][k];
            let hi = scores[order[order.len() - 1]][k];
            crowds[order[0]] = f64::INFINITY;
            crowds[order[order.len() - 1]] = f64::INFINITY;
            if hi - lo == 0.0 {
                continue;
            }
            for w in order.windows(3) {
                crowds[w[1]] += (scores[w[2]][k] - scores[w[0]][k]) / (hi - lo);
            }
        }
    }
    crowds
}
