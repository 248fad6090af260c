//! The generational loop: select, vary, evaluate, admit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::QdConfig;
use crate::container::Container;
use crate::selector::PoolView;
use crate::solution::{Evaluation, Solution, SolutionRef};
use crate::stats::GenerationStats;
use crate::{QdError, Result};

/// Maps a genotype to fitness and a behavior descriptor. Batch members are
/// evaluated in parallel, so implementations must not share mutable state.
pub trait Evaluator<G>: Send + Sync {
    fn evaluate(&self, genotype: &G) -> Evaluation;
}

/// Supplies fresh genotypes and the variation operators. Calls always come
/// from the engine thread with the engine's own random stream, one at a
/// time, which keeps runs reproducible for a given seed.
pub trait VariationOperator<G>: Send + Sync {
    fn random(&self, rng: &mut ChaCha8Rng) -> G;
    fn cross(&self, a: &G, b: &G, rng: &mut ChaCha8Rng) -> (G, G);
    fn mutate(&self, genotype: G, rng: &mut ChaCha8Rng) -> G;
}

/// Engine lifecycle. `epoch` is only legal in `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Running,
    Stopped,
}

/// Quality-diversity engine over genotype `G`.
///
/// Owns the container, the population views and the random stream. The
/// stored population mirrors the container content after every generation;
/// `parents` and `offspring` share handles with container members, so
/// curiosity credit lands on the stored solutions.
pub struct QdEngine<G, V, E> {
    config: QdConfig,
    container: Container<G>,
    variation: V,
    evaluator: E,
    rng: ChaCha8Rng,
    state: EngineState,
    generation: u64,
    population: Vec<SolutionRef<G>>,
    parents: Vec<SolutionRef<G>>,
    offspring: Vec<SolutionRef<G>>,
    stop: Arc<AtomicBool>,
}

impl<G, V, E> QdEngine<G, V, E>
where
    G: Send + Sync,
    V: VariationOperator<G>,
    E: Evaluator<G>,
{
    pub fn new(config: QdConfig, variation: V, evaluator: E) -> Result<Self> {
        config.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let container = Container::from_config(&config, &mut rng)?;
        info!(
            behavior_dim = config.behavior_dim,
            batch_size = config.batch_size,
            seed = config.seed,
            "engine ready"
        );
        Ok(Self {
            config,
            container,
            variation,
            evaluator,
            rng,
            state: EngineState::Uninitialized,
            generation: 0,
            population: Vec::new(),
            parents: Vec::new(),
            offspring: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub(crate) fn from_parts(
        config: QdConfig,
        container: Container<G>,
        variation: V,
        evaluator: E,
        rng: ChaCha8Rng,
        generation: u64,
        parents: Vec<SolutionRef<G>>,
        offspring: Vec<SolutionRef<G>>,
    ) -> Self {
        let population = container.content();
        Self {
            config,
            container,
            variation,
            evaluator,
            rng,
            state: EngineState::Running,
            generation,
            population,
            parents,
            offspring,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Seed the container with two random passes. After the first pass the
    /// freshly evaluated batch becomes the parent pool, so selectors that
    /// read parents and offspring see real solutions from generation zero.
    /// Calling this on an engine that is already past `Uninitialized` is a
    /// no-op.
    pub fn initialize(&mut self) -> Result<()> {
        if self.state != EngineState::Uninitialized {
            return Ok(());
        }
        self.state = EngineState::Initializing;
        info!(
            initial_size = self.config.initial_size,
            "seeding initial population"
        );

        self.offspring = self.random_batch(self.config.initial_size)?;
        self.admit_initial()?;
        self.parents = self.offspring.clone();

        self.offspring = self.random_batch(self.config.initial_size)?;
        self.admit_initial()?;

        self.population = self.container.content();
        self.state = EngineState::Running;
        info!(
            container_size = self.population.len(),
            "initialization complete"
        );
        Ok(())
    }

    /// One generation: select parents, produce offspring by pairwise
    /// crossover and mutation, evaluate, admit, refresh metrics.
    pub fn epoch(&mut self) -> Result<GenerationStats> {
        if self.state != EngineState::Running {
            return Err(QdError::NotInitialized);
        }

        let batch = self.config.batch_size;
        let pools = PoolView {
            population: &self.population,
            parents: &self.parents,
            offspring: &self.offspring,
        };
        let variation = &self.variation;
        let behavior_dim = self.config.behavior_dim;
        self.parents = self.config.selector.select(batch, &pools, &mut self.rng, |rng| {
            Arc::new(Solution::unevaluated(variation.random(rng), behavior_dim))
        });

        // Children take their parents' slots in the shuffled pairing, so
        // the index-aligned curiosity credit below reaches the parent that
        // produced each offspring.
        let mut order: Vec<usize> = (0..batch).collect();
        order.shuffle(&mut self.rng);
        let mut genotypes: Vec<Option<G>> = (0..batch).map(|_| None).collect();
        for pair in order.chunks_exact(2) {
            let (child_a, child_b) = self.variation.cross(
                self.parents[pair[0]].genotype(),
                self.parents[pair[1]].genotype(),
                &mut self.rng,
            );
            genotypes[pair[0]] = Some(self.variation.mutate(child_a, &mut self.rng));
            genotypes[pair[1]] = Some(self.variation.mutate(child_b, &mut self.rng));
        }
        let genotypes: Vec<G> = genotypes.into_iter().flatten().collect();
        debug_assert_eq!(genotypes.len(), batch);

        self.offspring = self.evaluate_batch(genotypes)?;

        let mut added = 0;
        for (child, parent) in self.offspring.iter().zip(&self.parents) {
            if self.container.add(child)? {
                parent.add_curiosity(1.0);
                added += 1;
            } else {
                parent.add_curiosity(-0.5);
            }
        }
        self.container.update(&self.offspring, &self.parents);

        self.population = self.container.content();
        self.generation += 1;

        let stats = GenerationStats::from_population(self.generation, added, &self.population);
        debug!(
            generation = stats.generation,
            container_size = stats.container_size,
            best_fitness = stats.best_fitness,
            added = stats.added,
            "generation complete"
        );
        Ok(stats)
    }

    /// Run generations up to the configured budget, initializing first if
    /// needed, and return the last generation's statistics. Checks the stop
    /// flag between generations.
    pub fn run(&mut self) -> Result<GenerationStats> {
        if self.state == EngineState::Uninitialized {
            self.initialize()?;
        }
        let mut stats = GenerationStats::from_population(self.generation, 0, &self.population);
        while self.generation < self.config.generations && !self.stop.load(Ordering::Relaxed) {
            stats = self.epoch()?;
        }
        self.state = EngineState::Stopped;
        info!(
            generation = self.generation,
            container_size = stats.container_size,
            best_fitness = stats.best_fitness,
            qd_score = stats.qd_score,
            "run finished"
        );
        Ok(stats)
    }

    /// Shared flag for stopping a run from another thread. The engine
    /// checks it at generation boundaries only.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn config(&self) -> &QdConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn container(&self) -> &Container<G> {
        &self.container
    }

    /// Container content as of the end of the last generation.
    pub fn population(&self) -> &[SolutionRef<G>] {
        &self.population
    }

    pub fn parents(&self) -> &[SolutionRef<G>] {
        &self.parents
    }

    pub fn offspring(&self) -> &[SolutionRef<G>] {
        &self.offspring
    }

    pub(crate) fn rng(&self) -> &ChaCha8Rng {
        &self.rng
    }

    fn random_batch(&mut self, count: usize) -> Result<Vec<SolutionRef<G>>> {
        let genotypes: Vec<G> = (0..count)
            .map(|_| self.variation.random(&mut self.rng))
            .collect();
        self.evaluate_batch(genotypes)
    }

    fn admit_initial(&mut self) -> Result<()> {
        for indiv in &self.offspring {
            self.container.add(indiv)?;
        }
        self.container.update(&self.offspring, &[]);
        Ok(())
    }

    /// Evaluate a batch in parallel, preserving order. Live solutions must
    /// come back with a descriptor of the configured dimensionality.
    fn evaluate_batch(&self, genotypes: Vec<G>) -> Result<Vec<SolutionRef<G>>> {
        let evaluator = &self.evaluator;
        let evaluated: Vec<(G, Evaluation)> = genotypes
            .into_par_iter()
            .map(|genotype| {
                let evaluation = evaluator.evaluate(&genotype);
                (genotype, evaluation)
            })
            .collect();

        let mut batch = Vec::with_capacity(evaluated.len());
        for (genotype, evaluation) in evaluated {
            if !evaluation.dead && evaluation.descriptor.len() != self.config.behavior_dim {
                return Err(QdError::DescriptorDimension {
                    expected: self.config.behavior_dim,
                    got: evaluation.descriptor.len(),
                });
            }
            batch.push(Arc::new(Solution::new(genotype, evaluation)));
        }
        Ok(batch)
    }
}
