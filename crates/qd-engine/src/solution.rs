//! Solutions and their QD metrics.
//!
//! A [`Solution`] is an evaluated genotype: fitness, behavior descriptor,
//! and a small mutable [`Metrics`] record that containers rewrite as the
//! neighborhood around the solution changes. Solutions are shared between
//! the population, the parent/offspring batches, and the container through
//! [`SolutionRef`] handles, so a metric update is visible everywhere at
//! once. The genotype, fitness, and descriptor are immutable after
//! construction; only the metrics record moves.

use std::sync::Arc;

use parking_lot::RwLock;

use behavior_core::Descriptor;

/// Container-maintained scores attached to each solution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    /// Mean distance to the k nearest neighbors; starts at negative
    /// infinity until the solution first participates in an update.
    pub novelty: f64,
    /// Running selection-success score: credited when offspring enter the
    /// container, debited when they are rejected.
    pub curiosity: f64,
    /// How many of the k nearest neighbors this solution outperforms.
    pub local_quality: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            novelty: f64::NEG_INFINITY,
            curiosity: 0.0,
            local_quality: 0.0,
        }
    }
}

/// What an evaluator reports for one genotype.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub fitness: f64,
    pub descriptor: Vec<f64>,
    /// Dead solutions flow through the loop but are never admitted to a
    /// container and keep negative-infinity novelty.
    pub dead: bool,
}

impl Evaluation {
    pub fn new(fitness: f64, descriptor: Vec<f64>) -> Self {
        Self {
            fitness,
            descriptor,
            dead: false,
        }
    }

    /// An invalid evaluation; the descriptor is never read.
    pub fn dead() -> Self {
        Self {
            fitness: f64::NEG_INFINITY,
            descriptor: Vec::new(),
            dead: true,
        }
    }
}

/// Shared handle to a solution.
pub type SolutionRef<G> = Arc<Solution<G>>;

/// An evaluated genotype with shared, mutable QD metrics.
#[derive(Debug)]
pub struct Solution<G> {
    genotype: G,
    fitness: f64,
    descriptor: Descriptor,
    dead: bool,
    metrics: RwLock<Metrics>,
}

impl<G> Solution<G> {
    pub fn new(genotype: G, evaluation: Evaluation) -> Self {
        Self {
            genotype,
            fitness: evaluation.fitness,
            descriptor: Descriptor::new(evaluation.descriptor),
            dead: evaluation.dead,
            metrics: RwLock::new(Metrics::default()),
        }
    }

    /// A not-yet-evaluated placeholder, used by fresh-random selection.
    pub fn unevaluated(genotype: G, behavior_dim: usize) -> Self {
        Self {
            genotype,
            fitness: 0.0,
            descriptor: Descriptor::zeros(behavior_dim),
            dead: false,
            metrics: RwLock::new(Metrics::default()),
        }
    }

    pub fn genotype(&self) -> &G {
        &self.genotype
    }

    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn dead(&self) -> bool {
        self.dead
    }

    /// Copy of the current metrics record.
    pub fn metrics(&self) -> Metrics {
        *self.metrics.read()
    }

    pub fn novelty(&self) -> f64 {
        self.metrics.read().novelty
    }

    pub fn curiosity(&self) -> f64 {
        self.metrics.read().curiosity
    }

    pub fn local_quality(&self) -> f64 {
        self.metrics.read().local_quality
    }

    pub fn set_novelty(&self, novelty: f64) {
        self.metrics.write().novelty = novelty;
    }

    pub fn set_local_quality(&self, local_quality: f64) {
        self.metrics.write().local_quality = local_quality;
    }

    pub fn set_curiosity(&self, curiosity: f64) {
        self.metrics.write().curiosity = curiosity;
    }

    pub fn add_curiosity(&self, delta: f64) {
        self.metrics.write().curiosity += delta;
    }

    pub(crate) fn restore_metrics(&self, metrics: Metrics) {
        *self.metrics.write() = metrics;
    }
}
