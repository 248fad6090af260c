//! Quality-diversity optimization engine.
//!
//! Instead of converging on a single optimum, quality-diversity (QD) search
//! maintains a collection of solutions that are both high-performing and
//! spread across a behavior space. This crate provides:
//!
//! - [`Container`]: the three archive strategies (unbounded novelty-gated
//!   archive, fixed behavior grid, CVT niches) behind one interface
//! - [`Selector`]: uniform, tournament, score-proportionate, and
//!   Pareto-based parent selection over container or population pools
//! - [`QdEngine`]: the generational loop (select, vary, evaluate in
//!   parallel, admit, update metrics) with deterministic seeded randomness
//! - [`Snapshot`]: serialization sufficient to stop a run and resume it
//!   bit-identically
//!
//! Genotypes, variation operators, and fitness functions are supplied by the
//! caller through the [`VariationOperator`] and [`Evaluator`] traits.

pub mod config;
pub mod container;
pub mod engine;
pub mod selector;
pub mod snapshot;
pub mod solution;
pub mod stats;

pub use config::{ContainerConfig, CvtParams, NoveltyParams, QdConfig};
pub use container::Container;
pub use engine::{EngineState, Evaluator, QdEngine, VariationOperator};
pub use selector::{SelectionMetric, SelectionPool, Selector};
pub use snapshot::Snapshot;
pub use solution::{Evaluation, Metrics, Solution, SolutionRef};
pub use stats::GenerationStats;

pub use behavior_core::{Descriptor, StoreBackend};

/// Errors surfaced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum QdError {
    /// A configuration parameter failed validation.
    #[error("invalid configuration: {parameter}: {reason}")]
    InvalidConfig {
        parameter: &'static str,
        reason: String,
    },

    /// An evaluator returned a descriptor of the wrong dimensionality.
    #[error("descriptor dimension mismatch: expected {expected}, got {got}")]
    DescriptorDimension { expected: usize, got: usize },

    /// A cached CVT centroid file does not match the configured geometry.
    #[error("centroid cache mismatch at {path}: {reason}")]
    CentroidCache { path: String, reason: String },

    /// Operation requires an initialized engine.
    #[error("engine not initialized: call initialize() or run() first")]
    NotInitialized,

    /// A snapshot is inconsistent with the configuration it is resumed under.
    #[error("snapshot mismatch: {0}")]
    SnapshotMismatch(String),

    #[error(transparent)]
    Behavior(#[from] behavior_core::BehaviorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, QdError>;
