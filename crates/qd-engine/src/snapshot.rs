//! Checkpoint and resume for long runs.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use behavior_core::Descriptor;
use rand_chacha::ChaCha8Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::QdConfig;
use crate::container::Container;
use crate::engine::{Evaluator, QdEngine, VariationOperator};
use crate::solution::{Evaluation, Metrics, Solution, SolutionRef};
use crate::{QdError, Result};

/// JSON has no representation for IEEE infinities, and dead solutions and
/// never-updated metrics legally hold negative infinity. Affected fields
/// travel as raw bit patterns instead.
mod f64_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.to_bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        u64::deserialize(deserializer).map(f64::from_bits)
    }
}

/// One serialized solution, metrics included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionRecord<G> {
    pub genotype: G,
    #[serde(with = "f64_bits")]
    pub fitness: f64,
    pub descriptor: Vec<f64>,
    #[serde(with = "f64_bits")]
    pub novelty: f64,
    pub curiosity: f64,
    #[serde(with = "f64_bits")]
    pub local_quality: f64,
    pub dead: bool,
}

impl<G: Clone> SolutionRecord<G> {
    fn capture(solution: &Solution<G>) -> Self {
        let metrics = solution.metrics();
        Self {
            genotype: solution.genotype().clone(),
            fitness: solution.fitness(),
            descriptor: solution.descriptor().as_slice().to_vec(),
            novelty: metrics.novelty,
            curiosity: metrics.curiosity,
            local_quality: metrics.local_quality,
            dead: solution.dead(),
        }
    }
}

impl<G> SolutionRecord<G> {
    fn restore(self) -> SolutionRef<G> {
        let solution = Solution::new(
            self.genotype,
            Evaluation {
                fitness: self.fitness,
                descriptor: self.descriptor,
                dead: self.dead,
            },
        );
        solution.restore_metrics(Metrics {
            novelty: self.novelty,
            curiosity: self.curiosity,
            local_quality: self.local_quality,
        });
        Arc::new(solution)
    }
}

/// Complete state of a run between generations.
///
/// `solutions` holds the container content first, in insertion order, then
/// any parents or offspring that are not container members. The parent and
/// offspring pools reference records by index, so handles shared between
/// the pools and the container stay shared across a save and load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot<G> {
    pub generation: u64,
    pub behavior_dim: usize,
    pub rng: ChaCha8Rng,
    pub solutions: Vec<SolutionRecord<G>>,
    pub container_len: usize,
    pub parents: Vec<usize>,
    pub offspring: Vec<usize>,
    /// Present only for CVT containers.
    pub centroids: Option<Vec<Descriptor>>,
}

fn index_of<G>(handles: &mut Vec<SolutionRef<G>>, solution: &SolutionRef<G>) -> usize {
    if let Some(found) = handles.iter().position(|h| Arc::ptr_eq(h, solution)) {
        found
    } else {
        handles.push(solution.clone());
        handles.len() - 1
    }
}

impl<G> Snapshot<G> {
    pub(crate) fn capture<V, E>(engine: &QdEngine<G, V, E>) -> Self
    where
        G: Clone + Send + Sync,
        V: VariationOperator<G>,
        E: Evaluator<G>,
    {
        let mut handles = engine.container().content();
        let container_len = handles.len();
        let parents = engine
            .parents()
            .iter()
            .map(|s| index_of(&mut handles, s))
            .collect();
        let offspring = engine
            .offspring()
            .iter()
            .map(|s| index_of(&mut handles, s))
            .collect();
        Self {
            generation: engine.generation(),
            behavior_dim: engine.config().behavior_dim,
            rng: engine.rng().clone(),
            solutions: handles.iter().map(|s| SolutionRecord::capture(s)).collect(),
            container_len,
            parents,
            offspring,
            centroids: engine.container().centroids().map(<[Descriptor]>::to_vec),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()>
    where
        G: Serialize,
    {
        let path = path.as_ref();
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        info!(path = %path.display(), generation = self.generation, "snapshot written");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self>
    where
        G: DeserializeOwned,
    {
        let path = path.as_ref();
        let file = File::open(path)?;
        let snapshot: Self = serde_json::from_reader(BufReader::new(file))?;
        info!(path = %path.display(), generation = snapshot.generation, "snapshot loaded");
        Ok(snapshot)
    }
}

impl<G, V, E> QdEngine<G, V, E>
where
    G: Send + Sync,
    V: VariationOperator<G>,
    E: Evaluator<G>,
{
    /// Capture the full run state. Call between generations; the snapshot
    /// carries everything a resumed engine needs, configuration aside.
    pub fn snapshot(&self) -> Snapshot<G>
    where
        G: Clone,
    {
        Snapshot::capture(self)
    }

    /// Rebuild a running engine from a snapshot. Container members are
    /// re-admitted with `direct_add` in recorded order and the random
    /// stream picks up exactly where the snapshot left it, so a resumed
    /// run produces the same generations the uninterrupted run would have.
    pub fn from_snapshot(
        config: QdConfig,
        snapshot: Snapshot<G>,
        variation: V,
        evaluator: E,
    ) -> Result<Self> {
        config.validate()?;
        if snapshot.behavior_dim != config.behavior_dim {
            return Err(QdError::SnapshotMismatch(format!(
                "snapshot descriptors have {} dimensions, configuration expects {}",
                snapshot.behavior_dim, config.behavior_dim
            )));
        }
        if snapshot.container_len > snapshot.solutions.len() {
            return Err(QdError::SnapshotMismatch(format!(
                "container length {} exceeds the {} recorded solutions",
                snapshot.container_len,
                snapshot.solutions.len()
            )));
        }
        for record in &snapshot.solutions {
            if !record.dead && record.descriptor.len() != config.behavior_dim {
                return Err(QdError::SnapshotMismatch(format!(
                    "recorded descriptor has {} dimensions, configuration expects {}",
                    record.descriptor.len(),
                    config.behavior_dim
                )));
            }
        }

        let mut container = Container::from_snapshot_parts(&config, snapshot.centroids)?;
        let handles: Vec<SolutionRef<G>> = snapshot
            .solutions
            .into_iter()
            .map(SolutionRecord::restore)
            .collect();
        for handle in &handles[..snapshot.container_len] {
            container.direct_add(handle.clone())?;
        }
        let resolve = |indices: &[usize]| -> Result<Vec<SolutionRef<G>>> {
            indices
                .iter()
                .map(|&i| {
                    handles.get(i).cloned().ok_or_else(|| {
                        QdError::SnapshotMismatch(format!(
                            "pool references solution {i} but only {} were recorded",
                            handles.len()
                        ))
                    })
                })
                .collect()
        };
        let parents = resolve(&snapshot.parents)?;
        let offspring = resolve(&snapshot.offspring)?;

        info!(
            generation = snapshot.generation,
            container_size = snapshot.container_len,
            "engine restored from snapshot"
        );
        Ok(Self::from_parts(
            config,
            container,
            variation,
            evaluator,
            snapshot.rng,
            snapshot.generation,
            parents,
            offspring,
        ))
    }
}
