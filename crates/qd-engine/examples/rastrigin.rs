//! MAP-Elites over the Rastrigin function.
//!
//! Run with: cargo run --release --example rastrigin
//! Set RUST_LOG=qd_engine=debug for per-generation progress.

use std::f64::consts::PI;
use std::time::Instant;

use qd_engine::{Evaluation, Evaluator, QdConfig, QdEngine, VariationOperator};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::EnvFilter;

const GENES: usize = 6;
const GRID: usize = 100;

struct Blend;

impl VariationOperator<Vec<f64>> for Blend {
    fn random(&self, rng: &mut ChaCha8Rng) -> Vec<f64> {
        (0..GENES).map(|_| rng.r#gen::<f64>()).collect()
    }

    fn cross(&self, a: &Vec<f64>, b: &Vec<f64>, rng: &mut ChaCha8Rng) -> (Vec<f64>, Vec<f64>) {
        let mix: f64 = rng.r#gen();
        let child_a = a.iter().zip(b).map(|(x, y)| x * mix + y * (1.0 - mix)).collect();
        let child_b = a.iter().zip(b).map(|(x, y)| y * mix + x * (1.0 - mix)).collect();
        (child_a, child_b)
    }

    fn mutate(&self, mut genotype: Vec<f64>, rng: &mut ChaCha8Rng) -> Vec<f64> {
        for gene in &mut genotype {
            if rng.r#gen::<f64>() < 0.2 {
                *gene = (*gene + rng.r#gen::<f64>() * 0.2 - 0.1).clamp(0.0, 1.0);
            }
        }
        genotype
    }
}

/// Negated Rastrigin with genes scaled from [0, 1] to [-5, 5]. The global
/// maximum is 0 at all genes 0.5; the behavior descriptor is the first two
/// genes, so the grid spreads elites across that plane.
struct Rastrigin;

impl Evaluator<Vec<f64>> for Rastrigin {
    fn evaluate(&self, genotype: &Vec<f64>) -> Evaluation {
        let fitness = -genotype
            .iter()
            .map(|&g| {
                let x = g * 10.0 - 5.0;
                x * x - 10.0 * (2.0 * PI * x).cos() + 10.0
            })
            .sum::<f64>();
        Evaluation::new(fitness, genotype[..2].to_vec())
    }
}

fn main() -> qd_engine::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut config = QdConfig::grid(vec![GRID, GRID]);
    config.generations = 300;
    config.seed = 2024;

    println!("{}", "=".repeat(60));
    println!("  MAP-Elites on Rastrigin ({GENES} genes, {GRID}x{GRID} grid)");
    println!("{}", "=".repeat(60));
    println!();

    let mut engine = QdEngine::new(config, Blend, Rastrigin)?;
    engine.initialize()?;

    println!(
        "{:<12} {:>8} {:>12} {:>14} {:>8}",
        "Generation", "Cells", "Best", "QD-score", "Added"
    );
    println!("{}", "-".repeat(60));

    let start = Instant::now();
    while engine.generation() < engine.config().generations {
        let stats = engine.epoch()?;
        if stats.generation % 30 == 0 {
            println!(
                "{:<12} {:>8} {:>12.3} {:>14.1} {:>8}",
                stats.generation,
                stats.container_size,
                stats.best_fitness,
                stats.qd_score,
                stats.added
            );
        }
    }
    println!();
    println!("{} generations in {:?}", engine.generation(), start.elapsed());
    println!();

    let population = engine.population();
    let coverage = population.len() as f64 / (GRID * GRID) as f64 * 100.0;
    println!(
        "Coverage: {} of {} cells ({coverage:.1}%)",
        population.len(),
        GRID * GRID
    );

    let best = population
        .iter()
        .max_by(|a, b| a.fitness().partial_cmp(&b.fitness()).unwrap())
        .unwrap();
    let genes: Vec<String> = best.genotype().iter().map(|g| format!("{g:.3}")).collect();
    println!("Best elite: fitness {:.4} at [{}]", best.fitness(), genes.join(", "));
    println!();

    // Coarse fitness map: each character covers a 5x5 block of cells and
    // shows the best fitness inside it. '@' is best, ' ' is empty.
    println!("Elite map (descriptor plane, best fitness per block):");
    let shades = [' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];
    let side = GRID / 5;
    let mut blocks = vec![f64::NEG_INFINITY; side * side];
    for s in population {
        let d = s.descriptor().as_slice();
        let col = ((d[0] * side as f64) as usize).min(side - 1);
        let row = ((d[1] * side as f64) as usize).min(side - 1);
        let block = &mut blocks[row * side + col];
        *block = block.max(s.fitness());
    }
    let lo = blocks.iter().copied().filter(|b| b.is_finite()).fold(f64::INFINITY, f64::min);
    let hi = blocks.iter().copied().filter(|b| b.is_finite()).fold(f64::NEG_INFINITY, f64::max);
    for row in (0..side).rev() {
        let line: String = (0..side)
            .map(|col| {
                let block = blocks[row * side + col];
                if !block.is_finite() {
                    ' '
                } else if hi > lo {
                    let t = (block - lo) / (hi - lo);
                    shades[((t * 9.0).round() as usize).min(9)]
                } else {
                    '@'
                }
            })
            .collect();
        println!("  {line}");
    }
    println!();

    let path = std::env::temp_dir().join("rastrigin.snapshot.json");
    engine.snapshot().save(&path)?;
    println!("Snapshot written to {}", path.display());

    Ok(())
}
