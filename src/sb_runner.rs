//! Repeated simulation runs
//!
//! A [`SimRunner`] turns one [`SimConfig`] into `runs` independent
//! simulations. Each run gets its own seed drawn from the runner's master
//! seed, so the sequential and thread-parallel drivers produce the same
//! records.

use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::sb_batched::BatchedLockstep;
use crate::sb_error::{ConfigError, SamplingError, SimError};
use crate::sb_interface::{derive_seed, resolve_seed, seed_hex, Round, Seed, SimRng};
use crate::sb_metrics::{summarize, FinalizationStats, RunSummary};
use crate::sb_network::{Discipline, Network, NodeLayout, RoundEngine};
use crate::sb_params::SnowballParameters;

/// When a run counts as done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Finality {
    /// Every honest node finalized
    #[default]
    Full,
    /// More than half of the honest nodes finalized
    Partial,
}

/// Which round engine executes a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    #[default]
    PerNode,
    Batched,
}

/// Everything one simulation batch needs. Loads from YAML; absent fields
/// take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub name: String,
    pub description: Option<String>,
    pub params: SnowballParameters,
    pub layout: NodeLayout,
    pub runs: usize,
    pub max_rounds: Round,
    pub finality: Finality,
    pub discipline: Discipline,
    pub engine: Engine,

    /// Master seed; `None` draws one from entropy
    #[serde(skip)]
    pub seed: Option<Seed>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            name: "snowball".to_string(),
            description: None,
            params: SnowballParameters::default(),
            layout: NodeLayout::honest_split(125, 125),
            runs: 10,
            max_rounds: 100_000,
            finality: Finality::Full,
            discipline: Discipline::Lockstep,
            engine: Engine::PerNode,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimResult {
    pub name: String,
    /// Master seed as hex, enough to replay the batch
    pub seed: String,
    pub runs: Vec<FinalizationStats>,
    pub summary: RunSummary,
}

/// One step of an AlphaConfidence sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub alpha_confidence: usize,
    pub summary: RunSummary,
}

/// Run `engine` until the requested finality holds or `max_rounds` rounds
/// have been executed. Full finalization ends a run under either finality.
pub fn drive<E: RoundEngine>(
    engine: &mut E,
    finality: Finality,
    max_rounds: Round,
) -> Result<FinalizationStats, SamplingError> {
    loop {
        let done = engine.check_full_finalization()
            || (finality == Finality::Partial && engine.check_partial_finalization());
        if done {
            break;
        }
        if engine.round() >= max_rounds {
            log::warn!(
                "stopped at the cap of {} rounds before {:?} finalization",
                max_rounds,
                finality
            );
            break;
        }
        engine.run_round()?;
    }
    Ok(engine.get_finalization_stats())
}

pub struct SimRunner {
    config: SimConfig,
    seed: Seed,
}

impl SimRunner {
    /// Validate the configuration and fix the master seed.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        let total = config.layout.build_nodes()?.len();
        config.params.validate_for(total)?;
        if config.engine == Engine::Batched && config.discipline != Discipline::Lockstep {
            return Err(ConfigError::BatchedRequiresLockstep);
        }

        let seed = resolve_seed(config.seed);
        Ok(Self { config, seed })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn seed(&self) -> Seed {
        self.seed
    }

    fn run_seeds(&self) -> Vec<Seed> {
        let mut master = SimRng::from_seed(self.seed);
        (0..self.config.runs)
            .map(|_| derive_seed(&mut master))
            .collect()
    }

    /// A single run from its own seed.
    pub fn run_once(&self, seed: Seed) -> Result<FinalizationStats, SimError> {
        let c = &self.config;
        let stats = match c.engine {
            Engine::PerNode => {
                let mut network = Network::new(&c.layout, c.params, c.discipline, seed)?;
                drive(&mut network, c.finality, c.max_rounds)?
            }
            Engine::Batched => {
                let mut engine = BatchedLockstep::new(&c.layout, c.params, seed)?;
                drive(&mut engine, c.finality, c.max_rounds)?
            }
        };
        Ok(stats)
    }

    fn finish(&self, runs: Vec<FinalizationStats>) -> SimResult {
        let summary = summarize(&runs);
        SimResult {
            name: self.config.name.clone(),
            seed: seed_hex(&self.seed),
            runs,
            summary,
        }
    }

    pub fn run(&self) -> Result<SimResult, SimError> {
        log::info!(
            "{}: {} runs, seed {}",
            self.config.name,
            self.config.runs,
            seed_hex(&self.seed)
        );

        let mut runs = Vec::with_capacity(self.config.runs);
        for (i, seed) in self.run_seeds().into_iter().enumerate() {
            let stats = self.run_once(seed)?;
            log::info!(
                "run {}/{} done: full={:?} partial={:?}",
                i + 1,
                self.config.runs,
                stats.rounds_to_full,
                stats.rounds_to_partial
            );
            runs.push(stats);
        }
        Ok(self.finish(runs))
    }

    /// Same records as [`run`](Self::run), spread over a pool of `threads`
    /// workers. Results keep the seed order.
    pub fn run_parallel(&self, threads: usize) -> Result<SimResult, SimError> {
        let seeds = self.run_seeds();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build()?;

        let runs = pool.install(|| {
            seeds
                .par_iter()
                .map(|seed| self.run_once(*seed))
                .collect::<Result<Vec<_>, SimError>>()
        })?;

        log::info!(
            "{}: {} runs done on {} threads",
            self.config.name,
            runs.len(),
            pool.current_num_threads()
        );
        Ok(self.finish(runs))
    }
}

/// Re-run `config` once per AlphaConfidence value, everything else fixed.
/// Every step replays the same master seed.
pub fn run_sweep(config: &SimConfig, alphas: &[usize]) -> Result<Vec<SweepPoint>, SimError> {
    let seed = resolve_seed(config.seed);
    let mut points = Vec::with_capacity(alphas.len());

    for &alpha in alphas {
        let mut step = config.clone();
        step.params = config.params.with_alpha_confidence(alpha)?;
        step.seed = Some(seed);

        log::info!("sweep: AlphaConfidence={}", alpha);
        let result = SimRunner::new(step)?.run()?;
        points.push(SweepPoint {
            alpha_confidence: alpha,
            summary: result.summary,
        });
    }
    Ok(points)
}
