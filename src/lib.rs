//! # sbRust - Snowball Consensus Simulator
//!
//! Discrete-time simulation of the Snowball family of leaderless binary
//! consensus protocols. A network of honest and adversarial nodes repeatedly
//! samples K peers, counts the answers against two quorum thresholds and
//! finalizes a value after Beta consecutive confident rounds.
//!
//! ## Core Components
//!
//! - **SnowballState**: per-node preference, strength and confidence, with a
//!   pure update step
//! - **Node**: honest, fixed, offline and dynamic (L-node) behaviours
//! - **Network**: round scheduling (lockstep or random-node) and
//!   finalization bookkeeping
//! - **BatchedLockstep**: column-oriented lockstep engine with identical
//!   results
//! - **SimRunner**: repeated seeded runs, sequential or threaded, and
//!   AlphaConfidence sweeps
//! - **Slush**: centralized Slush and weighted Slush
//!
//! ```no_run
//! use sb_rust::{SimConfig, SimRunner, NodeLayout, SnowballParameters};
//!
//! let config = SimConfig {
//!     params: SnowballParameters::new(21, 11, 11, 30).unwrap(),
//!     layout: NodeLayout::honest_split(125, 125),
//!     runs: 10,
//!     ..SimConfig::default()
//! };
//!
//! let result = SimRunner::new(config).unwrap().run().unwrap();
//! result.summary.print_summary("250 honest nodes");
//! ```
//!
//! ## Simulation Binaries
//!
//! `scenario_runner` executes YAML scenarios from `scenarios/`, `slush_sim`
//! sweeps Slush over Byzantine counts.

// Core protocol
pub mod sb_interface;
pub mod sb_error;
pub mod sb_params;
pub mod sb_snowball;
pub mod sb_node;
pub mod sb_sampler;

// Round engines
pub mod sb_network;
pub mod sb_batched;

// Runs and results
pub mod sb_metrics;
pub mod sb_runner;
pub mod sb_slush;

// Re-export commonly used types
pub use sb_error::{ConfigError, SamplingError, SimError};
pub use sb_interface::{Distribution, NodeId, Preference, Response, Round, Seed, SimRng};
pub use sb_metrics::{summarize, FinalizationStats, RunSummary};
pub use sb_network::{Discipline, Network, NodeLayout, RoundEngine};
pub use sb_node::{Node, NodeType};
pub use sb_params::SnowballParameters;
pub use sb_runner::{run_sweep, Engine, Finality, SimConfig, SimResult, SimRunner};
pub use sb_snowball::SnowballState;
