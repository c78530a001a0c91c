//! Simulation statistics and results

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::sb_interface::{Distribution, NodeId, Round};

/// Per-run record handed to persistence. The field names and shapes are read
/// by downstream tooling and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizationStats {
    pub rounds_to_partial: Option<Round>,
    pub rounds_to_full: Option<Round>,
    pub per_node_rounds: BTreeMap<NodeId, Round>,
    pub distribution: Distribution,
}

/// Round counter plus write-once finalization bookkeeping, shared by both
/// round engines.
#[derive(Debug, Clone, Default)]
pub struct FinalizationTracker {
    round: Round,
    per_node_rounds: BTreeMap<NodeId, Round>,
    rounds_to_partial: Option<Round>,
    rounds_to_full: Option<Round>,
}

impl FinalizationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn round(&self) -> Round {
        self.round
    }

    /// Record `id` as finalized in the current round; later calls for the
    /// same id are ignored.
    pub fn record(&mut self, id: NodeId) {
        if !self.per_node_rounds.contains_key(&id) {
            log::debug!("{}: node {} finalized", self.round, id);
            self.per_node_rounds.insert(id, self.round);
        }
    }

    pub fn finalized_round(&self, id: NodeId) -> Option<Round> {
        self.per_node_rounds.get(&id).copied()
    }

    pub fn per_node_rounds(&self) -> &BTreeMap<NodeId, Round> {
        &self.per_node_rounds
    }

    pub fn end_round(&mut self) {
        self.round += 1;
    }

    /// Note the first round count at which partial/full finalization held.
    pub fn observe(&mut self, partial: bool, full: bool) {
        if partial && self.rounds_to_partial.is_none() {
            log::info!("partial finalization reached after {} rounds", self.round);
            self.rounds_to_partial = Some(self.round);
        }
        if full && self.rounds_to_full.is_none() {
            log::info!("full finalization reached after {} rounds", self.round);
            self.rounds_to_full = Some(self.round);
        }
    }

    pub fn stats(&self, distribution: Distribution) -> FinalizationStats {
        FinalizationStats {
            rounds_to_partial: self.rounds_to_partial,
            rounds_to_full: self.rounds_to_full,
            per_node_rounds: self.per_node_rounds.clone(),
            distribution,
        }
    }
}

/// Aggregate over many runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub num_runs: usize,
    pub runs_reached_partial: usize,
    pub runs_reached_full: usize,
    pub final_preference_distribution: Distribution,
    pub avg_rounds_to_full: Option<f64>,
    pub avg_rounds_to_partial: Option<f64>,
    pub avg_per_node_finalization: Option<f64>,
    pub min_node_finalization_round: Option<Round>,
    pub max_node_finalization_round: Option<Round>,
}

fn average(values: &[Round]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<Round>() as f64 / values.len() as f64)
    }
}

pub fn summarize(results: &[FinalizationStats]) -> RunSummary {
    let mut distribution = Distribution::default();
    let mut to_full = Vec::new();
    let mut to_partial = Vec::new();
    let mut node_rounds = Vec::new();

    for res in results {
        distribution.merge(&res.distribution);
        to_full.extend(res.rounds_to_full);
        to_partial.extend(res.rounds_to_partial);
        node_rounds.extend(res.per_node_rounds.values().copied());
    }

    RunSummary {
        num_runs: results.len(),
        runs_reached_partial: to_partial.len(),
        runs_reached_full: to_full.len(),
        final_preference_distribution: distribution,
        avg_rounds_to_full: average(&to_full),
        avg_rounds_to_partial: average(&to_partial),
        avg_per_node_finalization: average(&node_rounds),
        min_node_finalization_round: node_rounds.iter().min().copied(),
        max_node_finalization_round: node_rounds.iter().max().copied(),
    }
}

fn fmt_avg(v: Option<f64>) -> String {
    v.map(|x| format!("{:.1}", x))
        .unwrap_or_else(|| "-".to_string())
}

fn fmt_round(v: Option<Round>) -> String {
    v.map(|x| x.to_string()).unwrap_or_else(|| "-".to_string())
}

impl RunSummary {
    /// Print a summary of the simulation results
    pub fn print_summary(&self, title: &str) {
        println!("\n╔════════════════════════════════════════════════════════╗");
        println!("║  {:<54}║", title);
        println!("╚════════════════════════════════════════════════════════╝\n");

        println!("Runs:");
        println!("  Total: {}", self.num_runs);
        println!("  Reached partial: {}", self.runs_reached_partial);
        println!("  Reached full: {}", self.runs_reached_full);
        println!();

        println!("Rounds:");
        println!("  Avg to partial: {}", fmt_avg(self.avg_rounds_to_partial));
        println!("  Avg to full: {}", fmt_avg(self.avg_rounds_to_full));
        println!(
            "  Per node: min={}, max={}, avg={}",
            fmt_round(self.min_node_finalization_round),
            fmt_round(self.max_node_finalization_round),
            fmt_avg(self.avg_per_node_finalization)
        );
        println!();

        println!("Final preferences (all runs):");
        println!("  0: {}", self.final_preference_distribution.zeros);
        println!("  1: {}", self.final_preference_distribution.ones);
        println!();
    }
}
