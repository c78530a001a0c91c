//! Centralized Slush
//!
//! No per-node confidence and no finalization: a global count of nodes
//! preferring 1 is kept, and every round one non-Byzantine node may flip
//! according to an independent sample of size K. Byzantine nodes occupy ids
//! `0..num_byzantine`; they are sampled like anybody else but never drawn to
//! flip. The run ends once the count of 1s leaves the undecided band
//! `[num_param_nodes, num_nodes - num_param_nodes]`.

use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::sb_error::ConfigError;
use crate::sb_interface::{Preference, Round, SimRng};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlushConfig {
    pub num_nodes: usize,
    pub num_byzantine: usize,
    pub k: usize,
    /// Votes (or weighted votes) needed to flip the drawn node
    pub alpha: f64,
    /// Width of the band kept away from either edge before a decision
    pub num_param_nodes: usize,
    /// Safety cap; `None` runs until the band is left
    #[serde(default)]
    pub max_rounds: Option<Round>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlushOutcome {
    /// 1 if more than half of the nodes prefer 1
    pub decision: Preference,
    pub rounds: Round,
    /// False when the round cap stopped the run inside the band
    pub decided: bool,
}

impl SlushConfig {
    pub fn validate(&self, colors: usize) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidSlush(msg));

        if self.num_nodes == 0 {
            return invalid("num_nodes must be positive".to_string());
        }
        if colors != self.num_nodes {
            return invalid(format!(
                "{} colors given for {} nodes",
                colors, self.num_nodes
            ));
        }
        if self.num_byzantine >= self.num_nodes {
            return invalid(format!(
                "num_byzantine {} leaves no honest node out of {}",
                self.num_byzantine, self.num_nodes
            ));
        }
        if self.k == 0 || self.k > self.num_nodes {
            return invalid(format!("k {} must be in 1..={}", self.k, self.num_nodes));
        }
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return invalid(format!("alpha {} must be positive", self.alpha));
        }
        if self.num_param_nodes == 0 && self.max_rounds.is_none() {
            return invalid(
                "num_param_nodes 0 never leaves the undecided band; set max_rounds".to_string(),
            );
        }
        if self.num_param_nodes > self.num_nodes {
            return invalid(format!(
                "num_param_nodes {} exceeds num_nodes {}",
                self.num_param_nodes, self.num_nodes
            ));
        }
        Ok(())
    }
}

/// Unweighted Slush: the yes-vote is the number of sampled 1s.
pub fn slush(
    config: &SlushConfig,
    colors: &mut [Preference],
    rng: &mut SimRng,
) -> Result<SlushOutcome, ConfigError> {
    config.validate(colors.len())?;
    Ok(run(config, colors, rng, |sample, colors| {
        Some(
            sample
                .iter()
                .filter(|i| colors[**i] == Preference::One)
                .count() as f64,
        )
    }))
}

/// Slush with per-node weights: the weighted yes-sum is normalized by the
/// sample's total weight and scaled back to K before comparing with alpha.
/// A sample of zero total weight changes nothing.
pub fn weighted_slush(
    config: &SlushConfig,
    colors: &mut [Preference],
    weights: &[f64],
    rng: &mut SimRng,
) -> Result<SlushOutcome, ConfigError> {
    config.validate(colors.len())?;
    if weights.len() != config.num_nodes {
        return Err(ConfigError::InvalidSlush(format!(
            "{} weights given for {} nodes",
            weights.len(),
            config.num_nodes
        )));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(ConfigError::InvalidSlush(
            "weights must be finite and non-negative".to_string(),
        ));
    }

    let k = config.k as f64;
    Ok(run(config, colors, rng, |sample, colors| {
        let total: f64 = sample.iter().map(|i| weights[*i]).sum();
        if total <= 0.0 {
            return None;
        }
        let yes: f64 = sample
            .iter()
            .filter(|i| colors[**i] == Preference::One)
            .map(|i| weights[*i])
            .sum();
        Some(k * yes / total)
    }))
}

fn run<F>(
    config: &SlushConfig,
    colors: &mut [Preference],
    rng: &mut SimRng,
    mut yes_votes: F,
) -> SlushOutcome
where
    F: FnMut(&[usize], &[Preference]) -> Option<f64>,
{
    let n = config.num_nodes;
    let k = config.k as f64;
    let mut ones = colors.iter().filter(|c| **c == Preference::One).count();
    let mut rounds = 0;
    let mut decided = false;

    loop {
        if ones < config.num_param_nodes || ones > n - config.num_param_nodes {
            decided = true;
            break;
        }
        if config.max_rounds.map_or(false, |cap| rounds >= cap) {
            log::warn!(
                "slush stopped at the cap of {} rounds with {} of {} on 1",
                rounds,
                ones,
                n
            );
            break;
        }

        let drawn = rng.gen_range(config.num_byzantine..n);
        let sample = index::sample(rng, n, config.k).into_vec();

        if let Some(yes) = yes_votes(&sample, colors) {
            if yes >= config.alpha {
                if colors[drawn] == Preference::Zero {
                    ones += 1;
                }
                colors[drawn] = Preference::One;
            } else if k - yes >= config.alpha {
                if colors[drawn] == Preference::One {
                    ones -= 1;
                }
                colors[drawn] = Preference::Zero;
            }
        }

        rounds += 1;
    }

    let decision = if ones > n / 2 {
        Preference::One
    } else {
        Preference::Zero
    };
    log::debug!("slush decided {} after {} rounds", decision, rounds);

    SlushOutcome {
        decision,
        rounds,
        decided,
    }
}
