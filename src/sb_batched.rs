//! Batched lockstep engine
//!
//! Same protocol as [`Network`](crate::sb_network::Network) under the lockstep
//! discipline, laid out as one column per node attribute. A round draws the
//! whole sample matrix first, gathers every row's votes into two count
//! columns, then applies each protocol stage as a bulk pass over the row
//! indices that survived the previous stage.
//!
//! Given the same layout, parameters, sampler and seed it consumes the rng in
//! the same order as the per-node network and ends in the same state.

use rand::SeedableRng;

use crate::sb_error::{ConfigError, SamplingError};
use crate::sb_interface::{Distribution, NodeId, Preference, Round, Seed, SimRng};
use crate::sb_metrics::{FinalizationStats, FinalizationTracker};
use crate::sb_network::{NodeLayout, RoundEngine};
use crate::sb_node::NodeType;
use crate::sb_params::SnowballParameters;
use crate::sb_sampler::{Sampler, UniformSampler};

pub struct BatchedLockstep<S: Sampler = UniformSampler> {
    kinds: Vec<NodeType>,
    preferences: Vec<Option<Preference>>,
    confidence: Vec<usize>,
    strength: Vec<[usize; 2]>,
    last_majority: Vec<Option<Preference>>,
    finalized: Vec<bool>,
    honest: Vec<NodeId>,
    params: SnowballParameters,
    sampler: S,
    rng: SimRng,
    tracker: FinalizationTracker,
}

impl BatchedLockstep<UniformSampler> {
    pub fn new(
        layout: &NodeLayout,
        params: SnowballParameters,
        seed: Seed,
    ) -> Result<Self, ConfigError> {
        Self::with_sampler(layout, params, UniformSampler, SimRng::from_seed(seed))
    }
}

impl<S: Sampler> BatchedLockstep<S> {
    pub fn with_sampler(
        layout: &NodeLayout,
        params: SnowballParameters,
        sampler: S,
        rng: SimRng,
    ) -> Result<Self, ConfigError> {
        let nodes = layout.build_nodes()?;
        params.validate_for(nodes.len())?;

        let n = nodes.len();
        let kinds: Vec<NodeType> = nodes.iter().map(|node| node.node_type()).collect();
        let honest = (0..n).filter(|i| kinds[*i] == NodeType::Honest).collect();

        let mut engine = Self {
            preferences: nodes.iter().map(|node| node.preference()).collect(),
            finalized: nodes.iter().map(|node| node.is_finalized()).collect(),
            kinds,
            confidence: vec![0; n],
            strength: vec![[0, 0]; n],
            last_majority: vec![None; n],
            honest,
            params,
            sampler,
            rng,
            tracker: FinalizationTracker::new(),
        };
        engine.observe_milestones();
        Ok(engine)
    }

    pub fn preferences(&self) -> &[Option<Preference>] {
        &self.preferences
    }

    pub fn confidences(&self) -> &[usize] {
        &self.confidence
    }

    pub fn strengths(&self) -> &[[usize; 2]] {
        &self.strength
    }

    pub fn finalized(&self) -> &[bool] {
        &self.finalized
    }

    pub fn honest_ids(&self) -> &[NodeId] {
        &self.honest
    }

    fn finalized_honest(&self) -> usize {
        self.honest.iter().filter(|id| self.finalized[**id]).count()
    }

    fn observe_milestones(&mut self) {
        let partial = self.check_partial_finalization();
        let full = self.check_full_finalization();
        self.tracker.observe(partial, full);
    }

    /// Vote counts per row of the sample matrix. Honest peers without a
    /// preference adopt the requester's and do not vote, exactly like a
    /// per-node query.
    fn gather(
        &mut self,
        active: &[NodeId],
        sampled: &[NodeId],
        lnode_vote: Preference,
    ) -> (Vec<usize>, Vec<usize>) {
        let k = self.params.k;
        let mut zeros = vec![0; active.len()];
        let mut ones = vec![0; active.len()];

        for (row, &id) in active.iter().enumerate() {
            let requester = self.preferences[id];
            for &peer in &sampled[row * k..(row + 1) * k] {
                let vote = match self.kinds[peer] {
                    NodeType::Honest => match self.preferences[peer] {
                        Some(p) => Some(p),
                        None => {
                            self.preferences[peer] = requester;
                            None
                        }
                    },
                    NodeType::Fixed => self.preferences[peer],
                    NodeType::Offline => None,
                    NodeType::Dynamic => Some(lnode_vote),
                };
                match vote {
                    Some(Preference::Zero) => zeros[row] += 1,
                    Some(Preference::One) => ones[row] += 1,
                    None => {}
                }
            }
        }

        (zeros, ones)
    }
}

impl<S: Sampler> RoundEngine for BatchedLockstep<S> {
    fn run_round(&mut self) -> Result<(), SamplingError> {
        let snapshot = self.get_distribution();
        let lnode_vote = snapshot.minority();
        let n = self.kinds.len();
        let k = self.params.k;

        let active: Vec<NodeId> = self
            .honest
            .iter()
            .copied()
            .filter(|id| !self.finalized[*id])
            .collect();

        // 1) sample matrix, one row of k peers per active node
        let mut sampled = Vec::with_capacity(active.len() * k);
        for &id in &active {
            sampled.extend(self.sampler.sample(&mut self.rng, id, n, k)?);
        }

        // 2) vote counts per row
        let (zeros, ones) = self.gather(&active, &sampled, lnode_vote);

        // 3) majority per row, ties to 0
        let majority: Vec<Preference> = zeros
            .iter()
            .zip(&ones)
            .map(|(z, o)| if o > z { Preference::One } else { Preference::Zero })
            .collect();
        let majority_count: Vec<usize> = zeros
            .iter()
            .zip(&ones)
            .map(|(z, o)| *z.max(o))
            .collect();

        // rows whose node holds a preference by now; unset nodes skip the update
        let rows: Vec<usize> = (0..active.len())
            .filter(|row| self.preferences[active[*row]].is_some())
            .collect();

        // 4) AlphaPreference stage; an empty sample fails it too (count 0)
        let alpha_preference = self.params.alpha_preference;
        let (pref_ok, pref_fail): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|row| majority_count[**row] > 0 && majority_count[**row] >= alpha_preference);
        for &row in &pref_fail {
            self.confidence[active[row]] = 0;
        }

        // 5) strength and strict-majority flip
        for &row in &pref_ok {
            self.strength[active[row]][majority[row].index()] += 1;
        }
        for &row in &pref_ok {
            let (id, m) = (active[row], majority[row]);
            if self.strength[id][m.index()] > self.strength[id][m.other().index()] {
                self.preferences[id] = Some(m);
            }
        }

        // 6) AlphaConfidence stage
        let (conf_ok, conf_fail): (Vec<usize>, Vec<usize>) = pref_ok
            .iter()
            .partition(|row| majority_count[**row] >= self.params.alpha_confidence);
        for &row in &conf_fail {
            self.confidence[active[row]] = 0;
        }

        // 7) confidence: reset on a changed majority, then count up
        for &row in &conf_ok {
            let (id, m) = (active[row], majority[row]);
            if self.last_majority[id] != Some(m) {
                self.confidence[id] = 0;
            }
        }
        for &row in &conf_ok {
            let id = active[row];
            self.last_majority[id] = Some(majority[row]);
            self.confidence[id] += 1;
        }

        // 8) finalize at Beta
        for &row in &conf_ok {
            let id = active[row];
            if self.confidence[id] >= self.params.beta {
                self.finalized[id] = true;
            }
        }

        for &id in &self.honest {
            if self.finalized[id] {
                self.tracker.record(id);
            }
        }
        self.tracker.end_round();
        self.observe_milestones();
        Ok(())
    }

    fn round(&self) -> Round {
        self.tracker.round()
    }

    fn get_distribution(&self) -> Distribution {
        Distribution::from_preferences(&self.preferences)
    }

    fn check_partial_finalization(&self) -> bool {
        self.finalized_honest() > self.honest.len() / 2
    }

    fn check_full_finalization(&self) -> bool {
        self.finalized_honest() == self.honest.len()
    }

    fn get_finalization_stats(&self) -> FinalizationStats {
        self.tracker.stats(self.get_distribution())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sb_network::{Discipline, Network};
    use crate::sb_node::Node;

    fn params() -> SnowballParameters {
        SnowballParameters::new(3, 2, 2, 3).unwrap()
    }

    /// Run both engines side by side and compare every node after each round.
    fn assert_equivalent(
        layout: &NodeLayout,
        params: SnowballParameters,
        seed: Seed,
        rounds: usize,
    ) {
        let mut per_node = Network::new(layout, params, Discipline::Lockstep, seed).unwrap();
        let mut batched = BatchedLockstep::new(layout, params, seed).unwrap();

        for _ in 0..rounds {
            per_node.run_round().unwrap();
            batched.run_round().unwrap();

            for (id, node) in per_node.nodes().iter().enumerate() {
                assert_eq!(node.preference(), batched.preferences()[id], "preference of {}", id);
                if let Node::Honest(h) = node {
                    let state = h.state();
                    assert_eq!(state.confidence, batched.confidences()[id], "confidence of {}", id);
                    assert_eq!(state.strength, batched.strengths()[id], "strength of {}", id);
                    assert_eq!(state.finalized, batched.finalized()[id], "finalized of {}", id);
                }
            }
            assert_eq!(per_node.get_finalization_stats(), batched.get_finalization_stats());
        }

        assert_eq!(per_node.round(), batched.round());
    }

    #[test]
    fn test_equivalent_on_split_network() {
        let layout = NodeLayout::honest_split(15, 15);
        for seed in [[1u8; 32], [2u8; 32], [3u8; 32]] {
            assert_equivalent(&layout, params(), seed, 60);
        }
    }

    #[test]
    fn test_equivalent_with_adversaries() {
        let layout = NodeLayout::honest_split(12, 9)
            .with_nodes(NodeType::Fixed, vec![Some(Preference::One); 3])
            .with_count(NodeType::Offline, 2)
            .with_count(NodeType::Dynamic, 4);
        let params = SnowballParameters::new(7, 4, 5, 6).unwrap();
        for seed in [[8u8; 32], [9u8; 32]] {
            assert_equivalent(&layout, params, seed, 80);
        }
    }

    #[test]
    fn test_equivalent_with_unset_honest_nodes() {
        let mut prefs = vec![None; 10];
        prefs.extend(vec![Some(Preference::One); 3]);
        prefs.extend(vec![Some(Preference::Zero); 3]);
        let layout = NodeLayout::new().with_nodes(NodeType::Honest, prefs);
        assert_equivalent(&layout, params(), [77u8; 32], 40);
    }

    #[test]
    fn test_equivalent_when_confidence_quorum_is_lower() {
        let layout = NodeLayout::honest_split(20, 11).with_count(NodeType::Dynamic, 3);
        let params = SnowballParameters::new(9, 6, 4, 8).unwrap();
        assert_equivalent(&layout, params, [5u8; 32], 80);
    }

    #[test]
    fn test_unanimous_network_finalizes_at_beta() {
        let layout = NodeLayout::honest_split(5, 0);
        let mut engine = BatchedLockstep::new(&layout, params(), [42u8; 32]).unwrap();

        while !engine.check_full_finalization() {
            engine.run_round().unwrap();
        }

        let stats = engine.get_finalization_stats();
        assert_eq!(stats.rounds_to_full, Some(3));
        assert!(stats.per_node_rounds.values().all(|r| *r == 2));
        assert!(engine.confidences().iter().all(|c| *c == 3));
    }

    #[test]
    fn test_rejects_bad_layout() {
        let layout = NodeLayout::honest_split(2, 0);
        assert_eq!(
            BatchedLockstep::new(&layout, params(), [0u8; 32]).err(),
            Some(ConfigError::SampleSizeTooLarge { k: 3, available: 1 })
        );
    }
}
