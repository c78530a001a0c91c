//! Simulated network of Snowball nodes
//!
//! The network owns every node (id order = construction order), drives rounds
//! under one of two scheduling disciplines and keeps the finalization record.
//!
//! - **Lockstep**: every non-finalized honest node samples and updates once
//!   per round. All responses are collected against the state at the start of
//!   the round before any node applies its update, so a node processed late
//!   in the round never sees a peer's same-round update.
//! - **RandomNode**: one uniformly chosen non-finalized honest node samples
//!   and updates per round.
//!
//! L-nodes get a fresh copy of the network-wide distribution at the start of
//! every round, before anyone queries them.

use indexmap::IndexMap;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::sb_error::{ConfigError, SamplingError};
use crate::sb_interface::{Distribution, NodeId, Preference, Response, Round, Seed, SimRng};
use crate::sb_metrics::{FinalizationStats, FinalizationTracker};
use crate::sb_node::{make_node, Node, NodeType};
use crate::sb_params::SnowballParameters;
use crate::sb_sampler::{Sampler, UniformSampler};

/// Scheduling discipline for rounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discipline {
    #[default]
    Lockstep,
    RandomNode,
}

/// Which nodes a run starts with.
///
/// Keys are node type names (`honest`, `fixed`, `offline`, `dynamic`); the
/// declaration order of `counts` is the id order. A type with a count but no
/// preference list starts all of its nodes unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeLayout {
    pub counts: IndexMap<String, usize>,

    #[serde(default)]
    pub initial_preferences: IndexMap<String, Vec<Option<Preference>>>,
}

impl NodeLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `prefs.len()` nodes of a type with the given starting preferences.
    pub fn with_nodes(mut self, node_type: NodeType, prefs: Vec<Option<Preference>>) -> Self {
        self.counts.insert(node_type.as_str().to_string(), prefs.len());
        self.initial_preferences
            .insert(node_type.as_str().to_string(), prefs);
        self
    }

    /// Add `count` nodes of a type with no starting preference.
    pub fn with_count(mut self, node_type: NodeType, count: usize) -> Self {
        self.counts.insert(node_type.as_str().to_string(), count);
        self
    }

    /// `zeros` honest nodes preferring 0 followed by `ones` preferring 1.
    pub fn honest_split(zeros: usize, ones: usize) -> Self {
        let mut prefs = vec![Some(Preference::Zero); zeros];
        prefs.extend(vec![Some(Preference::One); ones]);
        Self::new().with_nodes(NodeType::Honest, prefs)
    }

    pub fn total_nodes(&self) -> usize {
        self.counts.values().sum()
    }

    /// Instantiate the nodes, assigning ids consecutively.
    pub fn build_nodes(&self) -> Result<Vec<Node>, ConfigError> {
        for (name, prefs) in &self.initial_preferences {
            name.parse::<NodeType>()?;
            if !self.counts.contains_key(name) && !prefs.is_empty() {
                return Err(ConfigError::PreferenceCountMismatch {
                    node_type: name.clone(),
                    expected: 0,
                    actual: prefs.len(),
                });
            }
        }

        let mut nodes = Vec::with_capacity(self.total_nodes());
        for (name, &count) in &self.counts {
            let node_type: NodeType = name.parse()?;
            let prefs = match self.initial_preferences.get(name) {
                Some(prefs) => {
                    if prefs.len() != count {
                        return Err(ConfigError::PreferenceCountMismatch {
                            node_type: name.clone(),
                            expected: count,
                            actual: prefs.len(),
                        });
                    }
                    prefs.clone()
                }
                None => vec![None; count],
            };

            for pref in prefs {
                let id = nodes.len();
                nodes.push(make_node(node_type, id, pref)?);
            }
        }
        Ok(nodes)
    }
}

/// A round-driven consensus simulation, as seen by the runner.
pub trait RoundEngine {
    fn run_round(&mut self) -> Result<(), SamplingError>;

    fn round(&self) -> Round;

    fn get_distribution(&self) -> Distribution;

    /// More than half of the honest nodes are finalized
    fn check_partial_finalization(&self) -> bool;

    /// Every honest node is finalized
    fn check_full_finalization(&self) -> bool;

    fn get_finalization_stats(&self) -> FinalizationStats;
}

pub struct Network<S: Sampler = UniformSampler> {
    nodes: Vec<Node>,
    honest: Vec<NodeId>,
    params: SnowballParameters,
    discipline: Discipline,
    sampler: S,
    rng: SimRng,
    tracker: FinalizationTracker,
}

impl Network<UniformSampler> {
    pub fn new(
        layout: &NodeLayout,
        params: SnowballParameters,
        discipline: Discipline,
        seed: Seed,
    ) -> Result<Self, ConfigError> {
        Self::with_sampler(
            layout,
            params,
            discipline,
            UniformSampler,
            SimRng::from_seed(seed),
        )
    }
}

impl<S: Sampler> Network<S> {
    pub fn with_sampler(
        layout: &NodeLayout,
        params: SnowballParameters,
        discipline: Discipline,
        sampler: S,
        rng: SimRng,
    ) -> Result<Self, ConfigError> {
        let nodes = layout.build_nodes()?;
        params.validate_for(nodes.len())?;

        let honest: Vec<NodeId> = nodes
            .iter()
            .filter(|n| n.is_honest())
            .map(|n| n.id())
            .collect();

        log::info!(
            "network: {} nodes ({} honest), {:?}, K={} αp={} αc={} β={}",
            nodes.len(),
            honest.len(),
            discipline,
            params.k,
            params.alpha_preference,
            params.alpha_confidence,
            params.beta
        );

        let mut network = Self {
            nodes,
            honest,
            params,
            discipline,
            sampler,
            rng,
            tracker: FinalizationTracker::new(),
        };
        network.observe_milestones();
        Ok(network)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn honest_ids(&self) -> &[NodeId] {
        &self.honest
    }

    pub fn params(&self) -> &SnowballParameters {
        &self.params
    }

    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// Swap parameters on a network that is kept across runs. The runner's
    /// sweeps build a fresh network per run and do not go through here.
    pub fn update_params(&mut self, params: SnowballParameters) -> Result<(), ConfigError> {
        params.validate_for(self.nodes.len())?;
        self.params = params;
        Ok(())
    }

    pub fn finalized_round(&self, id: NodeId) -> Option<Round> {
        self.tracker.finalized_round(id)
    }

    fn refresh_adversaries(&mut self) {
        let snapshot = RoundEngine::get_distribution(self);
        for node in &mut self.nodes {
            if let Node::LNode(lnode) = node {
                lnode.update_distribution(snapshot);
            }
        }
    }

    fn query_peers(&mut self, id: NodeId) -> Result<Vec<Response>, SamplingError> {
        let requester = self.nodes[id].preference();
        let peers = self
            .sampler
            .sample(&mut self.rng, id, self.nodes.len(), self.params.k)?;
        Ok(peers
            .into_iter()
            .map(|peer| self.nodes[peer].on_query(requester))
            .collect())
    }

    fn advance(&mut self, id: NodeId, responses: &[Response]) {
        if let Some(node) = self.nodes[id].as_honest_mut() {
            node.advance(responses, &self.params);
        }
    }

    fn unfinished_honest(&self) -> Vec<NodeId> {
        self.honest
            .iter()
            .copied()
            .filter(|id| !self.nodes[*id].is_finalized())
            .collect()
    }

    fn lockstep_round(&mut self) -> Result<(), SamplingError> {
        self.refresh_adversaries();

        // Phase 1: collect every response against the pre-round state
        let active = self.unfinished_honest();
        let mut collected = Vec::with_capacity(active.len());
        for id in active {
            let responses = self.query_peers(id)?;
            collected.push((id, responses));
        }

        // Phase 2: apply
        for (id, responses) in &collected {
            self.advance(*id, responses);
        }

        self.finish_round();
        Ok(())
    }

    fn random_node_round(&mut self) -> Result<(), SamplingError> {
        self.refresh_adversaries();

        let id = match self.unfinished_honest().choose(&mut self.rng) {
            Some(id) => *id,
            None => return Ok(()),
        };

        let responses = self.query_peers(id)?;
        self.advance(id, &responses);

        self.finish_round();
        Ok(())
    }

    fn finish_round(&mut self) {
        for &id in &self.honest {
            if self.nodes[id].is_finalized() {
                self.tracker.record(id);
            }
        }
        self.tracker.end_round();
        self.observe_milestones();
    }

    fn observe_milestones(&mut self) {
        let partial = self.check_partial_finalization();
        let full = self.check_full_finalization();
        self.tracker.observe(partial, full);
    }

    fn finalized_honest(&self) -> usize {
        self.honest
            .iter()
            .filter(|id| self.nodes[**id].is_finalized())
            .count()
    }
}

impl<S: Sampler> RoundEngine for Network<S> {
    fn run_round(&mut self) -> Result<(), SamplingError> {
        match self.discipline {
            Discipline::Lockstep => self.lockstep_round(),
            Discipline::RandomNode => self.random_node_round(),
        }
    }

    fn round(&self) -> Round {
        self.tracker.round()
    }

    fn get_distribution(&self) -> Distribution {
        let mut dist = Distribution::default();
        for p in self.nodes.iter().filter_map(|n| n.preference()) {
            dist.add(p);
        }
        dist
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

    fn params() -> SnowballParameters {
        SnowballParameters::new(3, 2, 2, 3).unwrap()
    }

    fn run_until_full<S: Sampler>(net: &mut Network<S>, cap: usize) {
        for _ in 0..cap {
            if net.check_full_finalization() {
                break;
            }
            net.run_round().unwrap();
        }
    }

    /// Node i always queries i+1 .. i+k (mod population).
    struct RingSampler;

    impl Sampler for RingSampler {
        fn sample(
            &self,
            _rng: &mut SimRng,
            querier: NodeId,
            population: usize,
            k: usize,
        ) -> Result<Vec<NodeId>, SamplingError> {
            Ok((1..=k).map(|d| (querier + d) % population).collect())
        }
    }

    #[test]
    fn test_unanimous_network_finalizes_at_beta() {
        let layout = NodeLayout::honest_split(5, 0);
        let mut net = Network::new(&layout, params(), Discipline::Lockstep, [42u8; 32]).unwrap();

        for _ in 0..3 {
            assert!(!net.check_full_finalization());
            net.run_round().unwrap();
        }

        assert!(net.check_full_finalization());
        let stats = net.get_finalization_stats();
        assert_eq!(stats.rounds_to_full, Some(3));
        assert_eq!(stats.rounds_to_partial, Some(3));
        assert_eq!(stats.per_node_rounds.len(), 5);
        assert!(stats.per_node_rounds.values().all(|r| *r == 2));
        assert_eq!(stats.distribution, Distribution::new(5, 0));

        for node in net.nodes() {
            let honest = node.as_honest().unwrap();
            assert_eq!(honest.state().preference, Some(Preference::Zero));
            assert_eq!(honest.confidence(), 3);
        }
    }

    #[test]
    fn test_lockstep_split_network() {
        let layout = NodeLayout::honest_split(10, 10);
        let mut net = Network::new(&layout, params(), Discipline::Lockstep, [7u8; 32]).unwrap();

        assert_eq!(net.get_distribution(), Distribution::new(10, 10));
        assert!(!net.check_full_finalization());
        assert!(!net.check_partial_finalization());

        run_until_full(&mut net, 1000);

        let stats = net.get_finalization_stats();
        assert!(stats.rounds_to_full.is_some());
        assert!(stats.rounds_to_partial <= stats.rounds_to_full);
        assert_eq!(stats.per_node_rounds.len(), 20);
        assert_eq!(stats.distribution.total(), 20);
        assert_eq!(stats.rounds_to_full, Some(net.round()));
    }

    #[test]
    fn test_random_node_finalization() {
        let layout = NodeLayout::honest_split(10, 10);
        let mut net =
            Network::new(&layout, params(), Discipline::RandomNode, [3u8; 32]).unwrap();

        run_until_full(&mut net, 10_000);

        let stats = net.get_finalization_stats();
        assert!(stats.rounds_to_full.is_some());
        assert!(stats.rounds_to_partial <= stats.rounds_to_full);
        assert_eq!(stats.per_node_rounds.len(), 20);
        assert_eq!(stats.distribution.total(), 20);

        // nothing left to advance: the round counter stays put
        let round = net.round();
        net.run_round().unwrap();
        assert_eq!(net.round(), round);
    }

    #[test]
    fn test_lockstep_uses_round_snapshot() {
        let params = SnowballParameters::new(2, 2, 2, 5).unwrap();
        let layout = NodeLayout::new().with_nodes(
            NodeType::Honest,
            vec![Some(Preference::Zero), Some(Preference::One), Some(Preference::One)],
        );
        let mut net = Network::with_sampler(
            &layout,
            params,
            Discipline::Lockstep,
            RingSampler,
            SimRng::from_seed([0u8; 32]),
        )
        .unwrap();

        net.run_round().unwrap();

        // node 0 saw [1, 1] and flipped
        let n0 = net.node(0).and_then(|n| n.as_honest()).unwrap();
        assert_eq!(n0.state().preference, Some(Preference::One));

        // node 1 queried node 0 in the same round but saw its old 0: [1, 0]
        // has no quorum, so no strength was recorded
        let n1 = net.node(1).and_then(|n| n.as_honest()).unwrap();
        assert_eq!(n1.strength(Preference::One), 0);
        assert_eq!(n1.strength(Preference::Zero), 0);
        assert_eq!(n1.confidence(), 0);
    }

    #[test]
    fn test_lnode_gets_round_snapshot() {
        let layout = NodeLayout::honest_split(4, 0).with_count(NodeType::Dynamic, 1);
        let mut net = Network::new(&layout, params(), Discipline::Lockstep, [11u8; 32]).unwrap();

        net.run_round().unwrap();

        match net.node(4) {
            Some(Node::LNode(lnode)) => {
                assert_eq!(lnode.snapshot(), Distribution::new(4, 0));
                assert_eq!(lnode.on_query(), Some(Preference::One));
            }
            other => panic!("expected an L-node, got {:?}", other),
        }

        run_until_full(&mut net, 1000);
        let stats = net.get_finalization_stats();
        // L-nodes hold no preference and are not honest
        assert_eq!(stats.per_node_rounds.len(), 4);
        assert_eq!(stats.distribution, Distribution::new(4, 0));
    }

    #[test]
    fn test_mixed_layout_ids_follow_declaration_order() {
        let layout = NodeLayout::new()
            .with_nodes(NodeType::Fixed, vec![Some(Preference::One); 2])
            .with_count(NodeType::Offline, 1)
            .with_nodes(NodeType::Honest, vec![Some(Preference::Zero); 3]);
        let net = Network::new(&layout, params(), Discipline::Lockstep, [1u8; 32]).unwrap();

        let types: Vec<NodeType> = net.nodes().iter().map(|n| n.node_type()).collect();
        assert_eq!(
            types,
            vec![
                NodeType::Fixed,
                NodeType::Fixed,
                NodeType::Offline,
                NodeType::Honest,
                NodeType::Honest,
                NodeType::Honest
            ]
        );
        assert_eq!(net.honest_ids(), &[3, 4, 5]);
        assert!(net.nodes().iter().enumerate().all(|(i, n)| n.id() == i));
        assert_eq!(net.get_distribution(), Distribution::new(3, 2));
    }

    #[test]
    fn test_unset_honest_nodes_adopt_on_query() {
        let layout = NodeLayout::new().with_nodes(
            NodeType::Honest,
            vec![Some(Preference::One), None, None, None],
        );
        let mut net = Network::new(&layout, params(), Discipline::Lockstep, [2u8; 32]).unwrap();
        assert_eq!(net.get_distribution(), Distribution::new(0, 1));

        run_until_full(&mut net, 1000);
        assert_eq!(net.get_distribution(), Distribution::new(0, 4));
    }

    #[test]
    fn test_no_honest_nodes() {
        let layout = NodeLayout::new().with_nodes(NodeType::Fixed, vec![Some(Preference::Zero); 4]);
        let mut net = Network::new(&layout, params(), Discipline::RandomNode, [2u8; 32]).unwrap();

        assert!(net.check_full_finalization());
        assert!(!net.check_partial_finalization());
        net.run_round().unwrap();
        assert_eq!(net.round(), 0);
        assert_eq!(net.get_finalization_stats().rounds_to_full, Some(0));
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let layout = NodeLayout::honest_split(8, 7).with_count(NodeType::Dynamic, 2);
        let run = |seed| {
            let mut net = Network::new(&layout, params(), Discipline::Lockstep, seed).unwrap();
            for _ in 0..40 {
                net.run_round().unwrap();
            }
            net.get_finalization_stats()
        };

        assert_eq!(run([21u8; 32]), run([21u8; 32]));
    }

    #[test]
    fn test_layout_errors() {
        let mut mismatch = NodeLayout::new()
            .with_count(NodeType::Honest, 3)
            .with_nodes(NodeType::Fixed, vec![Some(Preference::Zero)]);
        mismatch.counts.insert("fixed".to_string(), 2);
        assert_eq!(
            mismatch.build_nodes().unwrap_err(),
            ConfigError::PreferenceCountMismatch {
                node_type: "fixed".to_string(),
                expected: 2,
                actual: 1
            }
        );

        let mut unknown = NodeLayout::honest_split(3, 3);
        unknown.counts.insert("byzantine".to_string(), 1);
        assert_eq!(
            unknown.build_nodes().unwrap_err(),
            ConfigError::UnknownNodeType("byzantine".to_string())
        );

        let mut orphan = NodeLayout::honest_split(3, 3);
        orphan
            .initial_preferences
            .insert("offline".to_string(), vec![None]);
        assert_eq!(
            orphan.build_nodes().unwrap_err(),
            ConfigError::PreferenceCountMismatch {
                node_type: "offline".to_string(),
                expected: 0,
                actual: 1
            }
        );

        let missing = NodeLayout::honest_split(2, 0).with_count(NodeType::Fixed, 1);
        assert_eq!(
            missing.build_nodes().unwrap_err(),
            ConfigError::MissingFixedPreference { node_id: 2 }
        );

        let too_small = NodeLayout::honest_split(2, 1);
        assert_eq!(
            Network::new(&too_small, params(), Discipline::Lockstep, [0u8; 32]).err(),
            Some(ConfigError::SampleSizeTooLarge { k: 3, available: 2 })
        );
    }

    #[test]
    fn test_update_params_between_runs() {
        let layout = NodeLayout::honest_split(3, 2);
        let mut net = Network::new(&layout, params(), Discipline::Lockstep, [0u8; 32]).unwrap();

        let swept = params().with_alpha_confidence(3).unwrap();
        net.update_params(swept).unwrap();
        assert_eq!(net.params().alpha_confidence, 3);

        let too_big = SnowballParameters::new(5, 3, 3, 3).unwrap();
        assert!(net.update_params(too_big).is_err());
        assert_eq!(net.params().k, 3);
    }
}
