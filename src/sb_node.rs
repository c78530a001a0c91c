use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::sb_error::ConfigError;
use crate::sb_interface::{Distribution, NodeId, Preference, Response};
use crate::sb_params::SnowballParameters;
use crate::sb_snowball::{SnowballState, Tally, UpdateOutcome};

/// Node kinds recognised in a layout. `Lnode` is accepted for `dynamic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Honest,
    Fixed,
    Offline,
    #[serde(alias = "Lnode", alias = "lnode")]
    Dynamic,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Honest => "honest",
            NodeType::Fixed => "fixed",
            NodeType::Offline => "offline",
            NodeType::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "honest" => Ok(NodeType::Honest),
            "fixed" => Ok(NodeType::Fixed),
            "offline" => Ok(NodeType::Offline),
            "dynamic" | "Lnode" | "lnode" => Ok(NodeType::Dynamic),
            other => Err(ConfigError::UnknownNodeType(other.to_string())),
        }
    }
}

/// Honest participant running the Snowball state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HonestNode {
    id: NodeId,
    state: SnowballState,
}

impl HonestNode {
    pub fn new(id: NodeId, preference: Option<Preference>) -> Self {
        Self {
            id,
            state: SnowballState::new(preference),
        }
    }

    pub fn state(&self) -> &SnowballState {
        &self.state
    }

    pub fn confidence(&self) -> usize {
        self.state.confidence
    }

    pub fn strength(&self, p: Preference) -> usize {
        self.state.strength_of(p)
    }

    /// Report the current preference. A node without one adopts the
    /// requester's and answers "no response" for this query.
    pub fn on_query(&mut self, requester: Option<Preference>) -> Response {
        match self.state.preference {
            Some(p) => Some(p),
            None => {
                self.state.preference = requester;
                None
            }
        }
    }

    pub fn advance(&mut self, responses: &[Response], params: &SnowballParameters) -> UpdateOutcome {
        let outcome = self.state.update(Tally::from_responses(responses), params);
        if outcome == UpdateOutcome::Finalized {
            log::debug!(
                "node {} finalized on {:?} (strength {:?})",
                self.id,
                self.state.preference,
                self.state.strength
            );
        }
        outcome
    }
}

/// Liveness attacker: echoes whatever is currently the minority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LNode {
    id: NodeId,
    snapshot: Distribution,
}

impl LNode {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            snapshot: Distribution::default(),
        }
    }

    /// Replace the network view; called once per round before any query.
    pub fn update_distribution(&mut self, snapshot: Distribution) {
        self.snapshot = snapshot;
    }

    pub fn snapshot(&self) -> Distribution {
        self.snapshot
    }

    pub fn on_query(&self) -> Response {
        Some(self.snapshot.minority())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Honest(HonestNode),
    /// Finalized at birth, always answers its preference
    Fixed { id: NodeId, preference: Preference },
    /// Finalized at birth, never answers
    Offline { id: NodeId },
    LNode(LNode),
}

impl Node {
    pub fn id(&self) -> NodeId {
        match self {
            Node::Honest(n) => n.id,
            Node::Fixed { id, .. } | Node::Offline { id } => *id,
            Node::LNode(n) => n.id,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Honest(_) => NodeType::Honest,
            Node::Fixed { .. } => NodeType::Fixed,
            Node::Offline { .. } => NodeType::Offline,
            Node::LNode(_) => NodeType::Dynamic,
        }
    }

    pub fn preference(&self) -> Option<Preference> {
        match self {
            Node::Honest(n) => n.state.preference,
            Node::Fixed { preference, .. } => Some(*preference),
            Node::Offline { .. } | Node::LNode(_) => None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        match self {
            Node::Honest(n) => n.state.finalized,
            Node::Fixed { .. } | Node::Offline { .. } => true,
            // never finalizes, but never advances either
            Node::LNode(_) => false,
        }
    }

    pub fn is_honest(&self) -> bool {
        matches!(self, Node::Honest(_))
    }

    pub fn as_honest(&self) -> Option<&HonestNode> {
        match self {
            Node::Honest(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_honest_mut(&mut self) -> Option<&mut HonestNode> {
        match self {
            Node::Honest(n) => Some(n),
            _ => None,
        }
    }

    pub fn on_query(&mut self, requester: Option<Preference>) -> Response {
        match self {
            Node::Honest(n) => n.on_query(requester),
            Node::Fixed { preference, .. } => Some(*preference),
            Node::Offline { .. } => None,
            Node::LNode(n) => n.on_query(),
        }
    }
}

/// Build a node of the given type.
pub fn make_node(
    node_type: NodeType,
    id: NodeId,
    preference: Option<Preference>,
) -> Result<Node, ConfigError> {
    match node_type {
        NodeType::Honest => Ok(Node::Honest(HonestNode::new(id, preference))),
        NodeType::Fixed => match preference {
            Some(preference) => Ok(Node::Fixed { id, preference }),
            None => Err(ConfigError::MissingFixedPreference { node_id: id }),
        },
        NodeType::Offline => Ok(Node::Offline { id }),
        NodeType::Dynamic => Ok(Node::LNode(LNode::new(id))),
    }
}
