use thiserror::Error;

use crate::sb_interface::NodeId;

/// Rejected inputs, detected before any round runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("sample size K must be positive")]
    SampleSizeZero,

    #[error("AlphaPreference {alpha} must be in 1..={k}")]
    AlphaPreferenceOutOfRange { alpha: usize, k: usize },

    #[error("AlphaConfidence {alpha} must be in 1..={k}")]
    AlphaConfidenceOutOfRange { alpha: usize, k: usize },

    #[error("Beta must be positive")]
    BetaZero,

    #[error("sample size K={k} exceeds the {available} peers available")]
    SampleSizeTooLarge { k: usize, available: usize },

    #[error("unknown node type: {0} (supported: honest, fixed, offline, dynamic)")]
    UnknownNodeType(String),

    #[error("preference list for '{node_type}' has {actual} entries, expected {expected}")]
    PreferenceCountMismatch {
        node_type: String,
        expected: usize,
        actual: usize,
    },

    #[error("fixed node {node_id} must have a preference")]
    MissingFixedPreference { node_id: NodeId },

    #[error("invalid slush configuration: {0}")]
    InvalidSlush(String),

    #[error("the batched engine only implements the lockstep discipline")]
    BatchedRequiresLockstep,

    #[error("invalid seed: {0}")]
    InvalidSeed(String),
}

/// Raised at the point of sampling; fatal to the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SamplingError {
    #[error("cannot sample {requested} distinct peers out of {available}")]
    SampleTooLarge { requested: usize, available: usize },
}

#[derive(Error, Debug)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("sampling error: {0}")]
    Sampling(#[from] SamplingError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
