//! Snowball protocol parameters

use serde::{Deserialize, Serialize};

use crate::sb_error::ConfigError;

/// Quorum and confidence thresholds shared by every honest node of a run.
///
/// `alpha_confidence` below `alpha_preference` is accepted: confidence then
/// progresses more easily than preference strength, which is unusual but
/// legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnowballParameters {
    /// Number of peers sampled per query round
    pub k: usize,

    /// Same-valued votes needed to register a preference-strength vote
    pub alpha_preference: usize,

    /// Same-valued votes needed to advance the confidence counter
    pub alpha_confidence: usize,

    /// Consecutive confident rounds needed to finalize
    pub beta: usize,
}

impl Default for SnowballParameters {
    fn default() -> Self {
        Self {
            k: 21,
            alpha_preference: 11,
            alpha_confidence: 11,
            beta: 30,
        }
    }
}

impl SnowballParameters {
    pub fn new(
        k: usize,
        alpha_preference: usize,
        alpha_confidence: usize,
        beta: usize,
    ) -> Result<Self, ConfigError> {
        let params = Self {
            k,
            alpha_preference,
            alpha_confidence,
            beta,
        };
        params.validate()?;
        Ok(params)
    }

    /// Check `0 < alpha <= K` for both quorums and `Beta > 0`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k == 0 {
            return Err(ConfigError::SampleSizeZero);
        }
        if self.alpha_preference == 0 || self.alpha_preference > self.k {
            return Err(ConfigError::AlphaPreferenceOutOfRange {
                alpha: self.alpha_preference,
                k: self.k,
            });
        }
        if self.alpha_confidence == 0 || self.alpha_confidence > self.k {
            return Err(ConfigError::AlphaConfidenceOutOfRange {
                alpha: self.alpha_confidence,
                k: self.k,
            });
        }
        if self.beta == 0 {
            return Err(ConfigError::BetaZero);
        }
        Ok(())
    }

    /// Like `validate`, and additionally require `K <= total_nodes - 1`.
    pub fn validate_for(&self, total_nodes: usize) -> Result<(), ConfigError> {
        self.validate()?;
        let available = total_nodes.saturating_sub(1);
        if self.k > available {
            return Err(ConfigError::SampleSizeTooLarge {
                k: self.k,
                available,
            });
        }
        Ok(())
    }

    /// Copy with a different AlphaConfidence, for sweeps.
    pub fn with_alpha_confidence(&self, alpha_confidence: usize) -> Result<Self, ConfigError> {
        Self::new(self.k, self.alpha_preference, alpha_confidence, self.beta)
    }
}
