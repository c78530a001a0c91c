//! Snowball update rule
//!
//! The quorum/confidence state machine of a single honest node, kept free of
//! sampling and networking so that the per-node network and the batched
//! engine apply exactly the same arithmetic.
//!
//! One update, given the tally of a sample:
//! 1. finalized or unset preference: nothing happens
//! 2. no votes at all: confidence resets
//! 3. majority below AlphaPreference: confidence resets, strength untouched
//! 4. strength of the majority grows; preference follows only when that
//!    strength is now strictly greater than the other side's
//! 5. majority below AlphaConfidence: confidence resets
//! 6. a majority different from the last accepted one resets confidence,
//!    then confidence grows by one and finalizes at Beta

use serde::{Deserialize, Serialize};

use crate::sb_interface::{Preference, Response};
use crate::sb_params::SnowballParameters;

/// Votes for each value in one sample; "no response" entries are dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub zeros: usize,
    pub ones: usize,
}

impl Tally {
    pub fn from_responses(responses: &[Response]) -> Self {
        let mut tally = Self::default();
        for r in responses.iter().flatten() {
            tally.add(*r);
        }
        tally
    }

    pub fn add(&mut self, vote: Preference) {
        match vote {
            Preference::Zero => self.zeros += 1,
            Preference::One => self.ones += 1,
        }
    }

    pub fn votes(&self) -> usize {
        self.zeros + self.ones
    }

    /// Majority value and its count, `None` when the sample held no vote.
    ///
    /// Equal counts resolve to 0: the value 1 has to be strictly ahead to win.
    pub fn majority(&self) -> Option<(Preference, usize)> {
        if self.votes() == 0 {
            None
        } else if self.ones > self.zeros {
            Some((Preference::One, self.ones))
        } else {
            Some((Preference::Zero, self.zeros))
        }
    }
}

/// What a single update did, mostly for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Node was finalized or had no preference yet
    Skipped,
    /// Sample held no votes
    NoVotes,
    /// Majority below AlphaPreference
    BelowPreferenceQuorum,
    /// Strength recorded, majority below AlphaConfidence
    BelowConfidenceQuorum,
    /// Confidence advanced
    Confident,
    /// Confidence reached Beta on this update
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnowballState {
    pub preference: Option<Preference>,
    pub finalized: bool,
    pub confidence: usize,
    /// Indexed by `Preference::index`
    pub strength: [usize; 2],
    pub last_majority: Option<Preference>,
}

impl SnowballState {
    pub fn new(preference: Option<Preference>) -> Self {
        Self {
            preference,
            finalized: false,
            confidence: 0,
            strength: [0, 0],
            last_majority: None,
        }
    }

    pub fn strength_of(&self, p: Preference) -> usize {
        self.strength[p.index()]
    }

    pub fn update(&mut self, tally: Tally, params: &SnowballParameters) -> UpdateOutcome {
        if self.finalized || self.preference.is_none() {
            return UpdateOutcome::Skipped;
        }

        let (majority, count) = match tally.majority() {
            Some(m) => m,
            None => {
                self.confidence = 0;
                return UpdateOutcome::NoVotes;
            }
        };

        if count < params.alpha_preference {
            self.confidence = 0;
            return UpdateOutcome::BelowPreferenceQuorum;
        }

        self.strength[majority.index()] += 1;
        if self.strength_of(majority) > self.strength_of(majority.other()) {
            self.preference = Some(majority);
        }

        if count < params.alpha_confidence {
            self.confidence = 0;
            return UpdateOutcome::BelowConfidenceQuorum;
        }

        if self.last_majority != Some(majority) {
            self.confidence = 0;
        }
        self.last_majority = Some(majority);
        self.confidence += 1;

        if self.confidence >= params.beta {
            self.finalized = true;
            UpdateOutcome::Finalized
        } else {
            UpdateOutcome::Confident
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZERO: Response = Some(Preference::Zero);
    const ONE: Response = Some(Preference::One);

    fn params() -> SnowballParameters {
        SnowballParameters::new(3, 2, 2, 3).unwrap()
    }

    #[test]
    fn test_tally_ignores_no_response() {
        let tally = Tally::from_responses(&[ONE, None, ZERO, ONE, None]);
        assert_eq!(tally, Tally { zeros: 1, ones: 2 });
        assert_eq!(tally.majority(), Some((Preference::One, 2)));
        assert_eq!(Tally::from_responses(&[None, None]).majority(), None);
    }

    #[test]
    fn test_tally_tie_resolves_to_zero() {
        let tally = Tally::from_responses(&[ONE, ZERO]);
        assert_eq!(tally.majority(), Some((Preference::Zero, 1)));
    }

    #[test]
    fn test_unset_preference_is_noop() {
        let mut state = SnowballState::new(None);
        let outcome = state.update(Tally::from_responses(&[ONE, ONE, ONE]), &params());
        assert_eq!(outcome, UpdateOutcome::Skipped);
        assert_eq!(state, SnowballState::new(None));
    }

    #[test]
    fn test_no_votes_resets_confidence() {
        let mut state = SnowballState::new(Some(Preference::Zero));
        state.update(Tally::from_responses(&[ZERO, ZERO, ZERO]), &params());
        assert_eq!(state.confidence, 1);

        let outcome = state.update(Tally::from_responses(&[None, None, None]), &params());
        assert_eq!(outcome, UpdateOutcome::NoVotes);
        assert_eq!(state.confidence, 0);
        assert_eq!(state.strength, [1, 0]);
    }

    #[test]
    fn test_below_preference_quorum_keeps_strength() {
        let mut state = SnowballState::new(Some(Preference::Zero));
        state.update(Tally::from_responses(&[ZERO, ZERO, ZERO]), &params());
        let before = state.strength;

        let outcome = state.update(Tally::from_responses(&[ONE, None, None]), &params());
        assert_eq!(outcome, UpdateOutcome::BelowPreferenceQuorum);
        assert_eq!(state.strength, before);
        assert_eq!(state.confidence, 0);
        assert_eq!(state.preference, Some(Preference::Zero));
        assert!(!state.finalized);
    }

    #[test]
    fn test_finalization_after_beta_rounds() {
        let mut state = SnowballState::new(Some(Preference::Zero));
        for _ in 0..2 {
            state.update(Tally::from_responses(&[ONE, ONE, ONE]), &params());
            assert!(!state.finalized);
        }
        let outcome = state.update(Tally::from_responses(&[ONE, ONE, ONE]), &params());
        assert_eq!(outcome, UpdateOutcome::Finalized);
        assert_eq!(state.preference, Some(Preference::One));
        assert_eq!(state.confidence, 3);
        assert!(state.finalized);
    }

    #[test]
    fn test_equal_strength_does_not_flip() {
        let mut state = SnowballState::new(Some(Preference::Zero));
        // strength [0, 1] -> flips to 1
        state.update(Tally::from_responses(&[ONE, ONE, ZERO]), &params());
        assert_eq!(state.preference, Some(Preference::One));

        // strength [1, 1] -> tie, stays at 1
        state.update(Tally::from_responses(&[ZERO, ZERO, ONE]), &params());
        assert_eq!(state.strength, [1, 1]);
        assert_eq!(state.preference, Some(Preference::One));

        // strength [2, 1] -> zero strictly ahead, flips back
        state.update(Tally::from_responses(&[ZERO, ZERO, ZERO]), &params());
        assert_eq!(state.preference, Some(Preference::Zero));
    }

    #[test]
    fn test_preference_sticks_with_stronger_side() {
        let mut state = SnowballState::new(Some(Preference::Zero));
        state.update(Tally::from_responses(&[ONE, ONE, ONE]), &params());
        state.update(Tally::from_responses(&[ONE, ONE, ONE]), &params());
        state.update(Tally::from_responses(&[ZERO, ZERO, ZERO]), &params());

        assert_eq!(state.strength, [1, 2]);
        assert_eq!(state.preference, Some(Preference::One));
        // majority changed from the last accepted one
        assert_eq!(state.confidence, 1);
    }

    #[test]
    fn test_confidence_quorum_separate_from_preference_quorum() {
        let params = SnowballParameters::new(4, 2, 4, 2).unwrap();
        let mut state = SnowballState::new(Some(Preference::Zero));

        let outcome = state.update(Tally::from_responses(&[ONE, ONE, ONE, ZERO]), &params);
        assert_eq!(outcome, UpdateOutcome::BelowConfidenceQuorum);
        assert_eq!(state.preference, Some(Preference::One));
        assert_eq!(state.confidence, 0);
        assert_eq!(state.last_majority, None);

        state.update(Tally::from_responses(&[ONE, ONE, ONE, ONE]), &params);
        assert_eq!(state.confidence, 1);
        assert_eq!(state.last_majority, Some(Preference::One));
    }

    #[test]
    fn test_finalized_state_is_frozen() {
        let mut state = SnowballState::new(Some(Preference::One));
        for _ in 0..3 {
            state.update(Tally::from_responses(&[ONE, ONE, ONE]), &params());
        }
        assert!(state.finalized);
        let frozen = state.clone();

        for responses in [[ZERO, ZERO, ZERO], [None, None, None], [ZERO, None, ONE]] {
            assert_eq!(
                state.update(Tally::from_responses(&responses), &params()),
                UpdateOutcome::Skipped
            );
            assert_eq!(state, frozen);
        }
    }
}
