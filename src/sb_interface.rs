use std::fmt;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::sb_error::ConfigError;

// ids are assigned consecutively in layout order, so they double as indices
pub type NodeId = usize;
pub type Round = usize;

pub type SimRng = StdRng;
pub type Seed = [u8; 32];

/// Answer to a query. `None` is "no response" (offline peer, or an honest
/// peer that only just adopted the requester's preference).
pub type Response = Option<Preference>;

/// Binary opinion of a node. An unset preference is modelled as
/// `Option<Preference>::None` by the holders, never as a third variant here.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Preference {
    Zero,
    One,
}

impl Preference {
    pub fn other(self) -> Self {
        match self {
            Preference::Zero => Preference::One,
            Preference::One => Preference::Zero,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Preference::Zero => 0,
            Preference::One => 1,
        }
    }
}

impl TryFrom<u8> for Preference {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Preference::Zero),
            1 => Ok(Preference::One),
            other => Err(format!("preference must be 0 or 1, got {}", other)),
        }
    }
}

impl From<Preference> for u8 {
    fn from(p: Preference) -> u8 {
        p.index() as u8
    }
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Count of nodes holding each concrete preference.
///
/// Serialized as `{"0": zeros, "1": ones}` to stay compatible with the
/// downstream tooling that reads the per-run records.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    #[serde(rename = "0")]
    pub zeros: usize,
    #[serde(rename = "1")]
    pub ones: usize,
}

impl Distribution {
    pub fn new(zeros: usize, ones: usize) -> Self {
        Self { zeros, ones }
    }

    pub fn from_preferences<'a, I>(prefs: I) -> Self
    where
        I: IntoIterator<Item = &'a Option<Preference>>,
    {
        let mut dist = Self::default();
        for p in prefs.into_iter().flatten() {
            dist.add(*p);
        }
        dist
    }

    pub fn add(&mut self, p: Preference) {
        match p {
            Preference::Zero => self.zeros += 1,
            Preference::One => self.ones += 1,
        }
    }

    pub fn count(&self, p: Preference) -> usize {
        match p {
            Preference::Zero => self.zeros,
            Preference::One => self.ones,
        }
    }

    pub fn total(&self) -> usize {
        self.zeros + self.ones
    }

    /// The side an L-node pushes: 0 only when 1 is strictly ahead, so a tie
    /// answers 1.
    pub fn minority(&self) -> Preference {
        if self.ones > self.zeros {
            Preference::Zero
        } else {
            Preference::One
        }
    }

    pub fn merge(&mut self, other: &Distribution) {
        self.zeros += other.zeros;
        self.ones += other.ones;
    }
}

/// Get or generate seed
pub fn resolve_seed(seed: Option<Seed>) -> Seed {
    seed.unwrap_or_else(|| {
        let mut temp_rng = StdRng::from_entropy();
        let mut seed = [0u8; 32];
        temp_rng.fill_bytes(&mut seed);
        seed
    })
}

/// Draw an independent child seed, one per simulation run.
pub fn derive_seed(master: &mut SimRng) -> Seed {
    let mut seed = [0u8; 32];
    master.fill_bytes(&mut seed);
    seed
}

/// Parse a (optionally `0x` prefixed) hex string into a seed. Shorter input
/// fills the leading bytes and leaves the rest zero.
pub fn parse_seed_hex(hex: &str) -> Result<Seed, ConfigError> {
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    if hex.is_empty() || hex.len() % 2 != 0 || hex.len() > 64 {
        return Err(ConfigError::InvalidSeed(hex.to_string()));
    }

    let mut seed = [0u8; 32];
    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let byte_str =
            std::str::from_utf8(chunk).map_err(|_| ConfigError::InvalidSeed(hex.to_string()))?;
        seed[i] = u8::from_str_radix(byte_str, 16)
            .map_err(|_| ConfigError::InvalidSeed(hex.to_string()))?;
    }

    Ok(seed)
}

pub fn seed_hex(seed: &Seed) -> String {
    let mut out = String::with_capacity(66);
    out.push_str("0x");
    for b in seed {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minority_tie_breaks_to_one() {
        assert_eq!(Distribution::new(70, 30).minority(), Preference::One);
        assert_eq!(Distribution::new(40, 60).minority(), Preference::Zero);
        assert_eq!(Distribution::new(25, 25).minority(), Preference::One);
        assert_eq!(Distribution::default().minority(), Preference::One);
    }

    #[test]
    fn test_distribution_skips_unset() {
        let prefs = vec![
            Some(Preference::Zero),
            None,
            Some(Preference::One),
            Some(Preference::Zero),
        ];
        let dist = Distribution::from_preferences(&prefs);
        assert_eq!(dist, Distribution::new(2, 1));
        assert_eq!(dist.total(), 3);
    }

    #[test]
    fn test_distribution_json_keys() {
        let json = serde_json::to_string(&Distribution::new(3, 4)).unwrap();
        assert_eq!(json, r#"{"0":3,"1":4}"#);
    }

    #[test]
    fn test_preference_from_yaml_integer() {
        let prefs: Vec<Option<Preference>> = serde_yaml::from_str("[0, 1, null]").unwrap();
        assert_eq!(prefs, vec![Some(Preference::Zero), Some(Preference::One), None]);
        assert!(serde_yaml::from_str::<Preference>("2").is_err());
    }

    #[test]
    fn test_parse_seed_hex() {
        let seed = parse_seed_hex("0x0102ff").unwrap();
        assert_eq!(&seed[..3], &[1, 2, 255]);
        assert!(seed[3..].iter().all(|b| *b == 0));

        assert!(parse_seed_hex("0xabc").is_err());
        assert!(parse_seed_hex("zz").is_err());
        assert!(parse_seed_hex("").is_err());

        let round_trip = parse_seed_hex(&seed_hex(&[7u8; 32])).unwrap();
        assert_eq!(round_trip, [7u8; 32]);
    }

    #[test]
    fn test_derived_seeds_are_reproducible() {
        let mut a = SimRng::from_seed([42u8; 32]);
        let mut b = SimRng::from_seed([42u8; 32]);
        let first = derive_seed(&mut a);
        assert_eq!(first, derive_seed(&mut b));
        assert_ne!(first, derive_seed(&mut a));
    }
}
