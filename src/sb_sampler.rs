use rand::seq::index;

use crate::sb_error::SamplingError;
use crate::sb_interface::{NodeId, SimRng};

/// Chooses which peers a node queries.
///
/// Implementations draw from the supplied rng only, so a run is reproducible
/// from its seed.
pub trait Sampler {
    /// Pick `k` distinct ids out of `0..population`, never `querier`.
    fn sample(
        &self,
        rng: &mut SimRng,
        querier: NodeId,
        population: usize,
        k: usize,
    ) -> Result<Vec<NodeId>, SamplingError>;
}

/// Uniform choice without replacement.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformSampler;

impl Sampler for UniformSampler {
    fn sample(
        &self,
        rng: &mut SimRng,
        querier: NodeId,
        population: usize,
        k: usize,
    ) -> Result<Vec<NodeId>, SamplingError> {
        // querier outside the population excludes nobody
        let available = if querier < population {
            population - 1
        } else {
            population
        };
        if k > available {
            return Err(SamplingError::SampleTooLarge {
                requested: k,
                available,
            });
        }

        // draw from the candidates with the querier removed, then shift back
        Ok(index::sample(rng, available, k)
            .into_iter()
            .map(|i| if i >= querier { i + 1 } else { i })
            .collect())
    }
}
