use crate::chain_params::ChainParams;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Number of reduction intervals precomputed below the current one.
const SUBSIDY_CACHE_INIT_WIDTH: u64 = 4;

/// Block subsidies per reduction interval.
///
/// The subsidy of interval `n` is the base subsidy scaled by `mul / div` `n` times, with the
/// integer division applied at every step.
pub struct SubsidyCache {
    cache: RwLock<HashMap<u64, u64>>,
    base_subsidy: u64,
    mul_subsidy: u64,
    div_subsidy: u64,
    reduction_interval: u64,
}

impl SubsidyCache {
    /// Creates a cache warmed up for blocks around `layer`.
    pub fn new(layer: u64, params: &ChainParams) -> Self {
        let cache = Self {
            cache: RwLock::new(HashMap::new()),
            base_subsidy: params.base_subsidy,
            mul_subsidy: params.mul_subsidy,
            div_subsidy: params.div_subsidy.max(1),
            reduction_interval: params.subsidy_reduction_interval.max(1),
        };

        let iteration = layer / cache.reduction_interval;
        if iteration >= SUBSIDY_CACHE_INIT_WIDTH {
            for i in iteration - SUBSIDY_CACHE_INIT_WIDTH..=iteration {
                cache.calc_block_subsidy(i * cache.reduction_interval);
            }
        }

        cache
    }

    /// Subsidy of a block at main chain `layer`.
    pub fn calc_block_subsidy(&self, layer: u64) -> u64 {
        let iteration = layer / self.reduction_interval;
        if iteration == 0 {
            return self.base_subsidy;
        }

        if let Some(subsidy) = self.cache.read().get(&iteration) {
            return *subsidy;
        }

        let previous = self.cache.read().get(&(iteration - 1)).copied();
        let subsidy = match previous {
            Some(previous) => self.reduce(previous),
            None => (0..iteration).fold(self.base_subsidy, |subsidy, _| self.reduce(subsidy)),
        };

        self.cache.write().insert(iteration, subsidy);
        subsidy
    }

    fn reduce(&self, subsidy: u64) -> u64 {
        let reduced = u128::from(subsidy) * u128::from(self.mul_subsidy) / u128::from(self.div_subsidy);
        u64::try_from(reduced).unwrap_or(u64::MAX)
    }
}
