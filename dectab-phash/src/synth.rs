use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::hash::{Hash, HashKind, FKS_PRIME};
use crate::keys::KeySet;
use crate::search::{table_sizes, SplitMix64};
use crate::{fks, mul};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of increments between `n` and `max_factor * n` table slots.
    pub growth_steps: usize,
    pub max_factor: f64,
    pub multiplier_attempts: usize,
    pub fks_attempts: usize,
    /// Largest first-level bucket a two-level function may have.
    pub max_bucket_size: usize,
    pub first_level_attempts: usize,
    pub seed: u64,
    /// Smallest keys-per-slot ratio a top-level hashed table may have;
    /// smaller candidate sizes are skipped.
    pub min_load_factor: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            growth_steps: 10,
            max_factor: 2.0,
            multiplier_attempts: 512,
            fks_attempts: 512,
            max_bucket_size: 8,
            first_level_attempts: 256,
            seed: 0x5EED_DEC7_AB1E_0001,
            min_load_factor: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HashFunction {
    OneLevel(Hash),
    /// `buckets[first.index(key)]` is the second-level function for `key`;
    /// `None` marks a first-level slot no key lands in.
    TwoLevel {
        first: Hash,
        buckets: Vec<Option<Hash>>,
    },
}

/// Where a key lands in a one- or two-level table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Slot {
    Direct(usize),
    Nested { bucket: usize, index: usize },
}

impl HashFunction {
    pub fn kind(&self) -> HashKind {
        match self {
            Self::OneLevel(hash) => hash.kind(),
            Self::TwoLevel { .. } => HashKind::TwoLevel,
        }
    }

    /// Slots of the one-level table, or first-level buckets.
    pub fn size(&self) -> usize {
        match self {
            Self::OneLevel(hash) => hash.size(),
            Self::TwoLevel { first, .. } => first.size(),
        }
    }

    pub fn needs_validation(&self) -> bool {
        match self {
            Self::OneLevel(hash) => hash.needs_validation(),
            Self::TwoLevel { .. } => true,
        }
    }

    pub fn slot(&self, key: u64) -> Option<Slot> {
        match self {
            Self::OneLevel(hash) => hash.index(key).map(Slot::Direct),
            Self::TwoLevel { first, buckets } => {
                let bucket = first.index(key)?;
                let index = buckets.get(bucket)?.as_ref()?.index(key)?;
                Some(Slot::Nested { bucket, index })
            }
        }
    }

    /// Largest number of keys sharing one first-level bucket.
    pub fn max_bucket_load(&self, keys: &KeySet) -> usize {
        match self {
            Self::OneLevel(_) => 1,
            Self::TwoLevel { first, .. } => {
                let mut loads = vec![0usize; first.size()];
                for slot in keys.iter().filter_map(|key| first.index(key)) {
                    loads[slot] += 1;
                }
                loads.into_iter().max().unwrap_or(0)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Synthesizer {
    config: SearchConfig,
}

impl Synthesizer {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Escalate trivial, linear, multiplicative, FKS, then two-level until
    /// one is collision-free on `keys`.
    pub fn synthesize(&self, keys: &KeySet) -> Result<HashFunction, Error> {
        let mut rng = SplitMix64::new(self.config.seed);

        if keys.width() == 0 {
            return Ok(HashFunction::OneLevel(Hash::Trivial));
        }

        if let Some(hash) = self.one_level(keys, self.config.min_load_factor, &mut rng) {
            log::debug!("{} hash of size {} for {} keys", hash.kind(), hash.size(), keys.len());
            return Ok(HashFunction::OneLevel(hash));
        }

        self.two_level(keys, &mut rng)
    }

    fn one_level(&self, keys: &KeySet, min_load: f64, rng: &mut SplitMix64) -> Option<Hash> {
        if keys.is_contiguous() {
            return Some(Hash::Linear {
                min: keys.min(),
                size: keys.len(),
            });
        }

        let n = keys.len();
        let sizes = table_sizes(n, self.config.growth_steps, self.config.max_factor)
            .into_iter()
            .filter(|&size| n as f64 / size as f64 >= min_load)
            .collect::<Vec<_>>();

        if sizes.is_empty() {
            return None;
        }

        mul::search(keys, &sizes, self.config.multiplier_attempts, rng)
            .or_else(|| fks::search(keys, &sizes, self.config.fks_attempts, rng))
    }

    fn two_level(&self, keys: &KeySet, rng: &mut SplitMix64) -> Result<HashFunction, Error> {
        let n = keys.len();
        let mut first_sizes = vec![(n + 3) / 4, (n + 1) / 2, n];
        first_sizes.iter_mut().for_each(|size| *size = (*size).max(1));
        first_sizes.dedup();

        let mut second_level_failure = None;

        for &size in first_sizes.iter() {
            for attempt in 0..self.config.first_level_attempts {
                let first = if attempt % 2 == 0 {
                    Hash::Multiplicative {
                        multiplier: rng.next_u64() | 1,
                        size,
                    }
                } else {
                    Hash::Fks {
                        a: rng.next_u64() % (FKS_PRIME - 1) + 1,
                        b: rng.next_u64() % FKS_PRIME,
                        size,
                    }
                };

                let mut partition = vec![Vec::new(); size];
                for key in keys.iter() {
                    if let Some(slot) = first.index(key) {
                        partition[slot].push(key);
                    }
                }

                let widest = partition.iter().map(Vec::len).max().unwrap_or(0);
                if widest > self.config.max_bucket_size {
                    continue;
                }

                match self.second_level(keys.width(), partition, rng) {
                    Ok(buckets) => {
                        log::debug!(
                            "two-level hash with {size} buckets (largest {widest}) for {n} keys"
                        );
                        return Ok(HashFunction::TwoLevel { first, buckets });
                    }
                    Err(failure) => {
                        log::trace!("first level of size {size} rejected: {failure}");
                        second_level_failure = Some(failure);
                    }
                }
            }
        }

        Err(second_level_failure.unwrap_or(Error::Exhausted { keys: n }))
    }

    fn second_level(
        &self,
        width: u8,
        partition: Vec<Vec<u64>>,
        rng: &mut SplitMix64,
    ) -> Result<Vec<Option<Hash>>, Error> {
        partition
            .into_iter()
            .enumerate()
            .map(|(bucket, keys)| {
                if keys.is_empty() {
                    return Ok(None);
                }
                let count = keys.len();
                let keys = KeySet::new(keys, width)?;
                self.one_level(&keys, 0.0, rng)
                    .map(Some)
                    .ok_or(Error::SecondLevel {
                        bucket,
                        keys: count,
                    })
            })
            .collect()
    }
}
