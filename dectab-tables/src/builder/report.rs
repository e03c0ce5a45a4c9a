use std::collections::BTreeMap;

use dectab_phash::HashKind;
use itertools::Itertools;
use serde::Serialize;
use ustr::Ustr;

use super::bucket::BucketKey;
use super::compress::{CompressionStats, Fold};
use super::dispatch::HashedTable;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketReport {
    pub bucket: String,
    pub key: BucketKey,
    pub patterns: usize,
    pub cnames: Vec<Ustr>,
    pub key_bits: u8,
    pub entries: usize,
    pub hash: HashKind,
    pub table_size: usize,
    pub max_bucket_load: usize,
    pub folds: Vec<Fold>,
    /// Distinct effective operand size chains among the bucket's patterns.
    pub eosz_chains: Vec<String>,
}

impl BucketReport {
    pub fn of(table: &HashedTable, patterns: usize, folds: &[Fold]) -> Self {
        let dictionary = table.dictionary();
        let eosz_chains = table
            .entries()
            .iter()
            .map(|entry| entry.pattern().sequences().eosz.iter().join(" "))
            .unique()
            .sorted()
            .collect();

        Self {
            bucket: table.bucket().to_string(),
            key: table.bucket(),
            patterns,
            cnames: dictionary.cnames().to_vec(),
            key_bits: dictionary.key_bits(),
            entries: dictionary.len(),
            hash: table.function().kind(),
            table_size: table.function().size(),
            max_bucket_load: table.max_bucket_load(),
            folds: folds.to_vec(),
            eosz_chains,
        }
    }
}

/// Per-bucket decisions and build-wide totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildReport {
    pub patterns: usize,
    pub entries: usize,
    pub compression: CompressionStats,
    pub hash_kinds: BTreeMap<HashKind, usize>,
    pub buckets: Vec<BucketReport>,
}

impl BuildReport {
    pub fn push(&mut self, bucket: BucketReport, stats: &CompressionStats) {
        self.patterns += bucket.patterns;
        self.entries += bucket.entries;
        self.compression += stats;
        *self.hash_kinds.entry(bucket.hash).or_default() += 1;
        self.buckets.push(bucket);
    }

    pub fn two_level(&self) -> usize {
        self.hash_kinds
            .get(&HashKind::TwoLevel)
            .copied()
            .unwrap_or_default()
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
