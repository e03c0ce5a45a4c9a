use std::fmt;

use dectab_phash::Hash;

/// A generated payload row.
pub trait Row {
    /// Is this row the one stored for `key`? Rows of tables whose hash is
    /// not collision-free by construction compare their stored key.
    fn matches(&self, key: u64) -> bool;
}

/// A second-level table of a two-level dispatch table.
pub struct Bucket<R: 'static> {
    pub hash: Hash,
    pub rows: &'static [Option<R>],
}

pub enum DispatchTable<R: 'static> {
    Direct {
        hash: Hash,
        rows: &'static [Option<R>],
    },
    TwoLevel {
        hash: Hash,
        buckets: &'static [Option<Bucket<R>>],
    },
}

impl<R: Row> DispatchTable<R> {
    #[inline]
    pub fn lookup(&self, key: u64) -> Option<&'static R> {
        let row = match self {
            Self::Direct { hash, rows } => {
                let rows: &'static [Option<R>] = *rows;
                rows.get(hash.index(key)?)?.as_ref()?
            }
            Self::TwoLevel { hash, buckets } => {
                let buckets: &'static [Option<Bucket<R>>] = *buckets;
                let bucket = buckets.get(hash.index(key)?)?.as_ref()?;
                let rows: &'static [Option<R>] = bucket.rows;
                rows.get(bucket.hash.index(key)?)?.as_ref()?
            }
        };
        row.matches(key).then_some(row)
    }
}

impl<R> DispatchTable<R> {
    pub fn is_two_level(&self) -> bool {
        matches!(self, Self::TwoLevel { .. })
    }

    /// Number of live rows.
    pub fn len(&self) -> usize {
        match self {
            Self::Direct { rows, .. } => rows.iter().flatten().count(),
            Self::TwoLevel { buckets, .. } => buckets
                .iter()
                .flatten()
                .map(|bucket| bucket.rows.iter().flatten().count())
                .sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R> fmt::Debug for DispatchTable<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { hash, rows } => f
                .debug_struct("Direct")
                .field("hash", hash)
                .field("slots", &rows.len())
                .finish(),
            Self::TwoLevel { hash, buckets } => f
                .debug_struct("TwoLevel")
                .field("hash", hash)
                .field("buckets", &buckets.len())
                .finish(),
        }
    }
}
