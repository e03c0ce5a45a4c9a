use thiserror::Error;
use ustr::Ustr;

use super::bucket::BucketKey;

#[derive(Debug, Error)]
pub enum BuilderError {
    #[error(transparent)]
    Model(#[from] dectab_ir::Error),
    #[error("{bucket}: tuple ({tuple}) is claimed by {first} and by {second}")]
    Conflict {
        bucket: BucketKey,
        tuple: String,
        first: String,
        second: String,
    },
    #[error("{bucket}: {bits} key bits exceed the {limit}-bit packing word")]
    PackingOverflow {
        bucket: BucketKey,
        bits: u32,
        limit: u8,
    },
    #[error("{bucket}: value {value} of `{token}` does not fit in {width} bits")]
    PackingWidth {
        bucket: BucketKey,
        token: Ustr,
        value: u32,
        width: u8,
    },
    #[error("{bucket}: tuples ({first}) and ({second}) pack to the same key {key:#x}")]
    PackingCollision {
        bucket: BucketKey,
        key: u64,
        first: String,
        second: String,
    },
    #[error("{bucket}: {source}")]
    Hash {
        bucket: BucketKey,
        #[source]
        source: dectab_phash::Error,
    },
    #[error("`{pattern}` binds `{name}` more than once")]
    DuplicateBinding { pattern: String, name: Ustr },
    #[error("invariant not satisfied: {0}")]
    Invariant(String),
}

impl BuilderError {
    pub fn invariant<M>(m: M) -> Self
    where
        M: Into<String>,
    {
        Self::Invariant(m.into())
    }
}
