use std::fmt;

use serde::Serialize;

/// The Mersenne prime 2^61 - 1.
pub const FKS_PRIME: u64 = (1 << 61) - 1;

/// A one-level hash function. Embedded verbatim into generated tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Hash {
    /// Every key maps to slot zero; only valid for a single key.
    Trivial,
    /// `key - min`
    Linear { min: u64, size: usize },
    /// `hi64((key * multiplier mod 2^64) * size)`
    Multiplicative { multiplier: u64, size: usize },
    /// `((a * key + b) mod p) mod size`
    Fks { a: u64, b: u64, size: usize },
}

impl Hash {
    pub const fn size(&self) -> usize {
        match *self {
            Self::Trivial => 1,
            Self::Linear { size, .. }
            | Self::Multiplicative { size, .. }
            | Self::Fks { size, .. } => size,
        }
    }

    /// The slot for `key`; `None` only when a linear function is handed a
    /// key outside its range.
    #[inline]
    pub const fn index(&self, key: u64) -> Option<usize> {
        match *self {
            Self::Trivial => Some(0),
            Self::Linear { min, size } => {
                if key < min || key - min >= size as u64 {
                    None
                } else {
                    Some((key - min) as usize)
                }
            }
            Self::Multiplicative { multiplier, size } => {
                let mixed = key.wrapping_mul(multiplier) as u128;
                Some(((mixed * size as u128) >> 64) as usize)
            }
            Self::Fks { a, b, size } => {
                let h = (a as u128 * key as u128 + b as u128) % FKS_PRIME as u128;
                Some((h % size as u128) as usize)
            }
        }
    }

    /// Can two distinct keys (or a key outside the build set) share a slot?
    pub const fn needs_validation(&self) -> bool {
        matches!(self, Self::Multiplicative { .. } | Self::Fks { .. })
    }

    pub fn kind(&self) -> HashKind {
        match self {
            Self::Trivial => HashKind::Trivial,
            Self::Linear { .. } => HashKind::Linear,
            Self::Multiplicative { .. } => HashKind::Multiplicative,
            Self::Fks { .. } => HashKind::Fks,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum HashKind {
    Trivial,
    Linear,
    Multiplicative,
    Fks,
    TwoLevel,
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Trivial => "trivial",
            Self::Linear => "linear",
            Self::Multiplicative => "multiplicative",
            Self::Fks => "fks",
            Self::TwoLevel => "two-level",
        })
    }
}
