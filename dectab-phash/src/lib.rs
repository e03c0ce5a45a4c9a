//! Perfect hash functions over sets of packed integer keys.
//!
//! [`Hash`] is the descriptor shared by build time and run time: generated
//! tables embed it directly and call [`Hash::index`], the same arithmetic the
//! [`Synthesizer`] validated against.

pub mod error;
pub mod hash;
pub mod keys;
pub mod synth;

mod fks;
mod mul;
mod search;

pub use error::Error;
pub use hash::{Hash, HashKind, FKS_PRIME};
pub use keys::KeySet;
pub use synth::{HashFunction, SearchConfig, Slot, Synthesizer};
