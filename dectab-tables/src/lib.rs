#[cfg(feature = "build")]
pub mod builder;
pub mod runtime;

#[cfg(feature = "build")]
pub use builder::*;

pub use runtime::{Bucket, DispatchTable, EmitChunk, OperandSource, Row};
