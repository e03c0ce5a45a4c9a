//! Support code linked by generated dispatch tables.

pub mod emit;
pub mod table;

pub use dectab_phash::Hash;

pub use self::emit::EmitChunk;
pub use self::table::{Bucket, DispatchTable, Row};

/// Read access to decoded operand-decider values, keyed by the generated
/// `Operand` enum.
pub trait OperandSource<O> {
    fn operand(&self, operand: O) -> u32;
}
