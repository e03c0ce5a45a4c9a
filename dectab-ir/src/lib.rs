pub mod action;
pub mod constraint;
pub mod deserialise;
pub mod error;
pub mod map;
pub mod pattern;
pub mod space;
pub mod token;

pub use action::{Action, ActionKind, ActionSummary, Emit, EmitKind, FieldValue};
pub use constraint::{expand_to_full_domain, ConstraintSet, Tuple};
pub use deserialise::Grammar;
pub use error::Error;
pub use map::{EncodingSpace, ImmediateSpec, MapId, MapInfo, MapTable, Presence};
pub use pattern::{build_patterns, IncompleteOpcode, NtSequences, Pattern, PatternId};
pub use space::{
    bits_for, DomainSource, OperandToken, StateSpace, StateSpaceBuilder, MAX_CAPTURE_BITS, VEXVALID,
};
pub use token::{CaptureBits, Literal, PatternToken};
