use thiserror::Error;
use ustr::Ustr;

#[derive(Debug, Error)]
pub enum Error {
    #[error("grammar deserialisation error: {0}")]
    Grammar(#[from] crate::deserialise::Error),
    #[error("token `{0}` has no known domain")]
    UnknownDomain(Ustr),
    #[error("value {value} of token `{token}` does not fit its width of {width} bits")]
    ValueWidth { token: Ustr, value: u32, width: u8 },
    #[error("letter capture of `{token}` is {bits} bits wide; at most {limit} bits can be enumerated")]
    CaptureWidth { token: Ustr, bits: u8, limit: u8 },
    #[error("token `{token}` has an empty set of legal values in `{pattern}`")]
    EmptyConstraint { token: Ustr, pattern: String },
    #[error("encoding space {0} is not a valid VEXVALID value")]
    InvalidEncodingSpace(u32),
    #[error("`{pattern}` (line {line}) does not match any opcode map")]
    UnknownMap { pattern: String, line: usize },
    #[error("`{pattern}` has no opcode literal at position {position} of map `{map}`")]
    MissingOpcode {
        pattern: String,
        map: Ustr,
        position: usize,
    },
    #[error("incomplete opcode in `{pattern}`: {reason}")]
    IncompleteOpcode { pattern: String, reason: &'static str },
    #[error("{0}")]
    Invariant(String),
}
