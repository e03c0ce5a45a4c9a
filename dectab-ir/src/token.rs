use std::fmt;

use ustr::Ustr;

/// A run of literal opcode bits, e.g. `0x89` (8 bits) or `0b0101_0` (5 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Literal {
    value: u32,
    width: u8,
}

impl Literal {
    pub fn new(value: u32, width: u8) -> Self {
        Self { value, width }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn is_byte(&self) -> bool {
        self.width == 8
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.width % 4 == 0 {
            write!(f, "0x{:0w$X}", self.value, w = (self.width / 4) as usize)
        } else {
            write!(f, "0b{:0w$b}", self.value, w = self.width as usize)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CaptureBits {
    /// `MOD[0b11]`: the field is captured and pinned to a value
    Literal(Literal),
    /// `REG[rrr]`: the field is captured; one letter per bit
    Letters(Ustr),
}

impl CaptureBits {
    pub fn width(&self) -> u8 {
        match self {
            Self::Literal(lit) => lit.width(),
            Self::Letters(letters) => letters.len() as u8,
        }
    }
}

impl fmt::Display for CaptureBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(lit) => write!(f, "0b{:0w$b}", lit.value(), w = lit.width() as usize),
            Self::Letters(letters) => write!(f, "{letters}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternToken {
    Literal(Literal),
    Capture { name: Ustr, bits: CaptureBits },
    Equals { name: Ustr, value: u32 },
    NotEquals { name: Ustr, value: u32 },
    Nonterminal(Ustr),
    Marker(Ustr),
    Otherwise,
}

impl PatternToken {
    pub fn as_literal(&self) -> Option<Literal> {
        if let Self::Literal(lit) = self {
            Some(*lit)
        } else {
            None
        }
    }

    pub fn nonterminal(&self) -> Option<Ustr> {
        if let Self::Nonterminal(name) = self {
            Some(*name)
        } else {
            None
        }
    }

    /// The operand decider this token constrains or captures, if any.
    pub fn decider(&self) -> Option<Ustr> {
        match self {
            Self::Capture { name, .. } | Self::Equals { name, .. } | Self::NotEquals { name, .. } => {
                Some(*name)
            }
            _ => None,
        }
    }
}

impl fmt::Display for PatternToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(lit) => write!(f, "{lit}"),
            Self::Capture { name, bits } => write!(f, "{name}[{bits}]"),
            Self::Equals { name, value } => write!(f, "{name}={value}"),
            Self::NotEquals { name, value } => write!(f, "{name}!={value}"),
            Self::Nonterminal(name) => write!(f, "{name}()"),
            Self::Marker(name) => write!(f, "{name}"),
            Self::Otherwise => write!(f, "otherwise"),
        }
    }
}
