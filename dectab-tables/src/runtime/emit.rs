/// One piece of an `emit` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmitChunk {
    Bits { value: u64, width: u8 },
    /// The low `width` bits of a decoded field.
    Field { name: &'static str, width: u8 },
}

impl EmitChunk {
    pub const fn width(&self) -> u8 {
        match *self {
            Self::Bits { width, .. } | Self::Field { width, .. } => width,
        }
    }

    /// The chunk's bits, reading captured fields through `field`.
    pub fn resolve<F>(&self, field: F) -> u64
    where
        F: FnOnce(&'static str) -> u64,
    {
        match *self {
            Self::Bits { value, .. } => value,
            Self::Field { name, width } => field(name) & mask(width),
        }
    }
}

const fn mask(width: u8) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1 << width) - 1
    }
}

/// Concatenate chunks most-significant first.
pub fn concat<F>(chunks: &[EmitChunk], mut field: F) -> u64
where
    F: FnMut(&'static str) -> u64,
{
    chunks.iter().fold(0, |acc, chunk| {
        let width = chunk.width() as u32;
        acc.checked_shl(width).unwrap_or(0) | chunk.resolve(&mut field)
    })
}
