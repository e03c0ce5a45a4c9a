use std::collections::BTreeMap;
use std::fmt;

use dectab_ir::{EncodingSpace, MapId, Pattern};
use serde::Serialize;

/// The (encoding space, map, opcode) coordinates shared by every pattern
/// of one dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BucketKey {
    pub space: EncodingSpace,
    pub map: MapId,
    pub opcode: u8,
}

impl BucketKey {
    pub fn of(pattern: &Pattern) -> Self {
        Self {
            space: pattern.space(),
            map: pattern.map(),
            opcode: pattern.opcode(),
        }
    }

    fn map_name(&self) -> String {
        match self.map {
            MapId::Numbered(id) => format!("map{id}"),
            MapId::Amd3dnow => "amd3dnow".to_owned(),
        }
    }

    /// `legacy_map0_op89`
    pub fn snake_name(&self) -> String {
        format!("{}_{}_op{:02x}", self.space, self.map_name(), self.opcode)
    }

    /// `LegacyMap0Op89`
    pub fn camel_name(&self) -> String {
        self.snake_name()
            .split('_')
            .map(|part| {
                let mut chars = part.chars();
                chars
                    .next()
                    .map(|c| c.to_ascii_uppercase().to_string() + chars.as_str())
                    .unwrap_or_default()
            })
            .collect()
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} map {} opcode {:#04x}",
            self.space, self.map, self.opcode
        )
    }
}

/// Group patterns by bucket, keeping grammar order within each bucket.
pub fn partition(patterns: &[Pattern]) -> BTreeMap<BucketKey, Vec<&Pattern>> {
    let mut buckets = BTreeMap::<_, Vec<_>>::new();
    for pattern in patterns {
        buckets.entry(BucketKey::of(pattern)).or_default().push(pattern);
    }
    log::debug!(
        "partitioned {} patterns into {} buckets",
        patterns.len(),
        buckets.len()
    );
    buckets
}
