use std::cmp::Reverse;
use std::fmt;
use std::path::Path;

use ahash::AHashMap;
use serde::Serialize;
use ustr::Ustr;

use crate::deserialise;
use crate::error::Error;
use crate::token::{Literal, PatternToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum EncodingSpace {
    Legacy = 0,
    Vex = 1,
    Evex = 2,
    Xop = 3,
}

impl EncodingSpace {
    pub fn from_vexvalid(value: u32) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::Legacy),
            1 => Ok(Self::Vex),
            2 => Ok(Self::Evex),
            3 => Ok(Self::Xop),
            v => Err(Error::InvalidEncodingSpace(v)),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "legacy" => Some(Self::Legacy),
            "vex" => Some(Self::Vex),
            "evex" => Some(Self::Evex),
            "xop" => Some(Self::Xop),
            _ => None,
        }
    }

    pub fn vexvalid(&self) -> u32 {
        *self as u32
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Vex => "vex",
            Self::Evex => "evex",
            Self::Xop => "xop",
        }
    }
}

impl fmt::Display for EncodingSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MapId {
    Numbered(u8),
    Amd3dnow,
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numbered(id) => write!(f, "{id}"),
            Self::Amd3dnow => write!(f, "AMD"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Presence {
    Yes,
    No,
    Var,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ImmediateSpec {
    Var,
    Bytes(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapInfo {
    pub(crate) name: Ustr,
    pub(crate) space: EncodingSpace,
    pub(crate) escape: Option<u8>,
    pub(crate) map_opcode: Option<u8>,
    pub(crate) id: MapId,
    pub(crate) modrm: Presence,
    pub(crate) disp: Presence,
    pub(crate) imm: ImmediateSpec,
    pub(crate) opcode_position: usize,
    #[serde(skip)]
    pub(crate) search: Vec<PatternToken>,
}

impl MapInfo {
    pub fn name(&self) -> Ustr {
        self.name
    }

    pub fn space(&self) -> EncodingSpace {
        self.space
    }

    pub fn escape(&self) -> Option<u8> {
        self.escape
    }

    pub fn map_opcode(&self) -> Option<u8> {
        self.map_opcode
    }

    pub fn id(&self) -> MapId {
        self.id
    }

    pub fn modrm(&self) -> Presence {
        self.modrm
    }

    pub fn disp(&self) -> Presence {
        self.disp
    }

    pub fn imm(&self) -> ImmediateSpec {
        self.imm
    }

    /// Index of the opcode among the pattern's literal tokens.
    pub fn opcode_position(&self) -> usize {
        self.opcode_position
    }

    pub fn search(&self) -> &[PatternToken] {
        &self.search
    }

    fn matches(&self, tokens: &[PatternToken], space: EncodingSpace) -> bool {
        if self.space != space {
            return false;
        }

        if self.space == EncodingSpace::Legacy {
            // search bytes anchor at the start of the pattern's literals
            let mut literals = tokens.iter().filter_map(PatternToken::as_literal);
            self.search.iter().all(|needle| {
                needle
                    .as_literal()
                    .zip(literals.next())
                    .map(|(want, got)| want == got)
                    .unwrap_or(false)
            })
        } else {
            self.search.iter().all(|needle| tokens.contains(needle))
        }
    }

    /// The literal at this map's opcode position.
    pub fn opcode_literal(&self, tokens: &[PatternToken]) -> Option<Literal> {
        tokens
            .iter()
            .filter_map(PatternToken::as_literal)
            .nth(self.opcode_position)
    }
}

const X86_MAPS: &str = "\
# name       space  esc   mapopc id  modrm disp imm opcpos search
legacy_map0  legacy N/A   N/A    0   var   var  var 0
legacy_map1  legacy 0x0F  N/A    1   var   var  var 1      0x0F
legacy_map2  legacy 0x0F  0x38   2   yes   var  0   2      0x0F 0x38
legacy_map3  legacy 0x0F  0x3A   3   yes   var  1   2      0x0F 0x3A
amd_3dnow    legacy 0x0F  0x0F   AMD yes   var  1   2      0x0F 0x0F
vex_map1     vex    N/A   N/A    1   yes   var  var 0      V0F
vex_map2     vex    N/A   N/A    2   yes   var  0   0      V0F38
vex_map3     vex    N/A   N/A    3   yes   var  1   0      V0F3A
evex_map1    evex   N/A   N/A    1   yes   var  var 0      V0F
evex_map2    evex   N/A   N/A    2   yes   var  0   0      V0F38
evex_map3    evex   N/A   N/A    3   yes   var  1   0      V0F3A
xop_map8     xop    N/A   N/A    8   yes   var  1   0      XMAP8
xop_map9     xop    N/A   N/A    9   yes   var  0   0      XMAP9
xop_mapA     xop    N/A   N/A    10  yes   var  4   0      XMAPA
";

/// The opcode maps in resolution order: longer search patterns first.
#[derive(Debug, Clone)]
pub struct MapTable {
    maps: Vec<MapInfo>,
    index: AHashMap<Ustr, usize>,
}

impl MapTable {
    pub fn new(mut maps: Vec<MapInfo>) -> Self {
        maps.sort_by_key(|map| Reverse(map.search.len()));

        let index = maps
            .iter()
            .enumerate()
            .map(|(i, map)| (map.name, i))
            .collect();

        Self { maps, index }
    }

    /// The standard x86 opcode maps.
    pub fn x86() -> Result<Self, Error> {
        Ok(Self::from_str(X86_MAPS)?)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(input: &str) -> Result<Self, deserialise::Error> {
        deserialise::parse_maps(input).map(Self::new)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, deserialise::Error> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|error| {
            deserialise::Error::ReadFile {
                path: path.to_owned(),
                error,
            }
        })?;
        Self::from_str(&input)
    }

    pub fn get(&self, name: &str) -> Option<&MapInfo> {
        self.index.get(&Ustr::from(name)).map(|i| &self.maps[*i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &MapInfo> {
        self.maps.iter()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// First map, in priority order, whose search pattern and encoding space
    /// match the pattern.
    pub fn resolve(&self, tokens: &[PatternToken], space: EncodingSpace) -> Option<&MapInfo> {
        self.maps.iter().find(|map| map.matches(tokens, space))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn lit(v: u32) -> PatternToken {
        PatternToken::Literal(Literal::new(v, 8))
    }

    #[test]
    fn maps_are_priority_sorted() -> Result<(), Error> {
        let maps = MapTable::x86()?;
        let lengths = maps.iter().map(|m| m.search().len()).collect::<Vec<_>>();
        assert!(lengths.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(maps.iter().last().map(|m| m.name().as_str()), Some("legacy_map0"));
        Ok(())
    }

    #[test]
    fn legacy_resolution_prefers_longest_prefix() -> Result<(), Error> {
        let maps = MapTable::x86()?;

        let map0 = maps.resolve(&[lit(0x89)], EncodingSpace::Legacy);
        assert_eq!(map0.map(MapInfo::id), Some(MapId::Numbered(0)));

        let map2 = maps.resolve(&[lit(0x0F), lit(0x38), lit(0x00)], EncodingSpace::Legacy);
        assert_eq!(map2.map(MapInfo::id), Some(MapId::Numbered(2)));
        assert_eq!(
            map2.and_then(|m| m.opcode_literal(&[lit(0x0F), lit(0x38), lit(0x00)])),
            Some(Literal::new(0, 8))
        );

        let amd = maps.resolve(&[lit(0x0F), lit(0x0F), lit(0xB7)], EncodingSpace::Legacy);
        assert_eq!(amd.map(MapInfo::id), Some(MapId::Amd3dnow));
        Ok(())
    }

    #[test]
    fn marker_maps_require_matching_space() -> Result<(), Error> {
        let maps = MapTable::x86()?;
        let tokens = [PatternToken::Marker(Ustr::from("V0F38")), lit(0x18)];

        let vex = maps.resolve(&tokens, EncodingSpace::Vex);
        assert_eq!(vex.map(|m| m.name().as_str()), Some("vex_map2"));

        let evex = maps.resolve(&tokens, EncodingSpace::Evex);
        assert_eq!(evex.map(|m| m.name().as_str()), Some("evex_map2"));

        assert!(maps.resolve(&tokens[1..], EncodingSpace::Vex).is_none());
        Ok(())
    }
}
