use std::fmt;

use itertools::Itertools;
use serde::Serialize;
use ustr::Ustr;

use crate::action::{Action, ActionSummary, FieldValue};
use crate::constraint::ConstraintSet;
use crate::deserialise::{Grammar, InstructionRecord, OperandSpec};
use crate::error::Error;
use crate::map::{EncodingSpace, MapId, MapTable};
use crate::space::{StateSpace, VEXVALID};
use crate::token::{CaptureBits, PatternToken};

const EOSZ_NONTERMS: &[&str] = &[
    "OSZ_NONTERM",
    "DF64",
    "FORCE64",
    "IMMUNE64",
    "IMMUNE66",
    "IMMUNE66_LOOP64",
    "IGNORE66",
    "REFINING66",
    "CR_WIDTH",
];

const EASZ_NONTERMS: &[&str] = &["ASZ_NONTERM"];

const IMM_NONTERMS: &[&str] = &[
    "SIMM8", "SIMMz", "SE_IMM8", "UIMM8", "UIMM8_1", "UIMM16", "UIMM32", "UIMMv",
];

const DISP_NONTERMS: &[&str] = &[
    "BRDISP8", "BRDISP32", "BRDISPz", "MEMDISP", "MEMDISP8", "MEMDISP16", "MEMDISP32", "MEMDISPv",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PatternId(u32);

impl PatternId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }

    fn unassigned() -> Self {
        Self(u32::MAX)
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Binding nonterminal chains, each in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NtSequences {
    pub eosz: Vec<Ustr>,
    pub easz: Vec<Ustr>,
    pub imm: Vec<Ustr>,
    pub disp: Vec<Ustr>,
}

impl NtSequences {
    fn scan(tokens: &[PatternToken]) -> Self {
        let nts = tokens
            .iter()
            .filter_map(PatternToken::nonterminal)
            .collect::<Vec<_>>();

        let chain = |seed: Option<&str>, names: &[&str]| {
            seed.map(Ustr::from)
                .into_iter()
                .chain(nts.iter().copied().filter(|nt| names.contains(&nt.as_str())))
                .unique()
                .collect::<Vec<_>>()
        };

        Self {
            eosz: chain(Some("OSZ_NONTERM"), EOSZ_NONTERMS),
            easz: chain(Some("ASZ_NONTERM"), EASZ_NONTERMS),
            imm: chain(None, IMM_NONTERMS),
            disp: chain(None, DISP_NONTERMS),
        }
    }
}

/// An opcode literal short of a full byte whose low bits are captured by
/// the following field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct IncompleteOpcode {
    pub missing_bits: u8,
    pub field: Ustr,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pattern {
    id: PatternId,
    iclass: Ustr,
    raw: String,
    line: usize,
    #[serde(skip)]
    tokens: Vec<PatternToken>,
    #[serde(skip)]
    operands: Vec<OperandSpec>,
    map: MapId,
    map_name: Ustr,
    opcode: u8,
    space: EncodingSpace,
    ext_opcode: Option<u32>,
    incomplete: Option<IncompleteOpcode>,
    constraints: ConstraintSet,
    actions: Vec<Action>,
    sequences: NtSequences,
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw && self.iclass == other.iclass
    }
}

impl Eq for Pattern {}

impl Pattern {
    pub fn from_record(
        record: &InstructionRecord,
        maps: &MapTable,
        space: &StateSpace,
    ) -> Result<Self, Error> {
        let tokens = record.tokens();
        let raw = record.pattern();

        let vexvalid = tokens
            .iter()
            .find_map(|token| match token {
                PatternToken::Equals { name, value } if name.as_str() == VEXVALID => Some(*value),
                _ => None,
            })
            .unwrap_or(0);
        let encoding = EncodingSpace::from_vexvalid(vexvalid)?;

        let map = maps
            .resolve(tokens, encoding)
            .ok_or_else(|| Error::UnknownMap {
                pattern: raw.to_owned(),
                line: record.line(),
            })?;

        let position = map.opcode_position();
        let (index, literal) = tokens
            .iter()
            .enumerate()
            .filter_map(|(i, token)| token.as_literal().map(|lit| (i, lit)))
            .nth(position)
            .ok_or_else(|| Error::MissingOpcode {
                pattern: raw.to_owned(),
                map: map.name(),
                position,
            })?;

        let (opcode, incomplete) = if literal.is_byte() {
            (literal.value() as u8, None)
        } else if literal.width() > 8 {
            return Err(Error::IncompleteOpcode {
                pattern: raw.to_owned(),
                reason: "opcode literal is wider than a byte",
            });
        } else {
            let missing_bits = 8 - literal.width();
            let field = match tokens.get(index + 1) {
                Some(PatternToken::Capture {
                    name,
                    bits: bits @ CaptureBits::Letters(_),
                }) if bits.width() == missing_bits => *name,
                _ => {
                    return Err(Error::IncompleteOpcode {
                        pattern: raw.to_owned(),
                        reason: "opcode literal is not followed by a capture of the missing bits",
                    })
                }
            };
            (
                (literal.value() << missing_bits) as u8,
                Some(IncompleteOpcode {
                    missing_bits,
                    field,
                }),
            )
        };

        let ext_opcode = tokens.iter().find_map(|token| match token {
            PatternToken::Capture {
                name,
                bits: CaptureBits::Literal(lit),
            } if name.as_str() == "REG" => Some(lit.value()),
            PatternToken::Equals { name, value } if name.as_str() == "REG" => Some(*value),
            _ => None,
        });

        let constraints = ConstraintSet::from_tokens(tokens, space, raw)?;

        let actions = match record.actions() {
            Some(actions) => actions.to_vec(),
            None => std::iter::once(Action::FieldBinding {
                name: Ustr::from("ICLASS"),
                value: FieldValue::Name(record.iclass()),
            })
            .chain(
                tokens
                    .iter()
                    .filter_map(PatternToken::nonterminal)
                    .map(Action::Nt),
            )
            .collect(),
        };

        Ok(Self {
            id: PatternId::unassigned(),
            iclass: record.iclass(),
            raw: raw.to_owned(),
            line: record.line(),
            tokens: tokens.to_vec(),
            operands: record.operands().to_vec(),
            map: map.id(),
            map_name: map.name(),
            opcode,
            space: encoding,
            ext_opcode,
            incomplete,
            constraints,
            actions,
            sequences: NtSequences::scan(tokens),
        })
    }

    /// One pattern per value of the missing opcode bits; a complete opcode
    /// yields only itself.
    pub fn expand(&self) -> Vec<Pattern> {
        let Some(incomplete) = self.incomplete else {
            return vec![self.clone()];
        };

        (0..(1u16 << incomplete.missing_bits))
            .map(|bits| Self {
                opcode: self.opcode | bits as u8,
                ..self.clone()
            })
            .collect()
    }

    pub fn id(&self) -> PatternId {
        self.id
    }

    pub fn iclass(&self) -> Ustr {
        self.iclass
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn tokens(&self) -> &[PatternToken] {
        &self.tokens
    }

    pub fn operands(&self) -> &[OperandSpec] {
        &self.operands
    }

    pub fn map(&self) -> MapId {
        self.map
    }

    pub fn map_name(&self) -> Ustr {
        self.map_name
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn space(&self) -> EncodingSpace {
        self.space
    }

    pub fn ext_opcode(&self) -> Option<u32> {
        self.ext_opcode
    }

    pub fn incomplete(&self) -> Option<IncompleteOpcode> {
        self.incomplete
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn summary(&self) -> ActionSummary {
        ActionSummary::of(&self.actions)
    }

    pub fn sequences(&self) -> &NtSequences {
        &self.sequences
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} `{}` (line {})", self.id, self.iclass, self.raw, self.line)
    }
}

/// Every instruction record as patterns, incomplete opcodes expanded,
/// numbered in grammar order.
pub fn build_patterns(
    grammar: &Grammar,
    maps: &MapTable,
    space: &StateSpace,
) -> Result<Vec<Pattern>, Error> {
    let mut patterns = Vec::new();

    for record in grammar.instructions() {
        let pattern = Pattern::from_record(record, maps, space)?;
        for mut sibling in pattern.expand() {
            sibling.id = PatternId::new(patterns.len() as u32);
            patterns.push(sibling);
        }
    }

    log::debug!(
        "built {} patterns from {} instruction records",
        patterns.len(),
        grammar.instructions().len()
    );

    Ok(patterns)
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use super::*;

    fn patterns(input: &str) -> Result<Vec<Pattern>, Error> {
        let grammar = Grammar::from_str(input)?;
        let space = StateSpace::collect(&grammar, &BTreeMap::new())?;
        build_patterns(&grammar, &MapTable::x86()?, &space)
    }

    #[test]
    fn incomplete_opcode_expands_to_siblings() -> Result<(), Error> {
        let input = "
INSTRUCTIONS()::
{
ICLASS  : PUSH
PATTERN : 0b0101_0 SRM[rrr] DF64()
}
";
        let patterns = patterns(input)?;

        assert_eq!(patterns.len(), 8);
        let opcodes = patterns.iter().map(Pattern::opcode).collect::<Vec<_>>();
        assert_eq!(opcodes, (0x50..=0x57).collect::<Vec<u8>>());
        assert!(patterns.iter().all(|p| p.actions() == patterns[0].actions()));
        assert!(patterns.iter().all(|p| p.map() == MapId::Numbered(0)));
        assert_eq!(
            patterns.iter().map(|p| p.id().index()).collect::<Vec<_>>(),
            (0..8).collect::<Vec<_>>()
        );
        Ok(())
    }

    #[test]
    fn default_actions_and_chains() -> Result<(), Error> {
        let input = "
INSTRUCTIONS()::
{
ICLASS  : ADD
PATTERN : 0x81 MOD[mm] MOD!=3 REG[0b000] RM[nnn] MODRM() IMMUNE66() SIMMz()
}
";
        let patterns = patterns(input)?;
        let add = &patterns[0];

        assert_eq!(add.ext_opcode(), Some(0));
        assert_eq!(add.actions().len(), 4);
        assert_eq!(
            add.sequences().eosz,
            vec![Ustr::from("OSZ_NONTERM"), Ustr::from("IMMUNE66")]
        );
        assert_eq!(add.sequences().easz, vec![Ustr::from("ASZ_NONTERM")]);
        assert_eq!(add.sequences().imm, vec![Ustr::from("SIMMz")]);
        assert!(add.sequences().disp.is_empty());
        Ok(())
    }

    #[test]
    fn vex_patterns_resolve_by_marker() -> Result<(), Error> {
        let input = "
INSTRUCTIONS()::
{
ICLASS  : VBROADCASTSS
PATTERN : VV1 0x18 V66 V0F38 MOD[mm] MOD!=3 REG[rrr] RM[nnn] MODRM()
}
";
        let patterns = patterns(input)?;
        assert_eq!(patterns[0].space(), EncodingSpace::Vex);
        assert_eq!(patterns[0].map_name().as_str(), "vex_map2");
        assert_eq!(patterns[0].opcode(), 0x18);
        Ok(())
    }

    #[test]
    fn unresolvable_map_names_pattern() -> Result<(), Error> {
        let input = "
INSTRUCTIONS()::
{
ICLASS  : BAD
PATTERN : VV1 0x18
}
";
        assert!(matches!(patterns(input), Err(Error::UnknownMap { line: 3, .. })));
        Ok(())
    }
}
