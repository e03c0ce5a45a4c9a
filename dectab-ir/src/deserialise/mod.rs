//! Reader for the line-oriented grammar and map description formats.

use std::num::ParseIntError;
use std::path::{Path, PathBuf};

use thiserror::Error;
use ustr::Ustr;

use crate::action::Action;
use crate::map::MapInfo;
use crate::token::PatternToken;

mod parse;

#[derive(Debug, Error)]
pub enum Error {
    #[error("line {line}: cannot parse `{token}`")]
    Token { line: usize, token: String },
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("line {line}: missing field `{field}`")]
    MissingField { line: usize, field: &'static str },
    #[error("cannot read `{}`: {}", path.display(), error)]
    ReadFile {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("could not parse integer: {0}")]
    ParseInteger(#[from] ParseIntError),
}

impl Error {
    fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtRow {
    tokens: Vec<PatternToken>,
    actions: Vec<Action>,
    line: usize,
}

impl NtRow {
    pub fn tokens(&self) -> &[PatternToken] {
        &self.tokens
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn line(&self) -> usize {
        self.line
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonterminalDef {
    name: Ustr,
    rows: Vec<NtRow>,
}

impl NonterminalDef {
    pub fn name(&self) -> Ustr {
        self.name
    }

    pub fn rows(&self) -> &[NtRow] {
        &self.rows
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperandValue {
    Int(u32),
    Name(Ustr),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperandSpec {
    name: Ustr,
    value: Option<OperandValue>,
    attributes: Vec<Ustr>,
}

impl OperandSpec {
    pub fn name(&self) -> Ustr {
        self.name
    }

    pub fn value(&self) -> Option<&OperandValue> {
        self.value.as_ref()
    }

    pub fn attributes(&self) -> &[Ustr] {
        &self.attributes
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionRecord {
    iclass: Ustr,
    pattern: String,
    tokens: Vec<PatternToken>,
    operands: Vec<OperandSpec>,
    actions: Option<Vec<Action>>,
    line: usize,
}

impl InstructionRecord {
    pub fn iclass(&self) -> Ustr {
        self.iclass
    }

    /// The pattern text with whitespace normalised.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn tokens(&self) -> &[PatternToken] {
        &self.tokens
    }

    pub fn operands(&self) -> &[OperandSpec] {
        &self.operands
    }

    pub fn actions(&self) -> Option<&[Action]> {
        self.actions.as_deref()
    }

    pub fn line(&self) -> usize {
        self.line
    }
}

#[derive(Default)]
struct PartialRecord {
    line: usize,
    iclass: Option<Ustr>,
    pattern: Option<(String, Vec<PatternToken>)>,
    operands: Vec<OperandSpec>,
    actions: Option<Vec<Action>>,
}

impl PartialRecord {
    fn finish(self) -> Result<InstructionRecord, Error> {
        let iclass = self.iclass.ok_or(Error::MissingField {
            line: self.line,
            field: "ICLASS",
        })?;
        let (pattern, tokens) = self.pattern.ok_or(Error::MissingField {
            line: self.line,
            field: "PATTERN",
        })?;

        Ok(InstructionRecord {
            iclass,
            pattern,
            tokens,
            operands: self.operands,
            actions: self.actions,
            line: self.line,
        })
    }
}

enum Section {
    Preamble,
    Nonterminal,
    Instructions,
    Record(PartialRecord),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grammar {
    nonterminals: Vec<NonterminalDef>,
    instructions: Vec<InstructionRecord>,
}

impl Grammar {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(input: &str) -> Result<Self, Error> {
        let mut grammar = Self::default();
        let mut section = Section::Preamble;

        for (i, raw) in input.lines().enumerate() {
            let line = i + 1;
            let text = raw.split('#').next().unwrap_or_default().trim();
            if text.is_empty() {
                continue;
            }

            if let Some(name) = text.strip_suffix("()::") {
                if let Section::Record(_) = section {
                    return Err(Error::syntax(line, "unterminated instruction record"));
                }
                section = if name == "INSTRUCTIONS" {
                    Section::Instructions
                } else {
                    grammar.nonterminals.push(NonterminalDef {
                        name: Ustr::from(name),
                        rows: Vec::new(),
                    });
                    Section::Nonterminal
                };
                continue;
            }

            section = match section {
                Section::Preamble => {
                    return Err(Error::syntax(line, "rule outside of any section"));
                }
                Section::Nonterminal => {
                    let (tokens, actions) = text
                        .split_once('|')
                        .ok_or_else(|| Error::syntax(line, "expected `pattern | actions`"))?;

                    let row = NtRow {
                        tokens: parse::pattern_tokens(tokens, line)?,
                        actions: parse::actions(actions, line)?,
                        line,
                    };

                    if let Some(nt) = grammar.nonterminals.last_mut() {
                        nt.rows.push(row);
                    }
                    Section::Nonterminal
                }
                Section::Instructions => {
                    if text != "{" {
                        return Err(Error::syntax(line, "expected `{`"));
                    }
                    Section::Record(PartialRecord {
                        line,
                        ..Default::default()
                    })
                }
                Section::Record(record) if text == "}" => {
                    grammar.instructions.push(record.finish()?);
                    Section::Instructions
                }
                Section::Record(mut record) => {
                    let (key, value) = text
                        .split_once(':')
                        .ok_or_else(|| Error::syntax(line, "expected `KEY : value`"))?;
                    let value = value.trim();

                    match key.trim() {
                        "ICLASS" => record.iclass = Some(Ustr::from(value)),
                        "PATTERN" => {
                            let normalised = value.split_whitespace().collect::<Vec<_>>().join(" ");
                            let tokens = parse::pattern_tokens(value, line)?;
                            record.pattern = Some((normalised, tokens));
                        }
                        "OPERANDS" => {
                            record.operands = value
                                .split_whitespace()
                                .map(|word| parse::operand(word, line))
                                .collect::<Result<_, _>>()?;
                        }
                        "ACTIONS" => record.actions = Some(parse::actions(value, line)?),
                        other => log::trace!("line {line}: ignoring record key `{other}`"),
                    }
                    Section::Record(record)
                }
            };
        }

        if let Section::Record(record) = section {
            return Err(Error::syntax(record.line, "unterminated instruction record"));
        }

        log::debug!(
            "read {} nonterminals and {} instruction records",
            grammar.nonterminals.len(),
            grammar.instructions.len()
        );

        Ok(grammar)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|error| Error::ReadFile {
            path: path.to_owned(),
            error,
        })?;
        Self::from_str(&input)
    }

    pub fn nonterminals(&self) -> &[NonterminalDef] {
        &self.nonterminals
    }

    pub fn instructions(&self) -> &[InstructionRecord] {
        &self.instructions
    }
}

/// One map per line: `name space esc mapopc id modrm disp imm opcpos [search...]`.
pub fn parse_maps(input: &str) -> Result<Vec<MapInfo>, Error> {
    input
        .lines()
        .enumerate()
        .filter_map(|(i, raw)| {
            let text = raw.split('#').next().unwrap_or_default().trim();
            (!text.is_empty()).then(|| parse::map_line(text, i + 1))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::action::FieldValue;

    const GRAMMAR: &str = "
# operand size
OSZ_NONTERM()::
OSZ=0 | EOSZ=2
OSZ=1 | EOSZ=1

INSTRUCTIONS()::
{
ICLASS   : MOV
CATEGORY : DATAXFER
PATTERN  : 0x89  MOD[0b11] MOD=3 REG[rrr] RM[nnn]
OPERANDS : REG0=GPRv_B():w REG1=GPRv_R():r
}
{
ICLASS  : NOP
PATTERN : 0x90
ACTIONS : ICLASS=NOP return(1)
}
";

    #[test]
    fn reads_sections_and_records() -> Result<(), Error> {
        let grammar = Grammar::from_str(GRAMMAR)?;

        assert_eq!(grammar.nonterminals().len(), 1);
        let osz = &grammar.nonterminals()[0];
        assert_eq!(osz.name().as_str(), "OSZ_NONTERM");
        assert_eq!(osz.rows().len(), 2);
        assert_eq!(
            osz.rows()[1].actions(),
            &[Action::FieldBinding {
                name: Ustr::from("EOSZ"),
                value: FieldValue::Int(1),
            }]
        );

        assert_eq!(grammar.instructions().len(), 2);
        let mov = &grammar.instructions()[0];
        assert_eq!(mov.iclass().as_str(), "MOV");
        assert_eq!(mov.pattern(), "0x89 MOD[0b11] MOD=3 REG[rrr] RM[nnn]");
        assert_eq!(mov.tokens().len(), 5);
        assert_eq!(mov.operands().len(), 2);
        assert!(mov.actions().is_none());

        let nop = &grammar.instructions()[1];
        assert_eq!(nop.actions().map(<[Action]>::len), Some(2));
        Ok(())
    }

    #[test]
    fn missing_pattern_names_record_line() {
        let input = "INSTRUCTIONS()::\n{\nICLASS : NOP\n}\n";
        assert!(matches!(
            Grammar::from_str(input),
            Err(Error::MissingField {
                line: 2,
                field: "PATTERN"
            })
        ));
    }

    #[test]
    fn unterminated_record_is_rejected() {
        let input = "INSTRUCTIONS()::\n{\nICLASS : NOP\nPATTERN : 0x90\n";
        assert!(matches!(
            Grammar::from_str(input),
            Err(Error::Syntax { line: 2, .. })
        ));
    }

    #[test]
    fn rows_need_actions_separator() {
        let input = "MODRM()::\nMOD=3\n";
        assert!(matches!(
            Grammar::from_str(input),
            Err(Error::Syntax { line: 2, .. })
        ));
    }
}
