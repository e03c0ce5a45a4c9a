use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while1};
use nom::character::complete::{alpha1, alphanumeric1, char, digit1};
use nom::combinator::{all_consuming, consumed, map, map_opt, map_res, opt, recognize};
use nom::multi::many0_count;
use nom::sequence::{delimited, pair, preceded};
use nom::{Finish, IResult};

use ustr::Ustr;

use crate::action::{Action, Emit, FieldValue};
use crate::map::{EncodingSpace, ImmediateSpec, MapId, MapInfo, Presence};
use crate::space::VEXVALID;
use crate::token::{CaptureBits, Literal, PatternToken};

use super::{Error, OperandSpec, OperandValue};

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn digits(input: &str, radix: u32) -> Option<(u64, u8)> {
    let clean = input.replace('_', "");
    let width = if radix == 16 { clean.len() * 4 } else { clean.len() };
    u64::from_str_radix(&clean, radix)
        .ok()
        .map(|v| (v, width.min(64) as u8))
}

fn hex_literal(input: &str) -> IResult<&str, Literal> {
    map_opt(
        preceded(
            tag_no_case("0x"),
            take_while1(|c: char| c.is_ascii_hexdigit() || c == '_'),
        ),
        |s: &str| {
            let (v, width) = digits(s, 16)?;
            u32::try_from(v).ok().map(|v| Literal::new(v, width))
        },
    )(input)
}

fn bin_literal(input: &str) -> IResult<&str, Literal> {
    map_opt(
        preceded(
            tag_no_case("0b"),
            take_while1(|c: char| c == '0' || c == '1' || c == '_'),
        ),
        |s: &str| {
            let (v, width) = digits(s, 2)?;
            u32::try_from(v).ok().map(|v| Literal::new(v, width))
        },
    )(input)
}

fn number(input: &str) -> IResult<&str, u64> {
    alt((
        map_opt(
            preceded(
                tag_no_case("0x"),
                take_while1(|c: char| c.is_ascii_hexdigit() || c == '_'),
            ),
            |s: &str| digits(s, 16).map(|(v, _)| v),
        ),
        map_opt(
            preceded(
                tag_no_case("0b"),
                take_while1(|c: char| c == '0' || c == '1' || c == '_'),
            ),
            |s: &str| digits(s, 2).map(|(v, _)| v),
        ),
        map_res(digit1, |s: &str| s.parse::<u64>()),
    ))(input)
}

fn number32(input: &str) -> IResult<&str, u32> {
    map_res(number, u32::try_from)(input)
}

enum Suffix {
    Call,
    Capture(CaptureBits),
    NotEquals(u32),
    Equals(u32),
}

fn suffix(input: &str) -> IResult<&str, Suffix> {
    alt((
        map(tag("()"), |_| Suffix::Call),
        map(
            delimited(
                char('['),
                alt((
                    map(bin_literal, CaptureBits::Literal),
                    map(take_while1(|c: char| c.is_ascii_lowercase()), |s: &str| {
                        CaptureBits::Letters(Ustr::from(s))
                    }),
                )),
                char(']'),
            ),
            Suffix::Capture,
        ),
        map(preceded(tag("!="), number32), Suffix::NotEquals),
        map(preceded(char('='), number32), Suffix::Equals),
    ))(input)
}

fn named_token(input: &str) -> IResult<&str, PatternToken> {
    let (input, name) = identifier(input)?;
    let (input, suffix) = opt(suffix)(input)?;

    let token = match suffix {
        Some(Suffix::Call) => PatternToken::Nonterminal(Ustr::from(name)),
        Some(Suffix::Capture(bits)) => PatternToken::Capture {
            name: Ustr::from(name),
            bits,
        },
        Some(Suffix::NotEquals(value)) => PatternToken::NotEquals {
            name: Ustr::from(name),
            value,
        },
        Some(Suffix::Equals(value)) => PatternToken::Equals {
            name: Ustr::from(name),
            value,
        },
        None => match name {
            "otherwise" => PatternToken::Otherwise,
            "VV1" | "EVV" | "XOPV" => PatternToken::Equals {
                name: Ustr::from(VEXVALID),
                value: match name {
                    "VV1" => EncodingSpace::Vex.vexvalid(),
                    "EVV" => EncodingSpace::Evex.vexvalid(),
                    _ => EncodingSpace::Xop.vexvalid(),
                },
            },
            marker => PatternToken::Marker(Ustr::from(marker)),
        },
    };

    Ok((input, token))
}

fn pattern_token_inner(input: &str) -> IResult<&str, PatternToken> {
    alt((
        map(hex_literal, PatternToken::Literal),
        map(bin_literal, PatternToken::Literal),
        named_token,
    ))(input)
}

pub(crate) fn pattern_token(word: &str, line: usize) -> Result<PatternToken, Error> {
    all_consuming(pattern_token_inner)(word)
        .finish()
        .map(|(_, token)| token)
        .map_err(|_| Error::Token {
            line,
            token: word.to_owned(),
        })
}

pub(crate) fn pattern_tokens(text: &str, line: usize) -> Result<Vec<PatternToken>, Error> {
    text.split_whitespace()
        .map(|word| pattern_token(word, line))
        .collect()
}

fn emit(input: &str) -> IResult<&str, Emit> {
    delimited(
        tag("emit("),
        alt((
            map(consumed(bin_literal), |(text, lit)| {
                Emit::binary(text, lit.value() as u64, lit.width())
            }),
            map(consumed(hex_literal), |(text, lit)| {
                Emit::numeric(text, lit.value() as u64, lit.width())
            }),
            map(take_while1(|c: char| c.is_ascii_lowercase()), |s: &str| {
                Emit::letters(s)
            }),
        )),
        char(')'),
    )(input)
}

fn call<'a>(name: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    delimited(pair(tag(name), char('(')), identifier, char(')'))
}

fn binding(input: &str) -> IResult<&str, Action> {
    let (input, name) = identifier(input)?;
    let (input, value) = preceded(
        char('='),
        alt((
            map(number, FieldValue::Int),
            map(identifier, |s| FieldValue::Name(Ustr::from(s))),
        )),
    )(input)?;

    Ok((
        input,
        Action::FieldBinding {
            name: Ustr::from(name),
            value,
        },
    ))
}

fn action_inner(input: &str) -> IResult<&str, Action> {
    alt((
        map(emit, Action::Emit),
        map(call("nt"), |s| Action::Nt(Ustr::from(s))),
        map(call("ntluf"), |s| Action::Ntluf(Ustr::from(s))),
        map(delimited(tag("return("), number, char(')')), Action::Return),
        binding,
        map(tag("error"), |_| Action::Error),
        map(tag("nothing"), |_| Action::Nothing),
    ))(input)
}

pub(crate) fn action(word: &str, line: usize) -> Result<Action, Error> {
    all_consuming(action_inner)(word)
        .finish()
        .map(|(_, action)| action)
        .map_err(|_| Error::Token {
            line,
            token: word.to_owned(),
        })
}

pub(crate) fn actions(text: &str, line: usize) -> Result<Vec<Action>, Error> {
    text.split_whitespace()
        .map(|word| action(word, line))
        .collect()
}

/// `NAME[=value][:attr...]`
pub(crate) fn operand(word: &str, line: usize) -> Result<OperandSpec, Error> {
    let mut parts = word.split(':');
    let head = parts.next().unwrap_or_default();

    let (name, value) = match head.split_once('=') {
        Some((name, value)) => {
            let value = match all_consuming(number32)(value).finish() {
                Ok((_, v)) => OperandValue::Int(v),
                Err(_) => OperandValue::Name(Ustr::from(value)),
            };
            (name, Some(value))
        }
        None => (head, None),
    };

    if all_consuming(identifier)(name).finish().is_err() {
        return Err(Error::Token {
            line,
            token: word.to_owned(),
        });
    }

    Ok(OperandSpec {
        name: Ustr::from(name),
        value,
        attributes: parts.map(Ustr::from).collect(),
    })
}

fn optional_byte(field: &str, line: usize) -> Result<Option<u8>, Error> {
    if field == "N/A" {
        return Ok(None);
    }
    all_consuming(map_res(number, u8::try_from))(field)
        .finish()
        .map(|(_, v)| Some(v))
        .map_err(|_| Error::Token {
            line,
            token: field.to_owned(),
        })
}

fn presence(field: &str, line: usize) -> Result<Presence, Error> {
    match field {
        "yes" => Ok(Presence::Yes),
        "no" => Ok(Presence::No),
        "var" => Ok(Presence::Var),
        other => Err(Error::Token {
            line,
            token: other.to_owned(),
        }),
    }
}

/// `name space esc mapopc id modrm disp imm opcpos [search...]`
pub(crate) fn map_line(text: &str, line: usize) -> Result<MapInfo, Error> {
    let fields = text.split_whitespace().collect::<Vec<_>>();
    const NAMES: [&str; 9] = [
        "name", "space", "esc", "mapopc", "id", "modrm", "disp", "imm", "opcpos",
    ];
    if let Some(missing) = NAMES.get(fields.len()) {
        return Err(Error::MissingField {
            line,
            field: *missing,
        });
    }

    let space = EncodingSpace::from_name(fields[1]).ok_or_else(|| Error::Token {
        line,
        token: fields[1].to_owned(),
    })?;

    let id = match fields[4] {
        "AMD" => MapId::Amd3dnow,
        id => MapId::Numbered(id.parse()?),
    };

    let imm = match fields[7] {
        "var" => ImmediateSpec::Var,
        n => ImmediateSpec::Bytes(n.parse()?),
    };

    Ok(MapInfo {
        name: Ustr::from(fields[0]),
        space,
        escape: optional_byte(fields[2], line)?,
        map_opcode: optional_byte(fields[3], line)?,
        id,
        modrm: presence(fields[5], line)?,
        disp: presence(fields[6], line)?,
        imm,
        opcode_position: fields[8].parse()?,
        search: fields[9..]
            .iter()
            .map(|word| pattern_token(word, line))
            .collect::<Result<_, _>>()?,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn u(s: &str) -> Ustr {
        Ustr::from(s)
    }

    #[test]
    fn literals_carry_their_width() -> Result<(), Error> {
        assert_eq!(
            pattern_token("0x89", 1)?,
            PatternToken::Literal(Literal::new(0x89, 8))
        );
        assert_eq!(
            pattern_token("0b0101_0", 1)?,
            PatternToken::Literal(Literal::new(0b01010, 5))
        );
        Ok(())
    }

    #[test]
    fn named_tokens() -> Result<(), Error> {
        assert_eq!(pattern_token("MODRM()", 1)?, PatternToken::Nonterminal(u("MODRM")));
        assert_eq!(
            pattern_token("MOD[0b11]", 1)?,
            PatternToken::Capture {
                name: u("MOD"),
                bits: CaptureBits::Literal(Literal::new(3, 2)),
            }
        );
        assert_eq!(
            pattern_token("REG[rrr]", 1)?,
            PatternToken::Capture {
                name: u("REG"),
                bits: CaptureBits::Letters(u("rrr")),
            }
        );
        assert_eq!(
            pattern_token("MOD!=3", 1)?,
            PatternToken::NotEquals {
                name: u("MOD"),
                value: 3
            }
        );
        assert_eq!(
            pattern_token("EVV", 1)?,
            PatternToken::Equals {
                name: u(VEXVALID),
                value: 2
            }
        );
        assert_eq!(pattern_token("V0F38", 1)?, PatternToken::Marker(u("V0F38")));
        assert_eq!(pattern_token("otherwise", 1)?, PatternToken::Otherwise);
        assert_eq!(
            pattern_token("otherwise_x", 1)?,
            PatternToken::Marker(u("otherwise_x"))
        );
        Ok(())
    }

    #[test]
    fn malformed_token_reports_line() {
        assert!(matches!(
            pattern_token("MOD[0b2]", 7),
            Err(Error::Token { line: 7, .. })
        ));
    }

    #[test]
    fn actions_are_classified() -> Result<(), Error> {
        let parsed = actions(
            "ICLASS=MOV EOSZ=2 emit(0b0101) emit(rrr) nt(MODRM) ntluf(GPRv) error nothing return(0x1)",
            1,
        )?;

        assert_eq!(
            parsed[0],
            Action::FieldBinding {
                name: u("ICLASS"),
                value: FieldValue::Name(u("MOV")),
            }
        );
        assert_eq!(
            parsed[1],
            Action::FieldBinding {
                name: u("EOSZ"),
                value: FieldValue::Int(2),
            }
        );
        assert_eq!(parsed[2], Action::Emit(Emit::binary("0b0101", 5, 4)));
        assert_eq!(parsed[3], Action::Emit(Emit::letters("rrr")));
        assert_eq!(parsed[4], Action::Nt(u("MODRM")));
        assert_eq!(parsed[5], Action::Ntluf(u("GPRv")));
        assert_eq!(parsed[6], Action::Error);
        assert_eq!(parsed[7], Action::Nothing);
        assert_eq!(parsed[8], Action::Return(1));
        Ok(())
    }

    #[test]
    fn operands_split_value_and_attributes() -> Result<(), Error> {
        let reg = operand("REG0=GPRv_B():w", 1)?;
        assert_eq!(reg.name(), u("REG0"));
        assert_eq!(reg.value(), Some(&OperandValue::Name(u("GPRv_B()"))));
        assert_eq!(reg.attributes(), &[u("w")]);

        let eosz = operand("EOSZ=3", 1)?;
        assert_eq!(eosz.value(), Some(&OperandValue::Int(3)));
        Ok(())
    }

    #[test]
    fn map_lines() -> Result<(), Error> {
        let map = map_line("legacy_map2 legacy 0x0F 0x38 2 yes no 0 2 0x0F 0x38", 1)?;
        assert_eq!(map.escape(), Some(0x0F));
        assert_eq!(map.map_opcode(), Some(0x38));
        assert_eq!(map.id(), MapId::Numbered(2));
        assert_eq!(map.imm(), ImmediateSpec::Bytes(0));
        assert_eq!(map.search().len(), 2);

        assert!(matches!(
            map_line("short legacy N/A", 3),
            Err(Error::MissingField {
                line: 3,
                field: "mapopc"
            })
        ));
        Ok(())
    }
}
