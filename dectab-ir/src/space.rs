use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use ustr::Ustr;

use crate::action::{Action, FieldValue};
use crate::deserialise::{Grammar, OperandSpec, OperandValue};
use crate::error::Error;
use crate::token::{CaptureBits, PatternToken};

/// The implied encoding-space indicator; bucket keying depends on it even
/// when no rule tests it.
pub const VEXVALID: &str = "VEXVALID";

/// Minimum number of bits able to hold `max`; never less than one.
pub fn bits_for(max: u32) -> u8 {
    (u32::BITS - max.leading_zeros()).max(1) as u8
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperandToken {
    name: Ustr,
    domain: BTreeSet<u32>,
    width: u8,
}

impl OperandToken {
    pub fn new(
        name: impl Into<Ustr>,
        domain: BTreeSet<u32>,
        width: Option<u8>,
    ) -> Result<Self, Error> {
        let name = name.into();
        let max = domain.iter().next_back().copied().unwrap_or(0);
        let width = width.unwrap_or_else(|| bits_for(max));

        if width < 32 && max >= (1u32 << width) {
            return Err(Error::ValueWidth {
                token: name,
                value: max,
                width,
            });
        }

        Ok(Self {
            name,
            domain,
            width,
        })
    }

    pub fn name(&self) -> Ustr {
        self.name
    }

    pub fn domain(&self) -> &BTreeSet<u32> {
        &self.domain
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn contains(&self, value: u32) -> bool {
        self.domain.contains(&value)
    }
}

/// Anything that can answer "which values may this token take".
pub trait DomainSource {
    fn domain(&self, name: &Ustr) -> Result<&BTreeSet<u32>, Error>;
    fn width(&self, name: &Ustr) -> Result<u8, Error>;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StateSpace {
    tokens: BTreeMap<Ustr, OperandToken>,
}

impl StateSpace {
    pub fn builder() -> StateSpaceBuilder {
        StateSpaceBuilder::default()
    }

    /// Scan every nonterminal row and instruction record once and return the
    /// legal domain of every operand decider.
    pub fn collect(grammar: &Grammar, widths: &BTreeMap<Ustr, u8>) -> Result<Self, Error> {
        let mut builder = Self::builder().with_widths(widths.clone());

        for nt in grammar.nonterminals() {
            for row in nt.rows() {
                builder.record_tokens(row.tokens());
                builder.record_actions(row.actions());
            }
        }

        for record in grammar.instructions() {
            builder.record_tokens(record.tokens());
            builder.record_operands(record.operands());
            if let Some(actions) = record.actions() {
                builder.record_actions(actions);
            }
        }

        let space = builder.build()?;
        log::debug!("collected state space for {} operand deciders", space.len());
        Ok(space)
    }

    pub fn token(&self, name: &Ustr) -> Option<&OperandToken> {
        self.tokens.get(name)
    }

    pub fn contains(&self, name: &Ustr) -> bool {
        self.tokens.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperandToken> {
        self.tokens.values()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl DomainSource for StateSpace {
    fn domain(&self, name: &Ustr) -> Result<&BTreeSet<u32>, Error> {
        self.tokens
            .get(name)
            .map(OperandToken::domain)
            .ok_or(Error::UnknownDomain(*name))
    }

    fn width(&self, name: &Ustr) -> Result<u8, Error> {
        self.tokens
            .get(name)
            .map(OperandToken::width)
            .ok_or(Error::UnknownDomain(*name))
    }
}

/// Widest letter capture whose values are enumerated into a domain.
pub const MAX_CAPTURE_BITS: u8 = 16;

#[derive(Debug, Clone, Default)]
pub struct StateSpaceBuilder {
    values: BTreeMap<Ustr, BTreeSet<u32>>,
    inequalities: Vec<(Ustr, u32)>,
    widths: BTreeMap<Ustr, u8>,
    oversized: Vec<(Ustr, u8)>,
}

impl StateSpaceBuilder {
    pub fn with_widths(mut self, widths: BTreeMap<Ustr, u8>) -> Self {
        self.widths = widths;
        self
    }

    pub fn record(&mut self, name: Ustr, value: u32) -> &mut Self {
        self.values.entry(name).or_default().insert(value);
        self
    }

    /// A letter capture of `bits` bits may take every value it can hold.
    /// Captures wider than [`MAX_CAPTURE_BITS`] fail the build.
    pub fn record_range(&mut self, name: Ustr, bits: u8) -> &mut Self {
        if bits > MAX_CAPTURE_BITS {
            self.oversized.push((name, bits));
            return self;
        }
        let values = self.values.entry(name).or_default();
        values.extend(0..(1u32 << bits));
        self
    }

    pub fn record_inequality(&mut self, name: Ustr, value: u32) -> &mut Self {
        self.inequalities.push((name, value));
        self
    }

    pub fn record_tokens(&mut self, tokens: &[PatternToken]) -> &mut Self {
        for token in tokens {
            match token {
                PatternToken::Equals { name, value } => {
                    self.record(*name, *value);
                }
                PatternToken::Capture {
                    name,
                    bits: CaptureBits::Literal(lit),
                } => {
                    self.record(*name, lit.value());
                }
                PatternToken::Capture {
                    name,
                    bits: bits @ CaptureBits::Letters(_),
                } => {
                    self.record_range(*name, bits.width());
                }
                PatternToken::NotEquals { name, value } => {
                    self.record_inequality(*name, *value);
                }
                PatternToken::Literal(_)
                | PatternToken::Nonterminal(_)
                | PatternToken::Marker(_)
                | PatternToken::Otherwise => (),
            }
        }
        self
    }

    pub fn record_actions(&mut self, actions: &[Action]) -> &mut Self {
        for action in actions {
            if let Action::FieldBinding {
                name,
                value: FieldValue::Int(value),
            } = action
            {
                match u32::try_from(*value) {
                    Ok(value) => {
                        self.record(*name, value);
                    }
                    Err(_) => log::trace!("{name}={value} is not an operand decider value"),
                }
            }
        }
        self
    }

    pub fn record_operands(&mut self, operands: &[OperandSpec]) -> &mut Self {
        for operand in operands {
            if let Some(OperandValue::Int(value)) = operand.value() {
                self.record(operand.name(), *value);
            }
        }
        self
    }

    pub fn build(mut self) -> Result<StateSpace, Error> {
        if let Some(&(token, bits)) = self.oversized.first() {
            return Err(Error::CaptureWidth {
                token,
                bits,
                limit: MAX_CAPTURE_BITS,
            });
        }

        self.values
            .entry(Ustr::from(VEXVALID))
            .or_insert_with(|| BTreeSet::from([0]));

        // equality collection is complete at this point; an inequality on a
        // token we still know nothing about means a pass ran too early
        for (name, value) in self.inequalities.iter() {
            if !self.values.contains_key(name) {
                return Err(Error::UnknownDomain(*name));
            }
            log::trace!("{name}!={value} resolved against collected domain");
        }

        let tokens = self
            .values
            .into_iter()
            .map(|(name, domain)| {
                let width = self.widths.get(&name).copied();
                OperandToken::new(name, domain, width).map(|token| (name, token))
            })
            .collect::<Result<BTreeMap<_, _>, Error>>()?;

        Ok(StateSpace { tokens })
    }
}
