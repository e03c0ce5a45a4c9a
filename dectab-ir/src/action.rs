use std::fmt;

use serde::Serialize;
use ustr::Ustr;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FieldValue {
    Int(u64),
    Name(Ustr),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Name(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum EmitKind {
    /// hexadecimal byte literal
    Numeric,
    /// captured field bits (`rrr`)
    Letters,
    /// binary literal
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Emit {
    text: Ustr,
    kind: EmitKind,
    width: u8,
    value: Option<u64>,
}

impl Emit {
    pub fn numeric(text: impl AsRef<str>, value: u64, width: u8) -> Self {
        Self {
            text: Ustr::from(text.as_ref()),
            kind: EmitKind::Numeric,
            width,
            value: Some(value),
        }
    }

    pub fn binary(text: impl AsRef<str>, value: u64, width: u8) -> Self {
        Self {
            text: Ustr::from(text.as_ref()),
            kind: EmitKind::Binary,
            width,
            value: Some(value),
        }
    }

    pub fn letters(field: impl AsRef<str>) -> Self {
        let text = Ustr::from(field.as_ref());
        Self {
            width: text.len() as u8,
            text,
            kind: EmitKind::Letters,
            value: None,
        }
    }

    pub fn text(&self) -> Ustr {
        self.text
    }

    pub fn kind(&self) -> EmitKind {
        self.kind
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    /// The literal bits, or `None` for captured field bits.
    pub fn value(&self) -> Option<u64> {
        self.value
    }
}

/// One resolved entry of a rule's action list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Action {
    FieldBinding { name: Ustr, value: FieldValue },
    Emit(Emit),
    Nt(Ustr),
    Ntluf(Ustr),
    Error,
    Nothing,
    Return(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ActionKind {
    FieldBinding,
    Emit,
    Nt,
    Ntluf,
    Error,
    Nothing,
    Return,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::FieldBinding { .. } => ActionKind::FieldBinding,
            Self::Emit(_) => ActionKind::Emit,
            Self::Nt(_) => ActionKind::Nt,
            Self::Ntluf(_) => ActionKind::Ntluf,
            Self::Error => ActionKind::Error,
            Self::Nothing => ActionKind::Nothing,
            Self::Return(_) => ActionKind::Return,
        }
    }

    pub fn nonterminal(&self) -> Option<Ustr> {
        match self {
            Self::Nt(name) | Self::Ntluf(name) => Some(*name),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldBinding { name, value } => write!(f, "{name}={value}"),
            Self::Emit(emit) => write!(f, "emit({})", emit.text()),
            Self::Nt(name) => write!(f, "nt({name})"),
            Self::Ntluf(name) => write!(f, "ntluf({name})"),
            Self::Error => write!(f, "error"),
            Self::Nothing => write!(f, "nothing"),
            Self::Return(v) => write!(f, "return({v})"),
        }
    }
}

/// Presence counts of an action list; used to size dispatch rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionSummary {
    pub field_bindings: usize,
    pub emits: usize,
    pub nonterminals: usize,
    pub lookup_functions: usize,
    pub returns: usize,
    pub errors: usize,
    pub nothings: usize,
}

impl ActionSummary {
    pub fn of(actions: &[Action]) -> Self {
        actions.iter().fold(Self::default(), |mut summary, action| {
            match action.kind() {
                ActionKind::FieldBinding => summary.field_bindings += 1,
                ActionKind::Emit => summary.emits += 1,
                ActionKind::Nt => summary.nonterminals += 1,
                ActionKind::Ntluf => summary.lookup_functions += 1,
                ActionKind::Return => summary.returns += 1,
                ActionKind::Error => summary.errors += 1,
                ActionKind::Nothing => summary.nothings += 1,
            }
            summary
        })
    }

    pub fn merge(&mut self, other: &Self) {
        self.field_bindings = self.field_bindings.max(other.field_bindings);
        self.emits = self.emits.max(other.emits);
        self.nonterminals = self.nonterminals.max(other.nonterminals);
        self.lookup_functions = self.lookup_functions.max(other.lookup_functions);
        self.returns = self.returns.max(other.returns);
        self.errors = self.errors.max(other.errors);
        self.nothings = self.nothings.max(other.nothings);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn summary_counts_each_kind() {
        let actions = vec![
            Action::FieldBinding {
                name: Ustr::from("ICLASS"),
                value: FieldValue::Name(Ustr::from("MOV")),
            },
            Action::Nt(Ustr::from("MODRM")),
            Action::Nt(Ustr::from("SIB")),
            Action::Return(1),
        ];

        let summary = ActionSummary::of(&actions);
        assert_eq!(summary.field_bindings, 1);
        assert_eq!(summary.nonterminals, 2);
        assert_eq!(summary.returns, 1);
        assert_eq!(summary.errors, 0);

        let mut widest = ActionSummary::of(&[Action::Error]);
        widest.merge(&summary);
        assert_eq!(widest.errors, 1);
        assert_eq!(widest.nonterminals, 2);
    }

    #[test]
    fn letter_emits_take_width_from_field() {
        let emit = Emit::letters("rrr");
        assert_eq!(emit.kind(), EmitKind::Letters);
        assert_eq!(emit.width(), 3);
        assert_eq!(emit.value(), None);
    }
}
