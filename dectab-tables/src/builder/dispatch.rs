use std::collections::BTreeMap;

use dectab_ir::{Action, ActionSummary, FieldValue, Pattern};
use dectab_phash::{HashFunction, KeySet, Slot, Synthesizer};
use serde::Serialize;
use ustr::Ustr;

use super::bucket::BucketKey;
use super::cdict::{ConstraintDictionary, DictionaryEntry};
use super::error::BuilderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BindingKind {
    Int,
    Str,
}

/// The row fields of one bucket: the union of the action kinds its
/// patterns use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RowLayout {
    bindings: BTreeMap<Ustr, BindingKind>,
    summary: ActionSummary,
    validated: bool,
}

impl RowLayout {
    fn of<'a, I>(patterns: I, validated: bool) -> Result<Self, BuilderError>
    where
        I: IntoIterator<Item = &'a Pattern>,
    {
        let mut layout = Self {
            validated,
            ..Default::default()
        };

        for pattern in patterns {
            let mut seen = Vec::new();
            for action in pattern.actions() {
                let Action::FieldBinding { name, value } = action else {
                    continue;
                };

                if seen.contains(name) {
                    return Err(BuilderError::DuplicateBinding {
                        pattern: pattern.to_string(),
                        name: *name,
                    });
                }
                seen.push(*name);

                let kind = match value {
                    FieldValue::Int(_) => BindingKind::Int,
                    FieldValue::Name(_) => BindingKind::Str,
                };
                layout
                    .bindings
                    .entry(*name)
                    .and_modify(|current| {
                        if kind == BindingKind::Str {
                            *current = BindingKind::Str
                        }
                    })
                    .or_insert(kind);
            }
            layout.summary.merge(&pattern.summary());
        }

        Ok(layout)
    }

    pub fn bindings(&self) -> &BTreeMap<Ustr, BindingKind> {
        &self.bindings
    }

    pub fn summary(&self) -> &ActionSummary {
        &self.summary
    }

    pub fn has_nt(&self) -> bool {
        self.summary.nonterminals > 0
    }

    pub fn has_ntluf(&self) -> bool {
        self.summary.lookup_functions > 0
    }

    pub fn has_emit(&self) -> bool {
        self.summary.emits > 0
    }

    pub fn has_error(&self) -> bool {
        self.summary.errors > 0
    }

    pub fn has_nothing(&self) -> bool {
        self.summary.nothings > 0
    }

    pub fn has_return(&self) -> bool {
        self.summary.returns > 0
    }

    /// Rows store their key when the hash may map foreign keys onto them.
    pub fn validated(&self) -> bool {
        self.validated
    }
}

#[derive(Debug, Clone)]
pub struct HashedEntry<'p> {
    entry: DictionaryEntry<'p>,
    slot: Slot,
}

impl<'p> HashedEntry<'p> {
    pub fn entry(&self) -> &DictionaryEntry<'p> {
        &self.entry
    }

    pub fn key(&self) -> u64 {
        self.entry.key()
    }

    pub fn pattern(&self) -> &'p Pattern {
        self.entry.pattern()
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }
}

/// A bucket's dictionary placed by its perfect hash function.
#[derive(Debug, Clone)]
pub struct HashedTable<'p> {
    dictionary: ConstraintDictionary<'p>,
    function: HashFunction,
    entries: Vec<HashedEntry<'p>>,
    slots: BTreeMap<Slot, usize>,
    layout: RowLayout,
}

impl<'p> HashedTable<'p> {
    pub fn build(
        dictionary: ConstraintDictionary<'p>,
        synthesizer: &Synthesizer,
    ) -> Result<Self, BuilderError> {
        let bucket = dictionary.bucket();
        let hash_error = |source| BuilderError::Hash { bucket, source };

        let keys = KeySet::new(dictionary.keys(), dictionary.key_bits()).map_err(hash_error)?;
        let function = synthesizer.synthesize(&keys).map_err(hash_error)?;

        let mut entries = Vec::with_capacity(dictionary.len());
        let mut slots = BTreeMap::new();

        for entry in dictionary.entries() {
            let slot = function.slot(entry.key()).ok_or_else(|| {
                BuilderError::invariant(format!(
                    "{bucket}: key {:#x} has no slot under {}",
                    entry.key(),
                    function.kind()
                ))
            })?;

            if let Some(previous) = slots.insert(slot, entries.len()) {
                let previous: &HashedEntry = &entries[previous];
                return Err(BuilderError::invariant(format!(
                    "{bucket}: keys {:#x} and {:#x} share slot {slot:?}",
                    previous.key(),
                    entry.key()
                )));
            }

            entries.push(HashedEntry {
                entry: entry.clone(),
                slot,
            });
        }

        let layout = RowLayout::of(
            entries.iter().map(HashedEntry::pattern),
            function.needs_validation(),
        )?;

        log::debug!(
            "{bucket}: {} hash over {} slots for {} keys",
            function.kind(),
            function.size(),
            entries.len()
        );

        Ok(Self {
            dictionary,
            function,
            entries,
            slots,
            layout,
        })
    }

    /// Walk the table the way generated lookup code does.
    pub fn lookup_key(&self, key: u64) -> Option<&HashedEntry<'p>> {
        let slot = self.function.slot(key)?;
        let entry = &self.entries[*self.slots.get(&slot)?];
        (!self.layout.validated || entry.key() == key).then_some(entry)
    }

    pub fn lookup_tuple(&self, tuple: &[u32]) -> Option<&HashedEntry<'p>> {
        self.lookup_key(self.dictionary.pack(tuple).ok()?)
    }

    pub fn decode(&self, assignment: &BTreeMap<Ustr, u32>) -> Option<&'p Pattern> {
        self.lookup_key(self.dictionary.key_of(assignment)?)
            .map(HashedEntry::pattern)
    }

    /// Entries of the nested table at first-level `bucket`, by index.
    pub fn nested(&self, bucket: usize) -> impl Iterator<Item = &HashedEntry<'p>> {
        self.entries.iter().filter(move |entry| {
            matches!(entry.slot, Slot::Nested { bucket: b, .. } if b == bucket)
        })
    }

    pub fn entry_at(&self, slot: Slot) -> Option<&HashedEntry<'p>> {
        self.slots.get(&slot).map(|i| &self.entries[*i])
    }

    pub fn bucket(&self) -> BucketKey {
        self.dictionary.bucket()
    }

    pub fn dictionary(&self) -> &ConstraintDictionary<'p> {
        &self.dictionary
    }

    pub fn function(&self) -> &HashFunction {
        &self.function
    }

    pub fn entries(&self) -> &[HashedEntry<'p>] {
        &self.entries
    }

    pub fn layout(&self) -> &RowLayout {
        &self.layout
    }

    pub fn max_bucket_load(&self) -> usize {
        match KeySet::new(self.dictionary.keys(), self.dictionary.key_bits()) {
            Ok(keys) => self.function.max_bucket_load(&keys),
            Err(_) => 0,
        }
    }
}
