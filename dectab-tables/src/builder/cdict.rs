use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use dectab_ir::{expand_to_full_domain, DomainSource, Pattern, StateSpace, Tuple};
use itertools::Itertools;
use ustr::Ustr;

use super::bucket::BucketKey;
use super::compress::{CompressedBucket, SyntheticToken};
use super::error::BuilderError;

/// One fully-expanded tuple, its packed key and the pattern claiming it.
#[derive(Debug, Clone)]
pub struct DictionaryEntry<'p> {
    tuple: Tuple,
    key: u64,
    pattern: &'p Pattern,
}

impl<'p> DictionaryEntry<'p> {
    pub fn tuple(&self) -> &[u32] {
        &self.tuple
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn pattern(&self) -> &'p Pattern {
        self.pattern
    }
}

/// The unified constraint tuples of one bucket, packed into integer keys.
#[derive(Debug, Clone)]
pub struct ConstraintDictionary<'p> {
    bucket: BucketKey,
    cnames: Vec<Ustr>,
    widths: Vec<u8>,
    shifts: Vec<u32>,
    entries: Vec<DictionaryEntry<'p>>,
    synthetic: BTreeMap<Ustr, SyntheticToken>,
}

fn describe(cnames: &[Ustr], tuple: &[u32]) -> String {
    cnames
        .iter()
        .zip(tuple.iter())
        .map(|(name, value)| format!("{name}={value}"))
        .join(", ")
}

impl<'p> ConstraintDictionary<'p> {
    pub fn build(
        bucket: BucketKey,
        compressed: &CompressedBucket<'p>,
        space: &StateSpace,
        packing_bits: u8,
    ) -> Result<Self, BuilderError> {
        let view = compressed.space(space);

        let cnames = compressed
            .patterns()
            .iter()
            .flat_map(|p| p.constraints().tokens())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();

        let widths = cnames
            .iter()
            .map(|name| view.width(name))
            .collect::<Result<Vec<_>, _>>()?;

        let bits = widths.iter().map(|w| *w as u32).sum::<u32>();
        if bits > packing_bits as u32 {
            return Err(BuilderError::PackingOverflow {
                bucket,
                bits,
                limit: packing_bits,
            });
        }

        let shifts = widths
            .iter()
            .scan(0u32, |offset, width| {
                let shift = *offset;
                *offset += *width as u32;
                Some(shift)
            })
            .collect::<Vec<_>>();

        let mut claims = BTreeMap::<Tuple, &'p Pattern>::new();

        for member in compressed.patterns() {
            let pattern = member.pattern();
            for tuple in expand_to_full_domain(member.constraints(), &cnames, &view)? {
                match claims.entry(tuple) {
                    Entry::Vacant(slot) => {
                        slot.insert(pattern);
                    }
                    Entry::Occupied(slot) if *slot.get() == pattern => {
                        log::debug!(
                            "{bucket}: {pattern} repeats the claim of {}",
                            slot.get().id()
                        );
                    }
                    Entry::Occupied(slot) => {
                        return Err(BuilderError::Conflict {
                            bucket,
                            tuple: describe(&cnames, slot.key()),
                            first: slot.get().to_string(),
                            second: pattern.to_string(),
                        });
                    }
                }
            }
        }

        let mut dictionary = Self {
            bucket,
            cnames,
            widths,
            shifts,
            entries: Vec::with_capacity(claims.len()),
            synthetic: compressed.synthetic().clone(),
        };

        let mut packed = BTreeMap::<u64, Tuple>::new();

        for (tuple, pattern) in claims {
            let key = dictionary.pack(&tuple)?;

            if let Some(first) = packed.get(&key) {
                return Err(BuilderError::PackingCollision {
                    bucket,
                    key,
                    first: describe(&dictionary.cnames, first),
                    second: describe(&dictionary.cnames, &tuple),
                });
            }
            packed.insert(key, tuple.clone());

            dictionary.entries.push(DictionaryEntry {
                tuple,
                key,
                pattern,
            });
        }

        dictionary.entries.sort_by_key(DictionaryEntry::key);

        log::debug!(
            "{bucket}: {} tuples over [{}] in {bits} bits",
            dictionary.entries.len(),
            dictionary.cnames.iter().join(", "),
        );

        Ok(dictionary)
    }

    /// Concatenate a tuple's values, each shifted past its predecessors.
    pub fn pack(&self, tuple: &[u32]) -> Result<u64, BuilderError> {
        if tuple.len() != self.cnames.len() {
            return Err(BuilderError::invariant(format!(
                "{}: tuple of {} values for {} names",
                self.bucket,
                tuple.len(),
                self.cnames.len()
            )));
        }

        let mut key = 0u64;
        for (i, value) in tuple.iter().enumerate() {
            let width = self.widths[i];
            if (*value as u64) >> width != 0 {
                return Err(BuilderError::PackingWidth {
                    bucket: self.bucket,
                    token: self.cnames[i],
                    value: *value,
                    width,
                });
            }
            key |= (*value as u64) << self.shifts[i];
        }
        Ok(key)
    }

    /// The key a decoder computes from concrete decoded fields, with
    /// synthetic tokens evaluated from their derivations.
    pub fn key_of(&self, assignment: &BTreeMap<Ustr, u32>) -> Option<u64> {
        let tuple = self
            .cnames
            .iter()
            .map(|name| match self.synthetic.get(name) {
                Some(token) => token.derivation().eval(assignment),
                None => assignment.get(name).copied(),
            })
            .collect::<Option<Tuple>>()?;
        self.pack(&tuple).ok()
    }

    pub fn entry(&self, key: u64) -> Option<&DictionaryEntry<'p>> {
        self.entries
            .binary_search_by_key(&key, DictionaryEntry::key)
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn lookup_tuple(&self, tuple: &[u32]) -> Option<&DictionaryEntry<'p>> {
        self.entry(self.pack(tuple).ok()?)
    }

    /// The pattern selected for a concrete assignment, if any.
    pub fn decode(&self, assignment: &BTreeMap<Ustr, u32>) -> Option<&'p Pattern> {
        self.entry(self.key_of(assignment)?).map(DictionaryEntry::pattern)
    }

    /// Decoded fields the key is computed from.
    pub fn sources(&self) -> BTreeSet<Ustr> {
        self.cnames
            .iter()
            .flat_map(|name| match self.synthetic.get(name) {
                Some(token) => token
                    .derivation()
                    .terms()
                    .iter()
                    .map(|(source, _)| *source)
                    .collect::<Vec<_>>(),
                None => vec![*name],
            })
            .collect()
    }

    pub fn bucket(&self) -> BucketKey {
        self.bucket
    }

    pub fn cnames(&self) -> &[Ustr] {
        &self.cnames
    }

    pub fn widths(&self) -> &[u8] {
        &self.widths
    }

    pub fn shifts(&self) -> &[u32] {
        &self.shifts
    }

    pub fn key_bits(&self) -> u8 {
        self.widths.iter().sum()
    }

    pub fn synthetic(&self) -> &BTreeMap<Ustr, SyntheticToken> {
        &self.synthetic
    }

    pub fn entries(&self) -> &[DictionaryEntry<'p>] {
        &self.entries
    }

    pub fn keys(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().map(DictionaryEntry::key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
