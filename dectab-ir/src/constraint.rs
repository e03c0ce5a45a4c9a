use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use smallvec::SmallVec;
use ustr::Ustr;

use crate::error::Error;
use crate::space::DomainSource;
use crate::token::{CaptureBits, PatternToken};

/// One concrete value per constraint name, in `cnames` order.
pub type Tuple = SmallVec<[u32; 8]>;

/// Required values per operand decider; a token absent from the set is
/// unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ConstraintSet {
    constraints: BTreeMap<Ustr, BTreeSet<u32>>,
}

impl ConstraintSet {
    pub fn from_tokens<D>(tokens: &[PatternToken], space: &D, pattern: &str) -> Result<Self, Error>
    where
        D: DomainSource,
    {
        let mut set = Self::default();

        for token in tokens {
            let (name, allowed) = match token {
                PatternToken::Equals { name, value } => (*name, BTreeSet::from([*value])),
                PatternToken::Capture {
                    name,
                    bits: CaptureBits::Literal(lit),
                } => (*name, BTreeSet::from([lit.value()])),
                PatternToken::NotEquals { name, value } => {
                    let mut allowed = space.domain(name)?.clone();
                    allowed.remove(value);
                    (*name, allowed)
                }
                _ => continue,
            };
            set.restrict(name, allowed, pattern)?;
        }

        Ok(set)
    }

    /// Intersect the existing requirement on `name` with `allowed`.
    pub fn restrict(
        &mut self,
        name: Ustr,
        allowed: BTreeSet<u32>,
        pattern: &str,
    ) -> Result<(), Error> {
        let values = match self.constraints.remove(&name) {
            Some(existing) => existing.intersection(&allowed).copied().collect(),
            None => allowed,
        };

        if values.is_empty() {
            return Err(Error::EmptyConstraint {
                token: name,
                pattern: pattern.to_owned(),
            });
        }

        self.constraints.insert(name, values);
        Ok(())
    }

    pub fn get(&self, name: &Ustr) -> Option<&BTreeSet<u32>> {
        self.constraints.get(name)
    }

    pub fn insert(&mut self, name: Ustr, values: BTreeSet<u32>) -> Option<BTreeSet<u32>> {
        self.constraints.insert(name, values)
    }

    pub fn remove(&mut self, name: &Ustr) -> Option<BTreeSet<u32>> {
        self.constraints.remove(name)
    }

    pub fn contains(&self, name: &Ustr) -> bool {
        self.constraints.contains_key(name)
    }

    pub fn tokens(&self) -> impl Iterator<Item = Ustr> + '_ {
        self.constraints.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Ustr, &BTreeSet<u32>)> {
        self.constraints.iter()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Does a concrete assignment satisfy every requirement? Tokens missing
    /// from the assignment never match a constrained name.
    pub fn matches(&self, assignment: &BTreeMap<Ustr, u32>) -> bool {
        self.constraints.iter().all(|(name, values)| {
            assignment
                .get(name)
                .map(|v| values.contains(v))
                .unwrap_or(false)
        })
    }
}

/// Every concrete tuple over `cnames` admitted by `constraints`, with the
/// full domain substituted for each unconstrained name.
pub fn expand_to_full_domain<D>(
    constraints: &ConstraintSet,
    cnames: &[Ustr],
    space: &D,
) -> Result<BTreeSet<Tuple>, Error>
where
    D: DomainSource,
{
    if let Some(stray) = constraints.tokens().find(|name| !cnames.contains(name)) {
        return Err(Error::Invariant(format!(
            "constrained token `{stray}` is not one of the dictionary's names"
        )));
    }

    let mut out = BTreeSet::new();
    let mut prefix = Tuple::new();
    expand_from(constraints, cnames, space, &mut prefix, &mut out)?;
    Ok(out)
}

fn expand_from<D>(
    constraints: &ConstraintSet,
    rest: &[Ustr],
    space: &D,
    prefix: &mut Tuple,
    out: &mut BTreeSet<Tuple>,
) -> Result<(), Error>
where
    D: DomainSource,
{
    let Some((name, rest)) = rest.split_first() else {
        out.insert(prefix.clone());
        return Ok(());
    };

    let values = match constraints.get(name) {
        Some(values) => values,
        None => space.domain(name)?,
    };

    for value in values {
        prefix.push(*value);
        expand_from(constraints, rest, space, prefix, out)?;
        prefix.pop();
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::space::StateSpace;
    use crate::token::Literal;

    fn u(s: &str) -> Ustr {
        Ustr::from(s)
    }

    fn space() -> Result<StateSpace, Error> {
        let mut builder = StateSpace::builder();
        builder.record_range(u("MOD"), 2).record_range(u("REG"), 3);
        builder.record(u("REXW"), 0).record(u("REXW"), 1);
        builder.build()
    }

    #[test]
    fn inequality_uses_finished_domain() -> Result<(), Error> {
        let space = space()?;
        let set = ConstraintSet::from_tokens(
            &[PatternToken::NotEquals {
                name: u("MOD"),
                value: 3,
            }],
            &space,
            "MOD!=3",
        )?;

        assert_eq!(
            set.get(&u("MOD")).map(|v| v.iter().copied().collect::<Vec<_>>()),
            Some(vec![0, 1, 2])
        );
        Ok(())
    }

    #[test]
    fn repeated_constraints_intersect() -> Result<(), Error> {
        let space = space()?;
        let tokens = [
            PatternToken::Capture {
                name: u("MOD"),
                bits: CaptureBits::Literal(Literal::new(3, 2)),
            },
            PatternToken::Equals {
                name: u("MOD"),
                value: 3,
            },
        ];
        let set = ConstraintSet::from_tokens(&tokens, &space, "MOD[0b11] MOD=3")?;
        assert_eq!(set.get(&u("MOD")).map(BTreeSet::len), Some(1));

        let clash = [
            PatternToken::Equals {
                name: u("MOD"),
                value: 3,
            },
            PatternToken::NotEquals {
                name: u("MOD"),
                value: 3,
            },
        ];
        assert!(matches!(
            ConstraintSet::from_tokens(&clash, &space, "MOD=3 MOD!=3"),
            Err(Error::EmptyConstraint { .. })
        ));
        Ok(())
    }

    #[test]
    fn expansion_backfills_unconstrained_names() -> Result<(), Error> {
        let space = space()?;
        let mut set = ConstraintSet::default();
        set.insert(u("MOD"), BTreeSet::from([3]));

        let cnames = [u("MOD"), u("REXW")];
        let tuples = expand_to_full_domain(&set, &cnames, &space)?;
        let tuples = tuples.into_iter().map(|t| t.to_vec()).collect::<Vec<_>>();
        assert_eq!(tuples, vec![vec![3, 0], vec![3, 1]]);

        let all = expand_to_full_domain(&ConstraintSet::default(), &cnames, &space)?;
        assert_eq!(all.len(), 8);
        Ok(())
    }

    #[test]
    fn expansion_without_names_is_one_empty_tuple() -> Result<(), Error> {
        let space = space()?;
        let tuples = expand_to_full_domain(&ConstraintSet::default(), &[], &space)?;
        assert_eq!(tuples.len(), 1);
        assert!(tuples.iter().all(|t| t.is_empty()));
        Ok(())
    }

    #[test]
    fn stray_constraint_is_an_invariant_violation() -> Result<(), Error> {
        let space = space()?;
        let mut set = ConstraintSet::default();
        set.insert(u("REG"), BTreeSet::from([1]));
        assert!(matches!(
            expand_to_full_domain(&set, &[u("MOD")], &space),
            Err(Error::Invariant(_))
        ));
        Ok(())
    }

    #[test]
    fn matching_requires_every_constrained_name() {
        let mut set = ConstraintSet::default();
        set.insert(u("MOD"), BTreeSet::from([3]));

        assert!(set.matches(&BTreeMap::from([(u("MOD"), 3), (u("REG"), 1)])));
        assert!(!set.matches(&BTreeMap::from([(u("MOD"), 2)])));
        assert!(!set.matches(&BTreeMap::from([(u("REG"), 2)])));
    }
}
