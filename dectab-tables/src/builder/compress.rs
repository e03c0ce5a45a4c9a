use std::collections::{BTreeMap, BTreeSet};
use std::ops::AddAssign;

use dectab_ir::{ConstraintSet, DomainSource, Pattern, StateSpace, VEXVALID};
use serde::Serialize;
use ustr::Ustr;

use super::config::FoldConfig;

pub const MOD3: &str = "MOD3";
pub const VEXDEST210_7: &str = "VEXDEST210_7";
pub const VEXDEST_ONES: &str = "VEXDEST_ONES";
pub const MASK_ZERO: &str = "MASK_ZERO";

/// A conjunction of `source == literal` terms over decoded fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Derivation {
    terms: Vec<(Ustr, u32)>,
}

impl Derivation {
    pub fn new(terms: Vec<(Ustr, u32)>) -> Self {
        Self { terms }
    }

    pub fn terms(&self) -> &[(Ustr, u32)] {
        &self.terms
    }

    /// `None` if the assignment lacks one of the source fields.
    pub fn eval(&self, assignment: &BTreeMap<Ustr, u32>) -> Option<u32> {
        let mut all = true;
        for (source, literal) in self.terms.iter() {
            all &= assignment.get(source)? == literal;
        }
        Some(all as u32)
    }
}

/// A one-bit token introduced by a fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntheticToken {
    name: Ustr,
    domain: BTreeSet<u32>,
    derivation: Derivation,
}

impl SyntheticToken {
    pub fn new(name: Ustr, derivation: Derivation) -> Self {
        Self {
            name,
            domain: BTreeSet::from([0, 1]),
            derivation,
        }
    }

    pub fn name(&self) -> Ustr {
        self.name
    }

    pub fn domain(&self) -> &BTreeSet<u32> {
        &self.domain
    }

    pub fn width(&self) -> u8 {
        1
    }

    pub fn derivation(&self) -> &Derivation {
        &self.derivation
    }
}

/// The state space as seen from one bucket: synthetic tokens layered over
/// the collected operand deciders.
#[derive(Debug, Clone, Copy)]
pub struct BucketSpace<'a> {
    base: &'a StateSpace,
    synthetic: &'a BTreeMap<Ustr, SyntheticToken>,
}

impl<'a> BucketSpace<'a> {
    pub fn new(base: &'a StateSpace, synthetic: &'a BTreeMap<Ustr, SyntheticToken>) -> Self {
        Self { base, synthetic }
    }

    pub fn synthetic(&self, name: &Ustr) -> Option<&'a SyntheticToken> {
        self.synthetic.get(name)
    }
}

impl<'a> DomainSource for BucketSpace<'a> {
    fn domain(&self, name: &Ustr) -> Result<&BTreeSet<u32>, dectab_ir::Error> {
        match self.synthetic.get(name) {
            Some(token) => Ok(token.domain()),
            None => self.base.domain(name),
        }
    }

    fn width(&self, name: &Ustr) -> Result<u8, dectab_ir::Error> {
        match self.synthetic.get(name) {
            Some(token) => Ok(token.width()),
            None => self.base.width(name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompressedPattern<'p> {
    source: &'p Pattern,
    constraints: ConstraintSet,
}

impl<'p> CompressedPattern<'p> {
    pub fn pattern(&self) -> &'p Pattern {
        self.source
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Fold {
    Mod3,
    Vexdest210Seven,
    VexdestOnes,
    FixedRm(u32),
    MaskZero,
}

/// How often each fold applied; merged across buckets for the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompressionStats {
    pub mod3: usize,
    pub vexdest210_7: usize,
    pub vexdest_ones: usize,
    pub fixed_rm: usize,
    pub mask_zero: usize,
}

impl CompressionStats {
    pub fn record(&mut self, fold: Fold) {
        match fold {
            Fold::Mod3 => self.mod3 += 1,
            Fold::Vexdest210Seven => self.vexdest210_7 += 1,
            Fold::VexdestOnes => self.vexdest_ones += 1,
            Fold::FixedRm(_) => self.fixed_rm += 1,
            Fold::MaskZero => self.mask_zero += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.mod3 + self.vexdest210_7 + self.vexdest_ones + self.fixed_rm + self.mask_zero
    }
}

impl AddAssign<&CompressionStats> for CompressionStats {
    fn add_assign(&mut self, other: &CompressionStats) {
        self.mod3 += other.mod3;
        self.vexdest210_7 += other.vexdest210_7;
        self.vexdest_ones += other.vexdest_ones;
        self.fixed_rm += other.fixed_rm;
        self.mask_zero += other.mask_zero;
    }
}

#[derive(Debug, Clone)]
pub struct CompressedBucket<'p> {
    patterns: Vec<CompressedPattern<'p>>,
    synthetic: BTreeMap<Ustr, SyntheticToken>,
    folds: Vec<Fold>,
    stats: CompressionStats,
}

impl<'p> CompressedBucket<'p> {
    pub fn patterns(&self) -> &[CompressedPattern<'p>] {
        &self.patterns
    }

    pub fn synthetic(&self) -> &BTreeMap<Ustr, SyntheticToken> {
        &self.synthetic
    }

    pub fn folds(&self) -> &[Fold] {
        &self.folds
    }

    pub fn stats(&self) -> &CompressionStats {
        &self.stats
    }

    pub fn space<'a>(&'a self, base: &'a StateSpace) -> BucketSpace<'a> {
        BucketSpace::new(base, &self.synthetic)
    }

    fn constrains(&self, token: &Ustr) -> bool {
        self.patterns.iter().any(|p| p.constraints.contains(token))
    }

    fn name_taken(&self, base: &StateSpace, name: &Ustr) -> bool {
        base.contains(name) || self.synthetic.contains_key(name) || self.constrains(name)
    }

    /// Replace `token` by the one-bit `name = (token == literal)` when every
    /// pattern pins `token` to `literal`, to the rest of its domain (only
    /// when `complement` is allowed), or leaves it alone.
    fn equality_fold(
        &mut self,
        base: &StateSpace,
        token: &str,
        literal: u32,
        name: &str,
        complement: bool,
    ) -> bool {
        let token = Ustr::from(token);
        let name = Ustr::from(name);

        let Ok(domain) = base.domain(&token) else {
            return false;
        };

        if !domain.contains(&literal) || !self.constrains(&token) {
            return false;
        }

        if self.name_taken(base, &name) {
            log::debug!("not folding {token} into {name}: name already in use");
            return false;
        }

        let pinned = BTreeSet::from([literal]);
        let rest = domain - &pinned;

        let safe = self.patterns.iter().all(|p| match p.constraints.get(&token) {
            None => true,
            Some(values) => *values == pinned || (complement && *values == rest),
        });

        if !safe {
            return false;
        }

        for p in self.patterns.iter_mut() {
            if let Some(values) = p.constraints.remove(&token) {
                let bit = values.contains(&literal) as u32;
                p.constraints.insert(name, BTreeSet::from([bit]));
            }
        }

        self.synthetic.insert(
            name,
            SyntheticToken::new(name, Derivation::new(vec![(token, literal)])),
        );

        true
    }

    /// Merge `VEXDEST210_7`, `VEXDEST3 == 1` and `VEXDEST4 == 1` when every
    /// pattern constrains all three or none of them.
    fn vexdest_ones_fold(&mut self, base: &StateSpace) -> bool {
        let seven = Ustr::from(VEXDEST210_7);
        let name = Ustr::from(VEXDEST_ONES);
        let upper = [Ustr::from("VEXDEST3"), Ustr::from("VEXDEST4")];
        let one = BTreeSet::from([1]);

        let Some(stage_one) = self.synthetic.get(&seven).cloned() else {
            return false;
        };

        let domains_ok = upper.iter().all(|token| {
            base.domain(token)
                .map(|domain| domain.contains(&1))
                .unwrap_or(false)
        });

        if !domains_ok || self.name_taken(base, &name) {
            return false;
        }

        let all_or_none = self.patterns.iter().all(|p| {
            let pinned = std::iter::once(&seven)
                .chain(upper.iter())
                .map(|token| p.constraints.get(token))
                .collect::<Vec<_>>();

            pinned.iter().all(|values| *values == Some(&one))
                || pinned.iter().all(Option::is_none)
        });

        if !all_or_none {
            return false;
        }

        for p in self.patterns.iter_mut() {
            if p.constraints.remove(&seven).is_some() {
                for token in upper.iter() {
                    p.constraints.remove(token);
                }
                p.constraints.insert(name, one.clone());
            }
        }

        let mut terms = stage_one.derivation().terms().to_vec();
        terms.extend(upper.iter().map(|token| (*token, 1)));

        self.synthetic.remove(&seven);
        self.synthetic
            .insert(name, SyntheticToken::new(name, Derivation::new(terms)));

        true
    }

    /// The literal `RM` is pinned to, if every constraining pattern pins it
    /// to the same single value.
    fn fixed_rm(&self) -> Option<u32> {
        let rm = Ustr::from("RM");
        let mut pinned = self
            .patterns
            .iter()
            .filter_map(|p| p.constraints.get(&rm))
            .map(|values| (values.len() == 1).then(|| values.iter().next().copied()).flatten());

        let first = pinned.next()??;
        pinned.all(|v| v == Some(first)).then_some(first)
    }

    fn apply(&mut self, fold: Fold) {
        self.folds.push(fold);
        self.stats.record(fold);
    }
}

/// Run the enabled folds over one bucket's patterns.
pub fn compress<'p>(
    patterns: &[&'p Pattern],
    space: &StateSpace,
    folds: &FoldConfig,
) -> CompressedBucket<'p> {
    let vexvalid = Ustr::from(VEXVALID);

    let mut bucket = CompressedBucket {
        patterns: patterns
            .iter()
            .map(|pattern| {
                // the encoding space is part of the bucket key
                let mut constraints = pattern.constraints().clone();
                constraints.remove(&vexvalid);
                CompressedPattern {
                    source: *pattern,
                    constraints,
                }
            })
            .collect(),
        synthetic: BTreeMap::new(),
        folds: Vec::new(),
        stats: CompressionStats::default(),
    };

    if folds.mod3 && bucket.equality_fold(space, "MOD", 3, MOD3, true) {
        bucket.apply(Fold::Mod3);
    }

    if folds.vexdest && bucket.equality_fold(space, "VEXDEST210", 7, VEXDEST210_7, false) {
        bucket.apply(Fold::Vexdest210Seven);
        if bucket.vexdest_ones_fold(space) {
            bucket.apply(Fold::VexdestOnes);
        }
    }

    if folds.fixed_rm {
        if let Some(v) = bucket.fixed_rm() {
            if bucket.equality_fold(space, "RM", v, &format!("RM_{v}"), false) {
                bucket.apply(Fold::FixedRm(v));
            }
        }
    }

    if folds.mask_zero && bucket.equality_fold(space, "MASK", 0, MASK_ZERO, false) {
        bucket.apply(Fold::MaskZero);
    }

    bucket
}

#[cfg(test)]
mod test {
    use dectab_ir::{build_patterns, Grammar, MapTable};

    use super::*;

    fn u(s: &str) -> Ustr {
        Ustr::from(s)
    }

    fn load(input: &str) -> anyhow::Result<(StateSpace, Vec<Pattern>)> {
        env_logger::try_init().ok();
        let grammar = Grammar::from_str(input)?;
        let space = StateSpace::collect(&grammar, &BTreeMap::new())?;
        let patterns = build_patterns(&grammar, &MapTable::x86()?, &space)?;
        Ok((space, patterns))
    }

    fn bits(set: Option<&BTreeSet<u32>>) -> Option<Vec<u32>> {
        set.map(|s| s.iter().copied().collect())
    }

    const MOV: &str = "
INSTRUCTIONS()::
{
ICLASS  : MOV
PATTERN : 0x89 MOD[0b11] MOD=3 REG[rrr] RM[nnn]
}
{
ICLASS  : MOV
PATTERN : 0x89 MOD[mm] MOD!=3 REG[rrr] RM[nnn] MODRM()
}
";

    #[test]
    fn mod3_fold() -> anyhow::Result<()> {
        let (space, patterns) = load(MOV)?;
        let refs = patterns.iter().collect::<Vec<_>>();
        let bucket = compress(&refs, &space, &FoldConfig::default());

        assert_eq!(bucket.folds(), &[Fold::Mod3]);
        assert_eq!(bucket.stats().mod3, 1);
        let c = bucket.patterns().iter().map(|p| p.constraints()).collect::<Vec<_>>();
        assert_eq!(bits(c[0].get(&u(MOD3))), Some(vec![1]));
        assert_eq!(bits(c[1].get(&u(MOD3))), Some(vec![0]));
        assert!(!c[0].contains(&u("MOD")));

        let derivation = bucket.synthetic()[&u(MOD3)].derivation();
        assert_eq!(derivation.terms(), &[(u("MOD"), 3)]);
        assert_eq!(derivation.eval(&BTreeMap::from([(u("MOD"), 3)])), Some(1));
        assert_eq!(derivation.eval(&BTreeMap::from([(u("MOD"), 1)])), Some(0));
        Ok(())
    }

    #[test]
    fn mod3_fold_refused_for_other_subsets() -> anyhow::Result<()> {
        let input = "
INSTRUCTIONS()::
{
ICLASS  : A
PATTERN : 0x10 MOD[0b11] MOD=3
}
{
ICLASS  : B
PATTERN : 0x10 MOD=1
}
";
        let (space, patterns) = load(input)?;
        let refs = patterns.iter().collect::<Vec<_>>();
        let bucket = compress(&refs, &space, &FoldConfig::default());

        assert!(bucket.folds().is_empty());
        assert!(bucket.synthetic().is_empty());
        assert_eq!(bucket.stats().total(), 0);
        Ok(())
    }

    #[test]
    fn disabled_folds_leave_constraints() -> anyhow::Result<()> {
        let (space, patterns) = load(MOV)?;
        let refs = patterns.iter().collect::<Vec<_>>();
        let bucket = compress(&refs, &space, &FoldConfig::none());

        assert!(bucket.folds().is_empty());
        assert!(bucket.patterns()[0].constraints().contains(&u("MOD")));
        Ok(())
    }

    #[test]
    fn vexdest_folds_in_two_stages() -> anyhow::Result<()> {
        let input = "
INSTRUCTIONS()::
{
ICLASS  : VZEROUPPER
PATTERN : VV1 0x77 V0F VEXDEST210=7 VEXDEST3=1 VEXDEST4=1 VL=0
}
{
ICLASS  : VZEROALL
PATTERN : VV1 0x77 V0F VL=1
}
";
        let (space, patterns) = load(input)?;
        let refs = patterns.iter().collect::<Vec<_>>();
        let bucket = compress(&refs, &space, &FoldConfig::default());

        assert_eq!(bucket.folds(), &[Fold::Vexdest210Seven, Fold::VexdestOnes]);
        assert!(bucket.synthetic().get(&u(VEXDEST210_7)).is_none());

        let ones = &bucket.synthetic()[&u(VEXDEST_ONES)];
        assert_eq!(ones.derivation().terms().len(), 3);

        let first = bucket.patterns()[0].constraints();
        assert_eq!(first.tokens().collect::<Vec<_>>(), vec![u("VEXDEST_ONES"), u("VL")]);
        assert!(!bucket.patterns()[1].constraints().contains(&u(VEXDEST_ONES)));
        Ok(())
    }

    #[test]
    fn vexdest_second_stage_needs_all_or_none() -> anyhow::Result<()> {
        let input = "
INSTRUCTIONS()::
{
ICLASS  : A
PATTERN : VV1 0x77 V0F VEXDEST210=7 VEXDEST3=1 VEXDEST4=1
}
{
ICLASS  : B
PATTERN : VV1 0x77 V0F VEXDEST210=7 VL=1
}
";
        let (space, patterns) = load(input)?;
        let refs = patterns.iter().collect::<Vec<_>>();
        let bucket = compress(&refs, &space, &FoldConfig::default());

        assert_eq!(bucket.folds(), &[Fold::Vexdest210Seven]);
        assert!(bucket.synthetic().contains_key(&u(VEXDEST210_7)));
        Ok(())
    }

    #[test]
    fn fixed_rm_and_mask_zero() -> anyhow::Result<()> {
        let input = "
INSTRUCTIONS()::
{
ICLASS  : A
PATTERN : 0x0F 0x01 MOD[0b11] MOD=3 REG[0b010] RM[0b000]
}
{
ICLASS  : B
PATTERN : 0x0F 0x01 MOD[0b11] MOD=3 REG[0b011] MASK=0
}
";
        let (space, patterns) = load(input)?;
        let refs = patterns.iter().collect::<Vec<_>>();
        let bucket = compress(&refs, &space, &FoldConfig::default());

        assert!(bucket.folds().contains(&Fold::FixedRm(0)));
        assert!(bucket.folds().contains(&Fold::MaskZero));
        assert!(bucket.synthetic().contains_key(&u("RM_0")));
        assert_eq!(
            bits(bucket.patterns()[0].constraints().get(&u("RM_0"))),
            Some(vec![1])
        );
        Ok(())
    }
}
