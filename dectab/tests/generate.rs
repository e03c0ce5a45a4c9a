use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use dectab::ir::{DomainSource, Grammar, MapTable, Pattern, StateSpace};
use dectab::phash::{HashKind, SearchConfig};
use dectab::tables::{
    build_with, from_grammar, partition, BucketKey, BuilderError, FoldConfig, GeneratorConfig,
    HashedTable, Model,
};
use ustr::Ustr;

fn data(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

fn fixture() -> anyhow::Result<(Grammar, MapTable)> {
    env_logger::try_init().ok();
    Ok((
        Grammar::from_file(data("grammar.txt"))?,
        MapTable::from_file(data("maps.txt"))?,
    ))
}

fn u(s: &str) -> Ustr {
    Ustr::from(s)
}

fn find<'a, 'p>(tables: &'a [HashedTable<'p>], name: &str) -> &'a HashedTable<'p> {
    tables
        .iter()
        .find(|table| table.bucket().snake_name() == name)
        .unwrap_or_else(|| panic!("no bucket {name}"))
}

/// Every assignment of `names` drawn from their collected domains.
fn assignments(space: &StateSpace, names: &BTreeSet<Ustr>) -> Vec<BTreeMap<Ustr, u32>> {
    let mut out = vec![BTreeMap::new()];
    for name in names {
        let domain = space.domain(name).expect("source token has a domain");
        out = out
            .into_iter()
            .flat_map(|partial| {
                domain.iter().map(move |value| {
                    let mut next = partial.clone();
                    next.insert(*name, *value);
                    next
                })
            })
            .collect();
    }
    out
}

/// The first pattern of the bucket whose unfolded constraints admit
/// `assignment`.
fn scan<'p>(
    bucket: BucketKey,
    members: &[&'p Pattern],
    assignment: &BTreeMap<Ustr, u32>,
) -> Option<&'p Pattern> {
    let mut assignment = assignment.clone();
    assignment.insert(u("VEXVALID"), bucket.space.vexvalid());
    members
        .iter()
        .copied()
        .find(|pattern| pattern.constraints().matches(&assignment))
}

#[test]
fn mod3_dictionary_is_one_bit() -> anyhow::Result<()> {
    let (grammar, maps) = fixture()?;
    let config = GeneratorConfig::default();
    let model = Model::new(&grammar, &maps, &config)?;
    let (tables, report) = model.tables(&config)?;

    let mov = find(&tables, "legacy_map0_op89");
    assert_eq!(mov.dictionary().cnames(), &[u("MOD3")]);
    assert_eq!(mov.dictionary().len(), 2);
    assert_eq!(mov.function().kind(), HashKind::Linear);
    assert!(!mov.layout().validated());

    let register = mov.decode(&BTreeMap::from([(u("MOD"), 3)]));
    let memory = mov.decode(&BTreeMap::from([(u("MOD"), 1)]));
    assert_eq!(register.map(|p| p.raw()), Some("0x89 MOD[0b11] MOD=3 REG[rrr] RM[nnn]"));
    assert!(memory.map(|p| p.raw().contains("MOD!=3")).unwrap_or(false));

    assert!(report.compression.mod3 >= 3);
    Ok(())
}

#[test]
fn incomplete_opcode_fills_eight_buckets() -> anyhow::Result<()> {
    let (grammar, maps) = fixture()?;
    let config = GeneratorConfig::default();
    let model = Model::new(&grammar, &maps, &config)?;

    let push = model
        .patterns()
        .iter()
        .filter(|p| p.iclass().as_str() == "PUSH")
        .collect::<Vec<_>>();

    assert_eq!(push.len(), 8);
    assert_eq!(
        push.iter().map(|p| p.opcode()).collect::<BTreeSet<_>>(),
        (0x50..=0x57).collect::<BTreeSet<u8>>()
    );
    assert!(push.iter().all(|p| p.actions() == push[0].actions()));

    let (tables, _) = model.tables(&config)?;
    for opcode in 0x50..=0x57u8 {
        let table = find(&tables, &format!("legacy_map0_op{opcode:02x}"));
        assert_eq!(table.function().kind(), HashKind::Trivial);
        assert_eq!(table.entries()[0].pattern().opcode(), opcode);
    }
    Ok(())
}

#[test]
fn conflicting_rules_name_both() -> anyhow::Result<()> {
    let grammar = Grammar::from_str(
        "
INSTRUCTIONS()::
{
ICLASS  : NOP
PATTERN : 0x90 MOD[0b11] MOD=3
}
{
ICLASS  : PAUSE
PATTERN : 0x90 MOD=3 REG[rrr]
}
",
    )?;
    let maps = MapTable::x86()?;

    match from_grammar(&grammar, &maps, &GeneratorConfig::default()) {
        Err(BuilderError::Conflict {
            bucket,
            first,
            second,
            ..
        }) => {
            assert_eq!(bucket.opcode, 0x90);
            assert!(first.contains("NOP"));
            assert!(second.contains("PAUSE"));
        }
        other => panic!("expected a conflict, got {:?}", other.map(|(_, r)| r)),
    }
    Ok(())
}

#[test]
fn sparse_keys_fall_back_to_two_levels() -> anyhow::Result<()> {
    env_logger::try_init().ok();

    let mut input = String::from("INSTRUCTIONS()::\n");
    for i in 0..300u32 {
        input.push_str(&format!(
            "{{\nICLASS : OP{i}\nPATTERN : 0xC7 SPARSE={}\n}}\n",
            i * 7 + 3
        ));
    }

    let grammar = Grammar::from_str(&input)?;
    let maps = MapTable::x86()?;
    let config = GeneratorConfig {
        search: SearchConfig {
            min_load_factor: 1.01,
            ..Default::default()
        },
        ..Default::default()
    };

    let model = Model::new(&grammar, &maps, &config)?;
    let (tables, report) = model.tables(&config)?;
    let table = find(&tables, "legacy_map0_opc7");

    assert_eq!(table.function().kind(), HashKind::TwoLevel);
    assert!(table.max_bucket_load() <= 8);
    assert_eq!(report.two_level(), 1);
    assert_eq!(table.entries().len(), 300);

    for i in 0..300u32 {
        let hit = table.decode(&BTreeMap::from([(u("SPARSE"), i * 7 + 3)]));
        assert_eq!(hit.map(|p| p.iclass().as_str().to_owned()), Some(format!("OP{i}")));

        let miss = table.decode(&BTreeMap::from([(u("SPARSE"), i * 7 + 4)]));
        assert!(miss.is_none());
    }
    Ok(())
}

#[test]
fn lookup_matches_linear_scan() -> anyhow::Result<()> {
    let (grammar, maps) = fixture()?;
    let config = GeneratorConfig::default();
    let model = Model::new(&grammar, &maps, &config)?;
    let (tables, _) = model.tables(&config)?;
    let buckets = partition(model.patterns());

    for table in tables.iter() {
        let members = &buckets[&table.bucket()];
        for assignment in assignments(model.space(), &table.dictionary().sources()) {
            assert_eq!(
                table.decode(&assignment).map(Pattern::id),
                scan(table.bucket(), members, &assignment).map(Pattern::id),
                "{} at {assignment:?}",
                table.bucket()
            );
        }
    }
    Ok(())
}

#[test]
fn folds_preserve_decoding() -> anyhow::Result<()> {
    let (grammar, maps) = fixture()?;
    let folded_config = GeneratorConfig::default();
    let plain_config = GeneratorConfig {
        folds: FoldConfig::none(),
        ..Default::default()
    };

    let model = Model::new(&grammar, &maps, &folded_config)?;
    let (folded, report) = model.tables(&folded_config)?;
    let (plain, plain_report) = model.tables(&plain_config)?;

    assert!(report.compression.total() > 0);
    assert_eq!(plain_report.compression.total(), 0);
    assert!(report.compression.vexdest_ones >= 1);
    assert!(report.compression.fixed_rm >= 1);

    for (folded, plain) in folded.iter().zip(plain.iter()) {
        assert_eq!(folded.bucket(), plain.bucket());
        assert!(folded.dictionary().key_bits() <= plain.dictionary().key_bits());

        let names = folded
            .dictionary()
            .sources()
            .union(&plain.dictionary().sources())
            .copied()
            .collect();

        for assignment in assignments(model.space(), &names) {
            assert_eq!(
                folded.decode(&assignment).map(Pattern::id),
                plain.decode(&assignment).map(Pattern::id),
                "{} at {assignment:?}",
                folded.bucket()
            );
        }
    }
    Ok(())
}

#[test]
fn generation_is_deterministic() -> anyhow::Result<()> {
    env_logger::try_init().ok();
    let config = GeneratorConfig::default();

    let first = build_with(data("grammar.txt"), data("maps.txt"), &config)?;
    let second = build_with(data("grammar.txt"), data("maps.txt"), &config)?;

    assert_eq!(first.source, second.source);
    assert_eq!(first.report, second.report);
    Ok(())
}

#[test]
fn generated_source_parses() -> anyhow::Result<()> {
    env_logger::try_init().ok();
    let output = build_with(data("grammar.txt"), data("maps.txt"), &GeneratorConfig::default())?;

    let file = syn::parse_file(&output.source)?;
    assert!(!file.items.is_empty());

    for name in [
        "pub enum Operand",
        "pub enum Nonterminal",
        "pub struct RowLegacyMap0Op89",
        "pub static TABLE_LEGACY_MAP0_OP89",
        "pub fn lookup_vex_map1_op77",
        "pub fn key_legacy_map1_opff",
        "::dectab_tables::runtime::DispatchTable::Direct",
        "EmitChunk::Field",
        "pub ntluf: &'static [Nonterminal]",
        "pub key: u64",
    ] {
        assert!(output.source.contains(name), "missing `{name}`");
    }

    let yaml = output.report.to_yaml()?;
    assert!(yaml.contains("hash_kinds"));
    assert_eq!(output.report.buckets.len(), 14);
    Ok(())
}

#[test]
fn narrow_packing_word_is_rejected() -> anyhow::Result<()> {
    let (grammar, maps) = fixture()?;
    let config = GeneratorConfig {
        packing_bits: 2,
        ..Default::default()
    };

    assert!(matches!(
        from_grammar(&grammar, &maps, &config),
        Err(BuilderError::PackingOverflow { limit: 2, .. })
    ));
    Ok(())
}
