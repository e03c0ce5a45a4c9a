use std::path::PathBuf;

use dectab_phash::SearchConfig;
use dectab_tables::GeneratorConfig;

/// Rules in the sparse grammar; their keys are never contiguous.
pub const SPARSE_RULES: u32 = 64;

/// The grammar and map fixtures shared with the `dectab` crate.
pub fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("dectab")
        .join("tests")
        .join("data")
}

pub fn sparse_value(rule: u32) -> u32 {
    rule * 7 + 3
}

/// One `SPARSE=v` rule per key at legacy opcode 0xC7.
pub fn sparse_grammar() -> String {
    let mut input = String::from("INSTRUCTIONS()::\n");
    for rule in 0..SPARSE_RULES {
        input.push_str(&format!(
            "{{\nICLASS : OP{rule}\nPATTERN : 0xC7 SPARSE={}\n}}\n",
            sparse_value(rule)
        ));
    }
    input
}

/// Forces the one-level search to give up so the table nests.
pub fn sparse_config() -> GeneratorConfig {
    GeneratorConfig {
        search: SearchConfig {
            min_load_factor: 1.01,
            ..Default::default()
        },
        ..Default::default()
    }
}
