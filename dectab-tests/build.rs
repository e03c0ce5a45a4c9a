use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use dectab_ir::{Grammar, MapTable};
use dectab_tables::{build_with, from_grammar, GeneratorConfig};

#[allow(dead_code)]
#[path = "src/grammars.rs"]
mod grammars;

fn main() -> anyhow::Result<()> {
    let out_dir = PathBuf::from(env::var_os("OUT_DIR").context("OUT_DIR is not set")?);
    let fixture = grammars::fixture_dir();

    println!("cargo:rerun-if-changed={}", fixture.display());
    println!("cargo:rerun-if-changed=src/grammars.rs");

    let output = build_with(
        fixture.join("grammar.txt"),
        fixture.join("maps.txt"),
        &GeneratorConfig::default(),
    )?;
    fs::write(out_dir.join("fixture.rs"), output.source)
        .context("cannot write fixture tables")?;

    let grammar = Grammar::from_str(&grammars::sparse_grammar())?;
    let (tokens, _) = from_grammar(&grammar, &MapTable::x86()?, &grammars::sparse_config())?;
    fs::write(out_dir.join("sparse.rs"), tokens.to_string())
        .context("cannot write sparse tables")?;

    Ok(())
}
