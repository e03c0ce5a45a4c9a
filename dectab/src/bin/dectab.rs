use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use dectab::tables::{build_with, GeneratorConfig};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Instruction pattern grammar.
    grammar: PathBuf,

    /// Map descriptions, one map per line.
    maps: PathBuf,

    /// Where to write the generated tables; stdout if absent.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// YAML generator configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to write the YAML build report; overrides the configuration.
    #[arg(short, long)]
    report: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    let mut config = match args.config {
        Some(ref path) => GeneratorConfig::from_file(path)?,
        None => GeneratorConfig::default(),
    };

    if args.report.is_some() {
        config.report = args.report;
    }

    let output = build_with(&args.grammar, &args.maps, &config)?;

    match args.output {
        Some(ref path) => fs::write(path, &output.source)
            .with_context(|| format!("cannot write tables to `{}`", path.display()))?,
        None => print!("{}", output.source),
    }

    if let Some(ref path) = config.report {
        let report = output.report.to_yaml()?;
        fs::write(path, report)
            .with_context(|| format!("cannot write report to `{}`", path.display()))?;
    }

    log::info!(
        "{} buckets from `{}`",
        output.report.buckets.len(),
        args.grammar.display()
    );

    Ok(())
}
