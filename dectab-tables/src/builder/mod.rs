use std::path::Path;

use dectab_ir::{build_patterns, Grammar, MapTable, Pattern, StateSpace};
use dectab_phash::Synthesizer;
use prettyplease::unparse;
use proc_macro2::TokenStream;
use quote::ToTokens;
use thiserror::Error;

pub mod bucket;
pub mod cdict;
pub mod compress;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod report;
pub mod types;

pub use self::bucket::{partition, BucketKey};
pub use self::cdict::{ConstraintDictionary, DictionaryEntry};
pub use self::compress::{
    compress, BucketSpace, CompressedBucket, CompressedPattern, CompressionStats, Derivation,
    Fold, SyntheticToken,
};
pub use self::config::{
    ConfigError, FoldConfig, GeneratorConfig, DEFAULT_PACKING_BITS, MAX_PACKING_BITS,
};
pub use self::core::TableGenerator;
pub use self::dispatch::{BindingKind, HashedEntry, HashedTable, RowLayout};
pub use self::error::BuilderError;
pub use self::report::{BucketReport, BuildReport};

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("cannot load configuration: {0}")]
    Config(ConfigError),
    #[error("cannot format generated tables: {0:#?}")]
    Format(anyhow::Error),
    #[error("cannot generate tables: {0}")]
    Generate(BuilderError),
    #[error("cannot load grammar: {0}")]
    Grammar(anyhow::Error),
    #[error("cannot load map descriptions: {0}")]
    Maps(anyhow::Error),
}

/// The collected state space and the patterns built against it.
#[derive(Debug, Clone)]
pub struct Model {
    space: StateSpace,
    patterns: Vec<Pattern>,
}

impl Model {
    pub fn new(
        grammar: &Grammar,
        maps: &MapTable,
        config: &GeneratorConfig,
    ) -> Result<Self, BuilderError> {
        let space = StateSpace::collect(grammar, &config.token_widths)?;
        let patterns = build_patterns(grammar, maps, &space)?;
        Ok(Self { space, patterns })
    }

    pub fn space(&self) -> &StateSpace {
        &self.space
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Compress, unify and hash every bucket, in bucket order.
    pub fn tables(
        &self,
        config: &GeneratorConfig,
    ) -> Result<(Vec<HashedTable<'_>>, BuildReport), BuilderError> {
        let synthesizer = Synthesizer::new(config.search.clone());
        let mut report = BuildReport::default();
        let mut tables = Vec::new();

        for (bucket, members) in partition(&self.patterns) {
            let compressed = compress(&members, &self.space, &config.folds);
            let dictionary =
                ConstraintDictionary::build(bucket, &compressed, &self.space, config.packing_bits)?;
            let table = HashedTable::build(dictionary, &synthesizer)?;

            report.push(
                BucketReport::of(&table, members.len(), compressed.folds()),
                compressed.stats(),
            );
            tables.push(table);
        }

        Ok((tables, report))
    }
}

pub fn from_grammar(
    grammar: &Grammar,
    maps: &MapTable,
    config: &GeneratorConfig,
) -> Result<(TokenStream, BuildReport), BuilderError> {
    let model = Model::new(grammar, maps, config)?;
    let (tables, report) = model.tables(config)?;
    let tokens = TableGenerator::new(&tables).map(ToTokens::into_token_stream)?;

    log::info!(
        "generated {} tables ({} two-level) for {} patterns, {} entries, {} folds",
        report.buckets.len(),
        report.two_level(),
        report.patterns,
        report.entries,
        report.compression.total(),
    );

    Ok((tokens, report))
}

/// Generated source and the decisions behind it.
#[derive(Debug, Clone)]
pub struct Output {
    pub source: String,
    pub report: BuildReport,
}

pub fn build(grammar: impl AsRef<Path>, maps: impl AsRef<Path>) -> Result<Output, CodegenError> {
    build_with(grammar, maps, &GeneratorConfig::default())
}

pub fn build_with(
    grammar: impl AsRef<Path>,
    maps: impl AsRef<Path>,
    config: &GeneratorConfig,
) -> Result<Output, CodegenError> {
    let grammar =
        Grammar::from_file(grammar.as_ref()).map_err(|e| CodegenError::Grammar(e.into()))?;
    let maps = MapTable::from_file(maps.as_ref()).map_err(|e| CodegenError::Maps(e.into()))?;

    let (tokens, report) =
        from_grammar(&grammar, &maps, config).map_err(CodegenError::Generate)?;
    let output = tokens.to_string();

    let source = if config.pretty {
        unparse(&syn::parse_file(&output).map_err(|e| CodegenError::Format(e.into()))?)
    } else {
        output
    };

    Ok(Output { source, report })
}

/// [`build_with`] reading the configuration from a YAML file.
pub fn build_from_config(
    grammar: impl AsRef<Path>,
    maps: impl AsRef<Path>,
    config: impl AsRef<Path>,
) -> Result<Output, CodegenError> {
    let config = GeneratorConfig::from_file(config).map_err(CodegenError::Config)?;
    build_with(grammar, maps, &config)
}
