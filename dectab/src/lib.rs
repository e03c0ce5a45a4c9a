//! Builds perfect-hash dispatch tables for an x86 decoder from an
//! instruction-pattern grammar.

pub use dectab_ir as ir;
pub use dectab_phash as phash;
pub use dectab_tables as tables;

pub use dectab_tables::{build, build_from_config, build_with, GeneratorConfig, Output};
