use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use dectab_phash::SearchConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ustr::Ustr;

pub const DEFAULT_PACKING_BITS: u8 = 32;
pub const MAX_PACKING_BITS: u8 = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot parse configuration: {0}")]
    Parse(serde_yaml::Error),
    #[error("cannot parse configuration from `{0}`: {1}")]
    ParseFile(PathBuf, serde_yaml::Error),
    #[error("cannot read configuration from `{0}`: {1}")]
    ReadFile(PathBuf, io::Error),
    #[error("packing word of {0} bits is outside 1..=64")]
    PackingBits(u8),
    #[error("explicit width {width} of `{token}` is outside 1..=32")]
    TokenWidth { token: Ustr, width: u8 },
}

/// Per-bucket compression heuristics; each can be switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoldConfig {
    pub mod3: bool,
    pub vexdest: bool,
    pub fixed_rm: bool,
    pub mask_zero: bool,
}

impl Default for FoldConfig {
    fn default() -> Self {
        Self {
            mod3: true,
            vexdest: true,
            fixed_rm: true,
            mask_zero: true,
        }
    }
}

impl FoldConfig {
    pub fn none() -> Self {
        Self {
            mod3: false,
            vexdest: false,
            fixed_rm: false,
            mask_zero: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Width of the integer each bucket's tuples are packed into.
    pub packing_bits: u8,
    /// Explicit operand-decider widths; others are derived from their
    /// largest legal value.
    pub token_widths: BTreeMap<Ustr, u8>,
    pub folds: FoldConfig,
    pub search: SearchConfig,
    pub pretty: bool,
    /// Where to write the YAML build report, if anywhere.
    pub report: Option<PathBuf>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        let token_widths = [
            ("MOD", 2),
            ("REG", 3),
            ("RM", 3),
            ("SRM", 3),
            ("VEXDEST210", 3),
            ("VEXDEST3", 1),
            ("VEXDEST4", 1),
            ("MASK", 3),
            ("VEXVALID", 2),
            ("VL", 2),
            ("REXW", 1),
            ("REXB", 1),
            ("REXR", 1),
            ("REXX", 1),
        ]
        .into_iter()
        .map(|(name, width)| (Ustr::from(name), width))
        .collect();

        Self {
            packing_bits: DEFAULT_PACKING_BITS,
            token_widths,
            folds: FoldConfig::default(),
            search: SearchConfig::default(),
            pretty: true,
            report: None,
        }
    }
}

impl GeneratorConfig {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(input: impl AsRef<str>) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(input.as_ref()).map_err(ConfigError::Parse)?;
        config.validate()
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_reader(reader).map_err(ConfigError::Parse)?;
        config.validate()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = BufReader::new(
            File::open(path).map_err(|e| ConfigError::ReadFile(path.to_owned(), e))?,
        );
        let config: Self = serde_yaml::from_reader(file)
            .map_err(|e| ConfigError::ParseFile(path.to_owned(), e))?;
        config.validate()
    }

    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.packing_bits == 0 || self.packing_bits > MAX_PACKING_BITS {
            return Err(ConfigError::PackingBits(self.packing_bits));
        }

        if let Some((token, width)) = self
            .token_widths
            .iter()
            .find(|(_, width)| **width == 0 || **width > 32)
        {
            return Err(ConfigError::TokenWidth {
                token: *token,
                width: *width,
            });
        }

        Ok(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() -> Result<(), ConfigError> {
        let config = GeneratorConfig::from_str(
            "
packing_bits: 48
folds:
  fixed_rm: false
search:
  max_bucket_size: 4
token_widths:
  EOSZ: 2
",
        )?;

        assert_eq!(config.packing_bits, 48);
        assert!(config.folds.mod3 && !config.folds.fixed_rm);
        assert_eq!(config.search.max_bucket_size, 4);
        assert_eq!(config.search.growth_steps, 10);
        assert_eq!(config.token_widths.get(&Ustr::from("EOSZ")), Some(&2));
        Ok(())
    }

    #[test]
    fn packing_word_is_bounded() {
        assert!(matches!(
            GeneratorConfig::from_str("packing_bits: 65"),
            Err(ConfigError::PackingBits(65))
        ));
        assert!(matches!(
            GeneratorConfig::from_str("token_widths: { RM: 0 }"),
            Err(ConfigError::TokenWidth { width: 0, .. })
        ));
    }

    #[test]
    fn defaults_are_valid() {
        let config = GeneratorConfig::default().validate().unwrap();
        assert_eq!(config.packing_bits, DEFAULT_PACKING_BITS);
        assert_eq!(config.token_widths.get(&Ustr::from("MOD")), Some(&2));
    }
}
