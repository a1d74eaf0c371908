//! Run configuration, loadable from JSON or TOML.
//!
//! Every field has a default so a config file only needs the fields it
//! changes. CLI flags are applied on top of the loaded value.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CollationError;
use crate::nmf::NmfConfig;
use crate::rules::ClassificationRules;
use crate::siglum::SiglumNormalizer;

pub const DEFAULT_MIN_EXTANT_PROPORTION: f64 = 0.95;

fn default_min_extant_proportion() -> f64 {
    DEFAULT_MIN_EXTANT_PROPORTION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollationConfig {
    /// Reading types that contribute nothing (e.g. `lac`, `overlap`).
    pub ignore_types: Vec<String>,
    /// Reading types folded into the preceding substantive reading.
    pub trivial_types: Vec<String>,
    /// Reading types treated as ambiguous whatever their identifier.
    pub ambiguous_types: Vec<String>,
    /// Identifier prefix of ambiguous readings (e.g. `zw-`). Empty disables it.
    pub ambiguous_prefix: String,
    /// Subwitness suffixes stripped from sigla (e.g. `*`, `T`).
    pub trivial_suffixes: Vec<String>,
    /// Share of units a witness must be extant in to count as complete.
    #[serde(default = "default_min_extant_proportion")]
    pub min_extant_proportion: f64,
    pub use_tfidf: bool,
    /// Rescale fragmentary coefficients to sum to one.
    pub normalize_fragmentary: bool,
    pub nmf: NmfConfig,
}

impl Default for CollationConfig {
    fn default() -> Self {
        Self {
            ignore_types: Vec::new(),
            trivial_types: Vec::new(),
            ambiguous_types: Vec::new(),
            ambiguous_prefix: String::new(),
            trivial_suffixes: Vec::new(),
            min_extant_proportion: DEFAULT_MIN_EXTANT_PROPORTION,
            use_tfidf: false,
            normalize_fragmentary: false,
            nmf: NmfConfig::default(),
        }
    }
}

impl CollationConfig {
    /// Load from `path`; `.toml` files are parsed as TOML, everything else as JSON.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CollationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        let config: Self = if is_toml {
            toml::from_str(&raw)?
        } else {
            serde_json::from_str(&raw)?
        };
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CollationError> {
        let p = self.min_extant_proportion;
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(CollationError::InvalidConfig(format!(
                "min_extant_proportion must lie in [0, 1], got {p}"
            )));
        }
        if self.nmf.max_iter == 0 {
            return Err(CollationError::InvalidConfig(
                "nmf.max_iter must be positive".to_string(),
            ));
        }
        if self.nmf.n_run == 0 || self.nmf.estimation_max_iter == 0 {
            return Err(CollationError::InvalidConfig(
                "nmf.n_run and nmf.estimation_max_iter must be positive".to_string(),
            ));
        }
        if !self.nmf.tolerance.is_finite() || self.nmf.tolerance < 0.0 {
            return Err(CollationError::InvalidConfig(format!(
                "nmf.tolerance must be a non-negative number, got {}",
                self.nmf.tolerance
            )));
        }
        Ok(())
    }

    pub fn rules(&self) -> ClassificationRules {
        ClassificationRules::new()
            .with_ignore_types(self.ignore_types.iter().cloned())
            .with_trivial_types(self.trivial_types.iter().cloned())
            .with_ambiguous_types(self.ambiguous_types.iter().cloned())
            .with_ambiguous_prefix(self.ambiguous_prefix.clone())
    }

    pub fn normalizer(&self) -> SiglumNormalizer {
        SiglumNormalizer::new(self.trivial_suffixes.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nmf::Init;
    use crate::rules::ReadingRole;

    #[test]
    fn defaults_match_documented_values() {
        let config = CollationConfig::default();
        assert_eq!(config.min_extant_proportion, 0.95);
        assert!(config.ambiguous_prefix.is_empty());
        assert_eq!(config.nmf.max_iter, 100);
        assert_eq!(config.nmf.n_run, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: CollationConfig =
            serde_json::from_str(r#"{"trivial_types": ["defective"], "use_tfidf": true}"#).unwrap();
        assert_eq!(config.trivial_types, vec!["defective".to_string()]);
        assert!(config.use_tfidf);
        assert_eq!(config.min_extant_proportion, 0.95);
        assert_eq!(config.nmf, NmfConfig::default());
    }

    #[test]
    fn loads_toml_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(
            &path,
            r#"
ignore_types = ["lac", "overlap"]
trivial_types = ["defective", "orthographic"]
trivial_suffixes = ["*", "T"]
min_extant_proportion = 0.9

[nmf]
init = "random_vcol"
seed = 7
"#,
        )
        .unwrap();

        let config = CollationConfig::from_path(&path).unwrap();
        assert_eq!(config.min_extant_proportion, 0.9);
        assert_eq!(config.nmf.init, Init::RandomVcol);
        assert_eq!(config.nmf.seed, 7);
        assert_eq!(config.nmf.max_iter, 100);

        let rules = config.rules();
        assert_eq!(rules.classify("overlap", "zz"), ReadingRole::Ignore);
        assert_eq!(rules.classify("orthographic", "ao1"), ReadingRole::Trivial);
        assert_eq!(config.normalizer().canonical("424T"), "424");
    }

    #[test]
    fn loads_json_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{"ambiguous_prefix": "zw-"}"#).unwrap();
        let config = CollationConfig::from_path(&path).unwrap();
        assert_eq!(config.ambiguous_prefix, "zw-");
        assert_eq!(config.rules().classify("", "zw-a/b"), ReadingRole::Ambiguous);
        assert_eq!(
            CollationConfig::default().rules().classify("", "zw-a/b"),
            ReadingRole::Substantive
        );
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = CollationConfig {
            min_extant_proportion: 1.2,
            ..CollationConfig::default()
        };
        assert!(matches!(config.validate(), Err(CollationError::InvalidConfig(_))));

        config.min_extant_proportion = 0.5;
        config.nmf.max_iter = 0;
        assert!(matches!(config.validate(), Err(CollationError::InvalidConfig(_))));

        config.nmf.max_iter = 10;
        config.nmf.tolerance = f64::NAN;
        assert!(config.validate().is_err());
    }
}
