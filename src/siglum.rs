//! Witness siglum canonicalization.
//!
//! Raw sigla such as `424*` (first hand) or `424T` (main text) are reduced to a
//! base witness identity by stripping configured subwitness suffixes. Suffixes
//! that are not configured (corrector or marginal markers, say) are kept, so
//! those sigla remain distinct witnesses.

use std::collections::BTreeMap;

/// Canonical form of one raw siglum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSiglum {
    pub canonical: String,
    /// Suffixes removed, outermost first. Empty when the raw siglum was canonical.
    pub stripped: Vec<String>,
}

impl NormalizedSiglum {
    /// The outermost matched suffix, if any.
    pub fn suffix(&self) -> Option<&str> {
        self.stripped.first().map(String::as_str)
    }
}

/// Strips configured trivial suffixes from raw witness sigla.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiglumNormalizer {
    /// Longest first; ties broken lexicographically so matching is deterministic.
    suffixes: Vec<String>,
}

impl SiglumNormalizer {
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut suffixes: Vec<String> = suffixes
            .into_iter()
            .map(Into::into)
            .filter(|s| !s.is_empty())
            .collect();
        suffixes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        suffixes.dedup();
        Self { suffixes }
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    /// Strip configured suffixes until none matches.
    ///
    /// A suffix is never stripped if doing so would leave an empty siglum.
    pub fn normalize(&self, raw: &str) -> NormalizedSiglum {
        let mut base = raw;
        let mut stripped = Vec::new();
        while let Some(suffix) = self
            .suffixes
            .iter()
            .find(|s| base.len() > s.len() && base.ends_with(s.as_str()))
        {
            base = &base[..base.len() - suffix.len()];
            stripped.push(suffix.clone());
        }
        NormalizedSiglum {
            canonical: base.to_string(),
            stripped,
        }
    }

    pub fn canonical(&self, raw: &str) -> String {
        self.normalize(raw).canonical
    }
}

/// Raw siglum → canonical witness lookup, kept for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiglumTable {
    canonical_by_raw: BTreeMap<String, String>,
}

impl SiglumTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, raw: impl Into<String>, canonical: impl Into<String>) {
        self.canonical_by_raw.insert(raw.into(), canonical.into());
    }

    /// Every raw siglum seen for a canonical witness, in sorted order.
    pub fn aliases_of(&self, canonical: &str) -> Vec<&str> {
        self.canonical_by_raw
            .iter()
            .filter(|(_, c)| c.as_str() == canonical)
            .map(|(raw, _)| raw.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_suffixes_collapse_to_base_witness() {
        let normalizer = SiglumNormalizer::new(["*", "T"]);
        assert_eq!(normalizer.canonical("424*"), "424");
        assert_eq!(normalizer.canonical("424T"), "424");
        assert_eq!(normalizer.normalize("424T").suffix(), Some("T"));
    }

    #[test]
    fn canonical_sigla_are_fixed_points() {
        let normalizer = SiglumNormalizer::new(["*", "T", "C1", "/1"]);
        for raw in ["01", "424*", "1739T", "2344C1", "P74", "33/1"] {
            let once = normalizer.canonical(raw);
            let twice = normalizer.normalize(&once);
            assert_eq!(twice.canonical, once);
            assert!(twice.stripped.is_empty());
        }
    }

    #[test]
    fn unconfigured_suffixes_stay_distinct() {
        let normalizer = SiglumNormalizer::new(["*"]);
        let corrected = normalizer.normalize("424C");
        assert_eq!(corrected.canonical, "424C");
        assert_eq!(corrected.suffix(), None);
        assert_ne!(normalizer.canonical("424C"), normalizer.canonical("424*"));
    }

    #[test]
    fn longest_suffix_wins_and_stripping_repeats() {
        let normalizer = SiglumNormalizer::new(["1", "C1", "*"]);
        let n = normalizer.normalize("424*C1");
        assert_eq!(n.canonical, "424");
        assert_eq!(n.stripped, vec!["C1".to_string(), "*".to_string()]);
    }

    #[test]
    fn never_strips_to_empty() {
        let normalizer = SiglumNormalizer::new(["T"]);
        assert_eq!(normalizer.canonical("T"), "T");
    }

    #[test]
    fn empty_and_duplicate_suffixes_are_dropped() {
        let normalizer = SiglumNormalizer::new(["", "T", "T", "*"]);
        assert_eq!(normalizer.suffixes(), &["*".to_string(), "T".to_string()]);
    }

    #[test]
    fn table_tracks_raw_to_canonical() {
        let normalizer = SiglumNormalizer::new(["*", "T"]);
        let mut table = SiglumTable::new();
        for raw in ["424T", "01", "424*", "424T"] {
            table.record(raw, normalizer.canonical(raw));
        }
        assert_eq!(table.aliases_of("424"), vec!["424*", "424T"]);
        assert_eq!(table.aliases_of("01"), vec!["01"]);
        assert!(table.aliases_of("424*").is_empty());
    }
}
