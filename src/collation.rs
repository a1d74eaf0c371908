//! Parsed collation input: variation units and their readings.
//!
//! Readings are kept in the order they were listed. That order matters: it
//! decides which substantive reading absorbs a later trivial subvariant.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CollationError;

/// One attested variant at a variation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Unit-local identifier (e.g. `a`, `b`, `af1`, `zw-a/b`).
    pub id: String,
    /// Declared type tag; empty means substantive.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Attesting sigla, as written in the apparatus.
    #[serde(default)]
    pub witnesses: Vec<String>,
}

impl Reading {
    pub fn new<I, S>(id: impl Into<String>, kind: impl Into<String>, witnesses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            kind: kind.into(),
            text: None,
            witnesses: witnesses.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// A point of textual variation: an ordered set of mutually exclusive readings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationUnit {
    pub id: String,
    #[serde(default)]
    pub readings: Vec<Reading>,
}

impl VariationUnit {
    pub fn new(id: impl Into<String>, readings: Vec<Reading>) -> Self {
        Self {
            id: id.into(),
            readings,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collation {
    pub units: Vec<VariationUnit>,
}

impl Collation {
    pub fn new(units: Vec<VariationUnit>) -> Self {
        Self { units }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CollationError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CollationError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_with_optional_fields() {
        let raw = r#"{
            "units": [
                {
                    "id": "Acts.1.1/2",
                    "readings": [
                        {"id": "a", "text": "logon", "witnesses": ["01", "03"]},
                        {"id": "af1", "type": "defective", "witnesses": ["424*"]},
                        {"id": "zz", "type": "lac"}
                    ]
                }
            ]
        }"#;
        let collation = Collation::from_json_str(raw).unwrap();
        assert_eq!(collation.len(), 1);
        let unit = &collation.units[0];
        assert_eq!(unit.readings[0].kind, "");
        assert_eq!(unit.readings[0].text.as_deref(), Some("logon"));
        assert_eq!(unit.readings[1].kind, "defective");
        assert!(unit.readings[2].witnesses.is_empty());
    }

    #[test]
    fn rejects_malformed_json() {
        let err = Collation::from_json_str("{\"units\": [{\"readings\": []}]}").unwrap_err();
        assert!(matches!(err, CollationError::Json(_)));
    }
}
