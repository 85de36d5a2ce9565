use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Knobs for one `optimize` call that can be loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoderConfig {
    /// Estimated serialized size (bytes) below which the input is passed through untouched.
    pub min_size: usize,
    /// Fall back to the original input unless the final result is strictly cheaper.
    pub validate: bool,
    /// Token encoding (or model name) used by the default cost function.
    pub encoding: String,
    /// Skip dedup and schema passes for payloads smaller than `fast_threshold`.
    pub fast_mode: bool,
    pub fast_threshold: usize,
    /// Minimum canonical size (bytes) of a repeated subtree worth a registry entry.
    pub dedup_min_size: usize,
    /// Run the compacting pass after abbreviation.
    pub aggressive: bool,
    /// Let compacting rewrite booleans to 1/0. Lossy at the type level.
    pub unsafe_compacting: bool,
    /// Try the whole-payload text serializer as the last pass.
    pub final_pass: bool,
    /// One-way preprocessing applied before the pipeline.
    pub refine: Option<RefineOptions>,
}

impl Default for RecoderConfig {
    fn default() -> Self {
        Self {
            min_size: 0,
            validate: true,
            encoding: "cl100k_base".into(),
            fast_mode: false,
            fast_threshold: 4096,
            dedup_min_size: 24,
            aggressive: false,
            unsafe_compacting: false,
            final_pass: false,
            refine: None,
        }
    }
}

impl RecoderConfig {
    /// Parse a JSON configuration document; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Lossy preprocessing options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineOptions {
    /// Round numbers to this many decimal digits.
    pub precision: Option<u32>,
    /// Drop object fields holding `""`, `[]` or `{}`.
    pub prune_empty: bool,
    /// Drop object fields holding `null`.
    pub prune_null: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let cfg = RecoderConfig::from_json(r#"{"min_size": 128, "aggressive": true}"#).unwrap();
        assert_eq!(cfg.min_size, 128);
        assert!(cfg.aggressive);
        assert!(cfg.validate);
        assert_eq!(cfg.encoding, "cl100k_base");
        assert!(cfg.refine.is_none());
    }

    #[test]
    fn test_refine_section() {
        let cfg = RecoderConfig::from_json(
            r#"{"refine": {"precision": 2, "prune_null": true}}"#,
        )
        .unwrap();
        let refine = cfg.refine.unwrap();
        assert_eq!(refine.precision, Some(2));
        assert!(refine.prune_null);
        assert!(!refine.prune_empty);
    }

    #[test]
    fn test_invalid_json() {
        assert!(RecoderConfig::from_json("{not json").is_err());
    }
}
