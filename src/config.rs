use crate::{error::LensError, relationship::DEFAULT_DOMAIN_ROOT_DEPTH};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fs::read_to_string,
    path::Path,
};

/// Annotation keys extracted for every field, on top of any registered keys.
pub const BASELINE_ANNOTATION_KEYS: &[&str] = &[
    "json",
    "yaml",
    "toml",
    "xml",
    "db",
    "validate",
    "default",
    "description",
    "example",
];

pub static BASELINE_KEYS: Lazy<BTreeSet<String>> = Lazy::new(|| {
    BASELINE_ANNOTATION_KEYS
        .iter()
        .map(|k| k.to_string())
        .collect()
});

/// Lens-wide settings, fixed for the lifetime of a [`Lens`](crate::Lens) unless changed through
/// its admin handle before sealing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LensConfig {
    /// Abort extraction on policy violations instead of downgrading them to warnings.
    pub strict: bool,
    /// Number of leading domain segments two types must share to be traversed by a scan.
    pub domain_root_depth: usize,
    /// Annotation keys registered up front, in addition to the baseline keys.
    pub annotation_keys: Vec<String>,
}

impl Default for LensConfig {
    fn default() -> Self {
        LensConfig {
            strict: false,
            domain_root_depth: DEFAULT_DOMAIN_ROOT_DEPTH,
            annotation_keys: Vec::new(),
        }
    }
}

impl LensConfig {
    pub fn from_toml_str(content: &str) -> Result<LensConfig, LensError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<LensConfig, LensError> {
        tracing::debug!("Reading lens configuration from: {:?}", path.as_ref());
        let content = read_to_string(path)?;
        LensConfig::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let config = LensConfig::from_toml_str("strict = true\n").unwrap();
        assert!(config.strict);
        assert_eq!(config.domain_root_depth, DEFAULT_DOMAIN_ROOT_DEPTH);
        assert!(config.annotation_keys.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = LensConfig::from_toml_str(
            r#"
strict = false
domain_root_depth = 2
annotation_keys = ["custom", "graphql"]
"#,
        )
        .unwrap();
        assert_eq!(config.domain_root_depth, 2);
        assert_eq!(config.annotation_keys, vec!["custom", "graphql"]);
    }

    #[test]
    fn test_invalid_config() {
        let err = LensConfig::from_toml_str("strict = \"yes\"").unwrap_err();
        assert!(matches!(err, LensError::Serialization(_)));
    }
}
