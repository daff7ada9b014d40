use std::io;

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

use crate::policy::PolicyViolation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum LensError {
    #[error("Unsupported type kind for '{type_name}': expected a record, found {kind}")]
    UnsupportedTypeKind { type_name: String, kind: String },
    #[error("Invalid type descriptor for '{type_name}': {reason}")]
    InvalidDescriptor { type_name: String, reason: String },
    #[error("Policy validation failed for '{type_name}': {}", join_violations(.violations))]
    PolicyViolation {
        type_name: String,
        violations: Vec<PolicyViolation>,
    },
    #[error("A configuration holder already exists for this lens")]
    ConfigurationAlreadyExists,
    #[error("Configuration is already sealed")]
    AlreadySealed,
    #[error("Configuration is not sealed")]
    NotSealed,
    #[error("Configuration is sealed; {0} is not permitted")]
    ConfigurationSealed(String),
    #[error("Invalid policy document: {0}")]
    InvalidDocument(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
}

fn join_violations(violations: &[PolicyViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<String>>()
        .join("; ")
}

impl LensError {
    /// Initialization-ordering errors. These are always surfaced, regardless of strictness.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            LensError::ConfigurationAlreadyExists
                | LensError::AlreadySealed
                | LensError::NotSealed
                | LensError::ConfigurationSealed(_)
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, LensError::PolicyViolation { .. })
    }
}

impl From<serde_yaml::Error> for LensError {
    fn from(src: serde_yaml::Error) -> LensError {
        LensError::InvalidDocument(format!("YAML deserialization error: {src}"))
    }
}

impl From<toml::de::Error> for LensError {
    fn from(src: toml::de::Error) -> LensError {
        LensError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<JsonError> for LensError {
    fn from(src: JsonError) -> LensError {
        LensError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<io::Error> for LensError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => LensError::NotFound(format!("{x}")),
            _ => LensError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<walkdir::Error> for LensError {
    fn from(x: walkdir::Error) -> Self {
        match x.io_error().map(|e| e.kind()) {
            Some(io::ErrorKind::NotFound) => LensError::NotFound(format!("{x}")),
            _ => LensError::Io(format!("Directory walk failed: {x}")),
        }
    }
}

impl From<RegexError> for LensError {
    fn from(x: RegexError) -> Self {
        LensError::InvalidDocument(format!("Regex parse failed: {x}"))
    }
}
