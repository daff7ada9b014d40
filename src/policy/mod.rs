//! Declarative policies that validate and enrich extracted metadata.
//!
//! A [`Policy`] is a named bundle of [`TypePolicy`] entries. Each entry is selected by a
//! [`TypePattern`] over the type name and can:
//!
//! - assign a classification label (last matching entry wins)
//! - declare supported serialization codecs
//! - `ensure` that fields exist with an exact declared type
//! - run [`FieldPolicy`] bundles against matching fields (`require` / `apply` / `forbid` tags)
//! - run [`Rule`]s whose [`When`] condition selects fields to `require` / `forbid` tags on
//!
//! Policies are plain data. They are usually written as YAML (see [`document`]) and evaluated by
//! the immutable [`PolicyEngine`] snapshot that the lens builds when its configuration is sealed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::error::LensError;

pub mod document;
pub mod engine;
pub mod pattern;

pub use engine::PolicyEngine;
pub use pattern::{Glob, StringMatch, TypePattern, ANY_VALUE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub types: Vec<TypePolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypePolicy {
    #[serde(rename = "match")]
    pub pattern: TypePattern,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codecs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ensure: Vec<RequiredField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldPolicy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
}

/// A field that must exist on every matching type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredField {
    pub name: String,
    /// Exact declared type, e.g. `String` or `Option<Box<Profile>>`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

/// Tag bundle applied to fields whose name matches `pattern`.
///
/// `require` values may be [`ANY_VALUE`] to only demand presence. `apply` values may contain
/// the `{snake}`, `{lower}` and `{upper}` tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPolicy {
    #[serde(rename = "match")]
    pub pattern: Glob,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub require: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub apply: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forbid: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    /// Absent means the rule applies to every field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<When>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub require: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forbid: Vec<String>,
}

/// Boolean condition over a field and its owning type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum When {
    All(Vec<When>),
    Any(Vec<When>),
    Not(Box<When>),
    FieldName(StringMatch),
    FieldType(StringMatch),
    TypeName(StringMatch),
    HasTag(String),
    TagValue { tag: String, value: StringMatch },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum PolicyViolation {
    #[error("[{source_name}] required field '{field}' is missing")]
    MissingField { source_name: String, field: String },
    #[error("[{source_name}] field '{field}' has type '{found}', expected '{expected}'")]
    FieldTypeMismatch {
        source_name: String,
        field: String,
        expected: String,
        found: String,
    },
    #[error("[{source_name}] field '{field}' is missing required tag '{tag}'")]
    MissingTag {
        source_name: String,
        field: String,
        tag: String,
    },
    #[error("[{source_name}] field '{field}' tag '{tag}' is '{found}', expected '{expected}'")]
    TagMismatch {
        source_name: String,
        field: String,
        tag: String,
        expected: String,
        found: String,
    },
    #[error("[{source_name}] field '{field}' carries forbidden tag '{tag}'")]
    ForbiddenTag {
        source_name: String,
        field: String,
        tag: String,
    },
}

impl PolicyViolation {
    pub fn field(&self) -> &str {
        match self {
            PolicyViolation::MissingField { field, .. }
            | PolicyViolation::FieldTypeMismatch { field, .. }
            | PolicyViolation::MissingTag { field, .. }
            | PolicyViolation::TagMismatch { field, .. }
            | PolicyViolation::ForbiddenTag { field, .. } => field,
        }
    }
}

impl Policy {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Policy {
            name: name.into(),
            description: None,
            types: Vec::new(),
        }
    }

    pub fn with_type(mut self, type_policy: TypePolicy) -> Self {
        self.types.push(type_policy);
        self
    }

    /// Structural validation, run on every document load and every admin mutation.
    pub fn validate(&self) -> Result<(), LensError> {
        if self.name.trim().is_empty() {
            return Err(LensError::InvalidDocument(
                "policy is missing a name".to_string(),
            ));
        }
        if self.types.is_empty() {
            return Err(LensError::InvalidDocument(format!(
                "policy '{}' declares no type policies",
                self.name
            )));
        }
        for (idx, type_policy) in self.types.iter().enumerate() {
            type_policy.validate(&self.name, idx)?;
        }
        Ok(())
    }
}

impl TypePolicy {
    pub fn new(pattern: &str) -> Self {
        TypePolicy {
            pattern: TypePattern::parse(pattern),
            classification: None,
            codecs: Vec::new(),
            ensure: Vec::new(),
            fields: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn classify<S: Into<String>>(mut self, label: S) -> Self {
        self.classification = Some(label.into());
        self
    }

    pub fn codec<S: Into<String>>(mut self, codec: S) -> Self {
        self.codecs.push(codec.into());
        self
    }

    pub fn ensure<S: Into<String>>(mut self, name: S, type_name: Option<&str>) -> Self {
        self.ensure.push(RequiredField {
            name: name.into(),
            type_name: type_name.map(str::to_string),
        });
        self
    }

    pub fn field(mut self, field_policy: FieldPolicy) -> Self {
        self.fields.push(field_policy);
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    fn validate(&self, policy: &str, idx: usize) -> Result<(), LensError> {
        if self.pattern.is_empty() {
            return Err(LensError::InvalidDocument(format!(
                "policy '{policy}' type entry {idx} is missing a match pattern"
            )));
        }
        for (field_idx, field_policy) in self.fields.iter().enumerate() {
            if field_policy.pattern.is_empty() {
                return Err(LensError::InvalidDocument(format!(
                    "policy '{policy}' type '{}' field entry {field_idx} is missing a match pattern",
                    self.pattern.as_pattern()
                )));
            }
            if field_policy.require.is_empty()
                && field_policy.apply.is_empty()
                && field_policy.forbid.is_empty()
            {
                return Err(LensError::InvalidDocument(format!(
                    "policy '{policy}' field policy '{}' has no require, apply or forbid actions",
                    field_policy.pattern
                )));
            }
        }
        for rule in self.rules.iter() {
            if rule.name.trim().is_empty() {
                return Err(LensError::InvalidDocument(format!(
                    "policy '{policy}' type '{}' has a rule without a name",
                    self.pattern.as_pattern()
                )));
            }
            if rule.require.is_empty() && rule.forbid.is_empty() {
                return Err(LensError::InvalidDocument(format!(
                    "policy '{policy}' rule '{}' has no require or forbid actions",
                    rule.name
                )));
            }
        }
        Ok(())
    }
}

impl FieldPolicy {
    pub fn new(pattern: &str) -> Result<Self, LensError> {
        Ok(FieldPolicy {
            pattern: Glob::new(pattern)?,
            require: BTreeMap::new(),
            apply: BTreeMap::new(),
            forbid: Vec::new(),
        })
    }

    pub fn require<K: Into<String>, V: Into<String>>(mut self, tag: K, value: V) -> Self {
        self.require.insert(tag.into(), value.into());
        self
    }

    pub fn apply<K: Into<String>, V: Into<String>>(mut self, tag: K, value: V) -> Self {
        self.apply.insert(tag.into(), value.into());
        self
    }

    pub fn forbid<S: Into<String>>(mut self, tag: S) -> Self {
        self.forbid.push(tag.into());
        self
    }
}

impl Rule {
    pub fn new<S: Into<String>>(name: S, when: Option<When>) -> Self {
        Rule {
            name: name.into(),
            when,
            require: BTreeMap::new(),
            forbid: Vec::new(),
        }
    }

    pub fn require<K: Into<String>, V: Into<String>>(mut self, tag: K, value: V) -> Self {
        self.require.insert(tag.into(), value.into());
        self
    }

    pub fn forbid<S: Into<String>>(mut self, tag: S) -> Self {
        self.forbid.push(tag.into());
        self
    }
}
