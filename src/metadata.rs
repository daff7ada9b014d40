//! Extracted metadata: the frozen output of the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

pub use crate::descriptor::FieldKind;
use crate::{
    descriptor::{TypeDescriptor, TypeRef},
    policy::PolicyViolation,
};

/// One exported field of a record type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMetadata {
    pub name: String,
    /// Declared type as written, e.g. `Option<Box<Profile>>`.
    pub type_name: String,
    #[serde(skip)]
    pub ty: TypeRef,
    pub kind: FieldKind,
    /// Index chain into the owning record.
    pub position: Vec<usize>,
    pub annotations: BTreeMap<String, String>,
    pub embedded: bool,
}

impl FieldMetadata {
    /// The annotation value for `key`, or the empty string when absent.
    pub fn annotation(&self, key: &str) -> &str {
        self.annotations.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn has_annotation(&self, key: &str) -> bool {
        self.annotations.contains_key(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Reference,
    Collection,
    Embedding,
    Map,
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RelationKind::Reference => "reference",
            RelationKind::Collection => "collection",
            RelationKind::Embedding => "embedding",
            RelationKind::Map => "map",
        };
        f.write_str(label)
    }
}

/// Directed edge between two record types, produced by one field of `from`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRelationship {
    pub from: String,
    pub to: String,
    pub field: String,
    pub kind: RelationKind,
    pub to_domain: String,
    /// Cache key of the target, so edges can be followed through the cache.
    pub to_qualified_name: String,
}

/// Metadata for one record type. Immutable once it reaches the cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub type_name: String,
    pub domain: String,
    pub qualified_name: String,
    pub fields: Vec<FieldMetadata>,
    pub relationships: Vec<TypeRelationship>,
    pub conventions: BTreeSet<String>,
    pub classification: Option<String>,
    pub codecs: Vec<String>,
    /// Policy violations that were downgraded because the lens is not strict.
    pub warnings: Vec<PolicyViolation>,
}

impl Metadata {
    /// An empty working copy for `descriptor`. Also used as the cycle-breaking placeholder
    /// during scans.
    pub fn empty(descriptor: &TypeDescriptor) -> Self {
        Metadata {
            type_name: descriptor.name.clone(),
            domain: descriptor.domain.clone(),
            qualified_name: descriptor.qualified_name(),
            fields: Vec::new(),
            relationships: Vec::new(),
            conventions: BTreeSet::new(),
            classification: None,
            codecs: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relationships_for(&self, field: &str) -> impl Iterator<Item = &TypeRelationship> {
        let field = field.to_string();
        self.relationships.iter().filter(move |r| r.field == field)
    }

    pub fn satisfies(&self, convention: &str) -> bool {
        self.conventions.contains(convention)
    }
}
