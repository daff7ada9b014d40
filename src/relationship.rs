//! Relationship discovery between record types.
//!
//! Each exported field is unwrapped by at most one level (pointer, collection element or map
//! value, plus one pointer inside a collection or map) and turned into an edge when the result
//! is a record whose domain is accepted by the active [`DomainScope`].

use std::sync::Arc;

use crate::{
    descriptor::{FieldDescriptor, TypeDescriptor, TypeShape},
    metadata::{RelationKind, TypeRelationship},
};

/// The `domain_root_depth` used when none is configured.
pub const DEFAULT_DOMAIN_ROOT_DEPTH: usize = 3;

/// Which target domains a traversal accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainScope {
    /// Target must be declared in exactly the source's domain. Used by single-type inspection.
    Exact,
    /// Target must share the first `depth` domain segments with the source. Used by scans.
    /// A depth of zero accepts every domain.
    SharedRoot { depth: usize },
}

impl DomainScope {
    pub fn accepts(&self, source_domain: &str, target_domain: &str) -> bool {
        match self {
            DomainScope::Exact => source_domain == target_domain,
            DomainScope::SharedRoot { depth } => {
                domain_root(source_domain, *depth) == domain_root(target_domain, *depth)
            }
        }
    }
}

/// Truncates a domain path to its first `depth` segments. Both `/` and `::` separate segments,
/// so `github.com/acme/shop/models` and `acme::shop::models::user` are handled alike.
pub fn domain_root(domain: &str, depth: usize) -> &str {
    if depth == 0 {
        return "";
    }
    let bytes = domain.as_bytes();
    let mut segments = 0;
    let mut idx = 0;
    while idx < bytes.len() {
        let sep_len = if bytes[idx] == b'/' {
            1
        } else if bytes[idx] == b':' && bytes.get(idx + 1) == Some(&b':') {
            2
        } else {
            0
        };
        if sep_len > 0 {
            segments += 1;
            if segments == depth {
                return &domain[..idx];
            }
            idx += sep_len;
        } else {
            idx += 1;
        }
    }
    domain
}

/// An edge together with the resolved target, so scans can keep walking.
#[derive(Debug, Clone)]
pub struct DiscoveredEdge {
    pub relationship: TypeRelationship,
    pub target: Arc<TypeDescriptor>,
}

/// Finds all in-scope edges leaving `source`, in field declaration order.
pub fn discover(source: &TypeDescriptor, scope: DomainScope) -> Vec<DiscoveredEdge> {
    let mut edges = Vec::new();
    for field in source.fields.iter().filter(|f| f.exported) {
        let Some((kind, target)) = classify_field(field) else {
            continue;
        };
        if !scope.accepts(&source.domain, &target.domain) {
            tracing::trace!(
                "[relationship::discover] {}.{} -> {} is outside {:?}",
                source.name,
                field.name,
                target.qualified_name(),
                scope
            );
            continue;
        }
        edges.push(DiscoveredEdge {
            relationship: TypeRelationship {
                from: source.name.clone(),
                to: target.name.clone(),
                field: field.name.clone(),
                kind,
                to_domain: target.domain.clone(),
                to_qualified_name: target.qualified_name(),
            },
            target,
        });
    }
    edges
}

fn record_or_pointer_to_record(descriptor: Arc<TypeDescriptor>) -> Option<Arc<TypeDescriptor>> {
    match &descriptor.shape {
        TypeShape::Record => Some(descriptor),
        TypeShape::Pointer(elem) => {
            let elem = elem.resolve();
            elem.is_record().then_some(elem)
        }
        _ => None,
    }
}

fn classify_field(field: &FieldDescriptor) -> Option<(RelationKind, Arc<TypeDescriptor>)> {
    let ty = field.ty.resolve();
    if field.embedded {
        return record_or_pointer_to_record(ty).map(|t| (RelationKind::Embedding, t));
    }
    match &ty.shape {
        TypeShape::Record | TypeShape::Pointer(_) => {
            record_or_pointer_to_record(ty).map(|t| (RelationKind::Reference, t))
        }
        TypeShape::Collection(elem) => {
            record_or_pointer_to_record(elem.resolve()).map(|t| (RelationKind::Collection, t))
        }
        TypeShape::Map { value, .. } => {
            record_or_pointer_to_record(value.resolve()).map(|t| (RelationKind::Map, t))
        }
        TypeShape::Scalar | TypeShape::Interface => None,
    }
}
