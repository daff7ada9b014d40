//! Behavioral conventions: named contracts a record satisfies by exposing a method shape or by
//! implementing a trait.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::descriptor::{MethodSignature, TypeDescriptor};

/// Return-type token that stands for the receiver's own type.
pub const SELF_TOKEN: &str = "@self";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConventionCheck {
    /// A method with this name, parameter list and return list. The receiver kind is ignored,
    /// so `self` and `&self` forms both satisfy the check.
    Signature(MethodSignature),
    /// A trait the type declares it implements.
    Capability(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Convention {
    pub name: String,
    pub check: ConventionCheck,
}

impl Convention {
    pub fn signature<S: Into<String>>(name: S, method: MethodSignature) -> Self {
        Convention {
            name: name.into(),
            check: ConventionCheck::Signature(method),
        }
    }

    pub fn capability<S: Into<String>, C: Into<String>>(name: S, capability: C) -> Self {
        Convention {
            name: name.into(),
            check: ConventionCheck::Capability(capability.into()),
        }
    }

    pub fn is_satisfied_by(&self, descriptor: &TypeDescriptor) -> bool {
        match &self.check {
            ConventionCheck::Capability(capability) => {
                descriptor.capabilities.contains(capability)
            }
            ConventionCheck::Signature(expected) => descriptor
                .methods
                .iter()
                .any(|method| signature_matches(expected, method, &descriptor.name)),
        }
    }
}

fn signature_matches(expected: &MethodSignature, actual: &MethodSignature, self_name: &str) -> bool {
    expected.name == actual.name
        && expected.params.len() == actual.params.len()
        && expected.returns.len() == actual.returns.len()
        && expected
            .params
            .iter()
            .zip(actual.params.iter())
            .all(|(e, a)| type_token_matches(e, a, self_name))
        && expected
            .returns
            .iter()
            .zip(actual.returns.iter())
            .all(|(e, a)| type_token_matches(e, a, self_name))
}

fn type_token_matches(expected: &str, actual: &str, self_name: &str) -> bool {
    if expected != SELF_TOKEN {
        return expected == actual;
    }
    let actual = actual.trim();
    let inner = actual
        .strip_prefix("&mut ")
        .or_else(|| actual.strip_prefix('&'))
        .or_else(|| {
            ["Box<", "Arc<", "Rc<"]
                .iter()
                .find_map(|wrapper| actual.strip_prefix(wrapper))
                .and_then(|rest| rest.strip_suffix('>'))
        })
        .unwrap_or(actual)
        .trim();
    inner == "Self" || inner == self_name
}

static BUILTIN_CONVENTIONS: Lazy<Vec<Convention>> = Lazy::new(|| {
    vec![
        Convention::signature(
            "Cloner",
            MethodSignature::new("clone").by_ref().returns([SELF_TOKEN]),
        ),
        Convention::signature(
            "Validator",
            MethodSignature::new("validate")
                .by_ref()
                .returns(["Result<(), String>"]),
        ),
        Convention::capability("Stringer", "Display"),
    ]
});

/// Ordered set of conventions checked by the pipeline. Later registrations with the same name
/// replace earlier ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConventionRegistry {
    conventions: Vec<Convention>,
}

impl Default for ConventionRegistry {
    fn default() -> Self {
        ConventionRegistry {
            conventions: BUILTIN_CONVENTIONS.clone(),
        }
    }
}

impl ConventionRegistry {
    pub fn empty() -> Self {
        ConventionRegistry {
            conventions: Vec::new(),
        }
    }

    pub fn register(&mut self, convention: Convention) {
        if let Some(existing) = self
            .conventions
            .iter_mut()
            .find(|c| c.name == convention.name)
        {
            tracing::info!(
                "[ConventionRegistry::register] Overwriting existing convention: {}",
                convention.name
            );
            *existing = convention;
        } else {
            self.conventions.push(convention);
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.conventions.iter().map(|c| c.name.clone()).collect()
    }

    pub fn detect(&self, descriptor: &TypeDescriptor) -> BTreeSet<String> {
        self.conventions
            .iter()
            .filter(|c| c.is_satisfied_by(descriptor))
            .map(|c| c.name.clone())
            .collect()
    }
}
