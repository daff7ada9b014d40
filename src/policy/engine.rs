//! Policy evaluation against a working copy of [`Metadata`].

use std::sync::Arc;

use super::{
    pattern::{accepts_any, expand_template},
    FieldPolicy, Policy, PolicyViolation, Rule, TypePolicy, When,
};
use crate::metadata::{FieldMetadata, Metadata};

/// Immutable snapshot of the policy list, evaluated in list order.
#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    policies: Arc<[Policy]>,
}

impl PolicyEngine {
    pub fn new(policies: Vec<Policy>) -> Self {
        PolicyEngine {
            policies: policies.into(),
        }
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    /// Applies every matching type policy, in policy-list order then inner-list order, and
    /// returns the violations found. Mutations (classification, codecs, applied tags) land in
    /// `meta` even when violations are reported.
    pub fn apply(&self, meta: &mut Metadata) -> Vec<PolicyViolation> {
        let mut violations = Vec::new();
        for policy in self.policies.iter() {
            for type_policy in policy.types.iter() {
                if !type_policy.pattern.matches(&meta.type_name) {
                    continue;
                }
                tracing::debug!(
                    "[PolicyEngine::apply] {} matched '{}' from policy '{}'",
                    meta.type_name,
                    type_policy.pattern.as_pattern(),
                    policy.name
                );
                apply_type_policy(&policy.name, type_policy, meta, &mut violations);
            }
        }
        violations
    }
}

fn apply_type_policy(
    policy: &str,
    type_policy: &TypePolicy,
    meta: &mut Metadata,
    violations: &mut Vec<PolicyViolation>,
) {
    if let Some(label) = &type_policy.classification {
        meta.classification = Some(label.clone());
    }
    for codec in type_policy.codecs.iter() {
        if !meta.codecs.contains(codec) {
            meta.codecs.push(codec.clone());
        }
    }

    for required in type_policy.ensure.iter() {
        match meta.field(&required.name) {
            None => violations.push(PolicyViolation::MissingField {
                source_name: policy.to_string(),
                field: required.name.clone(),
            }),
            Some(field) => {
                if let Some(expected) = &required.type_name {
                    if &field.type_name != expected {
                        violations.push(PolicyViolation::FieldTypeMismatch {
                            source_name: policy.to_string(),
                            field: required.name.clone(),
                            expected: expected.clone(),
                            found: field.type_name.clone(),
                        });
                    }
                }
            }
        }
    }

    for field_policy in type_policy.fields.iter() {
        for field in meta.fields.iter_mut() {
            if field_policy.pattern.matches(&field.name) {
                apply_field_policy(policy, field_policy, field, violations);
            }
        }
    }

    for rule in type_policy.rules.iter() {
        let source_name = format!("{policy}/{}", rule.name);
        for field in meta.fields.iter() {
            let selected = rule
                .when
                .as_ref()
                .map_or(true, |when| evaluate(when, &meta.type_name, field));
            if selected {
                check_rule(&source_name, rule, field, violations);
            }
        }
    }
}

fn apply_field_policy(
    policy: &str,
    field_policy: &FieldPolicy,
    field: &mut FieldMetadata,
    violations: &mut Vec<PolicyViolation>,
) {
    check_required_tags(policy, &field_policy.require, field, violations);
    for (tag, template) in field_policy.apply.iter() {
        field
            .annotations
            .insert(tag.clone(), expand_template(template, &field.name));
    }
    check_forbidden_tags(policy, &field_policy.forbid, field, violations);
}

fn check_rule(
    source_name: &str,
    rule: &Rule,
    field: &FieldMetadata,
    violations: &mut Vec<PolicyViolation>,
) {
    check_required_tags(source_name, &rule.require, field, violations);
    check_forbidden_tags(source_name, &rule.forbid, field, violations);
}

fn check_required_tags<'a, I>(
    source_name: &str,
    required: I,
    field: &FieldMetadata,
    violations: &mut Vec<PolicyViolation>,
) where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    for (tag, expected) in required {
        match field.annotations.get(tag) {
            None => violations.push(PolicyViolation::MissingTag {
                source_name: source_name.to_string(),
                field: field.name.clone(),
                tag: tag.clone(),
            }),
            Some(found) if !accepts_any(expected) && found != expected => {
                violations.push(PolicyViolation::TagMismatch {
                    source_name: source_name.to_string(),
                    field: field.name.clone(),
                    tag: tag.clone(),
                    expected: expected.clone(),
                    found: found.clone(),
                })
            }
            Some(_) => {}
        }
    }
}

fn check_forbidden_tags(
    source_name: &str,
    forbidden: &[String],
    field: &FieldMetadata,
    violations: &mut Vec<PolicyViolation>,
) {
    for tag in forbidden {
        if field.has_annotation(tag) {
            violations.push(PolicyViolation::ForbiddenTag {
                source_name: source_name.to_string(),
                field: field.name.clone(),
                tag: tag.clone(),
            });
        }
    }
}

/// Evaluates a rule condition for one field of the type named `type_name`.
pub fn evaluate(when: &When, type_name: &str, field: &FieldMetadata) -> bool {
    match when {
        When::All(conditions) => conditions.iter().all(|c| evaluate(c, type_name, field)),
        When::Any(conditions) => conditions.iter().any(|c| evaluate(c, type_name, field)),
        When::Not(condition) => !evaluate(condition, type_name, field),
        When::FieldName(matcher) => matcher.matches(&field.name),
        When::FieldType(matcher) => matcher.matches(&field.type_name),
        When::TypeName(matcher) => matcher.matches(type_name),
        When::HasTag(tag) => field.has_annotation(tag),
        When::TagValue { tag, value } => field
            .annotations
            .get(tag)
            .is_some_and(|found| value.matches(found)),
    }
}
