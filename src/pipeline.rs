//! The extraction pipeline.
//!
//! One extraction walks a working [`Metadata`] copy through an ordered list of [`Stage`]s:
//!
//! 1. **descriptor-resolved**: exported fields, annotations and kinds are read off the descriptor
//! 2. **policies-applied**: the [`PolicyEngine`] validates and enriches the working copy
//! 3. **conventions-detected**: the [`ConventionRegistry`] annotates satisfied conventions
//! 4. **relationships-extracted**: edges are discovered under the mode's [`DomainScope`]
//! 5. **validated**: structural checks run and downgraded violations become warnings
//!
//! The final **cached** state is reached by the caller once the frozen result is stored.
//!
//! A [`Pipeline`] is an immutable snapshot built when the configuration is sealed. Unsealing and
//! resealing builds a new snapshot; extractions holding the old one finish undisturbed.

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::{
    convention::ConventionRegistry,
    descriptor::TypeDescriptor,
    error::LensError,
    metadata::{FieldMetadata, Metadata},
    policy::{PolicyEngine, PolicyViolation},
    relationship::{discover, DomainScope},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Single-type extraction; relationships limited to the exact domain.
    Inspect,
    /// Recursive extraction; relationships limited to the shared domain root.
    Scan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StageKind {
    DescriptorResolved,
    PoliciesApplied,
    ConventionsDetected,
    RelationshipsExtracted,
    Validated,
    Cached,
}

impl StageKind {
    pub const PIPELINE: [StageKind; 5] = [
        StageKind::DescriptorResolved,
        StageKind::PoliciesApplied,
        StageKind::ConventionsDetected,
        StageKind::RelationshipsExtracted,
        StageKind::Validated,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StageKind::DescriptorResolved => "descriptor-resolved",
            StageKind::PoliciesApplied => "policies-applied",
            StageKind::ConventionsDetected => "conventions-detected",
            StageKind::RelationshipsExtracted => "relationships-extracted",
            StageKind::Validated => "validated",
            StageKind::Cached => "cached",
        };
        f.write_str(label)
    }
}

/// Counters for extraction work. Cache hits never touch these.
#[derive(Debug, Default)]
pub struct LensStats {
    extractions: AtomicU64,
    stage_runs: [AtomicU64; 6],
}

impl LensStats {
    pub fn extractions(&self) -> u64 {
        self.extractions.load(Ordering::Relaxed)
    }

    pub fn stage_runs(&self, stage: StageKind) -> u64 {
        self.stage_runs[stage.index()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> BTreeMap<StageKind, u64> {
        StageKind::PIPELINE
            .iter()
            .chain(std::iter::once(&StageKind::Cached))
            .map(|stage| (*stage, self.stage_runs(*stage)))
            .collect()
    }

    pub(crate) fn record_extraction(&self) {
        self.extractions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stage(&self, stage: StageKind) {
        self.stage_runs[stage.index()].fetch_add(1, Ordering::Relaxed);
    }
}

/// The mutable state of one in-flight extraction.
#[derive(Debug)]
pub struct ExtractionContext {
    pub descriptor: Arc<TypeDescriptor>,
    pub mode: Mode,
    pub annotation_keys: Arc<BTreeSet<String>>,
    pub working: Metadata,
    pub violations: Vec<PolicyViolation>,
}

impl ExtractionContext {
    pub fn new(
        descriptor: Arc<TypeDescriptor>,
        mode: Mode,
        annotation_keys: Arc<BTreeSet<String>>,
    ) -> Self {
        let working = Metadata::empty(&descriptor);
        ExtractionContext {
            descriptor,
            mode,
            annotation_keys,
            working,
            violations: Vec::new(),
        }
    }
}

pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    fn run(&self, ctx: &mut ExtractionContext) -> Result<(), LensError>;
}

/// Reads exported fields off the descriptor.
pub struct DescriptorStage;

impl Stage for DescriptorStage {
    fn kind(&self) -> StageKind {
        StageKind::DescriptorResolved
    }

    fn run(&self, ctx: &mut ExtractionContext) -> Result<(), LensError> {
        let fields = ctx
            .descriptor
            .fields
            .iter()
            .enumerate()
            .filter(|(_, field)| field.exported)
            .map(|(idx, field)| {
                let ty = field.ty.resolve();
                let annotations = field
                    .tags
                    .iter()
                    .filter(|(key, _)| ctx.annotation_keys.contains(key))
                    .cloned()
                    .collect::<BTreeMap<String, String>>();
                FieldMetadata {
                    name: field.name.clone(),
                    type_name: ty.name.clone(),
                    ty: field.ty.clone(),
                    kind: ty.kind(),
                    position: vec![idx],
                    annotations,
                    embedded: field.embedded,
                }
            })
            .collect();
        ctx.working.fields = fields;
        Ok(())
    }
}

pub struct PolicyStage {
    engine: PolicyEngine,
    strict: bool,
}

impl Stage for PolicyStage {
    fn kind(&self) -> StageKind {
        StageKind::PoliciesApplied
    }

    fn run(&self, ctx: &mut ExtractionContext) -> Result<(), LensError> {
        let violations = self.engine.apply(&mut ctx.working);
        if violations.is_empty() {
            return Ok(());
        }
        if self.strict {
            return Err(LensError::PolicyViolation {
                type_name: ctx.working.qualified_name.clone(),
                violations,
            });
        }
        ctx.violations.extend(violations);
        Ok(())
    }
}

pub struct ConventionStage {
    registry: ConventionRegistry,
}

impl Stage for ConventionStage {
    fn kind(&self) -> StageKind {
        StageKind::ConventionsDetected
    }

    fn run(&self, ctx: &mut ExtractionContext) -> Result<(), LensError> {
        ctx.working.conventions = self.registry.detect(&ctx.descriptor);
        Ok(())
    }
}

pub struct RelationshipStage {
    domain_root_depth: usize,
}

impl RelationshipStage {
    pub fn scope(&self, mode: Mode) -> DomainScope {
        match mode {
            Mode::Inspect => DomainScope::Exact,
            Mode::Scan => DomainScope::SharedRoot {
                depth: self.domain_root_depth,
            },
        }
    }
}

impl Stage for RelationshipStage {
    fn kind(&self) -> StageKind {
        StageKind::RelationshipsExtracted
    }

    fn run(&self, ctx: &mut ExtractionContext) -> Result<(), LensError> {
        ctx.working.relationships = discover(&ctx.descriptor, self.scope(ctx.mode))
            .into_iter()
            .map(|edge| edge.relationship)
            .collect();
        Ok(())
    }
}

pub struct ValidationStage;

impl Stage for ValidationStage {
    fn kind(&self) -> StageKind {
        StageKind::Validated
    }

    fn run(&self, ctx: &mut ExtractionContext) -> Result<(), LensError> {
        let mut seen = BTreeSet::new();
        for field in ctx.working.fields.iter() {
            if !seen.insert(field.name.as_str()) {
                return Err(LensError::InvalidDescriptor {
                    type_name: ctx.working.qualified_name.clone(),
                    reason: format!("duplicate field '{}'", field.name),
                });
            }
        }
        for violation in ctx.violations.iter() {
            tracing::warn!(
                "[ValidationStage::run] {}: {violation}",
                ctx.working.qualified_name
            );
        }
        ctx.working.warnings = std::mem::take(&mut ctx.violations);
        Ok(())
    }
}

/// Everything a pipeline snapshot is built from.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub engine: PolicyEngine,
    pub conventions: ConventionRegistry,
    pub strict: bool,
    pub domain_root_depth: usize,
    pub session: u64,
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    engine: PolicyEngine,
    strict: bool,
    session: u64,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field(
                "stages",
                &self.stages.iter().map(|s| s.kind()).collect::<Vec<_>>(),
            )
            .field("policies", &self.engine.policies().len())
            .field("strict", &self.strict)
            .field("session", &self.session)
            .finish()
    }
}

impl Pipeline {
    pub fn build(config: PipelineConfig) -> Self {
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(DescriptorStage),
            Box::new(PolicyStage {
                engine: config.engine.clone(),
                strict: config.strict,
            }),
            Box::new(ConventionStage {
                registry: config.conventions,
            }),
            Box::new(RelationshipStage {
                domain_root_depth: config.domain_root_depth,
            }),
            Box::new(ValidationStage),
        ];
        Pipeline {
            stages,
            engine: config.engine,
            strict: config.strict,
            session: config.session,
        }
    }

    /// The configuration session this snapshot was built for.
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Runs every stage in order. The first stage error aborts the remaining stages.
    pub fn extract(
        &self,
        descriptor: Arc<TypeDescriptor>,
        mode: Mode,
        annotation_keys: Arc<BTreeSet<String>>,
        stats: &LensStats,
    ) -> Result<Metadata, LensError> {
        stats.record_extraction();
        let mut ctx = ExtractionContext::new(descriptor, mode, annotation_keys);
        for stage in self.stages.iter() {
            let kind = stage.kind();
            stats.record_stage(kind);
            stage.run(&mut ctx).map_err(|e| {
                tracing::debug!(
                    "[Pipeline::extract] {} failed at {kind}: {e}",
                    ctx.working.qualified_name
                );
                e
            })?;
            tracing::debug!("[Pipeline::extract] {} -> {kind}", ctx.working.qualified_name);
        }
        Ok(ctx.working)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        descriptor::{FieldDescriptor, FieldKind, Reflect},
        policy::{Policy, TypePolicy},
    };

    struct Account;

    impl Reflect for Account {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::record("Account", "acme::bank")
                .field(FieldDescriptor::of::<String>("ID").tags(r#"json:"id" custom:"x""#))
                .field(FieldDescriptor::of::<i64>("balance").private())
                .field(FieldDescriptor::of::<Vec<Account>>("Children"))
        }
    }

    fn keys(keys: &[&str]) -> Arc<BTreeSet<String>> {
        Arc::new(keys.iter().map(|k| k.to_string()).collect())
    }

    fn strict_pipeline(strict: bool) -> Pipeline {
        Pipeline::build(PipelineConfig {
            engine: PolicyEngine::new(vec![Policy::new("p")
                .with_type(TypePolicy::new("*").ensure("CreatedAt", None))]),
            strict,
            domain_root_depth: 3,
            ..Default::default()
        })
    }

    #[test]
    fn test_descriptor_stage_filters_fields_and_keys() {
        let pipeline = Pipeline::build(PipelineConfig::default());
        let stats = LensStats::default();
        let meta = pipeline
            .extract(
                Arc::new(Account::descriptor()),
                Mode::Inspect,
                keys(&["json"]),
                &stats,
            )
            .unwrap();

        assert_eq!(meta.fields.len(), 2);
        assert_eq!(meta.fields[0].annotation("json"), "id");
        assert_eq!(meta.fields[0].annotation("custom"), "");
        assert_eq!(meta.fields[1].position, vec![2]);
        assert_eq!(meta.fields[1].kind, FieldKind::Collection);
        assert_eq!(meta.relationships.len(), 1);
        assert_eq!(stats.extractions(), 1);
        for stage in StageKind::PIPELINE {
            assert_eq!(stats.stage_runs(stage), 1);
        }
    }

    #[test]
    fn test_non_strict_downgrades_violations() {
        let stats = LensStats::default();
        let meta = strict_pipeline(false)
            .extract(Arc::new(Account::descriptor()), Mode::Inspect, keys(&[]), &stats)
            .unwrap();
        assert_eq!(meta.warnings.len(), 1);
        assert_eq!(meta.warnings[0].field(), "CreatedAt");
    }

    #[test]
    fn test_strict_short_circuits_remaining_stages() {
        let stats = LensStats::default();
        let err = strict_pipeline(true)
            .extract(Arc::new(Account::descriptor()), Mode::Inspect, keys(&[]), &stats)
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(stats.stage_runs(StageKind::PoliciesApplied), 1);
        assert_eq!(stats.stage_runs(StageKind::ConventionsDetected), 0);
        assert_eq!(stats.stage_runs(StageKind::Validated), 0);
    }

    #[test]
    fn test_duplicate_fields_fail_validation() {
        let descriptor = TypeDescriptor::record("Dup", "acme")
            .field(FieldDescriptor::of::<String>("A"))
            .field(FieldDescriptor::of::<u8>("A"));
        let err = Pipeline::build(PipelineConfig::default())
            .extract(
                Arc::new(descriptor),
                Mode::Inspect,
                keys(&[]),
                &LensStats::default(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("duplicate field"));
    }
}
