//! The caller-owned context tying together the pipeline, the cache and the configuration
//! lifecycle.
//!
//! ## Lifecycle
//!
//! ```text
//!            seal() / first inspect
//!  unsealed ------------------------> sealed
//!     ^                                 |
//!     +------------- unseal() ----------+
//!          (clears cache, new session)
//! ```
//!
//! - **unsealed**: policies, conventions and strictness may be changed through the [`Admin`]
//!   handle. Inspection is only allowed before the first seal, and then auto-seals.
//! - **sealed**: the policy set is frozen into an immutable [`Pipeline`] snapshot and
//!   inspection is permitted.
//!
//! Every transition bumps the session counter. Extractions that started under an older session
//! still complete, but their results are not cached.

use parking_lot::{Mutex, RwLock};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::{
    cache::MetadataCache,
    config::{LensConfig, BASELINE_KEYS},
    convention::{Convention, ConventionRegistry},
    descriptor::{Reflect, TypeDescriptor},
    error::LensError,
    graph::SchemaGraph,
    metadata::{Metadata, TypeRelationship},
    pipeline::{LensStats, Mode, Pipeline, PipelineConfig, StageKind},
    policy::{Policy, PolicyEngine},
    relationship::{discover, DomainScope},
};

#[derive(Debug)]
struct AdminState {
    policies: Vec<Policy>,
    conventions: ConventionRegistry,
    strict: bool,
    sealed: bool,
    session: u64,
}

impl AdminState {
    fn ensure_unsealed(&self, operation: &str) -> Result<(), LensError> {
        if self.sealed {
            Err(LensError::ConfigurationSealed(operation.to_string()))
        } else {
            Ok(())
        }
    }
}

struct LensInner {
    domain_root_depth: usize,
    admin_created: AtomicBool,
    admin: Mutex<AdminState>,
    pipeline: RwLock<Option<Arc<Pipeline>>>,
    cache: MetadataCache,
    annotation_keys: RwLock<Arc<BTreeSet<String>>>,
    stats: LensStats,
}

impl LensInner {
    // Caller holds the admin lock, which serializes every rebuild.
    fn seal_locked(&self, state: &mut AdminState) -> Arc<Pipeline> {
        state.sealed = true;
        state.session += 1;
        let pipeline = Arc::new(Pipeline::build(PipelineConfig {
            engine: PolicyEngine::new(state.policies.clone()),
            conventions: state.conventions.clone(),
            strict: state.strict,
            domain_root_depth: self.domain_root_depth,
            session: state.session,
        }));
        self.cache.reset(state.session);
        *self.pipeline.write() = Some(pipeline.clone());
        tracing::info!(
            "[Lens::seal] Sealed configuration with {} policies (session {})",
            state.policies.len(),
            state.session
        );
        pipeline
    }
}

/// Entry point for metadata extraction. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Lens {
    inner: Arc<LensInner>,
}

impl Default for Lens {
    fn default() -> Self {
        Lens::new(LensConfig::default())
    }
}

impl fmt::Debug for Lens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lens")
            .field("sealed", &self.is_sealed())
            .field("session", &self.config_session())
            .field("cached", &self.inner.cache.len())
            .finish()
    }
}

impl Lens {
    pub fn new(config: LensConfig) -> Self {
        let mut keys = BASELINE_KEYS.clone();
        keys.extend(config.annotation_keys.iter().cloned());
        Lens {
            inner: Arc::new(LensInner {
                domain_root_depth: config.domain_root_depth,
                admin_created: AtomicBool::new(false),
                admin: Mutex::new(AdminState {
                    policies: Vec::new(),
                    conventions: ConventionRegistry::default(),
                    strict: config.strict,
                    sealed: false,
                    session: 0,
                }),
                pipeline: RwLock::new(None),
                cache: MetadataCache::default(),
                annotation_keys: RwLock::new(Arc::new(keys)),
                stats: LensStats::default(),
            }),
        }
    }

    /// Returns the single configuration holder for this lens. A second call fails with
    /// [`LensError::ConfigurationAlreadyExists`].
    pub fn create_admin(&self) -> Result<Admin, LensError> {
        if self.inner.admin_created.swap(true, Ordering::SeqCst) {
            return Err(LensError::ConfigurationAlreadyExists);
        }
        Ok(Admin {
            inner: self.inner.clone(),
        })
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.admin.lock().sealed
    }

    pub fn config_session(&self) -> u64 {
        self.inner.admin.lock().session
    }

    pub fn is_strict(&self) -> bool {
        self.inner.admin.lock().strict
    }

    pub fn stats(&self) -> &LensStats {
        &self.inner.stats
    }

    /// Adds a key to the set of extracted annotation keys. Takes effect for extractions that
    /// start afterwards; already cached metadata is not re-extracted.
    pub fn register_annotation_key(&self, key: &str) {
        let mut writer = self.inner.annotation_keys.write();
        if writer.contains(key) {
            return;
        }
        let mut keys = writer.as_ref().clone();
        keys.insert(key.to_string());
        *writer = Arc::new(keys);
        tracing::debug!("[Lens::register_annotation_key] Registered '{key}'");
    }

    pub fn annotation_keys(&self) -> BTreeSet<String> {
        self.inner.annotation_keys.read().as_ref().clone()
    }

    fn annotation_key_set(&self) -> Arc<BTreeSet<String>> {
        self.inner.annotation_keys.read().clone()
    }

    /// The pipeline for the current session, auto-sealing if the lens has never been sealed.
    fn active_pipeline(&self) -> Result<Arc<Pipeline>, LensError> {
        if let Some(pipeline) = self.inner.pipeline.read().as_ref() {
            return Ok(pipeline.clone());
        }
        let mut state = self.inner.admin.lock();
        if state.sealed {
            // Another thread sealed while we waited for the lock.
            if let Some(pipeline) = self.inner.pipeline.read().as_ref() {
                return Ok(pipeline.clone());
            }
        }
        if state.session > 0 {
            return Err(LensError::NotSealed);
        }
        tracing::info!("[Lens::active_pipeline] First inspection, auto-sealing configuration");
        Ok(self.inner.seal_locked(&mut state))
    }

    fn store(&self, pipeline: &Pipeline, mode: Mode, meta: Metadata) -> Arc<Metadata> {
        let (meta, stored) = self.inner.cache.store(pipeline.session(), mode, meta);
        if stored {
            self.inner.stats.record_stage(StageKind::Cached);
        }
        meta
    }

    pub fn inspect<T: Reflect + ?Sized>(&self) -> Result<Arc<Metadata>, LensError> {
        self.inspect_descriptor(Arc::new(T::descriptor()))
    }

    /// Cache-or-build extraction of a single record type. Relationships are limited to the
    /// record's exact domain, also when the cached entry was built by a scan.
    pub fn inspect_descriptor(
        &self,
        descriptor: Arc<TypeDescriptor>,
    ) -> Result<Arc<Metadata>, LensError> {
        let descriptor = TypeDescriptor::normalize(descriptor)?;
        let pipeline = self.active_pipeline()?;
        match self.inner.cache.entry(&descriptor.qualified_name()) {
            Some((Mode::Inspect, meta)) => Ok(meta),
            Some((Mode::Scan, meta)) => Ok(exact_domain_view(meta)),
            None => {
                let meta = pipeline.extract(
                    descriptor,
                    Mode::Inspect,
                    self.annotation_key_set(),
                    &self.inner.stats,
                )?;
                Ok(exact_domain_view(self.store(&pipeline, Mode::Inspect, meta)))
            }
        }
    }

    pub fn scan<T: Reflect + ?Sized>(&self) -> Result<Arc<Metadata>, LensError> {
        self.scan_descriptor(Arc::new(T::descriptor()))
    }

    /// Like [`Lens::inspect_descriptor`], but also extracts every record reachable within the
    /// shared domain root.
    pub fn scan_descriptor(
        &self,
        descriptor: Arc<TypeDescriptor>,
    ) -> Result<Arc<Metadata>, LensError> {
        self.scan_with_visited(descriptor).map(|(meta, _)| meta)
    }

    /// Scans and also returns the set of fully qualified names the traversal visited.
    pub fn scan_with_visited(
        &self,
        descriptor: Arc<TypeDescriptor>,
    ) -> Result<(Arc<Metadata>, BTreeSet<String>), LensError> {
        let descriptor = TypeDescriptor::normalize(descriptor)?;
        let pipeline = self.active_pipeline()?;
        let mut walk = ScanWalk::new(
            self,
            &pipeline,
            self.annotation_key_set(),
            DomainScope::SharedRoot {
                depth: self.inner.domain_root_depth,
            },
        );
        let root = walk.visit(descriptor)?;
        tracing::debug!(
            "[Lens::scan] {} visited {} type(s)",
            root.qualified_name,
            walk.visited.len()
        );
        Ok((root, walk.visited))
    }

    /// Fully qualified names of every cached type, sorted.
    pub fn browse(&self) -> Vec<String> {
        self.inner.cache.keys()
    }

    /// Cache read only; never triggers extraction.
    pub fn lookup(&self, qualified_name: &str) -> Option<Arc<Metadata>> {
        self.inner.cache.get(qualified_name)
    }

    pub fn export_schema(&self) -> BTreeMap<String, Arc<Metadata>> {
        self.inner.cache.snapshot()
    }

    /// The cached schema as pretty-printed JSON, keyed by fully qualified name.
    pub fn export_schema_json(&self) -> Result<String, LensError> {
        let schema = self.export_schema();
        let by_name = schema
            .iter()
            .map(|(name, meta)| (name, meta.as_ref()))
            .collect::<BTreeMap<&String, &Metadata>>();
        Ok(serde_json::to_string_pretty(&by_name)?)
    }

    pub fn clear_cache(&self) {
        tracing::debug!("[Lens::clear_cache] Clearing {} entries", self.inner.cache.len());
        self.inner.cache.clear();
    }

    /// Relationship graph over the currently cached types.
    pub fn graph(&self) -> SchemaGraph {
        SchemaGraph::from_schema(&self.export_schema())
    }
}

/// Drops relationships leaving the record's own domain. Returns `meta` itself when nothing is
/// dropped.
fn exact_domain_view(meta: Arc<Metadata>) -> Arc<Metadata> {
    let in_domain =
        |r: &TypeRelationship| DomainScope::Exact.accepts(&meta.domain, &r.to_domain);
    if meta.relationships.iter().all(in_domain) {
        return meta;
    }
    let mut view = meta.as_ref().clone();
    view.relationships.retain(in_domain);
    Arc::new(view)
}

/// One recursive scan. Every type is visited at most once per walk.
pub(crate) struct ScanWalk<'a> {
    lens: &'a Lens,
    pipeline: &'a Pipeline,
    keys: Arc<BTreeSet<String>>,
    scope: DomainScope,
    visited: BTreeSet<String>,
}

impl<'a> ScanWalk<'a> {
    pub(crate) fn new(
        lens: &'a Lens,
        pipeline: &'a Pipeline,
        keys: Arc<BTreeSet<String>>,
        scope: DomainScope,
    ) -> Self {
        ScanWalk {
            lens,
            pipeline,
            keys,
            scope,
            visited: BTreeSet::new(),
        }
    }

    pub(crate) fn visit(
        &mut self,
        descriptor: Arc<TypeDescriptor>,
    ) -> Result<Arc<Metadata>, LensError> {
        let key = descriptor.qualified_name();
        if !self.visited.insert(key.clone()) {
            // Already on this walk: reuse what is cached, otherwise break the cycle with a
            // placeholder that is never stored.
            return Ok(self
                .lens
                .lookup(&key)
                .unwrap_or_else(|| Arc::new(Metadata::empty(&descriptor))));
        }

        // Inspect-mode entries only carry exact-domain edges, so they are rebuilt.
        let meta = match self.lens.inner.cache.entry(&key) {
            Some((Mode::Scan, meta)) => meta,
            _ => {
                let meta = self.pipeline.extract(
                    descriptor.clone(),
                    Mode::Scan,
                    self.keys.clone(),
                    &self.lens.inner.stats,
                )?;
                self.lens.store(self.pipeline, Mode::Scan, meta)
            }
        };

        for edge in discover(&descriptor, self.scope) {
            self.visit(edge.target)?;
        }
        Ok(meta)
    }
}

/// The configuration holder. Exactly one exists per [`Lens`].
pub struct Admin {
    inner: Arc<LensInner>,
}

impl fmt::Debug for Admin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.admin.lock();
        f.debug_struct("Admin")
            .field("policies", &state.policies.len())
            .field("sealed", &state.sealed)
            .field("session", &state.session)
            .finish()
    }
}

impl Admin {
    pub fn set_policies(&self, policies: Vec<Policy>) -> Result<(), LensError> {
        let mut state = self.inner.admin.lock();
        state.ensure_unsealed("set_policies")?;
        for policy in policies.iter() {
            policy.validate()?;
        }
        state.policies = policies;
        Ok(())
    }

    pub fn add_policy(&self, policy: Policy) -> Result<(), LensError> {
        self.add_policies(vec![policy])
    }

    pub fn add_policies<I: IntoIterator<Item = Policy>>(&self, policies: I) -> Result<(), LensError> {
        let mut state = self.inner.admin.lock();
        state.ensure_unsealed("add_policy")?;
        let policies = policies.into_iter().collect::<Vec<Policy>>();
        for policy in policies.iter() {
            policy.validate()?;
        }
        state.policies.extend(policies);
        Ok(())
    }

    pub fn get_policies(&self) -> Vec<Policy> {
        self.inner.admin.lock().policies.clone()
    }

    pub fn register_convention(&self, convention: Convention) -> Result<(), LensError> {
        let mut state = self.inner.admin.lock();
        state.ensure_unsealed("register_convention")?;
        state.conventions.register(convention);
        Ok(())
    }

    pub fn set_strict(&self, strict: bool) -> Result<(), LensError> {
        let mut state = self.inner.admin.lock();
        state.ensure_unsealed("set_strict")?;
        state.strict = strict;
        Ok(())
    }

    /// Freezes the current configuration and permits inspection.
    pub fn seal(&self) -> Result<(), LensError> {
        let mut state = self.inner.admin.lock();
        if state.sealed {
            return Err(LensError::AlreadySealed);
        }
        self.inner.seal_locked(&mut state);
        Ok(())
    }

    /// Reopens the configuration for changes. Clears the cache.
    pub fn unseal(&self) -> Result<(), LensError> {
        let mut state = self.inner.admin.lock();
        if !state.sealed {
            return Err(LensError::NotSealed);
        }
        state.sealed = false;
        state.session += 1;
        *self.inner.pipeline.write() = None;
        self.inner.cache.reset(state.session);
        tracing::info!(
            "[Admin::unseal] Configuration unsealed, cache cleared (session {})",
            state.session
        );
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.admin.lock().sealed
    }

    pub fn session(&self) -> u64 {
        self.inner.admin.lock().session
    }
}
