//! Loading policies from YAML documents.
//!
//! Every loaded document goes through [`Policy::validate`] before it is returned, so a policy
//! that reaches the engine is always structurally complete.

use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

use super::Policy;
use crate::error::LensError;

const POLICY_EXTENSIONS: &[&str] = &["yaml", "yml"];

impl Policy {
    pub fn from_yaml_str(content: &str) -> Result<Policy, LensError> {
        let policy: Policy = serde_yaml::from_str(content)?;
        policy.validate()?;
        Ok(policy)
    }
}

/// Loads a single policy document. Any parse or validation failure is returned.
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Policy, LensError> {
    let path = path.as_ref();
    tracing::debug!("[load_file] Reading policy document {:?}", path);
    let content = read_to_string(path)?;
    Policy::from_yaml_str(&content).map_err(|e| match e {
        LensError::InvalidDocument(msg) => {
            LensError::InvalidDocument(format!("{}: {msg}", path.display()))
        }
        other => other,
    })
}

/// Loads every `.yaml`/`.yml` document below `dir`, sorted by path.
///
/// Invalid documents are skipped with a warning so one bad file does not hide the rest.
pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<Policy>, LensError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(LensError::NotFound(format!(
            "policy directory {:?} does not exist",
            dir
        )));
    }

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_policy = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| POLICY_EXTENSIONS.contains(&ext));
        if is_policy {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    let mut policies = Vec::new();
    for path in paths {
        match load_file(&path) {
            Ok(policy) => policies.push(policy),
            Err(e) => {
                tracing::warn!("[load_dir] Skipping invalid policy document {:?}: {e}", path);
            }
        }
    }
    tracing::info!(
        "[load_dir] Loaded {} policy document(s) from {:?}",
        policies.len(),
        dir
    );
    Ok(policies)
}
