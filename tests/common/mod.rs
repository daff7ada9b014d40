//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::path::PathBuf;
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Writes `content` to `<temp_dir>/<relative>`, creating parent directories as needed.
#[allow(dead_code)]
pub fn write_document(temp_dir: &TempDir, relative: &str, content: &str) -> PathBuf {
    let path = temp_dir.path().join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create policy directory");
    }
    std::fs::write(&path, content).expect("Failed to write policy document");
    path
}

/// A policy directory with two valid documents, one invalid one and a non-policy file.
///
/// Returns the path of the directory.
#[allow(dead_code)]
pub fn create_policy_dir(temp_dir: &TempDir) -> PathBuf {
    write_document(temp_dir, "policies/10-naming.yaml", NAMING_POLICY);
    write_document(temp_dir, "policies/nested/20-audit.yml", AUDIT_POLICY);
    write_document(temp_dir, "policies/30-broken.yaml", "name: broken\ntypes: []\n");
    write_document(temp_dir, "policies/README.md", "# not a policy\n");
    temp_dir.path().join("policies")
}

#[allow(dead_code)]
pub const NAMING_POLICY: &str = r#"
name: naming
types:
  - match: "*"
    classification: model
    codecs: [json]
    fields:
      - match: "*"
        apply: { json: "{snake}", db: "{lower}" }
"#;

#[allow(dead_code)]
pub const AUDIT_POLICY: &str = r#"
name: audit
types:
  - match: "Order*"
    classification: ledger
    codecs: [json, yaml]
    rules:
      - name: no-xml
        forbid: [xml]
"#;
