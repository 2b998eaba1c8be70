//! Key-value persistence boundary.
//!
//! The pipeline stores every record as a JSON value under a fixed string
//! key. Any backend satisfying get/set/remove semantics works; the crate
//! ships an in-memory store and a SQLite store. The core never retries a
//! failed read or write, that policy belongs to the caller.

use crate::domain::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Fixed storage keys used by the pipeline.
pub mod keys {
    /// Full list of model versions.
    pub const VERSIONS: &str = "model_versions";
    /// Id of the current production version.
    pub const ACTIVE_VERSION: &str = "active_model_version";
    /// Id of the staged promotion candidate.
    pub const STAGED_VERSION: &str = "staged_model_version";
    /// Audit trail (bounded).
    pub const HISTORY: &str = "model_version_history";
    /// Safety configuration.
    pub const SAFETY_CONFIG: &str = "model_safety_config";
    /// Append-only rollback log.
    pub const ROLLBACK_LOG: &str = "model_rollback_log";

    pub fn ab_test(candidate_id: &str) -> String {
        format!("ab_test:{}", candidate_id)
    }

    pub fn quality_snapshots(version_id: &str) -> String {
        format!("quality_snapshots:{}", version_id)
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}
