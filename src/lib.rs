//! modelvault: version control and deployment safety for the locally
//! trained conversational model.
//!
//! The crate is a library, not a service. An admin surface drives version
//! creation, staging, A/B testing, and promotion; an external monitoring
//! loop feeds quality snapshots in and acts on drift reports and
//! auto-rollback advice. Everything persists as JSON records in a
//! key-value store behind the [`infrastructure::kv::KvStore`] trait.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::pipeline::ModelPipeline;
pub use application::use_cases::ab_testing::AbTestManager;
pub use application::use_cases::deployment_gates::{
    DeploymentGate, DeploymentGateEvaluator, GateKind, GateStatus, PromotionOutcome,
};
pub use application::use_cases::drift::{DriftDirection, DriftMonitor, DriftReport};
pub use application::use_cases::history::History;
pub use application::use_cases::retention::{CleanupReport, RetentionPolicy};
pub use application::use_cases::rollback::{
    AutoRollbackAdvice, RollbackController, RollbackOutcome,
};
pub use application::use_cases::safety_checks::run_safety_checks;
pub use application::use_cases::safety_config::SafetyConfigStore;
pub use application::use_cases::version_store::{
    RegistrySummary, StageOutcome, StatusOutcome, VersionGraphStore,
};
pub use domain::ab_test::{
    AbComparison, AbRecommendation, AbTestSession, ComparisonWinner, NewComparison,
};
pub use domain::config::SafetyConfig;
pub use domain::error::{CoreError, Result};
pub use domain::events::{
    Actor, HistoryAction, HistoryEvent, QualitySnapshot, RollbackEvent, RollbackReason,
};
pub use domain::version::{
    ApprovalRecord, ArtifactPaths, Branch, ModelMetrics, ModelVersion, NewVersion,
    SafetyCheckResult, TrainingDataInfo, VersionStatus,
};
pub use infrastructure::kv::KvStore;
pub use infrastructure::memory::MemoryKvStore;
pub use infrastructure::sqlite::SqliteKvStore;
