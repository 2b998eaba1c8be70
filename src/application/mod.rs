pub mod pipeline;
pub mod use_cases;

pub use pipeline::ModelPipeline;
pub use use_cases::ab_testing::AbTestManager;
pub use use_cases::deployment_gates::DeploymentGateEvaluator;
pub use use_cases::drift::DriftMonitor;
pub use use_cases::history::History;
pub use use_cases::retention::RetentionPolicy;
pub use use_cases::rollback::RollbackController;
pub use use_cases::safety_config::SafetyConfigStore;
pub use use_cases::version_store::VersionGraphStore;
