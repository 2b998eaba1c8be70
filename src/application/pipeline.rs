//! Wiring for the full version-control pipeline over one backing store.
//!
//! The admin surface and the monitoring loop both construct a
//! `ModelPipeline` and call into its components; every component shares the
//! same key-value store, history trail, and safety configuration.

use crate::application::use_cases::ab_testing::AbTestManager;
use crate::application::use_cases::deployment_gates::DeploymentGateEvaluator;
use crate::application::use_cases::drift::DriftMonitor;
use crate::application::use_cases::history::History;
use crate::application::use_cases::retention::RetentionPolicy;
use crate::application::use_cases::rollback::RollbackController;
use crate::application::use_cases::safety_config::SafetyConfigStore;
use crate::application::use_cases::version_store::VersionGraphStore;
use crate::infrastructure::kv::KvStore;
use std::sync::Arc;

pub struct ModelPipeline {
    pub versions: Arc<VersionGraphStore>,
    pub gates: Arc<DeploymentGateEvaluator>,
    pub ab_tests: Arc<AbTestManager>,
    pub drift: Arc<DriftMonitor>,
    pub rollback: Arc<RollbackController>,
    pub retention: Arc<RetentionPolicy>,
    pub config: Arc<SafetyConfigStore>,
    pub history: Arc<History>,
}

impl ModelPipeline {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        let history = Arc::new(History::new(kv.clone()));
        let config = Arc::new(SafetyConfigStore::new(kv.clone(), history.clone()));
        let versions = Arc::new(VersionGraphStore::new(kv.clone(), history.clone()));
        let ab_tests = Arc::new(AbTestManager::new(
            kv.clone(),
            versions.clone(),
            config.clone(),
            history.clone(),
        ));
        let gates = Arc::new(DeploymentGateEvaluator::new(
            versions.clone(),
            ab_tests.clone(),
            config.clone(),
            history.clone(),
        ));
        let drift = Arc::new(DriftMonitor::new(kv.clone(), config.clone()));
        let rollback = Arc::new(RollbackController::new(
            kv.clone(),
            versions.clone(),
            config.clone(),
            history.clone(),
        ));
        let retention = Arc::new(RetentionPolicy::new(
            kv,
            versions.clone(),
            config.clone(),
            history.clone(),
        ));

        Self {
            versions,
            gates,
            ab_tests,
            drift,
            rollback,
            retention,
            config,
            history,
        }
    }
}
