pub mod ab_testing;
pub mod deployment_gates;
pub mod drift;
pub mod history;
pub mod retention;
pub mod rollback;
pub mod safety_checks;
pub mod safety_config;
pub mod version_store;
