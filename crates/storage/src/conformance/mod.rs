//! Conformance test suite for `BrokerStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any `BrokerStorage`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Instances**: upsert, existence vs. absence, provision request details
//! - **Bindings**: insert-only credentials, bind request details, per-instance listing
//! - **Deployments**: upsert, deletion, recovery of interrupted operations
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use broker_storage::conformance::{run_conformance_suite, ConformanceReport};
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod binding;
mod deployment;
mod instance;

use std::fmt;
use std::future::Future;

use crate::record::{ServiceBindingCredentials, ServiceInstanceDetails, TerraformDeployment};
use crate::BrokerStorage;

/// Outcome of one check, keyed by record kind (`instance`, `binding`,
/// `deployment`) and check name.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub category: String,
    pub name: String,
    pub passed: bool,
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Tally of a suite run; `Display` lists only the failures.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run every check against storage built by `factory`, which must return a
/// fresh, empty backend on each call.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(instance::run_instance_tests(&factory).await);
    results.extend(binding::run_binding_tests(&factory).await);
    results.extend(deployment::run_deployment_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}


fn make_instance(guid: &str) -> ServiceInstanceDetails {
    let mut outputs = crate::JsonObject::new();
    outputs.insert("hostname".to_string(), serde_json::json!("db.example.com"));
    ServiceInstanceDetails {
        guid: guid.to_string(),
        name: format!("name-{guid}"),
        outputs,
        service_guid: "svc-1".to_string(),
        plan_guid: "plan-1".to_string(),
        space_guid: "space-1".to_string(),
        organization_guid: "org-1".to_string(),
        ..ServiceInstanceDetails::default()
    }
}

fn make_binding(binding_id: &str, instance_id: &str) -> ServiceBindingCredentials {
    let mut credentials = crate::JsonObject::new();
    credentials.insert("username".to_string(), serde_json::json!("admin"));
    ServiceBindingCredentials {
        service_guid: "svc-1".to_string(),
        service_instance_guid: instance_id.to_string(),
        binding_guid: binding_id.to_string(),
        credentials,
    }
}

fn make_deployment(id: &str) -> TerraformDeployment {
    TerraformDeployment {
        workspace: serde_json::json!({"modules": []}),
        last_operation_type: "provision".to_string(),
        ..TerraformDeployment::new(id)
    }
}
