//! Pre-built test fixtures for common test scenarios.
//!
//! Provides a pre-wired engine and factory functions with sensible defaults.

use std::sync::Arc;

use kriten_core::{Principal, TestAuditSink};
use kriten_engine::catalog::memory::InMemoryConfigStore;
use kriten_engine::config::{EngineConfig, PollPolicy};
use kriten_engine::cronjob::CronJob;
use kriten_engine::deployment::Deployment;
use kriten_engine::runner::Runner;
use kriten_engine::secrets::memory::InMemorySecretStore;
use kriten_engine::service::KritenService;
use kriten_engine::task::Task;
use kriten_engine::workload::memory::InMemoryWorkloads;
use serde_json::Value;

/// Name of the runner created by [`TestEngine::with_hello_task`].
pub const RUNNER_NAME: &str = "python";
/// Name of the task created by [`TestEngine::with_hello_task`].
pub const TASK_NAME: &str = "hello";

/// A service over in-memory stores, keeping a typed handle to each store.
pub struct TestEngine {
    /// Service under test.
    pub service: KritenService,
    /// Runner and task records.
    pub catalog: Arc<InMemoryConfigStore>,
    /// Secrets.
    pub secrets: Arc<InMemorySecretStore>,
    /// Simulated orchestrator.
    pub workloads: Arc<InMemoryWorkloads>,
    /// Recorded audit events.
    pub audit: Arc<TestAuditSink>,
    /// Principal used for mutations.
    pub admin: Principal,
}

impl TestEngine {
    /// Creates an engine with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    /// Creates an engine with a custom configuration.
    #[must_use]
    pub fn with_config(config: &EngineConfig) -> Self {
        let catalog = Arc::new(InMemoryConfigStore::new());
        let secrets = Arc::new(InMemorySecretStore::new());
        let workloads = Arc::new(InMemoryWorkloads::new());
        let audit = Arc::new(TestAuditSink::new());
        let service = KritenService::new(
            catalog.clone(),
            secrets.clone(),
            workloads.clone(),
            audit.clone(),
            config,
        );
        Self {
            service,
            catalog,
            secrets,
            workloads,
            audit,
            admin: Principal::local("admin"),
        }
    }

    /// Creates an engine with a fast poll policy for synchronous tests.
    #[must_use]
    pub fn with_poll(policy: PollPolicy) -> Self {
        Self::with_config(&EngineConfig::default().with_sync_poll(policy))
    }

    /// Creates the [`RUNNER_NAME`] runner and an asynchronous [`TASK_NAME`] task.
    pub async fn with_hello_task() -> Self {
        let engine = Self::new();
        engine.seed(python_runner(), hello_task()).await;
        engine
    }

    /// Creates a runner and a task, panicking on failure.
    pub async fn seed(&self, runner: Runner, task: Task) {
        self.service
            .create_runner(&self.admin, runner)
            .await
            .expect("seed runner");
        self.service
            .create_task(&self.admin, task)
            .await
            .expect("seed task");
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// A runner on the `main` branch.
pub fn python_runner() -> Runner {
    Runner::new(RUNNER_NAME, "python:3.12", "https://github.com/org/scripts.git")
}

/// An asynchronous task printing `hi`.
pub fn hello_task() -> Task {
    Task::new(TASK_NAME, RUNNER_NAME, "echo hi")
}

/// A task validating its input against `schema`.
pub fn schema_task(name: &str, schema: Value) -> Task {
    Task::new(name, RUNNER_NAME, "python main.py").with_schema(schema)
}

/// A cron job running `task` nightly.
pub fn nightly(name: &str, task: &str) -> CronJob {
    CronJob {
        name: name.to_string(),
        owner: String::new(),
        task: task.to_string(),
        schedule: "0 2 * * *".to_string(),
        disabled: false,
        extra_vars: None,
    }
}

/// A deployment of `task` with `replicas` replicas.
pub fn deployment(name: &str, task: &str, replicas: i32) -> Deployment {
    Deployment {
        name: name.to_string(),
        owner: String::new(),
        task: task.to_string(),
        replicas,
        extra_vars: None,
    }
}
