//! # kriten-engine
//!
//! Task and workload execution engine for Kriten.
//!
//! A **runner** names a container image and a git repository. A **task** names
//! a runner and a shell command, and may declare an input schema and a secret.
//! The engine turns a task into orchestrator workloads:
//!
//! - **Jobs**: one-shot invocations, optionally awaited inline
//! - **Cron jobs**: invocations on a schedule
//! - **Deployments**: long-running replicas
//!
//! ## Components
//!
//! - [`catalog`] and [`secrets`]: runner and task records, write-only secrets
//! - [`schema`]: input validation against the task schema
//! - [`compile`]: the shared pod template and its workload wrappers
//! - [`executor`]: pre-flight, submission and synchronous waits
//! - [`logs`]: log aggregation and the `^JSON` result protocol
//! - [`service`]: the facade the API layer calls
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use kriten_core::{Principal, TestAuditSink};
//! use kriten_engine::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> kriten_engine::Result<()> {
//! let service = KritenService::new(
//!     Arc::new(InMemoryConfigStore::new()),
//!     Arc::new(InMemorySecretStore::new()),
//!     Arc::new(InMemoryWorkloads::new()),
//!     Arc::new(TestAuditSink::new()),
//!     &EngineConfig::default(),
//! );
//!
//! let admin = Principal::local("admin");
//! service
//!     .create_runner(&admin, Runner::new("python", "python:3.12", "https://github.com/org/scripts.git"))
//!     .await?;
//! service
//!     .create_task(&admin, Task::new("hello", "python", "python hello.py"))
//!     .await?;
//!
//! let launch = service.create_job(&admin, "hello", None).await?;
//! assert!(launch.id.starts_with("hello-"));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub(crate) mod k8s;

pub mod catalog;
pub mod compile;
pub mod config;
pub mod cronjob;
pub mod deployment;
pub mod error;
pub mod executor;
pub mod job;
pub mod logs;
pub mod metrics;
pub mod runner;
pub mod schema;
pub mod secrets;
pub mod service;
pub mod task;
pub mod workload;

pub use k8s::{DEPLOYMENT_NAME_LABEL, JOB_NAME_LABEL, OWNER_LABEL, TASK_LABEL};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::catalog::memory::InMemoryConfigStore;
    pub use crate::catalog::{ConfigStore, Record, WriteOp};
    pub use crate::config::{EngineConfig, PollPolicy};
    pub use crate::cronjob::CronJob;
    pub use crate::deployment::Deployment;
    pub use crate::error::{Error, Result};
    pub use crate::executor::{Executor, WaitOutcome};
    pub use crate::job::{JobLaunch, JobResult, JobState, JobSummary};
    pub use crate::runner::Runner;
    pub use crate::secrets::memory::InMemorySecretStore;
    pub use crate::secrets::{REDACTED, SecretStore};
    pub use crate::service::KritenService;
    pub use crate::task::{Task, TaskSummary};
    pub use crate::workload::WorkloadApi;
    pub use crate::workload::memory::InMemoryWorkloads;
}

pub use error::{Error, Result};
pub use service::KritenService;
