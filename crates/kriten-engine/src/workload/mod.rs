//! Orchestrator workload API.
//!
//! The engine submits, reads and removes jobs, cron jobs and deployments, and
//! reads pods and their logs. Objects are the orchestrator's own types; label
//! selectors use the orchestrator syntax (`key`, `key=value`, comma-joined).

pub mod kube;
pub mod memory;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::Pod;

use crate::catalog::WriteOp;
use crate::error::Result;

/// Access to workloads in the engine namespace.
#[async_trait]
pub trait WorkloadApi: Send + Sync {
    /// Submits a job. The orchestrator assigns the name from `generateName`.
    async fn create_job(&self, job: &Job) -> Result<Job>;

    /// Reads a job by name.
    async fn get_job(&self, name: &str) -> Result<Job>;

    /// Lists jobs matching a label selector.
    async fn list_jobs(&self, selector: &str) -> Result<Vec<Job>>;

    /// Deletes a job and its pods.
    async fn delete_job(&self, name: &str) -> Result<()>;

    /// Creates or replaces a cron job.
    async fn apply_cron_job(&self, cron_job: &CronJob, op: WriteOp) -> Result<CronJob>;

    /// Reads a cron job by name.
    async fn get_cron_job(&self, name: &str) -> Result<CronJob>;

    /// Lists cron jobs matching a label selector.
    async fn list_cron_jobs(&self, selector: &str) -> Result<Vec<CronJob>>;

    /// Deletes a cron job.
    async fn delete_cron_job(&self, name: &str) -> Result<()>;

    /// Creates or replaces a deployment.
    async fn apply_deployment(&self, deployment: &Deployment, op: WriteOp) -> Result<Deployment>;

    /// Reads a deployment by name.
    async fn get_deployment(&self, name: &str) -> Result<Deployment>;

    /// Lists deployments matching a label selector.
    async fn list_deployments(&self, selector: &str) -> Result<Vec<Deployment>>;

    /// Deletes a deployment.
    async fn delete_deployment(&self, name: &str) -> Result<()>;

    /// Lists pods matching a label selector.
    async fn list_pods(&self, selector: &str) -> Result<Vec<Pod>>;

    /// Reads the logs of one container of a pod.
    async fn pod_logs(&self, pod: &str, container: &str) -> Result<String>;
}
