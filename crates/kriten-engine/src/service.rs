//! Service facade consumed by the API layer.
//!
//! [`KritenService`] owns the injected stores and exposes every catalog,
//! secret and workload operation. Callers resolve authorization first and
//! pass the resulting [`AuthorizedIds`] to list operations; mutations take the
//! acting [`Principal`], which becomes the workload owner and the audit actor.
//!
//! Every mutation records one audit event with its success or failure.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;
use tracing::Instrument;

use kriten_core::observability::catalog_span;
use kriten_core::{AuditAction, AuditEvent, AuditSink, AuditStatus, AuthorizedIds, Principal, ResourceKind};

use crate::catalog::{ConfigStore, Record, WriteOp};
use crate::config::EngineConfig;
use crate::cronjob::CronJob;
use crate::deployment::Deployment;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::job::{JobLaunch, JobResult, JobSummary};
use crate::k8s::{TASK_LABEL, task_selectors};
use crate::runner::{Runner, TOKEN_KEY};
use crate::schema;
use crate::secrets::{self, REDACTED, SecretStore};
use crate::task::{Task, TaskSummary};
use crate::workload::WorkloadApi;

/// Catalog, secret and workload operations behind one handle.
#[derive(Clone)]
pub struct KritenService {
    catalog: Arc<dyn ConfigStore>,
    secrets: Arc<dyn SecretStore>,
    workloads: Arc<dyn WorkloadApi>,
    audit: Arc<dyn AuditSink>,
    executor: Executor,
}

impl std::fmt::Debug for KritenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KritenService")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl KritenService {
    /// Wires the service from its collaborators.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn ConfigStore>,
        secrets: Arc<dyn SecretStore>,
        workloads: Arc<dyn WorkloadApi>,
        audit: Arc<dyn AuditSink>,
        config: &EngineConfig,
    ) -> Self {
        let executor = Executor::new(
            Arc::clone(&catalog),
            Arc::clone(&secrets),
            Arc::clone(&workloads),
            config,
        );
        Self {
            catalog,
            secrets,
            workloads,
            audit,
            executor,
        }
    }

    /// Returns the executor.
    #[must_use]
    pub const fn executor(&self) -> &Executor {
        &self.executor
    }

    fn audited<T>(
        &self,
        principal: &Principal,
        action: AuditAction,
        kind: ResourceKind,
        target: &str,
        result: Result<T>,
    ) -> Result<T> {
        let status = if result.is_ok() {
            AuditStatus::Success
        } else {
            AuditStatus::Failure
        };
        match AuditEvent::builder()
            .actor(&principal.name)
            .provider(&principal.provider)
            .action(action)
            .category(kind.as_str())
            .target(target)
            .status(status)
            .try_build()
        {
            Ok(event) => self.audit.record(event),
            Err(err) => tracing::warn!(error = %err, "dropping incomplete audit event"),
        }
        result
    }

    // --- runners ---

    /// Lists the runners in `ids`.
    ///
    /// # Errors
    ///
    /// Propagates catalog failures.
    pub async fn list_runners(&self, ids: &AuthorizedIds) -> Result<Vec<Runner>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .catalog
            .list()
            .await?
            .into_iter()
            .filter(|(name, record)| Runner::is_runner_record(record) && ids.permits(name))
            .map(|(name, record)| Runner::from_record(&name, &record))
            .collect())
    }

    /// Reads a runner. A stored token is shown as the redaction sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no runner has this name.
    pub async fn get_runner(&self, name: &str) -> Result<Runner> {
        let mut runner = self.executor.load_runner(name).await?;
        let stored = self.secrets.get(name).await?;
        if stored.is_some_and(|s| s.contains_key(TOKEN_KEY)) {
            runner.token = Some(REDACTED.to_string());
        }
        Ok(runner)
    }

    /// Creates a runner and stores its token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a malformed definition and
    /// [`Error::Conflict`] if the name is taken.
    pub async fn create_runner(&self, principal: &Principal, runner: Runner) -> Result<Runner> {
        let span = catalog_span("create", "runner", &runner.name);
        let result = self
            .write_runner(runner.clone(), WriteOp::Create)
            .instrument(span)
            .await;
        self.audited(principal, AuditAction::Create, ResourceKind::Runners, &runner.name, result)
    }

    /// Replaces a runner. The token follows the secret merge rules: the
    /// sentinel keeps it, an empty string removes it, `None` leaves it alone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the runner does not exist.
    pub async fn update_runner(&self, principal: &Principal, runner: Runner) -> Result<Runner> {
        let span = catalog_span("update", "runner", &runner.name);
        let result = async {
            self.executor.load_runner(&runner.name).await?;
            self.write_runner(runner.clone(), WriteOp::Update).await
        }
        .instrument(span)
        .await;
        self.audited(principal, AuditAction::Update, ResourceKind::Runners, &runner.name, result)
    }

    async fn write_runner(&self, runner: Runner, op: WriteOp) -> Result<Runner> {
        runner.validate()?;
        self.catalog.put(&runner.name, runner.to_record(), op).await?;
        if let Some(token) = &runner.token {
            let desired = Record::from([(TOKEN_KEY.to_string(), token.clone())]);
            secrets::apply_update(self.secrets.as_ref(), &runner.name, &desired).await?;
        }
        tracing::info!(runner = %runner.name, %op, "runner written");
        self.get_runner(&runner.name).await
    }

    /// Deletes a runner and its secret.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dependency`] while a task references the runner, and
    /// [`Error::NotFound`] if it does not exist.
    pub async fn delete_runner(&self, principal: &Principal, name: &str) -> Result<()> {
        let result = async {
            self.executor.load_runner(name).await?;
            let dependent = self
                .catalog
                .list()
                .await?
                .into_iter()
                .find(|(task, record)| {
                    Task::is_task_record(record) && TaskSummary::from_record(task, record).runner == name
                });
            if let Some((task, _)) = dependent {
                return Err(Error::dependency("runner", "task", task));
            }
            self.catalog.delete(name).await?;
            self.secrets.delete(name).await
        }
        .instrument(catalog_span("delete", "runner", name))
        .await;
        self.audited(principal, AuditAction::Delete, ResourceKind::Runners, name, result)
    }

    // --- tasks ---

    /// Lists the tasks in `ids` without schema and mode.
    ///
    /// # Errors
    ///
    /// Propagates catalog failures.
    pub async fn list_tasks(&self, ids: &AuthorizedIds) -> Result<Vec<TaskSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .catalog
            .list()
            .await?
            .into_iter()
            .filter(|(name, record)| Task::is_task_record(record) && ids.permits(name))
            .map(|(name, record)| TaskSummary::from_record(&name, &record))
            .collect())
    }

    /// Reads a task with its secret redacted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no task has this name.
    pub async fn get_task(&self, name: &str) -> Result<Task> {
        let mut task = self.executor.load_task(name).await?;
        task.secret = secrets::get_redacted(self.secrets.as_ref(), name).await?;
        Ok(task)
    }

    /// Creates a task and stores its secret.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a malformed definition or schema,
    /// [`Error::NotFound`] if the runner does not exist and
    /// [`Error::Conflict`] if the name is taken.
    pub async fn create_task(&self, principal: &Principal, task: Task) -> Result<Task> {
        let result = self
            .write_task(task.clone(), WriteOp::Create)
            .instrument(catalog_span("create", "task", &task.name))
            .await;
        self.audited(principal, AuditAction::Create, ResourceKind::Tasks, &task.name, result)
    }

    /// Replaces a task. A task updated without a secret loses its stored one.
    ///
    /// # Errors
    ///
    /// Same as [`KritenService::create_task`], with [`Error::NotFound`] for a
    /// missing task.
    pub async fn update_task(&self, principal: &Principal, task: Task) -> Result<Task> {
        let result = async {
            self.executor.load_task(&task.name).await?;
            self.write_task(task.clone(), WriteOp::Update).await
        }
        .instrument(catalog_span("update", "task", &task.name))
        .await;
        self.audited(principal, AuditAction::Update, ResourceKind::Tasks, &task.name, result)
    }

    async fn write_task(&self, task: Task, op: WriteOp) -> Result<Task> {
        task.validate_shape()?;
        if let Some(task_schema) = &task.schema {
            schema::check_schema(task_schema)?;
        }
        self.executor.load_runner(&task.runner).await?;
        self.catalog.put(&task.name, task.to_record()?, op).await?;
        match (&task.secret, op) {
            (Some(desired), _) => {
                secrets::apply_update(self.secrets.as_ref(), &task.name, desired).await?;
            }
            (None, WriteOp::Update) => self.secrets.delete(&task.name).await?,
            (None, WriteOp::Create) => {}
        }
        tracing::info!(task = %task.name, %op, "task written");
        self.get_task(&task.name).await
    }

    /// Deletes a task and its secret.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dependency`] while a cron job or deployment runs the
    /// task, and [`Error::NotFound`] if it does not exist.
    pub async fn delete_task(&self, principal: &Principal, name: &str) -> Result<()> {
        let result = async {
            self.executor.load_task(name).await?;
            let selector = format!("{TASK_LABEL}={name}");
            if let Some(cron) = self.workloads.list_cron_jobs(&selector).await?.first() {
                let dependent = cron.metadata.name.clone().unwrap_or_default();
                return Err(Error::dependency("task", "cronjob", dependent));
            }
            if let Some(deployment) = self.workloads.list_deployments(&selector).await?.first() {
                let dependent = deployment.metadata.name.clone().unwrap_or_default();
                return Err(Error::dependency("task", "deployment", dependent));
            }
            self.catalog.delete(name).await?;
            self.secrets.delete(name).await
        }
        .instrument(catalog_span("delete", "task", name))
        .await;
        self.audited(principal, AuditAction::Delete, ResourceKind::Tasks, name, result)
    }

    /// Returns the input schema of a task, if it declares one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the task does not exist.
    pub async fn get_schema(&self, task_name: &str) -> Result<Option<Value>> {
        Ok(self.executor.load_task(task_name).await?.schema)
    }

    /// Replaces the input schema of a task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the schema does not compile and
    /// [`Error::NotFound`] if the task does not exist.
    pub async fn update_schema(
        &self,
        principal: &Principal,
        task_name: &str,
        task_schema: Value,
    ) -> Result<Value> {
        let result = async {
            schema::check_schema(&task_schema)?;
            let task = self.executor.load_task(task_name).await?.with_schema(task_schema.clone());
            self.catalog.put(task_name, task.to_record()?, WriteOp::Update).await?;
            Ok(task_schema)
        }
        .instrument(catalog_span("update", "schema", task_name))
        .await;
        self.audited(principal, AuditAction::Update, ResourceKind::Tasks, task_name, result)
    }

    /// Removes the input schema of a task. A task without a schema is left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the task does not exist.
    pub async fn delete_schema(&self, principal: &Principal, task_name: &str) -> Result<()> {
        let result = async {
            let mut task = self.executor.load_task(task_name).await?;
            if task.schema.take().is_none() {
                return Ok(());
            }
            self.catalog.put(task_name, task.to_record()?, WriteOp::Update).await?;
            Ok(())
        }
        .instrument(catalog_span("delete", "schema", task_name))
        .await;
        self.audited(principal, AuditAction::Update, ResourceKind::Tasks, task_name, result)
    }

    // --- secrets ---

    async fn secret_owner_kind(&self, owner_name: &str) -> Result<ResourceKind> {
        match self.catalog.get(owner_name).await? {
            Some(record) if Runner::is_runner_record(&record) => Ok(ResourceKind::Runners),
            Some(record) if Task::is_task_record(&record) => Ok(ResourceKind::Tasks),
            _ => Err(Error::not_found("runner or task", owner_name)),
        }
    }

    /// Returns the redacted secret of a runner or task; empty when none is
    /// stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no runner or task has this name.
    pub async fn get_secret(&self, owner_name: &str) -> Result<Record> {
        self.secret_owner_kind(owner_name).await?;
        Ok(secrets::get_redacted(self.secrets.as_ref(), owner_name)
            .await?
            .unwrap_or_default())
    }

    /// Merges `desired` into the secret of a runner or task and returns the
    /// redacted result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no runner or task has this name.
    pub async fn update_secret(
        &self,
        principal: &Principal,
        owner_name: &str,
        desired: &Record,
    ) -> Result<Record> {
        let lookup = self.secret_owner_kind(owner_name).await;
        let kind = secret_audit_kind(&lookup);
        let result = async {
            lookup?;
            let outcome = secrets::apply_update(self.secrets.as_ref(), owner_name, desired).await?;
            tracing::info!(owner = owner_name, ?outcome, "secret updated");
            Ok(secrets::get_redacted(self.secrets.as_ref(), owner_name)
                .await?
                .unwrap_or_default())
        }
        .instrument(catalog_span("update", "secret", owner_name))
        .await;
        self.audited(principal, AuditAction::Update, kind, &format!("{owner_name}/secret"), result)
    }

    /// Deletes the secret of a runner or task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no runner or task has this name.
    pub async fn delete_secret(&self, principal: &Principal, owner_name: &str) -> Result<()> {
        let lookup = self.secret_owner_kind(owner_name).await;
        let kind = secret_audit_kind(&lookup);
        let result = async {
            lookup?;
            self.secrets.delete(owner_name).await
        }
        .instrument(catalog_span("delete", "secret", owner_name))
        .await;
        self.audited(principal, AuditAction::Delete, kind, &format!("{owner_name}/secret"), result)
    }

    // --- jobs ---

    /// Lists the jobs of the tasks in `ids`.
    ///
    /// # Errors
    ///
    /// Propagates orchestrator failures.
    pub async fn list_jobs(&self, ids: &AuthorizedIds) -> Result<Vec<JobSummary>> {
        let selectors = task_selectors(ids);
        let batches = try_join_all(selectors.iter().map(|s| self.workloads.list_jobs(s))).await?;
        let found: BTreeMap<_, _> = batches
            .iter()
            .flatten()
            .map(JobSummary::from_job)
            .map(|summary| (summary.id.clone(), summary))
            .collect();
        Ok(found.into_values().collect())
    }

    /// Launches a task as a one-shot job.
    ///
    /// # Errors
    ///
    /// See [`Executor::create_invocation`].
    pub async fn create_job(
        &self,
        principal: &Principal,
        task_name: &str,
        extra_vars: Option<&str>,
    ) -> Result<JobLaunch> {
        let result = self
            .executor
            .create_invocation(task_name, &principal.name, extra_vars)
            .await;
        self.audited(principal, AuditAction::Launch, ResourceKind::Jobs, task_name, result)
    }

    /// Returns status, logs and result of a job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the job or its pods do not exist.
    pub async fn get_job(&self, id: &str, owner: Option<&str>) -> Result<JobResult> {
        self.executor.job_result(id, owner).await
    }

    /// Returns the labelled logs of a job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the job has no pods.
    pub async fn get_job_log(&self, id: &str, owner: Option<&str>) -> Result<String> {
        let logs = self.executor.logs();
        let pods = logs.resolve(id, owner).await?;
        logs.logs(&pods).await
    }

    /// Returns the structured result of a job, if it printed one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the job has no pods.
    pub async fn get_job_data(&self, id: &str, owner: Option<&str>) -> Result<Option<Value>> {
        Ok(self.executor.logs().collect(id, owner).await?.json_data)
    }

    /// Deletes a job and its pods.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the job does not exist.
    pub async fn delete_job(&self, principal: &Principal, id: &str) -> Result<()> {
        let result = self.workloads.delete_job(id).await;
        self.audited(principal, AuditAction::Delete, ResourceKind::Jobs, id, result)
    }

    // --- cron jobs ---

    /// Lists the cron jobs of the tasks in `ids`.
    ///
    /// # Errors
    ///
    /// Propagates orchestrator failures.
    pub async fn list_cron_jobs(&self, ids: &AuthorizedIds) -> Result<Vec<CronJob>> {
        let selectors = task_selectors(ids);
        let batches = try_join_all(selectors.iter().map(|s| self.workloads.list_cron_jobs(s))).await?;
        let found: BTreeMap<_, _> = batches
            .iter()
            .flatten()
            .map(CronJob::from_k8s)
            .map(|def| (def.name.clone(), def))
            .collect();
        Ok(found.into_values().collect())
    }

    /// Reads a cron job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if it does not exist.
    pub async fn get_cron_job(&self, name: &str) -> Result<CronJob> {
        Ok(CronJob::from_k8s(&self.workloads.get_cron_job(name).await?))
    }

    /// Creates a cron job owned by `principal`.
    ///
    /// # Errors
    ///
    /// See [`Executor::apply_cron_job`].
    pub async fn create_cron_job(&self, principal: &Principal, mut def: CronJob) -> Result<CronJob> {
        def.owner.clone_from(&principal.name);
        let result = self.executor.apply_cron_job(&def, WriteOp::Create).await;
        self.audited(principal, AuditAction::Create, ResourceKind::CronJobs, &def.name, result)
    }

    /// Replaces a cron job.
    ///
    /// # Errors
    ///
    /// See [`Executor::apply_cron_job`].
    pub async fn update_cron_job(&self, principal: &Principal, mut def: CronJob) -> Result<CronJob> {
        def.owner.clone_from(&principal.name);
        let result = self.executor.apply_cron_job(&def, WriteOp::Update).await;
        self.audited(principal, AuditAction::Update, ResourceKind::CronJobs, &def.name, result)
    }

    /// Deletes a cron job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if it does not exist.
    pub async fn delete_cron_job(&self, principal: &Principal, name: &str) -> Result<()> {
        let result = self.workloads.delete_cron_job(name).await;
        self.audited(principal, AuditAction::Delete, ResourceKind::CronJobs, name, result)
    }

    // --- deployments ---

    /// Lists the deployments of the tasks in `ids`.
    ///
    /// # Errors
    ///
    /// Propagates orchestrator failures.
    pub async fn list_deployments(&self, ids: &AuthorizedIds) -> Result<Vec<Deployment>> {
        let selectors = task_selectors(ids);
        let batches = try_join_all(selectors.iter().map(|s| self.workloads.list_deployments(s))).await?;
        let found: BTreeMap<_, _> = batches
            .iter()
            .flatten()
            .map(Deployment::from_k8s)
            .map(|def| (def.name.clone(), def))
            .collect();
        Ok(found.into_values().collect())
    }

    /// Reads a deployment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if it does not exist.
    pub async fn get_deployment(&self, name: &str) -> Result<Deployment> {
        Ok(Deployment::from_k8s(&self.workloads.get_deployment(name).await?))
    }

    /// Creates a deployment owned by `principal`.
    ///
    /// # Errors
    ///
    /// See [`Executor::apply_deployment`].
    pub async fn create_deployment(&self, principal: &Principal, mut def: Deployment) -> Result<Deployment> {
        def.owner.clone_from(&principal.name);
        let result = self.executor.apply_deployment(&def, WriteOp::Create).await;
        self.audited(principal, AuditAction::Create, ResourceKind::Deployments, &def.name, result)
    }

    /// Replaces a deployment.
    ///
    /// # Errors
    ///
    /// See [`Executor::apply_deployment`].
    pub async fn update_deployment(&self, principal: &Principal, mut def: Deployment) -> Result<Deployment> {
        def.owner.clone_from(&principal.name);
        let result = self.executor.apply_deployment(&def, WriteOp::Update).await;
        self.audited(principal, AuditAction::Update, ResourceKind::Deployments, &def.name, result)
    }

    /// Deletes a deployment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if it does not exist.
    pub async fn delete_deployment(&self, principal: &Principal, name: &str) -> Result<()> {
        let result = self.workloads.delete_deployment(name).await;
        self.audited(principal, AuditAction::Delete, ResourceKind::Deployments, name, result)
    }
}

/// Audit category of a secret mutation; tasks when the owner is unknown.
fn secret_audit_kind(lookup: &Result<ResourceKind>) -> ResourceKind {
    lookup.as_ref().map_or(ResourceKind::Tasks, |kind| *kind)
}
