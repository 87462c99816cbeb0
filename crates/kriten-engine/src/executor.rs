//! Workload executor: pre-flight, submission and synchronous waits.
//!
//! Every launch follows the same pre-flight before anything is written to the
//! orchestrator:
//!
//! 1. Resolve the task and its runner from the catalog
//! 2. Validate the input against the task schema
//! 3. Read the runner's repository token
//!
//! Only then is the workload compiled and submitted. A rejected input leaves
//! no trace in the cluster.

use std::sync::Arc;

use k8s_openapi::api::batch::v1::Job;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;

use kriten_core::observability::invocation_span;

use crate::catalog::{ConfigStore, WriteOp, non_empty};
use crate::compile::{SpecCompiler, WorkloadInput};
use crate::config::{EngineConfig, PollPolicy};
use crate::cronjob::CronJob;
use crate::deployment::Deployment;
use crate::error::{Error, Result};
use crate::job::{JobLaunch, JobResult, JobSummary};
use crate::logs::{JobOutput, LogExtractor};
use crate::metrics::EngineMetrics;
use crate::runner::{Runner, TOKEN_KEY};
use crate::schema;
use crate::secrets::SecretStore;
use crate::task::Task;
use crate::workload::WorkloadApi;

/// Everything resolved before a workload is compiled.
#[derive(Debug, Clone)]
pub struct Preflight {
    /// Resolved task.
    pub task: Task,
    /// Runner the task references.
    pub runner: Runner,
    /// Repository token from the runner secret.
    pub git_token: Option<String>,
    /// Raw input, omitted when blank.
    pub extra_vars: Option<String>,
}

impl Preflight {
    /// Borrows the compiler input for `owner`.
    #[must_use]
    pub fn input<'a>(&'a self, owner: &'a str) -> WorkloadInput<'a> {
        WorkloadInput {
            runner: &self.runner,
            task: &self.task,
            owner,
            extra_vars: self.extra_vars.as_deref(),
            git_token: self.git_token.as_deref(),
        }
    }
}

/// How a synchronous wait ended.
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    /// The job succeeded or failed.
    Completed(Job),
    /// The deadline passed first; holds the last status read.
    TimedOut(Job),
}

impl WaitOutcome {
    /// Returns the last job read.
    #[must_use]
    pub fn job(&self) -> &Job {
        match self {
            Self::Completed(job) | Self::TimedOut(job) => job,
        }
    }

    /// Returns the metrics label for this outcome.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::TimedOut(_) => "timed_out",
        }
    }
}

/// Polls a job until it finishes or the policy deadline passes.
///
/// The first read happens immediately, then once per interval. Expiry of the
/// deadline is not an error.
///
/// # Errors
///
/// A failed status read aborts the wait and is returned.
pub async fn wait_for_completion(
    workloads: &dyn WorkloadApi,
    job_id: &str,
    policy: &PollPolicy,
) -> Result<WaitOutcome> {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(policy.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let job = workloads.get_job(job_id).await?;
        if JobSummary::from_job(&job).is_finished() {
            return Ok(WaitOutcome::Completed(job));
        }
        if started.elapsed() >= policy.deadline {
            tracing::warn!(job_id, deadline = ?policy.deadline, "synchronous wait timed out");
            return Ok(WaitOutcome::TimedOut(job));
        }
    }
}

/// Launches tasks as jobs, cron jobs and deployments.
#[derive(Clone)]
pub struct Executor {
    catalog: Arc<dyn ConfigStore>,
    secrets: Arc<dyn SecretStore>,
    workloads: Arc<dyn WorkloadApi>,
    compiler: SpecCompiler,
    poll: PollPolicy,
    logs: LogExtractor,
    metrics: EngineMetrics,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("compiler", &self.compiler)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Creates an executor over the given stores.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn ConfigStore>,
        secrets: Arc<dyn SecretStore>,
        workloads: Arc<dyn WorkloadApi>,
        config: &EngineConfig,
    ) -> Self {
        let metrics = EngineMetrics::new();
        Self {
            catalog,
            secrets,
            logs: LogExtractor::new(Arc::clone(&workloads), metrics),
            workloads,
            compiler: SpecCompiler::new(config),
            poll: config.sync_poll,
            metrics,
        }
    }

    /// Returns the log extractor sharing this executor's workload API.
    #[must_use]
    pub const fn logs(&self) -> &LogExtractor {
        &self.logs
    }

    /// Reads a task definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no task record has this name.
    pub async fn load_task(&self, name: &str) -> Result<Task> {
        match self.catalog.get(name).await? {
            Some(record) if Task::is_task_record(&record) => Task::from_record(name, &record),
            _ => Err(Error::not_found("task", name)),
        }
    }

    /// Reads a runner definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no record has this name or the record has
    /// no image.
    pub async fn load_runner(&self, name: &str) -> Result<Runner> {
        match self.catalog.get(name).await? {
            Some(record) if Runner::is_runner_record(&record) => Ok(Runner::from_record(name, &record)),
            _ => Err(Error::not_found("runner", name)),
        }
    }

    /// Resolves and validates everything needed to launch `task_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for a missing task or runner and
    /// [`Error::Validation`] for input the task schema rejects.
    pub async fn preflight(&self, task_name: &str, extra_vars: Option<&str>) -> Result<Preflight> {
        let task = self.load_task(task_name).await?;
        let runner = self.load_runner(&task.runner).await?;

        let extra_vars = extra_vars.filter(|raw| !raw.trim().is_empty());
        let checked = match &task.schema {
            Some(task_schema) => schema::validate(task_schema, extra_vars.unwrap_or_default()),
            None => extra_vars.map_or(Ok(()), |raw| schema::parse_input(raw).map(|_| ())),
        };
        if let Err(err) = checked {
            self.metrics.record_validation_rejection();
            tracing::info!(task = task_name, error = %err, "input rejected");
            return Err(err);
        }

        let git_token = self
            .secrets
            .get(&runner.name)
            .await?
            .and_then(|secret| non_empty(&secret, TOKEN_KEY).map(str::to_string));

        Ok(Preflight {
            task,
            runner,
            git_token,
            extra_vars: extra_vars.map(str::to_string),
        })
    }

    /// Launches a one-shot job.
    ///
    /// Asynchronous tasks return as soon as the job is accepted. Synchronous
    /// tasks wait for the job under the configured poll policy and return
    /// its logs and result inline.
    ///
    /// # Errors
    ///
    /// Returns pre-flight errors before anything is submitted, and
    /// orchestrator errors from submission or the wait.
    pub async fn create_invocation(
        &self,
        task_name: &str,
        owner: &str,
        extra_vars: Option<&str>,
    ) -> Result<JobLaunch> {
        let span = invocation_span("launch", task_name, owner);
        async {
            let preflight = self.preflight(task_name, extra_vars).await?;
            let job = self.compiler.job(&preflight.input(owner));
            let created = self.workloads.create_job(&job).await?;
            let id = created.metadata.name.clone().unwrap_or_default();
            tracing::Span::current().record("job_id", id.as_str());

            let mode = if preflight.task.synchronous { "sync" } else { "async" };
            self.metrics.record_invocation(mode);
            tracing::info!(job_id = %id, mode, "job submitted");

            if !preflight.task.synchronous {
                return Ok(JobLaunch { id, result: None });
            }

            let started = Instant::now();
            let outcome = match wait_for_completion(self.workloads.as_ref(), &id, &self.poll).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.metrics.record_sync_wait("error", started.elapsed());
                    return Err(err);
                }
            };
            self.metrics.record_sync_wait(outcome.outcome(), started.elapsed());

            let result = self.assemble(outcome.job(), Some(owner)).await?;
            Ok(JobLaunch {
                id,
                result: Some(result),
            })
        }
        .instrument(span)
        .await
    }

    /// Returns status, logs and result of a job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the job or its pods do not exist.
    pub async fn job_result(&self, job_id: &str, owner: Option<&str>) -> Result<JobResult> {
        let job = self.workloads.get_job(job_id).await?;
        self.assemble(&job, owner).await
    }

    async fn assemble(&self, job: &Job, owner: Option<&str>) -> Result<JobResult> {
        let summary = JobSummary::from_job(job);
        let output = match self.logs.collect(&summary.id, owner).await {
            Ok(output) => output,
            Err(err) if err.is_not_found() && !summary.is_finished() => {
                tracing::debug!(job_id = %summary.id, "no pods yet");
                JobOutput {
                    stdout: String::new(),
                    json_data: None,
                    error: None,
                }
            }
            Err(err) => return Err(err),
        };
        Ok(JobResult {
            summary,
            stdout: output.stdout,
            json_data: output.json_data,
            error: output.error,
        })
    }

    /// Validates and writes a cron job.
    ///
    /// # Errors
    ///
    /// Returns validation and pre-flight errors before anything is written,
    /// [`Error::Conflict`] when creating an existing name and
    /// [`Error::NotFound`] when updating a missing one.
    pub async fn apply_cron_job(&self, def: &CronJob, op: WriteOp) -> Result<CronJob> {
        def.validate_shape()?;
        let extra_vars = def.extra_vars_json()?;
        let preflight = self.preflight(&def.task, extra_vars.as_deref()).await?;
        let object = self.compiler.cron_job(
            &def.name,
            def.schedule.trim(),
            def.disabled,
            &preflight.input(&def.owner),
        );
        let applied = self.workloads.apply_cron_job(&object, op).await?;
        self.metrics.record_invocation("cron");
        tracing::info!(cronjob = %def.name, task = %def.task, %op, "cron job applied");
        Ok(CronJob::from_k8s(&applied))
    }

    /// Validates and writes a deployment.
    ///
    /// # Errors
    ///
    /// Same as [`Executor::apply_cron_job`].
    pub async fn apply_deployment(&self, def: &Deployment, op: WriteOp) -> Result<Deployment> {
        def.validate_shape()?;
        let extra_vars = def.extra_vars_json()?;
        let preflight = self.preflight(&def.task, extra_vars.as_deref()).await?;
        let object = self
            .compiler
            .deployment(&def.name, def.replicas, &preflight.input(&def.owner));
        let applied = self.workloads.apply_deployment(&object, op).await?;
        self.metrics.record_invocation("deployment");
        tracing::info!(deployment = %def.name, task = %def.task, %op, "deployment applied");
        Ok(Deployment::from_k8s(&applied))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::InMemoryConfigStore;
    use crate::secrets::memory::InMemorySecretStore;
    use crate::workload::memory::{InMemoryWorkloads, SimulatedRun};
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        secrets: Arc<InMemorySecretStore>,
        workloads: Arc<InMemoryWorkloads>,
        executor: Executor,
    }

    async fn fixture(task: Task) -> Result<Fixture> {
        let catalog = Arc::new(InMemoryConfigStore::new());
        let secrets = Arc::new(InMemorySecretStore::new());
        let workloads = Arc::new(InMemoryWorkloads::new());
        let runner = Runner::new("py", "python:3", "https://git.example/r.git");
        catalog.put("py", runner.to_record(), WriteOp::Create).await?;
        catalog.put(&task.name, task.to_record()?, WriteOp::Create).await?;
        let executor = Executor::new(
            catalog.clone(),
            secrets.clone(),
            workloads.clone(),
            &EngineConfig::default(),
        );
        Ok(Fixture {
            secrets,
            workloads,
            executor,
        })
    }

    #[tokio::test]
    async fn async_launch_returns_id_immediately() -> Result<()> {
        let f = fixture(Task::new("hello", "py", "echo hi")).await?;
        let launch = f.executor.create_invocation("hello", "alice", None).await?;
        assert!(launch.id.starts_with("hello-"));
        assert!(launch.result.is_none());
        assert_eq!(f.workloads.polls(&launch.id), 0);
        Ok(())
    }

    #[tokio::test]
    async fn missing_task_or_runner_is_not_found() -> Result<()> {
        let f = fixture(Task::new("hello", "ghost", "echo hi")).await?;
        assert!(f.executor.create_invocation("nope", "alice", None).await.unwrap_err().is_not_found());
        assert!(f.executor.create_invocation("hello", "alice", None).await.unwrap_err().is_not_found());
        assert_eq!(f.workloads.job_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn schema_rejection_submits_nothing() -> Result<()> {
        let task = Task::new("pay", "py", "python pay.py")
            .with_schema(json!({"amount": {"type": "integer"}}));
        let f = fixture(task).await?;
        let err = f
            .executor
            .create_invocation("pay", "alice", Some(r#"{"amount":"x"}"#))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(f.workloads.mutation_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn runner_token_reaches_clone_url() -> Result<()> {
        let f = fixture(Task::new("hello", "py", "echo hi")).await?;
        let secret = [(TOKEN_KEY.to_string(), "s3cret".to_string())].into_iter().collect();
        f.secrets.put("py", secret, WriteOp::Create).await?;
        let preflight = f.executor.preflight("hello", None).await?;
        assert_eq!(preflight.git_token.as_deref(), Some("s3cret"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_softly() -> Result<()> {
        let f = fixture(Task::new("hello", "py", "sleep 60").synchronous(true)).await?;
        f.workloads.set_next_run(SimulatedRun::hangs());
        let launch = f.executor.create_invocation("hello", "alice", None).await?;
        let result = launch.result.unwrap();
        assert!(!result.summary.is_finished());
        assert!(f.workloads.polls(&launch.id) >= 200);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn wait_aborts_on_read_error() -> Result<()> {
        let f = fixture(Task::new("hello", "py", "echo hi").synchronous(true)).await?;
        f.workloads.fail_on("get_job");
        let err = f.executor.create_invocation("hello", "alice", None).await.unwrap_err();
        assert!(matches!(err, Error::Infrastructure { .. }));
        assert_eq!(f.workloads.job_count(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn wait_polls_at_interval() -> Result<()> {
        let f = fixture(Task::new("hello", "py", "echo hi")).await?;
        f.workloads.set_next_run(SimulatedRun::succeeds_with("hi\n", 5));
        let launch = f.executor.create_invocation("hello", "alice", None).await?;
        let policy = PollPolicy::new(Duration::from_millis(100), Duration::from_secs(20));

        let started = Instant::now();
        let outcome = wait_for_completion(f.workloads.as_ref(), &launch.id, &policy).await?;
        assert!(matches!(outcome, WaitOutcome::Completed(_)));
        assert_eq!(started.elapsed(), Duration::from_millis(400));
        Ok(())
    }
}
