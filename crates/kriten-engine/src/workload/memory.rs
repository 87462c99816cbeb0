//! In-memory workload API for testing.
//!
//! This module provides [`InMemoryWorkloads`], a stand-in for the orchestrator
//! that names jobs from `generateName`, spawns one pod per job with scripted
//! container logs and outcomes, and completes jobs after a configurable number
//! of status reads.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: nothing is executed
//! - **One pod per job**: retries and parallelism are not simulated
//! - **No TTL reaping**: finished jobs stay until deleted

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::{CronJob, Job, JobStatus};
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateRunning, ContainerStateTerminated, ContainerStateWaiting,
    ContainerStatus, Pod, PodStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use ulid::Ulid;

use super::WorkloadApi;
use crate::catalog::WriteOp;
use crate::error::{Error, Result};
use crate::k8s::JOB_NAME_LABEL;

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::infrastructure("workload lock poisoned")
}

/// How a simulated container ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFailure {
    /// The image could not be pulled.
    ImagePull,
    /// The container exited with a non-zero code.
    Exit(i32),
}

/// Final status of a simulated job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunOutcome {
    /// The job succeeds.
    #[default]
    Succeed,
    /// The job fails.
    Fail,
    /// The job never finishes.
    Hang,
}

/// Script applied to every job created after it is set.
#[derive(Debug, Clone, Default)]
pub struct SimulatedRun {
    /// Final status.
    pub outcome: RunOutcome,
    /// Number of status reads before the job reports its outcome.
    pub polls_until_done: u32,
    /// Logs of the init container.
    pub init_logs: String,
    /// Logs of the main container.
    pub main_logs: String,
    /// Init container failure; forces [`RunOutcome::Fail`].
    pub init_failure: Option<ContainerFailure>,
    /// The pod is never scheduled: it has no status and no logs.
    pub unscheduled: bool,
}

impl SimulatedRun {
    /// A run that succeeds after `polls` status reads with the given output.
    #[must_use]
    pub fn succeeds_with(main_logs: impl Into<String>, polls: u32) -> Self {
        Self {
            outcome: RunOutcome::Succeed,
            polls_until_done: polls,
            init_logs: "Cloning into '.'...\n".to_string(),
            main_logs: main_logs.into(),
            init_failure: None,
            unscheduled: false,
        }
    }

    /// A run that never finishes.
    #[must_use]
    pub fn hangs() -> Self {
        Self {
            outcome: RunOutcome::Hang,
            ..Self::default()
        }
    }

    /// A run whose pod stays pending and never finishes.
    #[must_use]
    pub fn unscheduled() -> Self {
        Self {
            outcome: RunOutcome::Hang,
            unscheduled: true,
            ..Self::default()
        }
    }

    /// A run whose init container fails.
    #[must_use]
    pub fn init_fails(failure: ContainerFailure) -> Self {
        Self {
            outcome: RunOutcome::Fail,
            init_failure: Some(failure),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct JobEntry {
    job: Job,
    polls: u32,
    run: SimulatedRun,
}

#[derive(Debug, Default)]
struct State {
    jobs: BTreeMap<String, JobEntry>,
    cron_jobs: BTreeMap<String, CronJob>,
    deployments: BTreeMap<String, Deployment>,
    pods: BTreeMap<String, Pod>,
    logs: BTreeMap<(String, String), String>,
    next_run: SimulatedRun,
    failing_ops: HashSet<&'static str>,
    mutations: usize,
}

impl State {
    fn check(&self, op: &'static str) -> Result<()> {
        if self.failing_ops.contains(op) {
            Err(Error::infrastructure(format!("injected failure: {op}")))
        } else {
            Ok(())
        }
    }
}

/// In-memory [`WorkloadApi`].
///
/// ## Example
///
/// ```rust
/// use kriten_engine::workload::memory::{InMemoryWorkloads, SimulatedRun};
///
/// let workloads = InMemoryWorkloads::new();
/// workloads.set_next_run(SimulatedRun::succeeds_with("hi\n", 2));
/// assert_eq!(workloads.job_count(), 0);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryWorkloads {
    state: RwLock<State>,
}

fn random_suffix() -> String {
    let id = Ulid::new().to_string().to_ascii_lowercase();
    id[id.len() - 5..].to_string()
}

/// Returns true if `labels` satisfy a comma-joined selector of `key` and
/// `key=value` terms.
#[must_use]
pub fn selector_matches(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.and_then(|l| l.get(key)).is_some_and(|v| v == value),
            None => labels.is_some_and(|l| l.contains_key(term)),
        })
}

fn container_status(
    name: &str,
    image: &str,
    failure: Option<ContainerFailure>,
    finished: bool,
) -> ContainerStatus {
    let state = match failure {
        Some(ContainerFailure::ImagePull) => ContainerState {
            waiting: Some(ContainerStateWaiting {
                reason: Some("ErrImagePull".to_string()),
                message: Some(format!("failed to pull image \"{image}\"")),
            }),
            ..ContainerState::default()
        },
        Some(ContainerFailure::Exit(code)) => ContainerState {
            terminated: Some(ContainerStateTerminated {
                exit_code: code,
                reason: Some("Error".to_string()),
                ..ContainerStateTerminated::default()
            }),
            ..ContainerState::default()
        },
        None if finished => ContainerState {
            terminated: Some(ContainerStateTerminated {
                exit_code: 0,
                reason: Some("Completed".to_string()),
                ..ContainerStateTerminated::default()
            }),
            ..ContainerState::default()
        },
        None => ContainerState {
            running: Some(ContainerStateRunning::default()),
            ..ContainerState::default()
        },
    };
    ContainerStatus {
        name: name.to_string(),
        image: image.to_string(),
        state: Some(state),
        ..ContainerStatus::default()
    }
}

impl InMemoryWorkloads {
    /// Creates an empty orchestrator. Jobs succeed immediately with no output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the script for jobs created from now on.
    pub fn set_next_run(&self, run: SimulatedRun) {
        if let Ok(mut state) = self.state.write() {
            state.next_run = run;
        }
    }

    /// Makes every call of `op` (a [`WorkloadApi`] method name) fail.
    pub fn fail_on(&self, op: &'static str) {
        if let Ok(mut state) = self.state.write() {
            state.failing_ops.insert(op);
        }
    }

    /// Returns the number of jobs.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.state.read().map(|s| s.jobs.len()).unwrap_or(0)
    }

    /// Returns every stored job.
    #[must_use]
    pub fn jobs(&self) -> Vec<Job> {
        self.state
            .read()
            .map(|s| s.jobs.values().map(|e| e.job.clone()).collect())
            .unwrap_or_default()
    }

    /// Returns the number of create, apply and delete calls that succeeded.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.state.read().map(|s| s.mutations).unwrap_or(0)
    }

    /// Returns how many times a job's status was read.
    #[must_use]
    pub fn polls(&self, job: &str) -> u32 {
        self.state
            .read()
            .ok()
            .and_then(|s| s.jobs.get(job).map(|e| e.polls))
            .unwrap_or(0)
    }

    /// Registers a pod with per-container logs.
    pub fn insert_pod(&self, pod: Pod, logs: &[(&str, &str)]) {
        if let Ok(mut state) = self.state.write() {
            let name = pod.metadata.name.clone().unwrap_or_default();
            for (container, text) in logs {
                state
                    .logs
                    .insert((name.clone(), (*container).to_string()), (*text).to_string());
            }
            state.pods.insert(name, pod);
        }
    }

    fn spawn_pod(state: &mut State, job: &Job, run: &SimulatedRun) {
        let job_name = job.metadata.name.clone().unwrap_or_default();
        let pod_name = format!("{job_name}-{}", random_suffix());
        let template = job.spec.as_ref().map(|s| s.template.clone()).unwrap_or_default();
        let mut labels = template
            .metadata
            .as_ref()
            .and_then(|m| m.labels.clone())
            .unwrap_or_default();
        labels.insert(JOB_NAME_LABEL.to_string(), job_name);

        let pod_spec = template.spec.unwrap_or_default();
        if run.unscheduled {
            let pod = Pod {
                metadata: ObjectMeta {
                    name: Some(pod_name.clone()),
                    labels: Some(labels),
                    ..ObjectMeta::default()
                },
                spec: Some(pod_spec),
                status: None,
            };
            state.pods.insert(pod_name, pod);
            return;
        }
        let finished = run.outcome != RunOutcome::Hang;
        let init_statuses = pod_spec
            .init_containers
            .iter()
            .flatten()
            .map(|c| {
                let image = c.image.clone().unwrap_or_default();
                container_status(&c.name, &image, run.init_failure, finished)
            })
            .collect::<Vec<_>>();
        let main_statuses = pod_spec
            .containers
            .iter()
            .map(|c| {
                let image = c.image.clone().unwrap_or_default();
                let failure = match (run.init_failure, run.outcome) {
                    (None, RunOutcome::Fail) => Some(ContainerFailure::Exit(1)),
                    _ => None,
                };
                let mut status = container_status(&c.name, &image, failure, finished);
                if run.init_failure.is_some() {
                    status.state = Some(ContainerState {
                        waiting: Some(ContainerStateWaiting {
                            reason: Some("PodInitializing".to_string()),
                            message: None,
                        }),
                        ..ContainerState::default()
                    });
                }
                status
            })
            .collect::<Vec<_>>();

        for c in pod_spec.init_containers.iter().flatten() {
            state
                .logs
                .insert((pod_name.clone(), c.name.clone()), run.init_logs.clone());
        }
        for c in &pod_spec.containers {
            let logs = if run.init_failure.is_some() {
                String::new()
            } else {
                run.main_logs.clone()
            };
            state.logs.insert((pod_name.clone(), c.name.clone()), logs);
        }

        let pod = Pod {
            metadata: ObjectMeta {
                name: Some(pod_name.clone()),
                labels: Some(labels),
                ..ObjectMeta::default()
            },
            spec: Some(pod_spec),
            status: Some(PodStatus {
                init_container_statuses: Some(init_statuses),
                container_statuses: Some(main_statuses),
                ..PodStatus::default()
            }),
        };
        state.pods.insert(pod_name, pod);
    }

    fn advance(entry: &mut JobEntry) {
        if entry.run.outcome == RunOutcome::Hang || entry.polls < entry.run.polls_until_done {
            return;
        }
        let status = entry.job.status.get_or_insert_with(JobStatus::default);
        if status.completion_time.is_some() || status.failed.unwrap_or(0) > 0 {
            return;
        }
        status.active = Some(0);
        match entry.run.outcome {
            RunOutcome::Succeed => {
                status.succeeded = Some(1);
                status.completion_time = Some(Time(Utc::now()));
            }
            RunOutcome::Fail => status.failed = Some(1),
            RunOutcome::Hang => {}
        }
    }
}

#[async_trait]
impl WorkloadApi for InMemoryWorkloads {
    async fn create_job(&self, job: &Job) -> Result<Job> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.check("create_job")?;

        let mut job = job.clone();
        let name = match (&job.metadata.name, &job.metadata.generate_name) {
            (Some(name), _) => name.clone(),
            (None, Some(prefix)) => format!("{prefix}{}", random_suffix()),
            (None, None) => return Err(Error::validation("job has neither name nor generateName")),
        };
        if state.jobs.contains_key(&name) {
            return Err(Error::conflict("job", name));
        }
        job.metadata.name = Some(name.clone());
        if job.metadata.labels.is_none() {
            job.metadata.labels = job
                .spec
                .as_ref()
                .and_then(|s| s.template.metadata.as_ref())
                .and_then(|m| m.labels.clone());
        }
        job.status = Some(JobStatus {
            active: Some(1),
            start_time: Some(Time(Utc::now())),
            ..JobStatus::default()
        });

        let run = state.next_run.clone();
        Self::spawn_pod(&mut state, &job, &run);
        let mut entry = JobEntry { job, polls: 0, run };
        Self::advance(&mut entry);
        let created = entry.job.clone();
        state.jobs.insert(name, entry);
        state.mutations += 1;
        drop(state);
        Ok(created)
    }

    async fn get_job(&self, name: &str) -> Result<Job> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.check("get_job")?;
        let entry = state
            .jobs
            .get_mut(name)
            .ok_or_else(|| Error::not_found("job", name))?;
        entry.polls += 1;
        Self::advance(entry);
        Ok(entry.job.clone())
    }

    async fn list_jobs(&self, selector: &str) -> Result<Vec<Job>> {
        let state = self.state.read().map_err(poison_err)?;
        state.check("list_jobs")?;
        Ok(state
            .jobs
            .values()
            .filter(|e| selector_matches(e.job.metadata.labels.as_ref(), selector))
            .map(|e| e.job.clone())
            .collect())
    }

    async fn delete_job(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.check("delete_job")?;
        state
            .jobs
            .remove(name)
            .ok_or_else(|| Error::not_found("job", name))?;
        let pods: Vec<String> = state
            .pods
            .iter()
            .filter(|(_, pod)| {
                selector_matches(pod.metadata.labels.as_ref(), &format!("{JOB_NAME_LABEL}={name}"))
            })
            .map(|(pod, _)| pod.clone())
            .collect();
        for pod in pods {
            state.pods.remove(&pod);
            state.logs.retain(|(p, _), _| p != &pod);
        }
        state.mutations += 1;
        Ok(())
    }

    async fn apply_cron_job(&self, cron_job: &CronJob, op: WriteOp) -> Result<CronJob> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.check("apply_cron_job")?;
        let name = cron_job
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::validation("cronjob has no name"))?;
        match (op, state.cron_jobs.contains_key(&name)) {
            (WriteOp::Create, true) => return Err(Error::conflict("cronjob", name)),
            (WriteOp::Update, false) => return Err(Error::not_found("cronjob", name)),
            _ => {}
        }
        state.cron_jobs.insert(name, cron_job.clone());
        state.mutations += 1;
        Ok(cron_job.clone())
    }

    async fn get_cron_job(&self, name: &str) -> Result<CronJob> {
        let state = self.state.read().map_err(poison_err)?;
        state.check("get_cron_job")?;
        state
            .cron_jobs
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("cronjob", name))
    }

    async fn list_cron_jobs(&self, selector: &str) -> Result<Vec<CronJob>> {
        let state = self.state.read().map_err(poison_err)?;
        state.check("list_cron_jobs")?;
        Ok(state
            .cron_jobs
            .values()
            .filter(|c| selector_matches(c.metadata.labels.as_ref(), selector))
            .cloned()
            .collect())
    }

    async fn delete_cron_job(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.check("delete_cron_job")?;
        state
            .cron_jobs
            .remove(name)
            .ok_or_else(|| Error::not_found("cronjob", name))?;
        state.mutations += 1;
        Ok(())
    }

    async fn apply_deployment(&self, deployment: &Deployment, op: WriteOp) -> Result<Deployment> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.check("apply_deployment")?;
        let name = deployment
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::validation("deployment has no name"))?;
        match (op, state.deployments.contains_key(&name)) {
            (WriteOp::Create, true) => return Err(Error::conflict("deployment", name)),
            (WriteOp::Update, false) => return Err(Error::not_found("deployment", name)),
            _ => {}
        }
        state.deployments.insert(name, deployment.clone());
        state.mutations += 1;
        Ok(deployment.clone())
    }

    async fn get_deployment(&self, name: &str) -> Result<Deployment> {
        let state = self.state.read().map_err(poison_err)?;
        state.check("get_deployment")?;
        state
            .deployments
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("deployment", name))
    }

    async fn list_deployments(&self, selector: &str) -> Result<Vec<Deployment>> {
        let state = self.state.read().map_err(poison_err)?;
        state.check("list_deployments")?;
        Ok(state
            .deployments
            .values()
            .filter(|d| selector_matches(d.metadata.labels.as_ref(), selector))
            .cloned()
            .collect())
    }

    async fn delete_deployment(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.check("delete_deployment")?;
        state
            .deployments
            .remove(name)
            .ok_or_else(|| Error::not_found("deployment", name))?;
        state.mutations += 1;
        Ok(())
    }

    async fn list_pods(&self, selector: &str) -> Result<Vec<Pod>> {
        let state = self.state.read().map_err(poison_err)?;
        state.check("list_pods")?;
        Ok(state
            .pods
            .values()
            .filter(|p| selector_matches(p.metadata.labels.as_ref(), selector))
            .cloned()
            .collect())
    }

    async fn pod_logs(&self, pod: &str, container: &str) -> Result<String> {
        let state = self.state.read().map_err(poison_err)?;
        state.check("pod_logs")?;
        state
            .logs
            .get(&(pod.to_string(), container.to_string()))
            .cloned()
            .ok_or_else(|| Error::not_found("pod", format!("{pod}/{container}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::batch::v1::JobSpec;
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};

    fn job(prefix: &str) -> Job {
        Job {
            metadata: ObjectMeta {
                generate_name: Some(format!("{prefix}-")),
                ..ObjectMeta::default()
            },
            spec: Some(JobSpec {
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(BTreeMap::from([(
                            "task-name".to_string(),
                            prefix.to_string(),
                        )])),
                        ..ObjectMeta::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: prefix.to_string(),
                            image: Some("alpine".into()),
                            ..Container::default()
                        }],
                        ..PodSpec::default()
                    }),
                },
                ..JobSpec::default()
            }),
            ..Job::default()
        }
    }

    #[test]
    fn selector_terms_are_conjunctive() {
        let labels = BTreeMap::from([
            ("owner".to_string(), "alice".to_string()),
            ("task-name".to_string(), "hello".to_string()),
        ]);
        assert!(selector_matches(Some(&labels), "task-name"));
        assert!(selector_matches(Some(&labels), "task-name=hello,owner=alice"));
        assert!(!selector_matches(Some(&labels), "task-name=hello,owner=bob"));
        assert!(!selector_matches(None, "task-name"));
        assert!(selector_matches(None, ""));
    }

    #[tokio::test]
    async fn generated_names_and_labels() -> Result<()> {
        let workloads = InMemoryWorkloads::new();
        let created = workloads.create_job(&job("hello")).await?;
        let name = created.metadata.name.clone().unwrap_or_default();
        assert!(name.starts_with("hello-"));
        assert_eq!(name.len(), "hello-".len() + 5);
        assert_eq!(workloads.list_jobs("task-name=hello").await?.len(), 1);

        let pods = workloads.list_pods(&format!("job-name={name}")).await?;
        assert_eq!(pods.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn job_completes_after_scripted_polls() -> Result<()> {
        let workloads = InMemoryWorkloads::new();
        workloads.set_next_run(SimulatedRun::succeeds_with("hi\n", 2));
        let name = workloads
            .create_job(&job("hello"))
            .await?
            .metadata
            .name
            .unwrap_or_default();

        let first = workloads.get_job(&name).await?;
        assert_eq!(first.status.and_then(|s| s.succeeded), None);
        let second = workloads.get_job(&name).await?;
        assert_eq!(second.status.and_then(|s| s.succeeded), Some(1));
        assert_eq!(workloads.polls(&name), 2);
        Ok(())
    }

    #[tokio::test]
    async fn injected_failures_surface() {
        let workloads = InMemoryWorkloads::new();
        workloads.fail_on("create_job");
        let err = workloads.create_job(&job("hello")).await.unwrap_err();
        assert!(matches!(err, Error::Infrastructure { .. }));
        assert_eq!(workloads.mutation_count(), 0);
    }

    #[tokio::test]
    async fn deleting_a_job_removes_its_pods() -> Result<()> {
        let workloads = InMemoryWorkloads::new();
        let name = workloads
            .create_job(&job("hello"))
            .await?
            .metadata
            .name
            .unwrap_or_default();
        workloads.delete_job(&name).await?;
        assert!(workloads.list_pods(&format!("job-name={name}")).await?.is_empty());
        assert!(workloads.get_job(&name).await.unwrap_err().is_not_found());
        Ok(())
    }
}
