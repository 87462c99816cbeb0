//! Compiles runner, task and input into orchestrator workload objects.
//!
//! Every workload shares one pod template:
//!
//! - an init container `init-<task>` clones the runner repository into an
//!   `emptyDir` volume mounted at `/mnt/repo`;
//! - the main container `<task>` runs `sh -c <command>` in `/mnt/repo` with the
//!   task secret mounted at `/etc/secret/` and injected as environment, and
//!   `EXTRA_VARS` set only when input was supplied.
//!
//! The template is wrapped into a Job, a CronJob or a Deployment.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1 as apps;
use k8s_openapi::api::batch::v1 as batch;
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvFromSource, EnvVar, PodSpec, PodTemplateSpec,
    SecretEnvSource, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use crate::config::EngineConfig;
use crate::k8s::{DEPLOYMENT_NAME_LABEL, OWNER_LABEL, TASK_LABEL};
use crate::runner::{Runner, authenticated_url};
use crate::task::Task;

/// Working directory of both containers.
pub const REPO_MOUNT_PATH: &str = "/mnt/repo";
/// Mount point of the task secret.
pub const SECRET_MOUNT_PATH: &str = "/etc/secret/";
/// Environment variable carrying raw invocation input.
pub const EXTRA_VARS_ENV: &str = "EXTRA_VARS";

const REPO_VOLUME: &str = "repo";
const SECRET_VOLUME: &str = "secret";
const BACKOFF_LIMIT: i32 = 1;

/// Everything needed to build a pod template.
#[derive(Debug, Clone, Copy)]
pub struct WorkloadInput<'a> {
    /// Runner providing image and repository.
    pub runner: &'a Runner,
    /// Task providing name and command.
    pub task: &'a Task,
    /// User stamped into the `owner` label.
    pub owner: &'a str,
    /// Raw JSON input; `None` or empty omits `EXTRA_VARS`.
    pub extra_vars: Option<&'a str>,
    /// Repository token from the runner secret.
    pub git_token: Option<&'a str>,
}

/// Builds workload objects from the engine configuration.
#[derive(Debug, Clone)]
pub struct SpecCompiler {
    git_image: String,
    jobs_ttl_seconds: i32,
}

impl SpecCompiler {
    /// Creates a compiler using the configured git image and job TTL.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            git_image: config.git_image.clone(),
            jobs_ttl_seconds: config.jobs_ttl_i32(),
        }
    }

    /// Builds the shared pod template.
    #[must_use]
    pub fn pod_template(&self, input: &WorkloadInput<'_>, restart_policy: &str) -> PodTemplateSpec {
        let task_name = input.task.name.as_str();
        let secret_name = task_name.to_string();

        let init = Container {
            name: format!("init-{task_name}"),
            image: Some(self.git_image.clone()),
            command: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                format!(
                    "git clone -b {} {} .",
                    input.runner.effective_branch(),
                    authenticated_url(&input.runner.git_url, input.git_token)
                ),
            ]),
            working_dir: Some(REPO_MOUNT_PATH.to_string()),
            volume_mounts: Some(vec![repo_mount()]),
            ..Container::default()
        };

        let env = input
            .extra_vars
            .filter(|vars| !vars.trim().is_empty())
            .map(|vars| {
                vec![EnvVar {
                    name: EXTRA_VARS_ENV.to_string(),
                    value: Some(vars.to_string()),
                    ..EnvVar::default()
                }]
            });

        let main = Container {
            name: task_name.to_string(),
            image: Some(input.runner.image.clone()),
            image_pull_policy: Some("IfNotPresent".to_string()),
            command: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                input.task.command.clone(),
            ]),
            working_dir: Some(REPO_MOUNT_PATH.to_string()),
            env,
            env_from: Some(vec![EnvFromSource {
                secret_ref: Some(SecretEnvSource {
                    name: secret_name.clone(),
                    optional: Some(true),
                }),
                ..EnvFromSource::default()
            }]),
            volume_mounts: Some(vec![
                VolumeMount {
                    name: SECRET_VOLUME.to_string(),
                    mount_path: SECRET_MOUNT_PATH.to_string(),
                    read_only: Some(true),
                    ..VolumeMount::default()
                },
                repo_mount(),
            ]),
            ..Container::default()
        };

        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(workload_labels(input.owner, task_name)),
                ..ObjectMeta::default()
            }),
            spec: Some(PodSpec {
                init_containers: Some(vec![init]),
                containers: vec![main],
                restart_policy: Some(restart_policy.to_string()),
                volumes: Some(vec![
                    Volume {
                        name: SECRET_VOLUME.to_string(),
                        secret: Some(SecretVolumeSource {
                            secret_name: Some(secret_name),
                            optional: Some(true),
                            ..SecretVolumeSource::default()
                        }),
                        ..Volume::default()
                    },
                    Volume {
                        name: REPO_VOLUME.to_string(),
                        empty_dir: Some(EmptyDirVolumeSource::default()),
                        ..Volume::default()
                    },
                ]),
                ..PodSpec::default()
            }),
        }
    }

    /// Builds the job spec shared by one-shot and scheduled jobs.
    #[must_use]
    pub fn job_spec(&self, input: &WorkloadInput<'_>) -> batch::JobSpec {
        batch::JobSpec {
            template: self.pod_template(input, "Never"),
            backoff_limit: Some(BACKOFF_LIMIT),
            ttl_seconds_after_finished: Some(self.jobs_ttl_seconds),
            ..batch::JobSpec::default()
        }
    }

    /// Builds a one-shot job named `<task>-<random suffix>` by the orchestrator.
    #[must_use]
    pub fn job(&self, input: &WorkloadInput<'_>) -> batch::Job {
        batch::Job {
            metadata: ObjectMeta {
                generate_name: Some(format!("{}-", input.task.name)),
                labels: Some(workload_labels(input.owner, &input.task.name)),
                ..ObjectMeta::default()
            },
            spec: Some(self.job_spec(input)),
            ..batch::Job::default()
        }
    }

    /// Builds a scheduled job.
    #[must_use]
    pub fn cron_job(
        &self,
        name: &str,
        schedule: &str,
        disabled: bool,
        input: &WorkloadInput<'_>,
    ) -> batch::CronJob {
        let labels = workload_labels(input.owner, &input.task.name);
        batch::CronJob {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels.clone()),
                ..ObjectMeta::default()
            },
            spec: Some(batch::CronJobSpec {
                schedule: schedule.to_string(),
                suspend: Some(disabled),
                job_template: batch::JobTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..ObjectMeta::default()
                    }),
                    spec: Some(self.job_spec(input)),
                },
                ..batch::CronJobSpec::default()
            }),
            ..batch::CronJob::default()
        }
    }

    /// Builds a long-running deployment.
    ///
    /// Pods are selected by [`DEPLOYMENT_NAME_LABEL`] alone.
    #[must_use]
    pub fn deployment(&self, name: &str, replicas: i32, input: &WorkloadInput<'_>) -> apps::Deployment {
        let selector = deployment_selector(name);
        let mut template = self.pod_template(input, "Always");
        template
            .metadata
            .get_or_insert_with(ObjectMeta::default)
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(selector.clone());
        apps::Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(workload_labels(input.owner, &input.task.name)),
                ..ObjectMeta::default()
            },
            spec: Some(apps::DeploymentSpec {
                replicas: Some(replicas),
                selector: LabelSelector {
                    match_labels: Some(selector),
                    ..LabelSelector::default()
                },
                template,
                ..apps::DeploymentSpec::default()
            }),
            ..apps::Deployment::default()
        }
    }
}

fn repo_mount() -> VolumeMount {
    VolumeMount {
        name: REPO_VOLUME.to_string(),
        mount_path: REPO_MOUNT_PATH.to_string(),
        ..VolumeMount::default()
    }
}

/// Returns the `owner` and `task-name` labels.
#[must_use]
pub fn workload_labels(owner: &str, task: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (OWNER_LABEL.to_string(), owner.to_string()),
        (TASK_LABEL.to_string(), task.to_string()),
    ])
}

/// Returns the pod selector of deployment `name`.
#[must_use]
pub fn deployment_selector(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(DEPLOYMENT_NAME_LABEL.to_string(), name.to_string())])
}

/// Reads a label from object metadata.
pub(crate) fn label(meta: Option<&ObjectMeta>, key: &str) -> String {
    meta.and_then(|m| m.labels.as_ref())
        .and_then(|labels| labels.get(key))
        .cloned()
        .unwrap_or_default()
}

/// Recovers the raw `EXTRA_VARS` value from a compiled pod template.
pub(crate) fn read_extra_vars(template: &PodTemplateSpec) -> Option<String> {
    template
        .spec
        .as_ref()?
        .containers
        .iter()
        .filter_map(|c| c.env.as_ref())
        .flatten()
        .find(|var| var.name == EXTRA_VARS_ENV)
        .and_then(|var| var.value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> Runner {
        Runner::new("python", "python:3.12", "https://github.com/org/scripts.git")
            .with_branch("dev")
    }

    fn task() -> Task {
        Task::new("hello", "python", "python hello.py")
    }

    fn compiler() -> SpecCompiler {
        SpecCompiler::new(&EngineConfig::default())
    }

    fn input<'a>(
        runner: &'a Runner,
        task: &'a Task,
        extra: Option<&'a str>,
        token: Option<&'a str>,
    ) -> WorkloadInput<'a> {
        WorkloadInput {
            runner,
            task,
            owner: "alice",
            extra_vars: extra,
            git_token: token,
        }
    }

    fn main_container(template: &PodTemplateSpec) -> Container {
        template
            .spec
            .as_ref()
            .and_then(|s| s.containers.first())
            .cloned()
            .unwrap_or_default()
    }

    #[test]
    fn job_wraps_template_with_generated_name() {
        let (r, t) = (runner(), task());
        let job = compiler().job(&input(&r, &t, None, None));
        assert_eq!(job.metadata.generate_name.as_deref(), Some("hello-"));
        let spec = job.spec.unwrap_or_default();
        assert_eq!(spec.backoff_limit, Some(1));
        assert_eq!(spec.ttl_seconds_after_finished, Some(3600));
        let pod = spec.template.spec.unwrap_or_default();
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod.volumes.map(|v| v.len()), Some(2));
    }

    #[test]
    fn init_container_clones_branch_with_token() {
        let (r, t) = (runner(), task());
        let template = compiler().pod_template(&input(&r, &t, None, Some("tok")), "Never");
        let init = template
            .spec
            .and_then(|s| s.init_containers)
            .and_then(|c| c.into_iter().next())
            .unwrap_or_default();
        assert_eq!(init.name, "init-hello");
        assert_eq!(init.image.as_deref(), Some("bitnami/git"));
        assert_eq!(
            init.command.unwrap_or_default()[2],
            "git clone -b dev https://tok:@github.com/org/scripts.git ."
        );
    }

    #[test]
    fn main_container_runs_command_with_secret() {
        let (r, t) = (runner(), task());
        let template = compiler().pod_template(&input(&r, &t, None, None), "Never");
        let main = main_container(&template);
        assert_eq!(main.name, "hello");
        assert_eq!(main.image.as_deref(), Some("python:3.12"));
        assert_eq!(
            main.command.clone().unwrap_or_default(),
            vec!["sh", "-c", "python hello.py"]
        );
        assert_eq!(main.working_dir.as_deref(), Some("/mnt/repo"));
        assert!(main.env.is_none());
        let secret_ref = main
            .env_from
            .as_ref()
            .and_then(|e| e.first())
            .and_then(|e| e.secret_ref.as_ref());
        assert_eq!(secret_ref.map(|s| s.name.as_str()), Some("hello"));
        assert_eq!(secret_ref.and_then(|s| s.optional), Some(true));
    }

    #[test]
    fn extra_vars_only_when_present() {
        let (r, t) = (runner(), task());
        let c = compiler();
        let with = c.pod_template(&input(&r, &t, Some(r#"{"a":1}"#), None), "Never");
        assert_eq!(read_extra_vars(&with).as_deref(), Some(r#"{"a":1}"#));
        let blank = c.pod_template(&input(&r, &t, Some("  "), None), "Never");
        assert!(read_extra_vars(&blank).is_none());
    }

    #[test]
    fn cron_job_and_deployment_carry_labels() {
        let (r, t) = (runner(), task());
        let c = compiler();
        let cron = c.cron_job("nightly", "0 1 * * *", true, &input(&r, &t, None, None));
        assert_eq!(label(Some(&cron.metadata), TASK_LABEL), "hello");
        let spec = cron.spec.unwrap_or_default();
        assert_eq!(spec.schedule, "0 1 * * *");
        assert_eq!(spec.suspend, Some(true));

        let deploy = c.deployment("web", 3, &input(&r, &t, None, None));
        let spec = deploy.spec.unwrap_or_default();
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(label(spec.template.metadata.as_ref(), OWNER_LABEL), "alice");
        assert_eq!(
            spec.template.spec.and_then(|s| s.restart_policy).as_deref(),
            Some("Always")
        );
    }

    #[test]
    fn deployment_selector_ignores_owner_and_task() {
        let r = runner();
        let (first, second) = (task(), Task::new("goodbye", "python", "python bye.py"));
        let c = compiler();
        let created = c.deployment("web", 1, &input(&r, &first, None, None));
        let mut by_bob = input(&r, &second, None, None);
        by_bob.owner = "bob";
        let updated = c.deployment("web", 2, &by_bob);

        let selector = |d: &apps::Deployment| {
            d.spec.as_ref().and_then(|s| s.selector.match_labels.clone()).unwrap_or_default()
        };
        assert_eq!(selector(&created), selector(&updated));
        assert_eq!(selector(&created), deployment_selector("web"));

        let template = updated.spec.unwrap_or_default().template;
        assert_eq!(label(template.metadata.as_ref(), DEPLOYMENT_NAME_LABEL), "web");
        assert_eq!(label(template.metadata.as_ref(), OWNER_LABEL), "bob");
        assert_eq!(label(template.metadata.as_ref(), TASK_LABEL), "goodbye");
    }
}
