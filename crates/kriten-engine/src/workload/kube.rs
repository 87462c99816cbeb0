//! Workload API backed by a live cluster.

use ::kube::api::{DeleteParams, ListParams, LogParams, PostParams};
use ::kube::{Api, Client};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::Pod;

use super::WorkloadApi;
use crate::catalog::WriteOp;
use crate::error::{Error, Result};
use crate::k8s::map_kube_error;

/// [`WorkloadApi`] over namespaced cluster APIs.
#[derive(Clone)]
pub struct KubeWorkloads {
    jobs: Api<Job>,
    cron_jobs: Api<CronJob>,
    deployments: Api<Deployment>,
    pods: Api<Pod>,
}

impl std::fmt::Debug for KubeWorkloads {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeWorkloads").finish_non_exhaustive()
    }
}

impl KubeWorkloads {
    /// Creates workload APIs for `namespace`.
    #[must_use]
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            jobs: Api::namespaced(client.clone(), namespace),
            cron_jobs: Api::namespaced(client.clone(), namespace),
            deployments: Api::namespaced(client.clone(), namespace),
            pods: Api::namespaced(client, namespace),
        }
    }
}

fn selector(selector: &str) -> ListParams {
    ListParams::default().labels(selector)
}

fn object_name(meta_name: Option<&String>, resource_type: &'static str) -> Result<String> {
    meta_name
        .cloned()
        .ok_or_else(|| Error::validation(format!("{resource_type} has no name")))
}

#[async_trait]
impl WorkloadApi for KubeWorkloads {
    async fn create_job(&self, job: &Job) -> Result<Job> {
        let name = job
            .metadata
            .generate_name
            .as_deref()
            .or(job.metadata.name.as_deref())
            .unwrap_or_default();
        self.jobs
            .create(&PostParams::default(), job)
            .await
            .map_err(|e| map_kube_error(e, "job", name))
    }

    async fn get_job(&self, name: &str) -> Result<Job> {
        self.jobs
            .get(name)
            .await
            .map_err(|e| map_kube_error(e, "job", name))
    }

    async fn list_jobs(&self, label_selector: &str) -> Result<Vec<Job>> {
        let list = self
            .jobs
            .list(&selector(label_selector))
            .await
            .map_err(|e| map_kube_error(e, "job", label_selector))?;
        Ok(list.items)
    }

    async fn delete_job(&self, name: &str) -> Result<()> {
        self.jobs
            .delete(name, &DeleteParams::background())
            .await
            .map_err(|e| map_kube_error(e, "job", name))?;
        Ok(())
    }

    async fn apply_cron_job(&self, cron_job: &CronJob, op: WriteOp) -> Result<CronJob> {
        let name = object_name(cron_job.metadata.name.as_ref(), "cronjob")?;
        let params = PostParams::default();
        match op {
            WriteOp::Create => self.cron_jobs.create(&params, cron_job).await,
            WriteOp::Update => self.cron_jobs.replace(&name, &params, cron_job).await,
        }
        .map_err(|e| map_kube_error(e, "cronjob", &name))
    }

    async fn get_cron_job(&self, name: &str) -> Result<CronJob> {
        self.cron_jobs
            .get(name)
            .await
            .map_err(|e| map_kube_error(e, "cronjob", name))
    }

    async fn list_cron_jobs(&self, label_selector: &str) -> Result<Vec<CronJob>> {
        let list = self
            .cron_jobs
            .list(&selector(label_selector))
            .await
            .map_err(|e| map_kube_error(e, "cronjob", label_selector))?;
        Ok(list.items)
    }

    async fn delete_cron_job(&self, name: &str) -> Result<()> {
        self.cron_jobs
            .delete(name, &DeleteParams::background())
            .await
            .map_err(|e| map_kube_error(e, "cronjob", name))?;
        Ok(())
    }

    async fn apply_deployment(&self, deployment: &Deployment, op: WriteOp) -> Result<Deployment> {
        let name = object_name(deployment.metadata.name.as_ref(), "deployment")?;
        let params = PostParams::default();
        match op {
            WriteOp::Create => self.deployments.create(&params, deployment).await,
            WriteOp::Update => self.deployments.replace(&name, &params, deployment).await,
        }
        .map_err(|e| map_kube_error(e, "deployment", &name))
    }

    async fn get_deployment(&self, name: &str) -> Result<Deployment> {
        self.deployments
            .get(name)
            .await
            .map_err(|e| map_kube_error(e, "deployment", name))
    }

    async fn list_deployments(&self, label_selector: &str) -> Result<Vec<Deployment>> {
        let list = self
            .deployments
            .list(&selector(label_selector))
            .await
            .map_err(|e| map_kube_error(e, "deployment", label_selector))?;
        Ok(list.items)
    }

    async fn delete_deployment(&self, name: &str) -> Result<()> {
        self.deployments
            .delete(name, &DeleteParams::background())
            .await
            .map_err(|e| map_kube_error(e, "deployment", name))?;
        Ok(())
    }

    async fn list_pods(&self, label_selector: &str) -> Result<Vec<Pod>> {
        let list = self
            .pods
            .list(&selector(label_selector))
            .await
            .map_err(|e| map_kube_error(e, "pod", label_selector))?;
        Ok(list.items)
    }

    async fn pod_logs(&self, pod: &str, container: &str) -> Result<String> {
        let params = LogParams {
            container: Some(container.to_string()),
            ..LogParams::default()
        };
        self.pods
            .logs(pod, &params)
            .await
            .map_err(|e| map_kube_error(e, "pod", pod))
    }
}
