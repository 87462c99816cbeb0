//! Long-running task deployments.

use k8s_openapi::api::apps::v1 as apps;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use kriten_core::ResourceName;

use crate::compile::{label, read_extra_vars};
use crate::cronjob::{decode_extra_vars, encode_extra_vars};
use crate::error::{Error, Result};
use crate::k8s::{OWNER_LABEL, TASK_LABEL};

/// A task kept running with a fixed number of replicas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique deployment name.
    pub name: String,
    /// User the deployment is attributed to.
    #[serde(default)]
    pub owner: String,
    /// Task to run.
    pub task: String,
    /// Desired replica count.
    pub replicas: i32,
    /// Input passed to every replica.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_vars: Option<Map<String, Value>>,
}

impl Deployment {
    /// Checks name, task and replica count.
    ///
    /// # Errors
    ///
    /// Returns a validation error if any of them is malformed.
    pub fn validate_shape(&self) -> Result<()> {
        ResourceName::new(&self.name)?;
        if self.task.trim().is_empty() {
            return Err(Error::validation("deployment task must not be empty"));
        }
        if self.replicas < 0 {
            return Err(Error::validation("replicas must not be negative"));
        }
        Ok(())
    }

    /// Returns the input as raw JSON text, or `None` when there is none.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the input cannot be encoded.
    pub fn extra_vars_json(&self) -> Result<Option<String>> {
        encode_extra_vars(self.extra_vars.as_ref())
    }

    /// Reads the definition back from an orchestrator deployment.
    #[must_use]
    pub fn from_k8s(deployment: &apps::Deployment) -> Self {
        let spec = deployment.spec.as_ref();
        let template_meta = spec.and_then(|s| s.template.metadata.as_ref());
        Self {
            name: deployment.metadata.name.clone().unwrap_or_default(),
            owner: label(template_meta, OWNER_LABEL),
            task: label(template_meta, TASK_LABEL),
            replicas: spec.and_then(|s| s.replicas).unwrap_or(1),
            extra_vars: spec
                .and_then(|s| read_extra_vars(&s.template))
                .and_then(|raw| decode_extra_vars(&raw)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{SpecCompiler, WorkloadInput};
    use crate::config::EngineConfig;
    use crate::runner::Runner;
    use crate::task::Task;

    fn deployment(replicas: i32) -> Deployment {
        Deployment {
            name: "web".into(),
            owner: "bob".into(),
            task: "serve".into(),
            replicas,
            extra_vars: None,
        }
    }

    #[test]
    fn negative_replicas_rejected() {
        assert!(deployment(-1).validate_shape().is_err());
        assert!(deployment(0).validate_shape().is_ok());
    }

    #[test]
    fn reads_back_from_compiled_object() {
        let runner = Runner::new("py", "python:3", "https://x/r.git");
        let task = Task::new("serve", "py", "python -m http.server");
        let def = deployment(2);
        let compiled = SpecCompiler::new(&EngineConfig::default()).deployment(
            &def.name,
            def.replicas,
            &WorkloadInput {
                runner: &runner,
                task: &task,
                owner: &def.owner,
                extra_vars: None,
                git_token: None,
            },
        );
        assert_eq!(Deployment::from_k8s(&compiled), def);
    }
}
