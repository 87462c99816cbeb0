//! Scheduled task invocations.

use std::str::FromStr;

use k8s_openapi::api::batch::v1 as batch;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use kriten_core::ResourceName;

use crate::compile::{label, read_extra_vars};
use crate::error::{Error, Result};
use crate::k8s::{OWNER_LABEL, TASK_LABEL};

/// A task run on a cron schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronJob {
    /// Unique cron job name.
    #[serde(alias = "id")]
    pub name: String,
    /// User the runs are attributed to.
    #[serde(default)]
    pub owner: String,
    /// Task to run.
    pub task: String,
    /// Five-field cron expression or an `@` macro.
    pub schedule: String,
    /// Suspends scheduling while true.
    #[serde(default, alias = "disable")]
    pub disabled: bool,
    /// Input passed to every run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_vars: Option<Map<String, Value>>,
}

impl CronJob {
    /// Checks name, task and schedule.
    ///
    /// # Errors
    ///
    /// Returns a validation error if any of them is malformed.
    pub fn validate_shape(&self) -> Result<()> {
        ResourceName::new(&self.name)?;
        if self.task.trim().is_empty() {
            return Err(Error::validation("cron job task must not be empty"));
        }
        validate_schedule(&self.schedule)
    }

    /// Returns the input as raw JSON text, or `None` when there is none.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the input cannot be encoded.
    pub fn extra_vars_json(&self) -> Result<Option<String>> {
        encode_extra_vars(self.extra_vars.as_ref())
    }

    /// Reads the definition back from an orchestrator cron job.
    #[must_use]
    pub fn from_k8s(cron: &batch::CronJob) -> Self {
        let spec = cron.spec.as_ref();
        let template = spec
            .and_then(|s| s.job_template.spec.as_ref())
            .map(|s| &s.template);
        Self {
            name: cron.metadata.name.clone().unwrap_or_default(),
            owner: label(Some(&cron.metadata), OWNER_LABEL),
            task: label(Some(&cron.metadata), TASK_LABEL),
            schedule: spec.map(|s| s.schedule.clone()).unwrap_or_default(),
            disabled: spec.and_then(|s| s.suspend).unwrap_or(false),
            extra_vars: template.and_then(read_extra_vars).and_then(|raw| decode_extra_vars(&raw)),
        }
    }
}

/// Validates a cron expression as the orchestrator accepts it.
///
/// # Errors
///
/// Returns a validation error for anything other than five fields or an
/// `@` macro that the cron parser accepts.
pub fn validate_schedule(schedule: &str) -> Result<()> {
    let schedule = schedule.trim();
    if schedule.is_empty() {
        return Err(Error::validation("schedule must not be empty"));
    }
    let normalized = if schedule.starts_with('@') {
        schedule.to_string()
    } else {
        if schedule.split_whitespace().count() != 5 {
            return Err(Error::validation(
                "schedule must have 5 fields (minute hour day-of-month month day-of-week)",
            ));
        }
        format!("0 {schedule}")
    };
    cron::Schedule::from_str(&normalized)
        .map(|_| ())
        .map_err(|e| Error::validation_with_details("invalid schedule", vec![e.to_string()]))
}

pub(crate) fn encode_extra_vars(vars: Option<&Map<String, Value>>) -> Result<Option<String>> {
    match vars {
        Some(vars) if !vars.is_empty() => Ok(Some(serde_json::to_string(vars)?)),
        _ => Ok(None),
    }
}

pub(crate) fn decode_extra_vars(raw: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str(raw) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{SpecCompiler, WorkloadInput};
    use crate::config::EngineConfig;
    use crate::runner::Runner;
    use crate::task::Task;
    use serde_json::json;

    fn cron(schedule: &str) -> CronJob {
        CronJob {
            name: "nightly".into(),
            owner: "alice".into(),
            task: "backup".into(),
            schedule: schedule.into(),
            disabled: false,
            extra_vars: None,
        }
    }

    #[test]
    fn accepts_five_fields_and_macros() {
        assert!(validate_schedule("*/5 * * * *").is_ok());
        assert!(validate_schedule("0 1 * * 1-5").is_ok());
        assert!(validate_schedule("@hourly").is_ok());
    }

    #[test]
    fn rejects_bad_schedules() {
        assert!(validate_schedule("").is_err());
        assert!(validate_schedule("* * *").is_err());
        assert!(validate_schedule("0 0 1 * * *").is_err());
        assert!(validate_schedule("61 * * * *").is_err());
    }

    #[test]
    fn shape_checks_name_and_task() {
        assert!(cron("@daily").validate_shape().is_ok());
        let mut bad = cron("@daily");
        bad.name = "Nightly".into();
        assert!(bad.validate_shape().unwrap_err().is_validation());
        let mut bad = cron("@daily");
        bad.task = String::new();
        assert!(bad.validate_shape().is_err());
    }

    #[test]
    fn accepts_legacy_field_aliases() -> Result<()> {
        let parsed: CronJob = serde_json::from_value(json!({
            "id": "nightly",
            "task": "backup",
            "schedule": "@daily",
            "disable": true,
        }))?;
        assert_eq!(parsed.name, "nightly");
        assert!(parsed.disabled);
        Ok(())
    }

    #[test]
    fn reads_back_from_compiled_object() -> Result<()> {
        let runner = Runner::new("py", "python:3", "https://x/r.git");
        let task = Task::new("backup", "py", "python backup.py");
        let mut def = cron("0 2 * * *");
        def.disabled = true;
        def.extra_vars = Some(json!({"target": "s3"}).as_object().cloned().unwrap_or_default());
        let raw = def.extra_vars_json()?;

        let compiled = SpecCompiler::new(&EngineConfig::default()).cron_job(
            &def.name,
            &def.schedule,
            def.disabled,
            &WorkloadInput {
                runner: &runner,
                task: &task,
                owner: &def.owner,
                extra_vars: raw.as_deref(),
                git_token: None,
            },
        );
        assert_eq!(CronJob::from_k8s(&compiled), def);
        Ok(())
    }

    #[test]
    fn empty_extra_vars_encode_to_none() -> Result<()> {
        assert_eq!(encode_extra_vars(Some(&Map::new()))?, None);
        assert_eq!(encode_extra_vars(None)?, None);
        Ok(())
    }
}
