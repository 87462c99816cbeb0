//! Job invocations and the envelope returned to callers.
//!
//! ## State Machine
//!
//! ```text
//! Submitted ──► Running ──┬──► Succeeded
//!                         └──► Failed
//! ```
//!
//! Reaping after the TTL is done by the orchestrator and is not a state.

use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::{Job, JobStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::k8s::OWNER_LABEL;

/// Lifecycle state of a job, derived from its orchestrator status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted but not yet started.
    Submitted,
    /// At least one pod has started.
    Running,
    /// A pod completed successfully.
    Succeeded,
    /// A pod failed.
    Failed,
}

impl JobState {
    /// Derives the state from a job status.
    #[must_use]
    pub fn from_status(status: Option<&JobStatus>) -> Self {
        let Some(status) = status else {
            return Self::Submitted;
        };
        if status.succeeded.unwrap_or(0) > 0 {
            Self::Succeeded
        } else if status.failed.unwrap_or(0) > 0 {
            Self::Failed
        } else if status.start_time.is_some() || status.active.unwrap_or(0) > 0 {
            Self::Running
        } else {
            Self::Submitted
        }
    }

    /// Returns true if the job will make no further progress.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Submitted => "submitted",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        })
    }
}

/// Status of one job without logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    /// Orchestrator-generated job name.
    pub id: String,
    /// User that launched the job.
    pub owner: String,
    /// When the first pod started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// When the job completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    /// Number of failed pods.
    pub failed: i32,
    /// Number of succeeded pods.
    pub completed: i32,
    /// Derived lifecycle state.
    pub state: JobState,
}

impl JobSummary {
    /// Builds the summary from an orchestrator job.
    #[must_use]
    pub fn from_job(job: &Job) -> Self {
        let status = job.status.as_ref();
        Self {
            id: job.metadata.name.clone().unwrap_or_default(),
            owner: job
                .metadata
                .labels
                .as_ref()
                .and_then(|labels| labels.get(OWNER_LABEL))
                .cloned()
                .unwrap_or_default(),
            start_time: status.and_then(|s| s.start_time.as_ref()).map(|t| t.0),
            completion_time: status.and_then(|s| s.completion_time.as_ref()).map(|t| t.0),
            failed: status.and_then(|s| s.failed).unwrap_or(0).max(0),
            completed: status.and_then(|s| s.succeeded).unwrap_or(0).max(0),
            state: JobState::from_status(status),
        }
    }

    /// Returns true once a pod has succeeded or failed.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.completed > 0 || self.failed > 0
    }
}

/// Full job envelope: status, logs and the embedded structured result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Job status.
    #[serde(flatten)]
    pub summary: JobSummary,
    /// Aggregated, section-labelled logs of every container.
    pub stdout: String,
    /// Structured result embedded between `^JSON` markers, if any.
    pub json_data: Option<Value>,
    /// Explanation of a classified container failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response to launching a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobLaunch {
    /// Orchestrator-generated job name.
    pub id: String,
    /// Inline result for synchronous tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
}
