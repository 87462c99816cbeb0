//! Job logs and the `^JSON` result protocol.
//!
//! A task reports a structured result by printing it between two `^JSON`
//! markers anywhere in its output:
//!
//! ```text
//! start
//! ^JSON{"x": 1}^JSON
//! end
//! ```
//!
//! The span between the first marker and the next one is the candidate. Every
//! newline and every backslash is stripped from it before parsing. A candidate
//! that does not parse yields `{"error": "failed to parse JSON"}` rather than
//! an error.

use std::fmt::Write as _;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::k8s::{JOB_NAME_LABEL, OWNER_LABEL};
use crate::metrics::EngineMetrics;
use crate::workload::WorkloadApi;

/// Marker opening and closing an embedded result.
pub const JSON_MARKER: &str = "^JSON";
/// Message stored in place of a result that does not parse.
pub const PARSE_ERROR: &str = "failed to parse JSON";
/// Message returned when a job has no pods.
pub const NO_PODS: &str = "no pods found - check job ID";
/// Message for an init container that exited non-zero.
pub const CLONE_FAILED: &str = "failed to clone repo: wrong repo url or incorrect credentials";

const IMAGE_PULL_REASONS: [&str; 3] = ["ErrImagePull", "ImagePullBackOff", "InvalidImageName"];

/// Outcome of scanning logs for an embedded result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// No complete `^JSON ... ^JSON` span.
    Absent,
    /// The span parsed as JSON.
    Parsed(Value),
    /// The span did not parse.
    Malformed,
}

impl Extraction {
    /// Returns the value stored in `json_data`.
    #[must_use]
    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Absent => None,
            Self::Parsed(value) => Some(value),
            Self::Malformed => Some(json!({ "error": PARSE_ERROR })),
        }
    }

    /// Returns the metrics label for this outcome.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Parsed(_) => "parsed",
            Self::Malformed => "malformed",
        }
    }
}

/// Returns the stripped span between the first two `^JSON` markers.
#[must_use]
pub fn extract_candidate(text: &str) -> Option<String> {
    let (_, rest) = text.split_once(JSON_MARKER)?;
    let (span, _) = rest.split_once(JSON_MARKER)?;
    Some(span.replace(['\n', '\\'], ""))
}

/// Scans `text` for an embedded result.
#[must_use]
pub fn extract_result(text: &str) -> Extraction {
    match extract_candidate(text) {
        None => Extraction::Absent,
        Some(candidate) => serde_json::from_str(&candidate)
            .map_or(Extraction::Malformed, Extraction::Parsed),
    }
}

/// Builds the pod selector for a job, optionally restricted to one owner.
#[must_use]
pub fn pod_selector(job_id: &str, owner: Option<&str>) -> String {
    match owner.filter(|o| !o.is_empty()) {
        Some(owner) => format!("{JOB_NAME_LABEL}={job_id},{OWNER_LABEL}={owner}"),
        None => format!("{JOB_NAME_LABEL}={job_id}"),
    }
}

fn waiting_reason(status: &ContainerStatus) -> Option<&str> {
    status
        .state
        .as_ref()
        .and_then(|s| s.waiting.as_ref())
        .and_then(|w| w.reason.as_deref())
}

fn image_pull_failed(status: &ContainerStatus) -> bool {
    waiting_reason(status).is_some_and(|reason| IMAGE_PULL_REASONS.contains(&reason))
}

fn exit_code(status: &ContainerStatus) -> Option<i32> {
    status
        .state
        .as_ref()
        .and_then(|s| s.terminated.as_ref())
        .map(|t| t.exit_code)
}

fn pull_message(status: &ContainerStatus) -> String {
    format!("failed to pull {} image", status.image)
}

/// Explains why a job's containers could not run, if the reason is known.
#[must_use]
pub fn classify_failure(pods: &[Pod]) -> Option<String> {
    for status in pods.iter().filter_map(|p| p.status.as_ref()) {
        for init in status.init_container_statuses.iter().flatten() {
            if image_pull_failed(init) {
                return Some(pull_message(init));
            }
            if exit_code(init).is_some_and(|code| code != 0) {
                return Some(CLONE_FAILED.to_string());
            }
        }
        if let Some(main) = status.container_statuses.iter().flatten().find(|c| image_pull_failed(c)) {
            return Some(pull_message(main));
        }
    }
    None
}

/// Logs and result of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
    /// Section-labelled logs of every container.
    pub stdout: String,
    /// Embedded result.
    pub json_data: Option<Value>,
    /// Classified container failure.
    pub error: Option<String>,
}

/// Resolves a job's pods and reads their logs.
#[derive(Clone)]
pub struct LogExtractor {
    workloads: Arc<dyn WorkloadApi>,
    metrics: EngineMetrics,
}

impl std::fmt::Debug for LogExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogExtractor").finish_non_exhaustive()
    }
}

impl LogExtractor {
    /// Creates an extractor over `workloads`.
    #[must_use]
    pub fn new(workloads: Arc<dyn WorkloadApi>, metrics: EngineMetrics) -> Self {
        Self { workloads, metrics }
    }

    /// Returns the pods of a job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the job has no (visible) pods.
    pub async fn resolve(&self, job_id: &str, owner: Option<&str>) -> Result<Vec<Pod>> {
        let pods = self.workloads.list_pods(&pod_selector(job_id, owner)).await?;
        if pods.is_empty() {
            return Err(Error::not_found("job", NO_PODS));
        }
        Ok(pods)
    }

    /// Concatenates the logs of every init container, then every main
    /// container, of each pod. Containers with no status yet, or still
    /// waiting to start, are skipped.
    ///
    /// # Errors
    ///
    /// Propagates log read failures.
    pub async fn logs(&self, pods: &[Pod]) -> Result<String> {
        let mut out = String::new();
        for pod in pods {
            let pod_name = pod.metadata.name.as_deref().unwrap_or_default();
            let Some(spec) = pod.spec.as_ref() else {
                continue;
            };
            let status = pod.status.as_ref();
            let init_statuses = status.and_then(|s| s.init_container_statuses.as_deref());
            let main_statuses = status.and_then(|s| s.container_statuses.as_deref());

            let containers = spec
                .init_containers
                .iter()
                .flatten()
                .map(|c| (c, init_statuses))
                .chain(spec.containers.iter().map(|c| (c, main_statuses)));

            for (container, statuses) in containers {
                let started = statuses
                    .and_then(|all| all.iter().find(|s| s.name == container.name))
                    .is_some_and(|s| waiting_reason(s).is_none());
                if !started {
                    tracing::debug!(pod = pod_name, container = %container.name, "container not started, skipping logs");
                    continue;
                }
                let text = self.workloads.pod_logs(pod_name, &container.name).await?;
                let _ = writeln!(out, "==> {pod_name}/{} <==", container.name);
                out.push_str(&text);
                if !text.is_empty() && !text.ends_with('\n') {
                    out.push('\n');
                }
            }
        }
        Ok(out)
    }

    /// Reads logs, the embedded result and any classified failure of a job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the job has no pods, and propagates
    /// orchestrator failures.
    pub async fn collect(&self, job_id: &str, owner: Option<&str>) -> Result<JobOutput> {
        let pods = self.resolve(job_id, owner).await?;
        let error = classify_failure(&pods);
        let stdout = self.logs(&pods).await?;
        let extraction = extract_result(&stdout);
        self.metrics.record_extraction(extraction.outcome());
        if let Some(reason) = &error {
            tracing::info!(job_id, reason = %reason, "job containers failed");
        }
        Ok(JobOutput {
            stdout,
            json_data: extraction.into_json(),
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn candidate_is_span_between_markers() {
        assert_eq!(extract_candidate("^JSONfoo^JSON").as_deref(), Some("foo"));
        assert_eq!(extract_candidate("no marker"), None);
        assert_eq!(extract_candidate("^JSONunterminated"), None);
    }

    #[test]
    fn parses_result_between_log_lines() {
        let logs = "start\n^JSON{\"x\":1}^JSON\nend";
        assert_eq!(extract_result(logs), Extraction::Parsed(json!({"x": 1})));
    }

    #[test]
    fn strips_newlines_and_backslashes() {
        let logs = "^JSON{\n\"a\":\n\"b\\c\"}^JSON";
        assert_eq!(extract_result(logs), Extraction::Parsed(json!({"a": "bc"})));
    }

    #[test]
    fn malformed_result_degrades_to_error_object() {
        let extraction = extract_result("^JSONfoo^JSON");
        assert_eq!(extraction.outcome(), "malformed");
        assert_eq!(extraction.into_json(), Some(json!({"error": "failed to parse JSON"})));
    }

    #[test]
    fn only_first_span_counts() {
        let logs = "^JSON[1]^JSON ^JSON[2]^JSON";
        assert_eq!(extract_result(logs), Extraction::Parsed(json!([1])));
    }

    #[test]
    fn selector_includes_owner_when_given() {
        assert_eq!(pod_selector("hello-abcde", None), "job-name=hello-abcde");
        assert_eq!(pod_selector("hello-abcde", Some("")), "job-name=hello-abcde");
        assert_eq!(
            pod_selector("hello-abcde", Some("alice")),
            "job-name=hello-abcde,owner=alice"
        );
    }

    proptest! {
        #[test]
        fn text_without_marker_has_no_result(text in "[^\\^]*") {
            prop_assert_eq!(extract_result(&text), Extraction::Absent);
        }

        #[test]
        fn embedded_object_round_trips(key in "[a-z]{1,8}", value in 0i64..1_000_000, prefix in "[a-z \n]{0,20}") {
            let logs = format!("{prefix}^JSON{{\"{key}\":{value}}}^JSON\ntrailer");
            prop_assert_eq!(extract_result(&logs), Extraction::Parsed(json!({ key: value })));
        }
    }
}
