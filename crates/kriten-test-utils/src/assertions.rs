//! Custom assertion helpers for integration tests.

use kriten_core::{AuditAction, AuditStatus, TestAuditSink};
use kriten_engine::job::{JobResult, JobState};

/// Asserts that a job succeeded.
///
/// # Panics
///
/// Panics if the job did not complete successfully.
pub fn assert_job_succeeded(result: &JobResult) {
    assert_eq!(
        result.summary.state,
        JobState::Succeeded,
        "Expected job {} to succeed, but state was {:?}",
        result.summary.id,
        result.summary.state
    );
    assert!(result.summary.completed > 0, "Expected completed > 0");
}

/// Asserts that the last audit event has the given action, target and status.
///
/// # Panics
///
/// Panics if no event was recorded or the last one differs.
pub fn assert_last_audit(sink: &TestAuditSink, action: AuditAction, target: &str, status: AuditStatus) {
    let event = sink.last().expect("an audit event was recorded");
    assert_eq!(event.action, action, "unexpected audit action");
    assert_eq!(event.target, target, "unexpected audit target");
    assert_eq!(event.status, status, "unexpected audit status");
}
