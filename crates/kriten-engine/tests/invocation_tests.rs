//! Integration tests for job invocation, synchronous waits and results.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use kriten_core::{AuditAction, AuditStatus};
use kriten_engine::{JOB_NAME_LABEL, Result};
use kriten_engine::catalog::{ConfigStore, Record, WriteOp};
use kriten_engine::config::PollPolicy;
use kriten_engine::job::JobState;
use kriten_engine::task::Task;
use kriten_engine::workload::memory::{ContainerFailure, SimulatedRun};
use kriten_test_utils::{
    TestEngine, assert_job_succeeded, assert_last_audit, hello_task, init_test_logging,
    python_runner, schema_task,
};
use serde_json::json;

#[tokio::test]
async fn async_task_returns_id_without_waiting() -> Result<()> {
    let engine = TestEngine::with_hello_task().await;
    let launch = engine.service.create_job(&engine.admin, "hello", None).await?;

    assert!(launch.id.starts_with("hello-"));
    assert!(launch.result.is_none());
    assert_eq!(engine.workloads.job_count(), 1);
    assert_last_audit(&engine.audit, AuditAction::Launch, "hello", AuditStatus::Success);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn synchronous_task_blocks_until_complete() -> Result<()> {
    init_test_logging();
    let engine = TestEngine::new();
    engine
        .seed(python_runner(), hello_task().synchronous(true))
        .await;
    engine
        .workloads
        .set_next_run(SimulatedRun::succeeds_with("hi\n", 3));

    let launch = engine.service.create_job(&engine.admin, "hello", None).await?;
    let result = launch.result.expect("synchronous tasks return inline");

    assert_job_succeeded(&result);
    assert_eq!(result.summary.completed, 1);
    assert!(result.stdout.contains("hi"));
    assert_eq!(result.summary.owner, "admin");
    assert_eq!(engine.workloads.polls(&launch.id), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn synchronous_timeout_returns_current_status() -> Result<()> {
    let engine = TestEngine::with_poll(PollPolicy::new(
        Duration::from_millis(100),
        Duration::from_secs(1),
    ));
    engine
        .seed(python_runner(), hello_task().synchronous(true))
        .await;
    engine.workloads.set_next_run(SimulatedRun::hangs());

    let started = tokio::time::Instant::now();
    let launch = engine.service.create_job(&engine.admin, "hello", None).await?;
    let result = launch.result.expect("timed out waits still answer");

    assert_eq!(result.summary.state, JobState::Running);
    assert_eq!(result.summary.completed, 0);
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_secs(2));
    Ok(())
}

#[tokio::test]
async fn schema_gates_job_creation() -> Result<()> {
    let engine = TestEngine::new();
    engine
        .seed(
            python_runner(),
            schema_task("pay", json!({"amount": {"type": "integer"}})),
        )
        .await;

    let err = engine
        .service
        .create_job(&engine.admin, "pay", Some(r#"{"amount":"x"}"#))
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(engine.workloads.job_count(), 0);
    assert_last_audit(&engine.audit, AuditAction::Launch, "pay", AuditStatus::Failure);

    let launch = engine
        .service
        .create_job(&engine.admin, "pay", Some(r#"{"amount":5}"#))
        .await?;
    assert!(launch.id.starts_with("pay-"));
    assert!(launch.result.is_none());
    assert_eq!(engine.workloads.job_count(), 1);
    Ok(())
}

#[tokio::test]
async fn malformed_input_is_rejected_without_schema() -> Result<()> {
    let engine = TestEngine::with_hello_task().await;
    let err = engine
        .service
        .create_job(&engine.admin, "hello", Some("{not json"))
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(engine.workloads.mutation_count(), 0);
    Ok(())
}

#[tokio::test]
async fn extra_vars_reach_the_container() -> Result<()> {
    let engine = TestEngine::with_hello_task().await;
    let launch = engine
        .service
        .create_job(&engine.admin, "hello", Some(r#"{"who":"world"}"#))
        .await?;

    let job = engine
        .workloads
        .jobs()
        .into_iter()
        .find(|j| j.metadata.name.as_deref() == Some(launch.id.as_str()))
        .expect("job stored");
    let env = job.spec.unwrap().template.spec.unwrap().containers[0]
        .env
        .clone()
        .unwrap_or_default();
    assert_eq!(env.len(), 1);
    assert_eq!(env[0].name, "EXTRA_VARS");
    assert_eq!(env[0].value.as_deref(), Some(r#"{"who":"world"}"#));
    Ok(())
}

#[tokio::test]
async fn job_data_extracts_embedded_result() -> Result<()> {
    let engine = TestEngine::with_hello_task().await;
    engine
        .workloads
        .set_next_run(SimulatedRun::succeeds_with("start\n^JSON{\"x\":1}^JSON\nend", 0));
    let launch = engine.service.create_job(&engine.admin, "hello", None).await?;

    let result = engine.service.get_job(&launch.id, None).await?;
    assert_eq!(result.json_data, Some(json!({"x": 1})));
    assert_eq!(
        engine.service.get_job_data(&launch.id, Some("admin")).await?,
        Some(json!({"x": 1}))
    );
    Ok(())
}

#[tokio::test]
async fn logs_are_labelled_init_first() -> Result<()> {
    let engine = TestEngine::with_hello_task().await;
    engine
        .workloads
        .set_next_run(SimulatedRun::succeeds_with("hi\n", 0));
    let launch = engine.service.create_job(&engine.admin, "hello", None).await?;

    let logs = engine.service.get_job_log(&launch.id, None).await?;
    let init = logs.find("/init-hello <==").expect("init section");
    let main = logs.find("/hello <==").expect("main section");
    assert!(init < main);
    assert!(logs.ends_with("hi\n"));
    Ok(())
}

#[tokio::test]
async fn pending_pod_yields_empty_logs() -> Result<()> {
    let engine = TestEngine::with_hello_task().await;
    let pod = Pod {
        metadata: ObjectMeta {
            name: Some("hello-abcde-xyz".into()),
            labels: Some(BTreeMap::from([(JOB_NAME_LABEL.to_string(), "hello-abcde".to_string())])),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "hello".into(),
                ..Container::default()
            }],
            ..PodSpec::default()
        }),
        status: None,
    };
    engine.workloads.insert_pod(pod, &[]);

    assert_eq!(engine.service.get_job_log("hello-abcde", None).await?, "");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn synchronous_timeout_with_pending_pod_still_answers() -> Result<()> {
    let engine = TestEngine::with_poll(PollPolicy::new(
        Duration::from_millis(100),
        Duration::from_secs(1),
    ));
    engine
        .seed(python_runner(), hello_task().synchronous(true))
        .await;
    engine.workloads.set_next_run(SimulatedRun::unscheduled());

    let launch = engine.service.create_job(&engine.admin, "hello", None).await?;
    let result = launch.result.expect("timed out waits still answer");

    assert_eq!(result.summary.state, JobState::Running);
    assert!(result.stdout.is_empty());
    assert!(result.json_data.is_none());
    Ok(())
}

#[tokio::test]
async fn unknown_job_has_no_pods() {
    let engine = TestEngine::with_hello_task().await;
    let err = engine.service.get_job_log("hello-zzzzz", None).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("no pods found - check job ID"));
}

#[tokio::test]
async fn owner_filter_hides_other_users_jobs() -> Result<()> {
    let engine = TestEngine::with_hello_task().await;
    let launch = engine.service.create_job(&engine.admin, "hello", None).await?;

    assert!(engine.service.get_job_log(&launch.id, Some("admin")).await.is_ok());
    let err = engine
        .service
        .get_job_log(&launch.id, Some("mallory"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn image_pull_failure_is_explained() -> Result<()> {
    let engine = TestEngine::with_hello_task().await;
    engine
        .workloads
        .set_next_run(SimulatedRun::init_fails(ContainerFailure::ImagePull));
    let launch = engine.service.create_job(&engine.admin, "hello", None).await?;

    let result = engine.service.get_job(&launch.id, None).await?;
    assert_eq!(result.error.as_deref(), Some("failed to pull bitnami/git image"));
    assert_eq!(result.summary.state, JobState::Failed);
    Ok(())
}

#[tokio::test]
async fn clone_failure_is_explained() -> Result<()> {
    let engine = TestEngine::with_hello_task().await;
    engine
        .workloads
        .set_next_run(SimulatedRun::init_fails(ContainerFailure::Exit(128)));
    let launch = engine.service.create_job(&engine.admin, "hello", None).await?;

    let result = engine.service.get_job(&launch.id, None).await?;
    assert_eq!(
        result.error.as_deref(),
        Some("failed to clone repo: wrong repo url or incorrect credentials")
    );
    Ok(())
}

#[tokio::test]
async fn runner_without_image_is_not_found() -> Result<()> {
    let engine = TestEngine::new();
    let bare = Record::from([
        ("name".to_string(), "bare".to_string()),
        ("gitURL".to_string(), "https://github.com/org/scripts.git".to_string()),
    ]);
    engine.catalog.put("bare", bare, WriteOp::Create).await?;
    let task = Task::new("orphan", "bare", "true");
    engine.catalog.put("orphan", task.to_record()?, WriteOp::Create).await?;

    let err = engine
        .service
        .create_job(&engine.admin, "orphan", None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("runner"));
    assert_eq!(engine.workloads.job_count(), 0);
    Ok(())
}

#[tokio::test]
async fn deleted_job_is_gone() -> Result<()> {
    let engine = TestEngine::with_hello_task().await;
    let launch = engine.service.create_job(&engine.admin, "hello", None).await?;
    engine.service.delete_job(&engine.admin, &launch.id).await?;

    assert!(engine.service.get_job(&launch.id, None).await.unwrap_err().is_not_found());
    assert_last_audit(&engine.audit, AuditAction::Delete, &launch.id, AuditStatus::Success);
    Ok(())
}
