//! Run command - launch a task.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use kriten_engine::config::PollPolicy;
use kriten_engine::executor::{WaitOutcome, wait_for_completion};
use kriten_engine::job::JobLaunch;

use super::result::render_result;
use crate::session::Session;
use crate::{Config, OutputFormat};

/// Arguments for the run command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Task to launch.
    #[arg()]
    pub task: String,

    /// Input passed to the task as `EXTRA_VARS`, as a JSON object.
    #[arg(long)]
    pub vars: Option<String>,

    /// Wait for the job to finish and print its result.
    #[arg(long, short = 'w')]
    pub wait: bool,

    /// Seconds to wait before giving up (with --wait).
    #[arg(long, default_value = "300")]
    pub timeout: u64,
}

impl RunArgs {
    /// Poll policy for `--wait`, reusing the engine's poll interval.
    #[must_use]
    pub fn poll_policy(&self, engine: PollPolicy) -> PollPolicy {
        let deadline = Duration::from_secs(self.timeout).max(engine.interval);
        PollPolicy::new(engine.interval, deadline)
    }
}

/// Execute the run command.
///
/// # Errors
///
/// Returns an error if the task is unknown, the input is rejected, or the
/// cluster cannot be reached.
pub async fn execute(args: RunArgs, config: &Config) -> Result<()> {
    let session = Session::connect(config).await?;
    let mut launch = session
        .service
        .create_job(&session.principal, &args.task, args.vars.as_deref())
        .await
        .with_context(|| format!("failed to launch task '{}'", args.task))?;

    if args.wait && launch.result.is_none() {
        let policy = args.poll_policy(session.engine.sync_poll);
        let outcome = wait_for_completion(session.workloads.as_ref(), &launch.id, &policy).await?;
        if matches!(outcome, WaitOutcome::TimedOut(_)) {
            eprintln!("Job {} still running after {}s", launch.id, args.timeout);
        }
        launch.result = Some(session.service.get_job(&launch.id, None).await?);
    }

    println!("{}", render_launch(&launch, &config.format)?);
    Ok(())
}

/// Renders a launch response.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_launch(launch: &JobLaunch, format: &OutputFormat) -> Result<String> {
    match (&launch.result, format) {
        (_, OutputFormat::Json) => Ok(serde_json::to_string_pretty(launch)?),
        (Some(result), _) => render_result(result, format),
        (None, _) => Ok(format!("Launched job {}", launch.id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(timeout: u64) -> RunArgs {
        RunArgs {
            task: "hello".into(),
            vars: None,
            wait: true,
            timeout,
        }
    }

    #[test]
    fn wait_policy_keeps_engine_interval() {
        let policy = args(30).poll_policy(PollPolicy::default());
        assert_eq!(policy.interval, Duration::from_millis(100));
        assert_eq!(policy.deadline, Duration::from_secs(30));
    }

    #[test]
    fn zero_timeout_still_polls_once() {
        let policy = args(0).poll_policy(PollPolicy::default());
        assert_eq!(policy.deadline, policy.interval);
    }

    #[test]
    fn async_launch_prints_id() {
        let launch = JobLaunch {
            id: "hello-x7k2p".into(),
            result: None,
        };
        assert_eq!(
            render_launch(&launch, &OutputFormat::Text).unwrap(),
            "Launched job hello-x7k2p"
        );
        let json = render_launch(&launch, &OutputFormat::Json).unwrap();
        assert!(json.contains("\"id\": \"hello-x7k2p\""));
        assert!(!json.contains("result"));
    }
}
