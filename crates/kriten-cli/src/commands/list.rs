//! Listing commands for runners, tasks and jobs.

use anyhow::Result;
use tabled::{Table, Tabled};

use kriten_core::ResourceKind;
use kriten_engine::job::JobSummary;
use kriten_engine::runner::{Runner, redacted_url};
use kriten_engine::task::TaskSummary;

use super::format_state_colored;
use crate::session::Session;
use crate::{Config, OutputFormat};

#[derive(Tabled)]
struct RunnerRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "Repository")]
    repository: String,
    #[tabled(rename = "Branch")]
    branch: String,
}

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Runner")]
    runner: String,
    #[tabled(rename = "Command")]
    command: String,
}

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "Job ID")]
    id: String,
    #[tabled(rename = "Owner")]
    owner: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Started")]
    started: String,
}

/// Execute the runners command.
///
/// # Errors
///
/// Returns an error if the cluster cannot be reached or a record is unreadable.
pub async fn runners(config: &Config) -> Result<()> {
    let session = Session::connect(config).await?;
    let ids = session.visible(ResourceKind::Runners).await?;
    let runners = session.service.list_runners(&ids).await?;
    println!("{}", render_runners(&runners, &config.format)?);
    Ok(())
}

/// Execute the tasks command.
///
/// # Errors
///
/// Returns an error if the cluster cannot be reached or a record is unreadable.
pub async fn tasks(config: &Config) -> Result<()> {
    let session = Session::connect(config).await?;
    let ids = session.visible(ResourceKind::Tasks).await?;
    let tasks = session.service.list_tasks(&ids).await?;
    println!("{}", render_tasks(&tasks, &config.format)?);
    Ok(())
}

/// Execute the jobs command.
///
/// # Errors
///
/// Returns an error if the cluster cannot be reached.
pub async fn jobs(config: &Config) -> Result<()> {
    let session = Session::connect(config).await?;
    let ids = session.visible(ResourceKind::Jobs).await?;
    let jobs = session.service.list_jobs(&ids).await?;
    println!("{}", render_jobs(&jobs, &config.format)?);
    Ok(())
}

/// Renders runners in the requested format. Clone URLs are shown without credentials.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_runners(runners: &[Runner], format: &OutputFormat) -> Result<String> {
    if runners.is_empty() && !matches!(format, OutputFormat::Json) {
        return Ok("No runners found".to_string());
    }
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(runners)?,
        OutputFormat::Text => runners
            .iter()
            .map(|r| format!("  {} {} ({})", r.name, r.image, r.effective_branch()))
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Table => Table::new(runners.iter().map(|r| RunnerRow {
            name: r.name.clone(),
            image: r.image.clone(),
            repository: redacted_url(&r.git_url),
            branch: r.effective_branch().to_string(),
        }))
        .to_string(),
    })
}

/// Renders task summaries in the requested format.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_tasks(tasks: &[TaskSummary], format: &OutputFormat) -> Result<String> {
    if tasks.is_empty() && !matches!(format, OutputFormat::Json) {
        return Ok("No tasks found".to_string());
    }
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(tasks)?,
        OutputFormat::Text => tasks
            .iter()
            .map(|t| format!("  {} [{}] {}", t.name, t.runner, t.command))
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Table => Table::new(tasks.iter().map(|t| TaskRow {
            name: t.name.clone(),
            runner: t.runner.clone(),
            command: t.command.clone(),
        }))
        .to_string(),
    })
}

/// Renders job summaries in the requested format.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_jobs(jobs: &[JobSummary], format: &OutputFormat) -> Result<String> {
    if jobs.is_empty() && !matches!(format, OutputFormat::Json) {
        return Ok("No jobs found".to_string());
    }
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(jobs)?,
        OutputFormat::Text => jobs
            .iter()
            .map(|j| format!("  {} {} ({})", j.id, format_state_colored(j.state), j.owner))
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Table => Table::new(jobs.iter().map(|j| JobRow {
            id: j.id.clone(),
            owner: j.owner.clone(),
            state: j.state.to_string(),
            started: j
                .start_time
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
        }))
        .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kriten_engine::job::JobState;

    fn summary(id: &str, state: JobState) -> JobSummary {
        JobSummary {
            id: id.to_string(),
            owner: "alice".to_string(),
            start_time: None,
            completion_time: None,
            failed: 0,
            completed: i32::from(state == JobState::Succeeded),
            state,
        }
    }

    #[test]
    fn empty_listings_say_so() {
        assert_eq!(render_tasks(&[], &OutputFormat::Text).unwrap(), "No tasks found");
        assert_eq!(render_jobs(&[], &OutputFormat::Table).unwrap(), "No jobs found");
        assert_eq!(render_runners(&[], &OutputFormat::Json).unwrap(), "[]");
    }

    #[test]
    fn runner_table_hides_credentials() {
        let runner = Runner::new("python", "python:3.12", "https://token@github.com/org/scripts.git");
        let table = render_runners(&[runner], &OutputFormat::Table).unwrap();
        assert!(table.contains("Repository"));
        assert!(table.contains("python:3.12"));
        assert!(!table.contains("token@"));
    }

    #[test]
    fn job_json_uses_camel_case() {
        let json = render_jobs(&[summary("hello-x7k2p", JobState::Succeeded)], &OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["id"], "hello-x7k2p");
        assert_eq!(value[0]["state"], "succeeded");
        assert_eq!(value[0]["completed"], 1);
    }

    #[test]
    fn task_text_lists_runner() {
        let task = TaskSummary {
            name: "hello".into(),
            runner: "python".into(),
            command: "echo hi".into(),
        };
        let text = render_tasks(&[task], &OutputFormat::Text).unwrap();
        assert_eq!(text, "  hello [python] echo hi");
    }
}
