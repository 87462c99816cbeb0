//! Result command - print a job's status and structured result.

use std::fmt::Write as _;

use anyhow::Result;
use owo_colors::OwoColorize;
use tabled::{Table, Tabled};

use kriten_engine::job::JobResult;

use super::{JobArgs, format_state_colored};
use crate::session::Session;
use crate::{Config, OutputFormat};

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

/// Execute the result command.
///
/// # Errors
///
/// Returns an error if the job is unknown or the cluster cannot be reached.
pub async fn execute(args: &JobArgs, config: &Config) -> Result<()> {
    let session = Session::connect(config).await?;
    let result = session
        .service
        .get_job(&args.job_id, args.owner.as_deref())
        .await?;
    println!("{}", render_result(&result, &config.format)?);
    Ok(())
}

/// Renders a job envelope. Text output omits the logs; use `kriten logs` for those.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_result(result: &JobResult, format: &OutputFormat) -> Result<String> {
    let summary = &result.summary;
    let data = result
        .json_data
        .as_ref()
        .map(serde_json::to_string_pretty)
        .transpose()?;

    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Text => {
            let mut out = String::new();
            writeln!(out, "Job: {}", summary.id)?;
            writeln!(out, "Owner: {}", summary.owner)?;
            writeln!(out, "State: {}", format_state_colored(summary.state))?;
            if let Some(started) = summary.start_time {
                writeln!(out, "Started: {started}")?;
            }
            if let Some(completed) = summary.completion_time {
                writeln!(out, "Completed: {completed}")?;
            }
            if let Some(error) = &result.error {
                writeln!(out, "Error: {}", error.red())?;
            }
            if let Some(data) = data {
                writeln!(out, "Data:")?;
                write!(out, "{data}")?;
            }
            Ok(out.trim_end().to_string())
        }
        OutputFormat::Table => {
            let mut rows = vec![
                FieldRow { field: "Job ID", value: summary.id.clone() },
                FieldRow { field: "Owner", value: summary.owner.clone() },
                FieldRow { field: "State", value: summary.state.to_string() },
                FieldRow { field: "Completed", value: summary.completed.to_string() },
                FieldRow { field: "Failed", value: summary.failed.to_string() },
            ];
            if let Some(error) = &result.error {
                rows.push(FieldRow { field: "Error", value: error.clone() });
            }
            if let Some(data) = data {
                rows.push(FieldRow { field: "Data", value: data });
            }
            Ok(Table::new(rows).to_string())
        }
    }
}
