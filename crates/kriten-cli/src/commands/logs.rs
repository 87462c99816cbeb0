//! Logs command - print aggregated job logs.

use anyhow::Result;

use super::JobArgs;
use crate::session::Session;
use crate::{Config, OutputFormat};

/// Execute the logs command.
///
/// # Errors
///
/// Returns an error if the job has no pods or the cluster cannot be reached.
pub async fn execute(args: &JobArgs, config: &Config) -> Result<()> {
    let session = Session::connect(config).await?;
    let logs = session
        .service
        .get_job_log(&args.job_id, args.owner.as_deref())
        .await?;

    match config.format {
        OutputFormat::Json => {
            let body = serde_json::json!({ "id": args.job_id, "stdout": logs });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text | OutputFormat::Table => print!("{logs}"),
    }
    Ok(())
}
