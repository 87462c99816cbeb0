//! Schema command - print a task's input schema.

use anyhow::Result;
use clap::Args;

use crate::Config;
use crate::session::Session;

/// Arguments for the schema command.
#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// Task whose schema to print.
    #[arg()]
    pub task: String,
}

/// Execute the schema command.
///
/// Prints `{}` when the task declares no schema.
///
/// # Errors
///
/// Returns an error if the task is unknown or the cluster cannot be reached.
pub async fn execute(args: &SchemaArgs, config: &Config) -> Result<()> {
    let session = Session::connect(config).await?;
    let schema = session.service.get_schema(&args.task).await?;
    let schema = schema.unwrap_or_else(|| serde_json::json!({}));
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
