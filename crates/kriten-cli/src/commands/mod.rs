//! CLI command implementations.

pub mod list;
pub mod logs;
pub mod result;
pub mod run;
pub mod schema;

use clap::Args;
use owo_colors::OwoColorize;

use kriten_engine::job::JobState;

/// Arguments shared by commands that address one job.
#[derive(Debug, Args)]
pub struct JobArgs {
    /// Job ID, as printed by `kriten run`.
    #[arg()]
    pub job_id: String,

    /// Only show the job if it was launched by this user.
    #[arg(long)]
    pub owner: Option<String>,
}

pub(crate) fn format_state_colored(state: JobState) -> String {
    let label = state.to_string();
    match state {
        JobState::Succeeded => label.green().to_string(),
        JobState::Failed => label.red().to_string(),
        JobState::Running => label.blue().to_string(),
        JobState::Submitted => label.yellow().to_string(),
    }
}
