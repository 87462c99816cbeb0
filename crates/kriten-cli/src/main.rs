//! Kriten CLI - operate the task execution engine.
//!
//! The main entry point for the `kriten` CLI binary.

use anyhow::Result;
use clap::Parser;

use kriten_cli::{Cli, Commands, commands};
use kriten_core::{LogFormat, init_logging};

fn main() -> Result<()> {
    let log_format = std::env::var("KRITEN_LOG_FORMAT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(LogFormat::Pretty);
    init_logging(log_format);

    let cli = Cli::parse();
    let config = cli.config();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match cli.command {
            Commands::Runners => commands::list::runners(&config).await,
            Commands::Tasks => commands::list::tasks(&config).await,
            Commands::Jobs => commands::list::jobs(&config).await,
            Commands::Run(args) => commands::run::execute(args, &config).await,
            Commands::Logs(args) => commands::logs::execute(&args, &config).await,
            Commands::Result(args) => commands::result::execute(&args, &config).await,
            Commands::Schema(args) => commands::schema::execute(&args, &config).await,
        }
    })
}
