//! # kriten-cli
//!
//! Operator command-line interface for the Kriten engine.
//!
//! ## Commands
//!
//! - `kriten runners` - List runners
//! - `kriten tasks` - List tasks
//! - `kriten jobs` - List jobs
//! - `kriten run <task>` - Launch a task, optionally waiting for the result
//! - `kriten logs <job>` - Print aggregated job logs
//! - `kriten result <job>` - Print the structured job result
//! - `kriten schema <task>` - Print a task's input schema
//!
//! ## Configuration
//!
//! The CLI talks to the cluster with the caller's kubeconfig and reads engine
//! settings from `KRITEN_*` environment variables:
//!
//! - `KRITEN_NAMESPACE` - Namespace holding runners, tasks and jobs
//! - `KRITEN_USER` - Owner recorded on launched jobs

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod commands;
pub mod session;

use clap::{Parser, Subcommand};

/// Kriten CLI - operate the task execution engine.
#[derive(Debug, Parser)]
#[command(name = "kriten")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Namespace holding runners, tasks and workloads.
    #[arg(long, short = 'n', env = "KRITEN_NAMESPACE")]
    pub namespace: Option<String>,

    /// User recorded as the owner of launched jobs.
    #[arg(long, env = "KRITEN_USER", default_value = "kriten-cli")]
    pub user: String,

    /// Output format.
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        Config {
            namespace: self.namespace.clone(),
            user: self.user.clone(),
            format: self.format.clone(),
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List runners.
    Runners,
    /// List tasks.
    Tasks,
    /// List jobs.
    Jobs,
    /// Launch a task.
    Run(commands::run::RunArgs),
    /// Print aggregated job logs.
    Logs(commands::JobArgs),
    /// Print the structured result of a job.
    Result(commands::JobArgs),
    /// Print a task's input schema.
    Schema(commands::schema::SchemaArgs),
}

/// Output format.
#[derive(Debug, Clone, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
    /// Table output.
    Table,
}

/// CLI configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Namespace override; falls back to `KRITEN_NAMESPACE` handling in the engine.
    pub namespace: Option<String>,
    /// Owner of launched jobs.
    pub user: String,
    /// Output format.
    pub format: OutputFormat,
}
