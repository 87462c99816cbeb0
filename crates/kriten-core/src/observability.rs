//! Observability infrastructure for Kriten.
//!
//! Structured logging with consistent spans. Secrets and token-bearing clone
//! URLs never appear in span fields.

use std::str::FromStr;
use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::Error;

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(Error::InvalidInput(format!(
                "unknown log format '{other}', expected 'json' or 'pretty'"
            ))),
        }
    }
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `kriten_engine=debug`)
///
/// # Example
///
/// ```rust
/// use kriten_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for catalog operations on runners and tasks.
///
/// # Example
///
/// ```rust
/// use kriten_core::observability::catalog_span;
///
/// let span = catalog_span("create", "task", "hello-world");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn catalog_span(operation: &str, kind: &str, name: &str) -> Span {
    tracing::info_span!("catalog", op = operation, kind = kind, name = name)
}

/// Creates a span for a workload invocation.
///
/// The job id is recorded later with `span.record("job_id", ..)` once the
/// orchestrator has generated it.
#[must_use]
pub fn invocation_span(operation: &str, task: &str, owner: &str) -> Span {
    tracing::info_span!(
        "invocation",
        op = operation,
        task = task,
        owner = owner,
        job_id = tracing::field::Empty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_succeeds() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Json);
    }

    #[test]
    fn log_format_parses() {
        assert_eq!("json".parse::<LogFormat>().ok(), Some(LogFormat::Json));
        assert_eq!(" Pretty ".parse::<LogFormat>().ok(), Some(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn spans_accept_late_job_id() {
        let span = invocation_span("create_job", "hello", "alice");
        span.record("job_id", "hello-abcde");
        let _guard = span.enter();
        tracing::info!("invocation message");

        let span = catalog_span("delete", "runner", "python");
        let _guard = span.enter();
    }
}
