//! Shared test utilities for Kriten integration tests.
//!
//! This crate provides:
//! - [`TestEngine`]: A service wired to in-memory stores, with handles to each
//! - Factory functions for runners, tasks and schedules
//! - Assertion helpers for job results and audit trails
//!
//! # Example
//!
//! ```rust,ignore
//! use kriten_test_utils::{TestEngine, fixtures};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let engine = TestEngine::with_hello_task().await;
//!     let launch = engine.service.create_job(&engine.admin, "hello", None).await.unwrap();
//!     // ... assert ...
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("kriten_engine=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
