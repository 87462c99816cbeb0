//! # kriten-core
//!
//! Shared primitives for the Kriten task execution engine.
//!
//! This crate provides the foundational types and contracts used by every
//! Kriten component:
//!
//! - **Resource Names**: Validated names for runners, tasks and workloads
//! - **Authorization**: The contract the engine consumes to scope listings
//! - **Audit**: Fire-and-forget audit event sinks
//! - **Observability**: Logging initialisation and span helpers
//! - **Error Types**: Shared error definitions and result types
//!
//! ## Crate Boundary
//!
//! `kriten-core` has no knowledge of the orchestrator. Anything that talks to
//! Kubernetes lives in `kriten-engine`.
//!
//! ## Example
//!
//! ```rust
//! use kriten_core::prelude::*;
//!
//! let name = ResourceName::new("hello-world").unwrap();
//! assert_eq!(name.as_str(), "hello-world");
//!
//! let ids = AuthorizedIds::from_list(vec!["*".to_string()]);
//! assert!(ids.permits("hello-world"));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod audit;
pub mod authz;
pub mod error;
pub mod name;
pub mod observability;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use kriten_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::audit::{AuditAction, AuditEvent, AuditSink, AuditStatus};
    pub use crate::authz::{Access, Authorization, AuthorizedIds, Principal, ResourceKind};
    pub use crate::error::{Error, Result};
    pub use crate::name::ResourceName;
}

pub use audit::{AuditAction, AuditEvent, AuditSink, AuditStatus, TestAuditSink, TracingAuditSink};
pub use authz::{Access, AllowAll, Authorization, AuthorizedIds, Principal, ResourceKind};
pub use error::{Error, Result};
pub use name::ResourceName;
pub use observability::{LogFormat, init_logging};
