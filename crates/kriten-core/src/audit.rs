//! Audit events for catalog and workload mutations.
//!
//! Every create, update, delete and launch performed by the engine produces an
//! [`AuditEvent`] that is handed to an [`AuditSink`]. Recording is
//! fire-and-forget: a sink must never fail or block the operation it audits.
//!
//! Events carry names and categories only. Secret values, tokens and clone
//! URLs are never part of an event.
//!
//! ## Usage
//!
//! ```rust
//! use kriten_core::audit::{AuditAction, AuditEvent, AuditStatus};
//!
//! let event = AuditEvent::builder()
//!     .actor("alice")
//!     .action(AuditAction::Launch)
//!     .category("jobs")
//!     .target("hello-world")
//!     .status(AuditStatus::Success)
//!     .try_build()
//!     .unwrap();
//!
//! assert_eq!(event.action.to_string(), "launch");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Version of the audit event schema.
pub const AUDIT_EVENT_VERSION: u32 = 1;

/// The kind of mutation being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A workload was launched.
    Launch,
    /// A record or workload was created.
    Create,
    /// A record or workload was updated.
    Update,
    /// A record or workload was deleted.
    Delete,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Launch => "launch",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Outcome of the audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// The operation completed.
    Success,
    /// The operation was rejected or failed.
    Failure,
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Failure => "failure",
        })
    }
}

/// An audit record of one mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Schema version for evolution.
    pub event_version: u32,

    /// Unique event identifier (ULID format).
    pub event_id: String,

    /// When the event occurred (UTC).
    pub timestamp: DateTime<Utc>,

    /// Name of the user or service that performed the operation.
    pub actor: String,

    /// Identity provider of the actor, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// What was done.
    pub action: AuditAction,

    /// Resource category: `runners`, `tasks`, `jobs`, `cronjobs`, `deployments`, `secrets`.
    pub category: String,

    /// Name of the affected object.
    pub target: String,

    /// Whether the operation succeeded.
    pub status: AuditStatus,
}

impl AuditEvent {
    /// Creates a new builder for constructing audit events.
    #[must_use]
    pub fn builder() -> AuditEventBuilder {
        AuditEventBuilder::default()
    }
}

/// Error returned when an event is missing a required field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("audit event missing required field: {field}")]
pub struct AuditValidationError {
    /// The name of the missing field.
    pub field: &'static str,
}

/// Builder for constructing [`AuditEvent`] instances.
#[derive(Debug, Default)]
pub struct AuditEventBuilder {
    actor: Option<String>,
    provider: Option<String>,
    action: Option<AuditAction>,
    category: Option<String>,
    target: Option<String>,
    status: Option<AuditStatus>,
}

impl AuditEventBuilder {
    /// Sets the actor name.
    #[must_use]
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Sets the identity provider.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the action.
    #[must_use]
    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Sets the resource category.
    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the affected object name.
    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Sets the outcome.
    #[must_use]
    pub fn status(mut self, status: AuditStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Builds the audit event.
    ///
    /// # Errors
    ///
    /// Returns an error if `actor`, `action`, `category` or `target` is missing.
    pub fn try_build(self) -> Result<AuditEvent, AuditValidationError> {
        let missing = |field| AuditValidationError { field };
        Ok(AuditEvent {
            event_version: AUDIT_EVENT_VERSION,
            event_id: ulid::Ulid::new().to_string(),
            timestamp: Utc::now(),
            actor: self.actor.ok_or_else(|| missing("actor"))?,
            provider: self.provider,
            action: self.action.ok_or_else(|| missing("action"))?,
            category: self.category.ok_or_else(|| missing("category"))?,
            target: self.target.ok_or_else(|| missing("target"))?,
            status: self.status.unwrap_or(AuditStatus::Success),
        })
    }
}

/// Destination for audit events.
///
/// Implementations must be non-blocking; persistent sinks buffer internally.
pub trait AuditSink: Send + Sync {
    /// Records an audit event.
    fn record(&self, event: AuditEvent);
}

/// Audit sink that emits events via tracing under the `audit` target.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match event.status {
            AuditStatus::Success => tracing::info!(
                target: "audit",
                event_id = %event.event_id,
                actor = %event.actor,
                action = %event.action,
                category = %event.category,
                target_name = %event.target,
                "audit_event"
            ),
            AuditStatus::Failure => tracing::warn!(
                target: "audit",
                event_id = %event.event_id,
                actor = %event.actor,
                action = %event.action,
                category = %event.category,
                target_name = %event.target,
                "audit_event"
            ),
        }
    }
}

/// Audit sink that captures events for assertions.
#[derive(Debug, Default)]
pub struct TestAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl TestAuditSink {
    /// Creates a new empty test sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all captured events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Returns the number of captured events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    /// Returns true if no events have been captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the last captured event, if any.
    #[must_use]
    pub fn last(&self) -> Option<AuditEvent> {
        self.events
            .lock()
            .ok()
            .and_then(|guard| guard.last().cloned())
    }

    /// Finds events by action.
    #[must_use]
    pub fn find_by_action(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|guard| {
                guard
                    .iter()
                    .filter(|e| e.action == action)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl AuditSink for TestAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}
