//! Authorization contract consumed by the engine.
//!
//! The relational RBAC model lives outside the engine. The engine only asks
//! two questions: may this principal touch this object, and which objects of
//! a kind may it see. Listings are scoped with [`AuthorizedIds`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The wildcard id granting access to every object of a kind.
pub const WILDCARD: &str = "*";

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// Username; also stamped as the `owner` label on workloads.
    pub name: String,
    /// Identity provider that authenticated the caller (`local`, `ldap`, ...).
    pub provider: String,
}

impl Principal {
    /// Creates a principal authenticated by the given provider.
    #[must_use]
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
        }
    }

    /// Creates a principal from the local provider.
    #[must_use]
    pub fn local(name: impl Into<String>) -> Self {
        Self::new(name, "local")
    }
}

/// Resource kinds subject to authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Runner definitions.
    Runners,
    /// Task definitions.
    Tasks,
    /// One-shot job invocations.
    Jobs,
    /// Scheduled invocations.
    CronJobs,
    /// Long-running deployments.
    Deployments,
}

impl ResourceKind {
    /// Returns the lowercase plural used in audit events and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Runners => "runners",
            Self::Tasks => "tasks",
            Self::Jobs => "jobs",
            Self::CronJobs => "cronjobs",
            Self::Deployments => "deployments",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access level requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    /// Read-only access.
    Read,
    /// Mutating access (create, update, delete, launch).
    Write,
}

/// The set of object ids a principal may see for a resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizedIds {
    /// Every object of the kind.
    All,
    /// Only the named objects. Empty means nothing.
    Only(Vec<String>),
}

impl AuthorizedIds {
    /// Builds the set from a raw id list where `"*"` grants everything.
    #[must_use]
    pub fn from_list(ids: Vec<String>) -> Self {
        if ids.iter().any(|id| id == WILDCARD) {
            Self::All
        } else {
            Self::Only(ids)
        }
    }

    /// Returns true if the set grants nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Only(ids) if ids.is_empty())
    }

    /// Returns true if `id` is in the set.
    #[must_use]
    pub fn permits(&self, id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(ids) => ids.iter().any(|allowed| allowed == id),
        }
    }
}

/// Authorization decisions supplied by the surrounding application.
#[async_trait]
pub trait Authorization: Send + Sync {
    /// Returns true if `principal` may perform `access` on object `id` of `kind`.
    async fn is_authorized(
        &self,
        principal: &Principal,
        kind: ResourceKind,
        id: &str,
        access: Access,
    ) -> Result<bool>;

    /// Returns the ids of `kind` that `principal` may read.
    async fn authorized_ids(
        &self,
        principal: &Principal,
        kind: ResourceKind,
    ) -> Result<AuthorizedIds>;
}

/// Authorization that grants everything.
///
/// Used by the operator CLI, which runs with the caller's own cluster
/// credentials.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl Authorization for AllowAll {
    async fn is_authorized(
        &self,
        _principal: &Principal,
        _kind: ResourceKind,
        _id: &str,
        _access: Access,
    ) -> Result<bool> {
        Ok(true)
    }

    async fn authorized_ids(
        &self,
        _principal: &Principal,
        _kind: ResourceKind,
    ) -> Result<AuthorizedIds> {
        Ok(AuthorizedIds::All)
    }
}
