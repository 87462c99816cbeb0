//! Validated resource names.
//!
//! Runners, tasks, cron jobs and deployments are all stored as orchestrator
//! objects, so their names must be valid DNS-1123 subdomains: at most 253
//! characters, made of dot-separated labels of lowercase alphanumerics and
//! `-`, each label starting and ending with an alphanumeric.
//!
//! # Example
//!
//! ```rust
//! use kriten_core::name::ResourceName;
//!
//! assert!(ResourceName::new("nightly-backup.v2").is_ok());
//! assert!(ResourceName::new("Nightly_Backup").is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Maximum length of a DNS-1123 subdomain.
pub const MAX_NAME_LEN: usize = 253;

/// A validated name for a catalog or workload object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceName(String);

impl ResourceName {
    /// Validates and wraps a name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] if the name is not a DNS-1123 subdomain.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if is_dns1123_subdomain(&name) {
            Ok(Self(name))
        } else {
            Err(Error::invalid_name(name))
        }
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Returns true if `value` is a lowercase DNS-1123 subdomain.
#[must_use]
pub fn is_dns1123_subdomain(value: &str) -> bool {
    if value.is_empty() || value.len() > MAX_NAME_LEN {
        return false;
    }
    value.split('.').all(is_dns1123_label)
}

fn is_dns1123_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    alnum(first) && alnum(last) && bytes.iter().all(|b| alnum(b) || *b == b'-')
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ResourceName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ResourceName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ResourceName> for String {
    fn from(name: ResourceName) -> Self {
        name.0
    }
}
