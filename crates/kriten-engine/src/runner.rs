//! Runner definitions: a container image plus the git source it runs against.

use serde::{Deserialize, Serialize};

use kriten_core::ResourceName;

use crate::catalog::{Record, non_empty};
use crate::error::{Error, Result};

/// Branch cloned when a runner does not name one.
pub const DEFAULT_BRANCH: &str = "main";

const KEY_NAME: &str = "name";
const KEY_IMAGE: &str = "image";
const KEY_GIT_URL: &str = "gitURL";
const KEY_BRANCH: &str = "branch";
/// Secret key holding the repository token.
pub const TOKEN_KEY: &str = "token";

/// An execution environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runner {
    /// Unique runner name.
    pub name: String,
    /// Container image the task command runs in.
    pub image: String,
    /// Repository cloned into the working directory.
    #[serde(rename = "gitURL")]
    pub git_url: String,
    /// Branch to clone. Empty means [`DEFAULT_BRANCH`].
    #[serde(default)]
    pub branch: String,
    /// Repository token. Write-only: reads return the redaction sentinel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Runner {
    /// Creates a runner on the default branch with no token.
    #[must_use]
    pub fn new(name: impl Into<String>, image: impl Into<String>, git_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            git_url: git_url.into(),
            branch: DEFAULT_BRANCH.to_string(),
            token: None,
        }
    }

    /// Sets the branch.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Sets the repository token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Returns the branch to clone, defaulting to `main`.
    #[must_use]
    pub fn effective_branch(&self) -> &str {
        if self.branch.is_empty() {
            DEFAULT_BRANCH
        } else {
            &self.branch
        }
    }

    /// Checks the definition before it is persisted.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid name, a missing image or
    /// repository URL, or a URL or branch that would not survive the init
    /// container's `sh -c` unquoted.
    pub fn validate(&self) -> Result<()> {
        ResourceName::new(&self.name)?;
        let mut details = Vec::new();
        if self.image.trim().is_empty() {
            details.push("image must not be empty".to_string());
        }
        if self.git_url.trim().is_empty() {
            details.push("gitURL must not be empty".to_string());
        } else if has_shell_syntax(&self.git_url) {
            details.push("gitURL must not contain whitespace or shell metacharacters".to_string());
        }
        if has_shell_syntax(&self.branch) {
            details.push("branch must not contain whitespace or shell metacharacters".to_string());
        }
        if details.is_empty() {
            Ok(())
        } else {
            Err(Error::validation_with_details(
                format!("invalid runner '{}'", self.name),
                details,
            ))
        }
    }

    /// Returns true if a catalog record describes a runner.
    #[must_use]
    pub fn is_runner_record(record: &Record) -> bool {
        non_empty(record, KEY_IMAGE).is_some()
    }

    /// Converts to the flat catalog shape. The token is never included.
    #[must_use]
    pub fn to_record(&self) -> Record {
        [
            (KEY_NAME, self.name.as_str()),
            (KEY_IMAGE, self.image.as_str()),
            (KEY_GIT_URL, self.git_url.as_str()),
            (KEY_BRANCH, self.effective_branch()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    /// Reads a runner from its catalog record.
    #[must_use]
    pub fn from_record(name: &str, record: &Record) -> Self {
        let field = |key: &str| record.get(key).cloned().unwrap_or_default();
        let mut runner = Self {
            name: name.to_string(),
            image: field(KEY_IMAGE),
            git_url: field(KEY_GIT_URL),
            branch: field(KEY_BRANCH),
            token: None,
        };
        if runner.branch.is_empty() {
            runner.branch = DEFAULT_BRANCH.to_string();
        }
        runner
    }
}

fn has_shell_syntax(value: &str) -> bool {
    value
        .chars()
        .any(|c| c.is_whitespace() || SHELL_METACHARACTERS.contains(&c))
}

const SHELL_METACHARACTERS: &[char] = &[';', '&', '|', '`', '$', '(', ')', '<', '>', '\\', '\'', '"'];

/// Returns the clone URL with `token` spliced in as basic-auth user.
///
/// Only the first `://` is rewritten.
#[must_use]
pub fn authenticated_url(git_url: &str, token: Option<&str>) -> String {
    match token.filter(|t| !t.is_empty()) {
        Some(token) => git_url.replacen("://", &format!("://{token}:@"), 1),
        None => git_url.to_string(),
    }
}

/// Returns the clone URL with any userinfo replaced, for logging.
#[must_use]
pub fn redacted_url(git_url: &str) -> String {
    let Some((scheme, rest)) = git_url.split_once("://") else {
        return git_url.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{scheme}://[REDACTED]@{}", &rest[at + 1..]),
        None => git_url.to_string(),
    }
}
