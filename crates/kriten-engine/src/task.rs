//! Task definitions: a shell command bound to a runner.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use kriten_core::ResourceName;

use crate::catalog::{Record, non_empty};
use crate::error::{Error, Result};

const KEY_NAME: &str = "name";
const KEY_RUNNER: &str = "runner";
const KEY_COMMAND: &str = "command";
const KEY_SYNCHRONOUS: &str = "synchronous";
const KEY_SCHEMA: &str = "schema";

/// A catalogued command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task name.
    pub name: String,
    /// Runner the command executes in.
    pub runner: String,
    /// Shell command run with `sh -c`.
    pub command: String,
    /// Whether invocations wait for completion and return the result inline.
    #[serde(default)]
    pub synchronous: bool,
    /// JSON Schema for invocation input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// Secret values exposed to the command. Reads return redacted values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<Record>,
}

/// The list view of a task, without schema or execution mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    /// Unique task name.
    pub name: String,
    /// Runner the command executes in.
    pub runner: String,
    /// Shell command run with `sh -c`.
    pub command: String,
}

impl Task {
    /// Creates an asynchronous task with no schema or secret.
    #[must_use]
    pub fn new(name: impl Into<String>, runner: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runner: runner.into(),
            command: command.into(),
            synchronous: false,
            schema: None,
            secret: None,
        }
    }

    /// Marks the task synchronous.
    #[must_use]
    pub const fn synchronous(mut self, synchronous: bool) -> Self {
        self.synchronous = synchronous;
        self
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Sets the secret values.
    #[must_use]
    pub fn with_secret(mut self, secret: Record) -> Self {
        self.secret = Some(secret);
        self
    }

    /// Checks the fields that do not need other records.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid name or an empty runner or
    /// command.
    pub fn validate_shape(&self) -> Result<()> {
        ResourceName::new(&self.name)?;
        let mut details = Vec::new();
        if self.runner.trim().is_empty() {
            details.push("runner must not be empty".to_string());
        }
        if self.command.trim().is_empty() {
            details.push("command must not be empty".to_string());
        }
        if details.is_empty() {
            Ok(())
        } else {
            Err(Error::validation_with_details(
                format!("invalid task '{}'", self.name),
                details,
            ))
        }
    }

    /// Returns true if a catalog record describes a task.
    #[must_use]
    pub fn is_task_record(record: &Record) -> bool {
        non_empty(record, KEY_RUNNER).is_some()
    }

    /// Converts to the flat catalog shape. The secret is never included.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the schema cannot be encoded.
    pub fn to_record(&self) -> Result<Record> {
        let schema = match &self.schema {
            Some(schema) => serde_json::to_string(schema)?,
            None => String::new(),
        };
        Ok([
            (KEY_NAME, self.name.clone()),
            (KEY_RUNNER, self.runner.clone()),
            (KEY_COMMAND, self.command.clone()),
            (KEY_SYNCHRONOUS, self.synchronous.to_string()),
            (KEY_SCHEMA, schema),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect())
    }

    /// Reads a task from its catalog record.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the stored schema is not JSON.
    pub fn from_record(name: &str, record: &Record) -> Result<Self> {
        let field = |key: &str| record.get(key).cloned().unwrap_or_default();
        let schema = match non_empty(record, KEY_SCHEMA) {
            Some(text) => Some(serde_json::from_str(text).map_err(|e| Error::Serialization {
                message: format!("task {name} has a malformed schema: {e}"),
            })?),
            None => None,
        };
        Ok(Self {
            name: name.to_string(),
            runner: field(KEY_RUNNER),
            command: field(KEY_COMMAND),
            synchronous: non_empty(record, KEY_SYNCHRONOUS).is_some_and(|v| v.eq_ignore_ascii_case("true")),
            schema,
            secret: None,
        })
    }
}

impl TaskSummary {
    /// Reads the summary view from a catalog record.
    #[must_use]
    pub fn from_record(name: &str, record: &Record) -> Self {
        let field = |key: &str| record.get(key).cloned().unwrap_or_default();
        Self {
            name: name.to_string(),
            runner: field(KEY_RUNNER),
            command: field(KEY_COMMAND),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_round_trip_keeps_mode_and_schema() -> Result<()> {
        let task = Task::new("add", "python", "python add.py")
            .synchronous(true)
            .with_schema(json!({"amount": {"type": "integer"}}));
        let record = task.to_record()?;
        assert_eq!(record["synchronous"], "true");
        assert_eq!(record["schema"], r#"{"amount":{"type":"integer"}}"#);

        let back = Task::from_record("add", &record)?;
        assert_eq!(back, task);
        Ok(())
    }

    #[test]
    fn absent_schema_is_stored_empty() -> Result<()> {
        let record = Task::new("t", "r", "echo").to_record()?;
        assert_eq!(record["schema"], "");
        assert_eq!(record["synchronous"], "false");
        assert!(Task::from_record("t", &record)?.schema.is_none());
        Ok(())
    }

    #[test]
    fn record_never_holds_secret() -> Result<()> {
        let mut secret = Record::new();
        secret.insert("API_KEY".into(), "hunter2".into());
        let record = Task::new("t", "r", "echo").with_secret(secret).to_record()?;
        assert!(record.values().all(|v| v != "hunter2"));
        Ok(())
    }

    #[test]
    fn malformed_stored_schema_is_a_serialization_error() {
        let mut record = Task::new("t", "r", "echo").to_record().unwrap_or_default();
        record.insert("schema".into(), "{".into());
        assert!(matches!(
            Task::from_record("t", &record),
            Err(Error::Serialization { .. })
        ));
    }

    #[test]
    fn summary_drops_schema_and_mode() -> Result<()> {
        let record = Task::new("t", "r", "echo").synchronous(true).to_record()?;
        let summary = TaskSummary::from_record("t", &record);
        let json = serde_json::to_value(&summary)?;
        assert!(json.get("schema").is_none());
        assert!(json.get("synchronous").is_none());
        Ok(())
    }

    #[test]
    fn shape_validation() {
        assert!(Task::new("t", "", "echo").validate_shape().is_err());
        assert!(Task::new("t", "r", " ").validate_shape().is_err());
        assert!(Task::new("T", "r", "echo").validate_shape().is_err());
        assert!(Task::new("t", "r", "echo").validate_shape().is_ok());
    }
}
