//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use kriten_core::{Error, LogFormat, Result};

/// Default namespace for every engine-managed object.
pub const DEFAULT_NAMESPACE: &str = "kriten";
/// Default time-to-live for finished jobs.
pub const DEFAULT_JOBS_TTL_SECONDS: u32 = 3600;
/// Default image for the source fetch init container.
pub const DEFAULT_GIT_IMAGE: &str = "bitnami/git";

/// Bounded poll schedule for synchronous invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Delay between status checks.
    #[serde(with = "duration_millis")]
    pub interval: Duration,
    /// Soft deadline after which the current status is returned.
    #[serde(with = "duration_millis")]
    pub deadline: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            deadline: Duration::from_secs(20),
        }
    }
}

impl PollPolicy {
    /// Creates a policy with the given interval and deadline.
    #[must_use]
    pub const fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Namespace holding runners, tasks, secrets and workloads.
    pub namespace: String,
    /// Seconds a finished job is kept before the orchestrator reaps it.
    pub jobs_ttl_seconds: u32,
    /// Image used by the init container that clones the runner repository.
    pub git_image: String,
    /// Poll schedule for synchronous tasks.
    pub sync_poll: PollPolicy,
    /// Log output format for binaries.
    #[serde(skip)]
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            jobs_ttl_seconds: DEFAULT_JOBS_TTL_SECONDS,
            git_image: DEFAULT_GIT_IMAGE.to_string(),
            sync_poll: PollPolicy::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from `KRITEN_*` environment variables.
    ///
    /// Unset or blank variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a variable is malformed or the
    /// resulting configuration fails [`EngineConfig::validate`].
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(namespace) = env_string("KRITEN_NAMESPACE") {
            config.namespace = namespace;
        }
        if let Some(ttl) = env_u32("KRITEN_JOBS_TTL_SECONDS")? {
            config.jobs_ttl_seconds = ttl;
        }
        if let Some(image) = env_string("KRITEN_GIT_IMAGE") {
            config.git_image = image;
        }
        if let Some(ms) = env_u64("KRITEN_SYNC_POLL_INTERVAL_MS")? {
            config.sync_poll.interval = Duration::from_millis(ms);
        }
        if let Some(secs) = env_u64("KRITEN_SYNC_TIMEOUT_SECONDS")? {
            config.sync_poll.deadline = Duration::from_secs(secs);
        }
        if let Some(format) = env_string("KRITEN_LOG_FORMAT") {
            config.log_format = format.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for internally inconsistent values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty namespace, a zero poll
    /// interval, or an interval longer than the deadline.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(Error::InvalidInput("namespace must not be empty".into()));
        }
        if self.sync_poll.interval.is_zero() {
            return Err(Error::InvalidInput(
                "sync poll interval must be greater than zero".into(),
            ));
        }
        if self.sync_poll.interval > self.sync_poll.deadline {
            return Err(Error::InvalidInput(
                "sync poll interval must not exceed the sync timeout".into(),
            ));
        }
        Ok(())
    }

    /// Returns the job TTL as the orchestrator's signed field type.
    #[must_use]
    pub fn jobs_ttl_i32(&self) -> i32 {
        i32::try_from(self.jobs_ttl_seconds).unwrap_or(i32::MAX)
    }

    /// Sets the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the synchronous poll policy.
    #[must_use]
    pub const fn with_sync_poll(mut self, policy: PollPolicy) -> Self {
        self.sync_poll = policy;
        self
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_u32(name: &str) -> Result<Option<u32>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<u32>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a u32: {e}")))
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<u64>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a u64: {e}")))
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.namespace, "kriten");
        assert_eq!(config.jobs_ttl_seconds, 3600);
        assert_eq!(config.git_image, "bitnami/git");
        assert_eq!(config.sync_poll.interval, Duration::from_millis(100));
        assert_eq!(config.sync_poll.deadline, Duration::from_secs(20));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = EngineConfig::default()
            .with_sync_poll(PollPolicy::new(Duration::ZERO, Duration::from_secs(1)));
        assert!(config.validate().is_err());
    }

    #[test]
    fn interval_longer_than_deadline_is_rejected() {
        let config = EngineConfig::default().with_sync_poll(PollPolicy::new(
            Duration::from_secs(5),
            Duration::from_secs(1),
        ));
        assert!(config.validate().is_err());
    }

    #[test]
    fn blank_namespace_is_rejected() {
        assert!(EngineConfig::default().with_namespace(" ").validate().is_err());
    }

    #[test]
    fn ttl_saturates_into_i32() {
        let config = EngineConfig {
            jobs_ttl_seconds: u32::MAX,
            ..EngineConfig::default()
        };
        assert_eq!(config.jobs_ttl_i32(), i32::MAX);
    }

    #[test]
    fn poll_policy_serializes_as_millis() {
        let json = serde_json::to_value(PollPolicy::default()).unwrap_or_default();
        assert_eq!(json["interval"], 100);
        assert_eq!(json["deadline"], 20_000);
    }
}
