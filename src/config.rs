use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::PreflightError;

/// Settings read once at the start of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightConfig {
    /// Abort the whole run when a task exhausts its retries.
    pub stop_on_failure: bool,
    /// Time allowed for a single execution attempt.
    #[serde(with = "serde_millis")]
    pub task_timeout: Duration,
    /// Re-attempts after the initial failure, per task.
    pub retry_count: u32,
    /// Pause between a failed attempt and the next one.
    #[serde(with = "serde_millis")]
    pub retry_delay: Duration,
    pub enable_debug_logging: bool,
    pub enable_error_logging: bool,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            stop_on_failure: false,
            task_timeout: Duration::from_secs(60),
            retry_count: 0,
            retry_delay: Duration::ZERO,
            enable_debug_logging: false,
            enable_error_logging: true,
        }
    }
}

impl PreflightConfig {
    /// Parses a JSON document; missing fields fall back to defaults.
    pub fn from_json(json: &str) -> Result<Self, PreflightError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PreflightError> {
        if self.task_timeout.is_zero() {
            return Err(PreflightError::InvalidConfig(
                "task_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_stop_on_failure(mut self, stop: bool) -> Self {
        self.stop_on_failure = stop;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_retry_count(mut self, retries: u32) -> Self {
        self.retry_count = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_debug_logging(mut self, enabled: bool) -> Self {
        self.enable_debug_logging = enabled;
        self
    }

    pub fn with_error_logging(mut self, enabled: bool) -> Self {
        self.enable_error_logging = enabled;
        self
    }
}

/// Durations as integer milliseconds.
mod serde_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
