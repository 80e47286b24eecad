//! Notification center configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::logging::DEFAULT_LOG_FILTER;

/// Default minimum interval between two emissions of the same text through
/// `controlled_notify`.
pub const DEFAULT_CONTROLLED_NOTIFY_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for the notification center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationCenterConfig {
    /// Keep notifications raised before startup finished out of the queue
    /// (they are still broadcast and logged).
    pub log_only_during_startup: bool,
    /// Interval used by `controlled_notify_default`, in seconds.
    pub controlled_notify_interval_secs: f64,
    /// Topics ignored from the start, matched case-insensitively.
    pub ignored_topics: Vec<String>,
    /// `tracing` filter directive.
    pub log_filter: String,
}

impl Default for NotificationCenterConfig {
    fn default() -> Self {
        Self {
            log_only_during_startup: false,
            controlled_notify_interval_secs: DEFAULT_CONTROLLED_NOTIFY_INTERVAL.as_secs_f64(),
            ignored_topics: Vec::new(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl NotificationCenterConfig {
    /// Defaults overlaid with `NOTIFY_*` environment variables and `RUST_LOG`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values returned by `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("NOTIFY_LOG_ONLY_DURING_STARTUP") {
            config.log_only_during_startup = parse_bool(&value).ok_or_else(|| {
                Error::config(format!(
                    "NOTIFY_LOG_ONLY_DURING_STARTUP must be a boolean, got {value:?}"
                ))
            })?;
        }

        if let Some(value) = lookup("NOTIFY_CONTROLLED_INTERVAL_SECS") {
            config.controlled_notify_interval_secs = value.trim().parse().map_err(|e| {
                Error::config(format!("NOTIFY_CONTROLLED_INTERVAL_SECS: {e}"))
            })?;
        }

        if let Some(value) = lookup("NOTIFY_IGNORED_TOPICS") {
            config.ignored_topics = value
                .split(',')
                .map(str::trim)
                .filter(|topic| !topic.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(value) = lookup("RUST_LOG").filter(|v| !v.trim().is_empty()) {
            config.log_filter = value;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let interval = self.controlled_notify_interval_secs;
        if !interval.is_finite() || interval < 0.0 {
            return Err(Error::config(format!(
                "controlled_notify_interval_secs must be a non-negative number, got {interval}"
            )));
        }
        if self.ignored_topics.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::config(
                "ignored_topics must not contain empty entries",
            ));
        }
        Ok(())
    }

    pub fn controlled_notify_interval(&self) -> Duration {
        Duration::from_secs_f64(self.controlled_notify_interval_secs.max(0.0))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
