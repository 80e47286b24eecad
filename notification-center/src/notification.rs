//! Notification record and severity.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a notification.
///
/// `Info` notifications are broadcast and logged but never queued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
    Success,
}

impl Severity {
    /// Tracing level a notification of this severity is logged at.
    pub fn log_level(self) -> tracing::Level {
        match self {
            Severity::Info | Severity::Success => tracing::Level::INFO,
            Severity::Warning => tracing::Level::WARN,
            Severity::Error => tracing::Level::ERROR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "Info",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
            Severity::Success => "Success",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-visible message.
///
/// Equality only considers `text` and `severity`; two notifications raised at
/// different times for the same condition compare equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Notification {
    pub text: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn new(text: impl Into<String>, severity: Severity) -> Self {
        Self {
            text: text.into(),
            severity,
            timestamp: None,
        }
    }

    /// Same as [`Notification::new`], stamped with the current time.
    pub fn now(text: impl Into<String>, severity: Severity) -> Self {
        Self {
            timestamp: Some(Utc::now()),
            ..Self::new(text, severity)
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(text, Severity::Info)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(text, Severity::Warning)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(text, Severity::Error)
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(text, Severity::Success)
    }

    /// Empty placeholder shown when nothing is selected.
    pub fn placeholder() -> Self {
        Self::default()
    }

    pub fn is_placeholder(&self) -> bool {
        self.text.is_empty()
    }
}

impl PartialEq for Notification {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text && self.severity == other.severity
    }
}

impl Eq for Notification {}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_timestamp() {
        let a = Notification::now("disk full", Severity::Error);
        let b = Notification::new("disk full", Severity::Error);
        assert_eq!(a, b);
        assert_ne!(a, Notification::warning("disk full"));
    }

    #[test]
    fn display_prefixes_severity() {
        assert_eq!(
            Notification::warning("low battery").to_string(),
            "Warning: low battery"
        );
    }

    #[test]
    fn placeholder_is_empty_info() {
        let placeholder = Notification::placeholder();
        assert!(placeholder.is_placeholder());
        assert_eq!(placeholder.severity, Severity::Info);
    }

    #[test]
    fn severity_maps_to_log_level() {
        assert_eq!(Severity::Info.log_level(), tracing::Level::INFO);
        assert_eq!(Severity::Success.log_level(), tracing::Level::INFO);
        assert_eq!(Severity::Warning.log_level(), tracing::Level::WARN);
        assert_eq!(Severity::Error.log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn severity_serializes_by_name() {
        let json = serde_json::to_string(&Notification::error("boom")).unwrap();
        assert_eq!(json, r#"{"text":"boom","severity":"Error"}"#);

        let parsed: Notification =
            serde_json::from_str(r#"{"text":"ok","severity":"Success"}"#).unwrap();
        assert_eq!(parsed, Notification::success("ok"));
        assert!(parsed.timestamp.is_none());
    }
}
