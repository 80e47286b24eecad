//! The outward "log a line" collaborator.

use tracing::{error, info, warn};

use crate::error::Result;
use crate::notification::{Notification, Severity};

/// Sink the controller forwards notifications to.
///
/// Called without any controller lock held, so an implementation may block.
pub trait NotificationLogger: Send + Sync {
    fn log(&self, text: &str, severity: Severity) -> Result<()>;

    fn log_notification(&self, notification: &Notification) -> Result<()> {
        self.log(&notification.text, notification.severity)
    }
}

/// Logs through `tracing` at [`Severity::log_level`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl NotificationLogger for TracingLogger {
    fn log(&self, text: &str, severity: Severity) -> Result<()> {
        match severity {
            Severity::Error => {
                error!(target: "notification_center::notify", severity = %severity, "{text}")
            }
            Severity::Warning => {
                warn!(target: "notification_center::notify", severity = %severity, "{text}")
            }
            Severity::Info | Severity::Success => {
                info!(target: "notification_center::notify", severity = %severity, "{text}")
            }
        }
        Ok(())
    }
}
