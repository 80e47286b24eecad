//! Bus error and delivery reporting types.

use thiserror::Error;

use crate::key::{Context, RecipientId};

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Delivery failed for {failed} handler(s), {delivered} delivered: {first}")]
    Delivery {
        failed: usize,
        delivered: usize,
        first: String,
    },
}

impl BusError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// A handler that failed during a send.
#[derive(Debug)]
pub struct DeliveryFailure {
    pub recipient: RecipientId,
    pub context: Context,
    pub error: anyhow::Error,
}

/// Outcome of a single `send`.
///
/// Handler failures never abort the fan-out; they are collected here instead.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    /// Number of handlers that ran to completion.
    pub delivered: usize,
    pub failures: Vec<DeliveryFailure>,
}

impl DeliveryReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total number of handlers the message was dispatched to.
    pub fn attempted(&self) -> usize {
        self.delivered + self.failures.len()
    }

    pub fn into_result(self) -> Result<usize> {
        match self.failures.first() {
            None => Ok(self.delivered),
            Some(first) => Err(BusError::Delivery {
                failed: self.failures.len(),
                delivered: self.delivered,
                first: format!("{}: {:#}", first.recipient, first.error),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_without_failures_is_ok() {
        let report = DeliveryReport {
            delivered: 3,
            failures: Vec::new(),
        };
        assert!(report.is_ok());
        assert_eq!(report.into_result().unwrap(), 3);
    }

    #[test]
    fn report_with_failures_converts_to_delivery_error() {
        let report = DeliveryReport {
            delivered: 1,
            failures: vec![DeliveryFailure {
                recipient: RecipientId::from_raw(7),
                context: Context::None,
                error: anyhow::anyhow!("boom"),
            }],
        };
        assert_eq!(report.attempted(), 2);

        let err = report.into_result().unwrap_err();
        match &err {
            BusError::Delivery {
                failed, delivered, ..
            } => {
                assert_eq!(*failed, 1);
                assert_eq!(*delivered, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let message = err.to_string();
        assert!(message.contains("1 handler(s), 1 delivered"));
        assert!(message.contains("recipient#7: boom"));
    }
}
