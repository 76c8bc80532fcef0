// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Notification sender contract.
//!
//! The lifecycle engine tells users about bookings and approvals through an
//! injected [`NotificationSender`]. Delivery is best-effort: the engine logs a
//! failed send and carries on.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::error::CoreError;

/// A message addressed to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Recipient.
    pub user_id: i64,
    /// Short subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Delivers notifications to users.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Deliver one notification.
    async fn send(&self, notification: &Notification) -> Result<(), CoreError>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSender for TracingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), CoreError> {
        info!(
            user_id = notification.user_id,
            subject = %notification.subject,
            body = %notification.body,
            "Notification"
        );
        Ok(())
    }
}

/// Sender used when no transport is configured; every send fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledNotifier;

#[async_trait]
impl NotificationSender for DisabledNotifier {
    async fn send(&self, _notification: &Notification) -> Result<(), CoreError> {
        Err(CoreError::Configuration(
            "notification transport is not configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Notification {
        Notification {
            user_id: 1,
            subject: "Hello".to_string(),
            body: "World".to_string(),
        }
    }

    #[tokio::test]
    async fn test_tracing_notifier_accepts() {
        assert!(TracingNotifier.send(&sample()).await.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_notifier_reports_configuration_error() {
        let err = DisabledNotifier.send(&sample()).await.unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }
}
