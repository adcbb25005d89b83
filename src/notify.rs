//! Owner notifications for key state changes.
//!
//! Delivery is best effort: `dispatch` logs failed sends and never surfaces them
//! to the lifecycle operation that triggered the notification.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewKey,
    Revoked,
    Blocked,
    Unblocked,
    RateLimited,
}

impl NotificationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewKey => "new_key",
            Self::Revoked => "revoke",
            Self::Blocked => "block",
            Self::Unblocked => "unblock",
            Self::RateLimited => "rate_limit",
        }
    }

    #[must_use]
    pub const fn subject(self) -> &'static str {
        match self {
            Self::NewKey => "A new API key has been generated",
            Self::Revoked => "Your API key has been revoked",
            Self::Blocked => "Your API key has been blocked",
            Self::Unblocked => "Your API key has been unblocked",
            Self::RateLimited => "Your API key hit its rate limit",
        }
    }

    /// Body text with the label from `data` when available.
    #[must_use]
    pub fn body(self, data: &Value) -> String {
        let label = data
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or("your API key");
        match self {
            Self::NewKey => format!("{label} was issued. Reveal it from your account to start using it."),
            Self::Revoked => format!("{label} was revoked and no longer authenticates requests."),
            Self::Blocked => format!(
                "{label} was blocked after repeated failed requests. Contact an administrator to unblock it."
            ),
            Self::Unblocked => format!("{label} was unblocked and accepts requests again."),
            Self::RateLimited => {
                let window = data
                    .get("window")
                    .and_then(Value::as_str)
                    .unwrap_or("the current window");
                format!("{label} exceeded its request limit for {window}. Further requests are refused until the window frees up.")
            }
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub owner_id: Uuid,
    pub data: Value,
}

/// Delivery abstraction (mail, queue, webhook...).
pub trait Notifier: Send + Sync {
    /// Deliver a notification or return an error, which the caller only logs.
    fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Logs notifications instead of delivering them.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<()> {
        info!(
            kind = %notification.kind,
            owner_id = %notification.owner_id,
            subject = notification.kind.subject(),
            body = %notification.kind.body(&notification.data),
            "notification send stub"
        );
        Ok(())
    }
}

/// Send and swallow failures.
pub fn dispatch(notifier: &dyn Notifier, kind: NotificationKind, owner_id: Uuid, data: Value) {
    let notification = Notification {
        kind,
        owner_id,
        data,
    };
    if let Err(err) = notifier.notify(&notification) {
        error!(%owner_id, kind = %kind, "Failed to send notification: {err:#}");
    }
}
