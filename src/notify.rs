//! Transient user-facing notifications.
//!
//! Every user action ends in a short-lived toast: a success message or an
//! error. Controllers push them through a `Notifier`; the presentation layer
//! drains the receiving end and hides each toast once it expires.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;

use crate::logging::{self, Component};

/// How long a toast stays visible unless configured otherwise.
pub const DEFAULT_TOAST_MS: i64 = 3500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl Notification {
    /// `true` once `lifetime_ms` has fully elapsed since the toast was raised.
    pub fn is_expired_at(&self, now: DateTime<Utc>, lifetime_ms: i64) -> bool {
        now - self.raised_at >= Duration::milliseconds(lifetime_ms)
    }
}

/// Sending half of the notification channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Notifier {
    component: Component,
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    /// Creates a notifier and the receiver the presentation layer drains.
    pub fn channel(component: Component) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { component, tx }, rx)
    }

    /// The same channel, tagged with a different component for logging.
    pub fn for_component(&self, component: Component) -> Self {
        Self {
            component,
            tx: self.tx.clone(),
        }
    }

    pub fn success(&self, message: &str) {
        logging::info(self.component, None, message);
        self.push(NotificationKind::Success, message);
    }

    pub fn error(&self, message: &str) {
        logging::warn(self.component, None, message);
        self.push(NotificationKind::Error, message);
    }

    fn push(&self, kind: NotificationKind, message: &str) {
        // Nobody listening means the view is gone; the toast has nowhere to go.
        let _ = self.tx.send(Notification {
            kind,
            message: message.to_string(),
            raised_at: Utc::now(),
        });
    }
}
