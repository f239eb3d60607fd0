//! Transient user-facing notices.
//!
//! The rendering side implements [`AlertSink`] (a toast, a banner, a log
//! line). Router handlers and store mutation failures both report through it.

use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Success,
    Error,
}

/// A transient notice, optionally linking somewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
    /// Route to open when the notice is clicked.
    pub route: Option<String>,
}

impl Alert {
    #[must_use]
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Info,
            title: title.into(),
            message: message.into(),
            route: None,
        }
    }

    #[must_use]
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Success,
            ..Self::info(title, message)
        }
    }

    #[must_use]
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Error,
            ..Self::info(title, message)
        }
    }

    #[must_use]
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }
}

/// Where alerts go.
pub trait AlertSink: Send + Sync {
    fn show(&self, alert: Alert);
}

/// Drops every alert.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAlerts;

impl AlertSink for NullAlerts {
    fn show(&self, _alert: Alert) {}
}

/// Writes alerts to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlerts;

impl AlertSink for TracingAlerts {
    fn show(&self, alert: Alert) {
        match alert.level {
            AlertLevel::Error => warn!(title = %alert.title, route = ?alert.route, "{}", alert.message),
            _ => info!(title = %alert.title, route = ?alert.route, "{}", alert.message),
        }
    }
}

/// Keeps every alert in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingAlerts {
    alerts: Arc<Mutex<Vec<Alert>>>,
}

impl RecordingAlerts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .map(|alerts| alerts.clone())
            .unwrap_or_default()
    }
}

impl AlertSink for RecordingAlerts {
    fn show(&self, alert: Alert) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert);
        }
    }
}
