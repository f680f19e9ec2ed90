//! Exposure notifications.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::NotificationConfig;
use crate::error::Result;
use crate::store::Notifier;

/// Unit of [`Notification::duration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    /// Milliseconds.
    Ms,
    /// Seconds.
    S,
}

/// A local notification to show the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Title line.
    pub title: String,
    /// Body text.
    pub body: String,
    /// How long the notification stays visible.
    pub duration: u64,
    /// Unit of `duration`.
    pub unit: DurationUnit,
}

impl Notification {
    /// The configured exposure notification.
    #[must_use]
    pub fn exposure(config: &NotificationConfig) -> Self {
        Self {
            title: config.title.clone(),
            body: config.body.clone(),
            duration: config.duration_ms,
            unit: DurationUnit::Ms,
        }
    }
}

/// Notifier that emits notifications as structured log events.
///
/// Used by the host daemon, where delivery to a device is handled by whoever
/// consumes the logs or polls the API.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn raise(&self, notification: &Notification) -> Result<()> {
        info!(
            title = %notification.title,
            duration = notification.duration,
            unit = ?notification.unit,
            "exposure notification: {}",
            notification.body
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exposure_notification_from_config() {
        let config = NotificationConfig {
            title: "t".into(),
            body: "b".into(),
            duration_ms: 1500,
        };
        let n = Notification::exposure(&config);
        assert_eq!(n.title, "t");
        assert_eq!(n.duration, 1500);
        assert_eq!(n.unit, DurationUnit::Ms);
    }

    #[tokio::test]
    async fn test_tracing_notifier_never_fails() {
        let n = Notification::exposure(&NotificationConfig::default());
        assert!(TracingNotifier.raise(&n).await.is_ok());
    }
}
