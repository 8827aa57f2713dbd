pub mod batcher;
pub mod format;
pub mod http_server;

use crate::services::notifier::{fan_out, FanOutReport, Notifier};
use batcher::AlertBatch;
use chrono::Utc;
use promwatch::models::AlertEvent;
use promwatch::UserRegistry;
use std::sync::Arc;
use std::time::Duration;

/// Turns received alerts into Telegram messages for every registered user.
///
/// Without an aggregation window each alert is sent on its own as soon as it
/// arrives. With one, alerts are collected and sent as a single digest when
/// the window closes.
pub struct AlertDispatcher {
    registry: Arc<UserRegistry>,
    notifier: Arc<dyn Notifier>,
    batch: Option<AlertBatch>,
}

impl AlertDispatcher {
    pub fn new(
        registry: Arc<UserRegistry>,
        notifier: Arc<dyn Notifier>,
        aggregation_window: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            notifier,
            batch: aggregation_window.map(AlertBatch::new),
        }
    }

    /// Queues delivery in the background and returns immediately.
    pub fn accept(self: Arc<Self>, alerts: Vec<AlertEvent>) {
        if alerts.is_empty() {
            return;
        }

        match &self.batch {
            Some(batch) => {
                if batch.push(alerts) {
                    let window = batch.window();
                    let dispatcher = Arc::clone(&self);
                    tokio::spawn(async move {
                        tokio::time::sleep(window).await;
                        dispatcher.flush().await;
                    });
                }
            }
            None => {
                tokio::spawn(async move {
                    self.dispatch(&alerts).await;
                });
            }
        }
    }

    /// Sends one message per alert to each registered user. Recipients are
    /// read at send time, so users added a moment ago are included.
    pub async fn dispatch(&self, alerts: &[AlertEvent]) -> FanOutReport {
        let recipients = self.registry.list_users();
        let mut report = FanOutReport::default();

        if recipients.is_empty() {
            tracing::warn!(
                "No registered users, dropping {} alert(s)",
                alerts.len()
            );
            return report;
        }

        for alert in alerts {
            let text = format::format_alert(alert);
            let sent = fan_out(self.notifier.as_ref(), recipients.iter().copied(), &text).await;
            tracing::info!(
                alert = alert.alert_name(),
                "Alert delivered to {}/{} users",
                sent.delivered,
                sent.attempted
            );
            report.attempted += sent.attempted;
            report.delivered += sent.delivered;
            report.failed.extend(sent.failed);
        }

        report
    }

    /// Sends everything collected in the current window as one digest.
    pub async fn flush(&self) -> FanOutReport {
        let Some(batch) = &self.batch else {
            return FanOutReport::default();
        };

        let alerts = batch.drain();
        if alerts.is_empty() {
            return FanOutReport::default();
        }

        let recipients = self.registry.list_users();
        if recipients.is_empty() {
            tracing::warn!(
                "No registered users, dropping digest of {} alert(s)",
                alerts.len()
            );
            return FanOutReport::default();
        }

        let text = format::format_digest(&alerts, Utc::now());
        let report = fan_out(self.notifier.as_ref(), recipients, &text).await;
        tracing::info!(
            "Alert digest ({} alerts) delivered to {}/{} users",
            alerts.len(),
            report.delivered,
            report.attempted
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::notifier::testing::RecordingNotifier;
    use promwatch::models::AlertStatus;
    use std::collections::BTreeMap;

    fn alert(name: &str, severity: &str) -> AlertEvent {
        let mut labels = BTreeMap::new();
        labels.insert("alertname".to_string(), name.to_string());
        labels.insert("severity".to_string(), severity.to_string());
        AlertEvent {
            status: AlertStatus::Firing,
            labels,
            annotations: BTreeMap::new(),
            starts_at: None,
            ends_at: None,
            generator_url: None,
            fingerprint: None,
        }
    }

    fn dispatcher(
        users: &[i64],
        notifier: Arc<RecordingNotifier>,
        window: Option<Duration>,
    ) -> Arc<AlertDispatcher> {
        let registry = Arc::new(UserRegistry::new(users.iter().copied()));
        Arc::new(AlertDispatcher::new(registry, notifier, window))
    }

    #[tokio::test]
    async fn test_every_alert_reaches_every_user_despite_failure() {
        let notifier = Arc::new(RecordingNotifier::failing_for(&[2]));
        let dispatcher = dispatcher(&[1, 2, 3], notifier.clone(), None);

        let report = dispatcher
            .dispatch(&[alert("HighCPU", "critical"), alert("DiskFull", "warning")])
            .await;

        assert_eq!(report.attempted, 6);
        assert_eq!(report.delivered, 4);
        assert_eq!(report.failed, vec![2, 2]);

        let calls = notifier.calls();
        assert_eq!(calls.len(), 6);
        assert!(calls[..3].iter().all(|(_, text)| text.contains("HighCPU")));
        assert!(calls[3..].iter().all(|(_, text)| text.contains("DiskFull")));
    }

    #[tokio::test]
    async fn test_no_users_sends_nothing() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = dispatcher(&[], notifier.clone(), None);

        let report = dispatcher.dispatch(&[alert("HighCPU", "critical")]).await;

        assert_eq!(report.attempted, 0);
        assert!(notifier.calls().is_empty());
    }

    #[tokio::test]
    async fn test_recipients_read_at_dispatch_time() {
        let notifier = Arc::new(RecordingNotifier::default());
        let registry = Arc::new(UserRegistry::new([1]));
        let dispatcher = AlertDispatcher::new(registry.clone(), notifier.clone(), None);

        registry.add_user(5).unwrap();
        dispatcher.dispatch(&[alert("HighCPU", "critical")]).await;

        let chats: Vec<i64> = notifier.calls().into_iter().map(|(c, _)| c).collect();
        assert_eq!(chats, vec![1, 5]);
    }

    #[tokio::test]
    async fn test_accept_without_window_sends_in_background() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = dispatcher(&[1, 2], notifier.clone(), None);

        dispatcher.accept(vec![alert("HighCPU", "critical")]);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(notifier.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_aggregation_window_sends_one_digest() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = dispatcher(&[1, 2], notifier.clone(), Some(Duration::from_millis(100)));

        dispatcher.clone().accept(vec![alert("HighCPU", "critical")]);
        dispatcher.clone().accept(vec![alert("DiskFull", "warning")]);
        assert!(notifier.calls().is_empty());

        tokio::time::sleep(Duration::from_millis(300)).await;

        let calls = notifier.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].1.contains("HighCPU"));
        assert!(calls[0].1.contains("DiskFull"));
        assert!(calls[0].1.contains("📊 Total: 2 alert(s)"));
    }
}
