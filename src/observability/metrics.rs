use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub struct Metrics {
    pub commands_handled: AtomicU64,
    pub commands_denied: AtomicU64,
    pub prometheus_queries: AtomicU64,
    pub prometheus_failures: AtomicU64,
    pub alerts_received: AtomicU64,
    pub messages_sent: AtomicU64,
    pub delivery_failures: AtomicU64,
    pub start_time: Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub commands_handled: u64,
    pub commands_denied: u64,
    pub prometheus_queries: u64,
    pub prometheus_failures: u64,
    pub alerts_received: u64,
    pub messages_sent: u64,
    pub delivery_failures: u64,
    pub uptime_secs: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            commands_handled: AtomicU64::new(0),
            commands_denied: AtomicU64::new(0),
            prometheus_queries: AtomicU64::new(0),
            prometheus_failures: AtomicU64::new(0),
            alerts_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn increment_commands_handled(&self) {
        self.commands_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_commands_denied(&self) {
        self.commands_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prometheus_query(&self, success: bool) {
        self.prometheus_queries.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.prometheus_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn add_alerts_received(&self, count: u64) {
        self.alerts_received.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_messages_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_delivery_failures(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            commands_handled: self.commands_handled.load(Ordering::Relaxed),
            commands_denied: self.commands_denied.load(Ordering::Relaxed),
            prometheus_queries: self.prometheus_queries.load(Ordering::Relaxed),
            prometheus_failures: self.prometheus_failures.load(Ordering::Relaxed),
            alerts_received: self.alerts_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_metrics() {
        let metrics = Metrics::new();
        metrics.increment_messages_sent();
        metrics.increment_messages_sent();
        metrics.increment_commands_denied();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages_sent, 2);
        assert_eq!(snapshot.commands_denied, 1);
    }

    #[test]
    fn test_prometheus_failures_count_as_queries() {
        let metrics = Metrics::new();
        metrics.record_prometheus_query(true);
        metrics.record_prometheus_query(false);
        metrics.record_prometheus_query(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.prometheus_queries, 3);
        assert_eq!(snapshot.prometheus_failures, 2);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = Metrics::new();
        metrics.add_alerts_received(4);
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["alerts_received"], 4);
    }
}
