use chrono::{DateTime, Utc};
use html_escape::encode_text;
use promwatch::models::{AlertEvent, AlertStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    /// Reads the `severity` label; anything unrecognised is `Info`.
    pub fn of(alert: &AlertEvent) -> Self {
        match alert.severity_label().map(str::to_lowercase).as_deref() {
            Some("critical") => Severity::Critical,
            Some("warning") => Severity::Warning,
            _ => Severity::Info,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Critical => "🔴",
            Severity::Warning => "🟡",
            Severity::Info => "🔵",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        }
    }

    pub fn all_ordered() -> [Severity; 3] {
        [Severity::Critical, Severity::Warning, Severity::Info]
    }
}

fn status_emoji(alert: &AlertEvent) -> &'static str {
    match alert.status {
        AlertStatus::Resolved => "🟢",
        AlertStatus::Firing => Severity::of(alert).emoji(),
    }
}

/// Body lines shared by the single-alert message and the digest.
fn alert_block(alert: &AlertEvent) -> String {
    format!(
        "{} <b>{}</b> [{}]\n   Instance: <code>{}</code>\n   {}",
        status_emoji(alert),
        encode_text(alert.alert_name()),
        alert.status.label(),
        encode_text(alert.instance()),
        encode_text(alert.summary())
    )
}

/// Message for one alert entry, sent as soon as it arrives.
pub fn format_alert(alert: &AlertEvent) -> String {
    let severity = Severity::of(alert);
    let mut message = format!(
        "🚨 <b>Alert</b> · {}\n\n{}",
        severity.label(),
        alert_block(alert)
    );

    if let Some(starts_at) = alert.starts_at.filter(is_set) {
        message.push_str(&format!("\n   Started: {}", format_time(starts_at)));
    }
    if alert.status == AlertStatus::Resolved {
        if let Some(ends_at) = alert.ends_at.filter(is_set) {
            message.push_str(&format!("\n   Resolved: {}", format_time(ends_at)));
        }
    }

    message
}

/// One message for a batch of alerts, grouped critical → warning → info.
pub fn format_digest(alerts: &[AlertEvent], now: DateTime<Utc>) -> String {
    let mut lines = vec!["🚨 <b>Alert Notification</b>\n".to_string()];

    for severity in Severity::all_ordered() {
        let group: Vec<&AlertEvent> = alerts
            .iter()
            .filter(|alert| Severity::of(alert) == severity)
            .collect();
        if group.is_empty() {
            continue;
        }

        lines.push(format!("{} <b>{} ALERTS</b>", severity.emoji(), severity.label()));
        for alert in group {
            lines.push(alert_block(alert));
        }
        lines.push(String::new());
    }

    lines.push(format!("📊 Total: {} alert(s)", alerts.len()));
    lines.push(format!("🕐 {}", format_time(now)));

    lines.join("\n")
}

// Alertmanager sends 0001-01-01T00:00:00Z for "not set"
fn is_set(time: &DateTime<Utc>) -> bool {
    time.timestamp() > 0
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn alert(name: &str, severity: Option<&str>, status: AlertStatus) -> AlertEvent {
        let mut labels = BTreeMap::new();
        labels.insert("alertname".to_string(), name.to_string());
        labels.insert("instance".to_string(), "node-1:9100".to_string());
        if let Some(severity) = severity {
            labels.insert("severity".to_string(), severity.to_string());
        }
        let mut annotations = BTreeMap::new();
        annotations.insert("summary".to_string(), format!("{} summary", name));

        AlertEvent {
            status,
            labels,
            annotations,
            starts_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()),
            ends_at: None,
            generator_url: None,
            fingerprint: None,
        }
    }

    #[test]
    fn test_severity_from_label() {
        assert_eq!(
            Severity::of(&alert("a", Some("CRITICAL"), AlertStatus::Firing)),
            Severity::Critical
        );
        assert_eq!(
            Severity::of(&alert("a", Some("warning"), AlertStatus::Firing)),
            Severity::Warning
        );
        assert_eq!(
            Severity::of(&alert("a", Some("page"), AlertStatus::Firing)),
            Severity::Info
        );
        assert_eq!(
            Severity::of(&alert("a", None, AlertStatus::Firing)),
            Severity::Info
        );
    }

    #[test]
    fn test_format_firing_alert() {
        let message = format_alert(&alert("HighCPU", Some("critical"), AlertStatus::Firing));

        assert!(message.contains("CRITICAL"));
        assert!(message.contains("🔴 <b>HighCPU</b> [FIRING]"));
        assert!(message.contains("Instance: <code>node-1:9100</code>"));
        assert!(message.contains("HighCPU summary"));
        assert!(message.contains("Started: 2024-05-01 10:00:00 UTC"));
    }

    #[test]
    fn test_format_resolved_alert() {
        let mut resolved = alert("HighCPU", Some("critical"), AlertStatus::Resolved);
        resolved.ends_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap());
        let message = format_alert(&resolved);

        assert!(message.contains("🟢 <b>HighCPU</b> [RESOLVED]"));
        assert!(message.contains("Resolved: 2024-05-01 10:30:00 UTC"));
    }

    #[test]
    fn test_labels_are_html_escaped() {
        let message = format_alert(&alert("<script>", None, AlertStatus::Firing));
        assert!(message.contains("&lt;script&gt;"));
        assert!(!message.contains("<script>"));
    }

    #[test]
    fn test_digest_groups_by_severity() {
        let alerts = vec![
            alert("DiskLow", Some("info"), AlertStatus::Firing),
            alert("HighCPU", Some("critical"), AlertStatus::Firing),
            alert("MemHigh", Some("warning"), AlertStatus::Firing),
        ];
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let digest = format_digest(&alerts, now);

        let critical = digest.find("CRITICAL ALERTS").unwrap();
        let warning = digest.find("WARNING ALERTS").unwrap();
        let info = digest.find("INFO ALERTS").unwrap();
        assert!(critical < warning && warning < info);
        assert!(digest.contains("📊 Total: 3 alert(s)"));
        assert!(digest.ends_with("🕐 2024-05-01 12:00:00 UTC"));
    }

    #[test]
    fn test_digest_skips_empty_groups() {
        let alerts = vec![alert("HighCPU", Some("critical"), AlertStatus::Firing)];
        let digest = format_digest(&alerts, Utc::now());
        assert!(!digest.contains("WARNING ALERTS"));
        assert!(!digest.contains("INFO ALERTS"));
    }
}
