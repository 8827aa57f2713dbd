use super::prometheus::{PrometheusClient, UpstreamError};
use chrono::Utc;
use html_escape::encode_text;
use promwatch::models::{MetricSample, QueryResult};

pub const CPU_QUERY: &str =
    r#"100 - (avg(irate(node_cpu_seconds_total{mode="idle"}[5m])) * 100)"#;

pub const MEMORY_QUERY: &str =
    r#"(1 - (node_memory_MemAvailable_bytes / node_memory_MemTotal_bytes)) * 100"#;

pub const DISK_QUERY: &str = r#"(node_filesystem_size_bytes{fstype!~"tmpfs|fuse.lxcfs|squashfs|vfat"} - node_filesystem_free_bytes{fstype!~"tmpfs|fuse.lxcfs|squashfs|vfat"}) / node_filesystem_size_bytes{fstype!~"tmpfs|fuse.lxcfs|squashfs|vfat"} * 100"#;

/// Receive and transmit byte rates as two series tagged `direction="rx|tx"`.
pub const NETWORK_QUERY: &str = r#"sum by (direction) (label_replace(rate(node_network_receive_bytes_total{device!~"lo|docker.*|veth.*"}[5m]), "direction", "rx", "", "") or label_replace(rate(node_network_transmit_bytes_total{device!~"lo|docker.*|veth.*"}[5m]), "direction", "tx", "", ""))"#;

const NOT_AVAILABLE: &str = "N/A";

pub fn usage_emoji(percent: f64) -> &'static str {
    if percent < 70.0 {
        "🟢"
    } else if percent < 90.0 {
        "🟡"
    } else {
        "🔴"
    }
}

fn unavailable_line(title: &str) -> String {
    format!("⚠️ <b>{}:</b> {}", title, NOT_AVAILABLE)
}

pub fn format_cpu(result: &Result<QueryResult, UpstreamError>) -> String {
    match result.as_ref().ok().and_then(QueryResult::first_value) {
        Some(cpu) if cpu.is_finite() => {
            format!("{} <b>CPU Usage:</b> {:.2}%", usage_emoji(cpu), cpu)
        }
        _ => unavailable_line("CPU Usage"),
    }
}

pub fn format_memory(result: &Result<QueryResult, UpstreamError>) -> String {
    match result.as_ref().ok().and_then(QueryResult::first_value) {
        Some(memory) if memory.is_finite() => {
            format!("{} <b>Memory:</b> {:.1}%", usage_emoji(memory), memory)
        }
        _ => unavailable_line("Memory"),
    }
}

pub fn format_disk(result: &Result<QueryResult, UpstreamError>) -> String {
    let samples: &[MetricSample] = match result {
        Ok(result) => result.samples(),
        Err(_) => &[],
    };

    let mut disks: Vec<(&str, f64)> = samples
        .iter()
        .filter(|s| s.value.is_finite())
        .map(|s| (s.label("mountpoint").unwrap_or("unknown"), s.value))
        .collect();

    if disks.is_empty() {
        return unavailable_line("Disk");
    }

    disks.sort_by(|a, b| a.0.cmp(b.0));
    let worst = disks.iter().map(|(_, usage)| *usage).fold(0.0, f64::max);
    let parts: Vec<String> = disks
        .iter()
        .map(|(mountpoint, usage)| format!("{} {:.1}%", encode_text(mountpoint), usage))
        .collect();

    format!("{} <b>Disk:</b> {}", usage_emoji(worst), parts.join(" · "))
}

pub fn format_network(result: &Result<QueryResult, UpstreamError>) -> String {
    let samples: &[MetricSample] = match result {
        Ok(result) => result.samples(),
        Err(_) => &[],
    };

    let rate_for = |direction: &str| {
        samples
            .iter()
            .find(|s| s.label("direction") == Some(direction))
            .filter(|s| s.value.is_finite())
            .map(|s| bytes_to_mbps(s.value))
    };

    match (rate_for("rx"), rate_for("tx")) {
        (Some(rx), Some(tx)) => format!(
            "🌐 <b>Network:</b> ⬇️ {:.2} Mbps | ⬆️ {:.2} Mbps",
            rx, tx
        ),
        _ => unavailable_line("Network"),
    }
}

fn bytes_to_mbps(bytes_per_sec: f64) -> f64 {
    bytes_per_sec * 8.0 / (1024.0 * 1024.0)
}

/// Issues the four status queries concurrently and renders one line each.
/// A failed query only affects its own line.
pub async fn server_status(prometheus: &PrometheusClient) -> String {
    let (cpu, memory, disk, network) = tokio::join!(
        prometheus.query(CPU_QUERY),
        prometheus.query(MEMORY_QUERY),
        prometheus.query(DISK_QUERY),
        prometheus.query(NETWORK_QUERY),
    );

    let lines = [
        "📊 <b>Server Status</b>\n".to_string(),
        format_cpu(&cpu),
        format_memory(&memory),
        format_disk(&disk),
        format_network(&network),
        format!("\n🕐 Updated: {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC")),
    ];

    lines.join("\n")
}
