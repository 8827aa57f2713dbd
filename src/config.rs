use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bot_token: String,
    pub authorized_users: Vec<i64>,
    pub prometheus_url: Url,
    pub prometheus_timeout: Duration,
    pub grafana_url: Url,
    pub webhook_port: u16,
    pub webhook_path: String,
    pub aggregation_window: Option<Duration>,
    pub user_store_path: PathBuf,
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug)]
pub struct ConfigError {
    pub missing_vars: Vec<String>,
    pub invalid_vars: Vec<(String, String)>,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.missing_vars.is_empty() {
            writeln!(f, "Missing required settings:")?;
            for var in &self.missing_vars {
                writeln!(f, "  - {}", var)?;
            }
        }
        if !self.invalid_vars.is_empty() {
            writeln!(f, "Invalid settings:")?;
            for (var, err) in &self.invalid_vars {
                writeln!(f, "  - {}: {}", var, err)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    fn invalid(var: &str, err: impl ToString) -> Self {
        Self {
            missing_vars: Vec::new(),
            invalid_vars: vec![(var.to_string(), err.to_string())],
        }
    }
}

/// Shape of `config.toml`. Every field is optional so that a deployment can
/// rely on environment variables alone.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    telegram: TelegramSection,
    prometheus: PrometheusSection,
    grafana: GrafanaSection,
    alertmanager: AlertmanagerSection,
    storage: StorageSection,
    logging: LoggingSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TelegramSection {
    bot_token: Option<String>,
    authorized_users: Vec<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PrometheusSection {
    url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GrafanaSection {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AlertmanagerSection {
    webhook_port: Option<u16>,
    webhook_path: Option<String>,
    aggregation_window_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StorageSection {
    user_store_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoggingSection {
    level: Option<String>,
    format: Option<String>,
}

/// Source of environment values, swappable in tests.
trait EnvSource {
    fn var(&self, name: &str) -> Option<String>;
}

struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        match env::var(name) {
            Ok(v) if !v.is_empty() => Some(v),
            _ => None,
        }
    }
}

impl AppConfig {
    /// Loads `CONFIG_PATH` (default `config/config.toml`) and applies
    /// environment overrides. The default file is optional; an explicitly
    /// configured one must exist.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = ProcessEnv.var("CONFIG_PATH").map(PathBuf::from);
        let required = explicit.is_some();
        let path = explicit.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        Self::read(&path, required, &ProcessEnv)
    }

    fn read(path: &Path, required: bool, env: &dyn EnvSource) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config file at {}, using environment", path.display());
                None
            }
            Err(e) => {
                return Err(ConfigError::invalid(
                    "CONFIG_PATH",
                    format!("{}: {}", path.display(), e),
                ))
            }
        };

        Self::build(content.as_deref(), env)
    }

    fn build(content: Option<&str>, env: &dyn EnvSource) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let mut invalid = Vec::new();

        let file = match content {
            Some(content) => parse_file(content, env, &mut missing, &mut invalid),
            None => FileConfig::default(),
        };

        let bot_token = env
            .var("TELEGRAM_BOT_TOKEN")
            .or(file.telegram.bot_token)
            .filter(|token| !token.is_empty());
        if bot_token.is_none() {
            missing.push("telegram.bot_token (TELEGRAM_BOT_TOKEN)".to_string());
        }

        let authorized_users = match env.var("AUTHORIZED_USERS") {
            Some(raw) => parse_user_list(&raw).unwrap_or_else(|e| {
                invalid.push(("AUTHORIZED_USERS".into(), e));
                Vec::new()
            }),
            None => file.telegram.authorized_users,
        };

        let prometheus_url = parse_url(
            "prometheus.url",
            env.var("PROMETHEUS_URL")
                .or(file.prometheus.url)
                .unwrap_or_else(|| "http://localhost:9090".into()),
            &mut invalid,
        );

        let grafana_url = parse_url(
            "grafana.url",
            env.var("GRAFANA_URL")
                .or(file.grafana.url)
                .unwrap_or_else(|| "http://localhost:3000".into()),
            &mut invalid,
        );

        let prometheus_timeout = match file.prometheus.timeout_secs.unwrap_or(10) {
            0 => {
                invalid.push(("prometheus.timeout_secs".into(), "must be positive".into()));
                Duration::from_secs(10)
            }
            secs => Duration::from_secs(secs),
        };

        let webhook_port = match env.var("ALERTMANAGER_WEBHOOK_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|e| {
                    invalid.push(("ALERTMANAGER_WEBHOOK_PORT".into(), e.to_string()));
                })
                .unwrap_or(9119),
            None => file.alertmanager.webhook_port.unwrap_or(9119),
        };

        let webhook_path = file
            .alertmanager
            .webhook_path
            .unwrap_or_else(|| "/alerts".into());
        if !webhook_path.starts_with('/') {
            invalid.push((
                "alertmanager.webhook_path".into(),
                format!("'{}' must start with '/'", webhook_path),
            ));
        }

        let aggregation_window = file
            .alertmanager
            .aggregation_window_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let user_store_path = env
            .var("USER_STORE_PATH")
            .map(PathBuf::from)
            .or(file.storage.user_store_path)
            .unwrap_or_else(|| PathBuf::from("data/authorized_users.json"));

        let log_level = env
            .var("LOG_LEVEL")
            .or(file.logging.level)
            .unwrap_or_else(|| "info".into());

        let log_format = env
            .var("LOG_FORMAT")
            .or(file.logging.format)
            .map(|format| format.to_lowercase());
        let log_format = match log_format.as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                invalid.push(("logging.format".into(), format!("unknown format '{}'", other)));
                LogFormat::Text
            }
        };

        match (bot_token, prometheus_url, grafana_url) {
            (Some(bot_token), Some(prometheus_url), Some(grafana_url))
                if missing.is_empty() && invalid.is_empty() =>
            {
                Ok(Self {
                    bot_token,
                    authorized_users,
                    prometheus_url,
                    prometheus_timeout,
                    grafana_url,
                    webhook_port,
                    webhook_path,
                    aggregation_window,
                    user_store_path,
                    log_level,
                    log_format,
                })
            }
            _ => Err(ConfigError {
                missing_vars: missing,
                invalid_vars: invalid,
            }),
        }
    }
}

fn parse_file(
    content: &str,
    env: &dyn EnvSource,
    missing: &mut Vec<String>,
    invalid: &mut Vec<(String, String)>,
) -> FileConfig {
    let mut value: toml::Value = match toml::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            invalid.push(("config file".into(), e.to_string()));
            return FileConfig::default();
        }
    };

    resolve_placeholders(&mut value, env, missing);

    value.try_into().unwrap_or_else(|e: toml::de::Error| {
        invalid.push(("config file".into(), e.to_string()));
        FileConfig::default()
    })
}

/// Replaces string values of the form `${VAR}` with the variable's value.
fn resolve_placeholders(value: &mut toml::Value, env: &dyn EnvSource, missing: &mut Vec<String>) {
    match value {
        toml::Value::String(s) => {
            if let Some(name) = s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
                match env.var(name) {
                    Some(resolved) => *s = resolved,
                    None => {
                        missing.push(name.to_string());
                        s.clear();
                    }
                }
            }
        }
        toml::Value::Array(items) => {
            for item in items {
                resolve_placeholders(item, env, missing);
            }
        }
        toml::Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                resolve_placeholders(item, env, missing);
            }
        }
        _ => {}
    }
}

fn parse_user_list(raw: &str) -> Result<Vec<i64>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().map_err(|e| format!("'{}': {}", s, e)))
        .collect()
}

fn parse_url(name: &str, raw: String, invalid: &mut Vec<(String, String)>) -> Option<Url> {
    match Url::parse(&raw) {
        Ok(url) => Some(url),
        Err(e) => {
            invalid.push((name.to_string(), format!("'{}': {}", raw, e)));
            None
        }
    }
}
