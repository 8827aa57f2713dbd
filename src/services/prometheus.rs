use crate::observability::METRICS;
use promwatch::models::{MetricSample, QueryResult};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum UpstreamError {
    Timeout,
    Request(reqwest::Error),
    Status(u16),
    QueryFailed { error_type: String, error: String },
    Malformed(String),
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamError::Timeout => write!(f, "Prometheus request timed out"),
            UpstreamError::Request(e) => write!(f, "Prometheus request error: {}", e),
            UpstreamError::Status(code) => write!(f, "Prometheus returned HTTP {}", code),
            UpstreamError::QueryFailed { error_type, error } => {
                write!(f, "Prometheus query failed ({}): {}", error_type, error)
            }
            UpstreamError::Malformed(reason) => {
                write!(f, "Malformed Prometheus response: {}", reason)
            }
        }
    }
}

impl std::error::Error for UpstreamError {}

impl From<reqwest::Error> for UpstreamError {
    fn from(error: reqwest::Error) -> Self {
        UpstreamError::Request(error)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    data: Option<ApiData>,
    error_type: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiData {
    result_type: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorEntry {
    metric: BTreeMap<String, String>,
    value: (f64, String),
}

/// Read-only client for the Prometheus HTTP API.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    base_url: Url,
    client: Client,
    timeout: Duration,
}

impl PrometheusClient {
    pub fn new(base_url: Url, timeout: Duration) -> Self {
        Self {
            base_url,
            client: Client::new(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Runs an instant query. Every failure comes back as an `UpstreamError`;
    /// nothing is retried.
    pub async fn query(&self, expression: &str) -> Result<QueryResult, UpstreamError> {
        let result = self.run_query(expression).await;

        METRICS.record_prometheus_query(result.is_ok());
        if let Err(e) = &result {
            tracing::warn!(query = expression, "Prometheus query unavailable: {}", e);
        }

        result
    }

    async fn run_query(&self, expression: &str) -> Result<QueryResult, UpstreamError> {
        let url = self.endpoint("api/v1/query");

        // One deadline covers both the response headers and the body
        let request = async {
            let response = self
                .client
                .get(url)
                .query(&[("query", expression)])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(UpstreamError::Status(status.as_u16()));
            }

            Ok::<String, UpstreamError>(response.text().await?)
        };

        let body = match timeout(self.timeout, request).await {
            Ok(body) => body?,
            Err(_) => return Err(UpstreamError::Timeout),
        };

        parse_query_response(&body, expression)
    }

    /// Probes `/-/healthy`. Any 2xx within the timeout counts as reachable.
    pub async fn check_health(&self) -> bool {
        let url = self.endpoint("-/healthy");

        match timeout(HEALTH_TIMEOUT.min(self.timeout), self.client.get(url).send()).await {
            Ok(Ok(res)) => res.status().is_success(),
            Ok(Err(e)) => {
                tracing::error!("Prometheus health check failed: {}", e);
                false
            }
            Err(_) => {
                tracing::error!("Prometheus health check timed out");
                false
            }
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }
}

fn parse_query_response(body: &str, expression: &str) -> Result<QueryResult, UpstreamError> {
    let response: ApiResponse =
        serde_json::from_str(body).map_err(|e| UpstreamError::Malformed(e.to_string()))?;

    if response.status != "success" {
        return Err(UpstreamError::QueryFailed {
            error_type: response.error_type.unwrap_or_else(|| "unknown".into()),
            error: response.error.unwrap_or_else(|| response.status.clone()),
        });
    }

    let data = response
        .data
        .ok_or_else(|| UpstreamError::Malformed("missing data".into()))?;

    match data.result_type.as_str() {
        "scalar" => {
            let (_, raw): (f64, String) = serde_json::from_value(data.result)
                .map_err(|e| UpstreamError::Malformed(e.to_string()))?;
            Ok(QueryResult::Scalar(parse_sample_value(&raw)?))
        }
        "vector" => {
            let entries: Vec<VectorEntry> = serde_json::from_value(data.result)
                .map_err(|e| UpstreamError::Malformed(e.to_string()))?;

            let samples = entries
                .into_iter()
                .map(|entry| {
                    let value = parse_sample_value(&entry.value.1)?;
                    let name = entry
                        .metric
                        .get("__name__")
                        .cloned()
                        .unwrap_or_else(|| expression.to_string());
                    Ok(MetricSample {
                        name,
                        value,
                        unit: None,
                        labels: entry.metric,
                    })
                })
                .collect::<Result<Vec<_>, UpstreamError>>()?;

            Ok(QueryResult::Vector(samples))
        }
        other => Err(UpstreamError::Malformed(format!(
            "unsupported result type '{}'",
            other
        ))),
    }
}

/// Prometheus encodes sample values as strings, including `NaN` and `±Inf`.
fn parse_sample_value(raw: &str) -> Result<f64, UpstreamError> {
    raw.parse::<f64>()
        .map_err(|_| UpstreamError::Malformed(format!("invalid sample value '{}'", raw)))
}
