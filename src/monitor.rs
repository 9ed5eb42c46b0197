// ──────────────────────────────────────────────────────────────────────────────
// cartunes-mapek-controller/src/monitor.rs
// ──────────────────────────────────────────────────────────────────────────────
//
// Fetches QoS samples from cluster telemetry and QoE samples from the
// application's `/api/metrics` endpoint. Both fetchers degrade to an empty
// or neutral result on failure rather than propagating an error — a single
// bad scrape must never take down the control loop.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use tracing::{info, warn};

use crate::types::{QoeSample, QosSample, ServiceId};

/// A (metric id, aggregation) pair the Monitor fetches once per cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricQuery {
    pub metric_id: String,
    pub aggregation: String,
}

impl MetricQuery {
    pub fn new(metric_id: impl Into<String>, aggregation: impl Into<String>) -> Self {
        MetricQuery {
            metric_id: metric_id.into(),
            aggregation: aggregation.into(),
        }
    }
}

/// Abstraction over the cluster telemetry provider's "get data" call, so
/// tests can substitute an in-memory fake instead of talking to a real
/// cluster.
#[async_trait]
pub trait ClusterTelemetry: Send + Sync {
    async fn fetch(&self, query: &MetricQuery) -> Vec<QosSample>;

    /// Issues `queries` concurrently and joins the results, keyed by query.
    /// Provided so callers holding a `dyn ClusterTelemetry` still get the
    /// concurrent-fetch behaviour without depending on a concrete type.
    async fn fetch_all_for(&self, queries: &[MetricQuery]) -> HashMap<MetricQuery, Vec<QosSample>> {
        let futures = queries.iter().map(|q| async move { (q.clone(), self.fetch(q).await) });
        join_all(futures).await.into_iter().collect()
    }
}

/// Abstraction over the application's `/api/metrics` endpoint.
#[async_trait]
pub trait AppTelemetry: Send + Sync {
    async fn fetch(&self) -> QoeSample;
}

#[derive(Debug, Deserialize)]
struct CartunesMetricsResponse {
    #[serde(default)]
    disk_usage: f64,
    #[serde(default)]
    cache_hits: i64,
    #[serde(default)]
    cache_misses: i64,
    #[serde(default)]
    avg_playback_latency: f64,
    #[serde(default)]
    avg_download_time: f64,
}

/// Monitor implementation backed by a real cluster telemetry endpoint (IBM
/// SysDig-compatible `get_data` shape) and the application's HTTP metrics
/// endpoint.
pub struct HttpMonitor {
    client: reqwest::Client,
    cluster_url: String,
    api_key: String,
    guid: String,
    app_metrics_url: String,
    window_secs: i64,
    namespace_filter: String,
    raw_dump_dir: PathBuf,
}

impl HttpMonitor {
    pub fn new(
        cluster_url: impl Into<String>,
        api_key: impl Into<String>,
        guid: impl Into<String>,
        app_metrics_url: impl Into<String>,
        window_secs: i64,
        namespace_filter: impl Into<String>,
        raw_dump_dir: impl AsRef<Path>,
    ) -> Self {
        HttpMonitor {
            client: reqwest::Client::new(),
            cluster_url: cluster_url.into(),
            api_key: api_key.into(),
            guid: guid.into(),
            app_metrics_url: app_metrics_url.into(),
            window_secs,
            namespace_filter: namespace_filter.into(),
            raw_dump_dir: raw_dump_dir.as_ref().to_path_buf(),
        }
    }

    fn dump_path(&self, query: &MetricQuery) -> PathBuf {
        let safe_id = query.metric_id.replace('.', "_");
        self.raw_dump_dir
            .join(format!("{safe_id}_{}_metric.json", query.aggregation))
    }
}

#[async_trait]
impl ClusterTelemetry for HttpMonitor {
    async fn fetch(&self, query: &MetricQuery) -> Vec<QosSample> {
        let body = serde_json::json!({
            "metrics": [
                {"id": "kubernetes.deployment.name"},
                {"id": query.metric_id, "aggregations": {"time": query.aggregation, "group": "avg"}}
            ],
            "start_ts": -self.window_secs,
            "end_ts": 0,
            "sampling_s": 10,
            "filter": self.namespace_filter,
        });

        let result = self
            .client
            .post(&self.cluster_url)
            .header("IBM-API-Key", &self.api_key)
            .header("IBM-GUID", &self.guid)
            .json(&body)
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(metric = %query.metric_id, error = %e, "cluster telemetry request failed");
                return Vec::new();
            }
        };

        let raw: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(metric = %query.metric_id, error = %e, "cluster telemetry response was not valid JSON");
                return Vec::new();
            }
        };

        if let Some(dir) = self.raw_dump_dir.to_str() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!(error = %e, "failed to create raw telemetry dump directory");
            } else if let Err(e) = std::fs::write(
                self.dump_path(query),
                serde_json::to_vec(&raw).unwrap_or_default(),
            ) {
                warn!(error = %e, "failed to persist raw telemetry dump");
            }
        }

        parse_samples(&raw)
    }
}

#[async_trait]
impl AppTelemetry for HttpMonitor {
    async fn fetch(&self) -> QoeSample {
        let result = self.client.get(&self.app_metrics_url).send().await;
        let response = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "application telemetry request failed, using neutral sample");
                return QoeSample::neutral();
            }
        };

        match response.json::<CartunesMetricsResponse>().await {
            Ok(m) => {
                info!(
                    disk_usage = m.disk_usage,
                    cache_hits = m.cache_hits,
                    cache_misses = m.cache_misses,
                    playback_latency = m.avg_playback_latency,
                    download_time = m.avg_download_time,
                    "fetched application metrics"
                );
                QoeSample {
                    disk_usage: m.disk_usage,
                    cache_hits: m.cache_hits,
                    cache_misses: m.cache_misses,
                    avg_playback_latency: m.avg_playback_latency,
                    avg_download_time: m.avg_download_time,
                }
            }
            Err(e) => {
                warn!(error = %e, "application telemetry response was not valid JSON, using neutral sample");
                QoeSample::neutral()
            }
        }
    }
}

/// Expects `{"data": [{"t": <ts>, "d": [<deployment_name>, <value>]}, ...]}`.
fn parse_samples(raw: &serde_json::Value) -> Vec<QosSample> {
    let mut samples = Vec::new();
    let Some(entries) = raw.get("data").and_then(|d| d.as_array()) else {
        return samples;
    };
    for entry in entries {
        let Some(t) = entry.get("t").and_then(|v| v.as_i64()) else {
            continue;
        };
        let Some(d) = entry.get("d").and_then(|v| v.as_array()) else {
            continue;
        };
        if d.len() < 2 {
            continue;
        }
        let Some(service) = d[0].as_str() else {
            continue;
        };
        let Some(value) = d[1].as_f64() else {
            continue;
        };
        samples.push(QosSample {
            timestamp: t,
            service: ServiceId::from(service),
            value,
        });
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_samples_skips_malformed_entries() {
        let raw = serde_json::json!({
            "data": [
                {"t": 1, "d": ["acmeair-bookingservice", 42.5]},
                {"t": 2, "d": ["acmeair-authservice"]},
                {"t": 3, "missing_d": true},
            ]
        });
        let samples = parse_samples(&raw);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].service.as_str(), "acmeair-bookingservice");
        assert_eq!(samples[0].value, 42.5);
    }

    #[test]
    fn parse_samples_empty_on_missing_data_key() {
        let raw = serde_json::json!({"error": "no data"});
        assert!(parse_samples(&raw).is_empty());
    }
}
