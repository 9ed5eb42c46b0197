// ──────────────────────────────────────────────────────────────────────────────
// cartunes-mapek-controller/src/orchestrator.rs
// ──────────────────────────────────────────────────────────────────────────────
//
// Ties Knowledge/Monitor/Analyzer/Planner/Executor together and drives the
// single-threaded MAPE-K cycle: Monitor.fetch -> Analyzer.process ->
// Planner.evaluate -> Executor.apply -> persist/log, sleeping `sleep_secs`
// between iterations.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::analyzer::{Analyzer, QosCycleInput};
use crate::dataset_log::DatasetLog;
use crate::executor::Executor;
use crate::knowledge::Knowledge;
use crate::monitor::{AppTelemetry, ClusterTelemetry, MetricQuery};
use crate::planner::Planner;
use crate::types::{PlanDecision, ResourceConfig, ServiceId};

/// Parallel QoS metric queries issued once per cycle. Mirrors the original
/// `monitor_metrics` list, which is broader than what the Analyzer actually
/// consumes — several of these are carried purely for the dataset CSV.
pub fn default_monitor_queries() -> Vec<MetricQuery> {
    [
        ("cpu.quota.used.percent", "avg"),
        ("memory.limit.used.percent", "avg"),
        ("jvm.heap.used.percent", "avg"),
        ("jvm.gc.global.time", "avg"),
        ("kubernetes.deployment.replicas.available", "max"),
        ("net.http.request.time", "max"),
        ("net.request.count.in", "sum"),
        ("net.http.error.count", "sum"),
        ("net.request.time.in", "max"),
        ("net.bytes.in", "max"),
        ("net.bytes.out", "max"),
        ("net.bytes.total", "max"),
        ("jvm.nonHeap.used.percent", "avg"),
        ("jvm.thread.count", "max"),
        ("jvm.gc.global.count", "sum"),
    ]
    .into_iter()
    .map(|(id, agg)| MetricQuery::new(id, agg))
    .collect()
}

/// The subset of `default_monitor_queries` the Analyzer actually reduces
/// into a verdict, keyed the same way as `analyze_metrics` in the original
/// driver.
struct AnalyzeKeys {
    cpu: MetricQuery,
    memory: MetricQuery,
    latency_avg: MetricQuery,
    error_count: MetricQuery,
    request_count: MetricQuery,
    available_replicas: MetricQuery,
}

impl Default for AnalyzeKeys {
    fn default() -> Self {
        AnalyzeKeys {
            cpu: MetricQuery::new("cpu.quota.used.percent", "avg"),
            memory: MetricQuery::new("memory.limit.used.percent", "avg"),
            latency_avg: MetricQuery::new("net.request.time.in", "max"),
            error_count: MetricQuery::new("net.http.error.count", "sum"),
            request_count: MetricQuery::new("net.request.count.in", "sum"),
            available_replicas: MetricQuery::new("kubernetes.deployment.replicas.available", "max"),
        }
    }
}

pub struct Controller {
    knowledge: Arc<Knowledge>,
    cluster: Arc<dyn ClusterTelemetry>,
    app_telemetry: Arc<dyn AppTelemetry>,
    executor: Executor,
    dataset_log: DatasetLog,
    services: Vec<ServiceId>,
    sleep_secs: u64,
}

impl Controller {
    pub fn new(
        knowledge: Arc<Knowledge>,
        cluster: Arc<dyn ClusterTelemetry>,
        app_telemetry: Arc<dyn AppTelemetry>,
        executor: Executor,
        dataset_log: DatasetLog,
        services: Vec<ServiceId>,
        sleep_secs: u64,
    ) -> Self {
        Controller {
            knowledge,
            cluster,
            app_telemetry,
            executor,
            dataset_log,
            services,
            sleep_secs,
        }
    }

    /// Runs the MAPE-K loop forever, sleeping `sleep_secs` between cycles.
    pub async fn run(&self) {
        let mut analyzer = Analyzer::new(self.knowledge.get_thresholds(), self.knowledge.get_weights());
        let analyze_keys = AnalyzeKeys::default();
        let queries = default_monitor_queries();
        let mut cycle: u64 = 0;

        loop {
            cycle += 1;
            info!(cycle, "starting MAPE-K cycle");

            if let Err(e) = self.knowledge.reload_if_updated() {
                warn!(error = %e, "failed to reload knowledge file");
            } else {
                analyzer.update_thresholds(self.knowledge.get_thresholds());
                analyzer.update_weights(self.knowledge.get_weights());
            }

            // MONITOR
            let samples = self.cluster.fetch_all_for(&queries).await;
            let qoe = self.app_telemetry.fetch().await;

            // ANALYZE
            let mut analysis_results = HashMap::new();
            for service in &self.services {
                let input = build_cycle_input(&analyze_keys, &samples, service);
                if let Some(result) = analyzer.evaluate_qos(service, input, &qoe) {
                    analysis_results.insert(service.clone(), result);
                }
            }

            if analysis_results.is_empty() {
                warn!(cycle, "no analysis results this cycle, skipping plan/execute");
                self.log_dataset(cycle, &samples);
                tokio::time::sleep(std::time::Duration::from_secs(self.sleep_secs)).await;
                continue;
            }

            // PLAN
            let limits = self.knowledge.get_resource_limitations();
            let thresholds = self.knowledge.get_thresholds();
            let planner = Planner::new(limits, thresholds.roi);
            let current_configs: HashMap<ServiceId, ResourceConfig> = self
                .services
                .iter()
                .filter_map(|s| self.knowledge.get_resource_config(s).map(|c| (s.clone(), c)))
                .collect();

            let mut plan: Vec<(ServiceId, PlanDecision)> = Vec::new();
            for (service, result) in &analysis_results {
                let Some(config) = current_configs.get(service) else {
                    continue;
                };
                if let Some(decision) = planner.decide(result, config) {
                    info!(%service, situation = %decision.situation, "planned adaptation");
                    plan.push((service.clone(), decision));
                }
            }

            // EXECUTE
            if !plan.is_empty() {
                match self.executor.execute_plan(&plan, &current_configs).await {
                    Ok(new_configs) => {
                        for (service, config) in new_configs.iter() {
                            if current_configs.get(service) != Some(config) {
                                if let Err(e) = self.knowledge.set_resource_config(service, config.clone()) {
                                    warn!(%service, error = %e, "failed to persist updated resource config");
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "execute_plan failed, authoritative config unchanged");
                    }
                }
            } else {
                info!(cycle, "no adaptations planned this cycle");
            }

            // KNOWLEDGE / dataset persistence, unconditional even on a failed execute.
            self.log_dataset(cycle, &samples);

            tokio::time::sleep(std::time::Duration::from_secs(self.sleep_secs)).await;
        }
    }

    fn log_dataset(&self, _cycle: u64, samples: &HashMap<MetricQuery, Vec<crate::types::QosSample>>) {
        let timestamp = Utc::now().timestamp();
        let mut rows: HashMap<ServiceId, crate::dataset_log::ServiceRow> = HashMap::new();
        let column_map: [(&str, &str, &'static str); 12] = [
            ("cpu.quota.used.percent", "avg", "cpu.quota.used.percent"),
            ("memory.limit.used.percent", "avg", "memory.limit.used.percent"),
            ("jvm.heap.used.percent", "avg", "jvm.heap.used.percent"),
            ("jvm.gc.global.time", "avg", "jvm.gc.global.time"),
            ("kubernetes.deployment.replicas.available", "max", "kubernetes.deployment.replicas.available"),
            ("net.http.request.time", "max", "net.http.request.time"),
            ("net.request.count.in", "sum", "net.request.count.in"),
            ("net.http.error.count", "sum", "net.http.error.count"),
            ("net.request.time.in", "max", "net.request.time.in"),
            ("net.bytes.in", "max", "net.bytes.in"),
            ("net.bytes.out", "max", "net.bytes.out"),
            ("net.bytes.total", "max", "net.bytes.total"),
        ];
        for (id, agg, header) in column_map {
            let query = MetricQuery::new(id, agg);
            let Some(values) = samples.get(&query) else { continue };
            let mut per_service: HashMap<ServiceId, (f64, usize)> = HashMap::new();
            for sample in values {
                let entry = per_service.entry(sample.service.clone()).or_insert((0.0, 0));
                entry.0 += sample.value;
                entry.1 += 1;
            }
            for (service, (sum, count)) in per_service {
                if count == 0 {
                    continue;
                }
                rows.entry(service).or_default().insert(header, sum / count as f64);
            }
        }
        self.dataset_log.append(timestamp, &rows, &self.services);
    }
}

fn build_cycle_input(
    keys: &AnalyzeKeys,
    samples: &HashMap<MetricQuery, Vec<crate::types::QosSample>>,
    service: &ServiceId,
) -> QosCycleInput {
    let mean_for = |query: &MetricQuery| -> f64 {
        let Some(values) = samples.get(query) else { return 0.0 };
        let matching: Vec<f64> = values
            .iter()
            .filter(|s| &s.service == service)
            .map(|s| s.value)
            .collect();
        if matching.is_empty() {
            0.0
        } else {
            matching.iter().sum::<f64>() / matching.len() as f64
        }
    };

    let request_count = mean_for(&keys.request_count);
    let error_count = mean_for(&keys.error_count);
    let error_rate = if request_count > 0.0 { error_count / request_count } else { 0.0 };
    let available_replicas = mean_for(&keys.available_replicas) as i64;

    QosCycleInput {
        cpu: mean_for(&keys.cpu),
        memory: mean_for(&keys.memory),
        latency_avg: mean_for(&keys.latency_avg),
        error_rate,
        available_replicas,
    }
}
