// ──────────────────────────────────────────────────────────────────────────────
// cartunes-mapek-controller/src/analyzer.rs
// ──────────────────────────────────────────────────────────────────────────────
//
// Maintains per-service sliding windows over QoS metrics, computes the QoS
// utility function and health-flag sets, and fuses them with QoE telemetry
// into a single verdict per service per cycle.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::types::{
    Adaptation, AnalysisResult, Band, QoeFlag, QoeSample, QosFlag, ServiceId, Thresholds, Weights,
};

const WINDOW_CAPACITY: usize = 5;
const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// A fixed-capacity FIFO of the most recent samples for one (service,
/// metric) pair. Aggregate read is the arithmetic mean.
#[derive(Debug, Clone, Default)]
pub struct SlidingWindow {
    samples: VecDeque<f64>,
}

impl SlidingWindow {
    pub fn push(&mut self, value: f64) {
        if self.samples.len() == WINDOW_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn fill_ratio(&self) -> f64 {
        self.samples.len() as f64 / WINDOW_CAPACITY as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Per-service bundle of the four QoS sliding windows.
#[derive(Debug, Clone, Default)]
struct ServiceWindows {
    cpu: SlidingWindow,
    memory: SlidingWindow,
    latency_avg: SlidingWindow,
    error_rate: SlidingWindow,
}

/// One QoS sample batch for a single service, as handed to the Analyzer
/// after the Monitor's per-metric fetches have been grouped and averaged
/// for this cycle.
#[derive(Debug, Clone, Copy)]
pub struct QosCycleInput {
    pub cpu: f64,
    pub memory: f64,
    pub latency_avg: f64,
    pub error_rate: f64,
    pub available_replicas: i64,
}

/// Owns the sliding windows across cycles. One instance lives for the
/// lifetime of the control loop.
pub struct Analyzer {
    windows: HashMap<ServiceId, ServiceWindows>,
    thresholds: Thresholds,
    weights: Weights,
    confidence_threshold: f64,
    confidence_gate_enabled: bool,
}

impl Analyzer {
    pub fn new(thresholds: Thresholds, weights: Weights) -> Self {
        Analyzer {
            windows: HashMap::new(),
            thresholds,
            weights,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            confidence_gate_enabled: true,
        }
    }

    /// Disables the cold-start confidence gate. Exposed for tests and for
    /// operators who'd rather see flappy early verdicts than none at all.
    pub fn with_confidence_gate(mut self, enabled: bool) -> Self {
        self.confidence_gate_enabled = enabled;
        self
    }

    pub fn update_thresholds(&mut self, thresholds: Thresholds) {
        self.thresholds = thresholds;
    }

    pub fn update_weights(&mut self, weights: Weights) {
        self.weights = weights;
    }

    /// Appends this cycle's QoS sample to the service's windows and, if the
    /// window is sufficiently full, returns a verdict. Returns `None` under
    /// the confidence gate (cold start / too few samples) — the caller
    /// should treat `None` as "skip planning for this service this cycle".
    /// A replica outage bypasses the gate and always emits a verdict: a
    /// service with zero available replicas can't wait for the window to
    /// fill before the self-heal path gets a chance to run.
    pub fn evaluate_qos(
        &mut self,
        service: &ServiceId,
        input: QosCycleInput,
        qoe: &QoeSample,
    ) -> Option<AnalysisResult> {
        let entry = self.windows.entry(service.clone()).or_default();
        entry.cpu.push(input.cpu);
        entry.memory.push(input.memory);
        entry.latency_avg.push(input.latency_avg);
        entry.error_rate.push(input.error_rate);

        let no_replicas = input.available_replicas <= 0;
        let confidence = entry.cpu.fill_ratio();
        if !no_replicas && self.confidence_gate_enabled && confidence < self.confidence_threshold {
            return None;
        }

        let cpu_avg = entry.cpu.mean();
        let memory_avg = entry.memory.mean();
        let latency_avg = entry.latency_avg.mean();
        let error_rate_avg = entry.error_rate.mean();

        let cpu_utility = normalize_band_preference(self.thresholds.cpu, cpu_avg);
        let memory_utility = normalize_band_preference(self.thresholds.memory, memory_avg);
        let latency_utility = normalize_inverse(self.thresholds.latency_avg, latency_avg);
        let error_utility = normalize_inverse(self.thresholds.error_rate, error_rate_avg);

        let qos_overall_utility = cpu_utility * self.weights.cpu
            + memory_utility * self.weights.memory
            + latency_utility * self.weights.latency
            + error_utility * self.weights.error_rate;

        let mut qos_flags = HashSet::new();
        if cpu_avg > self.thresholds.cpu.high {
            qos_flags.insert(QosFlag::CpuHigh);
        } else if cpu_avg < self.thresholds.cpu.low {
            qos_flags.insert(QosFlag::CpuLow);
        }
        if memory_avg > self.thresholds.memory.high {
            qos_flags.insert(QosFlag::MemoryHigh);
        } else if memory_avg < self.thresholds.memory.low {
            qos_flags.insert(QosFlag::MemoryLow);
        }
        if latency_avg > self.thresholds.latency_avg {
            qos_flags.insert(QosFlag::LatencyAvgHigh);
        }
        if error_rate_avg > self.thresholds.error_rate {
            qos_flags.insert(QosFlag::ErrorRateHigh);
        }
        if no_replicas {
            qos_flags.insert(QosFlag::NoReplicas);
        }

        let qoe_flags = evaluate_qoe_flags(&self.thresholds, qoe);

        let mut adaptation = Vec::new();
        if qos_flags.contains(&QosFlag::NoReplicas) {
            adaptation.push(Adaptation::SelfHeal);
        }
        if qoe_flags.is_empty() {
            adaptation.push(Adaptation::QoeHealthy);
        } else {
            adaptation.push(Adaptation::QoeUnhealthy);
        }

        let qos_tier = if qos_overall_utility >= 0.8 && qos_flags.is_empty() {
            Adaptation::QosHealthy
        } else if qos_overall_utility < 0.5 || qos_flags.len() >= 2 {
            Adaptation::QosUnhealthy
        } else {
            Adaptation::QosWarning
        };
        adaptation.push(qos_tier);

        Some(AnalysisResult {
            service: service.clone(),
            cpu_avg,
            memory_avg,
            latency_avg,
            error_rate_avg,
            qos_overall_utility,
            qos_unhealthy_metrics: qos_flags,
            qoe_unhealthy_metrics: qoe_flags,
            adaptation,
        })
    }
}

/// `(x - low) / (high - low)`: mid-band values score near 1, saturation or
/// under-use score poorly.
fn normalize_band_preference(band: Band, value: f64) -> f64 {
    let span = band.high - band.low;
    if span == 0.0 {
        return 0.0;
    }
    (value - band.low) / span
}

/// `max(0, 1 - min(x/threshold, 1))`: values at or below zero score 1,
/// values at or beyond threshold score 0.
fn normalize_inverse(threshold: f64, value: f64) -> f64 {
    if threshold == 0.0 {
        return 0.0;
    }
    (1.0 - (value / threshold).min(1.0)).max(0.0)
}

/// Derives QoE flags from a sample. A neutral (all-zero) sample — the
/// fallback used when the application telemetry endpoint is unreachable —
/// is treated as QoE-healthy rather than evaluated against thresholds, so a
/// telemetry outage never fires spurious low-value flags.
fn evaluate_qoe_flags(thresholds: &Thresholds, qoe: &QoeSample) -> HashSet<QoeFlag> {
    let mut flags = HashSet::new();
    if *qoe == QoeSample::neutral() {
        return flags;
    }

    if qoe.avg_playback_latency > thresholds.playback_latency.high {
        flags.insert(QoeFlag::PlaybackLatencyHigh);
    } else if qoe.avg_playback_latency < thresholds.playback_latency.low {
        flags.insert(QoeFlag::PlaybackLatencyLow);
    }

    if qoe.avg_download_time > thresholds.download_time.high {
        flags.insert(QoeFlag::DownloadTimeHigh);
    } else if qoe.avg_download_time < thresholds.download_time.low {
        flags.insert(QoeFlag::DownloadTimeLow);
    }

    if let Some(ratio) = qoe.cache_hit_ratio() {
        if ratio < thresholds.cache_hit_ratio.low {
            flags.insert(QoeFlag::CacheHitLow);
        }
        // `CacheHitHigh` is intentionally never emitted — see DESIGN.md.
    }

    if qoe.disk_usage > thresholds.disk_usage {
        flags.insert(QoeFlag::DiskUsageHigh);
    }

    flags
}
