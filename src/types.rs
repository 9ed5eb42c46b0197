// ──────────────────────────────────────────────────────────────────────────────
// cartunes-mapek-controller/src/types.rs
// ──────────────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Opaque identifier for a regulated deployment. Newtype so a raw string
/// can't be passed where a validated service id is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(pub String);

impl ServiceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServiceId {
    fn from(s: &str) -> Self {
        ServiceId(s.to_string())
    }
}

impl From<String> for ServiceId {
    fn from(s: String) -> Self {
        ServiceId(s)
    }
}

/// CPU/memory request-and-limit pair, in millicores / MiB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourcePair {
    pub cpu: i64,
    pub memory: i64,
}

/// The controller's authoritative view of a service's mutable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub requests: ResourcePair,
    pub limits: ResourcePair,
    pub replica: i64,
    pub song_quality: i64,
    pub cache_size: i64,
    pub preload_song: i64,
}

impl ResourceConfig {
    /// True if `limits >= requests` componentwise for cpu and memory.
    pub fn limits_at_least_requests(&self) -> bool {
        self.limits.cpu >= self.requests.cpu && self.limits.memory >= self.requests.memory
    }
}

/// High/low band for a single metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

/// Thresholds read from Knowledge; drives both utility normalization and
/// health-flag derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub cpu: Band,
    pub memory: Band,
    pub latency_avg: f64,
    pub latency_max: f64,
    pub error_rate: f64,
    pub playback_latency: Band,
    pub download_time: Band,
    pub cache_hit_ratio: Band,
    pub disk_usage: f64,
    pub roi: f64,
}

/// Weights for the QoS utility function. Must sum to ~1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub cpu: f64,
    pub memory: f64,
    pub latency: f64,
    pub error_rate: f64,
}

/// Global minima/maxima the Planner must never emit a value outside of.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub min_replica: i64,
    pub max_replica: i64,
    pub min_cpu: i64,
    pub max_cpu: i64,
    pub min_memory: i64,
    pub max_memory: i64,
}

/// Closed vocabulary of QoS-side health flags. No caller can construct an
/// unknown tag — this is enumerated, not stringly-typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QosFlag {
    CpuHigh,
    CpuLow,
    MemoryHigh,
    MemoryLow,
    LatencyAvgHigh,
    ErrorRateHigh,
    NoReplicas,
}

/// Closed vocabulary of QoE-side health flags.
///
/// `CacheHitHigh` is intentionally unreachable: the Planner's rule set
/// references it, but the Analyzer never emits it (see DESIGN.md). It stays
/// in the enum so the Planner's match stays exhaustive instead of silently
/// dropping a rule if the flag is ever wired up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QoeFlag {
    PlaybackLatencyHigh,
    PlaybackLatencyLow,
    DownloadTimeHigh,
    DownloadTimeLow,
    CacheHitLow,
    CacheHitHigh,
    DiskUsageHigh,
}

/// Ordered verdict tags a single cycle can carry for one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Adaptation {
    SelfHeal,
    QoeHealthy,
    QoeUnhealthy,
    QosHealthy,
    QosWarning,
    QosUnhealthy,
}

/// Result of one Analyzer pass over one service's window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub service: ServiceId,
    pub cpu_avg: f64,
    pub memory_avg: f64,
    pub latency_avg: f64,
    pub error_rate_avg: f64,
    pub qos_overall_utility: f64,
    pub qos_unhealthy_metrics: HashSet<QosFlag>,
    pub qoe_unhealthy_metrics: HashSet<QoeFlag>,
    pub adaptation: Vec<Adaptation>,
}

impl AnalysisResult {
    pub fn has_adaptation(&self, tag: Adaptation) -> bool {
        self.adaptation.contains(&tag)
    }
}

/// Situation tag selecting the Executor's apply path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Situation {
    SelfHealHard,
    SelfHealSoft,
    QoeUnhealthy,
    QosWarning,
    QosUnhealthy,
}

impl fmt::Display for Situation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Situation::SelfHealHard => "self_heal_hard",
            Situation::SelfHealSoft => "self_heal_soft",
            Situation::QoeUnhealthy => "qoe_unhealthy",
            Situation::QosWarning => "qos_warning",
            Situation::QosUnhealthy => "qos_unhealthy",
        };
        write!(f, "{s}")
    }
}

/// A single planned change for one service. Absence (`None` in the map the
/// Planner returns) means "no-op for this cycle".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDecision {
    pub situation: Situation,
    pub config: ResourceConfig,
}

/// Raw QoE telemetry sample as returned by the application metrics endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QoeSample {
    pub disk_usage: f64,
    pub cache_hits: i64,
    pub cache_misses: i64,
    pub avg_playback_latency: f64,
    pub avg_download_time: f64,
}

impl QoeSample {
    /// All-zero sample used as the fallback when the application telemetry
    /// endpoint is unreachable. See DESIGN.md's resolution of the QoE
    /// staleness open question.
    pub fn neutral() -> Self {
        QoeSample {
            disk_usage: 0.0,
            cache_hits: 0,
            cache_misses: 0,
            avg_playback_latency: 0.0,
            avg_download_time: 0.0,
        }
    }

    pub fn cache_hit_ratio(&self) -> Option<f64> {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            None
        } else {
            Some(self.cache_hits as f64 / total as f64)
        }
    }
}

/// A single raw sample for a QoS metric, keyed by deployment name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QosSample {
    pub timestamp: i64,
    pub service: ServiceId,
    pub value: f64,
}

/// Policy governing what happens when an Executor dry-run fails. Exposed as
/// a configuration bit rather than hard-coded (Open Question, see
/// DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DryRunFailurePolicy {
    /// Abort the cycle's transaction; no service is touched.
    Abort,
    /// Escalate the affected service to a hard self-heal instead of aborting.
    EscalateToHardSelfHeal,
}

impl Default for DryRunFailurePolicy {
    fn default() -> Self {
        DryRunFailurePolicy::Abort
    }
}
