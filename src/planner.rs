// ──────────────────────────────────────────────────────────────────────────────
// cartunes-mapek-controller/src/planner.rs
// ──────────────────────────────────────────────────────────────────────────────
//
// Pure, deterministic mapping from (AnalysisResult, current ResourceConfig)
// to at most one PlanDecision. No I/O, no mutable shared state — this makes
// the decision precedence and the Pareto/ROI gate directly property-testable.

use crate::types::{
    Adaptation, AnalysisResult, Limits, PlanDecision, QoeFlag, QosFlag, ResourceConfig,
    ResourcePair, Situation,
};

const CPU_STEP: i64 = 250;
const MEMORY_STEP: i64 = 256;
const ROI_EPSILON: f64 = 1e-6;

pub struct Planner {
    limits: Limits,
    roi_threshold: f64,
}

impl Planner {
    pub fn new(limits: Limits, roi_threshold: f64) -> Self {
        Planner { limits, roi_threshold }
    }

    /// Evaluates every service's analysis result against its current config
    /// and returns a map of service → decision (absent entries are no-ops).
    pub fn evaluate_services<'a, I>(&self, results: I) -> Vec<(String, Option<PlanDecision>)>
    where
        I: IntoIterator<Item = (&'a str, &'a AnalysisResult, &'a ResourceConfig)>,
    {
        results
            .into_iter()
            .map(|(svc, result, config)| (svc.to_string(), self.decide(result, config)))
            .collect()
    }

    /// Decision precedence: self-heal (unconditional) > QoE rules (always
    /// applied when flagged) > QoS warning/unhealthy deltas > Pareto+ROI
    /// gate for the remaining QoS-only move.
    pub fn decide(&self, result: &AnalysisResult, config: &ResourceConfig) -> Option<PlanDecision> {
        if result.has_adaptation(Adaptation::SelfHeal) {
            let situation = if result.qos_unhealthy_metrics.contains(&QosFlag::NoReplicas) {
                Situation::SelfHealHard
            } else {
                Situation::SelfHealSoft
            };
            return Some(PlanDecision {
                situation,
                config: config.clone(),
            });
        }

        let mut new_config = config.clone();
        let mut qoe_fixed = false;

        if result.has_adaptation(Adaptation::QoeUnhealthy) {
            new_config = adopt_qoe_unhealthy(&result.qoe_unhealthy_metrics, new_config);
            qoe_fixed = true;
        }

        let qos_tier = if result.has_adaptation(Adaptation::QosWarning) {
            Some(Situation::QosWarning)
        } else if result.has_adaptation(Adaptation::QosUnhealthy) {
            Some(Situation::QosUnhealthy)
        } else {
            None
        };

        new_config = match qos_tier {
            Some(Situation::QosWarning) => {
                self.adopt_qos_warning(&result.qos_unhealthy_metrics, new_config)
            }
            Some(Situation::QosUnhealthy) => {
                self.adopt_qos_unhealthy(&result.qos_unhealthy_metrics, new_config)
            }
            _ => new_config,
        };

        if qoe_fixed && qos_tier.is_none() {
            return Some(PlanDecision {
                situation: Situation::QoeUnhealthy,
                config: new_config,
            });
        }

        if result.has_adaptation(Adaptation::QosHealthy) {
            return if qoe_fixed {
                Some(PlanDecision {
                    situation: Situation::QoeUnhealthy,
                    config: new_config,
                })
            } else {
                None
            };
        }

        let situation = qos_tier?;

        let old_cpu_mid = midpoint(config.requests.cpu, config.limits.cpu);
        let cpu_now = midpoint(new_config.requests.cpu, new_config.limits.cpu);
        let latency_now = result.latency_avg;

        let candidates = self.cpu_candidates(&new_config, cpu_now, latency_now);
        let pareto = pareto_frontier(&candidates);

        let old_memory_mid = midpoint(config.requests.memory, config.limits.memory);
        let old_replica = config.replica;

        // Candidate-level benefit is the fraction of latency relieved, not
        // raw CPU given back: a candidate that shrinks CPU back toward the
        // pre-incident baseline costs ~nothing but undoes the saturation fix,
        // so scoring it on CPU delta alone lets a free no-op always win. A
        // saturated service only actually benefits from the candidates that
        // lower its projected latency.
        let mut best: Option<&CpuCandidate> = None;
        let mut best_roi = f64::NEG_INFINITY;
        for candidate in &pareto {
            let new_memory_mid = midpoint(new_config.requests.memory, new_config.limits.memory);
            let new_replica = new_config.replica;
            let cost = move_cost(
                candidate.cpu_after,
                old_cpu_mid,
                new_memory_mid,
                old_memory_mid,
                new_replica,
                old_replica,
            );
            let benefit = if latency_now != 0.0 {
                (latency_now - candidate.latency_after) / latency_now
            } else {
                0.0
            };
            let roi = benefit / (cost + ROI_EPSILON);
            if roi > best_roi {
                best_roi = roi;
                best = Some(candidate);
            }
        }

        if let Some(chosen) = best {
            new_config = chosen.config.clone();
        }

        let final_cpu_mid = midpoint(new_config.requests.cpu, new_config.limits.cpu);
        let final_memory_mid = midpoint(new_config.requests.memory, new_config.limits.memory);
        let final_replica = new_config.replica;

        let cost = move_cost(
            final_cpu_mid,
            old_cpu_mid,
            final_memory_mid,
            old_memory_mid,
            final_replica,
            old_replica,
        );
        let benefit = 0.5 * ratio_delta(final_cpu_mid, old_cpu_mid)
            + 0.5 * ratio_delta(final_memory_mid, old_memory_mid);
        let roi = benefit.abs() / (cost + ROI_EPSILON);

        if roi < self.roi_threshold {
            return None;
        }

        Some(PlanDecision {
            situation,
            config: new_config,
        })
    }

    fn cpu_candidates(
        &self,
        base: &ResourceConfig,
        cpu_now: f64,
        latency_now: f64,
    ) -> Vec<CpuCandidate> {
        [-CPU_STEP, 0, CPU_STEP]
            .into_iter()
            .map(|delta| {
                let new_cpu = ((cpu_now as i64 + delta).max(self.limits.min_cpu)).min(self.limits.max_cpu);
                let mut cfg = base.clone();
                cfg.requests.cpu = new_cpu;
                cfg.limits.cpu = new_cpu;
                let latency_after = if new_cpu != 0 {
                    latency_now * (cpu_now / new_cpu as f64)
                } else {
                    latency_now
                };
                CpuCandidate {
                    cpu_after: new_cpu as f64,
                    latency_after,
                    config: cfg,
                }
            })
            .collect()
    }

    fn adopt_qos_warning(&self, flags: &std::collections::HashSet<QosFlag>, mut cfg: ResourceConfig) -> ResourceConfig {
        if flags.contains(&QosFlag::CpuHigh) && flags.contains(&QosFlag::LatencyAvgHigh) {
            cfg.limits.cpu = (cfg.limits.cpu + CPU_STEP).min(self.limits.max_cpu);
        }
        if flags.contains(&QosFlag::MemoryHigh) {
            cfg.limits.memory = (cfg.limits.memory + MEMORY_STEP).min(self.limits.max_memory);
        }
        if flags.contains(&QosFlag::CpuLow) {
            cfg.limits.cpu = (cfg.limits.cpu - CPU_STEP).max(self.limits.min_cpu);
        }
        if flags.contains(&QosFlag::MemoryLow) {
            cfg.limits.memory = (cfg.limits.memory - MEMORY_STEP).max(self.limits.min_memory);
        }

        let limits_at_ceiling = cfg.limits.cpu >= self.limits.max_cpu || cfg.limits.memory >= self.limits.max_memory;
        if limits_at_ceiling
            && (flags.contains(&QosFlag::LatencyAvgHigh) || flags.contains(&QosFlag::ErrorRateHigh))
        {
            cfg.replica = (cfg.replica + 1).min(self.limits.max_replica);
        }
        if flags.contains(&QosFlag::CpuLow) && flags.contains(&QosFlag::MemoryLow) {
            cfg.replica = (cfg.replica - 1).max(self.limits.min_replica);
        }
        cfg
    }

    fn adopt_qos_unhealthy(&self, flags: &std::collections::HashSet<QosFlag>, mut cfg: ResourceConfig) -> ResourceConfig {
        if flags.contains(&QosFlag::CpuHigh) && flags.contains(&QosFlag::LatencyAvgHigh) {
            cfg.requests.cpu = (cfg.requests.cpu + CPU_STEP).min(self.limits.max_cpu);
            cfg.limits.cpu = (cfg.limits.cpu + CPU_STEP).min(self.limits.max_cpu);
        }
        if flags.contains(&QosFlag::MemoryHigh) {
            cfg.requests.memory = (cfg.requests.memory + MEMORY_STEP).min(self.limits.max_memory);
            cfg.limits.memory = (cfg.limits.memory + MEMORY_STEP).min(self.limits.max_memory);
        }
        if flags.contains(&QosFlag::CpuLow) {
            cfg.requests.cpu = (cfg.requests.cpu - CPU_STEP).max(self.limits.min_cpu);
            cfg.limits.cpu = (cfg.limits.cpu - CPU_STEP).max(self.limits.min_cpu);
        }
        if flags.contains(&QosFlag::MemoryLow) {
            cfg.requests.memory = (cfg.requests.memory - MEMORY_STEP).max(self.limits.min_memory);
            cfg.limits.memory = (cfg.limits.memory - MEMORY_STEP).max(self.limits.min_memory);
        }

        if (flags.contains(&QosFlag::LatencyAvgHigh) || flags.contains(&QosFlag::ErrorRateHigh))
            && (flags.contains(&QosFlag::CpuHigh) || flags.contains(&QosFlag::MemoryHigh))
        {
            cfg.replica = (cfg.replica + 1).min(self.limits.max_replica);
        }
        if flags.contains(&QosFlag::CpuLow) && flags.contains(&QosFlag::MemoryLow) {
            cfg.replica = (cfg.replica - 1).max(self.limits.min_replica);
        }
        cfg
    }
}

#[derive(Debug, Clone)]
struct CpuCandidate {
    cpu_after: f64,
    latency_after: f64,
    config: ResourceConfig,
}

fn adopt_qoe_unhealthy(flags: &std::collections::HashSet<QoeFlag>, mut cfg: ResourceConfig) -> ResourceConfig {
    if flags.contains(&QoeFlag::PlaybackLatencyHigh) && flags.contains(&QoeFlag::DownloadTimeHigh) {
        cfg.song_quality = (cfg.song_quality - 1).max(1);
    }
    if flags.contains(&QoeFlag::PlaybackLatencyLow) && flags.contains(&QoeFlag::DownloadTimeLow) {
        cfg.song_quality = (cfg.song_quality + 1).min(3);
    }
    if flags.contains(&QoeFlag::CacheHitHigh) {
        cfg.cache_size -= 100;
    }
    if flags.contains(&QoeFlag::CacheHitLow) {
        cfg.cache_size += 500;
    }
    if flags.contains(&QoeFlag::DownloadTimeHigh) && flags.contains(&QoeFlag::CacheHitLow) {
        cfg.preload_song = (cfg.preload_song - 2).max(0);
    }
    if flags.contains(&QoeFlag::DownloadTimeLow) {
        cfg.preload_song = (cfg.preload_song + 2).min(10);
    }
    cfg
}

/// Dominance check over (cpu_after, latency_after), both minimized. O(n^2)
/// over a handful of candidates, so the quadratic scan is not worth
/// optimizing away.
fn pareto_frontier(candidates: &[CpuCandidate]) -> Vec<CpuCandidate> {
    candidates
        .iter()
        .enumerate()
        .filter(|(i, c1)| {
            !candidates.iter().enumerate().any(|(j, c2)| {
                j != *i
                    && c2.cpu_after <= c1.cpu_after
                    && c2.latency_after <= c1.latency_after
                    && (c2.cpu_after < c1.cpu_after || c2.latency_after < c1.latency_after)
            })
        })
        .map(|(_, c)| c.clone())
        .collect()
}

fn midpoint(a: i64, b: i64) -> f64 {
    (a + b) as f64 / 2.0
}

fn ratio_delta(new: f64, old: f64) -> f64 {
    if old == 0.0 {
        0.0
    } else {
        (new - old) / old
    }
}

fn move_cost(new_cpu: f64, old_cpu: f64, new_mem: f64, old_mem: f64, new_rep: i64, old_rep: i64) -> f64 {
    let cpu_cost = if old_cpu != 0.0 { ((new_cpu - old_cpu) / old_cpu).abs() } else { 0.0 };
    let mem_cost = if old_mem != 0.0 { ((new_mem - old_mem) / old_mem).abs() } else { 0.0 };
    let replica_cost = if old_rep != 0 {
        ((new_rep - old_rep) as f64 / old_rep as f64).abs()
    } else {
        0.0
    };
    0.4 * cpu_cost + 0.4 * mem_cost + 0.2 * replica_cost
}
