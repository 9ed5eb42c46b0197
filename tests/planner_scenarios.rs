// ──────────────────────────────────────────────────────────────────────────────
// cartunes-mapek-controller/tests/planner_scenarios.rs
// ──────────────────────────────────────────────────────────────────────────────
//
// End-to-end Analyzer -> Planner scenarios drawn from the seed scenarios.

use std::collections::HashSet;

use cartunes_mapek_controller::analyzer::{Analyzer, QosCycleInput};
use cartunes_mapek_controller::planner::Planner;
use cartunes_mapek_controller::types::{
    Adaptation, Band, QoeFlag, QoeSample, QosFlag, ResourceConfig, ResourcePair, ServiceId,
    Situation, Thresholds, Weights,
};

fn thresholds() -> Thresholds {
    Thresholds {
        cpu: Band { low: 20.0, high: 80.0 },
        memory: Band { low: 20.0, high: 80.0 },
        latency_avg: 200.0,
        latency_max: 500.0,
        error_rate: 0.05,
        playback_latency: Band { low: 0.5, high: 2.0 },
        download_time: Band { low: 1.0, high: 5.0 },
        cache_hit_ratio: Band { low: 0.5, high: 0.9 },
        disk_usage: 85.0,
        roi: 0.2,
    }
}

fn weights() -> Weights {
    Weights { cpu: 0.3, memory: 0.3, latency: 0.25, error_rate: 0.15 }
}

fn limits() -> cartunes_mapek_controller::types::Limits {
    cartunes_mapek_controller::types::Limits {
        min_replica: 1,
        max_replica: 5,
        min_cpu: 250,
        max_cpu: 2000,
        min_memory: 256,
        max_memory: 4096,
    }
}

fn config() -> ResourceConfig {
    ResourceConfig {
        requests: ResourcePair { cpu: 500, memory: 512 },
        limits: ResourcePair { cpu: 1000, memory: 1024 },
        replica: 2,
        song_quality: 2,
        cache_size: 1000,
        preload_song: 4,
    }
}

#[test]
fn scenario_a_cold_start_healthy_emits_no_decision() {
    let mut analyzer = Analyzer::new(thresholds(), weights());
    let svc = ServiceId::from("acmeair-bookingservice");
    let input = QosCycleInput { cpu: 40.0, memory: 50.0, latency_avg: 80.0, error_rate: 0.0, available_replicas: 2 };

    let mut verdict = None;
    for _ in 0..5 {
        verdict = analyzer.evaluate_qos(&svc, input, &QoeSample::neutral());
    }
    let result = verdict.expect("window should be full after 5 cycles");

    let planner = Planner::new(limits(), thresholds().roi);
    assert!(planner.decide(&result, &config()).is_none());
}

#[test]
fn scenario_b_sustained_cpu_saturation_triggers_symmetric_resize() {
    let mut analyzer = Analyzer::new(thresholds(), weights());
    let svc = ServiceId::from("acmeair-bookingservice");
    let input = QosCycleInput { cpu: 92.0, memory: 50.0, latency_avg: 320.0, error_rate: 0.0, available_replicas: 2 };

    let mut verdict = None;
    for _ in 0..5 {
        verdict = analyzer.evaluate_qos(&svc, input, &QoeSample::neutral());
    }
    let result = verdict.unwrap();
    assert!(result.has_adaptation(Adaptation::QosUnhealthy));

    let planner = Planner::new(limits(), thresholds().roi);
    let decision = planner.decide(&result, &config()).expect("saturated CPU should trigger a resize");
    assert_eq!(decision.situation, Situation::QosUnhealthy);
    assert!(decision.config.requests.cpu > config().requests.cpu);
    assert!(decision.config.limits.cpu > config().limits.cpu);
    assert!(decision.config.limits_at_least_requests());
}

#[test]
fn scenario_c_replica_outage_triggers_hard_self_heal() {
    let mut analyzer = Analyzer::new(thresholds(), weights());
    let svc = ServiceId::from("acmeair-bookingservice");
    let input = QosCycleInput { cpu: 40.0, memory: 50.0, latency_avg: 80.0, error_rate: 0.0, available_replicas: 0 };

    let result = analyzer.evaluate_qos(&svc, input, &QoeSample::neutral()).unwrap();
    assert!(result.qos_unhealthy_metrics.contains(&QosFlag::NoReplicas));

    let planner = Planner::new(limits(), thresholds().roi);
    let decision = planner.decide(&result, &config()).unwrap();
    assert_eq!(decision.situation, Situation::SelfHealHard);
    // Self-heal never touches the config it returns — the config IS the
    // baseline, unaltered, since the redeploy script restores from source.
    assert_eq!(decision.config, config());
}

#[test]
fn scenario_d_qoe_degradation_only_retunes_app_knobs() {
    let mut analyzer = Analyzer::new(thresholds(), weights());
    let svc = ServiceId::from("acmeair-bookingservice");
    let input = QosCycleInput { cpu: 50.0, memory: 50.0, latency_avg: 80.0, error_rate: 0.0, available_replicas: 2 };
    let qoe = QoeSample {
        disk_usage: 10.0,
        cache_hits: 2,
        cache_misses: 8,
        avg_playback_latency: 1.0,
        avg_download_time: 6.0,
    };

    let mut verdict = None;
    for _ in 0..5 {
        verdict = analyzer.evaluate_qos(&svc, input, &qoe);
    }
    let result = verdict.unwrap();
    assert!(result.has_adaptation(Adaptation::QoeUnhealthy));
    assert!(result.has_adaptation(Adaptation::QosHealthy));
    assert!(result.qoe_unhealthy_metrics.contains(&QoeFlag::DownloadTimeHigh));
    assert!(result.qoe_unhealthy_metrics.contains(&QoeFlag::CacheHitLow));

    let planner = Planner::new(limits(), thresholds().roi);
    let decision = planner.decide(&result, &config()).unwrap();
    assert_eq!(decision.situation, Situation::QoeUnhealthy);
    assert_eq!(decision.config.cache_size, config().cache_size + 500);
    assert_eq!(decision.config.preload_song, config().preload_song - 2);
    assert_eq!(decision.config.requests.cpu, config().requests.cpu);
    assert_eq!(decision.config.limits.cpu, config().limits.cpu);
}

#[test]
fn scenario_e_flap_suppression_keeps_oscillation_healthy() {
    let mut analyzer = Analyzer::new(thresholds(), weights());
    let svc = ServiceId::from("acmeair-bookingservice");
    let values = [55.0, 65.0, 55.0, 65.0, 55.0];

    let mut verdict = None;
    for v in values {
        let input = QosCycleInput { cpu: v, memory: 50.0, latency_avg: 80.0, error_rate: 0.0, available_replicas: 2 };
        verdict = analyzer.evaluate_qos(&svc, input, &QoeSample::neutral());
    }
    let result = verdict.unwrap();

    let planner = Planner::new(limits(), thresholds().roi);
    assert!(planner.decide(&result, &config()).is_none());
}

#[test]
fn invariant_planner_never_violates_global_limits() {
    let lim = limits();
    let thresh = thresholds();
    let planner = Planner::new(lim, thresh.roi);

    let mut unhealthy = HashSet::new();
    unhealthy.insert(QosFlag::CpuHigh);
    unhealthy.insert(QosFlag::LatencyAvgHigh);
    unhealthy.insert(QosFlag::MemoryHigh);

    let result = cartunes_mapek_controller::types::AnalysisResult {
        service: ServiceId::from("acmeair-bookingservice"),
        cpu_avg: 95.0,
        memory_avg: 95.0,
        latency_avg: 400.0,
        error_rate_avg: 0.1,
        qos_overall_utility: 0.2,
        qos_unhealthy_metrics: unhealthy,
        qoe_unhealthy_metrics: HashSet::new(),
        adaptation: vec![Adaptation::QoeHealthy, Adaptation::QosUnhealthy],
    };

    // Start already pinned near the ceiling.
    let mut near_max = config();
    near_max.requests.cpu = lim.max_cpu - 100;
    near_max.limits.cpu = lim.max_cpu - 100;
    near_max.requests.memory = lim.max_memory - 100;
    near_max.limits.memory = lim.max_memory - 100;

    if let Some(decision) = planner.decide(&result, &near_max) {
        assert!(decision.config.requests.cpu <= lim.max_cpu);
        assert!(decision.config.limits.cpu <= lim.max_cpu);
        assert!(decision.config.requests.memory <= lim.max_memory);
        assert!(decision.config.limits.memory <= lim.max_memory);
        assert!(decision.config.replica <= lim.max_replica);
        assert!(decision.config.limits_at_least_requests());
    }
}
