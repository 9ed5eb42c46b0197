// ──────────────────────────────────────────────────────────────────────────────
// cartunes-mapek-controller/src/executor.rs
// ──────────────────────────────────────────────────────────────────────────────
//
// Applies a cycle's plan atomically: dry-run every affected service first
// (abort before any write on failure), then backup+apply each in plan
// order, rolling back in reverse order on the first apply failure.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::error::{ControllerError, ControllerResult};
use crate::types::{DryRunFailurePolicy, PlanDecision, ResourceConfig, ServiceId, Situation};

/// Abstraction over the subprocess boundary the original shells out to `oc`
/// through. Lets tests substitute an in-memory fake instead of spawning real
/// cluster tooling.
#[async_trait]
pub trait ClusterApply: Send + Sync {
    async fn dry_run(&self, service: &ServiceId) -> Result<(), String>;
    async fn backup(&self, service: &ServiceId, backup_path: &Path) -> Result<(), String>;
    async fn rollback(&self, service: &ServiceId, backup_path: &Path) -> Result<(), String>;
    async fn apply_self_heal_hard(&self) -> Result<(), String>;
    async fn apply_self_heal_soft(&self, service: &ServiceId, replica: i64) -> Result<(), String>;
    async fn apply_qos_warning(&self, service: &ServiceId, config: &ResourceConfig) -> Result<(), String>;
    async fn apply_qos_unhealthy(&self, service: &ServiceId, config: &ResourceConfig) -> Result<(), String>;
    async fn apply_qoe_unhealthy(&self, service: &ServiceId, config: &ResourceConfig) -> Result<(), String>;
}

/// `ClusterApply` implementation that shells out to `oc`, matching the
/// command shapes of the original controller.
pub struct OcClusterApply;

#[async_trait]
impl ClusterApply for OcClusterApply {
    async fn dry_run(&self, service: &ServiceId) -> Result<(), String> {
        run(&format!("oc get deploy {} >/dev/null 2>&1", service)).await
    }

    async fn backup(&self, service: &ServiceId, backup_path: &Path) -> Result<(), String> {
        run(&format!(
            "oc get deploy {} -o yaml > {}",
            service,
            backup_path.display()
        ))
        .await
    }

    async fn rollback(&self, _service: &ServiceId, backup_path: &Path) -> Result<(), String> {
        run(&format!("oc apply -f {}", backup_path.display())).await
    }

    async fn apply_self_heal_hard(&self) -> Result<(), String> {
        run("bash deployment.sh").await
    }

    async fn apply_self_heal_soft(&self, service: &ServiceId, replica: i64) -> Result<(), String> {
        let replica = replica.max(1);
        run(&format!(
            "oc rollout restart deployment/{service} && oc scale deployment/{service} --replicas={replica}"
        ))
        .await
    }

    async fn apply_qos_warning(&self, service: &ServiceId, config: &ResourceConfig) -> Result<(), String> {
        run(&format!(
            "oc set resources deployment/{service} --limits=cpu={}m,memory={}Mi && oc scale deployment/{service} --replicas={}",
            config.limits.cpu, config.limits.memory, config.replica
        ))
        .await
    }

    async fn apply_qos_unhealthy(&self, service: &ServiceId, config: &ResourceConfig) -> Result<(), String> {
        run(&format!(
            "oc set resources deployment/{service} --requests=cpu={}m,memory={}Mi --limits=cpu={}m,memory={}Mi && oc scale deployment/{service} --replicas={}",
            config.requests.cpu, config.requests.memory, config.limits.cpu, config.limits.memory, config.replica
        ))
        .await
    }

    async fn apply_qoe_unhealthy(&self, service: &ServiceId, config: &ResourceConfig) -> Result<(), String> {
        run(&format!(
            "cartunes-cli set-knobs --service {service} --song-quality {} --cache-size {} --preload-song {}",
            config.song_quality, config.cache_size, config.preload_song
        ))
        .await
    }
}

async fn run(command: &str) -> Result<(), String> {
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .await
        .map_err(|e| e.to_string())?;
    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).to_string())
    }
}

/// Drives the two-phase dry-run/backup/apply/rollback transaction over a
/// cycle's plan.
pub struct Executor {
    cluster: Box<dyn ClusterApply>,
    backup_dir: PathBuf,
    dry_run_failure_policy: DryRunFailurePolicy,
}

impl Executor {
    pub fn new(cluster: Box<dyn ClusterApply>, backup_dir: impl AsRef<Path>) -> Self {
        Executor {
            cluster,
            backup_dir: backup_dir.as_ref().to_path_buf(),
            dry_run_failure_policy: DryRunFailurePolicy::Abort,
        }
    }

    pub fn with_dry_run_failure_policy(mut self, policy: DryRunFailurePolicy) -> Self {
        self.dry_run_failure_policy = policy;
        self
    }

    /// Applies `plan` against `configs`. On success returns the updated
    /// configs for every service whose decision was non-null; on failure
    /// returns the original `configs` unchanged along with the error.
    pub async fn execute_plan(
        &self,
        plan: &[(ServiceId, PlanDecision)],
        configs: &HashMap<ServiceId, ResourceConfig>,
    ) -> ControllerResult<HashMap<ServiceId, ResourceConfig>> {
        info!(services = plan.len(), "starting atomic adaptation transaction");

        // Phase 1: dry-run every affected service before any write.
        for (service, _) in plan {
            if let Err(reason) = self.cluster.dry_run(service).await {
                match self.dry_run_failure_policy {
                    DryRunFailurePolicy::Abort => {
                        error!(%service, %reason, "dry-run failed, aborting transaction");
                        return Err(ControllerError::DryRunFailed {
                            service: service.to_string(),
                            reason,
                        });
                    }
                    DryRunFailurePolicy::EscalateToHardSelfHeal => {
                        warn!(%service, %reason, "dry-run failed, escalating to hard self-heal");
                        return self.escalate_to_hard_self_heal(service).await;
                    }
                }
            }
        }

        // Phase 2: backup then apply, in plan order.
        let mut backups: Vec<(ServiceId, PathBuf)> = Vec::new();
        let mut new_configs = configs.clone();
        let mut failure: Option<ControllerError> = None;

        for (service, decision) in plan {
            let backup_path = self.backup_path(service);
            let backup_ok = match self.cluster.backup(service, &backup_path).await {
                Ok(()) => true,
                Err(reason) => {
                    warn!(%service, %reason, "backup failed, proceeding without rollback safety net");
                    false
                }
            };

            // Only a service whose apply actually succeeded is eligible for
            // rollback — the service that fails apply is excluded, since
            // there is nothing on the cluster to roll back yet.
            match self.apply_one(service, decision).await {
                Ok(()) => {
                    new_configs.insert(service.clone(), decision.config.clone());
                    if backup_ok {
                        backups.push((service.clone(), backup_path));
                    }
                }
                Err(reason) => {
                    error!(%service, %reason, "apply failed");
                    failure = Some(ControllerError::ApplyFailed {
                        service: service.to_string(),
                        reason,
                    });
                    break;
                }
            }

            if decision.situation == Situation::SelfHealHard || decision.situation == Situation::SelfHealSoft {
                // Only one self-heal action is taken per cycle; matches the
                // original transaction's early exit after a self-heal apply.
                break;
            }
        }

        if let Some(err) = failure {
            warn!("rolling back {} previously applied services", backups.len());
            for (service, backup_path) in backups.iter().rev() {
                if let Err(reason) = self.cluster.rollback(service, backup_path).await {
                    error!(%service, %reason, "rollback failed");
                }
            }
            return Err(err);
        }

        info!("transaction committed successfully");
        Ok(new_configs)
    }

    async fn apply_one(&self, service: &ServiceId, decision: &PlanDecision) -> Result<(), String> {
        match decision.situation {
            Situation::SelfHealHard => self.cluster.apply_self_heal_hard().await,
            Situation::SelfHealSoft => {
                self.cluster.apply_self_heal_soft(service, decision.config.replica).await
            }
            Situation::QosWarning => self.cluster.apply_qos_warning(service, &decision.config).await,
            Situation::QosUnhealthy => self.cluster.apply_qos_unhealthy(service, &decision.config).await,
            Situation::QoeUnhealthy => self.cluster.apply_qoe_unhealthy(service, &decision.config).await,
        }
    }

    async fn escalate_to_hard_self_heal(
        &self,
        service: &ServiceId,
    ) -> ControllerResult<HashMap<ServiceId, ResourceConfig>> {
        self.cluster
            .apply_self_heal_hard()
            .await
            .map_err(|reason| ControllerError::ApplyFailed {
                service: service.to_string(),
                reason,
            })?;
        Ok(HashMap::new())
    }

    fn backup_path(&self, service: &ServiceId) -> PathBuf {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        self.backup_dir.join(format!("{service}_{timestamp}.yaml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourcePair;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeClusterState {
        dry_run_failures: std::collections::HashSet<String>,
        apply_failures: std::collections::HashSet<String>,
        rolled_back: Vec<String>,
        applied: Vec<String>,
    }

    struct FakeCluster {
        state: Arc<Mutex<FakeClusterState>>,
    }

    #[async_trait]
    impl ClusterApply for FakeCluster {
        async fn dry_run(&self, service: &ServiceId) -> Result<(), String> {
            if self.state.lock().dry_run_failures.contains(service.as_str()) {
                Err("dry run failed".to_string())
            } else {
                Ok(())
            }
        }
        async fn backup(&self, _service: &ServiceId, _backup_path: &Path) -> Result<(), String> {
            Ok(())
        }
        async fn rollback(&self, service: &ServiceId, _backup_path: &Path) -> Result<(), String> {
            self.state.lock().rolled_back.push(service.to_string());
            Ok(())
        }
        async fn apply_self_heal_hard(&self) -> Result<(), String> {
            Ok(())
        }
        async fn apply_self_heal_soft(&self, _service: &ServiceId, _replica: i64) -> Result<(), String> {
            Ok(())
        }
        async fn apply_qos_warning(&self, service: &ServiceId, _config: &ResourceConfig) -> Result<(), String> {
            self.apply(service)
        }
        async fn apply_qos_unhealthy(&self, service: &ServiceId, _config: &ResourceConfig) -> Result<(), String> {
            self.apply(service)
        }
        async fn apply_qoe_unhealthy(&self, service: &ServiceId, _config: &ResourceConfig) -> Result<(), String> {
            self.apply(service)
        }
    }

    impl FakeCluster {
        fn apply(&self, service: &ServiceId) -> Result<(), String> {
            let mut state = self.state.lock();
            if state.apply_failures.contains(service.as_str()) {
                Err("apply failed".to_string())
            } else {
                state.applied.push(service.to_string());
                Ok(())
            }
        }
    }

    fn sample_config() -> ResourceConfig {
        ResourceConfig {
            requests: ResourcePair { cpu: 500, memory: 512 },
            limits: ResourcePair { cpu: 1000, memory: 1024 },
            replica: 2,
            song_quality: 2,
            cache_size: 1000,
            preload_song: 4,
        }
    }

    #[tokio::test]
    async fn successful_plan_commits_new_configs() {
        let state = Arc::new(Mutex::new(FakeClusterState::default()));
        let executor = Executor::new(Box::new(FakeCluster { state: state.clone() }), "/tmp/backup-test");
        let mut config = sample_config();
        config.limits.cpu = 1250;
        let plan = vec![(
            ServiceId::from("svc-a"),
            PlanDecision { situation: Situation::QosWarning, config: config.clone() },
        )];
        let configs = HashMap::from([(ServiceId::from("svc-a"), sample_config())]);

        let result = executor.execute_plan(&plan, &configs).await.unwrap();
        assert_eq!(result.get(&ServiceId::from("svc-a")).unwrap().limits.cpu, 1250);
    }

    #[tokio::test]
    async fn dry_run_failure_aborts_before_any_apply() {
        let state = Arc::new(Mutex::new(FakeClusterState::default()));
        state.lock().dry_run_failures.insert("svc-a".to_string());
        let executor = Executor::new(Box::new(FakeCluster { state: state.clone() }), "/tmp/backup-test");
        let plan = vec![(
            ServiceId::from("svc-a"),
            PlanDecision { situation: Situation::QosWarning, config: sample_config() },
        )];
        let configs = HashMap::from([(ServiceId::from("svc-a"), sample_config())]);

        let result = executor.execute_plan(&plan, &configs).await;
        assert!(result.is_err());
        assert!(state.lock().applied.is_empty());
    }

    #[tokio::test]
    async fn apply_failure_rolls_back_previously_applied_services_in_reverse() {
        let state = Arc::new(Mutex::new(FakeClusterState::default()));
        state.lock().apply_failures.insert("svc-b".to_string());
        let executor = Executor::new(Box::new(FakeCluster { state: state.clone() }), "/tmp/backup-test");
        let plan = vec![
            (ServiceId::from("svc-a"), PlanDecision { situation: Situation::QosWarning, config: sample_config() }),
            (ServiceId::from("svc-b"), PlanDecision { situation: Situation::QosWarning, config: sample_config() }),
        ];
        let configs = HashMap::from([
            (ServiceId::from("svc-a"), sample_config()),
            (ServiceId::from("svc-b"), sample_config()),
        ]);

        let result = executor.execute_plan(&plan, &configs).await;
        assert!(result.is_err());
        assert_eq!(state.lock().rolled_back, vec!["svc-a".to_string()]);
    }
}
