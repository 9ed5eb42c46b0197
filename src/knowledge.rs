// ──────────────────────────────────────────────────────────────────────────────
// cartunes-mapek-controller/src/knowledge.rs
// ──────────────────────────────────────────────────────────────────────────────
//
// Persistent structured document backing thresholds, weights, baseline
// resources and global limits. Hot-reloads on file mtime change, mirroring
// the project's `config` crate's `ConfigLoader` pattern scaled down to a
// single JSON file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{ControllerError, ControllerResult};
use crate::types::{Limits, ResourceConfig, ServiceId, Thresholds, Weights};

/// On-disk shape of `knowledge.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub thresholds: Thresholds,
    pub weights: Weights,
    pub resources: HashMap<String, ResourceConfig>,
    pub resources_limitations: Limits,
    #[serde(default)]
    pub dry_run_failure_policy: crate::types::DryRunFailurePolicy,
}

/// Thread-safe handle over the knowledge document, reloaded when the backing
/// file's modification time advances. Single-loop callers never contend on
/// the inner lock; it exists so a future status endpoint can read the
/// snapshot without re-plumbing.
pub struct Knowledge {
    path: PathBuf,
    doc: RwLock<KnowledgeDocument>,
    last_modified: RwLock<SystemTime>,
}

impl Knowledge {
    /// Loads `path`, failing fast if the file is missing or malformed —
    /// unlike the Python original's `_load_json`, which silently returns
    /// `None` and lets the caller limp along with an empty knowledge base.
    /// A controller with no thresholds or limits can't make a single valid
    /// decision, so this is promoted to a startup-fatal error.
    pub fn load<P: AsRef<Path>>(path: P) -> ControllerResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ControllerError::ConfigMissing {
                path: path.display().to_string(),
            });
        }
        let raw = std::fs::read_to_string(&path)?;
        let doc: KnowledgeDocument = serde_json::from_str(&raw).map_err(|e| {
            ControllerError::ConfigInvalid {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        let last_modified = std::fs::metadata(&path)?.modified()?;
        Ok(Knowledge {
            path,
            doc: RwLock::new(doc),
            last_modified: RwLock::new(last_modified),
        })
    }

    pub fn get_thresholds(&self) -> Thresholds {
        self.doc.read().thresholds.clone()
    }

    pub fn get_weights(&self) -> Weights {
        self.doc.read().weights
    }

    pub fn get_resources(&self) -> HashMap<String, ResourceConfig> {
        self.doc.read().resources.clone()
    }

    pub fn get_resource_config(&self, service: &ServiceId) -> Option<ResourceConfig> {
        self.doc.read().resources.get(service.as_str()).cloned()
    }

    pub fn get_resource_limitations(&self) -> Limits {
        self.doc.read().resources_limitations
    }

    pub fn get_dry_run_failure_policy(&self) -> crate::types::DryRunFailurePolicy {
        self.doc.read().dry_run_failure_policy
    }

    pub fn set_threshold(&self, thresholds: Thresholds) -> ControllerResult<()> {
        self.doc.write().thresholds = thresholds;
        self.save()
    }

    pub fn set_weights(&self, weights: Weights) -> ControllerResult<()> {
        self.doc.write().weights = weights;
        self.save()
    }

    pub fn set_resource_config(
        &self,
        service: &ServiceId,
        config: ResourceConfig,
    ) -> ControllerResult<()> {
        self.doc
            .write()
            .resources
            .insert(service.as_str().to_string(), config);
        self.save()
    }

    /// Re-reads the file if its mtime has advanced since the last load/save.
    pub fn reload_if_updated(&self) -> ControllerResult<bool> {
        let modified = std::fs::metadata(&self.path)?.modified()?;
        if modified == *self.last_modified.read() {
            return Ok(false);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let doc: KnowledgeDocument =
            serde_json::from_str(&raw).map_err(|e| ControllerError::ConfigInvalid {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;
        *self.doc.write() = doc;
        *self.last_modified.write() = modified;
        Ok(true)
    }

    /// Atomically rewrites the backing file: write to a sibling `.tmp` file
    /// then rename, so a crash mid-write never corrupts the authoritative
    /// document.
    fn save(&self) -> ControllerResult<()> {
        let tmp_path = self.path.with_extension("json.tmp");
        let serialized = serde_json::to_string_pretty(&*self.doc.read())?;
        std::fs::write(&tmp_path, serialized).map_err(|e| ControllerError::ConfigWrite {
            path: tmp_path.display().to_string(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| ControllerError::ConfigWrite {
            path: self.path.display().to_string(),
            source: e,
        })?;
        *self.last_modified.write() = std::fs::metadata(&self.path)?.modified()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Band, ResourcePair};
    use std::io::Write;

    fn sample_doc() -> KnowledgeDocument {
        KnowledgeDocument {
            thresholds: Thresholds {
                cpu: Band { low: 20.0, high: 80.0 },
                memory: Band { low: 20.0, high: 80.0 },
                latency_avg: 200.0,
                latency_max: 500.0,
                error_rate: 0.05,
                playback_latency: Band { low: 0.5, high: 2.0 },
                download_time: Band { low: 1.0, high: 5.0 },
                cache_hit_ratio: Band { low: 0.5, high: 0.9 },
                disk_usage: 85.0,
                roi: 0.3,
            },
            weights: Weights {
                cpu: 0.3,
                memory: 0.3,
                latency: 0.25,
                error_rate: 0.15,
            },
            resources: HashMap::from([(
                "acmeair-bookingservice".to_string(),
                ResourceConfig {
                    requests: ResourcePair { cpu: 500, memory: 512 },
                    limits: ResourcePair { cpu: 1000, memory: 1024 },
                    replica: 2,
                    song_quality: 2,
                    cache_size: 1000,
                    preload_song: 4,
                },
            )]),
            resources_limitations: Limits {
                min_replica: 1,
                max_replica: 5,
                min_cpu: 250,
                max_cpu: 2000,
                min_memory: 256,
                max_memory: 4096,
            },
            dry_run_failure_policy: Default::default(),
        }
    }

    #[test]
    fn load_missing_file_is_fatal() {
        let err = Knowledge::load("/nonexistent/path/knowledge.json").unwrap_err();
        assert!(matches!(err, ControllerError::ConfigMissing { .. }));
    }

    #[test]
    fn load_mutate_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{}", serde_json::to_string(&sample_doc()).unwrap()).unwrap();
        drop(file);

        let knowledge = Knowledge::load(&path).unwrap();
        let mut weights = knowledge.get_weights();
        weights.cpu = 0.5;
        knowledge.set_weights(weights).unwrap();

        let reloaded = Knowledge::load(&path).unwrap();
        assert_eq!(reloaded.get_weights().cpu, 0.5);
    }

    #[test]
    fn reload_if_updated_detects_external_mtime_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.json");
        std::fs::write(&path, serde_json::to_string(&sample_doc()).unwrap()).unwrap();

        let knowledge = Knowledge::load(&path).unwrap();
        assert!(!knowledge.reload_if_updated().unwrap());

        std::thread::sleep(std::time::Duration::from_millis(10));
        let mut doc = sample_doc();
        doc.weights.cpu = 0.9;
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

        assert!(knowledge.reload_if_updated().unwrap());
        assert_eq!(knowledge.get_weights().cpu, 0.9);
    }
}
