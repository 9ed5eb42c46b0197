// ──────────────────────────────────────────────────────────────────────────────
// cartunes-mapek-controller/src/error.rs
// ──────────────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Errors surfaced at the crate boundary. Monitor and Analyzer failures are
/// handled internally (degrade gracefully, keep the loop running); only
/// Knowledge startup failures and Executor failures reach here.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("knowledge file missing at {path}")]
    ConfigMissing { path: String },

    #[error("knowledge file at {path} is invalid: {reason}")]
    ConfigInvalid { path: String, reason: String },

    #[error("failed to persist knowledge file at {path}: {source}")]
    ConfigWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dry-run verification failed for service {service}: {reason}")]
    DryRunFailed { service: String, reason: String },

    #[error("apply failed for service {service}: {reason}")]
    ApplyFailed { service: String, reason: String },

    #[error("rollback failed for service {service}: {reason}")]
    RollbackFailed { service: String, reason: String },

    #[error("backup failed for service {service}: {reason}")]
    BackupFailed { service: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type ControllerResult<T> = Result<T, ControllerError>;
