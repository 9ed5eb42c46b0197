// ──────────────────────────────────────────────────────────────────────────────
// cartunes-mapek-controller/src/lib.rs
// ──────────────────────────────────────────────────────────────────────────────
//
// MAPE-K self-adaptive controller for the cartunes music-streaming service.
// Regulates container resources (CPU/memory requests & limits, replica
// count) and application QoE knobs (song quality, cache size, preload
// depth) from fused infrastructure and application telemetry.

pub mod analyzer;
pub mod dataset_log;
pub mod error;
pub mod executor;
pub mod knowledge;
pub mod monitor;
pub mod orchestrator;
pub mod planner;
pub mod types;

pub use analyzer::{Analyzer, QosCycleInput, SlidingWindow};
pub use error::{ControllerError, ControllerResult};
pub use executor::Executor;
pub use knowledge::{Knowledge, KnowledgeDocument};
pub use orchestrator::Controller;
pub use planner::Planner;
pub use types::*;
