// ──────────────────────────────────────────────────────────────────────────────
// cartunes-mapek-controller/src/bin/controller.rs
// ──────────────────────────────────────────────────────────────────────────────

use std::sync::Arc;

use cartunes_mapek_controller::dataset_log::DatasetLog;
use cartunes_mapek_controller::executor::{Executor, OcClusterApply};
use cartunes_mapek_controller::knowledge::Knowledge;
use cartunes_mapek_controller::monitor::HttpMonitor;
use cartunes_mapek_controller::orchestrator::Controller;
use cartunes_mapek_controller::types::ServiceId;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// MAPE-K self-adaptive controller for the cartunes music-streaming service.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the knowledge document.
    #[arg(long, env = "KNOWLEDGE_PATH", default_value = "./knowledge.json")]
    knowledge_path: String,

    /// Path to a `.env` file to load before reading other env vars.
    #[arg(long, env = "ENV_FILE", default_value = ".env")]
    env_file: String,

    /// Directory backups are written to before each apply.
    #[arg(long, env = "BACKUP_DIR", default_value = "./backup")]
    backup_dir: String,

    /// Directory raw per-metric telemetry dumps are written to.
    #[arg(long, env = "RAW_DUMP_DIR", default_value = "./datasets/raw")]
    raw_dump_dir: String,

    /// Path to the long-form dataset CSV.
    #[arg(long, env = "DATASET_CSV", default_value = "./datasets/cartunes_metrics_dataset.csv")]
    dataset_csv: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _ = dotenvy::from_path(&args.env_file);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let guid = std::env::var("GUID").unwrap_or_default();
    let api_key = std::env::var("APIKEY").unwrap_or_default();
    let cluster_url = std::env::var("URL").unwrap_or_default();
    let app_metrics_url = std::env::var("APP_METRICS_URL")
        .unwrap_or_else(|_| "http://cartunes-app.svc.cluster.local/api/metrics".to_string());
    let sleep_secs: u64 = std::env::var("SLEEP")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(60);

    let services: Vec<ServiceId> = [
        "acmeair-mainservice",
        "acmeair-authservice",
        "acmeair-flightservice",
        "acmeair-customerservice",
        "acmeair-bookingservice",
    ]
    .into_iter()
    .map(ServiceId::from)
    .collect();

    let knowledge = Arc::new(Knowledge::load(&args.knowledge_path)?);
    let monitor = Arc::new(HttpMonitor::new(
        cluster_url,
        api_key,
        guid,
        app_metrics_url,
        sleep_secs as i64,
        "kube_namespace_name=\"acmeair-group6\"",
        &args.raw_dump_dir,
    ));

    let executor = Executor::new(Box::new(OcClusterApply), &args.backup_dir)
        .with_dry_run_failure_policy(knowledge.get_dry_run_failure_policy());

    let dataset_log = DatasetLog::init(&args.dataset_csv)?;

    let controller = Controller::new(
        knowledge,
        monitor.clone(),
        monitor,
        executor,
        dataset_log,
        services,
        sleep_secs,
    );

    tracing::info!("starting MAPE-K adaptation loop");
    controller.run().await;
    Ok(())
}
