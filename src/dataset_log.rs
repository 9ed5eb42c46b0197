// ──────────────────────────────────────────────────────────────────────────────
// cartunes-mapek-controller/src/dataset_log.rs
// ──────────────────────────────────────────────────────────────────────────────
//
// Long-form per-cycle metric history, one row per (timestamp, service),
// written to `datasets/cartunes_metrics_dataset.csv` for offline analysis.
// Column set mirrors the raw cluster metric ids the Monitor fetches, not
// the Analyzer's derived quantities.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::types::ServiceId;

const HEADERS: &[&str] = &[
    "timestamp",
    "service",
    "cpu.quota.used.percent",
    "memory.limit.used.percent",
    "jvm.heap.used.percent",
    "jvm.gc.global.time",
    "kubernetes.deployment.replicas.available",
    "net.http.request.time",
    "net.request.count.in",
    "net.http.error.count",
    "net.request.time.in",
    "net.bytes.in",
    "net.bytes.out",
    "net.bytes.total",
    "jvm.nonHeap.used.percent",
    "jvm.thread.count",
    "jvm.gc.global.count",
];

/// One cycle's worth of per-service metric readings, keyed by the same
/// column names as [`HEADERS`] minus `timestamp`/`service`.
pub type ServiceRow = HashMap<&'static str, f64>;

pub struct DatasetLog {
    path: PathBuf,
}

impl DatasetLog {
    /// Creates (or truncates) the CSV file and writes the header row.
    pub fn init(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(HEADERS)?;
        writer.flush()?;
        Ok(DatasetLog { path })
    }

    /// Appends one row per service for this cycle. Never propagates a
    /// write error upward — a dataset-logging failure must not stop the
    /// control loop — it only logs.
    pub fn append(&self, timestamp: i64, rows: &HashMap<ServiceId, ServiceRow>, services: &[ServiceId]) {
        let result = self.append_inner(timestamp, rows, services);
        match result {
            Ok(()) => info!(timestamp, "dataset row appended"),
            Err(e) => error!(error = %e, "failed to append dataset row"),
        }
    }

    fn append_inner(
        &self,
        timestamp: i64,
        rows: &HashMap<ServiceId, ServiceRow>,
        services: &[ServiceId],
    ) -> std::io::Result<()> {
        let file = std::fs::OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::Writer::from_writer(file);
        for svc in services {
            let empty = ServiceRow::new();
            let row = rows.get(svc).unwrap_or(&empty);
            if rows.get(svc).is_none() {
                warn!(%svc, "no metrics recorded for service this cycle");
            }
            let mut record = vec![timestamp.to_string(), svc.to_string()];
            for column in &HEADERS[2..] {
                record.push(
                    row.get(column)
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                );
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}
