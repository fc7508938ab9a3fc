use crate::engine::{ExecutionReport, FailureCategory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, info};

const HISTORY_LIMIT: usize = 1000;

/// Telemetry event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// A scheduled job was accepted and armed
    JobScheduled { job_id: String, folder: String },
    /// A pending job was removed before firing
    JobDeleted { job_id: String },
    /// A print run (scheduled or immediate) finished
    PrintRunCompleted {
        job_id: Option<String>,
        folder: String,
        attempted: usize,
        succeeded: usize,
        duration_ms: u64,
    },
    /// One file in a run could not be printed
    PrintItemFailed { file: String, category: FailureCategory },
    /// The in-memory job set was rebuilt from the shared ledger
    LedgerReloaded {
        pending: usize,
        expired: usize,
        rejected: usize,
    },
}

/// Telemetry metrics for reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryMetrics {
    pub jobs_scheduled: u64,
    pub jobs_deleted: u64,
    /// Completed print runs
    pub runs_completed: u64,
    pub files_printed: u64,
    pub files_failed: u64,
    /// Average run duration (milliseconds)
    pub avg_run_duration_ms: u64,
    /// Printed files over attempted files (0.0 - 1.0)
    pub success_rate: f64,
    /// Pending jobs after the last reload
    pub pending_jobs: usize,
    pub last_update_ts: u64,
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self {
            jobs_scheduled: 0,
            jobs_deleted: 0,
            runs_completed: 0,
            files_printed: 0,
            files_failed: 0,
            avg_run_duration_ms: 0,
            success_rate: 1.0,
            pending_jobs: 0,
            last_update_ts: unix_now(),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Aggregates execution metrics for the running scheduler
pub struct TelemetryCollector {
    metrics: Arc<RwLock<TelemetryMetrics>>,
    /// Event history (last 1000 events)
    event_history: Arc<RwLock<Vec<(u64, TelemetryEvent)>>>,
    /// Run duration samples (for averaging, max 1000)
    run_durations: Arc<RwLock<Vec<u64>>>,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        debug!("Initializing telemetry collector");
        Self {
            metrics: Arc::new(RwLock::new(TelemetryMetrics::default())),
            event_history: Arc::new(RwLock::new(Vec::new())),
            run_durations: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn record_event(&self, event: TelemetryEvent) {
        let timestamp = unix_now();
        let mut metrics = self.metrics.write().await;

        match &event {
            TelemetryEvent::JobScheduled { .. } => metrics.jobs_scheduled += 1,
            TelemetryEvent::JobDeleted { .. } => metrics.jobs_deleted += 1,
            TelemetryEvent::PrintRunCompleted {
                succeeded,
                attempted,
                duration_ms,
                ..
            } => {
                metrics.runs_completed += 1;
                metrics.files_printed += *succeeded as u64;
                metrics.files_failed += attempted.saturating_sub(*succeeded) as u64;

                let mut durations = self.run_durations.write().await;
                durations.push(*duration_ms);
                if durations.len() > HISTORY_LIMIT {
                    durations.remove(0);
                }
                let sum: u64 = durations.iter().sum();
                metrics.avg_run_duration_ms = sum / durations.len() as u64;

                let total = metrics.files_printed + metrics.files_failed;
                if total > 0 {
                    metrics.success_rate = metrics.files_printed as f64 / total as f64;
                }

                debug!(
                    "Print run completed - Runs: {}, Avg duration: {}ms, Success rate: {:.2}%",
                    metrics.runs_completed,
                    metrics.avg_run_duration_ms,
                    metrics.success_rate * 100.0
                );
            }
            TelemetryEvent::PrintItemFailed { file, category } => {
                debug!("Print item failed: {} ({:?})", file, category);
            }
            TelemetryEvent::LedgerReloaded { pending, .. } => {
                metrics.pending_jobs = *pending;
            }
        }

        metrics.last_update_ts = timestamp;
        drop(metrics);

        let mut history = self.event_history.write().await;
        history.push((timestamp, event));
        if history.len() > HISTORY_LIMIT {
            history.remove(0);
        }
    }

    /// Record a finished run and each of its failures.
    pub async fn record_run(&self, job_id: Option<String>, folder: &str, report: &ExecutionReport) {
        for failure in &report.failures {
            self.record_event(TelemetryEvent::PrintItemFailed {
                file: failure.file.clone(),
                category: failure.category,
            })
            .await;
        }
        self.record_event(TelemetryEvent::PrintRunCompleted {
            job_id,
            folder: folder.to_string(),
            attempted: report.attempted,
            succeeded: report.succeeded,
            duration_ms: report.duration_ms,
        })
        .await;
    }

    pub async fn get_metrics(&self) -> TelemetryMetrics {
        self.metrics.read().await.clone()
    }

    /// Get event history (last N events)
    pub async fn get_event_history(&self, limit: usize) -> Vec<(u64, TelemetryEvent)> {
        let history = self.event_history.read().await;
        let start = history.len().saturating_sub(limit);
        history[start..].to_vec()
    }

    pub async fn get_metrics_json(&self) -> serde_json::Value {
        let metrics = self.get_metrics().await;
        serde_json::to_value(&metrics).unwrap_or_default()
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic telemetry reporter
pub struct TelemetryReporter {
    collector: Arc<TelemetryCollector>,
}

impl TelemetryReporter {
    pub fn new(collector: Arc<TelemetryCollector>) -> Self {
        Self { collector }
    }

    /// Log a metrics summary every `interval_secs` until the task is aborted.
    pub fn start_reporting(&self, interval_secs: u64) -> tokio::task::JoinHandle<()> {
        let collector = self.collector.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            // first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                let metrics = collector.get_metrics().await;

                info!(
                    "Telemetry Report - Runs: {} | Files: {} printed, {} failed | Success: {:.1}% | Avg run: {}ms | Pending jobs: {}",
                    metrics.runs_completed,
                    metrics.files_printed,
                    metrics.files_failed,
                    metrics.success_rate * 100.0,
                    metrics.avg_run_duration_ms,
                    metrics.pending_jobs,
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ItemFailure;

    #[tokio::test]
    async fn test_record_run_updates_file_counts() {
        let collector = TelemetryCollector::new();
        let report = ExecutionReport {
            attempted: 4,
            succeeded: 3,
            failures: vec![ItemFailure {
                file: "missing.pdf".to_string(),
                category: FailureCategory::NotFound,
                message: "File not found: missing.pdf".to_string(),
            }],
            duration_ms: 150,
        };

        collector.record_run(Some("job_1".to_string()), "ReportsQ1", &report).await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.runs_completed, 1);
        assert_eq!(metrics.files_printed, 3);
        assert_eq!(metrics.files_failed, 1);
        assert_eq!(metrics.avg_run_duration_ms, 150);
        assert_eq!(metrics.success_rate, 0.75);

        let history = collector.get_event_history(10).await;
        assert_eq!(history.len(), 2);
        assert!(matches!(history[0].1, TelemetryEvent::PrintItemFailed { .. }));
    }

    #[tokio::test]
    async fn test_job_counters_and_reload() {
        let collector = TelemetryCollector::new();
        collector
            .record_event(TelemetryEvent::JobScheduled {
                job_id: "a".to_string(),
                folder: "Invoices".to_string(),
            })
            .await;
        collector
            .record_event(TelemetryEvent::JobDeleted { job_id: "a".to_string() })
            .await;
        collector
            .record_event(TelemetryEvent::LedgerReloaded {
                pending: 2,
                expired: 1,
                rejected: 0,
            })
            .await;

        let json = collector.get_metrics_json().await;
        assert_eq!(json["jobs_scheduled"], 1);
        assert_eq!(json["jobs_deleted"], 1);
        assert_eq!(json["pending_jobs"], 2);
        assert_eq!(json["success_rate"], 1.0);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let collector = TelemetryCollector::new();
        for i in 0..1005 {
            collector
                .record_event(TelemetryEvent::JobDeleted { job_id: i.to_string() })
                .await;
        }
        assert_eq!(collector.get_event_history(usize::MAX).await.len(), HISTORY_LIMIT);
        assert_eq!(collector.get_event_history(3).await.len(), 3);
    }
}
