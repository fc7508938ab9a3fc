//! Execution engine: sends a set of files to the printer with per-file
//! failure isolation.
//!
//! Two modes share the same item handling:
//! - `Batched`: fixed-size batches, items sequential within a batch, a pause
//!   between batches, everything through the generic shell print.
//! - `Parallel`: a bounded number of items in flight; PDFs are flattened to a
//!   temporary copy and printed through the selected printer, other types go
//!   through the generic shell print.
//!
//! Failures are caught per item, written to the audit log with a category
//! label, and counted. A run always attempts every item.

use crate::audit::AuditLog;
use crate::backend::PrintBackend;
use crate::config::{ExecutionConfig, ExecutionMode};
use crate::errors::PrinterError;
use crate::job::file_name;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintItem {
    Path(PathBuf),
    /// A filename with no known source path.
    Unresolved(String),
}

impl From<PathBuf> for PrintItem {
    fn from(path: PathBuf) -> Self {
        PrintItem::Path(path)
    }
}

impl PrintItem {
    fn display_name(&self) -> String {
        match self {
            PrintItem::Path(path) => file_name(path),
            PrintItem::Unresolved(name) => name.clone(),
        }
    }
}

/// What started a run; only changes the audit wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOrigin {
    Immediate,
    Scheduled,
}

impl RunOrigin {
    fn printed_prefix(&self) -> &'static str {
        match self {
            RunOrigin::Immediate => "Printed",
            RunOrigin::Scheduled => "Scheduled Printed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    NotFound,
    Io,
    Permission,
    Printer,
    Other,
}

impl FailureCategory {
    pub fn of(err: &PrinterError) -> Self {
        match err {
            PrinterError::FileNotFound(_) | PrinterError::FilePathUnresolved(_) => Self::NotFound,
            PrinterError::Print(_) => Self::Printer,
            PrinterError::Io(e) | PrinterError::Persistence { source: e, .. } => match e.kind() {
                ErrorKind::NotFound => Self::NotFound,
                ErrorKind::PermissionDenied => Self::Permission,
                _ => Self::Io,
            },
            _ => Self::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NotFound => "File not found",
            Self::Io => "I/O error",
            Self::Permission => "Access denied",
            Self::Printer => "Printer error",
            Self::Other => "Error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub file: String,
    pub category: FailureCategory,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<ItemFailure>,
    pub duration_ms: u64,
}

/// Progress snapshot sent after every item (or batch, in batched mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub succeeded: usize,
    pub total: usize,
    pub status: String,
}

pub type ProgressSender = mpsc::UnboundedSender<Progress>;

#[derive(Clone)]
pub struct ExecutionEngine {
    backend: Arc<dyn PrintBackend>,
    audit: AuditLog,
    config: ExecutionConfig,
    temp_dir: PathBuf,
}

impl ExecutionEngine {
    pub fn new(backend: Arc<dyn PrintBackend>, audit: AuditLog, config: ExecutionConfig) -> Self {
        Self {
            backend,
            audit,
            config,
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Directory for flattened PDF copies.
    pub fn with_temp_dir(mut self, dir: PathBuf) -> Self {
        self.temp_dir = dir;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.config.mode
    }

    /// Attempt every item once and report the outcome.
    pub async fn print(
        &self,
        items: &[PrintItem],
        origin: RunOrigin,
        printer: Option<&str>,
        progress: Option<&ProgressSender>,
    ) -> ExecutionReport {
        let started = Instant::now();
        info!(
            "Print run started: {} files ({:?} mode)",
            items.len(),
            self.config.mode
        );

        let mut report = match self.config.mode {
            ExecutionMode::Batched => self.print_batched(items, origin, progress).await,
            ExecutionMode::Parallel => self.print_parallel(items, origin, printer, progress).await,
        };
        report.attempted = items.len();
        report.duration_ms = started.elapsed().as_millis() as u64;

        self.audit
            .record(&format!(
                "Print run finished: {} of {} files sent to printer",
                report.succeeded, report.attempted
            ))
            .await;
        info!(
            "Print run finished: {}/{} succeeded in {}ms",
            report.succeeded, report.attempted, report.duration_ms
        );
        report
    }

    async fn print_batched(
        &self,
        items: &[PrintItem],
        origin: RunOrigin,
        progress: Option<&ProgressSender>,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        let batch_size = self.config.batch_size.max(1);
        let batches = items.len().div_ceil(batch_size);

        for (index, batch) in items.chunks(batch_size).enumerate() {
            debug!("Batch {}/{}: {} files", index + 1, batches, batch.len());
            for item in batch {
                match self.print_item(item, origin, None, false).await {
                    Ok(()) => report.succeeded += 1,
                    Err(failure) => report.failures.push(failure),
                }
            }

            if let Some(tx) = progress {
                let _ = tx.send(Progress {
                    completed: (index * batch_size + batch.len()).min(items.len()),
                    succeeded: report.succeeded,
                    total: items.len(),
                    status: format!("Batch {} of {} sent", index + 1, batches),
                });
            }

            if index + 1 < batches {
                tokio::time::sleep(Duration::from_millis(self.config.batch_pause_ms)).await;
            }
        }

        report
    }

    async fn print_parallel(
        &self,
        items: &[PrintItem],
        origin: RunOrigin,
        printer: Option<&str>,
        progress: Option<&ProgressSender>,
    ) -> ExecutionReport {
        let succeeded = AtomicUsize::new(0);
        let completed = AtomicUsize::new(0);
        let total = items.len();

        let failures: Vec<ItemFailure> = stream::iter(items.iter().cloned())
            .map(|item| {
                let succeeded = &succeeded;
                let completed = &completed;
                async move {
                    let result = self.print_item(&item, origin, printer, true).await;
                    let ok = if result.is_ok() {
                        succeeded.fetch_add(1, Ordering::SeqCst) + 1
                    } else {
                        succeeded.load(Ordering::SeqCst)
                    };
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;

                    if let Some(tx) = progress {
                        let verb = if result.is_ok() { "Printed" } else { "Failed" };
                        let _ = tx.send(Progress {
                            completed: done,
                            succeeded: ok,
                            total,
                            status: format!("{} {}", verb, item.display_name()),
                        });
                    }
                    result.err()
                }
            })
            .buffer_unordered(self.config.workers.max(1))
            .filter_map(|failure| async move { failure })
            .collect()
            .await;

        ExecutionReport {
            succeeded: succeeded.load(Ordering::SeqCst),
            failures,
            ..ExecutionReport::default()
        }
    }

    /// Print one item, containing and logging any failure.
    async fn print_item(
        &self,
        item: &PrintItem,
        origin: RunOrigin,
        printer: Option<&str>,
        route_pdf: bool,
    ) -> std::result::Result<(), ItemFailure> {
        let result = match item {
            PrintItem::Unresolved(name) => Err(PrinterError::FilePathUnresolved(name.clone())),
            PrintItem::Path(path) => self.dispatch(path, printer, route_pdf).await,
        };

        let name = item.display_name();
        match result {
            Ok(()) => {
                if let PrintItem::Path(path) = item {
                    self.audit
                        .record(&format!("{}: {}", origin.printed_prefix(), path.display()))
                        .await;
                }
                Ok(())
            }
            Err(e) => {
                let category = FailureCategory::of(&e);
                warn!("Failed to print {}: {} ({})", name, e, category.label());
                self.audit
                    .record(&format!("Failed to print {}: {} - {}", name, category.label(), e))
                    .await;
                Err(ItemFailure {
                    file: name,
                    category,
                    message: e.to_string(),
                })
            }
        }
    }

    async fn dispatch(&self, path: &Path, printer: Option<&str>, route_pdf: bool) -> crate::errors::Result<()> {
        if !tokio::fs::try_exists(path).await? {
            return Err(PrinterError::FileNotFound(path.to_path_buf()));
        }

        if route_pdf && is_pdf(path) {
            self.print_flattened(path, printer).await
        } else {
            self.backend.shell_print(path).await
        }
    }

    /// Flatten into a temporary copy, print the copy, always remove it.
    async fn print_flattened(&self, path: &Path, printer: Option<&str>) -> crate::errors::Result<()> {
        let flattened = self
            .temp_dir
            .join(format!("{}-{}", Uuid::new_v4(), file_name(path)));

        let result = match self.backend.flatten_pdf(path, &flattened).await {
            Ok(()) => {
                self.backend
                    .print_document(&flattened, printer.map(str::to_string))
                    .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = tokio::fs::remove_file(&flattened).await {
            if e.kind() != ErrorKind::NotFound {
                warn!("Failed to remove flattened copy {:?}: {}", flattened, e);
            }
        }
        result
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}
