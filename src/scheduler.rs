//! Job scheduler.
//!
//! A single coordinator task owns every piece of mutable state: the folder
//! library, the pending jobs, their deadlines and the calendar selection.
//! Callers talk to it through a cloneable [`SchedulerHandle`]; each request
//! carries a oneshot reply. Deadlines live in one min-heap serviced by the
//! coordinator loop, and print runs execute on spawned tasks that report
//! back over a channel, so state is only ever touched from the loop.

use crate::audit::AuditLog;
use crate::backend::PrintBackend;
use crate::calendar::{CalendarProjection, DAYS, MINUTES_PER_DAY};
use crate::config::AppConfig;
use crate::engine::{ExecutionEngine, ExecutionReport, PrintItem, Progress, RunOrigin};
use crate::errors::{PrinterError, Result};
use crate::job::ScheduledPrintJob;
use crate::ledger::SharedLedger;
use crate::library::{Folder, Library};
use crate::sentry_init;
use crate::store::{validate_user_name, DurableStore, FilePathStore, FolderStore};
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

/// Notifications for whatever presentation layer sits on top.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    JobScheduled(ScheduledPrintJob),
    JobFired { job_id: Uuid, folder: String },
    Progress {
        job_id: Option<Uuid>,
        folder: String,
        progress: Progress,
    },
    /// A run finished; `job_id` is `None` for immediate prints.
    JobCompleted {
        job_id: Option<Uuid>,
        folder: String,
        report: ExecutionReport,
    },
    JobDeleted(Uuid),
    JobsReloaded(ReloadSummary),
    FolderPrinted { folder: String, renamed: String },
    Error(String),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReloadSummary {
    pub pending: usize,
    pub expired: usize,
    /// Ledger line numbers that could not be decoded.
    pub rejected_lines: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub user: String,
    pub printer: Option<String>,
    pub pending: usize,
    pub printing: usize,
    pub selected: Option<Uuid>,
}

enum Command {
    Schedule {
        folder: Option<String>,
        time: Option<DateTime<Local>>,
        reply: oneshot::Sender<Result<ScheduledPrintJob>>,
    },
    Delete {
        id: Uuid,
        reply: oneshot::Sender<Result<ScheduledPrintJob>>,
    },
    SelectCell {
        day: usize,
        minute: usize,
        reply: oneshot::Sender<Result<Option<ScheduledPrintJob>>>,
    },
    DeleteSelected {
        reply: oneshot::Sender<Result<ScheduledPrintJob>>,
    },
    Reload {
        reply: oneshot::Sender<Result<ReloadSummary>>,
    },
    Jobs {
        reply: oneshot::Sender<Vec<ScheduledPrintJob>>,
    },
    Calendar {
        reply: oneshot::Sender<CalendarProjection>,
    },
    PrintNow {
        folder: String,
        reply: oneshot::Sender<Result<usize>>,
    },
    Folders {
        reply: oneshot::Sender<Vec<Folder>>,
    },
    CreateFolder {
        name: String,
        reply: oneshot::Sender<Result<()>>,
    },
    DeleteFolder {
        name: String,
        reply: oneshot::Sender<Result<Folder>>,
    },
    AddFiles {
        folder: String,
        paths: Vec<PathBuf>,
        reply: oneshot::Sender<Result<usize>>,
    },
    RemoveFiles {
        folder: String,
        names: Vec<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    ClearFolder {
        folder: String,
        reply: oneshot::Sender<Result<()>>,
    },
    ExportFolder {
        folder: String,
        target: PathBuf,
        reply: oneshot::Sender<Result<PathBuf>>,
    },
    SetPrinter {
        printer: Option<String>,
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<SchedulerStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

struct RunOutcome {
    job_id: Option<Uuid>,
    folder: String,
    report: ExecutionReport,
}

struct PendingJob {
    job: ScheduledPrintJob,
    deadline: Instant,
}

struct Coordinator {
    user: String,
    printer: Option<String>,
    fire_foreign_jobs: bool,
    refresh_interval: Duration,
    library: Library,
    ledger: SharedLedger,
    engine: ExecutionEngine,
    telemetry: Arc<TelemetryCollector>,
    jobs: HashMap<Uuid, PendingJob>,
    deadlines: BinaryHeap<Reverse<(Instant, Uuid)>>,
    /// Jobs handed to the engine and not yet completed.
    firing: HashSet<Uuid>,
    /// Folders with an immediate print in flight.
    busy_folders: HashSet<String>,
    /// Folder exports copying in the background.
    exports: JoinSet<()>,
    selected: Option<Uuid>,
    commands: mpsc::Receiver<Command>,
    outcomes: mpsc::UnboundedReceiver<RunOutcome>,
    outcome_tx: mpsc::UnboundedSender<RunOutcome>,
    events: broadcast::Sender<SchedulerEvent>,
}

/// Build the scheduler from `config`, load the ledger and start the
/// coordinator task.
pub async fn start(
    config: &AppConfig,
    user: impl Into<String>,
    backend: Arc<dyn PrintBackend>,
) -> Result<SchedulerHandle> {
    let user = user.into();
    let user = validate_user_name(&user)?.to_string();
    let store = DurableStore::new(config.retry.clone());
    let library = Library::load(
        FolderStore::new(config.folders_path(), store.clone()),
        FilePathStore::new(config.file_paths_path(), store.clone()),
    )
    .await?;
    let ledger = SharedLedger::new(config.ledger_path(), store.clone(), config.conflict_window());
    let audit = AuditLog::new(config.audit_log_path(), store);
    let engine = ExecutionEngine::new(backend, audit.clone(), config.execution.clone());
    let telemetry = Arc::new(TelemetryCollector::new());

    let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
    let (outcome_tx, outcomes) = mpsc::unbounded_channel();
    let (events, _) = broadcast::channel(EVENT_BUFFER);

    let mut coordinator = Coordinator {
        user: user.clone(),
        printer: config.printer.clone(),
        fire_foreign_jobs: config.fire_foreign_jobs,
        refresh_interval: config.refresh_interval(),
        library,
        ledger,
        engine,
        telemetry: telemetry.clone(),
        jobs: HashMap::new(),
        deadlines: BinaryHeap::new(),
        firing: HashSet::new(),
        busy_folders: HashSet::new(),
        exports: JoinSet::new(),
        selected: None,
        commands,
        outcomes,
        outcome_tx,
        events: events.clone(),
    };
    coordinator.reload("startup").await?;
    tokio::spawn(coordinator.run());

    info!("Scheduler started for user {}", user);
    Ok(SchedulerHandle {
        commands: command_tx,
        events,
        audit,
        telemetry,
        user,
    })
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl Coordinator {
    async fn run(mut self) {
        info!("Scheduler coordinator running ({} pending jobs)", self.jobs.len());

        let period = self.refresh_interval;
        let mut refresh = tokio::time::interval_at(Instant::now() + period, period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let next = self.next_deadline();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        info!(
                            "Scheduler shutting down ({} pending, {} printing)",
                            self.jobs.len(),
                            self.firing.len() + self.busy_folders.len()
                        );
                        self.drain().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle(command).await,
                    None => {
                        debug!("All scheduler handles dropped");
                        break;
                    }
                },
                Some(outcome) = self.outcomes.recv() => self.complete(outcome).await,
                Some(joined) = self.exports.join_next(), if !self.exports.is_empty() => {
                    if let Err(e) = joined {
                        error!("Folder export task failed: {}", e);
                    }
                }
                _ = sleep_until_deadline(next) => self.fire_due(),
                _ = refresh.tick() => {
                    if let Err(e) = self.reload("periodic refresh").await {
                        self.report_error("Failed to refresh scheduled jobs", &e);
                    }
                }
            }
        }
    }

    /// Let every run and export in flight finish before stopping.
    async fn drain(&mut self) {
        while !self.firing.is_empty() || !self.busy_folders.is_empty() {
            match self.outcomes.recv().await {
                Some(outcome) => self.complete(outcome).await,
                None => break,
            }
        }
        while let Some(joined) = self.exports.join_next().await {
            if let Err(e) = joined {
                error!("Folder export task failed: {}", e);
            }
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Schedule { folder, time, reply } => {
                let _ = reply.send(self.schedule(folder, time).await);
            }
            Command::Delete { id, reply } => {
                let _ = reply.send(self.delete(id).await);
            }
            Command::SelectCell { day, minute, reply } => {
                let _ = reply.send(self.select_cell(day, minute));
            }
            Command::DeleteSelected { reply } => {
                let result = match self.selected {
                    Some(id) => self.delete(id).await,
                    None => Err(PrinterError::NoJobSelected),
                };
                let _ = reply.send(result);
            }
            Command::Reload { reply } => {
                let _ = reply.send(self.reload("requested").await);
            }
            Command::Jobs { reply } => {
                let _ = reply.send(self.pending_jobs().into_iter().cloned().collect());
            }
            Command::Calendar { reply } => {
                let _ = reply.send(self.calendar(Local::now()));
            }
            Command::PrintNow { folder, reply } => {
                let _ = reply.send(self.print_now(folder));
            }
            Command::Folders { reply } => {
                let _ = reply.send(self.library.folders().to_vec());
            }
            Command::CreateFolder { name, reply } => {
                let _ = reply.send(self.library.create_folder(&name).await);
            }
            Command::DeleteFolder { name, reply } => {
                let _ = reply.send(self.library.delete_folder(&name).await);
            }
            Command::AddFiles { folder, paths, reply } => {
                let _ = reply.send(self.library.add_files(&folder, &paths).await);
            }
            Command::RemoveFiles { folder, names, reply } => {
                let _ = reply.send(self.library.remove_files(&folder, &names).await);
            }
            Command::ClearFolder { folder, reply } => {
                let _ = reply.send(self.library.clear_folder(&folder).await);
            }
            Command::ExportFolder { folder, target, reply } => match self.library.export(&folder, &target) {
                Ok(export) => {
                    self.exports.spawn(async move {
                        let _ = reply.send(export.run().await);
                    });
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Command::SetPrinter { printer, reply } => {
                info!("Printer selected: {}", printer.as_deref().unwrap_or("system default"));
                self.printer = printer;
                let _ = reply.send(());
            }
            Command::Status { reply } => {
                let _ = reply.send(SchedulerStatus {
                    user: self.user.clone(),
                    printer: self.printer.clone(),
                    pending: self.jobs.len(),
                    printing: self.firing.len() + self.busy_folders.len(),
                    selected: self.selected,
                });
            }
            // intercepted by the run loop
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn emit(&self, event: SchedulerEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn report_error(&self, context: &str, err: &PrinterError) {
        error!("{}: {}", context, err);
        self.emit(SchedulerEvent::Error(format!("{}: {}", context, err)));
    }

    /// Pending jobs in deadline order.
    fn pending_jobs(&self) -> Vec<&ScheduledPrintJob> {
        let mut jobs: Vec<&ScheduledPrintJob> = self.jobs.values().map(|p| &p.job).collect();
        jobs.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time).then(a.id.cmp(&b.id)));
        jobs
    }

    fn calendar(&self, now: DateTime<Local>) -> CalendarProjection {
        CalendarProjection::build(self.jobs.values().map(|p| &p.job), now)
    }

    fn is_armed(&self, id: Uuid, deadline: Instant) -> bool {
        !self.firing.contains(&id) && self.jobs.get(&id).is_some_and(|p| p.deadline == deadline)
    }

    /// Earliest live deadline; stale heap entries are discarded on the way.
    fn next_deadline(&mut self) -> Option<Instant> {
        loop {
            let (deadline, id) = match self.deadlines.peek() {
                Some(Reverse(entry)) => *entry,
                None => return None,
            };
            if self.is_armed(id, deadline) {
                return Some(deadline);
            }
            self.deadlines.pop();
        }
    }

    fn arm(&mut self, job: ScheduledPrintJob, deadline: Instant) {
        self.deadlines.push(Reverse((deadline, job.id)));
        self.jobs.insert(job.id, PendingJob { job, deadline });
    }

    /// Replace the in-memory job set with the ledger's pending records.
    /// Jobs that were already armed keep their running countdown.
    async fn reload(&mut self, reason: &str) -> Result<ReloadSummary> {
        let now = Local::now();
        let load = self.ledger.load_all(now).await?;

        let mut previous = std::mem::take(&mut self.jobs);
        self.deadlines.clear();

        for job in load.jobs {
            let deadline = match previous.remove(&job.id) {
                Some(pending) if pending.job.scheduled_time == job.scheduled_time => pending.deadline,
                _ => match job.remaining(now) {
                    Some(remaining) => Instant::now() + remaining,
                    None => continue,
                },
            };
            self.arm(job, deadline);
        }

        // Due on the wall clock but still waiting for its timer: keep it armed
        // so it fires once. In-flight jobs stay tracked until they complete.
        let mut expired = 0;
        for job in load.due {
            match previous.remove(&job.id) {
                Some(pending) if pending.job.scheduled_time == job.scheduled_time => {
                    debug!("Job {} is due; keeping its timer across the reload", job.id);
                    self.arm(pending.job, pending.deadline);
                }
                _ => expired += 1,
            }
        }

        if self.selected.is_some_and(|id| !self.jobs.contains_key(&id)) {
            self.selected = None;
        }

        let summary = ReloadSummary {
            pending: self.jobs.len(),
            expired,
            rejected_lines: load.rejected.iter().map(|r| r.line_number).collect(),
        };
        if !summary.rejected_lines.is_empty() {
            warn!(
                "Ledger has {} unreadable lines: {:?}",
                summary.rejected_lines.len(),
                summary.rejected_lines
            );
        }
        debug!(
            "Jobs reloaded ({}): {} pending, {} expired",
            reason, summary.pending, summary.expired
        );

        self.telemetry
            .record_event(TelemetryEvent::LedgerReloaded {
                pending: summary.pending,
                expired: summary.expired,
                rejected: summary.rejected_lines.len(),
            })
            .await;
        self.emit(SchedulerEvent::JobsReloaded(summary.clone()));
        Ok(summary)
    }

    async fn schedule(
        &mut self,
        folder: Option<String>,
        time: Option<DateTime<Local>>,
    ) -> Result<ScheduledPrintJob> {
        let folder = folder
            .filter(|f| !f.trim().is_empty())
            .ok_or(PrinterError::NoFolderSelected)?;
        let time = time.ok_or(PrinterError::NoTimeSpecified)?;

        let entry = self
            .library
            .folder(&folder)
            .ok_or_else(|| PrinterError::FolderNotFound(folder.clone()))?;
        if entry.files.is_empty() {
            return Err(PrinterError::EmptyFolder(folder));
        }
        let files = self.library.resolve(&folder)?;

        if let Some(holder) = self.ledger.is_slot_taken(time).await? {
            return Err(PrinterError::SlotTaken {
                user: holder.user,
                folder: holder.folder,
            });
        }

        let now = Local::now();
        let Some(remaining) = (time > now).then(|| (time - now).to_std().ok()).flatten() else {
            return Err(PrinterError::TimeInPast);
        };

        let job = ScheduledPrintJob::new(self.user.clone(), folder, files, time, now);
        self.ledger.append(&job).await?;
        self.arm(job.clone(), Instant::now() + remaining);

        info!(
            "Scheduled '{}' for {} ({} files, job {})",
            job.folder_name,
            job.scheduled_time,
            job.files.len(),
            job.id
        );
        self.telemetry
            .record_event(TelemetryEvent::JobScheduled {
                job_id: job.id.to_string(),
                folder: job.folder_name.clone(),
            })
            .await;
        self.emit(SchedulerEvent::JobScheduled(job.clone()));
        Ok(job)
    }

    async fn delete(&mut self, id: Uuid) -> Result<ScheduledPrintJob> {
        if self.firing.contains(&id) {
            return Err(PrinterError::JobNotFound(format!("{} (already printing)", id)));
        }
        let pending = self
            .jobs
            .remove(&id)
            .ok_or_else(|| PrinterError::JobNotFound(id.to_string()))?;

        if let Err(e) = self.ledger.rewrite_all(self.pending_jobs()).await {
            // its heap entry is still in place
            self.jobs.insert(id, pending);
            return Err(e);
        }

        if self.selected == Some(id) {
            self.selected = None;
        }
        info!("Deleted scheduled job {} ('{}')", id, pending.job.folder_name);
        self.telemetry
            .record_event(TelemetryEvent::JobDeleted { job_id: id.to_string() })
            .await;
        self.emit(SchedulerEvent::JobDeleted(id));
        Ok(pending.job)
    }

    fn select_cell(&mut self, day: usize, minute: usize) -> Result<Option<ScheduledPrintJob>> {
        if day >= DAYS || minute >= MINUTES_PER_DAY {
            return Err(PrinterError::InvalidName(format!(
                "No calendar cell at day {}, minute {}",
                day, minute
            )));
        }

        let projection = self.calendar(Local::now());
        self.selected = projection.jobs_at(day, minute).first().copied();
        let job = self
            .selected
            .and_then(|id| self.jobs.get(&id))
            .map(|p| p.job.clone());
        if let Some(job) = &job {
            debug!("Selected job {}: {} by {}", job.id, job.folder_name, job.user);
        }
        Ok(job)
    }

    fn fire_due(&mut self) {
        let now = Instant::now();
        while let Some(&Reverse((deadline, id))) = self.deadlines.peek() {
            if deadline > now {
                break;
            }
            self.deadlines.pop();
            if self.is_armed(id, deadline) {
                self.fire(id);
            }
        }
    }

    fn fire(&mut self, id: Uuid) {
        let Some(job) = self.jobs.get(&id).map(|p| p.job.clone()) else {
            return;
        };

        if job.user != self.user && !self.fire_foreign_jobs {
            debug!(
                "Job {} belongs to {}; leaving it to that user's instance",
                id, job.user
            );
            self.jobs.remove(&id);
            return;
        }

        if !self.firing.insert(id) {
            return;
        }

        info!("Firing job {}: '{}' ({} files)", id, job.folder_name, job.files.len());
        self.emit(SchedulerEvent::JobFired {
            job_id: id,
            folder: job.folder_name.clone(),
        });
        let items = job.files.into_iter().map(PrintItem::from).collect();
        self.spawn_run(Some(id), job.folder_name, items, RunOrigin::Scheduled);
    }

    fn print_now(&mut self, folder: String) -> Result<usize> {
        let entry = self
            .library
            .folder(&folder)
            .ok_or_else(|| PrinterError::FolderNotFound(folder.clone()))?;
        if entry.files.is_empty() {
            return Err(PrinterError::EmptyFolder(folder));
        }
        if self.busy_folders.contains(&folder) {
            return Err(PrinterError::FolderBusy(folder));
        }

        let items: Vec<PrintItem> = entry
            .files
            .iter()
            .map(|name| match self.library.file_path(name) {
                Some(path) => PrintItem::Path(path.to_path_buf()),
                None => PrintItem::Unresolved(name.clone()),
            })
            .collect();
        let count = items.len();

        info!("Printing folder '{}' now ({} files)", folder, count);
        self.busy_folders.insert(folder.clone());
        self.spawn_run(None, folder, items, RunOrigin::Immediate);
        Ok(count)
    }

    fn spawn_run(&self, job_id: Option<Uuid>, folder: String, items: Vec<PrintItem>, origin: RunOrigin) {
        let engine = self.engine.clone();
        let printer = self.printer.clone();
        let events = self.events.clone();
        let outcomes = self.outcome_tx.clone();

        tokio::spawn(async move {
            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
            let forwarder = {
                let folder = folder.clone();
                tokio::spawn(async move {
                    while let Some(progress) = progress_rx.recv().await {
                        let _ = events.send(SchedulerEvent::Progress {
                            job_id,
                            folder: folder.clone(),
                            progress,
                        });
                    }
                })
            };

            let report = engine
                .print(&items, origin, printer.as_deref(), Some(&progress_tx))
                .await;
            drop(progress_tx);
            let _ = forwarder.await;

            let _ = outcomes.send(RunOutcome {
                job_id,
                folder,
                report,
            });
        });
    }

    async fn complete(&mut self, outcome: RunOutcome) {
        let RunOutcome {
            job_id,
            folder,
            report,
        } = outcome;

        match job_id {
            Some(id) => {
                self.firing.remove(&id);
                self.jobs.remove(&id);
                if self.selected == Some(id) {
                    self.selected = None;
                }
                if let Err(e) = self.ledger.rewrite_all(self.pending_jobs()).await {
                    self.report_error("Failed to update the shared ledger", &e);
                }
                // pick up jobs other instances added meanwhile
                if let Err(e) = self.reload("job completed").await {
                    self.report_error("Failed to reload scheduled jobs", &e);
                }
            }
            None => {
                self.busy_folders.remove(&folder);
            }
        }

        match self.library.mark_printed(&folder, Local::now()).await {
            Ok(Some(renamed)) => self.emit(SchedulerEvent::FolderPrinted {
                folder: folder.clone(),
                renamed,
            }),
            Ok(None) => {}
            Err(e) => self.report_error("Failed to mark folder as printed", &e),
        }

        self.telemetry
            .record_run(job_id.map(|id| id.to_string()), &folder, &report)
            .await;
        if !report.failures.is_empty() {
            sentry_init::capture_run_failure(&folder, report.failures.len(), report.attempted);
        }

        info!(
            "All files sent to printer for '{}'. Number of files sent: {}",
            folder, report.succeeded
        );
        self.emit(SchedulerEvent::JobCompleted {
            job_id,
            folder,
            report,
        });
    }
}

/// Cloneable front door to the coordinator task.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SchedulerEvent>,
    audit: AuditLog,
    telemetry: Arc<TelemetryCollector>,
    user: String,
}

impl SchedulerHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| PrinterError::SchedulerStopped)?;
        response.await.map_err(|_| PrinterError::SchedulerStopped)
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    pub fn telemetry(&self) -> Arc<TelemetryCollector> {
        self.telemetry.clone()
    }

    /// Validate and arm a job for `folder` at `time`. Both are optional so
    /// that a missing selection is reported like any other validation error.
    pub async fn schedule(
        &self,
        folder: Option<&str>,
        time: Option<DateTime<Local>>,
    ) -> Result<ScheduledPrintJob> {
        let folder = folder.map(str::to_string);
        self.request(|reply| Command::Schedule { folder, time, reply })
            .await?
    }

    pub async fn delete(&self, id: Uuid) -> Result<ScheduledPrintJob> {
        self.request(|reply| Command::Delete { id, reply }).await?
    }

    /// Select the first job shown in a calendar cell (day 0 is Sunday).
    pub async fn select_calendar_cell(&self, day: usize, minute: usize) -> Result<Option<ScheduledPrintJob>> {
        self.request(|reply| Command::SelectCell { day, minute, reply })
            .await?
    }

    pub async fn delete_selected(&self) -> Result<ScheduledPrintJob> {
        self.request(|reply| Command::DeleteSelected { reply }).await?
    }

    pub async fn reload(&self) -> Result<ReloadSummary> {
        self.request(|reply| Command::Reload { reply }).await?
    }

    pub async fn jobs(&self) -> Result<Vec<ScheduledPrintJob>> {
        self.request(|reply| Command::Jobs { reply }).await
    }

    pub async fn calendar(&self) -> Result<CalendarProjection> {
        self.request(|reply| Command::Calendar { reply }).await
    }

    /// Start printing a folder right away. Returns the number of files
    /// queued; completion arrives as [`SchedulerEvent::JobCompleted`].
    pub async fn print_folder_now(&self, folder: &str) -> Result<usize> {
        let folder = folder.to_string();
        self.request(|reply| Command::PrintNow { folder, reply }).await?
    }

    pub async fn folders(&self) -> Result<Vec<Folder>> {
        self.request(|reply| Command::Folders { reply }).await
    }

    pub async fn create_folder(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        self.request(|reply| Command::CreateFolder { name, reply }).await?
    }

    pub async fn delete_folder(&self, name: &str) -> Result<Folder> {
        let name = name.to_string();
        self.request(|reply| Command::DeleteFolder { name, reply }).await?
    }

    pub async fn add_files(&self, folder: &str, paths: Vec<PathBuf>) -> Result<usize> {
        let folder = folder.to_string();
        self.request(|reply| Command::AddFiles { folder, paths, reply })
            .await?
    }

    pub async fn remove_files(&self, folder: &str, names: Vec<String>) -> Result<()> {
        let folder = folder.to_string();
        self.request(|reply| Command::RemoveFiles { folder, names, reply })
            .await?
    }

    pub async fn clear_folder(&self, folder: &str) -> Result<()> {
        let folder = folder.to_string();
        self.request(|reply| Command::ClearFolder { folder, reply }).await?
    }

    pub async fn export_folder(&self, folder: &str, target: PathBuf) -> Result<PathBuf> {
        let folder = folder.to_string();
        self.request(|reply| Command::ExportFolder { folder, target, reply })
            .await?
    }

    pub async fn set_printer(&self, printer: Option<String>) -> Result<()> {
        self.request(|reply| Command::SetPrinter { printer, reply }).await
    }

    pub async fn status(&self) -> Result<SchedulerStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    pub async fn audit_lines(&self) -> Result<Vec<String>> {
        self.audit.lines().await
    }

    pub async fn clear_audit_log(&self) -> Result<()> {
        self.audit.clear().await?;
        info!("Print log cleared");
        Ok(())
    }

    /// Stop the coordinator once the print runs and exports already in
    /// flight have finished. Pending jobs stay in the ledger.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}
