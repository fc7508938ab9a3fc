use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use file_printer::backend::SystemPrintBackend;
use file_printer::calendar::column_headers;
use file_printer::codec;
use file_printer::config::AppConfig;
use file_printer::scheduler::{self, SchedulerEvent, SchedulerHandle};
use file_printer::sentry_init;
use file_printer::store::{DurableStore, UserNameStore};
use file_printer::telemetry::TelemetryReporter;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "file-printer")]
#[command(about = "Schedule folders of files for printing, shared across users")]
#[command(version)]
struct Cli {
    /// Per-user data directory (config, folders, file paths)
    #[arg(long, env = "FILE_PRINTER_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Directory shared by every user (scheduled jobs ledger, print log)
    #[arg(long, env = "FILE_PRINTER_SHARED_DIR", global = true)]
    shared_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler in the foreground until interrupted
    Run,

    /// Schedule a folder for printing at a local time ("2030-01-01 14:05")
    Schedule { folder: String, time: String },

    /// List pending scheduled jobs
    Jobs {
        #[arg(long)]
        json: bool,
    },

    /// Show the weekly calendar of pending jobs
    Calendar,

    /// Delete a scheduled job by id, or the first job in a calendar cell
    Delete {
        id: Option<Uuid>,

        /// Calendar column, 0 = Sunday
        #[arg(long, requires = "at")]
        day: Option<usize>,

        /// Calendar row as HH:MM
        #[arg(long, requires = "day")]
        at: Option<String>,
    },

    /// Print a folder now and wait for the run to finish
    Print { folder: String },

    /// Folder management
    Folder {
        #[command(subcommand)]
        action: FolderAction,
    },

    /// Shared print log
    Log {
        #[command(subcommand)]
        action: LogAction,
    },

    /// Show or set the user name recorded on scheduled jobs
    User { name: Option<String> },

    /// Show or set the printer used for PDF printing
    Printer {
        name: Option<String>,

        /// Go back to the system default printer
        #[arg(long, conflicts_with = "name")]
        default: bool,
    },

    /// Print execution metrics for this process as JSON
    Metrics,
}

#[derive(Subcommand)]
enum FolderAction {
    List,
    Create { name: String },
    Delete { name: String },
    /// Add files to a folder
    Add { folder: String, paths: Vec<PathBuf> },
    /// Remove files from a folder by file name
    Remove { folder: String, names: Vec<String> },
    Clear { folder: String },
    /// Copy a folder's files into <target>/<folder>
    Export { folder: String, target: PathBuf },
}

#[derive(Subcommand)]
enum LogAction {
    Show,
    Clear,
}

fn init_tracing(log_dir: &std::path::Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("file-printer")
        .filename_suffix("log")
        .max_log_files(14)
        .build(log_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // keep the writer alive for the whole process
    static GUARD: once_cell::sync::OnceCell<tracing_appender::non_blocking::WorkerGuard> =
        once_cell::sync::OnceCell::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(sentry_tracing::layer())
        .init();

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let data_dir = cli.data_dir.clone().unwrap_or_else(AppConfig::default_data_dir);
    let mut config = AppConfig::load(&data_dir)?;
    config.data_dir = data_dir;
    if let Some(shared) = &cli.shared_dir {
        config.shared_dir = shared.clone();
    }
    config.validate_paths()?;
    Ok(config)
}

/// Stored user name, asking for one on first run.
async fn resolve_user(config: &AppConfig) -> anyhow::Result<String> {
    if let Some(name) = &config.user_name {
        return Ok(name.clone());
    }

    let store = UserNameStore::new(config.user_name_path(), DurableStore::new(config.retry.clone()));
    if let Some(name) = store.load().await? {
        return Ok(name);
    }

    let name = tokio::task::spawn_blocking(|| -> std::io::Result<String> {
        print!("Please enter your name: ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    })
    .await??;

    if name.is_empty() {
        bail!("A user name is required");
    }
    store.save(&name).await?;
    info!("User name saved: {}", name);
    Ok(name)
}

/// Persist a new user name where [`resolve_user`] will find it first.
async fn set_user(config: &mut AppConfig, name: &str) -> anyhow::Result<String> {
    let store = UserNameStore::new(config.user_name_path(), DurableStore::new(config.retry.clone()));
    store.save(name).await?;
    let name = name.trim().to_string();
    if config.user_name.is_some() {
        config.user_name = Some(name.clone());
        config.save()?;
    }
    Ok(name)
}

/// Local time from "YYYY-MM-DD HH:MM[:SS]" or RFC 3339.
fn parse_when(raw: &str) -> anyhow::Result<DateTime<Local>> {
    let mut normalized = raw.trim().replacen(' ', "T", 1);
    if normalized.len() == "2030-01-01T14:05".len() {
        normalized.push_str(":00");
    }
    codec::parse_time(&normalized).map_err(|e| anyhow!("Invalid time '{}': {}", raw, e))
}

fn parse_minute(raw: &str) -> anyhow::Result<usize> {
    let (hours, minutes) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("Expected HH:MM, got '{}'", raw))?;
    let hours: usize = hours.parse().context("Invalid hour")?;
    let minutes: usize = minutes.parse().context("Invalid minute")?;
    if hours > 23 || minutes > 59 {
        bail!("Time of day out of range: {}", raw);
    }
    Ok(hours * 60 + minutes)
}

async fn run_foreground(handle: &SchedulerHandle) -> anyhow::Result<()> {
    let reporter = TelemetryReporter::new(handle.telemetry());
    let reporting = reporter.start_reporting(300);

    info!("Scheduler running; press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Interrupt received");

    reporting.abort();
    handle.shutdown().await?;
    Ok(())
}

async fn print_and_wait(handle: &SchedulerHandle, folder: &str) -> anyhow::Result<()> {
    let mut events = handle.subscribe();
    let total = handle.print_folder_now(folder).await?;
    println!("Printing {} files from '{}'...", total, folder);

    loop {
        match events.recv().await {
            Ok(SchedulerEvent::Progress { job_id: None, folder: f, progress }) if f == folder => {
                println!("[{}/{}] {}", progress.completed, progress.total, progress.status);
            }
            Ok(SchedulerEvent::JobCompleted { job_id: None, folder: f, report }) if f == folder => {
                println!(
                    "All files sent to printer. Number of files sent: {}",
                    report.succeeded
                );
                for failure in &report.failures {
                    println!("  failed: {} ({})", failure.file, failure.message);
                }
                return Ok(());
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => bail!("Scheduler stopped before the print run finished"),
        }
    }
}

async fn execute(command: Commands, handle: &SchedulerHandle, config: &mut AppConfig) -> anyhow::Result<()> {
    match command {
        Commands::Run => run_foreground(handle).await?,
        Commands::Schedule { folder, time } => {
            let job = handle.schedule(Some(&folder), Some(parse_when(&time)?)).await?;
            println!("Print job scheduled for {} ({})", job.scheduled_time.format("%Y-%m-%d %H:%M"), job.id);
        }
        Commands::Jobs { json } => {
            let jobs = handle.jobs().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else if jobs.is_empty() {
                println!("No scheduled jobs");
            } else {
                for job in jobs {
                    println!("{}  {}", job.id, job.summary());
                }
            }
        }
        Commands::Calendar => {
            let projection = handle.calendar().await?;
            let headers = column_headers(Local::now());
            println!("{}", headers.join(" | "));
            print!("{}", projection.render(&headers));
        }
        Commands::Delete { id, day, at } => {
            let job = match (id, day, at) {
                (Some(id), _, _) => handle.delete(id).await?,
                (None, Some(day), Some(at)) => {
                    let minute = parse_minute(&at)?;
                    if let Some(job) = handle.select_calendar_cell(day, minute).await? {
                        println!(
                            "Selected Job: {} scheduled by {} at {}",
                            job.folder_name, job.user, job.scheduled_time
                        );
                    }
                    handle.delete_selected().await?
                }
                _ => handle.delete_selected().await?,
            };
            println!("Scheduled job deleted: {}", job.summary());
        }
        Commands::Print { folder } => print_and_wait(handle, &folder).await?,
        Commands::Folder { action } => match action {
            FolderAction::List => {
                for folder in handle.folders().await? {
                    println!("{} ({} files)", folder.name, folder.files.len());
                    for file in folder.files {
                        println!("  {}", file);
                    }
                }
            }
            FolderAction::Create { name } => handle.create_folder(&name).await?,
            FolderAction::Delete { name } => {
                handle.delete_folder(&name).await?;
            }
            FolderAction::Add { folder, paths } => {
                let paths = paths
                    .into_iter()
                    .map(|p| std::path::absolute(&p).with_context(|| format!("Invalid path {}", p.display())))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                let added = handle.add_files(&folder, paths).await?;
                println!("Added {} files to '{}'", added, folder);
            }
            FolderAction::Remove { folder, names } => handle.remove_files(&folder, names).await?,
            FolderAction::Clear { folder } => handle.clear_folder(&folder).await?,
            FolderAction::Export { folder, target } => {
                let destination = handle.export_folder(&folder, target).await?;
                println!("Files copied to {}", destination.display());
            }
        },
        Commands::Log { action } => match action {
            LogAction::Show => {
                for line in handle.audit_lines().await? {
                    println!("{}", line);
                }
            }
            LogAction::Clear => {
                handle.clear_audit_log().await?;
                println!("Log cleared");
            }
        },
        Commands::User { name } => match name {
            Some(name) => {
                let name = set_user(config, &name).await?;
                println!("User name set to {}", name);
            }
            None => println!("{}", handle.user()),
        },
        Commands::Printer { name, default } => {
            if name.is_some() || default {
                config.printer = name;
                config.save()?;
                handle.set_printer(config.printer.clone()).await?;
            }
            println!("{}", config.printer.as_deref().unwrap_or("(system default)"));
        }
        Commands::Metrics => {
            println!("{}", serde_json::to_string_pretty(&handle.telemetry().get_metrics_json().await)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;
    init_tracing(&config.data_dir.join("logs"))?;

    info!("File Printer {} starting", env!("CARGO_PKG_VERSION"));
    let _sentry_guard = sentry_init::init();

    let user = resolve_user(&config).await?;
    let handle = scheduler::start(&config, user, Arc::new(SystemPrintBackend::new())).await?;

    let result = execute(cli.command, &handle, &mut config).await;
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    let _ = handle.shutdown().await;
    result
}
