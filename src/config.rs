use crate::errors::{PrinterError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const CONFIG_FILE: &str = "config.json";
pub const FOLDERS_FILE: &str = "folders.txt";
pub const FILE_PATHS_FILE: &str = "file_paths.txt";
pub const USER_NAME_FILE: &str = "user_name.txt";
pub const LEDGER_FILE: &str = "shared_scheduled_jobs.txt";
pub const AUDIT_LOG_FILE: &str = "print_log.txt";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub version: String,
    /// Per-user state: folders, file paths, user name.
    pub data_dir: PathBuf,
    /// Directory shared by every cooperating instance (ledger + audit log).
    pub shared_dir: PathBuf,
    pub user_name: Option<String>,
    /// Printer identity chosen through the printer-selection dialog.
    pub printer: Option<String>,
    pub retry: RetryConfig,
    pub execution: ExecutionConfig,
    pub conflict_window_secs: u64,
    pub refresh_interval_secs: u64,
    /// Print jobs authored by other users when their deadline passes. Turn
    /// off to leave each job to its author's machine.
    pub fire_foreign_jobs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: usize,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Fixed-size batches, sequential within a batch, pause between batches.
    Batched,
    /// Bounded worker pool with PDF-aware routing and progress reporting.
    Parallel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    pub workers: usize,
    pub batch_size: usize,
    pub batch_pause_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay_ms: 500,
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Parallel,
            workers: 5,
            batch_size: 15,
            batch_pause_ms: 2000,
        }
    }
}

impl AppConfig {
    /// Platform-specific per-user directory for local state.
    pub fn default_data_dir() -> PathBuf {
        if cfg!(target_os = "macos") {
            dirs::home_dir()
                .map(|p| p.join("Library/Application Support/FilePrinterApp"))
                .unwrap_or_else(|| PathBuf::from("."))
        } else if cfg!(target_os = "windows") {
            dirs::config_dir()
                .map(|p| p.join("FilePrinterApp"))
                .unwrap_or_else(|| PathBuf::from("."))
        } else {
            dirs::config_dir()
                .map(|p| p.join("file-printer"))
                .unwrap_or_else(|| PathBuf::from("."))
        }
    }

    /// Config rooted in a single directory, shared files in `shared`.
    pub fn with_dirs(data_dir: impl Into<PathBuf>, shared_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            shared_dir: shared_dir.into(),
            ..Self::default()
        }
    }

    pub fn folders_path(&self) -> PathBuf {
        self.data_dir.join(FOLDERS_FILE)
    }

    pub fn file_paths_path(&self) -> PathBuf {
        self.data_dir.join(FILE_PATHS_FILE)
    }

    pub fn user_name_path(&self) -> PathBuf {
        self.data_dir.join(USER_NAME_FILE)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.shared_dir.join(LEDGER_FILE)
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.shared_dir.join(AUDIT_LOG_FILE)
    }

    pub fn conflict_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.conflict_window_secs as i64)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    /// Load `config.json` from `dir`, falling back to defaults rooted there.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            info!("No config found at {:?}, using defaults", path);
            return Ok(Self {
                data_dir: dir.to_path_buf(),
                ..Self::default()
            });
        }

        let raw = std::fs::read_to_string(&path)?;
        let config: AppConfig = serde_json::from_str(&raw)
            .map_err(|e| PrinterError::Config(format!("Invalid {}: {}", path.display(), e)))?;
        info!("Config loaded from {:?}", path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        let path = self.data_dir.join(CONFIG_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        info!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Create the local data directory; the shared directory must already exist.
    pub fn validate_paths(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)?;
        }

        if !self.shared_dir.is_dir() {
            warn!("Shared directory missing: {:?}", self.shared_dir);
            return Err(PrinterError::Config(format!(
                "Shared directory not found: {}",
                self.shared_dir.display()
            )));
        }

        if self.execution.workers == 0 || self.execution.batch_size == 0 {
            return Err(PrinterError::Config(
                "execution.workers and execution.batch_size must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = Self::default_data_dir();
        Self {
            version: "1.0.0".to_string(),
            shared_dir: data_dir.join("shared"),
            data_dir,
            user_name: None,
            printer: None,
            retry: RetryConfig::default(),
            execution: ExecutionConfig::default(),
            conflict_window_secs: 60,
            refresh_interval_secs: 60,
            fire_foreign_jobs: true,
        }
    }
}
