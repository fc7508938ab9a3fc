// Common test utilities and fixtures

use async_trait::async_trait;
use file_printer::backend::PrintBackend;
use file_printer::config::AppConfig;
use file_printer::errors::{PrinterError, Result};
use file_printer::scheduler::{self, SchedulerEvent, SchedulerHandle};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{broadcast, RwLock};

/// Recording print backend
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct MockBackend {
    pub printed: Arc<RwLock<Vec<PathBuf>>>,
    pub flattened: Arc<RwLock<Vec<PathBuf>>>,
    pub failing: Arc<RwLock<HashSet<String>>>,
    pub printers: Arc<RwLock<Vec<Option<String>>>>,
    pub delay_ms: Arc<AtomicU64>,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every print of a file with this name fail.
    pub async fn fail_on(&self, file_name: &str) {
        self.failing.write().await.insert(file_name.to_string());
    }

    /// Hold every print for `ms` before completing it.
    pub fn set_delay(&self, ms: u64) {
        self.delay_ms.store(ms, Ordering::SeqCst);
    }

    pub async fn print_count(&self) -> usize {
        self.printed.read().await.len()
    }

    pub async fn printed_names(&self) -> Vec<String> {
        self.printed
            .read()
            .await
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect()
    }

    async fn record(&self, path: &Path) -> Result<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let failing = self.failing.read().await;
        if failing.iter().any(|f| name.ends_with(f.as_str())) {
            return Err(PrinterError::Print(format!("Simulated printer failure: {}", name)));
        }
        drop(failing);
        self.printed.write().await.push(path.to_path_buf());
        Ok(())
    }
}

#[async_trait]
impl PrintBackend for MockBackend {
    async fn shell_print(&self, path: &Path) -> Result<()> {
        self.record(path).await
    }

    async fn flatten_pdf(&self, input: &Path, output: &Path) -> Result<()> {
        tokio::fs::copy(input, output).await?;
        self.flattened.write().await.push(input.to_path_buf());
        Ok(())
    }

    async fn print_document(&self, path: &Path, printer: Option<String>) -> Result<()> {
        self.printers.write().await.push(printer);
        self.record(path).await
    }
}

/// Isolated data + shared directories and a config pointing at them
#[allow(dead_code)]
pub struct TestEnv {
    pub data: TempDir,
    pub shared: TempDir,
    pub sources: TempDir,
    pub config: AppConfig,
}

#[allow(dead_code)]
impl TestEnv {
    pub fn new() -> Self {
        let data = TempDir::new().unwrap();
        let shared = TempDir::new().unwrap();
        let sources = TempDir::new().unwrap();
        let mut config = AppConfig::with_dirs(data.path(), shared.path());
        config.retry.delay_ms = 10;
        Self {
            data,
            shared,
            sources,
            config,
        }
    }

    /// Create a source file and return its absolute path.
    pub fn source_file(&self, name: &str) -> PathBuf {
        let path = self.sources.path().join(name);
        std::fs::write(&path, format!("contents of {}", name)).unwrap();
        path
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.config.ledger_path()
    }

    pub fn ledger_lines(&self) -> Vec<String> {
        std::fs::read_to_string(self.ledger_path())
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    pub fn audit_log(&self) -> String {
        std::fs::read_to_string(self.config.audit_log_path()).unwrap_or_default()
    }

    pub async fn start(&self, user: &str, backend: &MockBackend) -> SchedulerHandle {
        scheduler::start(&self.config, user, Arc::new(backend.clone()))
            .await
            .unwrap()
    }

    /// Start a scheduler with one folder holding `files`.
    pub async fn start_with_folder(
        &self,
        user: &str,
        backend: &MockBackend,
        folder: &str,
        files: &[&str],
    ) -> SchedulerHandle {
        let handle = self.start(user, backend).await;
        handle.create_folder(folder).await.unwrap();
        let paths = files.iter().map(|f| self.source_file(f)).collect();
        handle.add_files(folder, paths).await.unwrap();
        handle
    }
}

/// Wait for the first event matching `pred`, panicking after `secs`.
#[allow(dead_code)]
pub async fn wait_for<F>(events: &mut broadcast::Receiver<SchedulerEvent>, secs: u64, mut pred: F) -> SchedulerEvent
where
    F: FnMut(&SchedulerEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(secs), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for scheduler event")
}
