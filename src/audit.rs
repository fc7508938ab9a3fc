use crate::errors::Result;
use crate::store::DurableStore;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::error;

/// Append-only, human-readable `<timestamp>: <message>` log shared by all
/// instances.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    store: DurableStore,
}

pub fn format_entry(at: DateTime<Local>, message: &str) -> String {
    format!("{}: {}", at.format("%Y-%m-%d %H:%M:%S"), message)
}

impl AuditLog {
    pub fn new(path: PathBuf, store: DurableStore) -> Self {
        Self { path, store }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn log(&self, message: &str) -> Result<()> {
        self.store
            .append_line(&self.path, &format_entry(Local::now(), message))
            .await
    }

    /// Like [`log`](Self::log) but only reports a failure instead of returning it.
    pub async fn record(&self, message: &str) {
        if let Err(e) = self.log(message).await {
            error!("Failed to write to log file after multiple attempts: {} ({})", e, message);
        }
    }

    pub async fn lines(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .read_if_exists(&self.path)
            .await?
            .map(|content| content.lines().map(String::from).collect())
            .unwrap_or_default())
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.write(&self.path, "").await
    }
}
