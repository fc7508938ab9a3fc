//! Whole-file text persistence with a bounded retry loop.
//!
//! Every read and write goes through [`DurableStore`], which retries only
//! transient failures (a file briefly held open or locked by another writer)
//! with a fixed delay. Writes always rewrite the whole file, so an abandoned
//! write never leaves partial state behind.

use crate::config::RetryConfig;
use crate::errors::{PrinterError, Result};
use crate::library::Folder;
use backon::{ConstantBuilder, Retryable};
use std::collections::BTreeMap;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

/// Sharing/lock violations on Windows, EBUSY/ETXTBSY elsewhere.
#[cfg(windows)]
const TRANSIENT_OS_ERRORS: &[i32] = &[32, 33];
#[cfg(not(windows))]
const TRANSIENT_OS_ERRORS: &[i32] = &[16, 26];

/// Whether an I/O failure is worth another attempt.
pub fn is_transient(err: &io::Error) -> bool {
    match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::Interrupted | ErrorKind::TimedOut => true,
        _ => matches!(err.raw_os_error(), Some(code) if TRANSIENT_OS_ERRORS.contains(&code)),
    }
}

#[derive(Debug, Clone)]
pub struct DurableStore {
    retry: RetryConfig,
}

impl DurableStore {
    pub fn new(retry: RetryConfig) -> Self {
        Self { retry }
    }

    fn backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.retry.delay())
            .with_max_times(self.retry.attempts.saturating_sub(1))
    }

    /// Run `op` until it succeeds, fails non-transiently, or attempts run out.
    pub async fn with_retry<T, F, Fut>(&self, path: &Path, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = io::Result<T>>,
    {
        let attempts = AtomicUsize::new(0);

        let result = (|| {
            attempts.fetch_add(1, Ordering::Relaxed);
            op()
        })
        .retry(self.backoff())
        .when(is_transient)
        .notify(|e: &io::Error, delay| {
            warn!("Transient I/O failure on {:?}: {} (retrying in {:?})", path, e, delay);
        })
        .await;

        result.map_err(|source| {
            let attempts = attempts.load(Ordering::Relaxed);
            error!("Giving up on {:?} after {} attempts: {}", path, attempts, source);
            PrinterError::Persistence {
                path: path.to_path_buf(),
                attempts,
                source,
            }
        })
    }

    /// Replace the whole file with `content`.
    pub async fn write(&self, path: &Path, content: &str) -> Result<()> {
        self.with_retry(path, move || tokio::fs::write(path, content))
            .await?;
        debug!("Wrote {} bytes to {:?}", content.len(), path);
        Ok(())
    }

    pub async fn read(&self, path: &Path) -> Result<String> {
        self.with_retry(path, move || tokio::fs::read_to_string(path))
            .await
    }

    /// Like [`read`](Self::read), but a missing file is `None` rather than an error.
    pub async fn read_if_exists(&self, path: &Path) -> Result<Option<String>> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(None);
        }
        match self.read(path).await {
            Ok(content) => Ok(Some(content)),
            Err(PrinterError::Persistence { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Append one line (a trailing newline is added), creating the file if needed.
    pub async fn append_line(&self, path: &Path, line: &str) -> Result<()> {
        self.with_retry(path, move || async move {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            file.write_all(format!("{}\n", line).as_bytes()).await?;
            file.flush().await
        })
        .await
    }
}

/// `name: file1, file2, ...` per line.
#[derive(Debug, Clone)]
pub struct FolderStore {
    path: PathBuf,
    store: DurableStore,
}

impl FolderStore {
    pub fn new(path: PathBuf, store: DurableStore) -> Self {
        Self { path, store }
    }

    pub async fn load(&self) -> Result<Vec<Folder>> {
        let Some(content) = self.store.read_if_exists(&self.path).await? else {
            return Ok(Vec::new());
        };
        Ok(parse_folders(&content))
    }

    pub async fn save(&self, folders: &[Folder]) -> Result<()> {
        self.store.write(&self.path, &render_folders(folders)).await
    }
}

pub fn parse_folders(content: &str) -> Vec<Folder> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let (name, files) = match line.split_once(": ") {
                Some((name, files)) => (name, files),
                None => (line.strip_suffix(':').unwrap_or(line), ""),
            };
            Folder {
                name: name.to_string(),
                files: files
                    .split(", ")
                    .filter(|f| !f.is_empty())
                    .map(String::from)
                    .collect(),
            }
        })
        .collect()
}

pub fn render_folders(folders: &[Folder]) -> String {
    folders
        .iter()
        .map(|f| format!("{}: {}\n", f.name, f.files.join(", ")))
        .collect()
}

/// `filename: /absolute/path` per line.
#[derive(Debug, Clone)]
pub struct FilePathStore {
    path: PathBuf,
    store: DurableStore,
}

impl FilePathStore {
    pub fn new(path: PathBuf, store: DurableStore) -> Self {
        Self { path, store }
    }

    pub async fn load(&self) -> Result<BTreeMap<String, PathBuf>> {
        let Some(content) = self.store.read_if_exists(&self.path).await? else {
            return Ok(BTreeMap::new());
        };
        Ok(content
            .lines()
            .filter_map(|line| line.split_once(": "))
            .map(|(name, path)| (name.to_string(), PathBuf::from(path)))
            .collect())
    }

    pub async fn save(&self, paths: &BTreeMap<String, PathBuf>) -> Result<()> {
        let content: String = paths
            .iter()
            .map(|(name, path)| format!("{}: {}\n", name, path.display()))
            .collect();
        self.store.write(&self.path, &content).await
    }
}

/// Single line holding the display name of the local user.
#[derive(Debug, Clone)]
pub struct UserNameStore {
    path: PathBuf,
    store: DurableStore,
}

impl UserNameStore {
    pub fn new(path: PathBuf, store: DurableStore) -> Self {
        Self { path, store }
    }

    pub async fn load(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .read_if_exists(&self.path)
            .await?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()))
    }

    pub async fn save(&self, name: &str) -> Result<()> {
        let name = validate_user_name(name)?;
        self.store.write(&self.path, name).await
    }
}

/// Trimmed user name. Names carrying the ledger's field separator or a line
/// break are refused since every job record embeds the name.
pub fn validate_user_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PrinterError::InvalidName("User name is required".to_string()));
    }
    if name.contains(|c| matches!(c, '|' | '\n' | '\r')) {
        return Err(PrinterError::InvalidName(format!(
            "User name may not contain '|' or line breaks: {}",
            name
        )));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store() -> DurableStore {
        DurableStore::new(RetryConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = store()
            .with_retry(Path::new("ledger.txt"), move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(io::Error::new(ErrorKind::WouldBlock, "locked"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_persistence_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: Result<()> = store()
            .with_retry(Path::new("ledger.txt"), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(io::Error::new(ErrorKind::WouldBlock, "locked")) }
            })
            .await;

        match result {
            Err(PrinterError::Persistence { attempts, .. }) => assert_eq!(attempts, 5),
            other => panic!("expected persistence failure, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: Result<()> = store()
            .with_retry(Path::new("ledger.txt"), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(io::Error::new(ErrorKind::PermissionDenied, "denied")) }
            })
            .await;

        assert!(matches!(result, Err(PrinterError::Persistence { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_read_write_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.txt");
        let store = store();

        assert!(store.read_if_exists(&path).await.unwrap().is_none());

        store.write(&path, "first\n").await.unwrap();
        store.append_line(&path, "second").await.unwrap();
        assert_eq!(store.read(&path).await.unwrap(), "first\nsecond\n");

        store.write(&path, "replaced\n").await.unwrap();
        assert_eq!(store.read(&path).await.unwrap(), "replaced\n");
    }

    #[test]
    fn test_folder_lines() {
        let folders = parse_folders("ReportsQ1: a.pdf, b.docx\nEmpty: \nLegacy:\n\n");
        assert_eq!(
            folders,
            vec![
                Folder::new("ReportsQ1", vec!["a.pdf".into(), "b.docx".into()]),
                Folder::new("Empty", vec![]),
                Folder::new("Legacy", vec![]),
            ]
        );
        assert_eq!(
            render_folders(&folders),
            "ReportsQ1: a.pdf, b.docx\nEmpty: \nLegacy: \n"
        );
    }

    #[tokio::test]
    async fn test_file_path_store_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file_paths.txt");
        std::fs::write(&path, "a.pdf: /docs/a.pdf\ngarbage\nb.txt: /docs/b.txt\n").unwrap();

        let paths = FilePathStore::new(path, store()).load().await.unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths["a.pdf"], PathBuf::from("/docs/a.pdf"));
    }

    #[tokio::test]
    async fn test_user_name_store() {
        let dir = TempDir::new().unwrap();
        let users = UserNameStore::new(dir.path().join("user_name.txt"), store());

        assert_eq!(users.load().await.unwrap(), None);
        assert!(matches!(users.save("   ").await, Err(PrinterError::InvalidName(_))));
        assert!(matches!(users.save("Smith|J").await, Err(PrinterError::InvalidName(_))));
        assert_eq!(users.load().await.unwrap(), None);
        users.save("alice\n").await.unwrap();
        assert_eq!(users.load().await.unwrap().as_deref(), Some("alice"));
    }
}
