//! The shared job ledger: a plain text file, one record per pending job,
//! read and written by every cooperating instance.
//!
//! There is no locking. Rewrites are last-writer-wins, so concurrent writers
//! can lose each other's updates; the retry loop only covers a file that is
//! briefly held open by someone else.

use crate::codec;
use crate::errors::{PrinterError, Result};
use crate::job::ScheduledPrintJob;
use crate::store::DurableStore;
use chrono::{DateTime, Duration, Local};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The user and folder already holding a conflicting slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotHolder {
    pub user: String,
    pub folder: String,
}

/// A ledger line that failed to decode; it is skipped, not fatal.
#[derive(Debug)]
pub struct RejectedLine {
    pub line_number: usize,
    pub error: PrinterError,
}

#[derive(Debug, Default)]
pub struct LedgerLoad {
    /// Records whose deadline is still ahead, in file order.
    pub jobs: Vec<ScheduledPrintJob>,
    /// Records whose deadline already passed.
    pub due: Vec<ScheduledPrintJob>,
    pub rejected: Vec<RejectedLine>,
}

#[derive(Debug, Clone)]
pub struct SharedLedger {
    path: PathBuf,
    store: DurableStore,
    conflict_window: Duration,
}

impl SharedLedger {
    pub fn new(path: PathBuf, store: DurableStore, conflict_window: Duration) -> Self {
        Self {
            path,
            store,
            conflict_window,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_lines(&self) -> Result<Vec<(usize, String)>> {
        let content = self.store.read_if_exists(&self.path).await?.unwrap_or_default();
        Ok(content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| (i + 1, line.to_string()))
            .collect())
    }

    /// First record whose time is strictly within the conflict window of
    /// `time`, regardless of who wrote it.
    pub async fn is_slot_taken(&self, time: DateTime<Local>) -> Result<Option<SlotHolder>> {
        for (line_number, line) in self.read_lines().await? {
            let job = match codec::decode(&line) {
                Ok(job) => job,
                Err(e) => {
                    warn!("Skipping unreadable ledger line {}: {}", line_number, e);
                    continue;
                }
            };

            if (job.scheduled_time - time).abs() < self.conflict_window {
                debug!(
                    "Slot {} conflicts with {} / {} at {}",
                    time, job.user, job.folder_name, job.scheduled_time
                );
                return Ok(Some(SlotHolder {
                    user: job.user,
                    folder: job.folder_name,
                }));
            }
        }
        Ok(None)
    }

    pub async fn append(&self, job: &ScheduledPrintJob) -> Result<()> {
        self.store.append_line(&self.path, &codec::encode(job)).await?;
        info!("Ledger: appended job {} ({} at {})", job.id, job.folder_name, job.scheduled_time);
        Ok(())
    }

    /// Replace the ledger with exactly `jobs`.
    pub async fn rewrite_all<'a, I>(&self, jobs: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a ScheduledPrintJob>,
    {
        let mut content = String::new();
        let mut count = 0;
        for job in jobs {
            content.push_str(&codec::encode(job));
            content.push('\n');
            count += 1;
        }
        self.store.write(&self.path, &content).await?;
        info!("Ledger: rewritten with {} jobs", count);
        Ok(())
    }

    /// Decode every record, splitting those still in the future at `now`
    /// from those already due.
    pub async fn load_all(&self, now: DateTime<Local>) -> Result<LedgerLoad> {
        let mut load = LedgerLoad::default();

        for (line_number, line) in self.read_lines().await? {
            match codec::decode(&line) {
                Ok(job) if job.is_due(now) => load.due.push(job),
                Ok(job) => load.jobs.push(job),
                Err(error) => {
                    warn!("Skipping malformed ledger line {}: {}", line_number, error);
                    load.rejected.push(RejectedLine { line_number, error });
                }
            }
        }

        debug!(
            "Ledger: loaded {} pending, {} due, {} rejected",
            load.jobs.len(),
            load.due.len(),
            load.rejected.len()
        );
        Ok(load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn ledger(dir: &Path) -> SharedLedger {
        SharedLedger::new(
            dir.join("shared_scheduled_jobs.txt"),
            DurableStore::new(RetryConfig::default()),
            Duration::seconds(60),
        )
    }

    fn job(user: &str, folder: &str, time: DateTime<Local>) -> ScheduledPrintJob {
        ScheduledPrintJob::new(user, folder, vec![PathBuf::from("/a/1.pdf")], time, time)
    }

    fn base() -> DateTime<Local> {
        Local.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_missing_ledger_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(dir.path());
        assert!(ledger.is_slot_taken(base()).await.unwrap().is_none());
        assert!(ledger.load_all(base()).await.unwrap().jobs.is_empty());
    }

    #[tokio::test]
    async fn test_conflict_window_is_global_and_strict() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(dir.path());
        ledger.append(&job("alice", "ReportsQ1", base())).await.unwrap();

        let holder = ledger
            .is_slot_taken(base() + Duration::seconds(59))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(holder, SlotHolder { user: "alice".into(), folder: "ReportsQ1".into() });

        assert!(ledger.is_slot_taken(base() - Duration::seconds(30)).await.unwrap().is_some());
        assert!(ledger.is_slot_taken(base() + Duration::seconds(60)).await.unwrap().is_none());
        assert!(ledger.is_slot_taken(base() - Duration::seconds(61)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(dir.path());
        ledger.append(&job("alice", "First", base())).await.unwrap();
        ledger.append(&job("bob", "Second", base() + Duration::seconds(20))).await.unwrap();

        let holder = ledger.is_slot_taken(base() + Duration::seconds(10)).await.unwrap().unwrap();
        assert_eq!(holder.folder, "First");
    }

    #[tokio::test]
    async fn test_rewrite_then_load_drops_expired() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(dir.path());
        let jobs = vec![
            job("alice", "Past", base() - Duration::hours(1)),
            job("bob", "Soon", base() + Duration::hours(1)),
            job("carol", "Later", base() + Duration::days(2)),
        ];
        ledger.rewrite_all(&jobs).await.unwrap();

        let load = ledger.load_all(base()).await.unwrap();
        assert_eq!(load.jobs, jobs[1..].to_vec());
        assert_eq!(load.due, jobs[..1].to_vec());
        assert!(load.rejected.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(dir.path());
        std::fs::write(
            ledger.path(),
            "garbage line\n\
             alice|ReportsQ1|/a/1.pdf|2030-01-01T12:00:00.0000000+00:00|3600000\n\
             bob|Broken|/b/1.pdf|yesterday-ish|1\n",
        )
        .unwrap();

        let load = ledger.load_all(base() - Duration::days(1)).await.unwrap();
        assert_eq!(load.jobs.len(), 1);
        assert_eq!(load.jobs[0].user, "alice");
        let lines: Vec<usize> = load.rejected.iter().map(|r| r.line_number).collect();
        assert_eq!(lines, vec![1, 3]);
    }
}
