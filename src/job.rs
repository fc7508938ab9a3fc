use chrono::{DateTime, Local, Timelike};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledPrintJob {
    pub id: Uuid,
    pub user: String,
    pub folder_name: String,
    pub files: Vec<PathBuf>,
    pub scheduled_time: DateTime<Local>,
    /// Countdown length recorded when the job was armed, in milliseconds.
    pub interval_ms: i64,
}

/// Drop precision below the ledger's 100ns resolution so a job compares
/// equal to its own decoded record.
pub fn ledger_precision(time: DateTime<Local>) -> DateTime<Local> {
    let nanos = time.nanosecond();
    time.with_nanosecond(nanos - nanos % 100).unwrap_or(time)
}

impl ScheduledPrintJob {
    pub fn new(
        user: impl Into<String>,
        folder_name: impl Into<String>,
        files: Vec<PathBuf>,
        scheduled_time: DateTime<Local>,
        now: DateTime<Local>,
    ) -> Self {
        let scheduled_time = ledger_precision(scheduled_time);
        Self {
            id: Uuid::new_v4(),
            user: user.into(),
            folder_name: folder_name.into(),
            files,
            scheduled_time,
            interval_ms: (scheduled_time - now).num_milliseconds().max(0),
        }
    }

    /// Time left until the deadline, `None` once it has passed.
    pub fn remaining(&self, now: DateTime<Local>) -> Option<std::time::Duration> {
        (self.scheduled_time - now)
            .to_std()
            .ok()
            .filter(|d| !d.is_zero())
    }

    pub fn is_due(&self, now: DateTime<Local>) -> bool {
        self.scheduled_time <= now
    }

    /// One line for the job list view.
    pub fn summary(&self) -> String {
        let names: Vec<String> = self
            .files
            .iter()
            .map(|p| file_name(p))
            .collect();
        format!(
            "Scheduled by {} at {}, Folder: {}, Files: {}",
            self.user,
            self.scheduled_time.format("%Y-%m-%d %H:%M:%S"),
            self.folder_name,
            names.join(", ")
        )
    }
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_remaining_and_due() {
        let now = Local.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap();
        let job = ScheduledPrintJob::new(
            "alice",
            "ReportsQ1",
            vec![PathBuf::from("/a/1.pdf")],
            now + Duration::minutes(5),
            now,
        );

        assert_eq!(job.interval_ms, 300_000);
        assert_eq!(job.remaining(now), Some(std::time::Duration::from_secs(300)));
        assert!(!job.is_due(now));
        assert_eq!(job.remaining(now + Duration::minutes(5)), None);
        assert!(job.is_due(now + Duration::minutes(6)));
    }

    #[test]
    fn test_new_job_matches_its_ledger_record() {
        let now = Local::now();
        let job = ScheduledPrintJob::new(
            "alice",
            "ReportsQ1",
            vec![PathBuf::from("/a/1.pdf")],
            now + Duration::nanoseconds(1_234_567_891),
            now,
        );
        assert_eq!(job.scheduled_time.nanosecond() % 100, 0);
        assert_eq!(crate::codec::decode(&crate::codec::encode(&job)).unwrap(), job);
    }

    #[test]
    fn test_summary_lists_basenames() {
        let now = Local.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap();
        let job = ScheduledPrintJob::new(
            "bob",
            "Invoices",
            vec![PathBuf::from("/x/a.pdf"), PathBuf::from("/y/b.docx")],
            now,
            now,
        );
        assert_eq!(
            job.summary(),
            "Scheduled by bob at 2030-01-01 10:00:00, Folder: Invoices, Files: a.pdf, b.docx"
        );
    }
}
