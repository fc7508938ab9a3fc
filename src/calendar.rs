//! Weekly calendar projection of pending jobs.
//!
//! Columns are days of the week (Sunday first) and rows are minutes of the
//! day. Only jobs dated within the seven days starting today are placed;
//! their column comes from their weekday, so the grid is a rolling week
//! rather than a fixed Sunday-to-Saturday span.

use crate::job::ScheduledPrintJob;
use chrono::{DateTime, Datelike, Days, Local, NaiveDate, Timelike};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

pub const DAYS: usize = 7;
pub const MINUTES_PER_DAY: usize = 24 * 60;

/// Grid coordinates: `(day, minute)`, day 0 is Sunday.
pub type Slot = (usize, usize);

pub fn slot_of(time: &DateTime<Local>) -> Slot {
    (
        time.weekday().num_days_from_sunday() as usize,
        (time.hour() * 60 + time.minute()) as usize,
    )
}

/// `[HH:mm] user - folder`
pub fn cell_entry(job: &ScheduledPrintJob) -> String {
    format!(
        "[{}] {} - {}",
        job.scheduled_time.format("%H:%M"),
        job.user,
        job.folder_name
    )
}

/// Row label for a minute of the day.
pub fn row_label(minute: usize) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// Header labels for the current Sunday-based week, `"Monday 14/10"`.
pub fn column_headers(now: DateTime<Local>) -> Vec<String> {
    let today = now.date_naive();
    let sunday = today - Days::new(u64::from(today.weekday().num_days_from_sunday()));
    (0..DAYS as u64)
        .map(|offset| (sunday + Days::new(offset)).format("%A %d/%m").to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarCell {
    pub day: usize,
    pub minute: usize,
    pub text: String,
    pub job_ids: Vec<Uuid>,
}

/// Sparse 7 x 1440 grid. Cells with no jobs are absent.
#[derive(Debug, Clone, Default)]
pub struct CalendarProjection {
    cells: BTreeMap<Slot, CalendarCell>,
}

impl CalendarProjection {
    /// Project `jobs` as seen at `now`. Jobs outside the window are left out.
    pub fn build<'a, I>(jobs: I, now: DateTime<Local>) -> Self
    where
        I: IntoIterator<Item = &'a ScheduledPrintJob>,
    {
        let today = now.date_naive();
        let end = today + Days::new(DAYS as u64);
        let mut cells: BTreeMap<Slot, CalendarCell> = BTreeMap::new();

        for job in jobs {
            if !in_window(job.scheduled_time.date_naive(), today, end) {
                continue;
            }

            let (day, minute) = slot_of(&job.scheduled_time);
            let cell = cells.entry((day, minute)).or_insert_with(|| CalendarCell {
                day,
                minute,
                text: String::new(),
                job_ids: Vec::new(),
            });
            if !cell.text.is_empty() {
                cell.text.push('\n');
            }
            cell.text.push_str(&cell_entry(job));
            cell.job_ids.push(job.id);
        }

        Self { cells }
    }

    pub fn cell_text(&self, day: usize, minute: usize) -> &str {
        self.cells
            .get(&(day, minute))
            .map(|c| c.text.as_str())
            .unwrap_or("")
    }

    /// Jobs behind a cell, in the order they were placed.
    pub fn jobs_at(&self, day: usize, minute: usize) -> &[Uuid] {
        self.cells
            .get(&(day, minute))
            .map(|c| c.job_ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn cells(&self) -> impl Iterator<Item = &CalendarCell> {
        self.cells.values()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Plain-text rendering of the occupied rows only.
    pub fn render(&self, headers: &[String]) -> String {
        let mut by_minute: BTreeMap<usize, Vec<&CalendarCell>> = BTreeMap::new();
        for cell in self.cells.values() {
            by_minute.entry(cell.minute).or_default().push(cell);
        }

        let mut out = String::new();
        for (minute, cells) in by_minute {
            for cell in cells {
                let header = headers.get(cell.day).map(String::as_str).unwrap_or("?");
                for line in cell.text.lines() {
                    out.push_str(&format!("{}  {:<16} {}\n", row_label(minute), header, line));
                }
            }
        }
        out
    }
}

fn in_window(date: NaiveDate, today: NaiveDate, end: NaiveDate) -> bool {
    date >= today && date < end
}
