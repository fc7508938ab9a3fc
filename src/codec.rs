//! Single-line ledger record for a [`ScheduledPrintJob`].
//!
//! `user|folder|path1,path2,...|time|intervalMs[|id]`
//!
//! The time uses the ISO-8601 round-trip layout with seven fractional digits
//! and an explicit offset (`2030-01-01T10:00:00.0000000+00:00`). The trailing
//! id field is optional: five-field records written by older instances decode
//! with a freshly generated id.

use crate::errors::{PrinterError, Result};
use crate::job::ScheduledPrintJob;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Timelike};
use std::path::PathBuf;
use uuid::Uuid;

pub const FIELD_SEPARATOR: char = '|';
pub const FILE_SEPARATOR: char = ',';

pub fn encode(job: &ScheduledPrintJob) -> String {
    let files: Vec<String> = job
        .files
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    format!(
        "{}|{}|{}|{}|{}|{}",
        job.user,
        job.folder_name,
        files.join(","),
        format_time(&job.scheduled_time),
        job.interval_ms,
        job.id
    )
}

pub fn decode(line: &str) -> Result<ScheduledPrintJob> {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(FIELD_SEPARATOR).collect();
    if fields.len() != 5 && fields.len() != 6 {
        return Err(PrinterError::Format(format!(
            "Expected 5 or 6 '|' separated fields, found {}",
            fields.len()
        )));
    }

    let files = fields[2]
        .split(FILE_SEPARATOR)
        .filter(|f| !f.is_empty())
        .map(PathBuf::from)
        .collect();

    let scheduled_time = parse_time(fields[3])?;

    let interval_ms = fields[4]
        .trim()
        .parse::<i64>()
        .map_err(|e| PrinterError::Format(format!("Invalid interval '{}': {}", fields[4], e)))?;

    let id = match fields.get(5) {
        Some(raw) => Uuid::parse_str(raw.trim())
            .map_err(|e| PrinterError::Format(format!("Invalid job id '{}': {}", raw, e)))?,
        None => Uuid::new_v4(),
    };

    Ok(ScheduledPrintJob {
        id,
        user: fields[0].to_string(),
        folder_name: fields[1].to_string(),
        files,
        scheduled_time,
        interval_ms,
    })
}

/// Round-trip layout with 100ns resolution.
pub fn format_time(time: &DateTime<Local>) -> String {
    let ticks = time.nanosecond().min(999_999_999) / 100;
    format!(
        "{}.{:07}{}",
        time.format("%Y-%m-%dT%H:%M:%S"),
        ticks,
        time.format("%:z")
    )
}

/// Accepts offset-qualified (`+01:00`, `Z`) and unqualified local timestamps.
pub fn parse_time(raw: &str) -> Result<DateTime<Local>> {
    let raw = raw.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
        return Ok(time.with_timezone(&Local));
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map_err(|_| {
        PrinterError::Format(format!(
            "Date string '{}' was not recognized as a valid DateTime",
            raw
        ))
    })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| PrinterError::Format(format!("Nonexistent local time '{}'", raw)))
}
