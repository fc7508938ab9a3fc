use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrinterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No folder selected")]
    NoFolderSelected,

    #[error("No time specified")]
    NoTimeSpecified,

    #[error("Folder '{0}' has no files")]
    EmptyFolder(String),

    #[error("Scheduled time must be in the future")]
    TimeInPast,

    #[error("Time slot is already taken by {user} for folder '{folder}'")]
    SlotTaken { user: String, folder: String },

    #[error("File path not found for file: {0}")]
    FilePathUnresolved(String),

    #[error("Folder already exists: {0}")]
    FolderExists(String),

    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Folder is already being printed: {0}")]
    FolderBusy(String),

    #[error("No scheduled job selected in the calendar")]
    NoJobSelected,

    #[error("Scheduled job not found: {0}")]
    JobNotFound(String),

    #[error("Failed to access {} after {attempts} attempts: {source}", path.display())]
    Persistence {
        path: PathBuf,
        attempts: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Format error: {0}")]
    Format(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Print failed: {0}")]
    Print(String),

    #[error("Scheduler is not running")]
    SchedulerStopped,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PrinterError {
    /// True for the validation class: reported to the user, nothing written.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PrinterError::NoFolderSelected
                | PrinterError::NoTimeSpecified
                | PrinterError::EmptyFolder(_)
                | PrinterError::TimeInPast
                | PrinterError::SlotTaken { .. }
                | PrinterError::FilePathUnresolved(_)
                | PrinterError::FolderExists(_)
                | PrinterError::FolderNotFound(_)
                | PrinterError::InvalidName(_)
                | PrinterError::FolderBusy(_)
                | PrinterError::NoJobSelected
                | PrinterError::JobNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PrinterError>;
