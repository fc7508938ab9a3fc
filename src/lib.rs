//! Scheduled printing of folder contents, coordinated between users through
//! a shared job ledger on a common directory.

pub mod audit;
pub mod backend;
pub mod calendar;
pub mod codec;
pub mod config;
pub mod engine;
pub mod errors;
pub mod job;
pub mod ledger;
pub mod library;
pub mod scheduler;
pub mod sentry_init;
pub mod store;
pub mod telemetry;

pub use config::AppConfig;
pub use errors::{PrinterError, Result};
pub use job::ScheduledPrintJob;
pub use scheduler::{SchedulerEvent, SchedulerHandle};
