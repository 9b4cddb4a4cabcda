//! News ingestion: polls registered RSS/Atom sources, normalizes and
//! deduplicates their entries, optionally pulls full article text, and keeps
//! a per-source audit log of every run.

pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod models;
pub mod services;

pub use config::Config;
pub use db::{CycleSession, Repository};
pub use error::{AppError, Result};
pub use ingest::{CycleReport, Ingestor, Scheduler, SchedulerHandle, TriggerHandle, TriggerOutcome};
