mod orchestrator;
mod scheduler;

pub use orchestrator::{CycleReport, Ingestor};
pub use scheduler::{Scheduler, SchedulerHandle, TriggerHandle, TriggerOutcome};
