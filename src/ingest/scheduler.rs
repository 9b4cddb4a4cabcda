//! Periodic and on-demand ingestion.
//!
//! One background task owns the cycle loop. It wakes on a fixed interval or
//! when a [`TriggerHandle`] asks for a run, and executes cycles one at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{AppError, Result};

use super::Ingestor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A cycle will start as soon as the scheduler is idle.
    Accepted,
    /// A manual cycle is already queued; this request was dropped.
    AlreadyPending,
    /// The scheduler has shut down.
    Stopped,
}

/// Cloneable handle for requesting a cycle without waiting for it.
#[derive(Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<()>,
}

impl TriggerHandle {
    pub fn trigger(&self) -> TriggerOutcome {
        match self.tx.try_send(()) {
            Ok(()) => {
                tracing::info!("Manual news update requested");
                TriggerOutcome::Accepted
            }
            Err(mpsc::error::TrySendError::Full(())) => {
                tracing::info!("News update already pending, request dropped");
                TriggerOutcome::AlreadyPending
            }
            Err(mpsc::error::TrySendError::Closed(())) => TriggerOutcome::Stopped,
        }
    }
}

pub struct SchedulerHandle {
    trigger: TriggerHandle,
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn trigger(&self) -> TriggerOutcome {
        self.trigger.trigger()
    }

    pub fn trigger_handle(&self) -> TriggerHandle {
        self.trigger.clone()
    }

    /// Stop the loop. A cycle in progress runs to completion first.
    pub async fn stop(self) -> Result<()> {
        let _ = self.cancel_tx.send(());
        self.join
            .await
            .map_err(|e| AppError::Other(anyhow::anyhow!("scheduler task failed: {e}")))
    }
}

pub struct Scheduler;

impl Scheduler {
    /// Run the startup cycle, then spawn the interval loop. The first
    /// scheduled cycle fires one `interval` after startup.
    pub async fn start(ingestor: Arc<Ingestor>, interval: Duration) -> SchedulerHandle {
        run_logged(&ingestor, "startup").await;
        Self::spawn(ingestor, interval)
    }

    /// Spawn the interval loop without a startup cycle.
    pub fn spawn(ingestor: Arc<Ingestor>, interval: Duration) -> SchedulerHandle {
        let (trigger_tx, mut trigger_rx) = mpsc::channel(1);
        let (cancel_tx, mut cancel_rx) = broadcast::channel(1);

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel_rx.recv() => {
                        tracing::info!("Scheduler shutdown requested");
                        break;
                    }
                    Some(()) = trigger_rx.recv() => {
                        run_logged(&ingestor, "manual").await;
                    }
                    _ = ticker.tick() => {
                        run_logged(&ingestor, "scheduled").await;
                    }
                }
            }
        });

        tracing::info!(interval_secs = interval.as_secs(), "News update scheduler started");
        SchedulerHandle {
            trigger: TriggerHandle { tx: trigger_tx },
            cancel_tx,
            join,
        }
    }
}

async fn run_logged(ingestor: &Ingestor, reason: &'static str) {
    match ingestor.run_cycle().await {
        Ok(report) => tracing::debug!(reason, ?report, "Cycle finished"),
        Err(e) => tracing::error!(reason, error = %e, "News update failed"),
    }
}
