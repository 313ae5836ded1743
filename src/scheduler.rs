//! Periodic and on-demand driver for [`QueueEngine::run_cycle`].
//!
//! Cycles run inline in one loop, so two never overlap. A manual trigger that
//! arrives mid-cycle waits in a queue of one and runs right after; further
//! triggers are coalesced into that pending one.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::acquisition::Acquirer;
use crate::engine::{CycleOutcome, QueueEngine};
use crate::error::EngineError;
use crate::publication::Publisher;
use crate::store::JobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAck {
    Queued,
    /// A trigger is already waiting; this one was folded into it.
    AlreadyPending,
    /// The scheduler is gone.
    Closed,
}

/// Cloneable sender side of the manual trigger queue.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<()>,
}

impl TriggerHandle {
    pub fn trigger(&self) -> TriggerAck {
        match self.tx.try_send(()) {
            Ok(()) => TriggerAck::Queued,
            Err(TrySendError::Full(())) => TriggerAck::AlreadyPending,
            Err(TrySendError::Closed(())) => TriggerAck::Closed,
        }
    }
}

#[derive(Debug)]
pub struct TriggerQueue {
    rx: mpsc::Receiver<()>,
}

pub fn trigger_channel() -> (TriggerHandle, TriggerQueue) {
    let (tx, rx) = mpsc::channel(1);
    (TriggerHandle { tx }, TriggerQueue { rx })
}

pub struct Scheduler<S, A, P> {
    engine: QueueEngine<S, A, P>,
    period: Duration,
    triggers: TriggerQueue,
}

impl<S: JobStore, A: Acquirer, P: Publisher> Scheduler<S, A, P> {
    pub fn new(engine: QueueEngine<S, A, P>, period: Duration, triggers: TriggerQueue) -> Self {
        Self {
            engine,
            period,
            triggers,
        }
    }

    /// Run cycles on every tick and manual trigger until `shutdown` resolves.
    ///
    /// The first tick fires immediately. Ticks missed while a long cycle runs
    /// are skipped rather than replayed.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            period_secs = self.period.as_secs(),
            daily_limit = self.engine.settings().daily_limit,
            "Scheduler started"
        );

        loop {
            let reason = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
                Some(()) = self.triggers.rx.recv() => "manual",
                _ = ticker.tick() => "interval",
            };
            self.run_once(reason).await;
        }
    }

    async fn run_once(&self, reason: &str) {
        debug!(reason, "Starting cycle");
        match self.engine.run_cycle().await {
            Ok(outcome) => log_outcome(reason, &outcome),
            Err(EngineError::CycleInProgress) => {
                warn!(reason, "Cycle skipped: another cycle is running");
            }
            Err(EngineError::QueueBusy { owner }) => {
                warn!(reason, holder = %owner, "Cycle skipped: queue held by another process");
            }
            // Store unavailable; the next tick tries again.
            Err(e) => error!(reason, error = %e, "Cycle aborted"),
        }
    }
}

fn log_outcome(reason: &str, outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::QuotaExhausted {
            published_today,
            daily_limit,
        } => info!(reason, published_today, daily_limit, "Quota exhausted for today"),
        CycleOutcome::QueueEmpty => info!(reason, "Queue empty"),
        CycleOutcome::JobSucceeded { id } => info!(reason, job = %id, "Job published"),
        CycleOutcome::JobFailed { id, reason: why } => {
            warn!(reason, job = %id, error = %why, "Job failed")
        }
    }
}
