//! Periodic per-target tasks

use super::{CycleOutcome, TransmissionController};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};

/// Runs one controller on a fixed schedule
pub struct FeedTask {
    controller: TransmissionController,
    tick: Duration,
}

impl FeedTask {
    pub fn new(controller: TransmissionController, tick: Duration) -> Self {
        Self { controller, tick }
    }

    /// Loop forever. Ticks that fire while a cycle is still confirming are
    /// dropped rather than queued.
    pub async fn run(mut self) {
        let label = self.controller.label();
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(feed = %label, interval_secs = self.tick.as_secs(), "Feed task started");

        loop {
            ticker.tick().await;
            let outcome = self.controller.run_cycle().await;
            log_outcome(&label, &outcome);
        }
    }
}

fn log_outcome(label: &str, outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Transmitted { reports, .. } => {
            for report in reports {
                tracing::debug!(feed = %label, round = report.round_id, outcome = ?report.outcome, "Cycle finished");
            }
        }
        CycleOutcome::NoUpdate(_) => tracing::trace!(feed = %label, "Cycle skipped"),
        other => tracing::debug!(feed = %label, outcome = ?other, "Cycle ended early"),
    }
}

/// Start one task per controller; tasks share nothing but the key ring
pub fn spawn_feed_tasks(controllers: Vec<TransmissionController>, tick: Duration) -> JoinSet<()> {
    let mut tasks = JoinSet::new();
    for controller in controllers {
        tasks.spawn(FeedTask::new(controller, tick).run());
    }
    tasks
}
