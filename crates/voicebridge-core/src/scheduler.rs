//! Periodic callbacks anchored to completion time.
//!
//! Each task runs, then sleeps a full interval before running again, so a
//! slow run delays the next one and never overlaps itself.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use voicebridge_common::Result;

use crate::hub::BridgeHub;

/// A periodic callback. Errors are logged and never stop the schedule.
#[async_trait]
pub trait ScheduledTask: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<()>;
}

struct Scheduled {
    task: Arc<dyn ScheduledTask>,
    interval: Duration,
    run_on_start: bool,
}

/// Collects tasks, then drives each on its own tokio task.
#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<Scheduled>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(
        &mut self,
        task: Arc<dyn ScheduledTask>,
        interval: Duration,
        run_on_start: bool,
    ) -> &mut Self {
        self.tasks.push(Scheduled {
            task,
            interval,
            run_on_start,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn start(self) -> SchedulerHandle {
        let token = CancellationToken::new();
        let handles = self
            .tasks
            .into_iter()
            .map(|scheduled| tokio::spawn(drive(scheduled, token.clone())))
            .collect();
        SchedulerHandle { token, handles }
    }
}

/// Running schedule.
pub struct SchedulerHandle {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Cancel every task and wait for the loops to exit. A run in progress
    /// is abandoned at its next await point.
    pub async fn shutdown(self) {
        self.token.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Scheduled task panicked");
            }
        }
    }
}

async fn drive(scheduled: Scheduled, token: CancellationToken) {
    let Scheduled {
        task,
        interval,
        run_on_start,
    } = scheduled;
    info!(
        task = task.name(),
        interval_secs = interval.as_secs(),
        run_on_start,
        "Scheduled task started"
    );

    if !run_on_start {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    loop {
        let started = Instant::now();
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = task.run() => match result {
                Ok(()) => debug!(
                    task = task.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Scheduled task finished"
                ),
                Err(e) => warn!(task = task.name(), error = %e, "Scheduled task failed"),
            },
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!(task = task.name(), "Scheduled task stopped");
}

// ---------------------------------------------------------------------------
// Built-in tasks
// ---------------------------------------------------------------------------

/// Ensures a connection for every registered group.
pub struct ReconnectTask {
    hub: BridgeHub,
}

impl ReconnectTask {
    pub fn new(hub: BridgeHub) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl ScheduledTask for ReconnectTask {
    fn name(&self) -> &str {
        "voice-check"
    }

    async fn run(&self) -> Result<()> {
        let summary = self.hub.reconnect_all().await?;
        if summary.failed > 0 {
            warn!(
                failed = summary.failed,
                attempted = summary.attempted,
                "Some groups could not be connected"
            );
        }
        Ok(())
    }
}
