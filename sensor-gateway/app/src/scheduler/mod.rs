pub mod policy;

pub use policy::{FlushPolicy, FlushTrigger};

use crate::sender::{BatchEndpoint, FlushOutcome, UploadError, Uploader};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_TICK: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub enum TickOutcome {
    Idle,
    Flushed {
        trigger: FlushTrigger,
        outcome: FlushOutcome,
    },
    Failed {
        trigger: FlushTrigger,
        error: UploadError,
    },
}

/// Fixed-period loop that evaluates the flush rule and drives the uploader.
///
/// Polling on the tick is the only way a flush starts; ingestion never
/// wakes the scheduler.
pub struct FlushScheduler<E> {
    uploader: Uploader<E>,
    policy: FlushPolicy,
    tick: Duration,
}

impl<E: BatchEndpoint> FlushScheduler<E> {
    pub fn new(uploader: Uploader<E>, send_interval: Duration, tick: Duration) -> Self {
        let policy = FlushPolicy::new(uploader.batch_size(), send_interval);
        Self {
            uploader,
            policy,
            tick,
        }
    }

    /// One evaluation: flush if the policy says so, otherwise do nothing.
    pub async fn tick(&mut self) -> TickOutcome {
        let state = self.uploader.buffer().state();
        let Some(trigger) = self
            .policy
            .evaluate(state, self.uploader.time_since_last_flush())
        else {
            return TickOutcome::Idle;
        };

        debug!(
            ?trigger,
            size = state.size,
            capacity = state.capacity,
            "Flush triggered"
        );

        match self.uploader.flush().await {
            Ok(outcome) => TickOutcome::Flushed { trigger, outcome },
            Err(error) => TickOutcome::Failed { trigger, error },
        }
    }

    /// Run until `cancel` fires. Unsent readings are abandoned on exit.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            batch_size = self.policy.batch_size,
            send_interval = ?self.policy.send_interval,
            tick = ?self.tick,
            "Flush scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.tick() => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.tick) => {}
            }
        }

        let abandoned = self.uploader.buffer().size();
        if abandoned > 0 {
            warn!(abandoned, "Flush scheduler stopped with unsent readings");
        } else {
            info!("Flush scheduler stopped");
        }
    }

    pub fn policy(&self) -> &FlushPolicy {
        &self.policy
    }

    pub fn uploader(&self) -> &Uploader<E> {
        &self.uploader
    }
}
