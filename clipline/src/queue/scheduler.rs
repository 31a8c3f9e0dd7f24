//! Delayed wake-ups for the admission loop.
//!
//! Backoff gates and rate-limit retries all funnel into one background task
//! that owns a [`DelayQueue`]. At most one timer is armed at a time: a new
//! deadline only replaces the armed one if it is earlier. The callback
//! re-runs admission, which re-arms the timer for whatever is still gated.

use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::time::{DelayQueue, delay_queue::Key};
use tracing::{debug, trace};

pub struct DelayScheduler {
    tx: mpsc::UnboundedSender<Instant>,
    cancellation_token: CancellationToken,
}

impl DelayScheduler {
    /// Spawn the timer task. `on_fire` runs on the task each time the armed
    /// deadline expires.
    pub fn spawn<F>(on_fire: F, cancellation_token: CancellationToken) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, on_fire, cancellation_token.clone()));
        Self {
            tx,
            cancellation_token,
        }
    }

    /// Request a wake-up after `delay`.
    pub fn schedule(&self, delay: Duration) {
        // Fails only after the task stopped, when wake-ups no longer matter.
        let _ = self.tx.send(Instant::now() + delay);
    }

    pub fn stop(&self) {
        self.cancellation_token.cancel();
    }
}

async fn run<F>(
    mut rx: mpsc::UnboundedReceiver<Instant>,
    on_fire: F,
    cancellation_token: CancellationToken,
) where
    F: Fn(),
{
    let mut timers: DelayQueue<()> = DelayQueue::new();
    let mut armed: Option<(Key, Instant)> = None;

    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => {
                debug!("Delay scheduler stopped");
                break;
            }
            deadline = rx.recv() => {
                let Some(deadline) = deadline else { break };
                let earlier = armed
                    .as_ref()
                    .is_none_or(|(_, current)| deadline < *current);
                if earlier {
                    let key = match armed.take() {
                        Some((key, _)) => {
                            timers.reset_at(&key, deadline);
                            key
                        }
                        None => timers.insert_at((), deadline),
                    };
                    armed = Some((key, deadline));
                }
            }
            Some(_) = timers.next(), if !timers.is_empty() => {
                armed = None;
                trace!("Delay scheduler fired");
                on_fire();
            }
        }
    }
}
