//! Transactional outbox relay.
//!
//! One polling loop per process. Each iteration claims a batch in a short
//! write transaction, publishes the events in order, then marks the
//! successful prefix as published and releases the rest of the claim.
//! Delivery is at-least-once: a crash between publish and mark re-sends.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use ledger_types::{EventId, EventPublisher, UnitOfWorkManager};

const BACKOFF_INITIAL: Duration = Duration::from_millis(200);
const BACKOFF_MAX: Duration = Duration::from_secs(3);

/// Outbox worker settings.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub batch_size: u32,
    /// Sleep between polls when nothing is pending.
    pub poll_interval: Duration,
    /// Claims older than this are considered abandoned.
    pub claim_ttl: Duration,
    pub worker_id: String,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            poll_interval: Duration::from_millis(200),
            claim_ttl: Duration::from_secs(120),
            worker_id: "unknown".to_string(),
        }
    }
}

/// Result of one worker iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing was claimable.
    Idle,
    /// Every claimed event was published.
    Published(usize),
    /// Publishing stopped at the first failure; the remainder was released.
    Partial { published: usize, failed: usize },
    /// Claiming or marking failed.
    Failed(String),
}

/// Exponential backoff, doubling up to a cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait now; the following call waits twice as long.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BACKOFF_INITIAL, BACKOFF_MAX)
    }
}

pub struct OutboxWorker<U: UnitOfWorkManager> {
    uow: Arc<U>,
    publisher: Arc<dyn EventPublisher>,
    config: OutboxConfig,
}

impl<U: UnitOfWorkManager> OutboxWorker<U> {
    pub fn new(uow: Arc<U>, publisher: Arc<dyn EventPublisher>, config: OutboxConfig) -> Self {
        Self {
            uow,
            publisher,
            config,
        }
    }

    /// Claims, publishes and marks one batch.
    #[tracing::instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn run_once(&self) -> RunOutcome {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.config.claim_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(120));
        let owner = self.config.worker_id.clone();
        let limit = self.config.batch_size;

        let claimed = match self
            .uow
            .do_write(move |repos| {
                Box::pin(async move { repos.outbox().claim_batch(limit, &owner, now, ttl).await })
            })
            .await
        {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::error!(error = %e, "outbox claim failed");
                return RunOutcome::Failed(format!("claim: {e}"));
            }
        };
        if claimed.is_empty() {
            return RunOutcome::Idle;
        }

        let mut published: Vec<EventId> = Vec::with_capacity(claimed.len());
        let mut failed = false;
        for event in &claimed {
            let key = event.aggregate_id.to_string();
            match self
                .publisher
                .publish(&event.event_type, &key, &event.payload)
                .await
            {
                Ok(()) => published.push(event.id),
                Err(e) => {
                    tracing::warn!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        error = %e,
                        "outbox publish failed"
                    );
                    failed = true;
                    break;
                }
            }
        }

        let published_count = published.len();
        let remainder: Vec<EventId> = claimed
            .iter()
            .skip(published_count)
            .map(|e| e.id)
            .collect();
        let failed_count = remainder.len();
        let owner = self.config.worker_id.clone();

        let marked = self
            .uow
            .do_write(move |repos| {
                Box::pin(async move {
                    if !published.is_empty() {
                        repos.outbox().mark_published(&published, Utc::now()).await?;
                    }
                    if !remainder.is_empty() {
                        repos.outbox().release_claims(&remainder, &owner).await?;
                    }
                    Ok(())
                })
            })
            .await;
        if let Err(e) = marked {
            tracing::error!(error = %e, "outbox mark published failed");
            return RunOutcome::Failed(format!("mark published: {e}"));
        }

        if failed {
            RunOutcome::Partial {
                published: published_count,
                failed: failed_count,
            }
        } else {
            tracing::debug!(count = published_count, "outbox batch published");
            RunOutcome::Published(published_count)
        }
    }

    /// Polls until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            "outbox worker started"
        );
        let mut backoff = Backoff::default();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.run_once().await {
                RunOutcome::Idle => {
                    backoff.reset();
                    self.config.poll_interval
                }
                RunOutcome::Published(_) => {
                    backoff.reset();
                    Duration::ZERO
                }
                RunOutcome::Partial { .. } | RunOutcome::Failed(_) => backoff.next_delay(),
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(worker_id = %self.config.worker_id, "outbox worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_cap() {
        let mut backoff = Backoff::default();
        let delays: Vec<u128> = (0..6).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![200, 400, 800, 1600, 3000, 3000]);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::default();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
    }
}
