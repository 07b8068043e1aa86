use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, error, info, warn};

use super::{deliver, Delivery, NotificationError, NotificationIntent, Notifier};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Pending notices held before new ones are dropped
    pub queue_capacity: usize,
    /// Delivery attempts per notice, including the first
    pub max_attempts: u32,
    /// Backoff unit; the n-th retry waits up to `2^n` units
    pub retry_backoff_ms: u64,
    /// Upper bound on a single wait between attempts
    pub max_retry_delay_ms: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_attempts: 3,
            retry_backoff_ms: 200,
            max_retry_delay_ms: 30_000,
        }
    }
}

/// Delivery counters
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    pub queued: AtomicU64,
    pub delivered: AtomicU64,
    pub skipped: AtomicU64,
    pub failed: AtomicU64,
    pub dropped: AtomicU64,
}

impl DispatchMetrics {
    pub fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        warn!("Notification dropped before delivery");
    }

    pub fn get_stats(&self) -> DispatchStats {
        DispatchStats {
            queued: self.queued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Notification metrics: queued={}, delivered={}, skipped={}, failed={}, dropped={}",
            stats.queued, stats.delivered, stats.skipped, stats.failed, stats.dropped
        );
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub queued: u64,
    pub delivered: u64,
    pub skipped: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Hands notices to a background worker after a transition commits.
///
/// `dispatch` never blocks and never fails the caller: a full or closed queue
/// only drops the notice. Must be created inside a tokio runtime.
pub struct NotificationDispatcher {
    sender: Mutex<Option<mpsc::Sender<NotificationIntent>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<DispatchMetrics>,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("metrics", &self.metrics.get_stats())
            .finish()
    }
}

impl NotificationDispatcher {
    pub fn spawn(notifier: Arc<dyn Notifier>, settings: DispatchSettings) -> Self {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let metrics = Arc::new(DispatchMetrics::default());
        let worker = tokio::spawn(run_worker(receiver, notifier, settings, metrics.clone()));

        Self {
            sender: Mutex::new(Some(sender)),
            worker: tokio::sync::Mutex::new(Some(worker)),
            metrics,
        }
    }

    pub fn dispatch(&self, intents: Vec<NotificationIntent>) {
        let guard = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for intent in intents {
            let Some(sender) = guard.as_ref() else {
                debug!(request_id = %intent.request_id, "Dispatcher shut down");
                self.metrics.record_dropped();
                continue;
            };
            match sender.try_send(intent) {
                Ok(()) => self.metrics.record_queued(),
                Err(TrySendError::Full(intent)) => {
                    warn!(
                        request_id = %intent.request_id,
                        subject = %intent.subject,
                        "Notification queue full"
                    );
                    self.metrics.record_dropped();
                }
                Err(TrySendError::Closed(intent)) => {
                    warn!(request_id = %intent.request_id, "Notification queue closed");
                    self.metrics.record_dropped();
                }
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.metrics.get_stats()
    }

    /// Stop accepting notices and wait until the queued ones are handled.
    pub async fn shutdown(&self) -> DispatchStats {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(sender);

        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                error!("Notification worker stopped abnormally: {}", e);
            }
        }

        self.metrics.log_stats();
        self.metrics.get_stats()
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<NotificationIntent>,
    notifier: Arc<dyn Notifier>,
    settings: DispatchSettings,
    metrics: Arc<DispatchMetrics>,
) {
    while let Some(intent) = receiver.recv().await {
        deliver_with_retry(notifier.as_ref(), &intent, &settings, &metrics).await;
    }
    debug!("Notification worker drained");
}

/// Delays between attempts: exponential, capped, jittered. Yields one delay
/// fewer than `max_attempts` since the first attempt does not wait.
fn retry_strategy(settings: &DispatchSettings) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(settings.retry_backoff_ms)
        .max_delay(Duration::from_millis(settings.max_retry_delay_ms))
        .map(jitter)
        .take(settings.max_attempts.max(1) as usize - 1)
}

async fn deliver_with_retry(
    notifier: &dyn Notifier,
    intent: &NotificationIntent,
    settings: &DispatchSettings,
    metrics: &DispatchMetrics,
) {
    let mut attempts = 0u32;
    let result = RetryIf::spawn(
        retry_strategy(settings),
        || {
            attempts += 1;
            let attempt = attempts;
            async move {
                deliver(notifier, intent).await.inspect_err(|e| {
                    warn!(
                        request_id = %intent.request_id,
                        attempt,
                        error = %e,
                        "Notification delivery attempt failed"
                    );
                })
            }
        },
        NotificationError::is_transient,
    )
    .await;

    match result {
        Ok(Delivery::Sent { .. }) => metrics.record_delivered(),
        Ok(Delivery::Skipped { reason }) => {
            debug!(request_id = %intent.request_id, reason = %reason, "Notification skipped");
            metrics.record_skipped();
        }
        Err(e) => {
            error!(
                request_id = %intent.request_id,
                attempts,
                error = %e,
                "Notification delivery failed"
            );
            metrics.record_failed();
        }
    }
}
