//! In-process task queue with bounded concurrency and backoff redelivery.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{
    HandlerError, QueueConfig, QueueError, QueueStatus, RetryPolicy, SubtaskHandler,
    SubtaskMessage, TaskQueue,
};
use crate::metrics;

/// A message plus the number of the delivery about to be made (1-indexed).
#[derive(Debug)]
struct Delivery {
    message: SubtaskMessage,
    attempt: u32,
}

#[derive(Default)]
struct QueueStats {
    in_flight: AtomicU64,
    acked: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    dropped: AtomicU64,
}

/// Everything a single delivery task needs.
#[derive(Clone)]
struct DeliveryContext {
    handler: Arc<dyn SubtaskHandler>,
    sender: mpsc::Sender<Delivery>,
    retry_policy: RetryPolicy,
    max_attempts: u32,
    stats: Arc<QueueStats>,
    dead_letters: Arc<RwLock<Vec<SubtaskMessage>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl DeliveryContext {
    async fn deliver(self, delivery: Delivery) {
        let Delivery { message, attempt } = delivery;

        self.stats.in_flight.fetch_add(1, Ordering::Relaxed);
        metrics::QUEUE_IN_FLIGHT.inc();
        let result = self.handler.handle(&message).await;
        self.stats.in_flight.fetch_sub(1, Ordering::Relaxed);
        metrics::QUEUE_IN_FLIGHT.dec();

        match result {
            Ok(()) => {
                self.stats.acked.fetch_add(1, Ordering::Relaxed);
                metrics::QUEUE_DELIVERIES.with_label_values(&["acked"]).inc();
                debug!(
                    ticket_id = %message.ticket_id,
                    subtask = %message.subtask,
                    attempt,
                    "Delivery acknowledged"
                );
            }
            Err(HandlerError::Drop(reason)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::QUEUE_DELIVERIES.with_label_values(&["dropped"]).inc();
                warn!(
                    ticket_id = %message.ticket_id,
                    subtask = %message.subtask,
                    "Handler dropped message: {}",
                    reason
                );
            }
            Err(HandlerError::Retry(reason)) if attempt >= self.max_attempts => {
                self.stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
                metrics::QUEUE_DELIVERIES
                    .with_label_values(&["dead_lettered"])
                    .inc();
                error!(
                    ticket_id = %message.ticket_id,
                    subtask = %message.subtask,
                    attempt,
                    "Giving up on message after {} attempts: {}",
                    attempt,
                    reason
                );
                self.dead_letters.write().await.push(message);
            }
            Err(HandlerError::Retry(reason)) => {
                let delay = self.retry_policy.next_delay(attempt);
                self.stats.retried.fetch_add(1, Ordering::Relaxed);
                metrics::QUEUE_DELIVERIES.with_label_values(&["retried"]).inc();
                warn!(
                    ticket_id = %message.ticket_id,
                    subtask = %message.subtask,
                    attempt,
                    "Delivery failed, redelivering in {:?}: {}",
                    delay,
                    reason
                );
                self.schedule_redelivery(message, attempt + 1, delay);
            }
        }
    }

    fn schedule_redelivery(&self, message: SubtaskMessage, attempt: u32, delay: Duration) {
        let sender = self.sender.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    warn!(
                        ticket_id = %message.ticket_id,
                        subtask = %message.subtask,
                        "Queue stopped, scheduled redelivery discarded"
                    );
                }
                _ = tokio::time::sleep(delay) => {
                    let ticket_id = message.ticket_id.clone();
                    if sender.send(Delivery { message, attempt }).await.is_err() {
                        warn!(ticket_id = %ticket_id, "Queue closed before redelivery");
                    }
                }
            }
        });
    }
}

/// Task queue backed by a bounded tokio channel.
///
/// Delivery is at-least-once within the process: a handler asking for a
/// retry gets the message again after exponential backoff, up to
/// `max_attempts` deliveries, after which the message is dead-lettered.
/// Messages do not survive a restart.
pub struct InMemoryTaskQueue {
    config: QueueConfig,
    retry_policy: RetryPolicy,
    sender: mpsc::Sender<Delivery>,
    receiver: Mutex<Option<mpsc::Receiver<Delivery>>>,
    semaphore: Arc<Semaphore>,
    stats: Arc<QueueStats>,
    dead_letters: Arc<RwLock<Vec<SubtaskMessage>>>,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl InMemoryTaskQueue {
    pub fn new(config: QueueConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let (shutdown_tx, _) = broadcast::channel(1);
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_dispatches.max(1)));

        Self {
            retry_policy: RetryPolicy::from_config(&config),
            config,
            sender,
            receiver: Mutex::new(Some(receiver)),
            semaphore,
            stats: Arc::new(QueueStats::default()),
            dead_letters: Arc::new(RwLock::new(Vec::new())),
            running: AtomicBool::new(false),
            shutdown_tx,
            loop_handle: Mutex::new(None),
        }
    }

    /// Replace the backoff derived from the config.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Start delivering messages to `handler`.
    ///
    /// Messages enqueued before `start` are buffered and delivered once the
    /// loop runs. A stopped queue cannot be restarted.
    pub fn start(&self, handler: Arc<dyn SubtaskHandler>) {
        let receiver = match self.receiver.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let Some(mut receiver) = receiver else {
            warn!("Task queue already started or stopped");
            return;
        };

        self.running.store(true, Ordering::SeqCst);
        info!(
            max_concurrent = self.config.max_concurrent_dispatches,
            max_attempts = self.config.max_attempts,
            "Starting task queue"
        );

        let context = DeliveryContext {
            handler,
            sender: self.sender.clone(),
            retry_policy: self.retry_policy.clone(),
            max_attempts: self.config.max_attempts.max(1),
            stats: Arc::clone(&self.stats),
            dead_letters: Arc::clone(&self.dead_letters),
            shutdown_tx: self.shutdown_tx.clone(),
        };
        let semaphore = Arc::clone(&self.semaphore);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            info!("Task queue dispatch loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Task queue dispatch loop shutting down");
                        break;
                    }
                    delivery = receiver.recv() => {
                        let Some(delivery) = delivery else {
                            break;
                        };
                        let permit = tokio::select! {
                            _ = shutdown_rx.recv() => {
                                debug!(
                                    ticket_id = %delivery.message.ticket_id,
                                    subtask = %delivery.message.subtask,
                                    "Shutdown while waiting for a delivery slot, message discarded"
                                );
                                info!("Task queue dispatch loop shutting down");
                                break;
                            }
                            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                                Ok(permit) => permit,
                                Err(_) => break,
                            },
                        };
                        let context = context.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            context.deliver(delivery).await;
                        });
                    }
                }
            }
        });

        if let Ok(mut guard) = self.loop_handle.lock() {
            *guard = Some(handle);
        }
    }

    /// Stop delivering, wait for in-flight deliveries, and close the queue.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Task queue not running");
            return;
        }

        info!("Stopping task queue");
        let _ = self.shutdown_tx.send(());

        let handle = self.loop_handle.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Task queue dispatch loop panicked: {}", e);
            }
        }

        let permits = self.config.max_concurrent_dispatches.max(1) as u32;
        if let Ok(all) = self.semaphore.acquire_many(permits).await {
            drop(all);
        }

        info!("Task queue stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            running: self.is_running(),
            queued: self.sender.max_capacity() - self.sender.capacity(),
            in_flight: self.stats.in_flight.load(Ordering::Relaxed),
            acked: self.stats.acked.load(Ordering::Relaxed),
            retried: self.stats.retried.load(Ordering::Relaxed),
            dead_lettered: self.stats.dead_lettered.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }

    /// Messages that exhausted their attempts.
    pub async fn dead_letters(&self) -> Vec<SubtaskMessage> {
        self.dead_letters.read().await.clone()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, message: SubtaskMessage) -> Result<(), QueueError> {
        self.sender
            .try_send(Delivery {
                message,
                attempt: 1,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => QueueError::Full,
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::SubtaskKind;
    use std::collections::HashMap;

    /// Handler that fails each message a fixed number of times before acking.
    struct FlakyHandler {
        failures_before_success: u32,
        refuse: bool,
        delay: Duration,
        calls: Mutex<HashMap<String, u32>>,
        current: AtomicU64,
        max_seen: AtomicU64,
    }

    impl FlakyHandler {
        fn new(failures_before_success: u32) -> Self {
            Self {
                failures_before_success,
                refuse: false,
                delay: Duration::ZERO,
                calls: Mutex::new(HashMap::new()),
                current: AtomicU64::new(0),
                max_seen: AtomicU64::new(0),
            }
        }

        fn total_calls(&self) -> u32 {
            self.calls.lock().unwrap().values().sum()
        }
    }

    #[async_trait]
    impl SubtaskHandler for FlakyHandler {
        async fn handle(&self, message: &SubtaskMessage) -> Result<(), HandlerError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.current.fetch_sub(1, Ordering::SeqCst);

            let call = {
                let mut calls = self.calls.lock().unwrap();
                let entry = calls.entry(message.ticket_id.clone()).or_insert(0);
                *entry += 1;
                *entry
            };

            if self.refuse {
                return Err(HandlerError::Drop("unknown ticket".to_string()));
            }
            if call <= self.failures_before_success {
                return Err(HandlerError::Retry("store unavailable".to_string()));
            }
            Ok(())
        }
    }

    fn message(ticket_id: &str) -> SubtaskMessage {
        SubtaskMessage {
            ticket_id: ticket_id.to_string(),
            subtask: SubtaskKind::Correctness,
            submission_ref: "data:image/png;base64,AAAA".to_string(),
            problem_id: "Q001".to_string(),
            rubric_override: None,
        }
    }

    fn fast_queue(config: QueueConfig) -> InMemoryTaskQueue {
        InMemoryTaskQueue::new(config).with_retry_policy(RetryPolicy {
            base_delay: Duration::from_millis(5),
            multiplier: 2.0,
            max_delay: Duration::from_millis(50),
        })
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_delivers_buffered_messages() {
        let queue = fast_queue(QueueConfig::default());
        let handler = Arc::new(FlakyHandler::new(0));

        for i in 0..5 {
            queue.enqueue(message(&format!("t-{}", i))).await.unwrap();
        }
        assert_eq!(queue.status().queued, 5);

        queue.start(handler.clone());
        wait_until(|| queue.status().acked == 5).await;

        assert_eq!(handler.total_calls(), 5);
        assert_eq!(queue.status().queued, 0);
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_respects_concurrency_limit() {
        let config = QueueConfig {
            max_concurrent_dispatches: 2,
            ..Default::default()
        };
        let queue = fast_queue(config);
        let mut handler = FlakyHandler::new(0);
        handler.delay = Duration::from_millis(20);
        let handler = Arc::new(handler);

        queue.start(handler.clone());
        for i in 0..6 {
            queue.enqueue(message(&format!("t-{}", i))).await.unwrap();
        }

        wait_until(|| queue.status().acked == 6).await;
        assert!(handler.max_seen.load(Ordering::SeqCst) <= 2);
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let queue = fast_queue(QueueConfig::default());
        let handler = Arc::new(FlakyHandler::new(2));

        queue.start(handler.clone());
        queue.enqueue(message("t-1")).await.unwrap();

        wait_until(|| queue.status().acked == 1).await;
        let status = queue.status();
        assert_eq!(status.retried, 2);
        assert_eq!(status.dead_lettered, 0);
        assert_eq!(handler.total_calls(), 3);
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_dead_letters_after_max_attempts() {
        let config = QueueConfig {
            max_attempts: 2,
            ..Default::default()
        };
        let queue = fast_queue(config);
        let handler = Arc::new(FlakyHandler::new(u32::MAX));

        queue.start(handler.clone());
        queue.enqueue(message("t-1")).await.unwrap();

        wait_until(|| queue.status().dead_lettered == 1).await;
        assert_eq!(handler.total_calls(), 2);
        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].ticket_id, "t-1");
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_dropped_message_is_not_retried() {
        let queue = fast_queue(QueueConfig::default());
        let mut handler = FlakyHandler::new(0);
        handler.refuse = true;
        let handler = Arc::new(handler);

        queue.start(handler.clone());
        queue.enqueue(message("t-1")).await.unwrap();

        wait_until(|| queue.status().dropped == 1).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(handler.total_calls(), 1);
        assert_eq!(queue.status().retried, 0);
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_full_queue_rejects() {
        let config = QueueConfig {
            capacity: 1,
            ..Default::default()
        };
        let queue = fast_queue(config);

        queue.enqueue(message("t-1")).await.unwrap();
        let result = queue.enqueue(message("t-2")).await;
        assert!(matches!(result, Err(QueueError::Full)));
    }

    #[tokio::test]
    async fn test_stop_does_not_wait_for_a_free_slot() {
        let config = QueueConfig {
            max_concurrent_dispatches: 1,
            ..Default::default()
        };
        let queue = fast_queue(config);
        let mut handler = FlakyHandler::new(0);
        handler.delay = Duration::from_millis(200);
        let handler = Arc::new(handler);

        queue.enqueue(message("t-1")).await.unwrap();
        queue.enqueue(message("t-2")).await.unwrap();
        queue.start(handler.clone());

        wait_until(|| handler.current.load(Ordering::SeqCst) == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        queue.stop().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // t-1 finished while stopping; t-2 was waiting for the slot.
        assert_eq!(handler.total_calls(), 1);
        assert_eq!(queue.status().acked, 1);
    }

    #[tokio::test]
    async fn test_stopped_queue_is_closed() {
        let queue = fast_queue(QueueConfig::default());
        queue.start(Arc::new(FlakyHandler::new(0)));
        assert!(queue.is_running());

        queue.stop().await;
        assert!(!queue.is_running());

        let result = queue.enqueue(message("t-1")).await;
        assert!(matches!(result, Err(QueueError::Closed)));
    }
}
