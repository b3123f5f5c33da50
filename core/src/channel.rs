// catalog_core/src/channel.rs

//! At-least-once delivery of `ProductCreatedEvent`s from the write path to a
//! background `EventHandler`.
//!
//! [`EventChannel`] is the producer-facing seam; [`InMemoryEventChannel`] is a
//! bounded tokio queue behind it. An [`EventWorker`] drains the queue, retries
//! failed deliveries with exponential backoff and parks deliveries that ran
//! out of retries in a dead-letter list.

use crate::consumer::EventHandler;
use crate::error::{CatalogError, CatalogResult};
use crate::model::ProductCreatedEvent;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn, Instrument};

/// Producer side of the channel. `publish` only enqueues; it never waits for
/// the event to be handled.
#[async_trait]
pub trait EventChannel: Send + Sync {
  async fn publish(&self, event: ProductCreatedEvent) -> CatalogResult<()>;
}

/// An event plus its delivery attempt number, starting at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
  pub event: ProductCreatedEvent,
  pub attempt: u32,
}

impl Envelope {
  fn first(event: ProductCreatedEvent) -> Self {
    Self { event, attempt: 1 }
  }

  fn next_attempt(mut self) -> Self {
    self.attempt += 1;
    self
  }
}

/// Redelivery schedule: `max_retries` extra attempts, waiting
/// `initial_delay * multiplier^(n-1)` before retry `n`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_retries: u32,
  pub initial_delay: Duration,
  pub multiplier: u32,
  pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      initial_delay: Duration::from_millis(1000),
      multiplier: 2,
      max_delay: None,
    }
  }
}

impl RetryPolicy {
  pub fn no_retries() -> Self {
    Self {
      max_retries: 0,
      ..Self::default()
    }
  }

  /// Delay before redelivering an envelope whose `failed_attempt` just failed,
  /// or `None` once retries are exhausted.
  pub fn delay_after(&self, failed_attempt: u32) -> Option<Duration> {
    if failed_attempt > self.max_retries {
      return None;
    }
    let factor = self.multiplier.max(1).saturating_pow(failed_attempt.saturating_sub(1));
    let delay = self.initial_delay.saturating_mul(factor);
    Some(match self.max_delay {
      Some(cap) => delay.min(cap),
      None => delay,
    })
  }
}

/// Bounded in-process queue.
#[derive(Debug, Clone)]
pub struct InMemoryEventChannel {
  sender: mpsc::Sender<Envelope>,
}

/// Consumer end of an [`InMemoryEventChannel`], handed to an [`EventWorker`].
#[derive(Debug)]
pub struct EventQueue {
  receiver: mpsc::Receiver<Envelope>,
  redelivery: mpsc::WeakSender<Envelope>,
}

impl InMemoryEventChannel {
  pub const DEFAULT_CAPACITY: usize = 1024;

  pub fn bounded(capacity: usize) -> (Self, EventQueue) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let redelivery = sender.downgrade();
    (Self { sender }, EventQueue { receiver, redelivery })
  }
}

#[async_trait]
impl EventChannel for InMemoryEventChannel {
  #[instrument(name = "channel::publish", skip(self, event), fields(product_id = event.id))]
  async fn publish(&self, event: ProductCreatedEvent) -> CatalogResult<()> {
    match self.sender.try_send(Envelope::first(event)) {
      Ok(()) => {
        debug!("Event enqueued.");
        Ok(())
      }
      Err(TrySendError::Full(_)) => Err(CatalogError::publish("event queue is full")),
      Err(TrySendError::Closed(_)) => Err(CatalogError::publish("event queue is closed")),
    }
  }
}

/// A delivery that failed on its last allowed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
  pub envelope: Envelope,
  pub error: CatalogError,
}

#[derive(Debug, Default)]
pub struct WorkerStats {
  delivered: AtomicU64,
  failed_attempts: AtomicU64,
  redelivered: AtomicU64,
  dead_lettered: AtomicU64,
}

impl WorkerStats {
  pub fn delivered(&self) -> u64 {
    self.delivered.load(Ordering::SeqCst)
  }

  pub fn failed_attempts(&self) -> u64 {
    self.failed_attempts.load(Ordering::SeqCst)
  }

  pub fn redelivered(&self) -> u64 {
    self.redelivered.load(Ordering::SeqCst)
  }

  pub fn dead_lettered(&self) -> u64 {
    self.dead_lettered.load(Ordering::SeqCst)
  }
}

pub struct EventWorker {
  queue: EventQueue,
  handler: Arc<dyn EventHandler>,
  retry: RetryPolicy,
  stats: Arc<WorkerStats>,
  dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
  redeliveries: JoinSet<()>,
  /// Flips to `true` once the queue is closed and drained.
  closed: watch::Sender<bool>,
}

/// Returned by [`EventWorker::spawn`]. The task ends once every producer handle
/// of the channel has been dropped, the queue is drained and every pending
/// redelivery has been dead-lettered. When `join` returns, each published
/// event is either delivered or in `dead_letters`.
pub struct WorkerHandle {
  join: JoinHandle<()>,
  stats: Arc<WorkerStats>,
  dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
}

impl WorkerHandle {
  pub fn stats(&self) -> Arc<WorkerStats> {
    Arc::clone(&self.stats)
  }

  pub fn dead_letters(&self) -> Vec<DeadLetter> {
    self.dead_letters.lock().clone()
  }

  /// Waits for the worker to stop and returns the final dead-letter list.
  pub async fn join(self) -> CatalogResult<Vec<DeadLetter>> {
    self
      .join
      .await
      .map_err(|e| CatalogError::Internal(format!("event worker task failed: {}", e)))?;
    Ok(self.dead_letters.lock().clone())
  }

  pub fn abort(&self) {
    self.join.abort();
  }
}

impl EventWorker {
  pub fn new(queue: EventQueue, handler: Arc<dyn EventHandler>, retry: RetryPolicy) -> Self {
    Self {
      queue,
      handler,
      retry,
      stats: Arc::new(WorkerStats::default()),
      dead_letters: Arc::new(Mutex::new(Vec::new())),
      redeliveries: JoinSet::new(),
      closed: watch::channel(false).0,
    }
  }

  pub fn spawn(self) -> WorkerHandle {
    let stats = Arc::clone(&self.stats);
    let dead_letters = Arc::clone(&self.dead_letters);
    let join = tokio::spawn(self.run().instrument(tracing::info_span!("event_worker")));
    WorkerHandle {
      join,
      stats,
      dead_letters,
    }
  }

  async fn run(mut self) {
    info!("Event worker started.");
    while let Some(envelope) = self.queue.receiver.recv().await {
      self.deliver(envelope).await;
      while self.redeliveries.try_join_next().is_some() {}
    }

    // No producer is left, so no pending redelivery can be enqueued any more.
    let pending = self.redeliveries.len();
    self.closed.send_replace(true);
    while let Some(outcome) = self.redeliveries.join_next().await {
      if let Err(e) = outcome {
        error!(error = %e, "Redelivery task failed.");
      }
    }
    info!(pending_redeliveries = pending, "Event channel closed, event worker stopping.");
  }

  async fn deliver(&mut self, envelope: Envelope) {
    let product_id = envelope.event.id;
    let attempt = envelope.attempt;

    match self.handler.handle(&envelope.event).await {
      Ok(()) => {
        self.stats.delivered.fetch_add(1, Ordering::SeqCst);
        debug!(product_id, attempt, "Event delivered.");
      }
      Err(e) => {
        self.stats.failed_attempts.fetch_add(1, Ordering::SeqCst);
        match self.retry.delay_after(attempt) {
          Some(delay) => {
            warn!(product_id, attempt, error = %e, delay_ms = delay.as_millis() as u64, "Delivery failed, scheduling redelivery.");
            self.schedule_redelivery(envelope, delay, e);
          }
          None => {
            error!(product_id, attempt, error = %e, "Delivery failed, retries exhausted.");
            self.dead_letter(envelope, e);
          }
        }
      }
    }
  }

  /// The redelivery task only holds a weak sender: a pending retry must not
  /// keep the channel open after the producers are gone. Once the worker
  /// signals `closed`, the task stops waiting and dead-letters the envelope.
  fn schedule_redelivery(&mut self, envelope: Envelope, delay: Duration, last_error: CatalogError) {
    let redelivery = self.queue.redelivery.clone();
    let stats = Arc::clone(&self.stats);
    let dead_letters = Arc::clone(&self.dead_letters);
    let mut closed = self.closed.subscribe();

    self.redeliveries.spawn(async move {
      tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = closed.changed() => {}
      }
      let next = envelope.next_attempt();
      let sent = match redelivery.upgrade() {
        Some(sender) => sender.send(next).await.map_err(|e| e.0),
        None => Err(next),
      };
      match sent {
        Ok(()) => {
          stats.redelivered.fetch_add(1, Ordering::SeqCst);
        }
        Err(undelivered) => {
          warn!(product_id = undelivered.event.id, "Channel closed before redelivery.");
          stats.dead_lettered.fetch_add(1, Ordering::SeqCst);
          dead_letters.lock().push(DeadLetter {
            envelope: undelivered,
            error: last_error,
          });
        }
      }
    });
  }

  fn dead_letter(&self, envelope: Envelope, error: CatalogError) {
    self.stats.dead_lettered.fetch_add(1, Ordering::SeqCst);
    self.dead_letters.lock().push(DeadLetter { envelope, error });
  }
}
