//! `user-updated` consumer.
//!
//! - One receive loop per process, fed by a broadcast [`EventBus`] subscription
//! - Each delivery is reconciled on its own task, bounded by a semaphore
//! - When the pool is full, intake waits for a free slot
//! - Decode and reconcile failures are logged with the delivery id and
//!   dead-lettered
//! - Shutdown stops intake, drains in-flight work up to a timeout, then
//!   aborts (and counts) whatever is left
//!
//! Deliveries are acknowledged by the transport on receipt, so there is no
//! redelivery: a failure is final for that message.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use holdings_events::{Delivery, EventBus, Subscription, UserUpdatedEvent};

use crate::dead_letter::{DeadLetter, DeadLetterReason, DeadLetterSink};
use crate::reconcile::ReplicaReconciler;
use crate::store::UserReplicaStore;

/// Consumer tuning.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Maximum reconciliations running at once.
    pub max_in_flight: usize,
    /// How long shutdown waits for in-flight work before aborting it.
    pub drain_timeout: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 16,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Live counters, shared between the loop, its tasks and the handle.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    received: AtomicU64,
    reconciled: AtomicU64,
    decode_failures: AtomicU64,
    reconcile_failures: AtomicU64,
    dead_lettered: AtomicU64,
    abandoned: AtomicU64,
}

/// Point-in-time copy of [`ConsumerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStatsSnapshot {
    pub received: u64,
    pub reconciled: u64,
    pub decode_failures: u64,
    pub reconcile_failures: u64,
    pub dead_lettered: u64,
    pub abandoned: u64,
}

impl ConsumerStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            reconciled: self.reconciled.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            reconcile_failures: self.reconcile_failures.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

/// Handle to a running consumer.
///
/// Dropping the handle without calling [`ConsumerHandle::shutdown`] also
/// stops intake, but nobody waits for the drain.
#[derive(Debug)]
pub struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
    stats: Arc<ConsumerStats>,
}

impl ConsumerHandle {
    /// Stop intake, drain in-flight reconciliations and wait for the loop
    /// to finish. Returns the final counters.
    pub async fn shutdown(mut self) -> ConsumerStatsSnapshot {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                error!(error = %e, "user-updated consumer loop panicked");
            }
        }
        self.stats.snapshot()
    }

    pub fn stats(&self) -> ConsumerStatsSnapshot {
        self.stats.snapshot()
    }

    /// The live counters, for readers that outlive a borrow of the handle
    /// (the HTTP metrics route).
    pub fn shared_stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    /// True once the receive loop has exited (shutdown or subscription closed).
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }
}

/// Per-delivery work shared by every task.
struct Processor<S, D> {
    reconciler: ReplicaReconciler<S>,
    dead_letters: D,
    stats: Arc<ConsumerStats>,
}

impl<S, D> Processor<S, D>
where
    S: UserReplicaStore,
    D: DeadLetterSink,
{
    #[instrument(
        skip(self, delivery),
        fields(delivery_id = %delivery.delivery_id(), channel = %delivery.channel())
    )]
    async fn process(&self, delivery: Delivery) {
        let event: UserUpdatedEvent = match delivery.decode() {
            Ok(event) => event,
            Err(e) => {
                ConsumerStats::bump(&self.stats.decode_failures);
                error!(
                    delivery_id = %delivery.delivery_id(),
                    error = %e,
                    "failed to decode user-updated message"
                );
                self.dead_letter(&delivery, DeadLetterReason::Decode, e.to_string())
                    .await;
                return;
            }
        };

        match self.reconciler.apply(&event).await {
            Ok(outcome) => {
                ConsumerStats::bump(&self.stats.reconciled);
                debug!(user_id = %event.id, ?outcome, "user replica reconciled");
            }
            Err(e) => {
                ConsumerStats::bump(&self.stats.reconcile_failures);
                error!(
                    delivery_id = %delivery.delivery_id(),
                    user_id = %event.id,
                    error = %e,
                    "failed to reconcile user replica"
                );
                self.dead_letter(&delivery, DeadLetterReason::Reconcile, e.to_string())
                    .await;
            }
        }
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: DeadLetterReason, error: String) {
        match self
            .dead_letters
            .send(DeadLetter::new(delivery, reason, error))
            .await
        {
            Ok(()) => ConsumerStats::bump(&self.stats.dead_lettered),
            Err(e) => error!(
                delivery_id = %delivery.delivery_id(),
                error = %e,
                "failed to dead-letter message; it is lost"
            ),
        }
    }
}

/// Keeps the local user replica converged with identity broadcasts.
pub struct UserUpdatedConsumer<S, D> {
    reconciler: ReplicaReconciler<S>,
    dead_letters: D,
    config: ConsumerConfig,
}

impl<S, D> UserUpdatedConsumer<S, D>
where
    S: UserReplicaStore + 'static,
    D: DeadLetterSink + 'static,
{
    pub fn new(reconciler: ReplicaReconciler<S>, dead_letters: D, config: ConsumerConfig) -> Self {
        Self {
            reconciler,
            dead_letters,
            config,
        }
    }

    /// Subscribe and spawn the receive loop.
    ///
    /// Failing to subscribe is returned to the caller; the service treats it
    /// as fatal at startup.
    pub async fn start<B>(self, bus: &B) -> Result<ConsumerHandle, B::Error>
    where
        B: EventBus<Delivery> + ?Sized,
    {
        let subscription = bus.subscribe().await?;
        Ok(self.start_with(subscription))
    }

    /// Spawn the receive loop over an existing subscription.
    pub fn start_with(self, subscription: Subscription<Delivery>) -> ConsumerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(ConsumerStats::default());

        let processor = Arc::new(Processor {
            reconciler: self.reconciler,
            dead_letters: self.dead_letters,
            stats: stats.clone(),
        });

        info!(
            max_in_flight = self.config.max_in_flight,
            drain_timeout_ms = self.config.drain_timeout.as_millis() as u64,
            "user-updated consumer started"
        );

        let join = tokio::spawn(run(subscription, shutdown_rx, processor, self.config));

        ConsumerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }
}

async fn run<S, D>(
    mut subscription: Subscription<Delivery>,
    mut shutdown: watch::Receiver<bool>,
    processor: Arc<Processor<S, D>>,
    config: ConsumerConfig,
) where
    S: UserReplicaStore + 'static,
    D: DeadLetterSink + 'static,
{
    let slots = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
    let mut tasks: JoinSet<()> = JoinSet::new();

    loop {
        while let Some(done) = tasks.try_join_next() {
            log_task_exit(done);
        }

        // A closed watch (handle dropped) also ends intake.
        let permit = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            permit = slots.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        let delivery = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = subscription.recv() => match next {
                Some(d) => d,
                None => {
                    warn!("user-updated subscription closed; consumer stopping");
                    break;
                }
            },
        };

        ConsumerStats::bump(&processor.stats.received);
        let processor = processor.clone();
        tasks.spawn(async move {
            let _permit = permit;
            processor.process(delivery).await;
        });
    }

    drain(tasks, config.drain_timeout, &processor.stats).await;
    info!(stats = ?processor.stats.snapshot(), "user-updated consumer stopped");
}

async fn drain(mut tasks: JoinSet<()>, timeout: Duration, stats: &ConsumerStats) {
    let in_flight = tasks.len();
    if in_flight == 0 {
        return;
    }
    info!(in_flight, "draining in-flight reconciliations");

    let drained = tokio::time::timeout(timeout, async {
        while let Some(done) = tasks.join_next().await {
            log_task_exit(done);
        }
    })
    .await;

    if drained.is_err() {
        let remaining = tasks.len();
        stats
            .abandoned
            .fetch_add(remaining as u64, Ordering::Relaxed);
        warn!(
            remaining,
            timeout_ms = timeout.as_millis() as u64,
            "drain timeout elapsed; aborting in-flight reconciliations"
        );
        tasks.shutdown().await;
    }
}

fn log_task_exit(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "reconciliation task panicked");
        }
    }
}
