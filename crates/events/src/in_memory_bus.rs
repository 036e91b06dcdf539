//! In-memory broadcast bus for tests/dev.

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::bus::{EventBus, Subscription};

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum InMemoryBusError {
    /// Publish failed due to internal lock poisoning.
    #[error("in-memory bus lock poisoned")]
    Poisoned,
}

/// In-memory pub/sub bus.
///
/// - Fan-out to every live subscription
/// - Bounded per-subscription buffers (publishers wait when a subscriber lags)
/// - Nothing is retained for subscriptions created later
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
    capacity: usize,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

#[async_trait::async_trait]
impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + Sync + 'static,
{
    type Error = InMemoryBusError;

    async fn publish(&self, message: M) -> Result<(), Self::Error> {
        let targets: Vec<mpsc::Sender<M>> = {
            let subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;
            subs.clone()
        };

        // A send error only means that subscriber is gone.
        for tx in &targets {
            let _ = tx.send(message.clone()).await;
        }

        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        subs.retain(|tx| !tx.is_closed());

        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription<M>, Self::Error> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        subs.push(tx);
        Ok(Subscription::new(rx))
    }
}
