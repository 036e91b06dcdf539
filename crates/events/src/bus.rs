//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus has **broadcast** semantics: every subscription receives its own
//! copy of every message published while it is alive. Subscriptions are not
//! durable: anything published while nobody is subscribed is gone, and a
//! process that restarts starts from "now". Consumers that need stronger
//! guarantees must compensate themselves (see the dead-letter path in infra).

use std::sync::Arc;

use tokio::sync::mpsc;

/// A live subscription to a broadcast channel.
///
/// Each subscription is meant for a single receive loop. Dropping it ends the
/// subscription; the publishing side notices and stops forwarding.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: mpsc::Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: mpsc::Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Wait for the next message. `None` means the bus side has gone away.
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }

    /// Try to receive a message without waiting.
    pub fn try_recv(&mut self) -> Result<M, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

/// Transport-agnostic pub/sub bus.
///
/// `subscribe` is fallible: establishing the subscription (connecting,
/// declaring the channel) happens inside it, so a caller that cannot
/// subscribe finds out immediately instead of silently receiving nothing.
#[async_trait::async_trait]
pub trait EventBus<M>: Send + Sync
where
    M: Send + 'static,
{
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    async fn publish(&self, message: M) -> Result<(), Self::Error>;

    async fn subscribe(&self) -> Result<Subscription<M>, Self::Error>;
}

#[async_trait::async_trait]
impl<M, B> EventBus<M> for Arc<B>
where
    M: Send + 'static,
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    async fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message).await
    }

    async fn subscribe(&self) -> Result<Subscription<M>, Self::Error> {
        (**self).subscribe().await
    }
}
