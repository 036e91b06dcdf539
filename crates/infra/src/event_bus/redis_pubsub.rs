//! Redis pub/sub-backed broadcast bus.
//!
//! Pub/sub is fan-out and not durable: every subscribed connection gets its
//! own copy of each message, and anything published while this instance is
//! not subscribed is never seen. A message is "acknowledged" the moment it is
//! read off the socket.
//!
//! The blocking Redis connection lives on a dedicated thread that forwards
//! into a bounded tokio channel; when the consumer lags, the thread blocks
//! and Redis buffers on its side.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use redis::Commands;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, instrument, warn};

use holdings_events::{Delivery, EventBus, Subscription};

const DEFAULT_BUFFER: usize = 256;

/// How often the reader wakes up to notice a dropped subscription.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum RedisBusError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis command error: {0}")]
    Command(String),

    #[error("subscriber thread error: {0}")]
    Subscriber(String),
}

/// Redis pub/sub bus carrying raw [`Delivery`] payloads on one channel.
#[derive(Debug, Clone)]
pub struct RedisPubSubEventBus {
    client: Arc<redis::Client>,
    channel: String,
    buffer: usize,
}

impl RedisPubSubEventBus {
    pub fn new(redis_url: impl AsRef<str>, channel: impl Into<String>) -> Result<Self, RedisBusError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisBusError::Connection(e.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
            channel: channel.into(),
            buffer: DEFAULT_BUFFER,
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    fn publish_sync(&self, payload: &[u8]) -> Result<(), RedisBusError> {
        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| RedisBusError::Connection(e.to_string()))?;

        let _: i64 = conn
            .publish(&self.channel, payload)
            .map_err(|e| RedisBusError::Command(format!("PUBLISH failed: {e}")))?;

        Ok(())
    }
}

/// Blocking receive loop run on the subscriber thread.
fn pump(
    client: Arc<redis::Client>,
    channel: String,
    tx: mpsc::Sender<Delivery>,
    ready: oneshot::Sender<Result<(), RedisBusError>>,
) {
    let mut conn = match client.get_connection() {
        Ok(c) => c,
        Err(e) => {
            let _ = ready.send(Err(RedisBusError::Connection(e.to_string())));
            return;
        }
    };

    let mut pubsub = conn.as_pubsub();
    if let Err(e) = pubsub.subscribe(&channel) {
        let _ = ready.send(Err(RedisBusError::Command(format!("SUBSCRIBE failed: {e}"))));
        return;
    }
    if let Err(e) = pubsub.set_read_timeout(Some(READ_TIMEOUT)) {
        let _ = ready.send(Err(RedisBusError::Connection(e.to_string())));
        return;
    }
    let _ = ready.send(Ok(()));
    info!(%channel, "subscribed to Redis channel");

    loop {
        if tx.is_closed() {
            return;
        }

        let msg = match pubsub.get_message() {
            Ok(m) => m,
            Err(e) if e.is_timeout() => continue,
            Err(e) => {
                error!(%channel, error = %e, "Redis subscription lost");
                return;
            }
        };

        let payload: Vec<u8> = match msg.get_payload() {
            Ok(p) => p,
            Err(e) => {
                warn!(%channel, error = %e, "skipping non-binary pub/sub payload");
                continue;
            }
        };

        if tx
            .blocking_send(Delivery::new(msg.get_channel_name(), payload))
            .is_err()
        {
            return;
        }
    }
}

#[async_trait::async_trait]
impl EventBus<Delivery> for RedisPubSubEventBus {
    type Error = RedisBusError;

    #[instrument(skip(self, message), fields(channel = %self.channel, delivery_id = %message.delivery_id()), err)]
    async fn publish(&self, message: Delivery) -> Result<(), Self::Error> {
        let bus = self.clone();
        tokio::task::spawn_blocking(move || bus.publish_sync(message.payload()))
            .await
            .map_err(|e| RedisBusError::Subscriber(e.to_string()))?
    }

    /// Connects and subscribes before returning, so a broker that is down or
    /// refuses the subscription is reported here rather than by silence.
    async fn subscribe(&self) -> Result<Subscription<Delivery>, Self::Error> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let (ready_tx, ready_rx) = oneshot::channel();

        let client = self.client.clone();
        let channel = self.channel.clone();
        thread::Builder::new()
            .name("redis-pubsub".to_string())
            .spawn(move || pump(client, channel, tx, ready_tx))
            .map_err(|e| RedisBusError::Subscriber(e.to_string()))?;

        ready_rx
            .await
            .map_err(|_| RedisBusError::Subscriber("subscriber thread exited".to_string()))??;

        Ok(Subscription::new(rx))
    }
}
