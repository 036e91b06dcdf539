//! Dead-letter sinks for messages the consumer could not apply.
//!
//! The broadcast subscription acknowledges on receipt, so a message that
//! fails to decode or reconcile cannot be redelivered. Instead it is handed to
//! a [`DeadLetterSink`] together with the failure reason, so operators can
//! find and replay it.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use holdings_core::MessageId;
use holdings_events::Delivery;

/// Why a delivery was dead-lettered.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Payload was not a valid `user-updated` message.
    Decode,
    /// The replica store rejected or failed the merge.
    Reconcile,
}

impl DeadLetterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterReason::Decode => "decode",
            DeadLetterReason::Reconcile => "reconcile",
        }
    }
}

/// A failed delivery plus failure metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadLetter {
    pub delivery_id: MessageId,
    pub channel: String,
    pub reason: DeadLetterReason,
    pub error: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(delivery: &Delivery, reason: DeadLetterReason, error: impl Into<String>) -> Self {
        Self {
            delivery_id: delivery.delivery_id(),
            channel: delivery.channel().to_string(),
            reason,
            error: error.into(),
            payload: delivery.payload_lossy(),
            received_at: delivery.received_at(),
            failed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
#[error("dead-letter sink failed: {0}")]
pub struct DeadLetterError(pub String);

#[async_trait::async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, letter: DeadLetter) -> Result<(), DeadLetterError>;
}

#[async_trait::async_trait]
impl<D> DeadLetterSink for Arc<D>
where
    D: DeadLetterSink + ?Sized,
{
    async fn send(&self, letter: DeadLetter) -> Result<(), DeadLetterError> {
        (**self).send(letter).await
    }
}

/// Sink that only logs. Used when no dead-letter stream is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDeadLetterSink;

#[async_trait::async_trait]
impl DeadLetterSink for LogDeadLetterSink {
    async fn send(&self, letter: DeadLetter) -> Result<(), DeadLetterError> {
        warn!(
            delivery_id = %letter.delivery_id,
            channel = %letter.channel,
            reason = letter.reason.as_str(),
            error = %letter.error,
            payload = %letter.payload,
            "message dead-lettered (no dead-letter stream configured)"
        );
        Ok(())
    }
}

/// Sink that keeps letters in memory (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryDeadLetterSink {
    letters: Mutex<Vec<DeadLetter>>,
}

impl InMemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl DeadLetterSink for InMemoryDeadLetterSink {
    async fn send(&self, letter: DeadLetter) -> Result<(), DeadLetterError> {
        self.letters
            .lock()
            .map_err(|_| DeadLetterError("in-memory sink lock poisoned".to_string()))?
            .push(letter);
        Ok(())
    }
}

#[cfg(feature = "redis")]
pub use redis_sink::RedisDeadLetterSink;

#[cfg(feature = "redis")]
mod redis_sink {
    use super::*;

    /// Dead letters appended to a Redis stream with `XADD`.
    #[derive(Debug, Clone)]
    pub struct RedisDeadLetterSink {
        client: Arc<redis::Client>,
        key: String,
    }

    impl RedisDeadLetterSink {
        pub fn new(redis_url: impl AsRef<str>, key: impl Into<String>) -> Result<Self, DeadLetterError> {
            let client = redis::Client::open(redis_url.as_ref())
                .map_err(|e| DeadLetterError(format!("Redis connection error: {e}")))?;
            Ok(Self {
                client: Arc::new(client),
                key: key.into(),
            })
        }

        fn send_sync(&self, letter: &DeadLetter) -> Result<(), DeadLetterError> {
            let mut conn = self
                .client
                .get_connection()
                .map_err(|e| DeadLetterError(format!("Redis connection error: {e}")))?;

            let _: String = redis::cmd("XADD")
                .arg(&self.key)
                .arg("*")
                .arg("delivery_id")
                .arg(letter.delivery_id.to_string())
                .arg("channel")
                .arg(&letter.channel)
                .arg("reason")
                .arg(letter.reason.as_str())
                .arg("error")
                .arg(&letter.error)
                .arg("received_at")
                .arg(letter.received_at.to_rfc3339())
                .arg("failed_at")
                .arg(letter.failed_at.to_rfc3339())
                .arg("payload")
                .arg(&letter.payload)
                .query(&mut conn)
                .map_err(|e| DeadLetterError(format!("dead-letter XADD failed: {e}")))?;

            warn!(
                delivery_id = %letter.delivery_id,
                reason = letter.reason.as_str(),
                key = %self.key,
                "message sent to dead-letter stream"
            );
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl DeadLetterSink for RedisDeadLetterSink {
        async fn send(&self, letter: DeadLetter) -> Result<(), DeadLetterError> {
            let sink = self.clone();
            tokio::task::spawn_blocking(move || sink.send_sync(&letter))
                .await
                .map_err(|e| DeadLetterError(format!("dead-letter task failed: {e}")))?
        }
    }
}
