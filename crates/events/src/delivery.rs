use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use holdings_core::MessageId;

/// One message as received from a bus, before decoding.
///
/// Broadcast transports don't assign stable message ids, so every delivery is
/// stamped locally on receipt. The id is what operators grep for when a
/// message ends up in the dead-letter path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    delivery_id: MessageId,
    channel: String,
    payload: Vec<u8>,
    received_at: DateTime<Utc>,
}

impl Delivery {
    pub fn new(channel: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            delivery_id: MessageId::new(),
            channel: channel.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }

    pub fn delivery_id(&self) -> MessageId {
        self.delivery_id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Decode the JSON payload into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    /// Payload as text for logs and dead letters (lossy for non-UTF-8).
    pub fn payload_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}
