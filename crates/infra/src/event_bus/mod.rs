//! Infrastructure event bus implementations.
//!
//! The bus abstraction lives in `holdings-events`. This module provides the
//! Redis-backed broadcast transport.

#[cfg(feature = "redis")]
pub mod redis_pubsub;

#[cfg(feature = "redis")]
pub use redis_pubsub::{RedisBusError, RedisPubSubEventBus};
