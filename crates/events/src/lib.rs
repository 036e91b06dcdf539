//! Integration events and the broadcast-bus abstraction.
//!
//! The bus is the transport between the identity service and this one; it
//! hands out raw [`Delivery`] units, and consumers decide how to decode them.

pub mod bus;
pub mod delivery;
pub mod in_memory_bus;
pub mod user_updated;

pub use bus::{EventBus, Subscription};
pub use delivery::Delivery;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use user_updated::UserUpdatedEvent;
