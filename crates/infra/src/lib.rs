//! Infrastructure layer: stores, reconcilers, the `user-updated` consumer,
//! dead-letter sinks, Redis transport and configuration.

pub mod config;
pub mod consumer;
pub mod dead_letter;
pub mod error;
pub mod event_bus;
pub mod listing;
pub mod reconcile;
pub mod store;

pub use config::AppConfig;
pub use consumer::{
    ConsumerConfig, ConsumerHandle, ConsumerStats, ConsumerStatsSnapshot, UserUpdatedConsumer,
};
pub use dead_letter::{
    DeadLetter, DeadLetterError, DeadLetterReason, DeadLetterSink, InMemoryDeadLetterSink,
    LogDeadLetterSink,
};
pub use error::{ReconcileError, StoreError};
pub use listing::InventoryListing;
pub use reconcile::{GrantOutcome, GrantReconciler, ReplicaOutcome, ReplicaReconciler};
pub use store::{
    CatalogLookup, InMemoryCatalogStore, InMemoryInventoryStore, InMemoryUserStore,
    InventoryFilter, InventoryStore, PostgresCatalogStore, PostgresInventoryStore,
    PostgresUserStore, UserReplicaStore, ensure_schema,
};

#[cfg(test)]
mod integration_tests;
