//! Service wiring: stores, the `user-updated` consumer and the reconcilers
//! the HTTP handlers call.
//!
//! `USE_PERSISTENT_STORES=true` selects Postgres stores plus the Redis
//! pub/sub bus; otherwise everything is in memory.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use holdings_events::{Delivery, InMemoryEventBus};
use holdings_infra::{
    AppConfig, CatalogLookup, ConsumerHandle, ConsumerStats, DeadLetterSink, GrantReconciler,
    InMemoryCatalogStore, InMemoryDeadLetterSink, InMemoryInventoryStore, InMemoryUserStore,
    InventoryListing, InventoryStore, ReplicaReconciler, UserUpdatedConsumer,
};

#[cfg(feature = "redis")]
use holdings_infra::{
    LogDeadLetterSink, PostgresCatalogStore, PostgresInventoryStore, PostgresUserStore,
    dead_letter::RedisDeadLetterSink, ensure_schema, event_bus::RedisPubSubEventBus,
};
#[cfg(feature = "redis")]
use sqlx::PgPool;

pub type DynInventoryStore = Arc<dyn InventoryStore>;
pub type DynCatalogLookup = Arc<dyn CatalogLookup>;

/// What the request handlers need.
pub struct AppServices {
    pub grants: GrantReconciler<DynInventoryStore>,
    pub listing: InventoryListing<DynInventoryStore, DynCatalogLookup>,
    /// Live counters of the running `user-updated` consumer.
    pub consumer_stats: Arc<ConsumerStats>,
}

impl AppServices {
    pub fn new(
        inventory: DynInventoryStore,
        catalog: DynCatalogLookup,
        consumer: &ConsumerHandle,
        config: &AppConfig,
    ) -> Self {
        Self {
            grants: GrantReconciler::new(inventory.clone())
                .with_max_attempts(config.reconcile_max_attempts),
            listing: InventoryListing::new(inventory, catalog),
            consumer_stats: consumer.shared_stats(),
        }
    }
}

/// Handlers plus the running consumer. Shut the consumer down after the
/// HTTP server has stopped.
pub struct Runtime {
    pub services: Arc<AppServices>,
    pub consumer: ConsumerHandle,
}

/// Fully in-memory backend. Each handle is shared with the services it
/// builds, so tests can seed the catalog, publish on the bus and inspect
/// the stores.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    pub users: Arc<InMemoryUserStore>,
    pub inventory: Arc<InMemoryInventoryStore>,
    pub catalog: Arc<InMemoryCatalogStore>,
    pub bus: Arc<InMemoryEventBus<Delivery>>,
    pub dead_letters: Arc<InMemoryDeadLetterSink>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start_consumer(&self, config: &AppConfig) -> anyhow::Result<ConsumerHandle> {
        let reconciler =
            ReplicaReconciler::new(self.users.clone()).with_max_attempts(config.reconcile_max_attempts);
        UserUpdatedConsumer::new(reconciler, self.dead_letters.clone(), config.consumer())
            .start(&self.bus)
            .await
            .context("failed to subscribe to the in-memory bus")
    }

    pub async fn runtime(&self, config: &AppConfig) -> anyhow::Result<Runtime> {
        let consumer = self.start_consumer(config).await?;
        let services = AppServices::new(
            self.inventory.clone(),
            self.catalog.clone(),
            &consumer,
            config,
        );
        Ok(Runtime {
            services: Arc::new(services),
            consumer,
        })
    }
}

pub async fn build_runtime(config: &AppConfig) -> anyhow::Result<Runtime> {
    if config.use_persistent_stores {
        #[cfg(feature = "redis")]
        {
            return build_persistent(config).await;
        }

        #[cfg(not(feature = "redis"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but redis feature not enabled, falling back to in-memory"
            );
        }
    }

    info!(service = %config.service_name, "using in-memory stores");
    InMemoryBackend::new().runtime(config).await
}

#[cfg(feature = "redis")]
async fn build_persistent(config: &AppConfig) -> anyhow::Result<Runtime> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;

    let pool = PgPool::connect(database_url)
        .await
        .context("failed to connect to Postgres")?;
    ensure_schema(&pool)
        .await
        .context("failed to create inventory schema")?;

    let users = Arc::new(PostgresUserStore::new(pool.clone()));
    let inventory: DynInventoryStore = Arc::new(PostgresInventoryStore::new(pool.clone()));
    let catalog: DynCatalogLookup = Arc::new(PostgresCatalogStore::new(pool));

    let bus = RedisPubSubEventBus::new(&config.redis_url, config.user_updated_channel.clone())
        .context("failed to create Redis pub/sub bus")?;

    let dead_letters: Arc<dyn DeadLetterSink> = match &config.dead_letter_key {
        Some(key) => Arc::new(
            RedisDeadLetterSink::new(&config.redis_url, key.clone())
                .context("failed to create Redis dead-letter sink")?,
        ),
        None => Arc::new(LogDeadLetterSink),
    };

    let reconciler =
        ReplicaReconciler::new(users).with_max_attempts(config.reconcile_max_attempts);
    let consumer = UserUpdatedConsumer::new(reconciler, dead_letters, config.consumer())
        .start(&bus)
        .await
        .with_context(|| {
            format!(
                "{} failed to subscribe to {}",
                config.service_name, config.user_updated_channel
            )
        })?;

    info!(
        service = %config.service_name,
        channel = %config.user_updated_channel,
        dead_letter_key = ?config.dead_letter_key,
        "using Postgres stores and Redis pub/sub"
    );

    Ok(Runtime {
        services: Arc::new(AppServices::new(inventory, catalog, &consumer, config)),
        consumer,
    })
}
