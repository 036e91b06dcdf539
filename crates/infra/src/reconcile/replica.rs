use tracing::{debug, instrument};

use holdings_core::ExpectedVersion;
use holdings_events::UserUpdatedEvent;
use holdings_inventory::UserRecord;

use super::DEFAULT_MAX_ATTEMPTS;
use crate::error::{ReconcileError, StoreError};
use crate::store::UserReplicaStore;

/// What a replica reconciliation did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReplicaOutcome {
    Created,
    Merged,
    /// The event carried nothing new for an existing record.
    Unchanged,
}

/// Applies `user-updated` events to the local user replica.
#[derive(Debug)]
pub struct ReplicaReconciler<S> {
    store: S,
    max_attempts: u32,
}

impl<S> ReplicaReconciler<S>
where
    S: UserReplicaStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create the user if unknown, otherwise merge the event into it.
    ///
    /// Merges are written with the version that was read; losing a race
    /// (`Conflict`) re-reads and re-merges. A concurrent first sighting that
    /// loses the create is retried as a merge.
    #[instrument(skip(self, event), fields(user_id = %event.id, event_version = event.version), err)]
    pub async fn apply(&self, event: &UserUpdatedEvent) -> Result<ReplicaOutcome, ReconcileError> {
        if !event.id.is_valid() {
            return Err(StoreError::Invalid(format!("user id must be greater than 0, got {}", event.id)).into());
        }

        for attempt in 1..=self.max_attempts {
            let existing = match self.store.get(event.id).await {
                Ok(existing) => existing,
                Err(StoreError::NotFound) => {
                    match self.store.create(UserRecord::from_event(event)).await {
                        Ok(_) => return Ok(ReplicaOutcome::Created),
                        Err(StoreError::Conflict(reason)) => {
                            debug!(attempt, %reason, "user created concurrently; retrying as merge");
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            };

            let Some(merged) = existing.merge(event) else {
                return Ok(ReplicaOutcome::Unchanged);
            };

            match self
                .store
                .update(merged, ExpectedVersion::Exact(existing.version))
                .await
            {
                Ok(()) => return Ok(ReplicaOutcome::Merged),
                Err(StoreError::Conflict(reason)) => {
                    debug!(attempt, %reason, "stale user replica read; retrying merge");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ReconcileError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::store::InMemoryUserStore;
    use holdings_core::UserId;

    fn event(id: i64, permissions: &[&str], activated: bool, version: i64) -> UserUpdatedEvent {
        UserUpdatedEvent {
            id: UserId::new(id),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            activated,
            version,
        }
    }

    #[tokio::test]
    async fn unknown_user_is_created_verbatim() {
        let reconciler = ReplicaReconciler::new(InMemoryUserStore::new());
        let outcome = reconciler.apply(&event(1, &["read"], false, 7)).await.unwrap();

        assert_eq!(outcome, ReplicaOutcome::Created);
        let stored = reconciler.store().get(UserId::new(1)).await.unwrap();
        assert_eq!(stored.permissions, vec!["read".to_string()]);
        assert!(!stored.activated);
        assert_eq!(stored.version, 7);
    }

    #[tokio::test]
    async fn known_user_is_merged_selectively() {
        let reconciler = ReplicaReconciler::new(InMemoryUserStore::new());
        reconciler.apply(&event(1, &["read"], true, 1)).await.unwrap();

        let outcome = reconciler.apply(&event(1, &[], false, 2)).await.unwrap();
        assert_eq!(outcome, ReplicaOutcome::Unchanged);

        let outcome = reconciler.apply(&event(1, &["write"], false, 3)).await.unwrap();
        assert_eq!(outcome, ReplicaOutcome::Merged);

        let stored = reconciler.store().get(UserId::new(1)).await.unwrap();
        assert_eq!(stored.permissions, vec!["write".to_string()]);
        assert!(stored.activated);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn non_positive_ids_never_reach_the_store() {
        let reconciler = ReplicaReconciler::new(InMemoryUserStore::new());

        for id in [0, -5] {
            let err = reconciler.apply(&event(id, &["read"], true, 1)).await.unwrap_err();
            assert!(
                matches!(err, ReconcileError::Store(StoreError::Invalid(_))),
                "id {id} -> {err:?}"
            );
        }
        assert!(reconciler.store().is_empty());
    }

    /// Store wrapper that reports a conflict on the first `n` updates.
    struct Contended {
        inner: InMemoryUserStore,
        conflicts_left: AtomicU32,
    }

    #[async_trait::async_trait]
    impl UserReplicaStore for Contended {
        async fn get(&self, id: UserId) -> Result<UserRecord, StoreError> {
            self.inner.get(id).await
        }

        async fn create(&self, record: UserRecord) -> Result<UserId, StoreError> {
            self.inner.create(record).await
        }

        async fn update(&self, record: UserRecord, expected: ExpectedVersion) -> Result<(), StoreError> {
            let left = self.conflicts_left.load(Ordering::SeqCst);
            if left > 0 {
                self.conflicts_left.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Conflict("simulated".into()));
            }
            self.inner.update(record, expected).await
        }
    }

    #[tokio::test]
    async fn conflicts_are_retried_until_the_bound() {
        let store = Arc::new(Contended {
            inner: InMemoryUserStore::new(),
            conflicts_left: AtomicU32::new(2),
        });
        store.inner.create(UserRecord::from_event(&event(1, &[], false, 1))).await.unwrap();

        let reconciler = ReplicaReconciler::new(store.clone()).with_max_attempts(3);
        assert_eq!(
            reconciler.apply(&event(1, &[], true, 2)).await.unwrap(),
            ReplicaOutcome::Merged
        );

        store.conflicts_left.store(10, Ordering::SeqCst);
        let err = reconciler.apply(&event(1, &["x"], true, 3)).await.unwrap_err();
        assert_eq!(err, ReconcileError::Exhausted { attempts: 3 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_events_for_one_user_never_lose_activation() {
        let store = Arc::new(InMemoryUserStore::new());
        let reconciler = Arc::new(ReplicaReconciler::new(store.clone()).with_max_attempts(50));

        let mut tasks = Vec::new();
        for i in 0..16 {
            let reconciler = reconciler.clone();
            tasks.push(tokio::spawn(async move {
                let ev = event(9, &[], i == 3, i);
                reconciler.apply(&ev).await
            }));
        }
        for t in tasks {
            t.await.unwrap().unwrap();
        }

        assert!(store.get(UserId::new(9)).await.unwrap().activated);
    }
}
