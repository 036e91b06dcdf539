//! Reconcilers: merge incoming changes into local state.
//!
//! Both reconcilers retry on `Conflict` up to a fixed number of attempts. A
//! conflict means another writer got there first; re-reading and re-applying
//! is always safe because every write is either version-checked or an atomic
//! increment.

pub mod grant;
pub mod replica;

pub use grant::{GrantOutcome, GrantReconciler};
pub use replica::{ReplicaOutcome, ReplicaReconciler};

/// Default bound on conflict retries.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
