//! Wire payload broadcast by the identity service when a user changes.

use serde::{Deserialize, Serialize};

use holdings_core::UserId;

/// `user-updated` notification.
///
/// Only `id` is mandatory. The publisher omits unchanged fields, so a missing
/// `permissions` list decodes as empty, which the replica merge treats as "no
/// change".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdatedEvent {
    pub id: UserId,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub activated: bool,
    #[serde(default)]
    pub version: i64,
}
