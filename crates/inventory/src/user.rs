//! Local replica of a user owned by the identity service.

use serde::{Deserialize, Serialize};

use holdings_core::UserId;
use holdings_events::UserUpdatedEvent;

/// Replicated user record.
///
/// `version` starts as the identity service's version (copied on create) and
/// is then bumped by one on every local merge, so it doubles as the optimistic
/// concurrency token for replica writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub permissions: Vec<String>,
    pub activated: bool,
    pub version: i64,
}

impl UserRecord {
    /// First sighting of a user: every field is copied from the event.
    pub fn from_event(event: &UserUpdatedEvent) -> Self {
        Self {
            id: event.id,
            permissions: event.permissions.clone(),
            activated: event.activated,
            version: event.version,
        }
    }

    /// Merge an event into this record.
    ///
    /// - permissions are replaced only by a non-empty list (empty = unchanged)
    /// - `activated` can be raised to true, never lowered
    ///
    /// Returns `None` when the event changes nothing, otherwise the merged
    /// record at `version + 1`.
    pub fn merge(&self, event: &UserUpdatedEvent) -> Option<UserRecord> {
        let permissions = if event.permissions.is_empty() {
            self.permissions.clone()
        } else {
            event.permissions.clone()
        };
        let activated = self.activated || event.activated;

        if permissions == self.permissions && activated == self.activated {
            return None;
        }

        Some(UserRecord {
            id: self.id,
            permissions,
            activated,
            version: self.version + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: i64, permissions: &[&str], activated: bool, version: i64) -> UserUpdatedEvent {
        UserUpdatedEvent {
            id: UserId::new(id),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            activated,
            version,
        }
    }

    #[test]
    fn create_copies_event_verbatim() {
        let rec = UserRecord::from_event(&event(3, &["catalog:read"], false, 4));
        assert_eq!(rec.id, UserId::new(3));
        assert_eq!(rec.permissions, vec!["catalog:read".to_string()]);
        assert!(!rec.activated);
        assert_eq!(rec.version, 4);
    }

    #[test]
    fn empty_permissions_leave_existing_set_alone() {
        let rec = UserRecord::from_event(&event(1, &["inventory:read"], false, 1));
        let merged = rec.merge(&event(1, &[], true, 2)).unwrap();
        assert_eq!(merged.permissions, vec!["inventory:read".to_string()]);
        assert!(merged.activated);
    }

    #[test]
    fn non_empty_permissions_replace_the_set() {
        let rec = UserRecord::from_event(&event(1, &["a", "b"], true, 1));
        let merged = rec.merge(&event(1, &["c"], false, 2)).unwrap();
        assert_eq!(merged.permissions, vec!["c".to_string()]);
    }

    #[test]
    fn deactivation_is_ignored() {
        let rec = UserRecord::from_event(&event(1, &["a"], true, 1));
        assert_eq!(rec.merge(&event(1, &[], false, 2)), None);
    }

    #[test]
    fn merge_bumps_local_version() {
        let rec = UserRecord::from_event(&event(1, &[], false, 5));
        let merged = rec.merge(&event(1, &[], true, 9)).unwrap();
        assert_eq!(merged.version, 6);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_event() -> impl Strategy<Value = UserUpdatedEvent> {
            (
                proptest::collection::vec("[a-z]{1,8}:[a-z]{1,8}", 0..4),
                any::<bool>(),
                0i64..100,
            )
                .prop_map(|(permissions, activated, version)| UserUpdatedEvent {
                    id: UserId::new(1),
                    permissions,
                    activated,
                    version,
                })
        }

        fn apply_all(start: UserRecord, events: &[UserUpdatedEvent]) -> UserRecord {
            events
                .iter()
                .fold(start, |rec, ev| rec.merge(ev).unwrap_or(rec))
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: once activated, no later event sequence deactivates.
            #[test]
            fn activation_is_monotonic(
                first in arb_event(),
                before in proptest::collection::vec(arb_event(), 0..10),
                after in proptest::collection::vec(arb_event(), 0..10),
            ) {
                let rec = apply_all(UserRecord::from_event(&first), &before);
                let rec = apply_all(rec, &[UserUpdatedEvent { activated: true, ..first.clone() }]);
                prop_assert!(rec.activated);

                let rec = apply_all(rec, &after);
                prop_assert!(rec.activated);
            }

            /// Property: empty permission lists never change the set; non-empty ones replace it.
            #[test]
            fn permission_merge_rules(first in arb_event(), ev in arb_event()) {
                let rec = UserRecord::from_event(&first);
                let merged = rec.merge(&ev).unwrap_or_else(|| rec.clone());

                if ev.permissions.is_empty() {
                    prop_assert_eq!(&merged.permissions, &rec.permissions);
                } else {
                    prop_assert_eq!(&merged.permissions, &ev.permissions);
                }
            }

            /// Property: merging the same event twice is the same as merging it once.
            #[test]
            fn merge_is_idempotent(first in arb_event(), ev in arb_event()) {
                let rec = UserRecord::from_event(&first);
                let once = rec.merge(&ev).unwrap_or_else(|| rec.clone());
                prop_assert_eq!(once.merge(&ev), None);
            }
        }
    }
}
