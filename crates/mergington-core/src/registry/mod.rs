//! Activity registry: the authoritative in-memory store of activities.
//!
//! The registry owns every participant list and is the only place they are
//! mutated. It is an ordinary value, not a global, so the server builds one
//! at startup and tests build as many isolated instances as they like.
//!
//! All mutations take the write lock for the whole check-then-act sequence,
//! which keeps participant lists duplicate-free under concurrent requests.

pub mod seed;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One extracurricular activity. The name is the registry key and is not
/// repeated in the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub description: String,
    pub schedule: String,
    pub max_participants: u32,
    /// Student emails in signup order.
    pub participants: Vec<String>,
}

impl Activity {
    pub fn new(
        description: impl Into<String>,
        schedule: impl Into<String>,
        max_participants: u32,
    ) -> Self {
        Self {
            description: description.into(),
            schedule: schedule.into(),
            max_participants,
            participants: Vec::new(),
        }
    }

    /// Builder-style helper for seeding participants.
    pub fn with_participants<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.participants = participants.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `email` is on the roster (exact string match).
    pub fn is_registered(&self, email: &str) -> bool {
        self.participants.iter().any(|p| p == email)
    }

    /// Remaining capacity, saturating at zero.
    pub fn spots_left(&self) -> u32 {
        let taken = u32::try_from(self.participants.len()).unwrap_or(u32::MAX);
        self.max_participants.saturating_sub(taken)
    }
}

/// Whether `max_participants` is enforced at signup time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CapacityPolicy {
    /// Capacity is metadata only; over-capacity signups succeed with a warning.
    #[default]
    Advisory,
    /// Signups on a full activity fail with [`RegistryError::ActivityFull`].
    Enforce,
}

/// Domain errors for registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Activity not found")]
    NotFound { activity: String },

    #[error("Student is already signed up")]
    AlreadyRegistered { activity: String, email: String },

    #[error("Student is not signed up for this activity")]
    NotRegistered { activity: String, email: String },

    #[error("Activity is full")]
    ActivityFull { activity: String, max_participants: u32 },
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Thread-safe store mapping activity name to [`Activity`].
#[derive(Debug, Default)]
pub struct ActivityRegistry {
    activities: RwLock<IndexMap<String, Activity>>,
    capacity_policy: CapacityPolicy,
}

impl ActivityRegistry {
    /// Create a registry from an explicit map with the advisory capacity policy.
    pub fn new(activities: IndexMap<String, Activity>) -> Self {
        Self {
            activities: RwLock::new(activities),
            capacity_policy: CapacityPolicy::default(),
        }
    }

    /// Create a registry from `(name, activity)` pairs. Later duplicates of a
    /// name replace earlier ones.
    pub fn from_activities<I, S>(activities: I) -> Self
    where
        I: IntoIterator<Item = (S, Activity)>,
        S: Into<String>,
    {
        Self::new(
            activities
                .into_iter()
                .map(|(name, activity)| (name.into(), activity))
                .collect(),
        )
    }

    /// Create a registry populated with the school's fixed activity catalog.
    pub fn seeded() -> Self {
        Self::from_activities(seed::seed_activities())
    }

    /// Replace the capacity policy.
    pub fn with_capacity_policy(mut self, policy: CapacityPolicy) -> Self {
        self.capacity_policy = policy;
        self
    }

    pub fn capacity_policy(&self) -> CapacityPolicy {
        self.capacity_policy
    }

    /// Snapshot of every activity in catalog order. The returned map is a
    /// copy; mutating it does not affect the registry.
    pub fn list_all(&self) -> IndexMap<String, Activity> {
        self.activities.read().clone()
    }

    /// Copy of a single activity, if it exists.
    pub fn get(&self, name: &str) -> Option<Activity> {
        self.activities.read().get(name).cloned()
    }

    /// Activity names in catalog order.
    pub fn names(&self) -> Vec<String> {
        self.activities.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.activities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.read().is_empty()
    }

    /// Append `email` to the roster of `activity`.
    ///
    /// Fails with [`RegistryError::NotFound`] for an unknown activity,
    /// [`RegistryError::AlreadyRegistered`] if the email is already on the
    /// roster, and [`RegistryError::ActivityFull`] when the policy is
    /// [`CapacityPolicy::Enforce`] and no spots are left. A failed call
    /// leaves the roster untouched.
    pub fn signup(&self, activity: &str, email: &str) -> Result<(), RegistryError> {
        let mut activities = self.activities.write();
        let entry = activities
            .get_mut(activity)
            .ok_or_else(|| RegistryError::NotFound {
                activity: activity.to_string(),
            })?;

        if entry.is_registered(email) {
            return Err(RegistryError::AlreadyRegistered {
                activity: activity.to_string(),
                email: email.to_string(),
            });
        }

        if entry.spots_left() == 0 {
            match self.capacity_policy {
                CapacityPolicy::Enforce => {
                    return Err(RegistryError::ActivityFull {
                        activity: activity.to_string(),
                        max_participants: entry.max_participants,
                    });
                }
                CapacityPolicy::Advisory => {
                    warn!(
                        activity,
                        max_participants = entry.max_participants,
                        "signup exceeds advisory capacity"
                    );
                }
            }
        }

        entry.participants.push(email.to_string());
        info!(activity, participants = entry.participants.len(), "student signed up");
        Ok(())
    }

    /// Remove one occurrence of `email` from the roster of `activity`.
    ///
    /// Fails with [`RegistryError::NotFound`] for an unknown activity and
    /// [`RegistryError::NotRegistered`] if the email is not on the roster.
    pub fn unregister(&self, activity: &str, email: &str) -> Result<(), RegistryError> {
        let mut activities = self.activities.write();
        let entry = activities
            .get_mut(activity)
            .ok_or_else(|| RegistryError::NotFound {
                activity: activity.to_string(),
            })?;

        let Some(pos) = entry.participants.iter().position(|p| p == email) else {
            return Err(RegistryError::NotRegistered {
                activity: activity.to_string(),
                email: email.to_string(),
            });
        };

        entry.participants.remove(pos);
        info!(activity, participants = entry.participants.len(), "student unregistered");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_registry(policy: CapacityPolicy) -> ActivityRegistry {
        ActivityRegistry::from_activities([(
            "Robotics",
            Activity::new("Build robots", "Mondays", 2).with_participants(["a@school.edu"]),
        )])
        .with_capacity_policy(policy)
    }

    #[test]
    fn spots_left_saturates_at_zero() {
        let activity = Activity::new("d", "s", 1).with_participants(["a", "b", "c"]);
        assert_eq!(activity.spots_left(), 0);

        let activity = Activity::new("d", "s", 5).with_participants(["a"]);
        assert_eq!(activity.spots_left(), 4);
    }

    #[test]
    fn is_registered_is_case_sensitive() {
        let activity = Activity::new("d", "s", 5).with_participants(["Alice@school.edu"]);
        assert!(activity.is_registered("Alice@school.edu"));
        assert!(!activity.is_registered("alice@school.edu"));
    }

    #[test]
    fn default_policy_is_advisory() {
        let registry = ActivityRegistry::default();
        assert_eq!(registry.capacity_policy(), CapacityPolicy::Advisory);
        assert!(registry.is_empty());
    }

    #[test]
    fn advisory_policy_admits_past_capacity() {
        let registry = tiny_registry(CapacityPolicy::Advisory);
        registry.signup("Robotics", "b@school.edu").unwrap();
        registry.signup("Robotics", "c@school.edu").unwrap();

        let robotics = registry.get("Robotics").unwrap();
        assert_eq!(robotics.participants.len(), 3);
        assert_eq!(robotics.spots_left(), 0);
    }

    #[test]
    fn enforce_policy_rejects_when_full() {
        let registry = tiny_registry(CapacityPolicy::Enforce);
        registry.signup("Robotics", "b@school.edu").unwrap();

        let err = registry.signup("Robotics", "c@school.edu").unwrap_err();
        assert_eq!(
            err,
            RegistryError::ActivityFull {
                activity: "Robotics".to_string(),
                max_participants: 2,
            }
        );
        assert_eq!(err.to_string(), "Activity is full");
        assert_eq!(
            registry.get("Robotics").unwrap().participants,
            vec!["a@school.edu", "b@school.edu"]
        );
    }

    #[test]
    fn enforce_policy_still_reports_duplicates_first() {
        let registry = tiny_registry(CapacityPolicy::Enforce);
        registry.signup("Robotics", "b@school.edu").unwrap();

        let err = registry.signup("Robotics", "a@school.edu").unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered { .. }));
    }

    #[test]
    fn unregister_frees_a_spot_under_enforcement() {
        let registry = tiny_registry(CapacityPolicy::Enforce);
        registry.signup("Robotics", "b@school.edu").unwrap();
        registry.unregister("Robotics", "a@school.edu").unwrap();
        registry.signup("Robotics", "c@school.edu").unwrap();

        assert_eq!(
            registry.get("Robotics").unwrap().participants,
            vec!["b@school.edu", "c@school.edu"]
        );
    }

    #[test]
    fn error_messages_match_http_details() {
        let not_found = RegistryError::NotFound {
            activity: "x".into(),
        };
        let already = RegistryError::AlreadyRegistered {
            activity: "x".into(),
            email: "e".into(),
        };
        let not_registered = RegistryError::NotRegistered {
            activity: "x".into(),
            email: "e".into(),
        };
        assert_eq!(not_found.to_string(), "Activity not found");
        assert_eq!(already.to_string(), "Student is already signed up");
        assert_eq!(
            not_registered.to_string(),
            "Student is not signed up for this activity"
        );
    }

    #[test]
    fn list_all_returns_a_copy() {
        let registry = tiny_registry(CapacityPolicy::Advisory);
        let mut snapshot = registry.list_all();
        snapshot
            .get_mut("Robotics")
            .unwrap()
            .participants
            .push("intruder@school.edu".to_string());
        snapshot.remove("Robotics");

        let robotics = registry.get("Robotics").unwrap();
        assert_eq!(robotics.participants, vec!["a@school.edu"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn activity_serializes_without_name() {
        let activity = Activity::new("Build robots", "Mondays", 2).with_participants(["a@x"]);
        let json = serde_json::to_value(&activity).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "description": "Build robots",
                "schedule": "Mondays",
                "max_participants": 2,
                "participants": ["a@x"],
            })
        );
    }
}
