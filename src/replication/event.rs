//! Replication events: the unit of delivery between the dual-write
//! handler and a tuple store transport.
//!
//! An event carries the complete, all-or-nothing diff for one
//! permission-model mutation. The event id doubles as the idempotency key
//! for transports that may deliver twice; combined with the store's set
//! semantics, re-applying an event cannot double-apply tuples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::graph::tuple::RelationTuple;

// =============================================================================
// Event identity
// =============================================================================

/// Unique identifier for a replication event; the idempotency key seen by
/// transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Event kinds
// =============================================================================

/// What changed at the permission-model layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationEventType {
    CreateCustomRole,
    UpdateCustomRole,
    DeleteCustomRole,
    CreateSystemRole,
    CreateTenantSystemRole,
    GroupMembershipChanged,
    PolicyBindingChanged,
}

impl ReplicationEventType {
    /// Whether this event describes a role mutation (as opposed to a
    /// group or policy one).
    pub fn is_role_event(&self) -> bool {
        matches!(
            self,
            Self::CreateCustomRole
                | Self::UpdateCustomRole
                | Self::DeleteCustomRole
                | Self::CreateSystemRole
                | Self::CreateTenantSystemRole
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateCustomRole => "CREATE_CUSTOM_ROLE",
            Self::UpdateCustomRole => "UPDATE_CUSTOM_ROLE",
            Self::DeleteCustomRole => "DELETE_CUSTOM_ROLE",
            Self::CreateSystemRole => "CREATE_SYSTEM_ROLE",
            Self::CreateTenantSystemRole => "CREATE_TENANT_SYSTEM_ROLE",
            Self::GroupMembershipChanged => "GROUP_MEMBERSHIP_CHANGED",
            Self::PolicyBindingChanged => "POLICY_BINDING_CHANGED",
        }
    }
}

impl fmt::Display for ReplicationEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Event payload
// =============================================================================

/// One all-or-nothing tuple diff, tagged with its cause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationEvent {
    /// Idempotency key.
    pub event_id: EventId,
    pub event_type: ReplicationEventType,
    /// Orders events for one aggregate (role id or group id). Events
    /// sharing a partition key must be applied in emission order.
    pub partition_key: String,
    pub occurred_at: DateTime<Utc>,
    /// Tuples to add.
    pub add: Vec<RelationTuple>,
    /// Tuples to remove.
    pub remove: Vec<RelationTuple>,
}

impl ReplicationEvent {
    pub fn new(
        event_type: ReplicationEventType,
        partition_key: impl Into<String>,
        add: Vec<RelationTuple>,
        remove: Vec<RelationTuple>,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            event_type,
            partition_key: partition_key.into(),
            occurred_at: Utc::now(),
            add,
            remove,
        }
    }

    /// An event with nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    pub fn tuple_count(&self) -> usize {
        self.add.len() + self.remove.len()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tuple::ObjectRef;

    #[test]
    fn test_event_type_wire_names() {
        let json = serde_json::to_string(&ReplicationEventType::CreateCustomRole).unwrap();
        assert_eq!(json, "\"CREATE_CUSTOM_ROLE\"");
        assert_eq!(
            ReplicationEventType::GroupMembershipChanged.to_string(),
            "GROUP_MEMBERSHIP_CHANGED"
        );
    }

    #[test]
    fn test_event_ids_are_unique() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn test_role_event_classification() {
        assert!(ReplicationEventType::DeleteCustomRole.is_role_event());
        assert!(ReplicationEventType::CreateTenantSystemRole.is_role_event());
        assert!(!ReplicationEventType::GroupMembershipChanged.is_role_event());
        assert!(!ReplicationEventType::PolicyBindingChanged.is_role_event());
    }

    #[test]
    fn test_event_roundtrip() {
        let event = ReplicationEvent::new(
            ReplicationEventType::UpdateCustomRole,
            "r1",
            vec![RelationTuple::new(
                ObjectRef::new("rbac", "role", "v2-1"),
                "app1_hosts_read",
                ObjectRef::new("rbac", "principal", "*"),
            )],
            Vec::new(),
        );

        let json = serde_json::to_string(&event).unwrap();
        let restored: ReplicationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.event_id, event.event_id);
        assert_eq!(restored.partition_key, "r1");
        assert_eq!(restored.tuple_count(), 1);
        assert!(!restored.is_empty());
    }
}
