//! Graph-side shapes for roles and bindings.
//!
//! A v2 role is a `role`-typed resource carrying one relation tuple per
//! granted permission; its identity is keyed by the permission set, not
//! by any permission-model identity. A role binding joins a workspace, a
//! v2 role, and the groups granted that role in that workspace:
//!
//! ```text
//! workspace:<ws>      #user_grant  @role_binding:<b>
//! role_binding:<b>    #granted     @role:<v2>
//! role_binding:<b>    #subject     @group:<g>        (one per bound group)
//! role:<v2>           #<app_res_verb> @principal:*   (one per permission)
//! group:<g>           #member      @principal:<u>    (one per member)
//! ```
//!
//! Binding identity is derived, not minted: UUIDv5 over (permission-model
//! role id, workspace id, permission-set fingerprint). The same role,
//! workspace, and permission set always name the same binding, so
//! re-application is idempotent; a changed permission set names a new
//! binding; and two permission-model roles never share a binding even
//! when their permission sets coincide.

use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::graph::tuple::{ObjectRef, RelationTuple};
use crate::model::{GroupId, Permission, PrincipalId, RoleId};

// ═══════════════════════════════════════════════════════════════════════════════
// Graph vocabulary
// ═══════════════════════════════════════════════════════════════════════════════

pub const TYPE_ROLE: &str = "role";
pub const TYPE_ROLE_BINDING: &str = "role_binding";
pub const TYPE_WORKSPACE: &str = "workspace";
pub const TYPE_GROUP: &str = "group";
pub const TYPE_PRINCIPAL: &str = "principal";

pub const RELATION_GRANTED: &str = "granted";
pub const RELATION_SUBJECT: &str = "subject";
pub const RELATION_USER_GRANT: &str = "user_grant";
pub const RELATION_MEMBER: &str = "member";

/// Subject id of a v2 role's permission tuples: any principal.
pub const WILDCARD_PRINCIPAL: &str = "*";

// ═══════════════════════════════════════════════════════════════════════════════
// Permission sets
// ═══════════════════════════════════════════════════════════════════════════════

/// The sorted set of permissions a role grants within one scope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, permission: Permission) {
        self.0.insert(permission);
    }

    pub fn extend(&mut self, other: &PermissionSet) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    /// The relation names this set occupies on a v2 role resource, in
    /// sorted order.
    pub fn relations(&self) -> impl Iterator<Item = String> + '_ {
        self.0.iter().map(Permission::relation)
    }

    /// Stable identity of the set, independent of insertion order.
    pub fn fingerprint(&self) -> String {
        self.relations().collect::<Vec<_>>().join("|")
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Binding identity
// ═══════════════════════════════════════════════════════════════════════════════

/// Derive the role-binding id for (role, workspace, permission set).
pub fn derive_binding_id(role: &RoleId, workspace: &str, permissions: &PermissionSet) -> String {
    let seed = format!("{}\n{}\n{}", role, workspace, permissions.fingerprint());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()).to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tuple construction
// ═══════════════════════════════════════════════════════════════════════════════

/// The permission tuples of a v2 role resource.
pub fn v2_role_tuples(
    namespace: &str,
    v2_role_id: &str,
    permissions: &PermissionSet,
) -> Vec<RelationTuple> {
    permissions
        .relations()
        .map(|relation| {
            RelationTuple::new(
                ObjectRef::new(namespace, TYPE_ROLE, v2_role_id),
                relation,
                ObjectRef::new(namespace, TYPE_PRINCIPAL, WILDCARD_PRINCIPAL),
            )
        })
        .collect()
}

/// The tuple attaching a group as subject of a binding.
pub fn binding_subject_tuple(namespace: &str, binding_id: &str, group: &GroupId) -> RelationTuple {
    RelationTuple::new(
        ObjectRef::new(namespace, TYPE_ROLE_BINDING, binding_id),
        RELATION_SUBJECT,
        ObjectRef::new(namespace, TYPE_GROUP, group.as_str()),
    )
}

/// The membership tuple of one principal in a group.
pub fn group_member_tuple(
    namespace: &str,
    group: &GroupId,
    principal: &PrincipalId,
) -> RelationTuple {
    RelationTuple::new(
        ObjectRef::new(namespace, TYPE_GROUP, group.as_str()),
        RELATION_MEMBER,
        ObjectRef::new(namespace, TYPE_PRINCIPAL, principal.as_str()),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role mappings
// ═══════════════════════════════════════════════════════════════════════════════

/// One workspace's materialized binding state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeBinding {
    pub binding_id: String,
    pub v2_role_id: String,
    pub permissions: PermissionSet,
    pub groups: BTreeSet<GroupId>,
}

impl ScopeBinding {
    /// Every tuple this binding contributes to the graph, excluding the
    /// v2 role's own permission tuples (those are shared).
    pub fn tuples(&self, namespace: &str, workspace: &str) -> Vec<RelationTuple> {
        let mut tuples = vec![
            RelationTuple::new(
                ObjectRef::new(namespace, TYPE_ROLE_BINDING, &self.binding_id),
                RELATION_GRANTED,
                ObjectRef::new(namespace, TYPE_ROLE, &self.v2_role_id),
            ),
            RelationTuple::new(
                ObjectRef::new(namespace, TYPE_WORKSPACE, workspace),
                RELATION_USER_GRANT,
                ObjectRef::new(namespace, TYPE_ROLE_BINDING, &self.binding_id),
            ),
        ];
        for group in &self.groups {
            tuples.push(binding_subject_tuple(namespace, &self.binding_id, group));
        }
        tuples
    }
}

/// A permission-model role's full graph footprint: workspace id to the
/// binding anchored there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleMapping {
    pub bindings: BTreeMap<String, ScopeBinding>,
}

impl RoleMapping {
    /// Groups bound anywhere under this role. New workspace scopes
    /// inherit this set.
    pub fn group_union(&self) -> BTreeSet<GroupId> {
        self.bindings
            .values()
            .flat_map(|b| b.groups.iter().cloned())
            .collect()
    }

    /// Distinct v2 roles this mapping grants.
    pub fn v2_role_ids(&self) -> BTreeSet<String> {
        self.bindings
            .values()
            .map(|b| b.v2_role_id.clone())
            .collect()
    }

    /// Binding ids across all workspaces.
    pub fn binding_ids(&self) -> BTreeSet<String> {
        self.bindings
            .values()
            .map(|b| b.binding_id.clone())
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Permission;

    fn set(perms: &[&str]) -> PermissionSet {
        perms
            .iter()
            .map(|p| Permission::parse(p).unwrap())
            .collect()
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let a = set(&["app1:hosts:read", "inventory:hosts:write"]);
        let b = set(&["inventory:hosts:write", "app1:hosts:read"]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), set(&["app1:hosts:read"]).fingerprint());
    }

    #[test]
    fn test_binding_id_is_deterministic() {
        let role = RoleId::new("r1");
        let perms = set(&["app1:hosts:read"]);

        let a = derive_binding_id(&role, "ws_2", &perms);
        let b = derive_binding_id(&role, "ws_2", &perms);
        assert_eq!(a, b);
    }

    #[test]
    fn test_binding_id_varies_by_role_workspace_and_set() {
        let perms = set(&["app1:hosts:read"]);
        let base = derive_binding_id(&RoleId::new("r1"), "ws_2", &perms);

        assert_ne!(base, derive_binding_id(&RoleId::new("r2"), "ws_2", &perms));
        assert_ne!(base, derive_binding_id(&RoleId::new("r1"), "ws_3", &perms));
        assert_ne!(
            base,
            derive_binding_id(&RoleId::new("r1"), "ws_2", &set(&["app1:hosts:write"]))
        );
    }

    #[test]
    fn test_v2_role_tuples_one_per_permission() {
        let tuples = v2_role_tuples("rbac", "v2-1", &set(&["app1:hosts:read", "app2:hosts:read"]));
        assert_eq!(tuples.len(), 2);
        assert!(tuples.iter().all(|t| t.resource_id == "v2-1"
            && t.resource_type_name == TYPE_ROLE
            && t.subject_id == WILDCARD_PRINCIPAL));
        assert!(tuples.iter().any(|t| t.relation == "app1_hosts_read"));
    }

    #[test]
    fn test_scope_binding_tuples() {
        let binding = ScopeBinding {
            binding_id: "b1".to_string(),
            v2_role_id: "v2-1".to_string(),
            permissions: set(&["app1:hosts:read"]),
            groups: [GroupId::new("g1"), GroupId::new("g2")].into_iter().collect(),
        };

        let tuples = binding.tuples("rbac", "ws_2");
        assert_eq!(tuples.len(), 4);
        assert!(tuples
            .iter()
            .any(|t| t.relation == RELATION_GRANTED && t.subject_id == "v2-1"));
        assert!(tuples
            .iter()
            .any(|t| t.relation == RELATION_USER_GRANT && t.resource_id == "ws_2"));
        assert_eq!(
            tuples
                .iter()
                .filter(|t| t.relation == RELATION_SUBJECT)
                .count(),
            2
        );
    }

    #[test]
    fn test_group_union() {
        let mut mapping = RoleMapping::default();
        mapping.bindings.insert(
            "default".to_string(),
            ScopeBinding {
                binding_id: "b1".to_string(),
                v2_role_id: "v2-1".to_string(),
                permissions: set(&["app1:hosts:read"]),
                groups: [GroupId::new("g1")].into_iter().collect(),
            },
        );
        mapping.bindings.insert(
            "ws_2".to_string(),
            ScopeBinding {
                binding_id: "b2".to_string(),
                v2_role_id: "v2-1".to_string(),
                permissions: set(&["app1:hosts:read"]),
                groups: [GroupId::new("g2")].into_iter().collect(),
            },
        );

        let union = mapping.group_union();
        assert_eq!(union.len(), 2);
        assert_eq!(mapping.v2_role_ids().len(), 1);
    }
}
