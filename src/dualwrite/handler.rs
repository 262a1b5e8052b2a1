//! The dual-write handler: translates permission-model mutations into
//! minimal relation-tuple diffs.
//!
//! One handler is created per mutation, bound to the role and the event
//! type describing what is happening to it. The handler reads current
//! graph state through the tuple store, computes the difference between
//! the role's old and new graph footprint, and issues the whole diff
//! through the replicator as a single all-or-nothing event. It runs as
//! one sequential unit of work inside the caller's transaction; callers
//! must serialize concurrent mutations of the same role (e.g. with a row
//! lock) before entering it.
//!
//! Update protocol: call [`DualWriteHandler::prepare_for_update`] before
//! mutating the role, then [`DualWriteHandler::replicate_new_or_updated_role`]
//! with the updated state. Exactly one prepare pairs with exactly one
//! replicate; violations surface as [`InvariantViolation`].

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use uuid::Uuid;

use super::mapping::{
    binding_subject_tuple, derive_binding_id, group_member_tuple, v2_role_tuples, PermissionSet,
    RoleMapping, ScopeBinding, RELATION_GRANTED, RELATION_SUBJECT, TYPE_ROLE, TYPE_ROLE_BINDING,
};
use super::scope::group_access_by_scope;
use crate::error::{DiffError, InvariantViolation, Result};
use crate::graph::predicate::{all_of, relation, resource, resource_type, subject};
use crate::graph::store::{TupleQuery, TupleStore};
use crate::graph::tuple::RelationTuple;
use crate::model::{Group, GroupId, PrincipalId, Role, Tenant};
use crate::replication::event::{ReplicationEvent, ReplicationEventType};
use crate::replication::replicator::RelationReplicator;

/// Default namespace of every graph type this engine owns.
pub const DEFAULT_NAMESPACE: &str = "rbac";

/// Direction of a role-to-group assignment change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentChange {
    Added,
    Removed,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role handler
// ═══════════════════════════════════════════════════════════════════════════════

/// Translates one permission-model role mutation into a tuple diff.
pub struct DualWriteHandler<'a, S: TupleStore, R: RelationReplicator> {
    store: &'a S,
    replicator: &'a R,
    namespace: String,
    event_type: ReplicationEventType,
    /// The role as it was when the handler was created (pre-mutation).
    role: Role,
    /// Workspace the role's unscoped access entries anchor to.
    default_workspace: String,
    /// Pre-update mapping captured by `prepare_for_update`.
    snapshot: Option<RoleMapping>,
}

impl<'a, S: TupleStore, R: RelationReplicator> DualWriteHandler<'a, S, R> {
    /// Handler for a custom (tenant-owned) role event.
    pub fn new(
        role: &Role,
        event_type: ReplicationEventType,
        store: &'a S,
        replicator: &'a R,
    ) -> Result<Self> {
        let default_workspace = role
            .tenant
            .as_ref()
            .map(|t| t.org_id.clone())
            .ok_or_else(|| DiffError::MissingDefaultWorkspace {
                role: role.id.to_string(),
            })?;

        Ok(Self {
            store,
            replicator,
            namespace: DEFAULT_NAMESPACE.to_string(),
            event_type,
            role: role.clone(),
            default_workspace,
            snapshot: None,
        })
    }

    /// Handler for a system role event. System roles are shared across
    /// tenants; the binding anchors to the given tenant's workspace.
    pub fn for_system_role_event(
        role: &Role,
        tenant: &Tenant,
        event_type: ReplicationEventType,
        store: &'a S,
        replicator: &'a R,
    ) -> Self {
        Self {
            store,
            replicator,
            namespace: DEFAULT_NAMESPACE.to_string(),
            event_type,
            role: role.clone(),
            default_workspace: tenant.org_id.clone(),
            snapshot: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Update protocol
    // ─────────────────────────────────────────────────────────────────────────

    /// Capture the role's current workspace → (binding, v2 role, groups)
    /// mapping before the caller mutates the role.
    pub async fn prepare_for_update(&mut self) -> Result<()> {
        if self.snapshot.is_some() {
            return Err(InvariantViolation::AlreadyPrepared {
                role: self.role.id.to_string(),
            }
            .into());
        }

        let role = self.role.clone();
        let mapping = self.current_mapping(&role).await?;
        debug!(
            role = %self.role.id,
            workspaces = mapping.bindings.len(),
            "Captured pre-update role mapping"
        );
        self.snapshot = Some(mapping);
        Ok(())
    }

    /// Replicate the role's full current state, diffing against the
    /// pre-update snapshot for UPDATE events.
    pub async fn replicate_new_or_updated_role(&mut self, role: &Role) -> Result<()> {
        if !matches!(
            self.event_type,
            ReplicationEventType::CreateCustomRole
                | ReplicationEventType::UpdateCustomRole
                | ReplicationEventType::CreateSystemRole
                | ReplicationEventType::CreateTenantSystemRole
        ) {
            return Err(InvariantViolation::UnexpectedEventType {
                operation: "replicate_new_or_updated_role",
                event_type: self.event_type.to_string(),
            }
            .into());
        }
        if role.id != self.role.id {
            return Err(InvariantViolation::RoleMismatch {
                expected: self.role.id.to_string(),
                actual: role.id.to_string(),
            }
            .into());
        }

        let old = match self.event_type {
            ReplicationEventType::UpdateCustomRole => {
                self.snapshot
                    .take()
                    .ok_or_else(|| InvariantViolation::MissingSnapshot {
                        role: self.role.id.to_string(),
                    })?
            }
            _ => self.snapshot.take().unwrap_or_default(),
        };

        let desired = self.desired_state(role)?;

        let mut adds: Vec<RelationTuple> = Vec::new();
        let mut removes: Vec<RelationTuple> = Vec::new();
        let mut new_mapping = RoleMapping::default();
        let mut deleted_bindings: BTreeSet<String> = BTreeSet::new();
        let inherited_groups = old.group_union();

        // Workspaces whose set is unchanged keep their binding untouched;
        // everything else is torn down and, if still desired, rebuilt.
        for (workspace, old_binding) in &old.bindings {
            let unchanged = desired
                .get(workspace)
                .is_some_and(|p| *p == old_binding.permissions);
            if unchanged {
                debug!(
                    role = %self.role.id,
                    workspace = %workspace,
                    "Workspace permission set unchanged, binding untouched"
                );
                new_mapping
                    .bindings
                    .insert(workspace.clone(), old_binding.clone());
            } else {
                debug!(
                    role = %self.role.id,
                    workspace = %workspace,
                    binding = %old_binding.binding_id,
                    "Tearing down role binding"
                );
                removes.extend(old_binding.tuples(&self.namespace, workspace));
                deleted_bindings.insert(old_binding.binding_id.clone());
            }
        }

        // In-flight dedup: two workspaces converging on the same set in
        // one diff share one v2 role.
        let mut resolved: BTreeMap<String, String> = BTreeMap::new();
        for (workspace, permissions) in &desired {
            if new_mapping.bindings.contains_key(workspace) {
                continue;
            }
            let v2_role_id = self
                .resolve_or_create_v2_role(permissions, &mut resolved, &mut adds)
                .await?;
            let binding_id = derive_binding_id(&role.id, workspace, permissions);
            let groups = old
                .bindings
                .get(workspace)
                .map(|b| b.groups.clone())
                .unwrap_or_else(|| inherited_groups.clone());
            let binding = ScopeBinding {
                binding_id,
                v2_role_id,
                permissions: permissions.clone(),
                groups,
            };
            adds.extend(binding.tuples(&self.namespace, workspace));
            new_mapping.bindings.insert(workspace.clone(), binding);
        }

        // Delete v2 roles no surviving binding grants anymore.
        let retained = new_mapping.v2_role_ids();
        for v2_role_id in old.v2_role_ids() {
            if retained.contains(&v2_role_id) {
                continue;
            }
            if self
                .v2_role_still_granted(&v2_role_id, &deleted_bindings)
                .await?
            {
                continue;
            }
            debug!(role = %self.role.id, v2_role = %v2_role_id, "Deleting orphaned v2 role");
            removes.extend(
                self.store
                    .scan(&resource(&self.namespace, TYPE_ROLE, &v2_role_id))
                    .await?,
            );
        }

        self.assert_no_referenced_role_deleted(&removes, &deleted_bindings)
            .await?;
        self.emit(role.id.to_string(), adds, removes).await
    }

    /// Replicate the deletion of the role: every binding goes, and every
    /// v2 role reachable only from those bindings goes with them.
    pub async fn replicate_deleted_role(&self) -> Result<()> {
        if self.event_type != ReplicationEventType::DeleteCustomRole {
            return Err(InvariantViolation::UnexpectedEventType {
                operation: "replicate_deleted_role",
                event_type: self.event_type.to_string(),
            }
            .into());
        }

        let mapping = self.current_mapping(&self.role).await?;
        let deleted_bindings = mapping.binding_ids();

        let mut removes: Vec<RelationTuple> = Vec::new();
        for (workspace, binding) in &mapping.bindings {
            removes.extend(binding.tuples(&self.namespace, workspace));
        }
        for v2_role_id in mapping.v2_role_ids() {
            if self
                .v2_role_still_granted(&v2_role_id, &deleted_bindings)
                .await?
            {
                continue;
            }
            removes.extend(
                self.store
                    .scan(&resource(&self.namespace, TYPE_ROLE, &v2_role_id))
                    .await?,
            );
        }

        self.assert_no_referenced_role_deleted(&removes, &deleted_bindings)
            .await?;
        self.emit(self.role.id.to_string(), Vec::new(), removes)
            .await
    }

    /// Attach or detach a group as subject on every existing binding of
    /// this role. V2 roles and permission-set tuples are untouched.
    pub async fn replicate_role_assignment(
        &self,
        group: &Group,
        change: AssignmentChange,
    ) -> Result<()> {
        if self.event_type != ReplicationEventType::PolicyBindingChanged {
            return Err(InvariantViolation::UnexpectedEventType {
                operation: "replicate_role_assignment",
                event_type: self.event_type.to_string(),
            }
            .into());
        }

        let mapping = self.current_mapping(&self.role).await?;
        let tuples: Vec<RelationTuple> = mapping
            .bindings
            .values()
            .map(|b| binding_subject_tuple(&self.namespace, &b.binding_id, &group.id))
            .collect();

        debug!(
            role = %self.role.id,
            group = %group.id,
            bindings = tuples.len(),
            change = ?change,
            "Replicating role assignment change"
        );

        match change {
            AssignmentChange::Added => self.emit(self.role.id.to_string(), tuples, Vec::new()).await,
            AssignmentChange::Removed => {
                self.emit(self.role.id.to_string(), Vec::new(), tuples).await
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Diff internals
    // ─────────────────────────────────────────────────────────────────────────

    /// The role's desired workspace → permission-set state. Scopes that
    /// resolve to the same workspace merge.
    fn desired_state(&self, role: &Role) -> Result<BTreeMap<String, PermissionSet>> {
        let scopes = group_access_by_scope(role)?;
        let mut desired: BTreeMap<String, PermissionSet> = BTreeMap::new();
        for (scope, permissions) in scopes {
            let workspace = scope.workspace_id(&self.default_workspace).to_string();
            desired.entry(workspace).or_default().extend(&permissions);
        }
        Ok(desired)
    }

    /// Materialize the role's current graph footprint from the store.
    ///
    /// A workspace appears only if its binding has been replicated; the
    /// v2 role is whatever the binding's `granted` tuple actually points
    /// at, and the groups are its current `subject` tuples.
    async fn current_mapping(&self, role: &Role) -> Result<RoleMapping> {
        let mut mapping = RoleMapping::default();

        for (workspace, permissions) in self.desired_state(role)? {
            let binding_id = derive_binding_id(&role.id, &workspace, &permissions);

            let granted = self
                .store
                .scan(&all_of([
                    resource(&self.namespace, TYPE_ROLE_BINDING, &binding_id),
                    relation(RELATION_GRANTED),
                ]))
                .await?;
            let mut granted_roles: Vec<String> =
                granted.into_iter().map(|t| t.subject_id).collect();
            granted_roles.sort();
            let Some(v2_role_id) = granted_roles.into_iter().next() else {
                continue;
            };

            let subjects = self
                .store
                .scan(&all_of([
                    resource(&self.namespace, TYPE_ROLE_BINDING, &binding_id),
                    relation(RELATION_SUBJECT),
                ]))
                .await?;
            let groups: BTreeSet<GroupId> = subjects
                .into_iter()
                .map(|t| GroupId::new(t.subject_id))
                .collect();

            mapping.bindings.insert(
                workspace,
                ScopeBinding {
                    binding_id,
                    v2_role_id,
                    permissions,
                    groups,
                },
            );
        }

        Ok(mapping)
    }

    /// Resolve a v2 role by exact tuple-set equality, or mint a new one
    /// and stage its permission tuples.
    async fn resolve_or_create_v2_role(
        &self,
        permissions: &PermissionSet,
        resolved: &mut BTreeMap<String, String>,
        adds: &mut Vec<RelationTuple>,
    ) -> Result<String> {
        let fingerprint = permissions.fingerprint();
        if let Some(id) = resolved.get(&fingerprint) {
            return Ok(id.clone());
        }

        if let Some(id) = self.find_v2_role_by_permissions(permissions).await? {
            debug!(
                role = %self.role.id,
                v2_role = %id,
                "Reusing v2 role with matching permission set"
            );
            resolved.insert(fingerprint, id.clone());
            return Ok(id);
        }

        let id = Uuid::new_v4().to_string();
        debug!(
            role = %self.role.id,
            v2_role = %id,
            permissions = %fingerprint,
            "Creating v2 role"
        );
        adds.extend(v2_role_tuples(&self.namespace, &id, permissions));
        resolved.insert(fingerprint, id.clone());
        Ok(id)
    }

    /// Exact-match lookup: a role resource whose tuple set equals the
    /// permission set. Full matching makes supersets fail. Ties resolve
    /// to the lexicographically smallest id for determinism.
    async fn find_v2_role_by_permissions(
        &self,
        permissions: &PermissionSet,
    ) -> Result<Option<String>> {
        let requirements: Vec<_> = permissions
            .relations()
            .map(|rel| all_of([resource_type(&self.namespace, TYPE_ROLE), relation(rel)]))
            .collect();

        let result = self
            .store
            .find_group_with_tuples(
                &requirements,
                |t| t.resource_key(),
                |key: &(String, String, String)| key.0 == self.namespace && key.1 == TYPE_ROLE,
                true,
            )
            .await?;

        let mut candidates: Vec<String> = result.matched.into_keys().map(|key| key.2).collect();
        candidates.sort();
        Ok(candidates.into_iter().next())
    }

    /// Whether any binding outside `excluding` still grants the v2 role.
    async fn v2_role_still_granted(
        &self,
        v2_role_id: &str,
        excluding: &BTreeSet<String>,
    ) -> Result<bool> {
        let grants = self
            .store
            .scan(&all_of([
                resource_type(&self.namespace, TYPE_ROLE_BINDING),
                relation(RELATION_GRANTED),
                subject(&self.namespace, TYPE_ROLE, v2_role_id),
            ]))
            .await?;
        Ok(grants.iter().any(|t| !excluding.contains(&t.resource_id)))
    }

    /// Final guard: the staged deletes must not take down role tuples a
    /// surviving binding still grants.
    async fn assert_no_referenced_role_deleted(
        &self,
        removes: &[RelationTuple],
        deleted_bindings: &BTreeSet<String>,
    ) -> Result<()> {
        let doomed: BTreeSet<&String> = removes
            .iter()
            .filter(|t| {
                t.resource_type_namespace == self.namespace && t.resource_type_name == TYPE_ROLE
            })
            .map(|t| &t.resource_id)
            .collect();

        for v2_role_id in doomed {
            let grants = self
                .store
                .scan(&all_of([
                    resource_type(&self.namespace, TYPE_ROLE_BINDING),
                    relation(RELATION_GRANTED),
                    subject(&self.namespace, TYPE_ROLE, v2_role_id.as_str()),
                ]))
                .await?;
            if let Some(grant) = grants.iter().find(|t| !deleted_bindings.contains(&t.resource_id))
            {
                return Err(InvariantViolation::WouldOrphanReferencedRole {
                    role: self.role.id.to_string(),
                    v2_role: v2_role_id.clone(),
                    binding: grant.resource_id.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Issue one all-or-nothing event, or nothing if the diff is empty.
    async fn emit(
        &self,
        partition_key: String,
        add: Vec<RelationTuple>,
        remove: Vec<RelationTuple>,
    ) -> Result<()> {
        if add.is_empty() && remove.is_empty() {
            debug!(
                role = %self.role.id,
                event_type = %self.event_type,
                "No tuple changes to replicate"
            );
            return Ok(());
        }

        let event = ReplicationEvent::new(self.event_type, partition_key, add, remove);
        debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            writes = event.add.len(),
            deletes = event.remove.len(),
            "Replicating tuple diff"
        );
        self.replicator.replicate(event).await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Group handler
// ═══════════════════════════════════════════════════════════════════════════════

/// Replicates group membership changes as `member` tuples on the group
/// resource.
pub struct GroupDualWriteHandler<'a, R: RelationReplicator> {
    replicator: &'a R,
    namespace: String,
    group_id: GroupId,
}

impl<'a, R: RelationReplicator> GroupDualWriteHandler<'a, R> {
    pub fn new(group: &Group, replicator: &'a R) -> Self {
        Self {
            replicator,
            namespace: DEFAULT_NAMESPACE.to_string(),
            group_id: group.id.clone(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub async fn replicate_membership_change(
        &self,
        added: &[PrincipalId],
        removed: &[PrincipalId],
    ) -> Result<()> {
        let add: Vec<RelationTuple> = added
            .iter()
            .map(|p| group_member_tuple(&self.namespace, &self.group_id, p))
            .collect();
        let remove: Vec<RelationTuple> = removed
            .iter()
            .map(|p| group_member_tuple(&self.namespace, &self.group_id, p))
            .collect();

        if add.is_empty() && remove.is_empty() {
            return Ok(());
        }

        let event = ReplicationEvent::new(
            ReplicationEventType::GroupMembershipChanged,
            self.group_id.to_string(),
            add,
            remove,
        );
        debug!(
            event_id = %event.event_id,
            group = %self.group_id,
            "Replicating group membership change"
        );
        self.replicator.replicate(event).await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
