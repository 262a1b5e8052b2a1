//! Workspace scoping of access entries.
//!
//! An access entry either applies to the tenant's default workspace (no
//! attribute filter) or to the workspace named by its filter value. The
//! sum type keeps the grouping logic exhaustive; anything that cannot be
//! resolved to one of the two is a malformed scope and aborts the diff.

use std::collections::BTreeMap;

use super::mapping::PermissionSet;
use crate::error::DiffError;
use crate::model::{FilterOperation, ResourceDefinition, Role};

/// The attribute-filter key that names a workspace.
pub const WORKSPACE_FILTER_KEY: &str = "group.id";

/// The resource scope of an access entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    /// The tenant's default workspace (its organization id).
    Default,
    /// The workspace named by an attribute-filter value.
    Workspace(String),
}

impl Scope {
    /// The workspace id this scope anchors to, given the tenant default.
    pub fn workspace_id<'a>(&'a self, default_workspace: &'a str) -> &'a str {
        match self {
            Self::Default => default_workspace,
            Self::Workspace(id) => id,
        }
    }
}

fn resolve_scope(definition: &ResourceDefinition) -> Result<Scope, String> {
    if definition.key != WORKSPACE_FILTER_KEY {
        return Err(format!("unsupported filter key {:?}", definition.key));
    }
    match definition.operation {
        FilterOperation::Equal => {
            if definition.value.is_empty() {
                Err("empty workspace value".to_string())
            } else {
                Ok(Scope::Workspace(definition.value.clone()))
            }
        }
        FilterOperation::In => Err("list filters cannot name a single workspace".to_string()),
    }
}

/// Group a role's access entries by resource scope.
///
/// A role may have zero, one, or many scopes. Duplicate permissions
/// within one scope collapse; permissions repeated across scopes do not.
pub fn group_access_by_scope(role: &Role) -> Result<BTreeMap<Scope, PermissionSet>, DiffError> {
    let mut scopes: BTreeMap<Scope, PermissionSet> = BTreeMap::new();

    for access in &role.access {
        let scope = match &access.resource_definition {
            None => Scope::Default,
            Some(definition) => {
                resolve_scope(definition).map_err(|reason| DiffError::UnresolvableScope {
                    permission: access.permission.as_string(),
                    reason,
                })?
            }
        };
        scopes
            .entry(scope)
            .or_default()
            .insert(access.permission.clone());
    }

    Ok(scopes)
}
