//! Permission-model value objects.
//!
//! These are the read-side representations of the relational layer's
//! entities: roles with their access entries, groups, policies, and
//! tenants. They are fully materialized values with no deferred
//! evaluation, so the diffing logic downstream sees exactly the state the
//! caller captured.
//!
//! The relational layer owns these records; this crate only consumes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed role identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleId(pub String);

/// Strongly-typed group identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

/// Strongly-typed tenant identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

/// Strongly-typed principal (user) identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrincipalId(pub String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(RoleId);
string_id!(GroupId);
string_id!(TenantId);
string_id!(PrincipalId);

// ═══════════════════════════════════════════════════════════════════════════════
// Permission
// ═══════════════════════════════════════════════════════════════════════════════

/// A permission in `application:resource_type:verb` form, for example
/// `inventory:hosts:read`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub application: String,
    pub resource_type: String,
    pub verb: String,
}

impl Permission {
    pub fn new(
        application: impl Into<String>,
        resource_type: impl Into<String>,
        verb: impl Into<String>,
    ) -> Self {
        Self {
            application: application.into(),
            resource_type: resource_type.into(),
            verb: verb.into(),
        }
    }

    /// Parse a colon-separated permission string like `"app1:hosts:read"`.
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.splitn(3, ':').collect();
        match parts.as_slice() {
            [app, resource, verb] if !app.is_empty() && !resource.is_empty() && !verb.is_empty() => {
                Some(Self::new(*app, *resource, *verb))
            }
            _ => None,
        }
    }

    /// Canonical string form `"application:resource_type:verb"`.
    pub fn as_string(&self) -> String {
        format!("{}:{}:{}", self.application, self.resource_type, self.verb)
    }

    /// The relation name this permission uses on a v2 role resource:
    /// the permission string with `:` replaced by `_`.
    pub fn relation(&self) -> String {
        format!("{}_{}_{}", self.application, self.resource_type, self.verb)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.application, self.resource_type, self.verb
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Access and resource definitions
// ═══════════════════════════════════════════════════════════════════════════════

/// Comparison operation carried by an attribute filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperation {
    Equal,
    In,
}

/// An attribute filter restricting an access entry to specific resource
/// instances, e.g. `{key: "group.id", operation: equal, value: "ws_2"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub key: String,
    pub operation: FilterOperation,
    pub value: String,
}

impl ResourceDefinition {
    pub fn new(
        key: impl Into<String>,
        operation: FilterOperation,
        value: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            operation,
            value: value.into(),
        }
    }

    /// The common case: an equality filter on a workspace key.
    pub fn equal(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, FilterOperation::Equal, value)
    }
}

/// One permission grant within a role, optionally restricted by an
/// attribute filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    pub permission: Permission,
    pub resource_definition: Option<ResourceDefinition>,
}

impl Access {
    /// An unscoped grant (applies to the tenant's default workspace).
    pub fn unscoped(permission: Permission) -> Self {
        Self {
            permission,
            resource_definition: None,
        }
    }

    /// A grant restricted to the resources selected by `definition`.
    pub fn scoped(permission: Permission, definition: ResourceDefinition) -> Self {
        Self {
            permission,
            resource_definition: Some(definition),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tenant
// ═══════════════════════════════════════════════════════════════════════════════

/// A tenant and its organization identifier.
///
/// The organization id doubles as the tenant's default workspace id in the
/// relation graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub org_id: String,
}

impl Tenant {
    pub fn new(id: impl Into<String>, name: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self {
            id: TenantId::new(id),
            name: name.into(),
            org_id: org_id.into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role
// ═══════════════════════════════════════════════════════════════════════════════

/// A permission-model role: an ordered collection of access entries,
/// either tenant-owned (custom) or shared across tenants (system).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    /// Built-in system roles are tenant-independent.
    pub system: bool,
    /// Owning tenant; `None` for system roles.
    pub tenant: Option<Tenant>,
    pub access: Vec<Access>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Create a custom role owned by a tenant.
    pub fn custom(id: impl Into<String>, name: impl Into<String>, tenant: Tenant) -> Self {
        let now = Utc::now();
        Self {
            id: RoleId::new(id),
            name: name.into(),
            system: false,
            tenant: Some(tenant),
            access: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a tenant-independent system role.
    pub fn system(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RoleId::new(id),
            name: name.into(),
            system: true,
            tenant: None,
            access: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style access assignment.
    pub fn with_access(mut self, access: Vec<Access>) -> Self {
        self.access = access;
        self
    }

    /// Replace the role's access entries in place.
    pub fn set_access(&mut self, access: Vec<Access>) {
        self.access = access;
        self.updated_at = Utc::now();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Group and policy
// ═══════════════════════════════════════════════════════════════════════════════

/// A named, tenant-scoped collection of principals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub tenant: TenantId,
    pub principals: Vec<PrincipalId>,
}

impl Group {
    pub fn new(id: impl Into<String>, name: impl Into<String>, tenant: TenantId) -> Self {
        Self {
            id: GroupId::new(id),
            name: name.into(),
            tenant,
            principals: Vec::new(),
        }
    }

    pub fn with_principals(mut self, principals: Vec<PrincipalId>) -> Self {
        self.principals = principals;
        self
    }

    pub fn add_principal(&mut self, principal: PrincipalId) {
        if !self.principals.contains(&principal) {
            self.principals.push(principal);
        }
    }

    pub fn remove_principal(&mut self, principal: &PrincipalId) -> bool {
        let before = self.principals.len();
        self.principals.retain(|p| p != principal);
        self.principals.len() != before
    }
}

/// Binds one group to one-or-more roles within a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    pub tenant: TenantId,
    pub group: GroupId,
    pub roles: Vec<RoleId>,
}

impl Policy {
    pub fn new(name: impl Into<String>, tenant: TenantId, group: GroupId) -> Self {
        Self {
            name: name.into(),
            tenant,
            group,
            roles: Vec::new(),
        }
    }

    pub fn add_role(&mut self, role: RoleId) {
        if !self.roles.contains(&role) {
            self.roles.push(role);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
