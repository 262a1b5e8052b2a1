//! The dual-write translation engine.
//!
//! Every mutation to a permission-model role (create, update, delete,
//! group/policy binding change) is translated here into a minimal,
//! idempotent set of relation-tuple mutations and issued through a
//! [`crate::replication::RelationReplicator`] as one all-or-nothing
//! event. The handler reads current graph state through a
//! [`crate::graph::TupleStore`] to diff against, and never writes to a
//! store directly.

pub mod handler;
pub mod mapping;
pub mod scope;

pub use handler::{AssignmentChange, DualWriteHandler, GroupDualWriteHandler};
pub use mapping::{PermissionSet, RoleMapping, ScopeBinding};
pub use scope::{group_access_by_scope, Scope};
