//! # accessgraph-core
//!
//! Dual-write engine keeping two representations of the same
//! access-control truth consistent: a permission-list model (role → list
//! of permission strings, optionally scoped by attribute filters) and a
//! relationship graph of subject–relation–resource tuples consumed by a
//! separate authorization-check engine.
//!
//! ## Architecture
//!
//! - **Model**: permission-model value objects (roles, access entries,
//!   groups, policies, tenants) read from the relational layer
//! - **Graph**: relation tuples, a predicate algebra, and tuple stores
//!   with the grouped-requirement query primitive
//! - **Replication**: events tagged with idempotency keys and the
//!   replicator transports that deliver them
//! - **Dual-Write Handler**: translates each permission-model mutation
//!   into a minimal, idempotent tuple diff inside the caller's unit of
//!   work
//! - **Seeding**: bounded worker pool replicating system roles across
//!   tenants at deploy time
//!
//! The relational write and the tuple replication form one atomic unit: a
//! failed replication fails the enclosing operation, so the two stores
//! never diverge. Callers wanting an eventual-delivery path implement
//! [`replication::RelationReplicator`] over an outbox instead.

pub mod config;
pub mod dualwrite;
pub mod error;
pub mod graph;
pub mod model;
pub mod replication;
pub mod seeding;
pub mod telemetry;

pub use error::{
    DiffError, EngineError, InvariantViolation, ReplicationError, Result, TupleStoreError,
};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{EngineConfig, LoggingConfig, ReplicationConfig, SeedingConfig};
    pub use crate::dualwrite::{
        handler::DEFAULT_NAMESPACE, AssignmentChange, DualWriteHandler, GroupDualWriteHandler,
        PermissionSet, RoleMapping, Scope, ScopeBinding,
    };
    pub use crate::error::{
        DiffError, EngineError, InvariantViolation, ReplicationError, Result, TupleStoreError,
    };
    pub use crate::graph::{
        all_of, one_of, relation, resource, resource_id, resource_type, subject, subject_type,
        InMemoryTupleStore, ObjectRef, RelationTuple, RequirementMatch, TupleField, TuplePredicate,
        TupleQuery, TupleStore,
    };
    pub use crate::model::{
        Access, FilterOperation, Group, GroupId, Permission, Policy, PrincipalId,
        ResourceDefinition, Role, RoleId, Tenant, TenantId,
    };
    pub use crate::replication::{
        EventId, InMemoryRelationReplicator, NoopReplicator, RelationReplicator,
        RelationTupleSink, ReplicationEvent, ReplicationEventType, SinkError, SinkReplicator,
    };
    pub use crate::seeding::{seed_system_roles, SeedPool, SeedReport};
}
