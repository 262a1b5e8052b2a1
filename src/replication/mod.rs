//! Replication events and the transports that deliver them.

pub mod event;
pub mod replicator;

pub use event::{EventId, ReplicationEvent, ReplicationEventType};
pub use replicator::{
    InMemoryRelationReplicator, NoopReplicator, RelationReplicator, RelationTupleSink,
    SinkError, SinkReplicator,
};
