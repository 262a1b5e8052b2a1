//! Replicators: transports that deliver replication events to a tuple
//! store.
//!
//! The [`RelationReplicator`] trait is the seam between the dual-write
//! handler and whatever actually holds the graph. Three implementations
//! ship with the crate:
//!
//! - [`InMemoryRelationReplicator`] applies events directly and
//!   synchronously to an [`InMemoryTupleStore`] for deterministic tests.
//! - [`SinkReplicator`] forwards events to an opaque, durable
//!   [`RelationTupleSink`] (the remote relation service) with bounded
//!   retries. Idempotency under duplicate delivery comes from the event
//!   id plus the sink's set semantics.
//! - [`NoopReplicator`] discards events; used when replication is
//!   disabled by configuration.
//!
//! A caller that wants an eventual-consistency delivery path (outbox
//! table, on-commit hook) implements [`RelationReplicator`] itself and
//! records the event instead of forwarding it.

use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::event::ReplicationEvent;
use crate::error::ReplicationError;
use crate::graph::store::{InMemoryTupleStore, TupleStore};

// ═══════════════════════════════════════════════════════════════════════════════
// Replicator contract
// ═══════════════════════════════════════════════════════════════════════════════

/// Delivers a replication event as one atomic unit, or fails.
#[async_trait]
pub trait RelationReplicator: Send + Sync {
    async fn replicate(&self, event: ReplicationEvent) -> Result<(), ReplicationError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-memory replicator
// ═══════════════════════════════════════════════════════════════════════════════

/// Applies events directly to an in-memory store. Deterministic and
/// synchronous; the variant the test harness uses.
#[derive(Debug, Clone)]
pub struct InMemoryRelationReplicator {
    store: Arc<InMemoryTupleStore>,
}

impl InMemoryRelationReplicator {
    pub fn new(store: Arc<InMemoryTupleStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RelationReplicator for InMemoryRelationReplicator {
    async fn replicate(&self, event: ReplicationEvent) -> Result<(), ReplicationError> {
        let map_err = |e: crate::error::TupleStoreError| ReplicationError::Rejected {
            event_id: event.event_id.0,
            reason: e.to_string(),
        };

        let removed = self
            .store
            .delete(event.remove.clone())
            .await
            .map_err(map_err)?;
        let added = self.store.write(event.add.clone()).await.map_err(map_err)?;

        debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            added,
            removed,
            "Applied replication event to in-memory store"
        );
        counter!(
            "accessgraph_replicated_events_total",
            "type" => event.event_type.as_str(),
            "transport" => "in_memory",
        )
        .increment(1);

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Sink-backed replicator
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure reported by a [`RelationTupleSink`].
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SinkError {
    message: String,
    retryable: bool,
}

impl SinkError {
    /// A failure that may succeed on retry (connection loss, timeout).
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure that retrying cannot fix (rejected payload).
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// An opaque durable write sink for tuple diffs: the boundary to the
/// remote relation service. The concrete transport is out of scope here;
/// implementations must apply `event.remove` then `event.add` atomically
/// and treat `event.event_id` as an idempotency key.
#[async_trait]
pub trait RelationTupleSink: Send + Sync {
    async fn apply(&self, event: &ReplicationEvent) -> Result<(), SinkError>;
}

/// Forwards events to a [`RelationTupleSink`] with bounded retries and a
/// linear backoff between attempts.
pub struct SinkReplicator<T: RelationTupleSink> {
    sink: T,
    max_attempts: u32,
    backoff: Duration,
}

impl<T: RelationTupleSink> SinkReplicator<T> {
    pub fn new(sink: T) -> Self {
        Self {
            sink,
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Apply the retry policy from configuration.
    pub fn with_config(self, config: &crate::config::ReplicationConfig) -> Self {
        self.with_max_attempts(config.max_attempts)
            .with_backoff(config.retry_backoff())
    }
}

#[async_trait]
impl<T: RelationTupleSink> RelationReplicator for SinkReplicator<T> {
    async fn replicate(&self, event: ReplicationEvent) -> Result<(), ReplicationError> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match self.sink.apply(&event).await {
                Ok(()) => {
                    debug!(
                        event_id = %event.event_id,
                        event_type = %event.event_type,
                        attempt,
                        tuples = event.tuple_count(),
                        "Replication event delivered"
                    );
                    counter!(
                        "accessgraph_replicated_events_total",
                        "type" => event.event_type.as_str(),
                        "transport" => "sink",
                    )
                    .increment(1);
                    return Ok(());
                }
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        event_id = %event.event_id,
                        attempt,
                        error = %err,
                        "Replication delivery failed, retrying"
                    );
                    last_error = err.to_string();
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(err) if !err.is_retryable() => {
                    counter!("accessgraph_replication_failures_total", "kind" => "rejected")
                        .increment(1);
                    return Err(ReplicationError::Rejected {
                        event_id: event.event_id.0,
                        reason: err.to_string(),
                    });
                }
                Err(err) => {
                    last_error = err.to_string();
                }
            }
        }

        counter!("accessgraph_replication_failures_total", "kind" => "delivery").increment(1);
        Err(ReplicationError::DeliveryFailed {
            event_id: event.event_id.0,
            attempts: self.max_attempts,
            reason: last_error,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Noop replicator
// ═══════════════════════════════════════════════════════════════════════════════

/// Discards every event. Installed when replication is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReplicator;

#[async_trait]
impl RelationReplicator for NoopReplicator {
    async fn replicate(&self, event: ReplicationEvent) -> Result<(), ReplicationError> {
        trace!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            "Replication disabled, dropping event"
        );
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tuple::{ObjectRef, RelationTuple};
    use crate::replication::event::ReplicationEventType;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn sample_event() -> ReplicationEvent {
        ReplicationEvent::new(
            ReplicationEventType::CreateCustomRole,
            "r1",
            vec![
                RelationTuple::new(
                    ObjectRef::new("rbac", "role", "v2-1"),
                    "app1_hosts_read",
                    ObjectRef::new("rbac", "principal", "*"),
                ),
                RelationTuple::new(
                    ObjectRef::new("rbac", "role_binding", "b1"),
                    "granted",
                    ObjectRef::new("rbac", "role", "v2-1"),
                ),
            ],
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn test_in_memory_apply() {
        let store = Arc::new(InMemoryTupleStore::new());
        let replicator = InMemoryRelationReplicator::new(store.clone());

        replicator.replicate(sample_event()).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reapplying_a_diff_is_idempotent() {
        let store = Arc::new(InMemoryTupleStore::new());
        let replicator = InMemoryRelationReplicator::new(store.clone());

        let event = sample_event();
        replicator.replicate(event.clone()).await.unwrap();
        let first = store.snapshot();

        replicator.replicate(event).await.unwrap();
        assert_eq!(store.snapshot(), first);
    }

    struct FlakySink {
        failures_left: AtomicU32,
        applied: Arc<InMemoryTupleStore>,
    }

    #[async_trait]
    impl RelationTupleSink for FlakySink {
        async fn apply(&self, event: &ReplicationEvent) -> Result<(), SinkError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(SinkError::transient("connection reset"));
            }
            self.applied
                .delete(event.remove.clone())
                .await
                .map_err(|e| SinkError::permanent(e.to_string()))?;
            self.applied
                .write(event.add.clone())
                .await
                .map_err(|e| SinkError::permanent(e.to_string()))?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_retries_transient_failures() {
        let store = Arc::new(InMemoryTupleStore::new());
        let replicator = SinkReplicator::new(FlakySink {
            failures_left: AtomicU32::new(2),
            applied: store.clone(),
        })
        .with_max_attempts(3)
        .with_backoff(Duration::from_millis(1));

        replicator.replicate(sample_event()).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sink_gives_up_after_max_attempts() {
        let store = Arc::new(InMemoryTupleStore::new());
        let replicator = SinkReplicator::new(FlakySink {
            failures_left: AtomicU32::new(10),
            applied: store.clone(),
        })
        .with_max_attempts(2)
        .with_backoff(Duration::from_millis(1));

        let err = replicator.replicate(sample_event()).await.unwrap_err();
        assert!(matches!(
            err,
            ReplicationError::DeliveryFailed { attempts: 2, .. }
        ));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    struct RejectingSink;

    #[async_trait]
    impl RelationTupleSink for RejectingSink {
        async fn apply(&self, _event: &ReplicationEvent) -> Result<(), SinkError> {
            Err(SinkError::permanent("schema mismatch"))
        }
    }

    #[tokio::test]
    async fn test_sink_does_not_retry_permanent_failures() {
        let replicator = SinkReplicator::new(RejectingSink).with_max_attempts(5);
        let err = replicator.replicate(sample_event()).await.unwrap_err();
        assert!(matches!(err, ReplicationError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_noop_discards() {
        NoopReplicator.replicate(sample_event()).await.unwrap();
    }
}
