//! Error types for the dual-write engine.
//!
//! Three kinds of failure are surfaced to callers, none recovered silently:
//!
//! - [`DiffError`]: permission-model state could not be translated into a
//!   tuple diff. Fatal to the enclosing write; raised before any tuple
//!   mutation is issued.
//! - [`ReplicationError`]: the transport failed to deliver a replication
//!   event. Propagated so the enclosing transaction can roll back the
//!   primary-store change.
//! - [`InvariantViolation`]: a programming-contract violation (bad
//!   prepare/replicate pairing, a diff that would orphan a still-referenced
//!   role). Treated as fatal, never retried.

use thiserror::Error;
use uuid::Uuid;

/// A specialized Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Diff computation
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors raised while computing a tuple diff from permission-model state.
#[derive(Debug, Error)]
pub enum DiffError {
    /// An access entry carries an attribute filter that does not resolve to
    /// a workspace.
    #[error("access entry for {permission} has no resolvable workspace scope: {reason}")]
    UnresolvableScope { permission: String, reason: String },

    /// A custom role without a tenant cannot anchor its default workspace.
    #[error("role {role} has no tenant organization to anchor its default workspace")]
    MissingDefaultWorkspace { role: String },

    /// The consistent read of current graph state failed.
    #[error("failed to read current graph state: {0}")]
    StateRead(#[from] TupleStoreError),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Replication transport
// ═══════════════════════════════════════════════════════════════════════════════

/// Transport failure while delivering a replication event.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// Delivery kept failing transiently until the retry budget ran out.
    #[error("replication of event {event_id} failed after {attempts} attempt(s): {reason}")]
    DeliveryFailed {
        event_id: Uuid,
        attempts: u32,
        reason: String,
    },

    /// The sink refused the event outright; retrying cannot help.
    #[error("replication sink rejected event {event_id}: {reason}")]
    Rejected { event_id: Uuid, reason: String },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Contract violations
// ═══════════════════════════════════════════════════════════════════════════════

/// Programming-contract violations detected by the dual-write handler.
#[derive(Debug, Error)]
pub enum InvariantViolation {
    #[error("prepare_for_update called twice for role {role} without an intervening replicate")]
    AlreadyPrepared { role: String },

    #[error("update for role {role} replicated without a prior prepare_for_update snapshot")]
    MissingSnapshot { role: String },

    /// The computed diff would delete role tuples that another, surviving
    /// binding still grants.
    #[error("diff for role {role} would delete v2 role {v2_role} still granted by binding {binding}")]
    WouldOrphanReferencedRole {
        role: String,
        v2_role: String,
        binding: String,
    },

    /// An operation was invoked on a handler built for a different event kind.
    #[error("operation {operation} is not valid for a handler created with event type {event_type}")]
    UnexpectedEventType {
        operation: &'static str,
        event_type: String,
    },

    /// The replicated role is not the role the handler was created for.
    #[error("handler for role {expected} was given role {actual}")]
    RoleMismatch { expected: String, actual: String },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tuple store backends
// ═══════════════════════════════════════════════════════════════════════════════

/// Failures surfaced by a tuple store backend.
#[derive(Debug, Error)]
pub enum TupleStoreError {
    #[error("tuple store backend unavailable: {0}")]
    Unavailable(String),

    #[error("tuple store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Unified error
// ═══════════════════════════════════════════════════════════════════════════════

/// The unified error type surfaced by every engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Replication(#[from] ReplicationError),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

impl EngineError {
    /// Whether retrying the failed operation can succeed.
    ///
    /// Only transport failures are retryable; diff errors reflect bad input
    /// and invariant violations reflect a bug in the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Replication(ReplicationError::DeliveryFailed { .. })
        )
    }

    /// Error category for logging and metrics labels.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Diff(_) => "diff",
            Self::Replication(_) => "replication",
            Self::Invariant(_) => "invariant",
        }
    }
}

impl From<TupleStoreError> for EngineError {
    fn from(error: TupleStoreError) -> Self {
        Self::Diff(DiffError::StateRead(error))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        let delivery = EngineError::Replication(ReplicationError::DeliveryFailed {
            event_id: Uuid::new_v4(),
            attempts: 3,
            reason: "connection reset".into(),
        });
        assert!(delivery.is_retryable());

        let rejected = EngineError::Replication(ReplicationError::Rejected {
            event_id: Uuid::new_v4(),
            reason: "schema mismatch".into(),
        });
        assert!(!rejected.is_retryable());

        let invariant = EngineError::Invariant(InvariantViolation::MissingSnapshot {
            role: "r1".into(),
        });
        assert!(!invariant.is_retryable());
    }

    #[test]
    fn test_categories() {
        let diff = EngineError::Diff(DiffError::MissingDefaultWorkspace { role: "r1".into() });
        assert_eq!(diff.category(), "diff");

        let store: EngineError = TupleStoreError::Unavailable("down".into()).into();
        assert_eq!(store.category(), "diff");
    }

    #[test]
    fn test_display_carries_context() {
        let err = DiffError::UnresolvableScope {
            permission: "app1:hosts:read".into(),
            reason: "unsupported filter key".into(),
        };
        let text = err.to_string();
        assert!(text.contains("app1:hosts:read"));
        assert!(text.contains("unsupported filter key"));
    }
}
