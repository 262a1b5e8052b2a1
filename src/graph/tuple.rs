//! Relation tuples: the atomic facts of the authorization graph.
//!
//! The wire shape is seven string fields and must stay exactly this shape
//! for compatibility with the relationship-check engine that consumes the
//! graph. A tuple's identity is its full value; there is no separate id,
//! and tuples are never mutated in place.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed reference to a graph object: `namespace/type_name:id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub namespace: String,
    pub type_name: String,
    pub id: String,
}

impl ObjectRef {
    pub fn new(
        namespace: impl Into<String>,
        type_name: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            type_name: type_name.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.type_name, self.id)
    }
}

/// An immutable atomic fact: a `resource`, a `relation`, and the
/// `subject` the relation points at.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationTuple {
    pub resource_type_namespace: String,
    pub resource_type_name: String,
    pub resource_id: String,
    pub relation: String,
    pub subject_type_namespace: String,
    pub subject_type_name: String,
    pub subject_id: String,
}

impl RelationTuple {
    pub fn new(resource: ObjectRef, relation: impl Into<String>, subject: ObjectRef) -> Self {
        Self {
            resource_type_namespace: resource.namespace,
            resource_type_name: resource.type_name,
            resource_id: resource.id,
            relation: relation.into(),
            subject_type_namespace: subject.namespace,
            subject_type_name: subject.type_name,
            subject_id: subject.id,
        }
    }

    /// The resource side as an owned reference.
    pub fn resource(&self) -> ObjectRef {
        ObjectRef::new(
            self.resource_type_namespace.clone(),
            self.resource_type_name.clone(),
            self.resource_id.clone(),
        )
    }

    /// The subject side as an owned reference.
    pub fn subject(&self) -> ObjectRef {
        ObjectRef::new(
            self.subject_type_namespace.clone(),
            self.subject_type_name.clone(),
            self.subject_id.clone(),
        )
    }

    /// Grouping key for the resource side: `(namespace, type_name, id)`.
    pub fn resource_key(&self) -> (String, String, String) {
        (
            self.resource_type_namespace.clone(),
            self.resource_type_name.clone(),
            self.resource_id.clone(),
        )
    }

    /// Grouping key for the subject side: `(namespace, type_name, id)`.
    pub fn subject_key(&self) -> (String, String, String) {
        (
            self.subject_type_namespace.clone(),
            self.subject_type_name.clone(),
            self.subject_id.clone(),
        )
    }
}

impl fmt::Display for RelationTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}:{}#{}@{}/{}:{}",
            self.resource_type_namespace,
            self.resource_type_name,
            self.resource_id,
            self.relation,
            self.subject_type_namespace,
            self.subject_type_name,
            self.subject_id,
        )
    }
}
