//! Relation-graph primitives: tuples, predicate matching, and tuple stores.

pub mod predicate;
pub mod store;
pub mod tuple;

pub use predicate::{
    all_of, one_of, relation, resource, resource_id, resource_type, subject, subject_type,
    TupleField, TuplePredicate,
};
pub use store::{InMemoryTupleStore, RequirementMatch, TupleQuery, TupleStore};
pub use tuple::{ObjectRef, RelationTuple};
