//! Composable matchers over relation tuples.
//!
//! A predicate is a tagged-variant tree evaluated by a single total
//! matcher, so there is no dynamic field lookup anywhere in the query
//! path. The free functions at the bottom are the vocabulary used by the
//! query engine and the dual-write diff logic: `all_of`, `one_of`, and
//! one constructor per tuple field.

use super::tuple::RelationTuple;

// ═══════════════════════════════════════════════════════════════════════════════
// Fields
// ═══════════════════════════════════════════════════════════════════════════════

/// One of the seven fields of a relation tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TupleField {
    ResourceNamespace,
    ResourceTypeName,
    ResourceId,
    Relation,
    SubjectNamespace,
    SubjectTypeName,
    SubjectId,
}

impl TupleField {
    /// Project this field out of a tuple.
    pub fn value_of<'a>(&self, tuple: &'a RelationTuple) -> &'a str {
        match self {
            Self::ResourceNamespace => &tuple.resource_type_namespace,
            Self::ResourceTypeName => &tuple.resource_type_name,
            Self::ResourceId => &tuple.resource_id,
            Self::Relation => &tuple.relation,
            Self::SubjectNamespace => &tuple.subject_type_namespace,
            Self::SubjectTypeName => &tuple.subject_type_name,
            Self::SubjectId => &tuple.subject_id,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Predicate tree
// ═══════════════════════════════════════════════════════════════════════════════

/// A composable tuple matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TuplePredicate {
    /// Every child matches. `All([])` matches everything.
    All(Vec<TuplePredicate>),
    /// At least one child matches. `Any([])` matches nothing.
    Any(Vec<TuplePredicate>),
    /// Field equals a literal.
    Equals { field: TupleField, value: String },
    /// Field is one of a set of literals.
    In {
        field: TupleField,
        values: Vec<String>,
    },
}

impl TuplePredicate {
    /// Evaluate this predicate against a tuple.
    pub fn matches(&self, tuple: &RelationTuple) -> bool {
        match self {
            Self::All(children) => children.iter().all(|p| p.matches(tuple)),
            Self::Any(children) => children.iter().any(|p| p.matches(tuple)),
            Self::Equals { field, value } => field.value_of(tuple) == value,
            Self::In { field, values } => {
                let actual = field.value_of(tuple);
                values.iter().any(|v| v == actual)
            }
        }
    }

    /// The predicate that matches every tuple.
    pub fn everything() -> Self {
        Self::All(Vec::new())
    }

    /// If this predicate pins `field` to a single literal (directly or
    /// inside a conjunction), return that literal. Used by stores for
    /// index selection.
    pub fn pinned_value(&self, field: TupleField) -> Option<&str> {
        match self {
            Self::Equals { field: f, value } if *f == field => Some(value),
            Self::All(children) => children.iter().find_map(|p| p.pinned_value(field)),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Combinators
// ═══════════════════════════════════════════════════════════════════════════════

/// Conjunction of predicates.
pub fn all_of(predicates: impl IntoIterator<Item = TuplePredicate>) -> TuplePredicate {
    TuplePredicate::All(predicates.into_iter().collect())
}

/// Disjunction of predicates.
pub fn one_of(predicates: impl IntoIterator<Item = TuplePredicate>) -> TuplePredicate {
    TuplePredicate::Any(predicates.into_iter().collect())
}

/// Match the resource type: namespace and type name.
pub fn resource_type(namespace: impl Into<String>, type_name: impl Into<String>) -> TuplePredicate {
    TuplePredicate::All(vec![
        TuplePredicate::Equals {
            field: TupleField::ResourceNamespace,
            value: namespace.into(),
        },
        TuplePredicate::Equals {
            field: TupleField::ResourceTypeName,
            value: type_name.into(),
        },
    ])
}

/// Match a fully-qualified resource.
pub fn resource(
    namespace: impl Into<String>,
    type_name: impl Into<String>,
    id: impl Into<String>,
) -> TuplePredicate {
    all_of([
        resource_type(namespace, type_name),
        resource_id(id),
    ])
}

/// Match the resource id alone.
pub fn resource_id(id: impl Into<String>) -> TuplePredicate {
    TuplePredicate::Equals {
        field: TupleField::ResourceId,
        value: id.into(),
    }
}

/// Match the relation name.
pub fn relation(name: impl Into<String>) -> TuplePredicate {
    TuplePredicate::Equals {
        field: TupleField::Relation,
        value: name.into(),
    }
}

/// Match a fully-qualified subject.
pub fn subject(
    namespace: impl Into<String>,
    type_name: impl Into<String>,
    id: impl Into<String>,
) -> TuplePredicate {
    TuplePredicate::All(vec![
        subject_type(namespace, type_name),
        TuplePredicate::Equals {
            field: TupleField::SubjectId,
            value: id.into(),
        },
    ])
}

/// Match the subject type: namespace and type name.
pub fn subject_type(namespace: impl Into<String>, type_name: impl Into<String>) -> TuplePredicate {
    TuplePredicate::All(vec![
        TuplePredicate::Equals {
            field: TupleField::SubjectNamespace,
            value: namespace.into(),
        },
        TuplePredicate::Equals {
            field: TupleField::SubjectTypeName,
            value: type_name.into(),
        },
    ])
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
