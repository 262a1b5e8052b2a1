//! Tuple store and predicate algebra integration tests.
//!
//! Exercises the grouped-requirement query primitive against a mixed
//! graph (roles, bindings, workspaces, groups) the way production
//! consistency checks compose it.

use accessgraph_core::prelude::*;
use std::sync::Arc;

fn t(res: (&str, &str, &str), rel: &str, subj: (&str, &str, &str)) -> RelationTuple {
    RelationTuple::new(
        ObjectRef::new(res.0, res.1, res.2),
        rel,
        ObjectRef::new(subj.0, subj.1, subj.2),
    )
}

/// A small graph: one workspace granting two bindings, each binding
/// granting a v2 role, one binding with a group subject.
async fn seeded_store() -> Arc<InMemoryTupleStore> {
    let store = Arc::new(InMemoryTupleStore::new());
    store
        .write(vec![
            t(("rbac", "role", "v2-a"), "app1_hosts_read", ("rbac", "principal", "*")),
            t(("rbac", "role", "v2-a"), "inventory_hosts_write", ("rbac", "principal", "*")),
            t(("rbac", "role", "v2-b"), "app1_hosts_read", ("rbac", "principal", "*")),
            t(("rbac", "role_binding", "b1"), "granted", ("rbac", "role", "v2-a")),
            t(("rbac", "role_binding", "b2"), "granted", ("rbac", "role", "v2-b")),
            t(("rbac", "role_binding", "b2"), "subject", ("rbac", "group", "g1")),
            t(("rbac", "workspace", "ws_1"), "user_grant", ("rbac", "role_binding", "b1")),
            t(("rbac", "workspace", "ws_1"), "user_grant", ("rbac", "role_binding", "b2")),
            t(("rbac", "group", "g1"), "member", ("rbac", "principal", "u1")),
        ])
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn test_workspace_grants_found_by_resource_and_relation() {
    let store = seeded_store().await;

    let grants = store
        .scan(&all_of([
            resource("rbac", "workspace", "ws_1"),
            relation("user_grant"),
        ]))
        .await
        .unwrap();

    let mut bindings: Vec<&str> = grants.iter().map(|t| t.subject_id.as_str()).collect();
    bindings.sort();
    assert_eq!(bindings, ["b1", "b2"]);
}

#[tokio::test]
async fn test_binding_lookup_via_one_of_binding_ids() {
    let store = seeded_store().await;

    // Which of b1/b2 grants v2-b and binds g1? Exactly one.
    let requirements = vec![
        all_of([
            resource_type("rbac", "role_binding"),
            one_of([resource_id("b1"), resource_id("b2")]),
            relation("granted"),
            subject("rbac", "role", "v2-b"),
        ]),
        all_of([
            resource_type("rbac", "role_binding"),
            relation("subject"),
            subject("rbac", "group", "g1"),
        ]),
    ];

    let result = store
        .find_group_with_tuples(
            &requirements,
            |t| t.resource_key(),
            |g: &(String, String, String)| g.0 == "rbac" && g.1 == "role_binding",
            true,
        )
        .await
        .unwrap();

    assert_eq!(result.matched.len(), 1);
    assert_eq!(result.matched.keys().next().unwrap().2, "b2");
    // b1 grants the wrong role, so it lands in the diagnostics.
    assert_eq!(result.unmatched.len(), 1);
}

#[tokio::test]
async fn test_exact_permission_set_lookup() {
    let store = seeded_store().await;

    let exact_single = vec![all_of([
        resource_type("rbac", "role"),
        relation("app1_hosts_read"),
    ])];

    let result = store
        .find_group_with_tuples(
            &exact_single,
            |t| t.resource_key(),
            |g: &(String, String, String)| g.0 == "rbac" && g.1 == "role",
            true,
        )
        .await
        .unwrap();

    // v2-a also has the read relation but carries more, so only the
    // exact role matches.
    assert_eq!(result.matched.len(), 1);
    assert_eq!(result.matched.keys().next().unwrap().2, "v2-b");
}

#[tokio::test]
async fn test_group_membership_reachable_from_subject_index() {
    let store = seeded_store().await;

    let members = store
        .scan(&all_of([
            resource("rbac", "group", "g1"),
            relation("member"),
        ]))
        .await
        .unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].subject_id, "u1");

    let memberships = store
        .scan(&subject("rbac", "principal", "u1"))
        .await
        .unwrap();
    assert_eq!(memberships.len(), 1);
}

#[tokio::test]
async fn test_write_delete_roundtrip_preserves_unrelated_tuples() {
    let store = seeded_store().await;
    let before = store.count().await.unwrap();

    let extra = t(("rbac", "role_binding", "b3"), "granted", ("rbac", "role", "v2-a"));
    store.write(vec![extra.clone()]).await.unwrap();
    assert_eq!(store.count().await.unwrap(), before + 1);

    // Deleting the new tuple plus one already-absent tuple removes
    // exactly one.
    let absent = t(("rbac", "role_binding", "b9"), "granted", ("rbac", "role", "v2-a"));
    let removed = store.delete(vec![extra, absent]).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.count().await.unwrap(), before);
}
