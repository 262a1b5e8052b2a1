//! Deploy-time seeding of system roles across tenants.
//!
//! Seeding walks an explicit tenant list and replicates the platform's
//! system roles into each tenant's default workspace through the same
//! dual-write handler the request path uses. Concurrency is bounded by a
//! semaphore pool: a permit is acquired before a tenant's task starts and
//! released when it finishes, and a terminal per-tenant completion
//! callback fires whether the task succeeded or failed.
//!
//! Re-running seeding is idempotent: unchanged roles resolve to their
//! existing v2 roles and bindings, and the store's set semantics absorb
//! duplicate writes.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::dualwrite::handler::DualWriteHandler;
use crate::error::EngineError;
use crate::graph::store::TupleStore;
use crate::model::{Role, Tenant, TenantId};
use crate::replication::event::ReplicationEventType;
use crate::replication::replicator::RelationReplicator;

// ═══════════════════════════════════════════════════════════════════════════════
// Pool
// ═══════════════════════════════════════════════════════════════════════════════

/// Bounded concurrency for per-tenant seeding tasks.
pub struct SeedPool {
    semaphore: Arc<Semaphore>,
    max_workers: usize,
}

impl SeedPool {
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    pub fn from_config(config: &crate::config::SeedingConfig) -> Self {
        Self::new(config.max_workers)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Report
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of one seeding run.
#[derive(Debug, Default)]
pub struct SeedReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Tenants that failed, with the rendered error.
    pub failures: Vec<(TenantId, String)>,
}

impl SeedReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Seeding
// ═══════════════════════════════════════════════════════════════════════════════

/// Seed `roles` into every tenant in `tenants`.
///
/// One task per tenant, bounded by `pool`. `on_complete` runs after each
/// tenant finishes, with the tenant and its result. A tenant failure does
/// not stop the run; the report carries every failure.
pub async fn seed_system_roles<S, R, C>(
    pool: &SeedPool,
    tenants: Vec<Tenant>,
    roles: Vec<Role>,
    store: Arc<S>,
    replicator: Arc<R>,
    on_complete: C,
) -> SeedReport
where
    S: TupleStore + 'static,
    R: RelationReplicator + 'static,
    C: Fn(&Tenant, &Result<(), EngineError>) + Send + Sync + 'static,
{
    let total = tenants.len();
    let roles = Arc::new(roles);
    let on_complete = Arc::new(on_complete);
    let mut tasks: JoinSet<(TenantId, Result<(), EngineError>)> = JoinSet::new();

    for (index, tenant) in tenants.into_iter().enumerate() {
        let permit = match pool.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Seed pool closed, stopping task submission");
                break;
            }
        };

        let roles = roles.clone();
        let store = store.clone();
        let replicator = replicator.clone();
        let on_complete = on_complete.clone();

        tasks.spawn(async move {
            // Permit scopes the tenant's resource usage; released on drop.
            let _permit = permit;

            info!(
                tenant = %tenant.id,
                org_id = %tenant.org_id,
                "Seeding system roles for tenant [{} of {}]",
                index + 1,
                total
            );

            let result = seed_tenant(&tenant, &roles, store.as_ref(), replicator.as_ref()).await;

            match &result {
                Ok(()) => info!(
                    tenant = %tenant.id,
                    "Finished seeding system roles for tenant [{} of {}]",
                    index + 1,
                    total
                ),
                Err(err) => error!(tenant = %tenant.id, error = %err, "Tenant seeding failed"),
            }

            on_complete(&tenant, &result);
            (tenant.id.clone(), result)
        });
    }

    let mut report = SeedReport {
        total,
        ..Default::default()
    };
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(()))) => report.succeeded += 1,
            Ok((tenant_id, Err(err))) => {
                report.failed += 1;
                report.failures.push((tenant_id, err.to_string()));
            }
            Err(join_err) => {
                report.failed += 1;
                error!(error = %join_err, "Seeding task aborted");
            }
        }
    }
    report
}

async fn seed_tenant<S: TupleStore, R: RelationReplicator>(
    tenant: &Tenant,
    roles: &[Role],
    store: &S,
    replicator: &R,
) -> Result<(), EngineError> {
    for role in roles {
        let mut handler = DualWriteHandler::for_system_role_event(
            role,
            tenant,
            ReplicationEventType::CreateTenantSystemRole,
            store,
            replicator,
        );
        handler.replicate_new_or_updated_role(role).await?;
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::predicate::{all_of, relation, resource};
    use crate::graph::store::InMemoryTupleStore;
    use crate::model::{Access, Permission};
    use crate::replication::replicator::InMemoryRelationReplicator;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn system_role(id: &str, perms: &[&str]) -> Role {
        Role::system(id, id).with_access(
            perms
                .iter()
                .map(|p| Access::unscoped(Permission::parse(p).unwrap()))
                .collect(),
        )
    }

    fn tenants(n: usize) -> Vec<Tenant> {
        (0..n)
            .map(|i| Tenant::new(format!("t{i}"), format!("tenant-{i}"), format!("org-{i}")))
            .collect()
    }

    #[tokio::test]
    async fn test_seeding_grants_each_tenant_workspace() {
        let store = Arc::new(InMemoryTupleStore::new());
        let replicator = Arc::new(InMemoryRelationReplicator::new(store.clone()));
        let pool = SeedPool::new(1);

        let roles = vec![
            system_role("sys-viewer", &["app1:hosts:read"]),
            system_role("sys-editor", &["app1:hosts:read", "inventory:hosts:write"]),
        ];

        let report = seed_system_roles(
            &pool,
            tenants(3),
            roles,
            store.clone(),
            replicator,
            |_, _| {},
        )
        .await;

        assert!(report.is_clean());
        assert_eq!(report.succeeded, 3);

        // Every tenant workspace carries a user_grant per seeded role.
        for i in 0..3 {
            let grants = store
                .scan(&all_of([
                    resource("rbac", "workspace", format!("org-{i}")),
                    relation("user_grant"),
                ]))
                .await
                .unwrap();
            assert_eq!(grants.len(), 2, "tenant org-{i} missing role bindings");
        }

        // Distinct permission sets produce one v2 role each, shared by
        // all tenants: 3 permission tuples, 6 bindings of 2 tuples each.
        assert_eq!(store.count().await.unwrap(), 3 + 12);
    }

    #[tokio::test]
    async fn test_seeding_is_idempotent() {
        let store = Arc::new(InMemoryTupleStore::new());
        let replicator = Arc::new(InMemoryRelationReplicator::new(store.clone()));
        let pool = SeedPool::new(1);
        let roles = vec![system_role("sys-viewer", &["app1:hosts:read"])];

        seed_system_roles(
            &pool,
            tenants(2),
            roles.clone(),
            store.clone(),
            replicator.clone(),
            |_, _| {},
        )
        .await;
        let first = store.snapshot();

        seed_system_roles(&pool, tenants(2), roles, store.clone(), replicator, |_, _| {}).await;
        assert_eq!(store.snapshot(), first);
    }

    #[tokio::test]
    async fn test_completion_callback_fires_per_tenant() {
        let store = Arc::new(InMemoryTupleStore::new());
        let replicator = Arc::new(InMemoryRelationReplicator::new(store.clone()));
        let pool = SeedPool::new(4);
        let completions = Arc::new(AtomicUsize::new(0));

        let counter = completions.clone();
        let report = seed_system_roles(
            &pool,
            tenants(5),
            vec![system_role("sys-viewer", &["app1:hosts:read"])],
            store,
            replicator,
            move |_, result| {
                assert!(result.is_ok());
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await;

        assert_eq!(report.total, 5);
        assert_eq!(completions.load(Ordering::SeqCst), 5);
        assert_eq!(pool.available_permits(), pool.max_workers());
    }
}
