//! Bootstrap and wiring
//!
//! [`initialize`] loads the initial tenant set, picks a resolver and
//! optionally starts the reconciler. The returned [`TenantRuntime`] is the
//! object request handlers hold on to.

use crate::error::{RegistryError, Result};
use crate::pool::DatabaseDriver;
use crate::reconcile::{ReconcileReport, ReconcileStrategy, Reconciler, ReconcilerHandle};
use crate::registry::ConnectionRegistry;
use crate::resolver::{HeaderTenantResolver, RequestContext, TenantResolver};
use crate::topology::TopologyProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Background reconciliation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoSync {
    Disabled,
    Enabled {
        interval: Duration,
        strategy: ReconcileStrategy,
    },
}

impl AutoSync {
    pub fn every(interval: Duration) -> Self {
        AutoSync::Enabled {
            interval,
            strategy: ReconcileStrategy::default(),
        }
    }
}

pub struct TenantRuntime<D: DatabaseDriver> {
    registry: Arc<ConnectionRegistry<D>>,
    provider: Arc<dyn TopologyProvider>,
    resolver: Arc<dyn TenantResolver>,
    strategy: ReconcileStrategy,
    reconciler: Mutex<Option<ReconcilerHandle>>,
}

/// Register every tenant the provider currently lists, then start the
/// reconciler if asked to.
///
/// Bootstrap is fail-fast: the first tenant that cannot be added aborts
/// initialization. The reconciler is spawned without waiting for its
/// first pass.
pub async fn initialize<D: DatabaseDriver>(
    registry: Arc<ConnectionRegistry<D>>,
    provider: Option<Arc<dyn TopologyProvider>>,
    resolver: Option<Arc<dyn TenantResolver>>,
    auto_sync: AutoSync,
) -> Result<TenantRuntime<D>> {
    let provider = provider.ok_or(RegistryError::MissingProvider)?;
    let resolver = resolver.unwrap_or_else(|| Arc::new(HeaderTenantResolver::default()));

    let tenants = provider.fetch().await?;
    info!("Bootstrapping {} tenants", tenants.len());

    for tenant in tenants {
        registry.add(tenant).await?;
    }

    let (strategy, reconciler) = match auto_sync {
        AutoSync::Disabled => (ReconcileStrategy::default(), None),
        AutoSync::Enabled { interval, strategy } => {
            let handle = Reconciler::new(registry.clone(), provider.clone())
                .with_interval(interval)
                .with_strategy(strategy)
                .spawn(CancellationToken::new());
            (strategy, Some(handle))
        }
    };

    info!("Tenant registry ready with {} connections", registry.size());

    Ok(TenantRuntime {
        registry,
        provider,
        resolver,
        strategy,
        reconciler: Mutex::new(reconciler),
    })
}

impl<D: DatabaseDriver> TenantRuntime<D> {
    pub fn registry(&self) -> &Arc<ConnectionRegistry<D>> {
        &self.registry
    }

    pub fn resolver(&self) -> &Arc<dyn TenantResolver> {
        &self.resolver
    }

    /// Resolve the tenant of a request and return its connection
    pub fn connection_for(&self, ctx: &RequestContext) -> Result<D::Handle> {
        let tenant_id = self
            .resolver
            .resolve(ctx)
            .ok_or(RegistryError::TenantUnresolved)?;
        self.registry.get_by_tenant_id(&tenant_id)
    }

    /// Run one reconciliation pass right away, independent of the
    /// background loop.
    pub async fn reconcile_now(&self) -> ReconcileReport {
        Reconciler::new(self.registry.clone(), self.provider.clone())
            .with_strategy(self.strategy)
            .run_once()
            .await
    }

    pub async fn is_syncing(&self) -> bool {
        self.reconciler
            .lock()
            .await
            .as_ref()
            .map(ReconcilerHandle::is_running)
            .unwrap_or(false)
    }

    /// Stop the reconciler. Registered connections stay usable.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.reconciler.lock().await.take() {
            handle.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::SchemaDescriptor;
    use crate::tenant::{ConnectionInfo, TenantId};
    use crate::testing::RecordingDriver;
    use crate::topology::StaticTopology;

    fn tenant(id: &str) -> ConnectionInfo {
        ConnectionInfo::new(id, format!("postgres://db/{}", id))
    }

    fn registry() -> Arc<ConnectionRegistry<RecordingDriver>> {
        Arc::new(ConnectionRegistry::new(RecordingDriver::new()))
    }

    #[tokio::test]
    async fn test_missing_provider() {
        let err = initialize(registry(), None, None, AutoSync::Disabled)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::MissingProvider);
    }

    #[tokio::test]
    async fn test_bootstrap_adds_all_tenants_with_schemas() {
        let registry = registry();
        registry
            .schemas()
            .register(SchemaDescriptor::new("users", "CREATE TABLE users ();"))
            .await
            .unwrap();
        let provider = Arc::new(StaticTopology::new(vec![tenant("t1"), tenant("t2")]));

        let runtime = initialize(registry.clone(), Some(provider), None, AutoSync::Disabled)
            .await
            .unwrap();

        assert_eq!(runtime.registry().size(), 2);
        assert_eq!(registry.driver().applied_to("postgres://db/t2"), vec!["users"]);
        assert!(!runtime.is_syncing().await);
    }

    #[tokio::test]
    async fn test_bootstrap_is_fail_fast() {
        let registry = registry();
        registry.driver().fail_open("postgres://db/t2");
        let provider = Arc::new(StaticTopology::new(vec![tenant("t1"), tenant("t2"), tenant("t3")]));

        let err = initialize(registry.clone(), Some(provider), None, AutoSync::Disabled)
            .await
            .err()
            .unwrap();

        assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
        assert!(registry.contains(&TenantId::from("t1")));
        assert!(!registry.contains(&TenantId::from("t3")));
    }

    #[tokio::test]
    async fn test_connection_for_uses_default_resolver() {
        let provider = Arc::new(StaticTopology::new(vec![tenant("t1")]));
        let runtime = initialize(registry(), Some(provider), None, AutoSync::Disabled)
            .await
            .unwrap();

        let handle = runtime
            .connection_for(&RequestContext::new().with("x-tenant-id", "t1"))
            .unwrap();
        assert_eq!(handle.dsn, "postgres://db/t1");

        let err = runtime.connection_for(&RequestContext::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TenantUnresolved);

        let err = runtime
            .connection_for(&RequestContext::new().with("x-tenant-id", "t9"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_custom_resolver() {
        let provider = Arc::new(StaticTopology::new(vec![tenant("acme")]));
        let resolver: Arc<dyn TenantResolver> = Arc::new(|ctx: &RequestContext| {
            ctx.get("host")
                .and_then(|h| h.split('.').next())
                .map(TenantId::from)
        });

        let runtime = initialize(registry(), Some(provider), Some(resolver), AutoSync::Disabled)
            .await
            .unwrap();

        assert!(runtime
            .connection_for(&RequestContext::new().with("Host", "acme.example.com"))
            .is_ok());
    }

    #[tokio::test]
    async fn test_auto_sync_starts_and_shuts_down() {
        let provider = Arc::new(StaticTopology::new(vec![tenant("t1")]));
        let runtime = initialize(
            registry(),
            Some(provider.clone()),
            None,
            AutoSync::every(Duration::from_millis(10)),
        )
        .await
        .unwrap();
        assert!(runtime.is_syncing().await);

        provider.push(tenant("t2")).await;
        for _ in 0..200 {
            if runtime.registry().size() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(runtime.registry().size(), 2);

        runtime.shutdown().await;
        assert!(!runtime.is_syncing().await);
    }

    #[tokio::test]
    async fn test_reconcile_now() {
        let provider = Arc::new(StaticTopology::new(vec![tenant("t1")]));
        let runtime = initialize(registry(), Some(provider.clone()), None, AutoSync::Disabled)
            .await
            .unwrap();

        provider.push(tenant("t2")).await;
        let report = runtime.reconcile_now().await;

        assert_eq!(report.added, 1);
        assert_eq!(runtime.registry().size(), 2);
    }
}
