//! Topology reconciliation
//!
//! Periodically re-reads the tenant topology and adds tenants the registry
//! does not know yet. Tenants that disappear from the topology are never
//! removed.

use crate::pool::DatabaseDriver;
use crate::registry::{AddOutcome, ConnectionRegistry};
use crate::topology::TopologyProvider;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(300);

/// How a pass decides whether the topology changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileStrategy {
    /// Attempt adds only when the tenant count differs from the registry
    /// size. Misses same-count churn.
    #[default]
    CountCheck,
    /// Attempt adds for every fetched tenant the registry does not hold.
    SetDifference,
}

impl FromStr for ReconcileStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "count" | "count_check" => Ok(ReconcileStrategy::CountCheck),
            "set" | "set_difference" => Ok(ReconcileStrategy::SetDifference),
            other => Err(format!("Unknown reconcile strategy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub fetched: usize,
    pub known: usize,
    pub attempted: usize,
    pub added: usize,
    pub failed: usize,
}

pub struct Reconciler<D: DatabaseDriver> {
    registry: Arc<ConnectionRegistry<D>>,
    provider: Arc<dyn TopologyProvider>,
    interval: Duration,
    strategy: ReconcileStrategy,
}

impl<D: DatabaseDriver> Reconciler<D> {
    pub fn new(registry: Arc<ConnectionRegistry<D>>, provider: Arc<dyn TopologyProvider>) -> Self {
        Self {
            registry,
            provider,
            interval: DEFAULT_SYNC_INTERVAL,
            strategy: ReconcileStrategy::default(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_strategy(mut self, strategy: ReconcileStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// One reconciliation pass. Individual add failures are counted and
    /// logged, never propagated.
    pub async fn run_once(&self) -> ReconcileReport {
        self.run_pass(&CancellationToken::new()).await
    }

    /// Cancellation is honoured while fetching and between tenants, never
    /// inside an add, so an opened connection is always either registered
    /// or closed.
    async fn run_pass(&self, token: &CancellationToken) -> ReconcileReport {
        let fetched = tokio::select! {
            _ = token.cancelled() => return ReconcileReport::default(),
            fetched = self.provider.fetch() => fetched,
        };

        let tenants = match fetched {
            Ok(tenants) => tenants,
            Err(e) => {
                warn!("Topology fetch failed, skipping pass: {}", e);
                return ReconcileReport::default();
            }
        };

        let mut report = ReconcileReport {
            fetched: tenants.len(),
            known: self.registry.size(),
            ..Default::default()
        };

        let candidates: Vec<_> = match self.strategy {
            ReconcileStrategy::CountCheck => {
                if report.fetched == report.known {
                    debug!("Topology size unchanged ({}), nothing to do", report.known);
                    return report;
                }
                tenants
            }
            ReconcileStrategy::SetDifference => tenants
                .into_iter()
                .filter(|t| !self.registry.contains(&t.tenant_id))
                .collect(),
        };

        for tenant in candidates {
            if token.is_cancelled() {
                debug!("Reconcile pass cancelled after {} tenants", report.attempted);
                break;
            }
            report.attempted += 1;
            let tenant_id = tenant.tenant_id.clone();
            match self.registry.add(tenant).await {
                Ok(AddOutcome::Added) => report.added += 1,
                Ok(AddOutcome::AlreadyPresent) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!("Reconcile could not add tenant {}: {}", tenant_id, e);
                }
            }
        }

        if report.added > 0 || report.failed > 0 {
            info!(
                "Reconcile pass: {} fetched, {} added, {} failed",
                report.fetched, report.added, report.failed
            );
        }

        report
    }

    /// Run passes until `token` is cancelled. The first pass starts
    /// immediately.
    pub fn spawn(self, token: CancellationToken) -> ReconcilerHandle {
        let loop_token = token.clone();
        let period = self.interval;

        let task = tokio::spawn(async move {
            info!("Reconciler started (every {:?}, {:?})", period, self.strategy);
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                self.run_pass(&loop_token).await;
            }

            info!("Reconciler stopped");
        });

        ReconcilerHandle { token, task }
    }
}

/// Handle to a running reconciler task
pub struct ReconcilerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancel the loop and wait for it to exit
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!("Reconciler task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RegistryError, Result};
    use crate::tenant::{ConnectionInfo, TenantId};
    use crate::testing::RecordingDriver;
    use crate::topology::StaticTopology;
    use async_trait::async_trait;

    fn tenant(id: &str) -> ConnectionInfo {
        ConnectionInfo::new(id, format!("postgres://db/{}", id))
    }

    fn setup(
        strategy: ReconcileStrategy,
        tenants: Vec<ConnectionInfo>,
    ) -> (Arc<ConnectionRegistry<RecordingDriver>>, Arc<StaticTopology>, Reconciler<RecordingDriver>) {
        let registry = Arc::new(ConnectionRegistry::new(RecordingDriver::new()));
        let topology = Arc::new(StaticTopology::new(tenants));
        let reconciler = Reconciler::new(registry.clone(), topology.clone()).with_strategy(strategy);
        (registry, topology, reconciler)
    }

    #[tokio::test]
    async fn test_count_check_adds_new_tenant_once() {
        let (registry, topology, reconciler) =
            setup(ReconcileStrategy::CountCheck, vec![tenant("t1"), tenant("t2")]);

        let first = reconciler.run_once().await;
        assert_eq!(first.added, 2);
        assert_eq!(registry.size(), 2);

        topology.push(tenant("t3")).await;
        let second = reconciler.run_once().await;
        assert_eq!(second.fetched, 3);
        assert_eq!(second.known, 2);
        assert_eq!(second.attempted, 3);
        assert_eq!(second.added, 1);
        assert!(registry.contains(&TenantId::from("t3")));

        let third = reconciler.run_once().await;
        assert_eq!(third.attempted, 0);
        assert_eq!(registry.driver().open_count(), 3);
    }

    #[tokio::test]
    async fn test_count_check_misses_same_size_churn() {
        let (registry, topology, reconciler) =
            setup(ReconcileStrategy::CountCheck, vec![tenant("t1"), tenant("t2")]);
        reconciler.run_once().await;

        topology.replace(vec![tenant("t1"), tenant("t9")]).await;
        let report = reconciler.run_once().await;

        assert_eq!(report.attempted, 0);
        assert!(!registry.contains(&TenantId::from("t9")));
    }

    #[tokio::test]
    async fn test_set_difference_catches_same_size_churn() {
        let (registry, topology, reconciler) =
            setup(ReconcileStrategy::SetDifference, vec![tenant("t1"), tenant("t2")]);
        reconciler.run_once().await;

        topology.replace(vec![tenant("t1"), tenant("t9")]).await;
        let report = reconciler.run_once().await;

        assert_eq!(report.attempted, 1);
        assert_eq!(report.added, 1);
        assert!(registry.contains(&TenantId::from("t9")));
        // Removed tenants stay registered
        assert!(registry.contains(&TenantId::from("t2")));
    }

    #[tokio::test]
    async fn test_bad_tenant_does_not_block_others() {
        let (registry, _topology, reconciler) = setup(
            ReconcileStrategy::CountCheck,
            vec![tenant("t1"), tenant("bad"), tenant("t3")],
        );
        registry.driver().fail_open("postgres://db/bad");

        let report = reconciler.run_once().await;

        assert_eq!(report.added, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(registry.size(), 2);

        // Count still differs, so the next pass retries the bad tenant
        registry.driver().heal_open("postgres://db/bad");
        let retry = reconciler.run_once().await;
        assert_eq!(retry.added, 1);
        assert_eq!(registry.size(), 3);
    }

    struct FailingTopology;

    #[async_trait]
    impl TopologyProvider for FailingTopology {
        async fn fetch(&self) -> Result<Vec<ConnectionInfo>> {
            Err(RegistryError::Internal("catalog down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_is_an_empty_pass() {
        let registry = Arc::new(ConnectionRegistry::new(RecordingDriver::new()));
        let reconciler = Reconciler::new(registry, Arc::new(FailingTopology));
        assert_eq!(reconciler.run_once().await, ReconcileReport::default());
    }

    #[tokio::test]
    async fn test_loop_picks_up_new_tenants_and_stops() {
        let (registry, topology, reconciler) = setup(ReconcileStrategy::CountCheck, vec![tenant("t1")]);
        let handle = reconciler
            .with_interval(Duration::from_millis(10))
            .spawn(CancellationToken::new());
        assert!(handle.is_running());

        topology.push(tenant("t2")).await;

        for _ in 0..200 {
            if registry.size() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(registry.size(), 2);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_interrupts_long_sleep() {
        let (_registry, _topology, reconciler) = setup(ReconcileStrategy::CountCheck, Vec::new());
        let token = CancellationToken::new();
        let handle = reconciler
            .with_interval(Duration::from_secs(3600))
            .spawn(token.clone());

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("shutdown should not wait for the next tick");
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_finishes_tenant_in_progress() {
        let registry = Arc::new(ConnectionRegistry::new(RecordingDriver::with_open_delay(
            Duration::from_millis(50),
        )));
        let topology = Arc::new(StaticTopology::new(vec![tenant("t1"), tenant("t2"), tenant("t3")]));
        let handle = Reconciler::new(registry.clone(), topology)
            .with_interval(Duration::from_secs(3600))
            .spawn(CancellationToken::new());

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown().await;

        // Every connection that was opened made it into the registry
        assert_eq!(registry.size(), registry.driver().open_count());
        assert!(registry.size() < 3);
        assert!(registry.driver().closed().is_empty());
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("count".parse::<ReconcileStrategy>(), Ok(ReconcileStrategy::CountCheck));
        assert_eq!("SET".parse::<ReconcileStrategy>(), Ok(ReconcileStrategy::SetDifference));
        assert!("diff".parse::<ReconcileStrategy>().is_err());
    }
}
