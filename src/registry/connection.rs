//! Connection Registry
//!
//! Map from tenant to its live connection. An entry appears only after the
//! connection opened and every registered schema was replayed onto it, and
//! is never replaced afterwards.

use crate::error::{RegistryError, Result};
use crate::pool::DatabaseDriver;
use crate::registry::SchemaRegistry;
use crate::tenant::{ConnectionInfo, TenantId, TenantMetadata};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct TenantEntry<H> {
    handle: H,
    metadata: TenantMetadata,
    connected_at: DateTime<Utc>,
}

/// Result of a successful [`ConnectionRegistry::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantSummary {
    pub tenant_id: TenantId,
    pub metadata: TenantMetadata,
    pub connected_at: DateTime<Utc>,
}

pub struct ConnectionRegistry<D: DatabaseDriver> {
    driver: D,
    schemas: Arc<SchemaRegistry>,
    connections: DashMap<TenantId, Arc<TenantEntry<D::Handle>>>,
    // Serializes concurrent adds of the same tenant so it is opened once
    inflight: DashMap<TenantId, Arc<Mutex<()>>>,
}

impl<D: DatabaseDriver> ConnectionRegistry<D> {
    pub fn new(driver: D) -> Self {
        Self::with_schemas(driver, Arc::new(SchemaRegistry::new()))
    }

    pub fn with_schemas(driver: D, schemas: Arc<SchemaRegistry>) -> Self {
        Self {
            driver,
            schemas,
            connections: DashMap::new(),
            inflight: DashMap::new(),
        }
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Open, sync and register a tenant connection.
    ///
    /// A tenant that is already registered is left untouched: no reopen and
    /// no replay. On failure the tenant stays absent and any connection
    /// opened on the way is closed.
    pub async fn add(&self, info: ConnectionInfo) -> Result<AddOutcome> {
        if self.connections.contains_key(&info.tenant_id) {
            return Ok(AddOutcome::AlreadyPresent);
        }

        let gate = self
            .inflight
            .entry(info.tenant_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let outcome = {
            let _guard = gate.lock().await;

            if self.connections.contains_key(&info.tenant_id) {
                Ok(AddOutcome::AlreadyPresent)
            } else {
                self.open_and_register(&info).await
            }
        };

        // Cloning a gate happens under the same shard lock, so a count of
        // one means no other add is waiting on it
        drop(gate);
        self.inflight
            .remove_if(&info.tenant_id, |_, gate| Arc::strong_count(gate) == 1);

        outcome
    }

    async fn open_and_register(&self, info: &ConnectionInfo) -> Result<AddOutcome> {
        let start_time = Instant::now();
        let tenant_id = &info.tenant_id;

        let handle = self
            .driver
            .open_connection(&info.dsn)
            .await
            .map_err(|e| {
                warn!("Failed to open connection for tenant {}: {}", tenant_id, e);
                RegistryError::ConnectionFailed {
                    tenant_id: tenant_id.clone(),
                    cause: e.to_string(),
                }
            })?;

        let replayed = match self.schemas.replay_onto(&self.driver, &handle, tenant_id).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Discarding connection for tenant {}: {}", tenant_id, e);
                self.driver.close_connection(handle).await;
                return Err(e);
            }
        };

        let entry = Arc::new(TenantEntry {
            handle,
            metadata: info.metadata.clone(),
            connected_at: Utc::now(),
        });
        self.connections.insert(tenant_id.clone(), entry);

        info!(
            "Registered tenant {} ({} schemas replayed in {}ms)",
            tenant_id,
            replayed,
            start_time.elapsed().as_millis()
        );

        Ok(AddOutcome::Added)
    }

    pub fn get_by_tenant_id(&self, tenant_id: &TenantId) -> Result<D::Handle> {
        match self.connections.get(tenant_id) {
            Some(entry) => Ok(entry.handle.clone()),
            None => {
                debug!("No connection registered for tenant {}", tenant_id);
                Err(RegistryError::NotFound {
                    tenant_id: tenant_id.clone(),
                })
            }
        }
    }

    pub fn metadata(&self, tenant_id: &TenantId) -> Result<TenantMetadata> {
        self.connections
            .get(tenant_id)
            .map(|entry| entry.metadata.clone())
            .ok_or_else(|| RegistryError::NotFound {
                tenant_id: tenant_id.clone(),
            })
    }

    pub fn contains(&self, tenant_id: &TenantId) -> bool {
        self.connections.contains_key(tenant_id)
    }

    pub fn size(&self) -> usize {
        self.connections.len()
    }

    pub fn tenant_ids(&self) -> Vec<TenantId> {
        let mut ids: Vec<TenantId> = self.connections.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn summaries(&self) -> Vec<TenantSummary> {
        let mut summaries: Vec<TenantSummary> = self
            .connections
            .iter()
            .map(|e| TenantSummary {
                tenant_id: e.key().clone(),
                metadata: e.value().metadata.clone(),
                connected_at: e.value().connected_at,
            })
            .collect();
        summaries.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        summaries
    }
}
