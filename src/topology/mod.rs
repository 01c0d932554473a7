//! Tenant topology sources
//!
//! A [`TopologyProvider`] returns the full current set of tenants every
//! time it is asked. There is no incremental contract.

mod catalog;
mod file;

pub use catalog::CatalogTopology;
pub use file::FileTopology;

use crate::error::Result;
use crate::tenant::ConnectionInfo;
use async_trait::async_trait;
use tokio::sync::RwLock;

#[async_trait]
pub trait TopologyProvider: Send + Sync {
    async fn fetch(&self) -> Result<Vec<ConnectionInfo>>;
}

/// In-memory tenant list that can be swapped at runtime
#[derive(Default)]
pub struct StaticTopology {
    tenants: RwLock<Vec<ConnectionInfo>>,
}

impl StaticTopology {
    pub fn new(tenants: Vec<ConnectionInfo>) -> Self {
        Self {
            tenants: RwLock::new(tenants),
        }
    }

    pub async fn replace(&self, tenants: Vec<ConnectionInfo>) {
        *self.tenants.write().await = tenants;
    }

    pub async fn push(&self, tenant: ConnectionInfo) {
        self.tenants.write().await.push(tenant);
    }
}

#[async_trait]
impl TopologyProvider for StaticTopology {
    async fn fetch(&self) -> Result<Vec<ConnectionInfo>> {
        Ok(self.tenants.read().await.clone())
    }
}
