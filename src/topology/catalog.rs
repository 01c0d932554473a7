//! Catalog topology
//!
//! Discovers tenants from the databases present on the admin server:
//! every `{platform}_{tenant}` database except `{platform}_main` is a
//! tenant, reachable through the admin URL with the database swapped.

use crate::error::{RegistryError, Result};
use crate::pool::DatabaseRouter;
use crate::tenant::ConnectionInfo;
use crate::topology::TopologyProvider;
use async_trait::async_trait;
use deadpool_postgres::Pool;
use serde_json::json;
use tracing::debug;

pub struct CatalogTopology {
    admin_pool: Pool,
    base_url: String,
    platform: String,
    router: DatabaseRouter,
}

impl CatalogTopology {
    pub fn new(admin_pool: Pool, base_url: &str, platform: &str) -> Self {
        Self {
            admin_pool,
            base_url: base_url.to_string(),
            platform: platform.to_string(),
            router: DatabaseRouter::new(),
        }
    }

    fn to_connection_info(&self, db_name: &str) -> Result<Option<ConnectionInfo>> {
        if !self.router.belongs_to_platform(db_name, &self.platform) {
            return Ok(None);
        }

        let Some(tenant_id) = self.router.tenant_id_from_database(db_name, &self.platform) else {
            return Ok(None);
        };

        let dsn = self.router.database_url_for(&self.base_url, db_name)?;
        Ok(Some(
            ConnectionInfo::new(tenant_id, dsn).with_metadata(json!({ "database": db_name })),
        ))
    }
}

#[async_trait]
impl TopologyProvider for CatalogTopology {
    async fn fetch(&self) -> Result<Vec<ConnectionInfo>> {
        let client = self.admin_pool.get().await.map_err(|e| {
            RegistryError::Internal(format!("Catalog connection failed: {}", e))
        })?;

        let prefix = self.router.platform_prefix(&self.platform);
        let rows = client
            .query(
                "SELECT datname FROM pg_database WHERE NOT datistemplate AND starts_with(datname, $1) ORDER BY datname",
                &[&prefix],
            )
            .await
            .map_err(|e| RegistryError::Internal(format!("Catalog query failed: {}", e)))?;

        let mut tenants = Vec::with_capacity(rows.len());
        for row in rows {
            let db_name: String = row.get(0);
            if let Some(info) = self.to_connection_info(&db_name)? {
                tenants.push(info);
            }
        }

        debug!("Catalog lists {} tenants for platform {}", tenants.len(), self.platform);
        Ok(tenants)
    }
}
