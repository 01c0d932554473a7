use crate::config::Config;
use crate::error::DriverError;
use crate::pool::DatabaseDriver;
use crate::registry::SchemaDescriptor;
use async_trait::async_trait;
use deadpool_postgres::{Config as PoolConfig, Pool, Runtime};
use std::time::Duration;
use tokio_postgres::NoTls;
use tracing::{debug, info, warn};

const SCHEMA_TRACKING_TABLE: &str = "_tenantdb_registry_schemas";

/// PostgreSQL driver backed by one deadpool pool per tenant database
pub struct PostgresDriver {
    max_connections_per_pool: u32,
}

impl PostgresDriver {
    pub fn new(max_connections_per_pool: u32) -> Self {
        Self {
            max_connections_per_pool,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_connections_per_pool)
    }

    async fn ensure_tracking_table(&self, pool: &Pool) -> Result<(), DriverError> {
        let client = pool.get().await?;
        client
            .batch_execute(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id SERIAL PRIMARY KEY,
                    schema_name TEXT NOT NULL UNIQUE,
                    checksum TEXT NOT NULL,
                    applied_at TIMESTAMPTZ DEFAULT NOW()
                )
                "#,
                SCHEMA_TRACKING_TABLE
            ))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    type Handle = Pool;

    async fn open_connection(&self, dsn: &str) -> Result<Pool, DriverError> {
        let pool = create_pool(dsn, self.max_connections_per_pool)?;

        // Test the connection
        let client = pool.get().await?;
        client
            .execute("SELECT 1", &[])
            .await
            .map_err(|e| DriverError::new(format!("Ping failed: {}", e)))?;

        info!("Opened pool for {}", redact_dsn(dsn));
        Ok(pool)
    }

    async fn ensure_schema(&self, pool: &Pool, schema: &SchemaDescriptor) -> Result<(), DriverError> {
        self.ensure_tracking_table(pool).await?;

        let mut client = pool.get().await?;

        let select_sql = format!(
            "SELECT checksum FROM {} WHERE schema_name = $1",
            SCHEMA_TRACKING_TABLE
        );
        let applied = client.query_opt(select_sql.as_str(), &[&schema.name()]).await?;

        if let Some(row) = applied {
            let checksum: String = row.get(0);
            if checksum == schema.checksum() {
                debug!("Schema {} already applied, skipping", schema.name());
            } else {
                warn!(
                    "Schema {} was applied with checksum {} but is now {}; not re-applying",
                    schema.name(), checksum, schema.checksum()
                );
            }
            return Ok(());
        }

        let tx = client.transaction().await?;
        tx.batch_execute(schema.sql()).await?;
        let insert_sql = format!(
            "INSERT INTO {} (schema_name, checksum) VALUES ($1, $2)",
            SCHEMA_TRACKING_TABLE
        );
        tx.execute(insert_sql.as_str(), &[&schema.name(), &schema.checksum()])
            .await?;
        tx.commit().await?;

        info!("Applied schema {}", schema.name());
        Ok(())
    }

    async fn close_connection(&self, pool: Pool) {
        pool.close();
    }
}

fn create_pool(database_url: &str, max_size: u32) -> Result<Pool, DriverError> {
    let mut cfg = PoolConfig::new();
    cfg.url = Some(database_url.to_string());

    cfg.pool = Some(deadpool_postgres::PoolConfig {
        max_size: max_size as usize,
        timeouts: deadpool_postgres::Timeouts {
            wait: Some(Duration::from_secs(5)),
            create: Some(Duration::from_secs(5)),
            recycle: Some(Duration::from_secs(5)),
        },
        ..Default::default()
    });

    Ok(cfg.create_pool(Some(Runtime::Tokio1), NoTls)?)
}

/// Hide the password of a connection URL for logging.
pub fn redact_dsn(dsn: &str) -> String {
    let Some(scheme_end) = dsn.find("://") else {
        return dsn.to_string();
    };
    let rest = &dsn[scheme_end + 3..];
    let Some(at) = rest.rfind('@') else {
        return dsn.to_string();
    };
    let credentials = &rest[..at];
    match credentials.find(':') {
        Some(colon) => format!(
            "{}{}:***{}",
            &dsn[..scheme_end + 3],
            &credentials[..colon],
            &rest[at..]
        ),
        None => dsn.to_string(),
    }
}
