use crate::reconcile::{ReconcileStrategy, DEFAULT_SYNC_INTERVAL};
use crate::tenant::postgres_dsn;
use ipnetwork::IpNetwork;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub gateway_host: String,
    pub gateway_port: u16,
    pub max_connections_per_pool: u32,
    pub tenants_file: Option<PathBuf>,
    pub tenant_platform: String,
    pub schema_dir: PathBuf,
    pub auto_sync: bool,
    pub sync_interval: Duration,
    pub reconcile_strategy: ReconcileStrategy,
    pub allowed_networks: Vec<IpNetwork>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // Build database_url from individual fields or use DATABASE_URL if provided
        let database_url = if let Ok(url) = env::var("DATABASE_URL") {
            url
        } else {
            let db_host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
            let db_port = env::var("DB_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5432);
            let db_name = env::var("DB_NAME").unwrap_or_else(|_| "postgres".to_string());
            let db_user = env::var("DB_USER").unwrap_or_else(|_| "registry_user".to_string());
            let db_password = env::var("DB_PASSWORD").unwrap_or_else(|_| "password".to_string());

            postgres_dsn(&db_host, db_port, &db_user, &db_password, &db_name)
        };

        let gateway_host = env::var("GATEWAY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let gateway_port = env::var("GATEWAY_PORT")
            .unwrap_or_else(|_| "9100".to_string())
            .parse()
            .unwrap_or(9100);

        let max_connections_per_pool = env::var("MAX_CONNECTIONS_PER_POOL")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let tenants_file = env::var("TENANTS_FILE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let tenant_platform = env::var("TENANT_PLATFORM").unwrap_or_else(|_| "app".to_string());

        let schema_dir = env::var("SCHEMA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./schemas"));

        let auto_sync = env::var("AUTO_SYNC")
            .map(|v| parse_bool(&v))
            .unwrap_or(true);

        let sync_interval_secs: u64 = env::var("SYNC_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_SYNC_INTERVAL.as_secs());

        let reconcile_strategy = match env::var("RECONCILE_STRATEGY") {
            Ok(value) => ReconcileStrategy::from_str(&value).unwrap_or_else(|e| {
                warn!("{}, falling back to count", e);
                ReconcileStrategy::CountCheck
            }),
            Err(_) => ReconcileStrategy::CountCheck,
        };

        let allowed_networks_str =
            env::var("ALLOWED_NETWORKS").unwrap_or_else(|_| "127.0.0.0/8,::1/128".to_string());

        Ok(Config {
            database_url,
            gateway_host,
            gateway_port,
            max_connections_per_pool,
            tenants_file,
            tenant_platform,
            schema_dir,
            auto_sync,
            sync_interval: Duration::from_secs(sync_interval_secs),
            reconcile_strategy,
            allowed_networks: parse_networks(&allowed_networks_str),
        })
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.gateway_host, self.gateway_port);
        addr.parse().map_err(|e| anyhow::anyhow!("Invalid socket address: {}", e))
    }
}

/// Log directory, read on its own so logging can start before the rest of
/// the configuration is parsed
pub fn log_dir_from_env() -> PathBuf {
    env::var("LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/log/tenantdb-registry"))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_networks(value: &str) -> Vec<IpNetwork> {
    value
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                IpNetwork::from_str(trimmed).ok()
            }
        })
        .collect()
}
