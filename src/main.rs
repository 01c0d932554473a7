use tenantdb_registry::api::{self, ApiState};
use tenantdb_registry::config::{self, Config};
use tenantdb_registry::runtime::{initialize, AutoSync};
use tenantdb_registry::telemetry;
use tenantdb_registry::topology::{CatalogTopology, FileTopology, TopologyProvider};
use tenantdb_registry::{ConnectionRegistry, DatabaseDriver, PostgresDriver, SchemaRegistry};

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from .env file if present
    let dotenv_result = dotenvy::dotenv();

    let _guard = telemetry::init(&config::log_dir_from_env());

    if let Err(e) = dotenv_result {
        warn!("No .env file found or error loading it: {}", e);
    }

    let config = Config::from_env()?;
    let socket_addr = config.socket_addr()?;

    info!("Starting tenant registry on {}", socket_addr);
    info!("Max connections per pool: {}", config.max_connections_per_pool);
    info!(
        "Auto sync: {} (every {:?}, {:?})",
        config.auto_sync, config.sync_interval, config.reconcile_strategy
    );
    info!("Allowed networks: {:?}", config.allowed_networks);

    let driver = PostgresDriver::from_config(&config);

    let provider: Arc<dyn TopologyProvider> = match &config.tenants_file {
        Some(path) => {
            info!("Reading tenant topology from {:?}", path);
            Arc::new(FileTopology::new(path))
        }
        None => {
            info!("Discovering tenants of platform '{}' from the catalog", config.tenant_platform);
            let admin_pool = driver.open_connection(&config.database_url).await?;
            Arc::new(CatalogTopology::new(
                admin_pool,
                &config.database_url,
                &config.tenant_platform,
            ))
        }
    };

    let schemas = Arc::new(SchemaRegistry::new());
    let schema_count = schemas.register_dir(&config.schema_dir).await?;
    info!("Loaded {} schemas from {:?}", schema_count, config.schema_dir);

    let registry = Arc::new(ConnectionRegistry::with_schemas(driver, schemas));

    let auto_sync = if config.auto_sync {
        AutoSync::Enabled {
            interval: config.sync_interval,
            strategy: config.reconcile_strategy,
        }
    } else {
        AutoSync::Disabled
    };

    let runtime = Arc::new(initialize(registry, Some(provider), None, auto_sync).await?);

    let state = Arc::new(ApiState::new(runtime.clone()));
    let app = api::router(state, config.allowed_networks.clone());

    let listener = tokio::net::TcpListener::bind(&socket_addr).await?;
    info!("Server listening on {}", socket_addr);

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    runtime.shutdown().await;
    info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
