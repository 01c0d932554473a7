mod health;
mod tenants;

pub use health::health_check;
pub use tenants::{add_tenant, current_tenant, list_tenants, reconcile_now};

use crate::pool::DatabaseDriver;
use crate::runtime::TenantRuntime;
use crate::security::IpFilterLayer;
use axum::{
    routing::{get, post},
    Router,
};
use ipnetwork::IpNetwork;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Shared state of the admin endpoints
pub struct ApiState<D: DatabaseDriver> {
    pub runtime: Arc<TenantRuntime<D>>,
    pub start_time: Instant,
}

impl<D: DatabaseDriver> ApiState<D> {
    pub fn new(runtime: Arc<TenantRuntime<D>>) -> Self {
        Self {
            runtime,
            start_time: Instant::now(),
        }
    }
}

/// Admin router. `/health` stays reachable for load balancers; everything
/// else is restricted to `allowed_networks`.
pub fn router<D: DatabaseDriver>(state: Arc<ApiState<D>>, allowed_networks: Vec<IpNetwork>) -> Router {
    let ip_filter = IpFilterLayer::new(allowed_networks);

    Router::new()
        .route("/tenants", get(list_tenants::<D>).post(add_tenant::<D>))
        .route("/tenants/current", get(current_tenant::<D>))
        .route("/reconcile", post(reconcile_now::<D>))
        .layer(ip_filter)
        .route("/health", get(health_check::<D>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
