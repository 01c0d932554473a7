use crate::api::ApiState;
use crate::pool::DatabaseDriver;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    tenants: usize,
    schemas: usize,
    auto_sync: bool,
    uptime_seconds: u64,
}

pub async fn health_check<D: DatabaseDriver>(
    State(state): State<Arc<ApiState<D>>>,
) -> Json<HealthResponse> {
    let runtime = &state.runtime;
    let tenants = runtime.registry().size();

    Json(HealthResponse {
        status: if tenants > 0 {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        tenants,
        schemas: runtime.registry().schemas().len().await,
        auto_sync: runtime.is_syncing().await,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}
