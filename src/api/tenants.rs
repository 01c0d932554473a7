//! Tenant API endpoints
//!
//! - GET /tenants - List registered tenants
//! - POST /tenants - Register a tenant connection
//! - GET /tenants/current - Resolve the tenant of this request
//! - POST /reconcile - Run one reconciliation pass now

use crate::api::ApiState;
use crate::error::{RegistryError, Result};
use crate::pool::DatabaseDriver;
use crate::reconcile::ReconcileReport;
use crate::registry::{AddOutcome, TenantSummary};
use crate::resolver::RequestContext;
use crate::tenant::{ConnectionInfo, TenantId, TenantMetadata};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Serialize)]
pub struct ListTenantsResponse {
    pub tenants: Vec<TenantSummary>,
    pub count: usize,
}

pub async fn list_tenants<D: DatabaseDriver>(
    State(state): State<Arc<ApiState<D>>>,
) -> Json<ListTenantsResponse> {
    let tenants = state.runtime.registry().summaries();
    Json(ListTenantsResponse {
        count: tenants.len(),
        tenants,
    })
}

#[derive(Serialize)]
pub struct AddTenantResponse {
    pub status: String,
    pub tenant_id: TenantId,
}

pub async fn add_tenant<D: DatabaseDriver>(
    State(state): State<Arc<ApiState<D>>>,
    Json(request): Json<ConnectionInfo>,
) -> Result<impl IntoResponse> {
    if request.dsn.trim().is_empty() {
        return Err(RegistryError::InvalidRequest {
            message: format!("Tenant '{}' has an empty dsn", request.tenant_id),
        });
    }

    let tenant_id = request.tenant_id.clone();
    let outcome = state.runtime.registry().add(request).await?;

    let (status, label) = match outcome {
        AddOutcome::Added => {
            info!("Tenant {} added through API", tenant_id);
            (StatusCode::CREATED, "added")
        }
        AddOutcome::AlreadyPresent => (StatusCode::OK, "already_present"),
    };

    Ok((
        status,
        Json(AddTenantResponse {
            status: label.to_string(),
            tenant_id,
        }),
    ))
}

#[derive(Serialize)]
pub struct CurrentTenantResponse {
    pub tenant_id: TenantId,
    pub metadata: TenantMetadata,
}

pub async fn current_tenant<D: DatabaseDriver>(
    State(state): State<Arc<ApiState<D>>>,
    headers: HeaderMap,
) -> Result<Json<CurrentTenantResponse>> {
    let ctx = RequestContext::from_headers(&headers);
    let tenant_id = state
        .runtime
        .resolver()
        .resolve(&ctx)
        .ok_or(RegistryError::TenantUnresolved)?;
    let metadata = state.runtime.registry().metadata(&tenant_id)?;

    Ok(Json(CurrentTenantResponse { tenant_id, metadata }))
}

pub async fn reconcile_now<D: DatabaseDriver>(
    State(state): State<Arc<ApiState<D>>>,
) -> Json<ReconcileReport> {
    Json(state.runtime.reconcile_now().await)
}
