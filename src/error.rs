use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::tenant::TenantId;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Topology provider is not configured")]
    MissingProvider,

    #[error("Connection failed for tenant {tenant_id}: {cause}")]
    ConnectionFailed { tenant_id: TenantId, cause: String },

    #[error("Schema sync failed for tenant {tenant_id}: {schema} - {cause}")]
    SchemaSyncFailed {
        tenant_id: TenantId,
        schema: String,
        cause: String,
    },

    #[error("No connection registered for tenant {tenant_id}")]
    NotFound { tenant_id: TenantId },

    #[error("Invalid schema {name}: {reason}")]
    InvalidSchema { name: String, reason: String },

    #[error("Could not resolve a tenant from the request context")]
    TenantUnresolved,

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`RegistryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingProvider,
    ConnectionFailed,
    SchemaSyncFailed,
    NotFound,
    InvalidSchema,
    TenantUnresolved,
    InvalidRequest,
    Internal,
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::MissingProvider => ErrorKind::MissingProvider,
            RegistryError::ConnectionFailed { .. } => ErrorKind::ConnectionFailed,
            RegistryError::SchemaSyncFailed { .. } => ErrorKind::SchemaSyncFailed,
            RegistryError::NotFound { .. } => ErrorKind::NotFound,
            RegistryError::InvalidSchema { .. } => ErrorKind::InvalidSchema,
            RegistryError::TenantUnresolved => ErrorKind::TenantUnresolved,
            RegistryError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            RegistryError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Failure reported by a database driver.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DriverError(pub String);

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<tokio_postgres::Error> for DriverError {
    fn from(err: tokio_postgres::Error) -> Self {
        DriverError(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for DriverError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        DriverError(format!("Pool error: {}", err))
    }
}

impl From<deadpool_postgres::CreatePoolError> for DriverError {
    fn from(err: deadpool_postgres::CreatePoolError) -> Self {
        DriverError(format!("Failed to create pool: {}", err))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, error_response) = match self {
            RegistryError::MissingProvider => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: "missing_provider".to_string(),
                    message,
                    tenant_id: None,
                    cause: None,
                },
            ),
            RegistryError::ConnectionFailed { tenant_id, cause } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse {
                    error: "connection_failed".to_string(),
                    message: format!("Failed to connect to database for tenant '{}'", tenant_id),
                    tenant_id: Some(tenant_id.to_string()),
                    cause: Some(cause),
                },
            ),
            RegistryError::SchemaSyncFailed {
                tenant_id,
                schema,
                cause,
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: "schema_sync_failed".to_string(),
                    message: format!("Schema {} could not be applied", schema),
                    tenant_id: Some(tenant_id.to_string()),
                    cause: Some(cause),
                },
            ),
            RegistryError::NotFound { tenant_id } => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: "tenant_not_found".to_string(),
                    message,
                    tenant_id: Some(tenant_id.to_string()),
                    cause: None,
                },
            ),
            RegistryError::InvalidSchema { reason, .. } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: "invalid_schema".to_string(),
                    message,
                    tenant_id: None,
                    cause: Some(reason),
                },
            ),
            RegistryError::TenantUnresolved => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: "tenant_unresolved".to_string(),
                    message,
                    tenant_id: None,
                    cause: None,
                },
            ),
            RegistryError::InvalidRequest { message } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: "invalid_request".to_string(),
                    message,
                    tenant_id: None,
                    cause: None,
                },
            ),
            RegistryError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: "internal_error".to_string(),
                    message: msg,
                    tenant_id: None,
                    cause: None,
                },
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        RegistryError::Internal(format!("IO error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
