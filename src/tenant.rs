//! Tenant identity and connection descriptors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque per-tenant information carried alongside a connection.
pub type TenantMetadata = serde_json::Value;

/// Identifier of a tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TenantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for TenantId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Describes one tenant's database endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub tenant_id: TenantId,
    pub dsn: String,
    #[serde(default)]
    pub metadata: TenantMetadata,
}

impl ConnectionInfo {
    pub fn new(tenant_id: impl Into<TenantId>, dsn: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            dsn: dsn.into(),
            metadata: TenantMetadata::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: TenantMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Build a PostgreSQL connection URL from its parts.
/// The password is URL-encoded so special characters survive.
pub fn postgres_dsn(host: &str, port: u16, user: &str, password: &str, database: &str) -> String {
    let encoded_password = urlencoding::encode(password);
    format!(
        "postgres://{}:{}@{}:{}/{}",
        user, encoded_password, host, port, database
    )
}
