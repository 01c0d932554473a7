//! Schema Registry
//!
//! Ordered roster of schemas that must exist in every tenant database.
//! Registration order is replay order.

use crate::error::{RegistryError, Result};
use crate::pool::DatabaseDriver;
use crate::tenant::TenantId;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A named unit of DDL applied to every tenant database.
///
/// The checksum is always derived from the body, so it can be trusted for
/// drift detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    name: String,
    sql: String,
    checksum: String,
}

impl SchemaDescriptor {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let checksum = compute_checksum(&sql);
        Self {
            name: name.into(),
            sql,
            checksum,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Hex-encoded SHA-256 of the body
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    fn short_checksum(&self) -> &str {
        self.checksum.get(..12).unwrap_or(&self.checksum)
    }

    fn validate(&self) -> Result<()> {
        if !is_valid_identifier(&self.name) {
            return Err(RegistryError::InvalidSchema {
                name: self.name.clone(),
                reason: "name must be alphanumeric with underscores".to_string(),
            });
        }
        if self.sql.trim().is_empty() {
            return Err(RegistryError::InvalidSchema {
                name: self.name.clone(),
                reason: "schema body is empty".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct SchemaRegistry {
    schemas: RwLock<Vec<Arc<SchemaDescriptor>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one schema. Fails with `InvalidSchema` on a malformed or
    /// already registered schema.
    pub async fn register(&self, schema: SchemaDescriptor) -> Result<()> {
        schema.validate()?;

        let mut schemas = self.schemas.write().await;
        ensure_unregistered(&schemas, &schema)?;

        debug!("Registered schema {} ({})", schema.name, schema.short_checksum());
        schemas.push(Arc::new(schema));
        Ok(())
    }

    /// Append a batch in order. Either every schema is appended or none is.
    pub async fn register_all(&self, batch: impl IntoIterator<Item = SchemaDescriptor>) -> Result<()> {
        let batch: Vec<SchemaDescriptor> = batch.into_iter().collect();
        if batch.is_empty() {
            return Ok(());
        }

        let mut schemas = self.schemas.write().await;

        let mut seen = HashSet::new();
        for schema in &batch {
            schema.validate()?;
            ensure_unregistered(&schemas, schema)?;
            if !seen.insert(schema.name.as_str()) {
                return Err(RegistryError::InvalidSchema {
                    name: schema.name.clone(),
                    reason: "duplicate name in batch".to_string(),
                });
            }
        }

        info!("Registered {} schemas", batch.len());
        schemas.extend(batch.into_iter().map(Arc::new));
        Ok(())
    }

    /// Register every `*.pssql` / `*.sql` file of a directory, ordered by
    /// file name. Returns the number of schemas registered.
    pub async fn register_dir(&self, dir: &Path) -> Result<usize> {
        let batch = load_dir(dir)?;
        let count = batch.len();
        self.register_all(batch).await?;
        Ok(count)
    }

    /// Apply every registered schema to `handle`, in registration order,
    /// stopping at the first failure.
    ///
    /// The roster stays read-locked for the whole replay, so a concurrent
    /// `register` lands either entirely before or entirely after it.
    pub async fn replay_onto<D: DatabaseDriver>(
        &self,
        driver: &D,
        handle: &D::Handle,
        tenant_id: &TenantId,
    ) -> Result<usize> {
        let schemas = self.schemas.read().await;

        for schema in schemas.iter() {
            driver
                .ensure_schema(handle, schema)
                .await
                .map_err(|e| RegistryError::SchemaSyncFailed {
                    tenant_id: tenant_id.clone(),
                    schema: schema.name.clone(),
                    cause: e.to_string(),
                })?;
        }

        Ok(schemas.len())
    }

    pub async fn len(&self) -> usize {
        self.schemas.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.schemas.read().await.is_empty()
    }

    pub async fn names(&self) -> Vec<String> {
        self.schemas
            .read()
            .await
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }
}

fn ensure_unregistered(schemas: &[Arc<SchemaDescriptor>], schema: &SchemaDescriptor) -> Result<()> {
    if schemas.iter().any(|s| s.name == schema.name) {
        return Err(RegistryError::InvalidSchema {
            name: schema.name.clone(),
            reason: "already registered".to_string(),
        });
    }
    Ok(())
}

/// Read schema files from a directory. A missing directory yields nothing.
pub fn load_dir(dir: &Path) -> Result<Vec<SchemaDescriptor>> {
    if !dir.exists() {
        debug!("Schema directory {:?} does not exist, returning empty list", dir);
        return Ok(Vec::new());
    }

    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;

        let path = entry.path();
        let is_schema_file = path
            .extension()
            .map(|ext| ext == "pssql" || ext == "sql")
            .unwrap_or(false);

        if path.is_file() && is_schema_file {
            files.push(path);
        }
    }

    // Numeric prefixes like 001_, 002_ define the order
    files.sort();

    let mut schemas = Vec::with_capacity(files.len());
    for path in files {
        let name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let sql = fs::read_to_string(&path).map_err(|e| RegistryError::InvalidSchema {
            name: name.clone(),
            reason: format!("Failed to read {:?}: {}", path, e),
        })?;

        schemas.push(SchemaDescriptor::new(name, sql));
    }

    Ok(schemas)
}

/// Compute SHA256 checksum of a schema body
fn compute_checksum(sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql.as_bytes());
    hex::encode(hasher.finalize())
}

fn is_valid_identifier(s: &str) -> bool {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid identifier pattern"))
        .is_match(s)
}
