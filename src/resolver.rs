//! Tenant resolution from request context

use crate::tenant::TenantId;
use axum::http::HeaderMap;
use std::collections::HashMap;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// Ambient attributes of an incoming request. Keys are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    attributes: HashMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.attributes.insert(key.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Collect every header that is valid UTF-8
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut ctx = Self::new();
        for (name, value) in headers {
            if let Ok(value) = value.to_str() {
                ctx.insert(name.as_str(), value);
            }
        }
        ctx
    }
}

pub trait TenantResolver: Send + Sync {
    fn resolve(&self, ctx: &RequestContext) -> Option<TenantId>;
}

impl<F> TenantResolver for F
where
    F: Fn(&RequestContext) -> Option<TenantId> + Send + Sync,
{
    fn resolve(&self, ctx: &RequestContext) -> Option<TenantId> {
        self(ctx)
    }
}

/// Default resolver: reads the `x-tenant-id` attribute
#[derive(Debug, Clone)]
pub struct HeaderTenantResolver {
    key: String,
}

impl HeaderTenantResolver {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_ascii_lowercase(),
        }
    }
}

impl Default for HeaderTenantResolver {
    fn default() -> Self {
        Self::new(TENANT_HEADER)
    }
}

impl TenantResolver for HeaderTenantResolver {
    fn resolve(&self, ctx: &RequestContext) -> Option<TenantId> {
        let value = ctx.get(&self.key)?.trim();
        if value.is_empty() {
            None
        } else {
            Some(TenantId::from(value))
        }
    }
}
