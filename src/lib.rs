//! Tenant Database Registry
//!
//! Keeps one live connection per tenant database, replays a fixed roster of
//! schemas onto every new connection and reconciles the set of tenants
//! against an external topology source.

pub mod api;
pub mod config;
pub mod error;
pub mod pool;
pub mod reconcile;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod security;
pub mod telemetry;
pub mod tenant;
pub mod topology;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ErrorKind, RegistryError, Result};
pub use pool::{DatabaseDriver, PostgresDriver};
pub use reconcile::{ReconcileStrategy, Reconciler};
pub use registry::{AddOutcome, ConnectionRegistry, SchemaDescriptor, SchemaRegistry};
pub use resolver::{HeaderTenantResolver, RequestContext, TenantResolver};
pub use runtime::{initialize, AutoSync, TenantRuntime};
pub use tenant::{ConnectionInfo, TenantId, TenantMetadata};
pub use topology::{CatalogTopology, FileTopology, StaticTopology, TopologyProvider};
