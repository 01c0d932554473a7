//! Tenant registries
//!
//! - [`SchemaRegistry`]: ordered schemas replayed onto every new connection
//! - [`ConnectionRegistry`]: one live connection per tenant

mod connection;
mod schema;

pub use connection::{AddOutcome, ConnectionRegistry, TenantSummary};
pub use schema::{load_dir, SchemaDescriptor, SchemaRegistry};
