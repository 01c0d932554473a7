//! Database collaborator
//!
//! The registry never talks to a database engine directly. Opening
//! connections and applying schemas goes through a [`DatabaseDriver`].

mod postgres;
mod router;

pub use postgres::{redact_dsn, PostgresDriver};
pub use router::DatabaseRouter;

use crate::error::DriverError;
use crate::registry::SchemaDescriptor;
use async_trait::async_trait;

#[async_trait]
pub trait DatabaseDriver: Send + Sync + 'static {
    /// Live connection handle stored in the registry. Cloning must be cheap
    /// and share the underlying connection.
    type Handle: Clone + Send + Sync + 'static;

    async fn open_connection(&self, dsn: &str) -> Result<Self::Handle, DriverError>;

    /// Make sure `schema` is present in the database behind `handle`.
    /// Must be safe to call for a schema that is already applied.
    async fn ensure_schema(
        &self,
        handle: &Self::Handle,
        schema: &SchemaDescriptor,
    ) -> Result<(), DriverError>;

    /// Release a connection that will not be registered.
    async fn close_connection(&self, _handle: Self::Handle) {}
}
