//! In-memory driver that records every call, for tests.

use crate::error::DriverError;
use crate::pool::DatabaseDriver;
use crate::registry::SchemaDescriptor;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, PartialEq, Eq)]
pub struct FakeConnection {
    pub id: usize,
    pub dsn: String,
}

#[derive(Default)]
pub struct RecordingDriver {
    opens: AtomicUsize,
    applied: Mutex<HashMap<String, Vec<String>>>,
    closed: Mutex<Vec<String>>,
    failing_dsns: Mutex<HashSet<String>>,
    failing_schemas: Mutex<HashSet<String>>,
    open_delay: Option<Duration>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every open sleeps for `delay` first, widening race windows.
    pub fn with_open_delay(delay: Duration) -> Self {
        Self {
            open_delay: Some(delay),
            ..Self::default()
        }
    }

    pub async fn open(&self, dsn: &str) -> Arc<FakeConnection> {
        self.open_connection(dsn).await.unwrap()
    }

    pub fn fail_open(&self, dsn: &str) {
        self.failing_dsns.lock().unwrap().insert(dsn.to_string());
    }

    pub fn heal_open(&self, dsn: &str) {
        self.failing_dsns.lock().unwrap().remove(dsn);
    }

    pub fn fail_schema(&self, name: &str) {
        self.failing_schemas.lock().unwrap().insert(name.to_string());
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Schemas applied to connections opened for `dsn`, in call order.
    pub fn applied_to(&self, dsn: &str) -> Vec<String> {
        self.applied
            .lock()
            .unwrap()
            .get(dsn)
            .cloned()
            .unwrap_or_default()
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl DatabaseDriver for RecordingDriver {
    type Handle = Arc<FakeConnection>;

    async fn open_connection(&self, dsn: &str) -> Result<Self::Handle, DriverError> {
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_dsns.lock().unwrap().contains(dsn) {
            return Err(DriverError::new(format!("connection refused: {}", dsn)));
        }
        let id = self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeConnection {
            id,
            dsn: dsn.to_string(),
        }))
    }

    async fn ensure_schema(
        &self,
        handle: &Self::Handle,
        schema: &SchemaDescriptor,
    ) -> Result<(), DriverError> {
        if self.failing_schemas.lock().unwrap().contains(schema.name()) {
            return Err(DriverError::new(format!("syntax error in {}", schema.name())));
        }
        self.applied
            .lock()
            .unwrap()
            .entry(handle.dsn.clone())
            .or_default()
            .push(schema.name().to_string());
        Ok(())
    }

    async fn close_connection(&self, handle: Self::Handle) {
        self.closed.lock().unwrap().push(handle.dsn.clone());
    }
}
