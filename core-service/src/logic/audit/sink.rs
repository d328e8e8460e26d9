//! Audit sinks

use std::sync::Arc;

use async_trait::async_trait;

use super::types::AuditEntry;
use crate::error::{StoreError, StoreResult};
use crate::logic::store::Store;

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> StoreResult<()>;
}

/// Writes through the persistence interface
pub struct StoreAuditSink {
    store: Arc<dyn Store>,
}

impl StoreAuditSink {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuditSink for StoreAuditSink {
    async fn append(&self, entry: &AuditEntry) -> StoreResult<()> {
        self.store.append_audit(entry).await
    }
}

/// Writes to every sink; fails if any of them failed
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl AuditSink for FanoutAuditSink {
    async fn append(&self, entry: &AuditEntry) -> StoreResult<()> {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.append(entry).await {
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Unavailable(failures.join("; ")))
        }
    }
}
