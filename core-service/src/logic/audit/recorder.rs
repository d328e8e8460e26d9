//! Audit Recorder
//!
//! Never fails the operation it observes. A failed write is counted as an
//! audit gap, logged on the `ops` target, and reported to operators.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::sink::AuditSink;
use super::types::AuditEntry;
use crate::constants::AUDIT_RING_SIZE;
use crate::logic::notify::{Notifier, OpsCondition};

pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
    notifier: Arc<dyn Notifier>,
    recent: RwLock<VecDeque<AuditEntry>>,
    ring_size: usize,
    recorded: AtomicU64,
    gaps: AtomicU64,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            sink,
            notifier,
            recent: RwLock::new(VecDeque::with_capacity(AUDIT_RING_SIZE)),
            ring_size: AUDIT_RING_SIZE,
            recorded: AtomicU64::new(0),
            gaps: AtomicU64::new(0),
        }
    }

    /// Append an entry. Sink failures never propagate.
    pub async fn record(&self, entry: AuditEntry) {
        {
            let mut recent = self.recent.write();
            recent.push_back(entry.clone());
            while recent.len() > self.ring_size {
                recent.pop_front();
            }
        }

        match self.sink.append(&entry).await {
            Ok(()) => {
                self.recorded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                let total = self.gaps.fetch_add(1, Ordering::SeqCst) + 1;
                log::error!(
                    target: "ops",
                    "Audit gap #{}: {} on {} {} not persisted: {}",
                    total,
                    entry.action,
                    entry.resource_type,
                    entry.resource_id,
                    e
                );
                self.notifier
                    .operational(&OpsCondition::AuditGap {
                        action: entry.action.to_string(),
                        resource_id: entry.resource_id.clone(),
                        reason: e.to_string(),
                    })
                    .await;
            }
        }
    }

    /// Most recent entries, newest first
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.recent.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn gap_count(&self) -> u64 {
        self.gaps.load(Ordering::SeqCst)
    }

    pub fn recorded_count(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }
}
