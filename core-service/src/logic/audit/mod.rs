//! Audit Module
//!
//! Every mutating operation in the pipeline calls the recorder explicitly.
//! Entries are immutable; retention drops whole monthly partitions.
//!
//! ## Structure
//! - `types`: AuditEntry and its action/resource enums
//! - `sink`: Sink trait, store sink, fan-out
//! - `jsonl`: Rotating JSONL file sink
//! - `recorder`: Non-failing recorder with a ring of recent entries

pub mod jsonl;
pub mod recorder;
pub mod sink;
pub mod types;


pub use jsonl::JsonlAuditSink;
pub use recorder::AuditRecorder;
pub use sink::{AuditSink, FanoutAuditSink, StoreAuditSink};
pub use types::{partition_of, AuditAction, AuditEntry, ResourceType};
