//! Logic Module - Pipeline Components
//!
//! - `session/` - session aggregate, participants, messages
//! - `scoring/` - risk scoring engine and the external scoring oracle
//! - `alert/` - alert lifecycle state machine and severity bands
//! - `evidence/` - hash-verified evidence vault with chain of custody
//! - `audit/` - append-only audit recorder and sinks
//! - `ingest/` - ingestion events, validation and outcomes
//! - `monitor/` - per-session workers tying the pipeline together

pub mod config;
pub mod retry;
pub mod authz;
pub mod store;
pub mod notify;

pub mod session;
pub mod scoring;
pub mod alert;
pub mod evidence;
pub mod audit;
pub mod ingest;
pub mod monitor;
pub mod maintenance;
