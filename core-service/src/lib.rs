//! SafeGuardian Core - Monitoring & Risk-Escalation Pipeline
//!
//! Ingests per-session communication events, keeps live risk state per
//! monitored session, drives the alert lifecycle and seals evidence.
//!
//! ```text
//! Ingestion ─► Session worker ─► Risk scoring ─► Alert manager ─► Evidence vault
//!                    │                 │               │                │
//!                    └─────────────────┴──── Audit ────┴────────────────┘
//! ```
//!
//! Every session is owned by exactly one worker task; sessions never share
//! mutable state except through the [`logic::store::Store`].

pub mod constants;
pub mod error;
pub mod logic;

pub use error::{MonitorError, MonitorResult, NotifyError, OracleError, StoreError, VaultError};
pub use logic::config::PipelineConfig;
pub use logic::monitor::{Monitor, MonitorDeps};
