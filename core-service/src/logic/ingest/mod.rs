//! Ingestion Gateway
//!
//! Accepts session lifecycle and message events from upstream collectors,
//! validates their shape and hands them to the owning session worker.
//! Every event ends as accepted, duplicate, or rejected.

pub mod types;
pub mod validate;

pub use types::{
    IngestEvent, IngestOutcome, MessageAmended, MessageReceived, ParticipantSeen, SessionEnd, SessionStart,
};
pub use validate::validate;
