//! Session State Manager
//!
//! Owns the mutable state of one monitoring session: participants,
//! message counters, current and peak risk. All mutation of a session
//! happens inside its worker (see [`crate::logic::monitor`]); this module
//! holds the data model and the synchronous aggregate.
//!
//! ## Structure
//! - `types`: Session, Participant, Message and their enums
//! - `state`: The per-session aggregate the worker mutates
//! - `directory`: Child profile lookups for the birth-bound check

pub mod directory;
pub mod state;
pub mod types;

#[cfg(test)]
mod tests;

pub use directory::{ChildDirectory, StaticChildDirectory};
pub use state::{ParticipantChange, ScoreTransition, SessionState};
pub use types::{
    AmendmentKind, ContentType, Message, Participant, ParticipantRole, RiskLevel, ScoringGap, Session,
    SessionStatus, SessionType,
};
