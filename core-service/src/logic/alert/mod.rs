//! Alert Module
//!
//! ## Structure
//! - `types`: Alert, its enums and the trigger pointer
//! - `rules`: Severity bands and dispatch table (configurable)
//! - `manager`: Open/update decisions and the lifecycle state machine

pub mod manager;
pub mod rules;
pub mod types;

#[cfg(test)]
mod tests;

pub use manager::{AlertDecision, AlertManager, AlertOp, AlertOutcome, AlertSignal, SYSTEM_ACTOR};
pub use rules::{alert_type_for, channels_for, priority_for, SeverityBands};
pub use types::{Alert, AlertAction, AlertStatus, AlertType, Severity, Trigger, Urgency};
