//! Risk Scoring Module
//!
//! Combines per-message analyses with participant risk into a bounded
//! session score.
//!
//! ## Structure
//! - `types`: Analysis results, verdicts, indicators, score breakdown
//! - `rules`: Weights and participant contributions (configurable)
//! - `engine`: The scoring formula
//! - `oracle`: Oracle trait and retrying client
//! - `http`: Oracle over HTTP
//!
//! ## Usage
//! ```ignore
//! let engine = RiskScoringEngine::new(ScoringRules::default());
//! let breakdown = engine.score(&[2.0, 4.0, 9.0], &[RiskLevel::High]);
//! assert_eq!(breakdown.score, 4.4);
//! ```

pub mod engine;
pub mod http;
pub mod oracle;
pub mod rules;
pub mod types;

#[cfg(test)]
mod tests;

pub use engine::RiskScoringEngine;
pub use http::HttpOracle;
pub use oracle::{OracleClient, ScoringOracle, StaticOracle};
pub use rules::{RiskContributions, ScoringRules};
pub use types::{AnalysisResult, AnalysisTarget, AnalysisType, Indicators, OracleVerdict, ScoreBreakdown};
