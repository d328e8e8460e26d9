//! HTTP handlers

pub mod health;
pub mod ingest;
pub mod sessions;
pub mod alerts;
pub mod evidence;
pub mod audit;
pub mod maintenance;
