//! HTTP dashboard for submitting fact checks and downloading their reports.

pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod telemetry;
