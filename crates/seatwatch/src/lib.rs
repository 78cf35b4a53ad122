//! Childcare admission forecasting, route strategy, and turnover alerts.
//!
//! The HTTP binary in `services/api` wires these workflows to in-memory infrastructure; the
//! library itself only depends on the repository and transport traits each workflow defines.

pub mod config;
pub mod error;
pub mod quota;
pub mod retry;
pub mod storage;
pub mod telemetry;
pub mod workflows;
