//! Admission probability, ETA, and grade estimation.
//!
//! The engine models seat turnover from capacity history and treats the wait until a child's
//! effective queue position is reached as a gamma (Erlang) waiting time. It never fails on
//! sparse data: thin histories yield a HIGH-uncertainty estimate and missing histories an
//! `InsufficientData` outcome.

pub mod cache;
pub(crate) mod distribution;
pub mod domain;
pub mod engine;
pub(crate) mod grading;
pub(crate) mod history;
pub mod params;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use cache::{InMemoryScoreCache, ScoreCache, ScoreCacheKey};
pub use domain::{
    AdmissionScoreResult, Dispersion, EtaMonths, FacilityCategory, Grade, PriorityType,
    Probability, ScoreDrivers, ScoreOutcome, ScoreQuery, ScoreRequest, Uncertainty,
    UncertaintyBand,
};
pub use engine::AdmissionEngine;
pub use grading::grade_for;
pub use params::{GradeThresholds, PrioritySkips, ScoringParams};
pub use router::admission_router;
pub use service::{AdmissionService, AdmissionServiceError};
