//! Turnover (TO) detection: diffs the latest capacity observations of each series and stores
//! at most one event per series and detection window.

pub mod detector;
pub mod domain;
pub mod job;
pub mod repository;
pub mod router;

#[cfg(test)]
mod tests;

pub use detector::{confidence, detect, detection_window, DetectionError};
pub use domain::{DetectionReport, DetectorParams, EventKey, JobStatus, TOEvent, ToSource};
pub use job::{DetectionRun, ToDetector};
pub use repository::{InMemoryToEventStore, ToEventRepository};
pub use router::to_events_router;
