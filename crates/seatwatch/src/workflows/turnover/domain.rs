use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflows::snapshots::{AgeClass, FacilityId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToSource {
    Vacancy,
    CapacityExpansion,
}

/// A freed admission slot detected between two capacity observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TOEvent {
    pub event_id: Uuid,
    pub facility_id: FacilityId,
    pub age_class: AgeClass,
    pub estimated_slots: u32,
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
    pub source: ToSource,
    /// Start of the detection window the event belongs to.
    pub window_start: DateTime<Utc>,
}

impl TOEvent {
    pub fn key(&self) -> EventKey {
        EventKey {
            facility_id: self.facility_id.clone(),
            age_class: self.age_class,
            window_start: self.window_start,
        }
    }
}

/// Uniqueness key: at most one event per series and detection window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub facility_id: FacilityId,
    pub age_class: AgeClass,
    pub window_start: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Partial,
    Failed,
}

/// Summary of one detection batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub status: JobStatus,
    pub scanned: usize,
    pub events_emitted: usize,
    pub duplicates: usize,
    pub errors: usize,
    pub timestamp: DateTime<Utc>,
    pub events: Vec<Uuid>,
}

/// Detection tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorParams {
    pub window_minutes: i64,
    pub recency_full_hours: f64,
    pub recency_floor_hours: f64,
    pub recency_floor: f64,
    pub gap_days: i64,
    pub gap_factor: f64,
    pub list_attempts: u32,
    pub list_backoff_ms: u64,
}

impl DetectorParams {
    pub fn standard() -> Self {
        Self {
            window_minutes: 30,
            recency_full_hours: 2.0,
            recency_floor_hours: 72.0,
            recency_floor: 0.5,
            gap_days: 7,
            gap_factor: 0.8,
            list_attempts: 3,
            list_backoff_ms: 200,
        }
    }
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self::standard()
    }
}
