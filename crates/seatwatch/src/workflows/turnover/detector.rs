use chrono::{DateTime, Duration, DurationRound, Utc};
use uuid::Uuid;

use super::domain::{DetectorParams, TOEvent, ToSource};
use crate::workflows::snapshots::CapacitySnapshot;

/// Reason a series could not be diffed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DetectionError {
    #[error("no previous snapshot to compare against")]
    MissingPrevious,
    #[error("malformed snapshot: occupied {occupied} exceeds capacity {capacity}")]
    Malformed { occupied: u32, capacity: u32 },
    #[error("snapshots out of order: latest observation is not newer than the previous one")]
    OutOfOrder,
}

/// Start of the fixed detection window containing `observed_at`.
pub fn detection_window(observed_at: DateTime<Utc>, params: &DetectorParams) -> DateTime<Utc> {
    let width = Duration::minutes(params.window_minutes.max(1));
    observed_at.duration_trunc(width).unwrap_or(observed_at)
}

/// Source reliability scaled by snapshot age and the gap between observations.
pub fn confidence(
    previous: &CapacitySnapshot,
    current: &CapacitySnapshot,
    params: &DetectorParams,
    now: DateTime<Utc>,
) -> f64 {
    let base = current.reliability.base_confidence();

    let age_hours = (now - current.observed_at).num_seconds().max(0) as f64 / 3600.0;
    let recency = if age_hours <= params.recency_full_hours {
        1.0
    } else if age_hours >= params.recency_floor_hours {
        params.recency_floor
    } else {
        let span = params.recency_floor_hours - params.recency_full_hours;
        let progress = (age_hours - params.recency_full_hours) / span;
        1.0 - progress * (1.0 - params.recency_floor)
    };

    let gap = if current.observed_at - previous.observed_at > Duration::days(params.gap_days) {
        params.gap_factor
    } else {
        1.0
    };

    let value = base * recency * gap;
    (value * 1000.0).round().clamp(0.0, 1000.0) / 1000.0
}

/// Diffs the two most recent observations of one series. `Ok(None)` means nothing was freed.
pub fn detect(
    previous: Option<&CapacitySnapshot>,
    current: &CapacitySnapshot,
    params: &DetectorParams,
    now: DateTime<Utc>,
) -> Result<Option<TOEvent>, DetectionError> {
    let previous = previous.ok_or(DetectionError::MissingPrevious)?;
    for snapshot in [previous, current] {
        if snapshot.current_occupied > snapshot.capacity_total {
            return Err(DetectionError::Malformed {
                occupied: snapshot.current_occupied,
                capacity: snapshot.capacity_total,
            });
        }
    }
    if current.observed_at <= previous.observed_at {
        return Err(DetectionError::OutOfOrder);
    }

    let occupancy_drop = previous
        .current_occupied
        .saturating_sub(current.current_occupied);
    let capacity_gain = current
        .capacity_total
        .saturating_sub(previous.capacity_total);

    let (source, estimated_slots) = if capacity_gain > 0 {
        (
            ToSource::CapacityExpansion,
            capacity_gain.saturating_add(occupancy_drop),
        )
    } else if occupancy_drop > 0 {
        (ToSource::Vacancy, occupancy_drop)
    } else {
        return Ok(None);
    };

    Ok(Some(TOEvent {
        event_id: Uuid::new_v4(),
        facility_id: current.facility_id.clone(),
        age_class: current.age_class,
        estimated_slots,
        confidence: confidence(previous, current, params, now),
        detected_at: now,
        source,
        window_start: detection_window(current.observed_at, params),
    }))
}
