use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::workflows::admission::domain::MAX_QUEUE_POSITION;
use crate::workflows::admission::{FacilityCategory, Grade, PriorityType, UncertaintyBand};
use crate::workflows::snapshots::{AgeClass, FacilityId};
use crate::workflows::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(ValidationError::new("home.lat", "must be within -90..90"));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(ValidationError::new("home.lng", "must be within -180..180"));
        }
        Ok(())
    }

    /// Great-circle distance in kilometres.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6_371.0;
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// Facility offered to the analyzer, either chosen by the user or resolved from the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFacility {
    pub facility_id: FacilityId,
    pub name: String,
    pub category: FacilityCategory,
    #[serde(default)]
    pub extended_care: bool,
    /// Known waitlist position; falls back to the published waiting count when absent.
    #[serde(default)]
    pub queue_position: Option<u32>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

impl CandidateFacility {
    /// Same bounds as a direct score request, reported against the candidate's index.
    pub(crate) fn validate(&self, index: usize) -> Result<(), ValidationError> {
        if self.facility_id.as_str().trim().is_empty() {
            return Err(ValidationError::new(
                format!("candidates[{index}].facility_id"),
                "must not be empty",
            ));
        }
        match self.queue_position {
            Some(0) => Err(ValidationError::new(
                format!("candidates[{index}].queue_position"),
                "must be at least 1",
            )),
            Some(position) if position > MAX_QUEUE_POSITION => Err(ValidationError::new(
                format!("candidates[{index}].queue_position"),
                format!("must be at most {MAX_QUEUE_POSITION}"),
            )),
            _ => Ok(()),
        }
    }
}

/// Raw analysis request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub home: GeoPoint,
    pub child_age_class: String,
    /// Month the family wants care to start, as `YYYY-MM`.
    pub desired_start_month: String,
    #[serde(default)]
    pub need_extended_care: bool,
    #[serde(default)]
    pub priority_type: Option<String>,
    #[serde(default)]
    pub employer: Option<String>,
    /// Explicit facility selection; resolved from nearby and followed facilities when absent.
    #[serde(default)]
    pub candidates: Option<Vec<CandidateFacility>>,
}

impl AnalyzeRequest {
    pub fn into_context(
        self,
        user_id: UserId,
    ) -> Result<(UserContext, Option<Vec<CandidateFacility>>), ValidationError> {
        self.home.validate()?;
        let child_age_class = self
            .child_age_class
            .parse::<AgeClass>()
            .map_err(|error| ValidationError::new("child_age_class", error.message))?;
        let desired_start = parse_month(&self.desired_start_month)?;
        let priority_type = self
            .priority_type
            .as_deref()
            .map(str::parse::<PriorityType>)
            .transpose()?
            .unwrap_or_default();
        let employer = self
            .employer
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        if let Some(candidates) = &self.candidates {
            if candidates.len() > MAX_CANDIDATES {
                return Err(ValidationError::new(
                    "candidates",
                    format!("at most {MAX_CANDIDATES} facilities per analysis"),
                ));
            }
            for (index, candidate) in candidates.iter().enumerate() {
                candidate.validate(index)?;
            }
        }

        Ok((
            UserContext {
                user_id,
                home: self.home,
                child_age_class,
                desired_start,
                need_extended_care: self.need_extended_care,
                priority_type,
                employer,
            },
            self.candidates,
        ))
    }
}

pub(crate) const MAX_CANDIDATES: usize = 30;

fn parse_month(raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d")
        .map_err(|_| ValidationError::new("desired_start_month", "expected YYYY-MM"))
}

/// Validated description of the family asking for a recommendation.
#[derive(Debug, Clone, PartialEq)]
pub struct UserContext {
    pub user_id: UserId,
    pub home: GeoPoint,
    pub child_age_class: AgeClass,
    /// First day of the desired start month.
    pub desired_start: NaiveDate,
    pub need_extended_care: bool,
    pub priority_type: PriorityType,
    pub employer: Option<String>,
}

impl UserContext {
    /// Whole months from `now` until the desired start month; zero once it has passed.
    pub fn months_until_start(&self, now: DateTime<Utc>) -> u32 {
        let start = self.desired_start.year() * 12 + self.desired_start.month() as i32;
        let current = now.year() * 12 + now.month() as i32;
        (start - current).max(0) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    Public,
    Employer,
    ExtendedHours,
    Private,
}

impl RouteKind {
    pub fn title(&self) -> &'static str {
        match self {
            RouteKind::Public => "Public facilities",
            RouteKind::Employer => "Workplace facility",
            RouteKind::ExtendedHours => "Extended-hours care",
            RouteKind::Private => "Private and home facilities",
        }
    }
}

/// Route strength; declaration order is ranking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteGrade {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl From<UncertaintyBand> for Confidence {
    fn from(band: UncertaintyBand) -> Self {
        match band {
            UncertaintyBand::Low => Confidence::High,
            UncertaintyBand::Medium => Confidence::Medium,
            UncertaintyBand::High => Confidence::Low,
        }
    }
}

/// Per-facility line shown inside a route card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityScoreView {
    pub facility_id: FacilityId,
    pub name: String,
    pub grade: Grade,
    pub p_6m: f64,
    pub eta_p50: f64,
    pub uncertainty: UncertaintyBand,
    pub estimated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteCard {
    pub kind: RouteKind,
    pub title: String,
    pub grade: RouteGrade,
    pub reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
    pub best_facility_id: Option<FacilityId>,
    pub best_eta_p50: Option<f64>,
    pub facilities: Vec<FacilityScoreView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSummary {
    pub overall_grade: Grade,
    pub one_liner: String,
    pub confidence: Confidence,
    pub updated_at: DateTime<Utc>,
}

/// Immutable analysis result owned by the requesting user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationWidget {
    pub recommendation_id: Uuid,
    pub user_id: UserId,
    pub summary: RecommendationSummary,
    pub routes: Vec<RouteCard>,
    pub disclaimer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub key: String,
    pub title: String,
    pub reason: String,
    pub done: bool,
}

/// Widget plus the checklist generated alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub widget: RecommendationWidget,
    pub checklist: Vec<ChecklistItem>,
}
