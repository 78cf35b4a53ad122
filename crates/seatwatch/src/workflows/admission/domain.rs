use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::workflows::snapshots::{AgeClass, FacilityId};

/// Admission priority category granted by the municipality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PriorityType {
    #[default]
    General,
    DualIncome,
    Sibling,
    MultiChild,
    LowIncome,
    SingleParent,
    Disability,
}

impl PriorityType {
    pub fn label(&self) -> &'static str {
        match self {
            PriorityType::General => "general",
            PriorityType::DualIncome => "dual_income",
            PriorityType::Sibling => "sibling",
            PriorityType::MultiChild => "multi_child",
            PriorityType::LowIncome => "low_income",
            PriorityType::SingleParent => "single_parent",
            PriorityType::Disability => "disability",
        }
    }
}

impl FromStr for PriorityType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "general" => Ok(Self::General),
            "dual_income" => Ok(Self::DualIncome),
            "sibling" => Ok(Self::Sibling),
            "multi_child" => Ok(Self::MultiChild),
            "low_income" => Ok(Self::LowIncome),
            "single_parent" => Ok(Self::SingleParent),
            "disability" => Ok(Self::Disability),
            other => Err(ValidationError::new(
                "priority_type",
                format!("unknown priority '{other}'"),
            )),
        }
    }
}

/// Operator category of a facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacilityCategory {
    NationalPublic,
    Public,
    Workplace,
    Private,
    Home,
    Cooperative,
}

impl FacilityCategory {
    pub fn is_public(&self) -> bool {
        matches!(self, FacilityCategory::NationalPublic | FacilityCategory::Public)
    }
}

impl FromStr for FacilityCategory {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "national_public" => Ok(Self::NationalPublic),
            "public" => Ok(Self::Public),
            "workplace" => Ok(Self::Workplace),
            "private" => Ok(Self::Private),
            "home" => Ok(Self::Home),
            "cooperative" => Ok(Self::Cooperative),
            other => Err(ValidationError::new(
                "facility_category",
                format!("unknown category '{other}'"),
            )),
        }
    }
}

pub(crate) const MAX_QUEUE_POSITION: u32 = 10_000;

/// Raw scoring request as received from clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub facility_id: String,
    pub age_class: String,
    pub queue_position: u32,
    #[serde(default)]
    pub priority_type: Option<String>,
    #[serde(default)]
    pub facility_category: Option<String>,
}

impl ScoreRequest {
    pub fn validate(&self) -> Result<ScoreQuery, ValidationError> {
        let facility_id = FacilityId::parse(&self.facility_id)?;
        let age_class = self.age_class.parse::<AgeClass>()?;
        if self.queue_position == 0 {
            return Err(ValidationError::new("queue_position", "must be at least 1"));
        }
        if self.queue_position > MAX_QUEUE_POSITION {
            return Err(ValidationError::new(
                "queue_position",
                format!("must be at most {MAX_QUEUE_POSITION}"),
            ));
        }
        let priority_type = self
            .priority_type
            .as_deref()
            .map(str::parse::<PriorityType>)
            .transpose()?
            .unwrap_or_default();
        let category = self
            .facility_category
            .as_deref()
            .map(str::parse::<FacilityCategory>)
            .transpose()?;

        Ok(ScoreQuery {
            facility_id,
            age_class,
            queue_position: self.queue_position,
            priority_type,
            category,
        })
    }
}

/// Validated scoring input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreQuery {
    pub facility_id: FacilityId,
    pub age_class: AgeClass,
    pub queue_position: u32,
    pub priority_type: PriorityType,
    pub category: Option<FacilityCategory>,
}

/// Letter grade summarising admission outlook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Grade {
    pub fn label(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::E => "E",
            Grade::F => "F",
        }
    }

    /// One step stricter; F stays F.
    pub fn downgraded(self) -> Self {
        match self {
            Grade::A => Grade::B,
            Grade::B => Grade::C,
            Grade::C => Grade::D,
            Grade::D => Grade::E,
            Grade::E | Grade::F => Grade::F,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Admission probability by horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Probability {
    pub p_3m: f64,
    pub p_6m: f64,
    pub p_12m: f64,
}

/// Wait-time quantiles in months.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EtaMonths {
    pub p50: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UncertaintyBand {
    Low,
    Medium,
    High,
}

impl UncertaintyBand {
    pub fn label(&self) -> &'static str {
        match self {
            UncertaintyBand::Low => "LOW",
            UncertaintyBand::Medium => "MEDIUM",
            UncertaintyBand::High => "HIGH",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Uncertainty {
    pub band: UncertaintyBand,
    pub notes: Vec<String>,
}

/// Shape of the turnover-count distribution fitted from history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dispersion {
    Poisson,
    NegativeBinomial { r: f64, p: f64 },
    /// Variance below the mean or no turnover at all: nothing to fit.
    Degenerate,
}

/// Inputs that drove an estimate, exposed so callers can explain the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDrivers {
    pub queue_position: u32,
    pub effective_queue_position: u32,
    pub priority_type: PriorityType,
    pub priority_skip: u32,
    /// Prior-blended turnover rate before seasonal weighting.
    pub turnover_rate_per_month: f64,
    /// Mean seasonal multiplier over the six months following the score date.
    pub seasonal_factor: f64,
    pub sample_windows: usize,
    pub observed_turnover: u64,
    pub dispersion: Dispersion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionScoreResult {
    pub request_id: Uuid,
    pub model_version: String,
    pub facility_id: FacilityId,
    pub age_class: AgeClass,
    pub grade: Grade,
    pub probability: Probability,
    pub eta_months: EtaMonths,
    pub uncertainty: Uncertainty,
    pub drivers: ScoreDrivers,
    pub actions: Vec<String>,
    pub scored_at: DateTime<Utc>,
}

/// Scoring outcome. Both variants carry a usable result; `InsufficientData` results are
/// pinned to grade F with HIGH uncertainty and notes naming the missing signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "result", rename_all = "snake_case")]
pub enum ScoreOutcome {
    Estimated(AdmissionScoreResult),
    InsufficientData(AdmissionScoreResult),
}

impl ScoreOutcome {
    pub fn result(&self) -> &AdmissionScoreResult {
        match self {
            ScoreOutcome::Estimated(result) | ScoreOutcome::InsufficientData(result) => result,
        }
    }

    pub fn into_result(self) -> AdmissionScoreResult {
        match self {
            ScoreOutcome::Estimated(result) | ScoreOutcome::InsufficientData(result) => result,
        }
    }

    pub fn is_estimated(&self) -> bool {
        matches!(self, ScoreOutcome::Estimated(_))
    }

    /// Hands out a cached result as a new response.
    pub(crate) fn reissued(self, request_id: Uuid, scored_at: DateTime<Utc>) -> Self {
        let stamp = |mut result: AdmissionScoreResult| {
            result.request_id = request_id;
            result.scored_at = scored_at;
            result
        };
        match self {
            ScoreOutcome::Estimated(result) => ScoreOutcome::Estimated(stamp(result)),
            ScoreOutcome::InsufficientData(result) => ScoreOutcome::InsufficientData(stamp(result)),
        }
    }
}
