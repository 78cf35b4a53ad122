//! Usage quotas shared by scoring, strategy analysis, and alert dispatch.
//!
//! Every limited operation goes through [`QuotaOracle::check_limit`], which resolves the
//! subject's subscription tier and performs a single atomic check-and-increment on a
//! fixed-window counter. A `false` decision is a hard stop for the caller.

pub mod counter;
pub mod policy;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::storage::RepositoryError;

pub use counter::{CounterKey, InMemoryUsageCounter, UsageCounter, WindowState};
pub use policy::{FeatureRule, InMemoryTierDirectory, QuotaPolicy, SubscriptionQuota, TierDirectory};

/// Subscription tier of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    Basic,
    Premium,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Basic => "basic",
            Tier::Premium => "premium",
        }
    }
}

/// Operations metered per subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    AdmissionScore,
    StrategyAnalysis,
    ToAlert,
}

impl Feature {
    pub fn label(&self) -> &'static str {
        match self {
            Feature::AdmissionScore => "admission_score",
            Feature::StrategyAnalysis => "strategy_analysis",
            Feature::ToAlert => "to_alert",
        }
    }
}

/// Answer to a quota check. `remaining` and `reset_at` are absent for unlimited tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitDecision {
    pub allowed: bool,
    pub remaining: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl LimitDecision {
    pub fn unlimited() -> Self {
        Self {
            allowed: true,
            remaining: None,
            reset_at: None,
        }
    }
}

/// Subscription and quota lookups consulted before metered work starts.
pub trait QuotaOracle: Send + Sync {
    /// Consumes one unit of `feature` for `subject` if the tier allows it.
    fn check_limit(
        &self,
        subject: &str,
        feature: Feature,
        now: DateTime<Utc>,
    ) -> Result<LimitDecision, RepositoryError>;

    /// Number of facilities the subject may follow with TO alerts; `None` means unlimited.
    fn alert_facility_allowance(&self, subject: &str) -> Result<Option<usize>, RepositoryError>;
}

/// Quota exhaustion surfaced separately from generic failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} limit reached", .feature.label())]
pub struct RateLimited {
    pub feature: Feature,
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimited {
    pub fn from_decision(feature: Feature, decision: &LimitDecision) -> Self {
        Self {
            feature,
            reset_at: decision.reset_at,
        }
    }
}

impl IntoResponse for RateLimited {
    fn into_response(self) -> Response {
        let payload = json!({
            "error": self.to_string(),
            "feature": self.feature.label(),
            "reset_at": self.reset_at,
        });
        (StatusCode::TOO_MANY_REQUESTS, Json(payload)).into_response()
    }
}
