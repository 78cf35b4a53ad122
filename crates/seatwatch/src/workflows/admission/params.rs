use serde::{Deserialize, Serialize};

use super::domain::{FacilityCategory, PriorityType};

/// Calibration constants for the admission model.
///
/// Thresholds and rates here are tuned against historical admission outcomes; changing the
/// priority table requires bumping `priority_table_version` so cached and audited results stay
/// reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringParams {
    pub engine_version: String,
    pub priority_table_version: String,
    /// Width of the turnover counting window, in days.
    pub window_days: f64,
    /// Prior vacancy rate per occupied seat per month used when history is thin.
    pub prior_vacancy_rate_per_seat_month: f64,
    /// Weight of the prior expressed in months of observation.
    pub prior_weight_months: f64,
    /// Relative tolerance for treating variance as equal to the mean (Poisson case).
    pub poisson_tolerance: f64,
    pub min_windows_low: usize,
    pub min_windows_medium: usize,
    /// Coefficient of variation ceiling for a LOW uncertainty band.
    pub max_cv_low: f64,
    pub grade_thresholds: GradeThresholds,
    pub eta_ceiling_default_months: f64,
    pub eta_ceiling_public_months: f64,
    pub eta_ceiling_national_public_months: f64,
    pub max_eta_months: f64,
    /// Turnover intensity by calendar month, January first. A horizon's effective length is
    /// the sum of the multipliers of the months it covers.
    pub seasonal_factors: [f64; 12],
    pub priority_skips: PrioritySkips,
    /// Queue positions sharing one cache entry.
    pub cache_bucket_width: u32,
    pub cache_ttl_secs: i64,
}

/// Minimum `p_6m` for each letter grade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradeThresholds {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
}

/// Effective ranks skipped per priority category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrioritySkips {
    pub dual_income: u32,
    pub sibling: u32,
    pub multi_child: u32,
    pub low_income: u32,
    pub single_parent: u32,
    pub disability: u32,
}

impl PrioritySkips {
    pub fn skip_for(&self, priority: PriorityType) -> u32 {
        match priority {
            PriorityType::General => 0,
            PriorityType::DualIncome => self.dual_income,
            PriorityType::Sibling => self.sibling,
            PriorityType::MultiChild => self.multi_child,
            PriorityType::LowIncome => self.low_income,
            PriorityType::SingleParent => self.single_parent,
            PriorityType::Disability => self.disability,
        }
    }
}

impl ScoringParams {
    pub fn standard() -> Self {
        Self {
            engine_version: "admission-gamma@1.0.0".to_string(),
            priority_table_version: "p1".to_string(),
            window_days: 30.0,
            prior_vacancy_rate_per_seat_month: 0.035,
            prior_weight_months: 1.0,
            poisson_tolerance: 0.25,
            min_windows_low: 6,
            min_windows_medium: 3,
            max_cv_low: 1.0,
            grade_thresholds: GradeThresholds {
                a: 0.70,
                b: 0.50,
                c: 0.30,
                d: 0.15,
                e: 0.05,
            },
            eta_ceiling_default_months: 12.0,
            eta_ceiling_public_months: 18.0,
            eta_ceiling_national_public_months: 24.0,
            max_eta_months: 60.0,
            seasonal_factors: [
                1.1, 1.3, 1.5, 1.05, 1.0, 0.95, 0.9, 1.05, 1.15, 1.0, 1.05, 1.15,
            ],
            priority_skips: PrioritySkips {
                dual_income: 3,
                sibling: 4,
                multi_child: 5,
                low_income: 6,
                single_parent: 7,
                disability: 8,
            },
            cache_bucket_width: 1,
            cache_ttl_secs: 3600,
        }
    }

    pub fn model_version(&self) -> String {
        format!("{}+{}", self.engine_version, self.priority_table_version)
    }

    pub fn eta_ceiling_for(&self, category: Option<FacilityCategory>) -> f64 {
        match category {
            Some(FacilityCategory::NationalPublic) => self.eta_ceiling_national_public_months,
            Some(FacilityCategory::Public) => self.eta_ceiling_public_months,
            _ => self.eta_ceiling_default_months,
        }
    }

    /// Seasonal multiplier for a 1-based calendar month.
    pub fn seasonal_factor(&self, month: u32) -> f64 {
        let index = month.clamp(1, 12) as usize - 1;
        self.seasonal_factors[index]
    }

    /// Seasonally weighted length of the `months` starting at `start_month`. A trailing
    /// partial month contributes its share of that month's multiplier.
    pub fn effective_months(&self, months: f64, start_month: u32) -> f64 {
        if months <= 0.0 || !months.is_finite() {
            return 0.0;
        }
        let whole = months.floor() as u32;
        let full: f64 = (0..whole)
            .map(|offset| self.seasonal_factor(month_after(start_month, offset)))
            .sum();
        full + (months - f64::from(whole)) * self.seasonal_factor(month_after(start_month, whole))
    }

    /// Calendar months from `start_month` needed to accumulate `effective` seasonal months,
    /// capped at `ceiling`. Inverse of [`Self::effective_months`].
    pub fn calendar_months(&self, effective: f64, start_month: u32, ceiling: f64) -> f64 {
        if effective <= 0.0 {
            return 0.0;
        }
        let mut remaining = effective;
        let mut elapsed = 0u32;
        while f64::from(elapsed) < ceiling {
            let factor = self.seasonal_factor(month_after(start_month, elapsed));
            if factor > 0.0 && remaining <= factor {
                return (f64::from(elapsed) + remaining / factor).min(ceiling);
            }
            remaining -= factor.max(0.0);
            elapsed += 1;
        }
        ceiling
    }

    pub fn queue_bucket(&self, queue_position: u32) -> u32 {
        queue_position / self.cache_bucket_width.max(1)
    }
}

/// 1-based calendar month `offset` months after `start_month`.
fn month_after(start_month: u32, offset: u32) -> u32 {
    (start_month.clamp(1, 12) - 1 + offset % 12) % 12 + 1
}
