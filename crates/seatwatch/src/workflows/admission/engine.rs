use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;

use crate::workflows::snapshots::CapacitySnapshot;

use super::distribution::{gamma_cdf, gamma_quantile};
use super::domain::{
    AdmissionScoreResult, Dispersion, EtaMonths, Grade, Probability, ScoreDrivers, ScoreOutcome,
    ScoreQuery, Uncertainty, UncertaintyBand,
};
use super::grading::{actions_for, assess_uncertainty, grade_for};
use super::history::summarize;
use super::params::ScoringParams;

/// Stateless admission model: capacity history and queue position in, outcome out.
///
/// Performs no I/O; callers read snapshots and handle caching.
pub struct AdmissionEngine {
    params: ScoringParams,
}

impl AdmissionEngine {
    pub fn new(params: ScoringParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ScoringParams {
        &self.params
    }

    pub fn model_version(&self) -> String {
        self.params.model_version()
    }

    pub fn score(
        &self,
        query: &ScoreQuery,
        history: &[CapacitySnapshot],
        as_of: DateTime<Utc>,
    ) -> ScoreOutcome {
        let profile = summarize(history, &self.params);
        let skip = self.params.priority_skips.skip_for(query.priority_type);
        let effective_position = query.queue_position.saturating_sub(skip);
        let start_month = as_of.month();
        let rate = profile.rate_per_month(&self.params);
        let seasonal_factor = round_to(self.params.effective_months(6.0, start_month) / 6.0, 3);

        let drivers = ScoreDrivers {
            queue_position: query.queue_position,
            effective_queue_position: effective_position,
            priority_type: query.priority_type,
            priority_skip: query.queue_position - effective_position,
            turnover_rate_per_month: round_to(rate, 3),
            seasonal_factor,
            sample_windows: profile.sample_windows(),
            observed_turnover: profile.total_freed,
            dispersion: profile.dispersion,
        };

        if history.is_empty() || (rate <= 0.0 && effective_position > 0) {
            return ScoreOutcome::InsufficientData(self.insufficient(
                query,
                drivers,
                !history.is_empty(),
                as_of,
            ));
        }

        let shape = f64::from(effective_position);
        let probability = self.horizon_probabilities(shape, rate, start_month);
        let eta_months = self.eta_quantiles(shape, rate, start_month);
        let grade = grade_for(
            probability.p_6m,
            eta_months.p50,
            &self.params.grade_thresholds,
            self.params.eta_ceiling_for(query.category),
        );
        let uncertainty = assess_uncertainty(&profile, &self.params);

        ScoreOutcome::Estimated(AdmissionScoreResult {
            request_id: Uuid::new_v4(),
            model_version: self.model_version(),
            facility_id: query.facility_id.clone(),
            age_class: query.age_class,
            grade,
            probability,
            eta_months,
            uncertainty,
            drivers,
            actions: actions_for(grade),
            scored_at: as_of,
        })
    }

    fn insufficient(
        &self,
        query: &ScoreQuery,
        drivers: ScoreDrivers,
        has_history: bool,
        as_of: DateTime<Utc>,
    ) -> AdmissionScoreResult {
        let mut notes = Vec::new();
        if !has_history {
            notes.push(format!(
                "no capacity history recorded for {} {}",
                query.facility_id, query.age_class
            ));
        } else {
            notes.push("no turnover observed and no capacity to derive a prior rate".to_string());
        }
        notes.push("probabilities are withheld until turnover data accumulates".to_string());

        AdmissionScoreResult {
            request_id: Uuid::new_v4(),
            model_version: self.model_version(),
            facility_id: query.facility_id.clone(),
            age_class: query.age_class,
            grade: Grade::F,
            probability: Probability {
                p_3m: 0.0,
                p_6m: 0.0,
                p_12m: 0.0,
            },
            eta_months: EtaMonths {
                p50: self.params.max_eta_months,
                p90: self.params.max_eta_months,
            },
            uncertainty: Uncertainty {
                band: UncertaintyBand::High,
                notes,
            },
            drivers: ScoreDrivers {
                dispersion: Dispersion::Degenerate,
                ..drivers
            },
            actions: actions_for(Grade::F),
            scored_at: as_of,
        }
    }

    /// Probabilities at 3/6/12 calendar months, each evaluated at the horizon's seasonally
    /// weighted length, clamped into [0, 1] and forced non-decreasing.
    fn horizon_probabilities(&self, shape: f64, rate: f64, start_month: u32) -> Probability {
        let at = |months: f64| {
            clamp_unit(gamma_cdf(
                self.params.effective_months(months, start_month),
                shape,
                rate,
            ))
        };
        let p_3m = at(3.0);
        let p_6m = at(6.0).max(p_3m);
        let p_12m = at(12.0).max(p_6m);

        Probability {
            p_3m: round_to(p_3m, 4),
            p_6m: round_to(p_6m, 4),
            p_12m: round_to(p_12m, 4),
        }
    }

    /// Quantiles are taken in weighted time and mapped back to calendar months.
    fn eta_quantiles(&self, shape: f64, rate: f64, start_month: u32) -> EtaMonths {
        let ceiling = self.params.max_eta_months;
        let weighted_ceiling = self.params.effective_months(ceiling, start_month);
        let months = |q: f64| {
            let weighted = gamma_quantile(q, shape, rate, weighted_ceiling);
            if weighted >= weighted_ceiling {
                ceiling
            } else {
                self.params.calendar_months(weighted, start_month, ceiling)
            }
        };
        let p50 = round_to(months(0.5), 1).max(0.0);
        let p90 = round_to(months(0.9), 1).max(p50);
        EtaMonths { p50, p90 }
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
