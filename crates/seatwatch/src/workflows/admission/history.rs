use crate::workflows::snapshots::CapacitySnapshot;

use super::domain::Dispersion;
use super::params::ScoringParams;

/// Turnover statistics derived from a facility's capacity history.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TurnoverProfile {
    /// Freed seats per counting window, oldest first.
    pub(crate) window_counts: Vec<u64>,
    pub(crate) total_freed: u64,
    pub(crate) months_observed: f64,
    pub(crate) mean: f64,
    pub(crate) variance: f64,
    pub(crate) capacity: u32,
    pub(crate) dispersion: Dispersion,
}

impl TurnoverProfile {
    pub(crate) fn sample_windows(&self) -> usize {
        self.window_counts.len()
    }

    /// Standard deviation over mean; infinite when nothing turned over.
    pub(crate) fn coefficient_of_variation(&self) -> f64 {
        if self.mean <= 0.0 {
            f64::INFINITY
        } else {
            self.variance.sqrt() / self.mean
        }
    }

    /// Gamma-prior posterior mean of the monthly turnover rate, before seasonality.
    pub(crate) fn rate_per_month(&self, params: &ScoringParams) -> f64 {
        let prior_rate = params.prior_vacancy_rate_per_seat_month * f64::from(self.capacity);
        let weight = params.prior_weight_months.max(0.0);
        let denominator = weight + self.months_observed;
        if denominator <= 0.0 {
            return prior_rate;
        }
        (prior_rate * weight + self.total_freed as f64) / denominator
    }

    /// Whether the prior carries more weight than the observed months.
    pub(crate) fn prior_dominated(&self, params: &ScoringParams) -> bool {
        params.prior_weight_months > self.months_observed
    }
}

/// Seats freed between two consecutive observations: vacated seats plus added capacity.
pub(crate) fn freed_between(previous: &CapacitySnapshot, current: &CapacitySnapshot) -> u64 {
    let vacated = previous
        .current_occupied
        .saturating_sub(current.current_occupied);
    let added = current.capacity_total.saturating_sub(previous.capacity_total);
    u64::from(vacated) + u64::from(added)
}

/// Buckets freed seats into fixed windows and fits the count distribution.
pub(crate) fn summarize(history: &[CapacitySnapshot], params: &ScoringParams) -> TurnoverProfile {
    let mut ordered = history.to_vec();
    ordered.sort_by_key(|snapshot| snapshot.observed_at);
    let history = ordered.as_slice();

    let capacity = history
        .last()
        .map(|snapshot| snapshot.capacity_total)
        .unwrap_or(0);

    let (Some(first), Some(last)) = (history.first(), history.last()) else {
        return empty_profile(capacity);
    };

    let window_days = params.window_days.max(1.0);
    let span_days = (last.observed_at - first.observed_at).num_seconds() as f64 / 86_400.0;
    if history.len() < 2 || span_days <= 0.0 {
        return empty_profile(capacity);
    }

    let window_total = (span_days / window_days).ceil().max(1.0) as usize;
    let mut window_counts = vec![0u64; window_total];
    let mut total_freed = 0u64;

    for pair in history.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        let freed = freed_between(previous, current);
        if freed == 0 {
            continue;
        }
        let offset_days = (current.observed_at - first.observed_at).num_seconds() as f64 / 86_400.0;
        // an observation exactly on a boundary closes the earlier window
        let index = ((offset_days / window_days).ceil() as usize)
            .saturating_sub(1)
            .min(window_total - 1);
        window_counts[index] = window_counts[index].saturating_add(freed);
        total_freed = total_freed.saturating_add(freed);
    }

    let (mean, variance) = moments(&window_counts);
    let dispersion = fit_dispersion(mean, variance, params.poisson_tolerance);

    TurnoverProfile {
        window_counts,
        total_freed,
        months_observed: span_days / 30.0,
        mean,
        variance,
        capacity,
        dispersion,
    }
}

fn empty_profile(capacity: u32) -> TurnoverProfile {
    TurnoverProfile {
        window_counts: Vec::new(),
        total_freed: 0,
        months_observed: 0.0,
        mean: 0.0,
        variance: 0.0,
        capacity,
        dispersion: Dispersion::Degenerate,
    }
}

/// Mean and unbiased sample variance.
fn moments(counts: &[u64]) -> (f64, f64) {
    if counts.is_empty() {
        return (0.0, 0.0);
    }
    let n = counts.len() as f64;
    let mean = counts.iter().map(|&count| count as f64).sum::<f64>() / n;
    if counts.len() < 2 {
        return (mean, 0.0);
    }
    let squares: f64 = counts
        .iter()
        .map(|&count| (count as f64 - mean).powi(2))
        .sum();
    (mean, squares / (n - 1.0))
}

/// Method-of-moments negative-binomial fit with a Poisson fallback.
pub(crate) fn fit_dispersion(mean: f64, variance: f64, tolerance: f64) -> Dispersion {
    if mean <= 0.0 {
        return Dispersion::Degenerate;
    }
    if (variance - mean).abs() <= mean * tolerance {
        return Dispersion::Poisson;
    }
    if variance > mean {
        let r = mean * mean / (variance - mean);
        let p = mean / variance;
        return Dispersion::NegativeBinomial { r, p };
    }
    Dispersion::Degenerate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::snapshots::{AgeClass, FacilityId, ReliabilityTier};
    use chrono::{Duration, TimeZone, Utc};

    fn series(occupancy: &[(i64, u32, u32)]) -> Vec<CapacitySnapshot> {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .expect("valid timestamp");
        occupancy
            .iter()
            .map(|&(day, capacity, occupied)| CapacitySnapshot {
                facility_id: FacilityId("F1".to_string()),
                age_class: AgeClass::Age2,
                capacity_total: capacity,
                current_occupied: occupied,
                waiting_count: 3,
                observed_at: start + Duration::days(day),
                reliability: ReliabilityTier::Official,
            })
            .collect()
    }

    #[test]
    fn counts_vacated_and_added_seats_per_window() {
        let history = series(&[
            (0, 10, 10),
            (10, 10, 9),
            (20, 10, 10),
            (30, 12, 10),
            (45, 12, 8),
            (60, 12, 12),
        ]);

        let profile = summarize(&history, &ScoringParams::standard());

        assert_eq!(profile.window_counts, vec![3, 2]);
        assert_eq!(profile.total_freed, 5);
        assert_eq!(profile.capacity, 12);
        assert!((profile.months_observed - 2.0).abs() < 1e-9);
    }

    #[test]
    fn huge_capacities_accumulate_without_wrapping() {
        let seats = 3_000_000_000;
        let history = series(&[(0, seats, seats), (5, seats, 0), (10, seats, seats), (15, seats, 0)]);

        let profile = summarize(&history, &ScoringParams::standard());

        assert_eq!(profile.window_counts, vec![6_000_000_000]);
        assert_eq!(profile.total_freed, 6_000_000_000);
        assert!((profile.mean - 6e9).abs() < 1.0);
    }

    #[test]
    fn single_snapshot_has_no_windows() {
        let profile = summarize(&series(&[(0, 10, 8)]), &ScoringParams::standard());
        assert_eq!(profile.sample_windows(), 0);
        assert_eq!(profile.dispersion, Dispersion::Degenerate);
        assert_eq!(profile.capacity, 10);
    }

    #[test]
    fn overdispersed_counts_fit_negative_binomial() {
        match fit_dispersion(2.0, 6.0, 0.25) {
            Dispersion::NegativeBinomial { r, p } => {
                assert!((r - 1.0).abs() < 1e-12);
                assert!((p - 1.0 / 3.0).abs() < 1e-12);
            }
            other => panic!("expected negative binomial, got {other:?}"),
        }
    }

    #[test]
    fn near_equal_moments_fall_back_to_poisson() {
        assert_eq!(fit_dispersion(2.0, 2.3, 0.25), Dispersion::Poisson);
        assert_eq!(fit_dispersion(2.0, 0.4, 0.25), Dispersion::Degenerate);
        assert_eq!(fit_dispersion(0.0, 0.0, 0.25), Dispersion::Degenerate);
    }

    #[test]
    fn prior_fills_in_for_short_histories() {
        let params = ScoringParams::standard();
        let profile = summarize(&series(&[(0, 20, 20)]), &params);
        let expected = params.prior_vacancy_rate_per_seat_month * 20.0;
        assert!((profile.rate_per_month(&params) - expected).abs() < 1e-12);
        assert!(profile.prior_dominated(&params));
    }
}
