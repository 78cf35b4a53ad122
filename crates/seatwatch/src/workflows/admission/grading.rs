use super::domain::{Dispersion, Grade, Uncertainty, UncertaintyBand};
use super::history::TurnoverProfile;
use super::params::{GradeThresholds, ScoringParams};

/// Letter grade from the six-month probability, made one step stricter when the median wait
/// exceeds the facility's ETA ceiling.
pub fn grade_for(p_6m: f64, eta_p50: f64, thresholds: &GradeThresholds, eta_ceiling: f64) -> Grade {
    let grade = if p_6m >= thresholds.a {
        Grade::A
    } else if p_6m >= thresholds.b {
        Grade::B
    } else if p_6m >= thresholds.c {
        Grade::C
    } else if p_6m >= thresholds.d {
        Grade::D
    } else if p_6m >= thresholds.e {
        Grade::E
    } else {
        Grade::F
    };

    if eta_p50 > eta_ceiling {
        grade.downgraded()
    } else {
        grade
    }
}

pub(crate) fn assess_uncertainty(profile: &TurnoverProfile, params: &ScoringParams) -> Uncertainty {
    let windows = profile.sample_windows();
    let degenerate = matches!(profile.dispersion, Dispersion::Degenerate);
    let mut notes = Vec::new();

    if windows < params.min_windows_medium || degenerate {
        if windows < params.min_windows_medium {
            notes.push(format!(
                "only {windows} turnover window(s) observed; {} needed for a stable fit",
                params.min_windows_medium
            ));
        }
        if profile.total_freed == 0 {
            notes.push(
                "no turnover observed in the capacity history; rate relies on the regional prior"
                    .to_string(),
            );
        } else if degenerate {
            notes.push(format!(
                "turnover variance {:.2} is below the mean {:.2}; dispersion cannot be estimated",
                profile.variance, profile.mean
            ));
        }
        if profile.prior_dominated(params) {
            notes.push(format!(
                "estimate is dominated by the prior vacancy rate ({:.1} months of history)",
                profile.months_observed
            ));
        }
        return Uncertainty {
            band: UncertaintyBand::High,
            notes,
        };
    }

    let cv = profile.coefficient_of_variation();
    if windows >= params.min_windows_low && cv <= params.max_cv_low {
        return Uncertainty {
            band: UncertaintyBand::Low,
            notes: vec!["core inputs complete".to_string()],
        };
    }

    if windows < params.min_windows_low {
        notes.push(format!(
            "{windows} turnover windows observed; estimate firms up after {}",
            params.min_windows_low
        ));
    }
    if cv > params.max_cv_low {
        notes.push(format!(
            "turnover arrives in bursts (coefficient of variation {cv:.2})"
        ));
    }
    Uncertainty {
        band: UncertaintyBand::Medium,
        notes,
    }
}

/// Suggested next moves for a grade tier.
pub(crate) fn actions_for(grade: Grade) -> Vec<String> {
    let actions: &[&str] = match grade {
        Grade::A | Grade::B => &[
            "Keep eligibility documents current so an offer can be accepted quickly",
            "Confirm the enrolment steps with the facility director",
        ],
        Grade::C | Grade::D => &[
            "Add a second-choice facility to spread the risk",
            "Turn on TO alerts for this facility",
            "Check whether a priority category applies to your household",
        ],
        Grade::E | Grade::F => &[
            "Broaden the facility search radius",
            "Consider workplace or extended-hours facilities",
            "Turn on TO alerts to catch unexpected openings",
        ],
    };
    actions.iter().map(|action| action.to_string()).collect()
}
