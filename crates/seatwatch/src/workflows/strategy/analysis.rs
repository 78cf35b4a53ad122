use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::domain::{
    CandidateFacility, Confidence, FacilityScoreView, RecommendationSummary, RecommendationWidget,
    RouteCard, RouteGrade, RouteKind, UserContext,
};
use super::params::StrategyParams;
use crate::workflows::admission::{
    AdmissionScoreResult, FacilityCategory, Grade, PriorityType, ScoreOutcome, UncertaintyBand,
};

/// Candidate paired with its scoring outcome.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: CandidateFacility,
    pub outcome: ScoreOutcome,
}

impl ScoredCandidate {
    fn result(&self) -> &AdmissionScoreResult {
        self.outcome.result()
    }

    /// Letter grade then median wait; estimates ahead of insufficient-data results.
    fn rank_key(&self) -> (bool, Grade, f64) {
        let result = self.result();
        (!self.outcome.is_estimated(), result.grade, result.eta_months.p50)
    }

    fn view(&self) -> FacilityScoreView {
        let result = self.result();
        FacilityScoreView {
            facility_id: self.candidate.facility_id.clone(),
            name: self.candidate.name.clone(),
            grade: result.grade,
            p_6m: result.probability.p_6m,
            eta_p50: result.eta_months.p50,
            uncertainty: result.uncertainty.band,
            estimated: self.outcome.is_estimated(),
        }
    }
}

/// Assigns a candidate to exactly one admission route.
pub fn route_for(candidate: &CandidateFacility, context: &UserContext) -> RouteKind {
    if candidate.category == FacilityCategory::Workplace {
        RouteKind::Employer
    } else if candidate.extended_care && context.need_extended_care {
        RouteKind::ExtendedHours
    } else if candidate.category.is_public() {
        RouteKind::Public
    } else {
        RouteKind::Private
    }
}

/// Months the family can wait before the desired start, never below the configured minimum.
pub fn start_window_months(context: &UserContext, params: &StrategyParams, now: DateTime<Utc>) -> f64 {
    f64::from(context.months_until_start(now).max(params.min_start_window_months))
}

pub fn route_grade(best: &ScoredCandidate, window_months: f64) -> RouteGrade {
    if !best.outcome.is_estimated() {
        return RouteGrade::Low;
    }
    let result = best.result();
    match result.grade {
        Grade::A | Grade::B if result.eta_months.p50 <= window_months => RouteGrade::High,
        Grade::A | Grade::B | Grade::C | Grade::D => RouteGrade::Medium,
        Grade::E | Grade::F => RouteGrade::Low,
    }
}

struct RankedRoute {
    card: RouteCard,
    best: Option<ScoredCandidate>,
}

/// Builds the recommendation widget from scored candidates.
pub fn build_widget(
    context: &UserContext,
    scored: Vec<ScoredCandidate>,
    params: &StrategyParams,
    now: DateTime<Utc>,
) -> (RecommendationWidget, Option<RouteKind>) {
    let window = start_window_months(context, params, now);
    let mut routes = partition(context, scored)
        .into_iter()
        .map(|(kind, members)| rank_route(kind, members, context, params, window))
        .collect::<Vec<_>>();

    routes.sort_by(|left, right| {
        left.card.grade.cmp(&right.card.grade).then_with(|| {
            let left_eta = left.card.best_eta_p50.unwrap_or(f64::INFINITY);
            let right_eta = right.card.best_eta_p50.unwrap_or(f64::INFINITY);
            left_eta.total_cmp(&right_eta)
        })
    });

    let leader = routes
        .first()
        .and_then(|route| route.best.as_ref().map(|best| (route.card.kind, best.clone())));

    let (summary, chosen) = match leader {
        Some((kind, best)) if best.outcome.is_estimated() => {
            let result = best.result();
            (
                RecommendationSummary {
                    overall_grade: result.grade,
                    one_liner: one_liner(&best, kind, context, params, window),
                    confidence: Confidence::from(result.uncertainty.band),
                    updated_at: now,
                },
                Some(kind),
            )
        }
        _ => (fallback_summary(routes.is_empty(), now), None),
    };

    let widget = RecommendationWidget {
        recommendation_id: Uuid::new_v4(),
        user_id: context.user_id.clone(),
        summary,
        routes: routes.into_iter().map(|route| route.card).collect(),
        disclaimer: params.disclaimer.clone(),
    };
    (widget, chosen)
}

fn partition(
    context: &UserContext,
    scored: Vec<ScoredCandidate>,
) -> Vec<(RouteKind, Vec<ScoredCandidate>)> {
    let mut grouped: Vec<(RouteKind, Vec<ScoredCandidate>)> = Vec::new();
    for entry in scored {
        let kind = route_for(&entry.candidate, context);
        match grouped.iter_mut().find(|(existing, _)| *existing == kind) {
            Some((_, members)) => members.push(entry),
            None => grouped.push((kind, vec![entry])),
        }
    }
    grouped.sort_by_key(|(kind, _)| *kind);
    grouped
}

fn rank_route(
    kind: RouteKind,
    mut members: Vec<ScoredCandidate>,
    context: &UserContext,
    params: &StrategyParams,
    window: f64,
) -> RankedRoute {
    members.sort_by(|left, right| {
        let (l_missing, l_grade, l_eta) = left.rank_key();
        let (r_missing, r_grade, r_eta) = right.rank_key();
        l_missing
            .cmp(&r_missing)
            .then(l_grade.cmp(&r_grade))
            .then(l_eta.total_cmp(&r_eta))
    });

    let best = members.first().cloned();
    let grade = best
        .as_ref()
        .map(|best| route_grade(best, window))
        .unwrap_or(RouteGrade::Low);
    let estimated_best = best.as_ref().filter(|best| best.outcome.is_estimated());

    let card = RouteCard {
        kind,
        title: kind.title().to_string(),
        grade,
        reasons: reasons_for(estimated_best, &members, params),
        next_step: next_step(kind, grade, estimated_best, context),
        best_facility_id: estimated_best.map(|best| best.candidate.facility_id.clone()),
        best_eta_p50: estimated_best.map(|best| best.result().eta_months.p50),
        facilities: members.iter().map(ScoredCandidate::view).collect(),
    };

    RankedRoute { card, best }
}

fn reasons_for(
    best: Option<&ScoredCandidate>,
    members: &[ScoredCandidate],
    params: &StrategyParams,
) -> Vec<String> {
    let mut reasons = Vec::new();

    if let Some(best) = best {
        let result = best.result();
        let drivers = &result.drivers;
        reasons.push(format!(
            "{}: {:.0}% chance of admission within 6 months (grade {})",
            best.candidate.name,
            result.probability.p_6m * 100.0,
            result.grade
        ));
        reasons.push(format!(
            "Median wait {:.1} months, 90% of outcomes within {:.1} months",
            result.eta_months.p50, result.eta_months.p90
        ));
        if drivers.priority_skip > 0 {
            reasons.push(format!(
                "{} priority skips {} places (queue {} to {})",
                drivers.priority_type.label(),
                drivers.priority_skip,
                drivers.queue_position,
                drivers.effective_queue_position
            ));
        } else {
            reasons.push(format!(
                "No priority adjustment applied (queue position {})",
                drivers.queue_position
            ));
        }
        if result.uncertainty.band == UncertaintyBand::High {
            for note in &result.uncertainty.notes {
                reasons.push(format!("Low confidence: {note}"));
            }
        }
        let estimated = members.iter().filter(|m| m.outcome.is_estimated()).count();
        if estimated > 1 {
            reasons.push(format!("{estimated} facilities compared in this route"));
        }
    } else {
        reasons.push(
            "No facility in this route has enough capacity history to estimate admission"
                .to_string(),
        );
    }

    const FALLBACKS: [&str; 3] = [
        "Add more facilities of this type to compare",
        "Turn on TO alerts to hear about openings as they happen",
        "Estimates refresh as new capacity snapshots arrive",
    ];
    let mut fallbacks = FALLBACKS.iter();
    while reasons.len() < params.min_reasons {
        match fallbacks.next() {
            Some(reason) => reasons.push((*reason).to_string()),
            None => break,
        }
    }
    reasons
}

fn next_step(
    kind: RouteKind,
    grade: RouteGrade,
    best: Option<&ScoredCandidate>,
    context: &UserContext,
) -> Option<String> {
    if kind == RouteKind::Employer && context.employer.is_none() {
        return Some(
            "Confirm with your HR team that the workplace facility accepts your enrolment"
                .to_string(),
        );
    }
    let Some(best) = best else {
        return Some("Add facilities with published capacity data".to_string());
    };
    let name = &best.candidate.name;
    Some(match grade {
        RouteGrade::High => format!("Prepare enrolment documents for {name}"),
        RouteGrade::Medium => format!("Turn on TO alerts for {name} and keep a second choice"),
        RouteGrade::Low => "Broaden the facility selection or add extended-hours options".to_string(),
    })
}

fn one_liner(
    best: &ScoredCandidate,
    kind: RouteKind,
    context: &UserContext,
    params: &StrategyParams,
    window: f64,
) -> String {
    let result = best.result();
    let drivers = &result.drivers;
    let name = &best.candidate.name;
    let p_6m = result.probability.p_6m * 100.0;

    let boosted = drivers.priority_type != PriorityType::General
        && (drivers.priority_skip >= params.priority_boost_min_skip
            || f64::from(drivers.priority_skip)
                >= params.priority_boost_share * f64::from(drivers.queue_position));

    if drivers.priority_skip > 0 && boosted {
        format!(
            "Your {} priority moves you {} places ahead at {name}: {p_6m:.0}% chance within 6 months.",
            drivers.priority_type.label(),
            drivers.priority_skip
        )
    } else if result.eta_months.p50 > window {
        format!(
            "{name} is your best {} option, but the median wait of {:.1} months runs past your {} start.",
            kind.title().to_lowercase(),
            result.eta_months.p50,
            context.desired_start.format("%Y-%m")
        )
    } else {
        format!(
            "{name} gives a {p_6m:.0}% chance of admission within 6 months (grade {}).",
            result.grade
        )
    }
}

fn fallback_summary(no_candidates: bool, now: DateTime<Utc>) -> RecommendationSummary {
    let one_liner = if no_candidates {
        "No facilities were selected; add nearby or followed facilities to get a recommendation."
    } else {
        "None of the selected facilities has enough capacity history to estimate admission; \
         broaden the facility selection."
    };
    RecommendationSummary {
        overall_grade: Grade::F,
        one_liner: one_liner.to_string(),
        confidence: Confidence::Low,
        updated_at: now,
    }
}
