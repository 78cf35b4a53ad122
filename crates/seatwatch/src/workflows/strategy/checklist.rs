use super::domain::{ChecklistItem, RouteKind, UserContext};
use crate::workflows::admission::PriorityType;

struct Rule {
    key: &'static str,
    title: &'static str,
    reason: &'static str,
}

const COMMON: [Rule; 3] = [
    Rule {
        key: "resident_registration",
        title: "Resident registration certificate",
        reason: "Proves the child lives in the admission district",
    },
    Rule {
        key: "health_check",
        title: "Child health check record",
        reason: "Required by every facility before the first day",
    },
    Rule {
        key: "vaccination_record",
        title: "Vaccination record",
        reason: "Facilities verify the national immunisation schedule at enrolment",
    },
];

const PUBLIC: [Rule; 1] = [Rule {
    key: "residency_proof",
    title: "Proof of residence in the district",
    reason: "Public facilities rank applicants from the district first",
}];

const DUAL_INCOME: Rule = Rule {
    key: "dual_income_employment_certificates",
    title: "Employment certificates for both parents",
    reason: "Backs the dual-income priority claim",
};

const LOW_INCOME: Rule = Rule {
    key: "income_certificate",
    title: "Income certificate",
    reason: "Backs the low-income priority claim",
};

const EMPLOYER: [Rule; 2] = [
    Rule {
        key: "hr_liaison",
        title: "Contact the HR liaison for the workplace facility",
        reason: "Workplace facilities admit through the employer's HR process",
    },
    Rule {
        key: "employment_certificate",
        title: "Employment certificate",
        reason: "Confirms eligibility for the workplace facility",
    },
];

const EXTENDED_HOURS: [Rule; 2] = [
    Rule {
        key: "work_schedule_proof",
        title: "Proof of extended working hours",
        reason: "Extended-hours places go to parents with late or shift schedules",
    },
    Rule {
        key: "pickup_plan",
        title: "Evening pickup plan",
        reason: "Facilities ask who collects the child after regular hours",
    },
];

const PRIVATE: [Rule; 1] = [Rule {
    key: "tuition_confirmation",
    title: "Tuition and fee confirmation",
    reason: "Private facilities charge fees beyond the public subsidy",
}];

/// Document checklist for the chosen route. Route-specific items come first, then the items
/// every application needs. `None` yields only the common items.
pub fn checklist_for(route: Option<RouteKind>, context: &UserContext) -> Vec<ChecklistItem> {
    let mut rules: Vec<&Rule> = Vec::new();
    match route {
        Some(RouteKind::Public) => {
            rules.extend(PUBLIC.iter());
            match context.priority_type {
                PriorityType::DualIncome => rules.push(&DUAL_INCOME),
                PriorityType::LowIncome => rules.push(&LOW_INCOME),
                _ => {}
            }
        }
        Some(RouteKind::Employer) => rules.extend(EMPLOYER.iter()),
        Some(RouteKind::ExtendedHours) => rules.extend(EXTENDED_HOURS.iter()),
        Some(RouteKind::Private) => rules.extend(PRIVATE.iter()),
        None => {}
    }
    rules.extend(COMMON.iter());

    rules
        .into_iter()
        .map(|rule| ChecklistItem {
            key: rule.key.to_string(),
            title: rule.title.to_string(),
            reason: rule.reason.to_string(),
            done: false,
        })
        .collect()
}
