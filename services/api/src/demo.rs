use crate::infra::{directory_from_snapshots, load_snapshots, Services};
use crate::jobs::JobRunner;
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use seatwatch::config::AppConfig;
use seatwatch::error::AppError;
use seatwatch::quota::Tier;
use seatwatch::telemetry;
use seatwatch::workflows::admission::{FacilityCategory, ScoreRequest};
use seatwatch::workflows::alerts::{NotifyMode, RegisterTokenRequest, SubscribeRequest};
use seatwatch::workflows::snapshots::{
    AgeClass, CapacitySnapshot, CapacitySnapshotStore, FacilityId, ReliabilityTier,
};
use seatwatch::workflows::strategy::{AnalyzeRequest, CandidateFacility, FacilityDirectory, GeoPoint};
use seatwatch::workflows::UserId;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// Snapshot CSV export holding the facility's capacity history
    #[arg(long)]
    pub(crate) snapshots: PathBuf,
    #[arg(long)]
    pub(crate) facility: String,
    /// Age class such as AGE_2
    #[arg(long)]
    pub(crate) age_class: String,
    /// Current waitlist position (1 = next in line)
    #[arg(long)]
    pub(crate) queue_position: u32,
    /// Priority category, e.g. dual_income or disability
    #[arg(long)]
    pub(crate) priority: Option<String>,
    /// Facility category, e.g. public or private
    #[arg(long)]
    pub(crate) category: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct DetectArgs {
    /// Snapshot CSV export to diff
    #[arg(long)]
    pub(crate) snapshots: PathBuf,
    /// Wall-clock budget for the pass
    #[arg(long, default_value_t = 60)]
    pub(crate) budget_secs: u64,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Skip the alert delivery portion of the demo.
    #[arg(long)]
    pub(crate) skip_alerts: bool,
}

/// One-shot commands keep stdout for JSON and only log warnings.
fn init_quiet_telemetry() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init_with_override(&config.telemetry, Some("warn"))?;
    Ok(())
}

pub(crate) fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    init_quiet_telemetry()?;
    let snapshots = load_snapshots(Some(&args.snapshots))?;
    let services = Services::in_memory(snapshots, FacilityDirectory::default());

    let query = ScoreRequest {
        facility_id: args.facility,
        age_class: args.age_class,
        queue_position: args.queue_position,
        priority_type: args.priority,
        facility_category: args.category,
    }
    .validate()?;

    match services.admission.score_query(&query, Utc::now()) {
        Ok(outcome) => print_json(&outcome),
        Err(err) => println!("Scoring unavailable: {}", err),
    }
    Ok(())
}

pub(crate) fn run_detect(args: DetectArgs) -> Result<(), AppError> {
    init_quiet_telemetry()?;
    let snapshots = load_snapshots(Some(&args.snapshots))?;
    let directory = directory_from_snapshots(&snapshots);
    let services = Services::in_memory(snapshots, directory);

    let run = services
        .detector
        .run(Utc::now(), std::time::Duration::from_secs(args.budget_secs));
    print_json(&run.report);
    for event in &run.events {
        println!(
            "- {} {}: ~{} seats ({:?}, confidence {:.0}%)",
            event.facility_id,
            event.age_class,
            event.estimated_slots,
            event.source,
            event.confidence * 100.0
        );
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    init_quiet_telemetry()?;
    let now = Utc::now();
    let parent = UserId("demo-parent".to_string());

    let directory = FacilityDirectory::default().with_facilities(demo_facilities());
    let services = Services::in_memory(demo_history(now), directory);
    services.tiers.set_tier(parent.as_str(), Tier::Premium);
    if let Err(err) = services
        .directory
        .follow(parent.clone(), FacilityId("F-NURI".to_string()))
    {
        println!("Facility directory unavailable: {}", err);
        return Ok(());
    }

    println!("Seatwatch demo ({})", now.format("%Y-%m-%d %H:%M UTC"));
    println!("\nAdmission scores for AGE_2, queue position 4");
    for facility in demo_facilities() {
        let request = ScoreRequest {
            facility_id: facility.facility_id.to_string(),
            age_class: AgeClass::Age2.label().to_string(),
            queue_position: 4,
            priority_type: Some("dual_income".to_string()),
            facility_category: None,
        };
        match services.admission.score(&parent, &request, now) {
            Ok(outcome) => {
                let result = outcome.result();
                println!(
                    "- {}: grade {} | 3m {:.0}% / 6m {:.0}% / 12m {:.0}% | eta p50 {:.1} mo, p90 {:.1} mo | {:?} uncertainty",
                    facility.name,
                    result.grade,
                    result.probability.p_3m * 100.0,
                    result.probability.p_6m * 100.0,
                    result.probability.p_12m * 100.0,
                    result.eta_months.p50,
                    result.eta_months.p90,
                    result.uncertainty.band
                );
            }
            Err(err) => println!("- {}: scoring unavailable ({})", facility.name, err),
        }
    }

    println!("\nRoute strategy");
    let desired_start = (now + Duration::days(150)).format("%Y-%m").to_string();
    let request = AnalyzeRequest {
        home: home(),
        child_age_class: AgeClass::Age2.label().to_string(),
        desired_start_month: desired_start,
        need_extended_care: true,
        priority_type: Some("dual_income".to_string()),
        employer: Some("Hanbit Logistics".to_string()),
        candidates: None,
    };
    let record = match services.strategy.analyze(&parent, request, now) {
        Ok(record) => record,
        Err(err) => {
            println!("  Analysis rejected: {}", err);
            return Ok(());
        }
    };
    let summary = &record.widget.summary;
    println!(
        "- Overall grade {} ({:?} confidence): {}",
        summary.overall_grade, summary.confidence, summary.one_liner
    );
    for route in &record.widget.routes {
        println!("  - {} [{:?}] next: {:?}", route.title, route.grade, route.next_step);
        for reason in &route.reasons {
            println!("      * {}", reason);
        }
    }
    println!("  Checklist:");
    for item in &record.checklist {
        println!("    [ ] {} ({})", item.title, item.reason);
    }

    if args.skip_alerts {
        return Ok(());
    }

    println!("\nSeat-opening alerts");
    let subscribe = SubscribeRequest {
        facility_id: "F-HANBIT".to_string(),
        target_classes: vec![AgeClass::Age2.label().to_string()],
        notify_mode: Some(NotifyMode::Instant),
    };
    let token = RegisterTokenRequest {
        token: "ExponentPushToken[demo-device]".to_string(),
    };
    if let Err(err) = services
        .subscriptions
        .subscribe(&parent, &subscribe, now)
        .and_then(|_| services.subscriptions.register_token(&parent, &token, now))
    {
        println!("  Subscription rejected: {}", err);
        return Ok(());
    }

    // two children leave the AGE_2 class this morning
    let opening = snapshot("F-HANBIT", 20, 16, 7, now - Duration::minutes(10));
    if let Err(err) = services.snapshots.append(opening) {
        println!("  Snapshot store unavailable: {}", err);
        return Ok(());
    }

    let runner = JobRunner::new(
        services.detector.clone(),
        services.dispatcher.clone(),
        services.events.clone(),
        std::time::Duration::from_secs(10),
    );
    let report = runner.detect_to(now);
    println!(
        "- Detection: {} series scanned, {} events, {} duplicates ({:?})",
        report.detection.scanned,
        report.detection.events_emitted,
        report.detection.duplicates,
        report.detection.status
    );
    println!(
        "- Dispatch: {} subscriptions matched, {} deliveries recorded",
        report.dispatch.subscriptions_matched, report.dispatch.deliveries_created
    );
    for (device, payload) in services.transport.sent() {
        println!("  -> {}: {} / {}", device, payload.title, payload.body);
    }

    let receipts = runner.push_receipts(now + Duration::minutes(2));
    println!(
        "- Receipts: {} checked, {} delivered, {} stored deliveries",
        receipts.checked,
        receipts.delivered,
        services.alerts.delivery_count()
    );

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(err) => println!("Result could not be rendered: {}", err),
    }
}

fn home() -> GeoPoint {
    GeoPoint {
        lat: 37.5665,
        lng: 126.9780,
    }
}

fn demo_facilities() -> Vec<CandidateFacility> {
    let facility = |id: &str,
                    name: &str,
                    category: FacilityCategory,
                    extended_care: bool,
                    lat: f64,
                    lng: f64| {
        CandidateFacility {
            facility_id: FacilityId(id.to_string()),
            name: name.to_string(),
            category,
            extended_care,
            queue_position: None,
            location: Some(GeoPoint { lat, lng }),
        }
    };
    vec![
        facility("F-HANBIT", "Hanbit Public Daycare", FacilityCategory::Public, false, 37.5690, 126.9790),
        facility("F-LOGIS", "Hanbit Logistics Workplace Center", FacilityCategory::Workplace, false, 37.5610, 126.9820),
        facility("F-NURI", "Nuri Evening Care", FacilityCategory::Private, true, 37.5720, 126.9700),
    ]
}

fn snapshot(
    facility: &str,
    capacity: u32,
    occupied: u32,
    waiting: u32,
    observed_at: DateTime<Utc>,
) -> CapacitySnapshot {
    CapacitySnapshot {
        facility_id: FacilityId(facility.to_string()),
        age_class: AgeClass::Age2,
        capacity_total: capacity,
        current_occupied: occupied,
        waiting_count: waiting,
        observed_at,
        reliability: ReliabilityTier::Official,
    }
}

/// A year of monthly observations per demo facility ending yesterday.
fn demo_history(now: DateTime<Utc>) -> Vec<CapacitySnapshot> {
    let series: [(&str, u32, u32, [u32; 12]); 3] = [
        ("F-HANBIT", 20, 7, [20, 18, 20, 17, 19, 20, 18, 19, 20, 17, 20, 18]),
        ("F-LOGIS", 15, 3, [15, 14, 15, 13, 15, 15, 14, 15, 13, 15, 14, 15]),
        ("F-NURI", 12, 2, [12, 11, 12, 12, 10, 12, 11, 12, 12, 11, 12, 12]),
    ];
    let start = now - Duration::days(1) - Duration::days(30 * 11);

    series
        .iter()
        .flat_map(|(facility, capacity, waiting, occupancy)| {
            occupancy.iter().enumerate().map(move |(month, occupied)| {
                snapshot(
                    facility,
                    *capacity,
                    *occupied,
                    *waiting,
                    start + Duration::days(30 * month as i64),
                )
            })
        })
        .collect()
}
