use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;

use super::common::*;
use crate::workflows::snapshots::{AgeClass, CapacitySnapshotStore, FacilityId};
use crate::workflows::turnover::{JobStatus, ToEventRepository, ToSource};

const BUDGET: Duration = Duration::from_secs(30);

#[test]
fn emits_one_event_per_freed_series() {
    let mut snapshots = freed_pair("F1", AgeClass::Age2, 2);
    snapshots.extend(freed_pair("F2", AgeClass::Age1, 0));
    let (detector, events) = detector(store(snapshots));

    let run = detector.run(at(9, 10), BUDGET);

    assert_eq!(run.report.status, JobStatus::Completed);
    assert_eq!(run.report.scanned, 2);
    assert_eq!(run.report.events_emitted, 1);
    assert_eq!(run.report.errors, 0);
    assert_eq!(run.events[0].facility_id.as_str(), "F1");
    assert_eq!(run.events[0].source, ToSource::Vacancy);
    assert_eq!(run.events[0].estimated_slots, 2);
    assert_eq!(run.events[0].window_start, at(9, 0));
    assert_eq!(run.report.events, vec![run.events[0].event_id]);
    assert_eq!(events.len(), 1);
}

#[test]
fn rerunning_on_unchanged_pair_emits_nothing_new() {
    let (detector, events) = detector(store(freed_pair("F1", AgeClass::Age2, 1)));

    let first = detector.run(at(9, 10), BUDGET);
    let second = detector.run(at(9, 40), BUDGET);

    assert_eq!(first.report.events_emitted, 1);
    assert_eq!(second.report.events_emitted, 0);
    assert_eq!(second.report.duplicates, 1);
    assert_eq!(second.report.status, JobStatus::Completed);
    assert_eq!(events.len(), 1);
}

#[test]
fn later_drop_in_same_window_does_not_overwrite() {
    let snapshots = store(freed_pair("F1", AgeClass::Age2, 1));
    let (detector, events) = detector(snapshots.clone());
    let first = detector.run(at(9, 10), BUDGET);

    snapshots
        .append(snapshot("F1", AgeClass::Age2, 20, 16, at(9, 25)))
        .expect("append");
    let second = detector.run(at(9, 28), BUDGET);

    assert_eq!(second.report.duplicates, 1);
    let stored = events
        .recent(Some(&FacilityId("F1".to_string())), at(0, 0), 10)
        .expect("recent events");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].event_id, first.events[0].event_id);
    assert_eq!(stored[0].estimated_slots, 1);
}

#[test]
fn concurrent_runs_store_a_single_event() {
    let (detector, events) = detector(store(freed_pair("F2", AgeClass::Age2, 3)));

    let reports = thread::scope(|scope| {
        let handles = (0..2)
            .map(|_| scope.spawn(|| detector.run(at(9, 10), BUDGET).report))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("detector thread"))
            .collect::<Vec<_>>()
    });

    let emitted: usize = reports.iter().map(|report| report.events_emitted).sum();
    let duplicates: usize = reports.iter().map(|report| report.duplicates).sum();
    assert_eq!(emitted, 1);
    assert_eq!(duplicates, 1);
    assert_eq!(events.len(), 1);
}

#[test]
fn per_series_errors_are_counted_not_propagated() {
    let mut snapshots = freed_pair("F1", AgeClass::Age2, 1);
    snapshots.push(snapshot("F3", AgeClass::Age2, 10, 12, at(8, 0)));
    snapshots.push(snapshot("F3", AgeClass::Age2, 10, 9, at(9, 0)));
    snapshots.push(snapshot("F4", AgeClass::Age2, 10, 9, at(9, 0)));
    let (detector, events) = detector(store(snapshots));

    let run = detector.run(at(9, 10), BUDGET);

    assert_eq!(run.report.status, JobStatus::Partial);
    assert_eq!(run.report.scanned, 3);
    assert_eq!(run.report.errors, 2);
    assert_eq!(run.report.events_emitted, 1);
    assert_eq!(events.len(), 1);
}

#[test]
fn transient_listing_failure_is_retried() {
    let snapshots = Arc::new(FlakyKeysStore::new(freed_pair("F1", AgeClass::Age2, 1), 1));
    let (detector, _) = detector(snapshots.clone());

    let run = detector.run(at(9, 10), BUDGET);

    assert_eq!(snapshots.listings(), 2);
    assert_eq!(run.report.status, JobStatus::Completed);
    assert_eq!(run.report.events_emitted, 1);
}

#[test]
fn listing_failure_after_retries_fails_the_batch() {
    let snapshots = Arc::new(FlakyKeysStore::new(freed_pair("F1", AgeClass::Age2, 1), 10));
    let (detector, events) = detector(snapshots.clone());

    let run = detector.run(at(9, 10), BUDGET);

    assert_eq!(snapshots.listings(), 3);
    assert_eq!(run.report.status, JobStatus::Failed);
    assert_eq!(run.report.scanned, 0);
    assert!(events.is_empty());
}

#[test]
fn exhausted_budget_reports_partial() {
    let (detector, _) = detector(store(freed_pair("F1", AgeClass::Age2, 1)));

    let run = detector.run(Utc::now(), Duration::ZERO);

    assert_eq!(run.report.status, JobStatus::Partial);
    assert_eq!(run.report.scanned, 0);
    assert_eq!(run.report.events_emitted, 0);
}

#[test]
fn series_are_scanned_in_stable_order() {
    let mut snapshots = freed_pair("F9", AgeClass::Age0, 1);
    snapshots.extend(freed_pair("F1", AgeClass::Age3, 1));
    snapshots.extend(freed_pair("F1", AgeClass::Age1, 1));
    let (detector, _) = detector(store(snapshots));

    let run = detector.run(at(9, 10), BUDGET);

    let order = run
        .events
        .iter()
        .map(|event| (event.facility_id.as_str().to_string(), event.age_class))
        .collect::<Vec<_>>();
    assert_eq!(
        order,
        vec![
            ("F1".to_string(), AgeClass::Age1),
            ("F1".to_string(), AgeClass::Age3),
            ("F9".to_string(), AgeClass::Age0),
        ]
    );
}
