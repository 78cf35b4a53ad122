use std::thread;

use chrono::Duration;

use super::common::*;
use crate::quota::{Feature, QuotaOracle, Tier};
use crate::workflows::alerts::{
    DeliveryRepository, DeliveryStatus, NotifyMode, PushTokenRepository, SubscriptionRepository,
    TransportError,
};
use crate::workflows::snapshots::AgeClass;
use crate::workflows::turnover::{InMemoryToEventStore, JobStatus, ToEventRepository};

#[test]
fn instant_subscriber_gets_a_pending_delivery() {
    let h = harness();
    h.follower("parent-1", "F1", vec![AgeClass::Age2], NotifyMode::Instant);
    let event = event("F1", AgeClass::Age2);

    let report = h.dispatcher.dispatch_event(&event, now());

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.subscriptions_matched, 1);
    assert_eq!(report.deliveries_created, 1);
    assert_eq!(report.failed, 0);

    let deliveries = h.store.for_event(event.event_id).expect("deliveries");
    assert_eq!(deliveries.len(), 1);
    let delivery = &deliveries[0];
    assert_eq!(delivery.status, DeliveryStatus::Pending);
    assert_eq!(delivery.delivery_id.as_deref(), Some("ticket-1"));
    assert_eq!(delivery.token.as_deref(), Some(token_for("parent-1").as_str()));
    assert_eq!(delivery.attempts, 1);
    assert_eq!(delivery.next_check_at, Some(now() + Duration::seconds(60)));

    let sent = h.transport.sent();
    assert_eq!(sent[0].1.event_id, event.event_id);
    assert!(sent[0].1.body.contains("about 2 seats opened"));
}

#[test]
fn user_over_daily_quota_gets_skipped_record_and_keeps_subscription() {
    let h = harness();
    h.tiers.set_tier("parent-2", Tier::Free);
    h.follower("parent-2", "F1", Vec::new(), NotifyMode::Instant);
    for _ in 0..3 {
        let decision = h
            .quota
            .check_limit("parent-2", Feature::ToAlert, now())
            .expect("quota check");
        assert!(decision.allowed);
    }
    let event = event("F1", AgeClass::Age2);

    let report = h.dispatcher.dispatch_event(&event, now());

    assert_eq!(report.skipped_quota, 1);
    assert_eq!(h.transport.dispatch_calls(), 0);
    let deliveries = h.store.for_event(event.event_id).expect("deliveries");
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].status, DeliveryStatus::SkippedQuota);
    assert!(deliveries[0].token.is_none());

    let active = h
        .store
        .active_for_user(&user("parent-2"))
        .expect("subscriptions");
    assert_eq!(active.len(), 1);
    assert!(active[0].is_active);
}

#[test]
fn digest_mismatch_and_tokenless_subscribers_are_counted_apart() {
    let h = harness();
    h.follower("parent-1", "F1", Vec::new(), NotifyMode::Digest);
    h.follower("parent-3", "F1", vec![AgeClass::Age0], NotifyMode::Instant);
    h.subscribe_only("parent-4", "F1", Vec::new(), NotifyMode::Instant);
    h.follower("parent-5", "F2", Vec::new(), NotifyMode::Instant);

    let report = h.dispatcher.dispatch_event(&event("F1", AgeClass::Age2), now());

    assert_eq!(report.subscriptions_matched, 2);
    assert_eq!(report.deferred, 1);
    assert_eq!(report.no_target, 1);
    assert_eq!(report.deliveries_created, 0);
    assert_eq!(h.transport.dispatch_calls(), 0);
}

#[test]
fn rerunning_an_event_does_not_notify_twice() {
    let h = harness();
    h.follower("parent-1", "F1", Vec::new(), NotifyMode::Instant);
    let event = event("F1", AgeClass::Age2);

    let first = h.dispatcher.dispatch_event(&event, now());
    let second = h.dispatcher.dispatch_event(&event, now() + Duration::minutes(30));

    assert_eq!(first.deliveries_created, 1);
    assert_eq!(second.subscriptions_matched, 1);
    assert_eq!(second.deliveries_created, 0);
    assert_eq!(h.transport.dispatch_calls(), 1);
    assert_eq!(h.store.delivery_count(), 1);
}

#[test]
fn overlapping_fan_outs_send_once_per_user() {
    let h = harness();
    h.follower("parent-1", "F1", vec![AgeClass::Age2], NotifyMode::Instant);
    let event = event("F1", AgeClass::Age2);

    let reports = thread::scope(|scope| {
        let handles = (0..4)
            .map(|_| scope.spawn(|| h.dispatcher.dispatch_event(&event, now())))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("dispatch thread"))
            .collect::<Vec<_>>()
    });

    let created: usize = reports.iter().map(|report| report.deliveries_created).sum();
    assert_eq!(created, 1);
    assert_eq!(h.transport.dispatch_calls(), 1);
    assert_eq!(h.store.for_event(event.event_id).expect("deliveries").len(), 1);
}

#[test]
fn failed_fan_out_releases_the_claim() {
    let h = harness();
    h.follower("parent-1", "F1", Vec::new(), NotifyMode::Instant);
    let event = event("F1", AgeClass::Age2);
    let parent = user("parent-1");

    assert!(h.store.claim(&parent, event.event_id).expect("claim"));
    assert!(!h.store.claim(&parent, event.event_id).expect("second claim"));
    let blocked = h.dispatcher.dispatch_event(&event, now());
    assert_eq!(blocked.deliveries_created, 0);
    assert_eq!(h.transport.dispatch_calls(), 0);

    h.store.release(&parent, event.event_id).expect("release");
    let retried = h.dispatcher.dispatch_event(&event, now());
    assert_eq!(retried.deliveries_created, 1);
    assert!(!h.store.claim(&parent, event.event_id).expect("claim after delivery"));
}

#[test]
fn transient_send_failures_are_retried_then_marked_failed() {
    let h = harness();
    h.follower("parent-1", "F1", Vec::new(), NotifyMode::Instant);
    h.transport.script_dispatch(vec![
        Err(TransportError::Unavailable("gateway timeout".into())),
        Ok("ticket-retry".to_string()),
    ]);
    let recovered = event("F1", AgeClass::Age2);
    h.dispatcher.dispatch_event(&recovered, now());
    let delivery = &h.store.for_event(recovered.event_id).expect("deliveries")[0];
    assert_eq!(delivery.status, DeliveryStatus::Pending);
    assert_eq!(delivery.attempts, 2);
    assert_eq!(delivery.delivery_id.as_deref(), Some("ticket-retry"));

    h.transport.script_dispatch(vec![
        Err(TransportError::Unavailable("gateway timeout".into())),
        Err(TransportError::Unavailable("gateway timeout".into())),
        Err(TransportError::Unavailable("gateway timeout".into())),
    ]);
    let lost = event("F1", AgeClass::Age2);
    let report = h.dispatcher.dispatch_event(&lost, now());
    assert_eq!(report.failed, 1);
    let delivery = &h.store.for_event(lost.event_id).expect("deliveries")[0];
    assert_eq!(delivery.status, DeliveryStatus::Failed);
    assert_eq!(delivery.attempts, 3);
    assert!(delivery
        .error_reason
        .as_deref()
        .is_some_and(|reason| reason.contains("after 3 attempts")));
}

#[test]
fn dead_token_rejection_deactivates_token() {
    let h = harness();
    h.follower("parent-1", "F1", Vec::new(), NotifyMode::Instant);
    h.transport.script_dispatch(vec![Err(TransportError::Rejected {
        reason: "DeviceNotRegistered".into(),
    })]);

    let report = h.dispatcher.dispatch_event(&event("F1", AgeClass::Age2), now());

    assert_eq!(report.failed, 1);
    assert_eq!(h.transport.dispatch_calls(), 1);
    let token = h.store.token(&token_for("parent-1")).expect("token kept");
    assert!(!token.is_active);
    assert!(h
        .store
        .active_tokens(&user("parent-1"))
        .expect("tokens")
        .is_empty());
}

#[test]
fn batch_dispatch_sums_event_reports() {
    let h = harness();
    h.follower("parent-1", "F1", Vec::new(), NotifyMode::Instant);
    h.follower("parent-1", "F2", Vec::new(), NotifyMode::Instant);
    let events = vec![event("F1", AgeClass::Age1), event("F2", AgeClass::Age3)];

    let report = h.dispatcher.dispatch_pending(&events, now());

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.subscriptions_matched, 2);
    assert_eq!(report.deliveries_created, 2);
    assert_eq!(report.timestamp, now());
}

#[test]
fn outstanding_events_fan_out_until_marked() {
    let h = harness();
    h.follower("parent-1", "F1", Vec::new(), NotifyMode::Instant);
    let events = InMemoryToEventStore::new();
    let fresh = event("F1", AgeClass::Age2);
    let mut stale = event("F1", AgeClass::Age3);
    stale.detected_at = now() - Duration::hours(30);
    stale.window_start = stale.detected_at;
    events.insert_unique(stale.clone()).expect("stale stored");
    events.insert_unique(fresh.clone()).expect("fresh stored");

    let first = h.dispatcher.dispatch_outstanding(&events, now());
    assert_eq!(first.status, JobStatus::Completed);
    assert_eq!(first.deliveries_created, 1);
    assert_eq!(h.store.for_event(fresh.event_id).expect("deliveries").len(), 1);
    assert!(h.store.for_event(stale.event_id).expect("deliveries").is_empty());

    let second = h.dispatcher.dispatch_outstanding(&events, now() + Duration::minutes(30));
    assert_eq!(second.subscriptions_matched, 0);
    assert_eq!(h.transport.dispatch_calls(), 1);
    assert!(events
        .undispatched(now() - Duration::hours(1), 10)
        .expect("undispatched")
        .is_empty());
}
