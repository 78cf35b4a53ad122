use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::quota::{
    InMemoryTierDirectory, InMemoryUsageCounter, QuotaPolicy, SubscriptionQuota, Tier,
};
use crate::workflows::alerts::{
    AlertDispatcher, AlertPayload, DispatchParams, InMemoryAlertStore, NotificationTransport,
    NotifyMode, PushTokenRepository, ReceiptStatus, SubscriptionRepository, ToAlertSubscription,
    TransportError,
};
use crate::workflows::snapshots::{AgeClass, FacilityId};
use crate::workflows::turnover::{TOEvent, ToSource};
use crate::workflows::UserId;

pub(super) type TestQuota = SubscriptionQuota<InMemoryTierDirectory, InMemoryUsageCounter>;
pub(super) type TestDispatcher = AlertDispatcher<InMemoryAlertStore, ScriptedTransport, TestQuota>;

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 20, 9, 10, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn user(id: &str) -> UserId {
    UserId(id.to_string())
}

pub(super) fn token_for(user: &str) -> String {
    format!("ExponentPushToken[{user}]")
}

pub(super) fn event(facility: &str, age_class: AgeClass) -> TOEvent {
    TOEvent {
        event_id: Uuid::new_v4(),
        facility_id: FacilityId(facility.to_string()),
        age_class,
        estimated_slots: 2,
        confidence: 0.9,
        detected_at: now(),
        source: ToSource::Vacancy,
        window_start: now(),
    }
}

pub(super) fn quota() -> (Arc<TestQuota>, Arc<InMemoryTierDirectory>) {
    let tiers = Arc::new(InMemoryTierDirectory::default());
    let quota = Arc::new(SubscriptionQuota::new(
        tiers.clone(),
        Arc::new(InMemoryUsageCounter::default()),
        QuotaPolicy::standard(),
    ));
    (quota, tiers)
}

/// Retries immediately so tests stay fast.
pub(super) fn params() -> DispatchParams {
    DispatchParams {
        send_backoff_ms: 0,
        ..DispatchParams::standard()
    }
}

pub(super) struct Harness {
    pub(super) store: Arc<InMemoryAlertStore>,
    pub(super) transport: Arc<ScriptedTransport>,
    pub(super) quota: Arc<TestQuota>,
    pub(super) tiers: Arc<InMemoryTierDirectory>,
    pub(super) dispatcher: TestDispatcher,
}

pub(super) fn harness() -> Harness {
    let store = Arc::new(InMemoryAlertStore::new());
    let transport = Arc::new(ScriptedTransport::default());
    let (quota, tiers) = quota();
    tiers.set_tier("parent-1", Tier::Premium);
    let dispatcher = AlertDispatcher::new(store.clone(), transport.clone(), quota.clone(), params());
    Harness {
        store,
        transport,
        quota,
        tiers,
        dispatcher,
    }
}

impl Harness {
    /// Active subscription plus one registered token for `user`.
    pub(super) fn follower(
        &self,
        user: &str,
        facility: &str,
        classes: Vec<AgeClass>,
        mode: NotifyMode,
    ) {
        self.subscribe_only(user, facility, classes, mode);
        self.store
            .register(&UserId(user.to_string()), &token_for(user), now())
            .expect("token registers");
    }

    pub(super) fn subscribe_only(
        &self,
        user: &str,
        facility: &str,
        classes: Vec<AgeClass>,
        mode: NotifyMode,
    ) {
        self.store
            .subscribe(
                ToAlertSubscription {
                    user_id: UserId(user.to_string()),
                    facility_id: FacilityId(facility.to_string()),
                    target_classes: classes,
                    notify_mode: mode,
                    is_active: true,
                    created_at: now(),
                    updated_at: now(),
                },
                None,
            )
            .expect("subscription stored");
    }
}

/// Transport whose send and receipt results are scripted per call. Unscripted sends succeed
/// with sequential tickets; unscripted receipts report `Ok`.
#[derive(Default)]
pub(super) struct ScriptedTransport {
    dispatch_results: Mutex<VecDeque<Result<String, TransportError>>>,
    receipt_results: Mutex<HashMap<String, VecDeque<Result<ReceiptStatus, TransportError>>>>,
    sent: Mutex<Vec<(String, AlertPayload)>>,
    dispatch_calls: Mutex<usize>,
}

impl ScriptedTransport {
    pub(super) fn script_dispatch(&self, results: Vec<Result<String, TransportError>>) {
        self.dispatch_results
            .lock()
            .expect("dispatch script")
            .extend(results);
    }

    pub(super) fn script_receipts(
        &self,
        ticket: &str,
        results: Vec<Result<ReceiptStatus, TransportError>>,
    ) {
        self.receipt_results
            .lock()
            .expect("receipt script")
            .entry(ticket.to_string())
            .or_default()
            .extend(results);
    }

    pub(super) fn sent(&self) -> Vec<(String, AlertPayload)> {
        self.sent.lock().expect("sent log").clone()
    }

    pub(super) fn dispatch_calls(&self) -> usize {
        *self.dispatch_calls.lock().expect("call count")
    }
}

impl NotificationTransport for ScriptedTransport {
    fn dispatch(&self, token: &str, payload: &AlertPayload) -> Result<String, TransportError> {
        let call = {
            let mut calls = self.dispatch_calls.lock().expect("call count");
            *calls += 1;
            *calls
        };
        let scripted = self
            .dispatch_results
            .lock()
            .expect("dispatch script")
            .pop_front();
        let result = scripted.unwrap_or_else(|| Ok(format!("ticket-{call}")));
        if result.is_ok() {
            self.sent
                .lock()
                .expect("sent log")
                .push((token.to_string(), payload.clone()));
        }
        result
    }

    fn receipt(&self, delivery_id: &str) -> Result<ReceiptStatus, TransportError> {
        self.receipt_results
            .lock()
            .expect("receipt script")
            .get_mut(delivery_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(ReceiptStatus::Ok))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body readable");
    serde_json::from_slice(&body).expect("json body")
}
