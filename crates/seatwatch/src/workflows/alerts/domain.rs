use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::workflows::snapshots::{AgeClass, FacilityId};
use crate::workflows::turnover::{JobStatus, TOEvent};
use crate::workflows::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotifyMode {
    #[default]
    Instant,
    Digest,
}

/// A user's request to hear about openings at one facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToAlertSubscription {
    pub user_id: UserId,
    pub facility_id: FacilityId,
    /// Age classes of interest; empty means every class.
    pub target_classes: Vec<AgeClass>,
    pub notify_mode: NotifyMode,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ToAlertSubscription {
    pub fn matches(&self, age_class: AgeClass) -> bool {
        self.target_classes.is_empty() || self.target_classes.contains(&age_class)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushToken {
    pub token: String,
    pub user_id: UserId,
    pub is_active: bool,
    pub registered_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub last_success_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
    SkippedQuota,
}

/// One notification attempt for a (user, event) pair and, when sent, one device token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToAlertDelivery {
    pub record_id: Uuid,
    /// Ticket issued by the transport; absent when nothing was sent.
    pub delivery_id: Option<String>,
    pub user_id: UserId,
    pub event_id: Uuid,
    pub token: Option<String>,
    pub status: DeliveryStatus,
    pub sent_at: DateTime<Utc>,
    pub error_reason: Option<String>,
    pub attempts: u32,
    pub receipt_checks: u32,
    pub next_check_at: Option<DateTime<Utc>>,
}

/// Message handed to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub title: String,
    pub body: String,
    pub event_id: Uuid,
    pub facility_id: FacilityId,
    pub age_class: AgeClass,
    pub estimated_slots: u32,
}

impl AlertPayload {
    pub fn for_event(event: &TOEvent) -> Self {
        let seats = if event.estimated_slots == 1 { "seat" } else { "seats" };
        Self {
            title: format!("Opening at {}", event.facility_id),
            body: format!(
                "{} class: about {} {seats} opened (confidence {:.0}%)",
                event.age_class,
                event.estimated_slots,
                event.confidence * 100.0
            ),
            event_id: event.event_id,
            facility_id: event.facility_id.clone(),
            age_class: event.age_class,
            estimated_slots: event.estimated_slots,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub status: JobStatus,
    pub subscriptions_matched: usize,
    pub deliveries_created: usize,
    pub skipped_quota: usize,
    pub deferred: usize,
    pub no_target: usize,
    pub failed: usize,
    pub errors: usize,
    pub timestamp: DateTime<Utc>,
}

impl DispatchReport {
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Completed,
            subscriptions_matched: 0,
            deliveries_created: 0,
            skipped_quota: 0,
            deferred: 0,
            no_target: 0,
            failed: 0,
            errors: 0,
            timestamp,
        }
    }

    /// Folds another event's report into this one.
    pub fn absorb(&mut self, other: &DispatchReport) {
        self.subscriptions_matched += other.subscriptions_matched;
        self.deliveries_created += other.deliveries_created;
        self.skipped_quota += other.skipped_quota;
        self.deferred += other.deferred;
        self.no_target += other.no_target;
        self.failed += other.failed;
        self.errors += other.errors;
        self.status = match (self.status, other.status) {
            (JobStatus::Completed, JobStatus::Completed) => JobStatus::Completed,
            _ => JobStatus::Partial,
        };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptReport {
    pub status: JobStatus,
    pub checked: usize,
    pub delivered: usize,
    pub failed: usize,
    pub retry_scheduled: usize,
    pub expired: usize,
    pub tokens_deactivated: usize,
    pub tokens_purged: usize,
    pub timestamp: DateTime<Utc>,
}

/// Dispatch and receipt tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchParams {
    pub max_send_attempts: u32,
    pub send_backoff_ms: u64,
    pub receipt_batch_limit: usize,
    pub receipt_retry_base_secs: i64,
    pub max_receipt_checks: u32,
    pub receipt_ttl_hours: i64,
    pub token_inactivity_days: i64,
    /// Undispatched events older than this are left alone.
    pub dispatch_backlog_hours: i64,
    pub dispatch_batch_limit: usize,
}

impl DispatchParams {
    pub fn standard() -> Self {
        Self {
            max_send_attempts: 3,
            send_backoff_ms: 500,
            receipt_batch_limit: 100,
            receipt_retry_base_secs: 60,
            max_receipt_checks: 3,
            receipt_ttl_hours: 24,
            token_inactivity_days: 30,
            dispatch_backlog_hours: 24,
            dispatch_batch_limit: 200,
        }
    }
}

impl Default for DispatchParams {
    fn default() -> Self {
        Self::standard()
    }
}

/// Raw subscribe request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub facility_id: String,
    #[serde(default)]
    pub target_classes: Vec<String>,
    #[serde(default)]
    pub notify_mode: Option<NotifyMode>,
}

impl SubscribeRequest {
    pub fn validate(&self) -> Result<(FacilityId, Vec<AgeClass>, NotifyMode), ValidationError> {
        let facility_id = FacilityId::parse(&self.facility_id)?;
        let mut classes = Vec::with_capacity(self.target_classes.len());
        for raw in &self.target_classes {
            let class = raw
                .parse::<AgeClass>()
                .map_err(|error| ValidationError::new("target_classes", error.message))?;
            if !classes.contains(&class) {
                classes.push(class);
            }
        }
        classes.sort();
        Ok((facility_id, classes, self.notify_mode.unwrap_or_default()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterTokenRequest {
    pub token: String,
}

const TOKEN_PREFIX: &str = "ExponentPushToken[";
const MAX_TOKEN_LEN: usize = 256;

/// Accepts `ExponentPushToken[<id>]` with a non-empty id.
pub fn validate_push_token(raw: &str) -> Result<String, ValidationError> {
    let token = raw.trim();
    let well_formed = token.len() <= MAX_TOKEN_LEN
        && token
            .strip_prefix(TOKEN_PREFIX)
            .and_then(|rest| rest.strip_suffix(']'))
            .is_some_and(|id| !id.is_empty());
    if well_formed {
        Ok(token.to_string())
    } else {
        Err(ValidationError::new("token", "invalid push token format"))
    }
}
