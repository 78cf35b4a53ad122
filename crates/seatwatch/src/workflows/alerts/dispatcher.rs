use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::domain::{
    AlertPayload, DeliveryStatus, DispatchParams, DispatchReport, NotifyMode, PushToken,
    ReceiptReport, ToAlertDelivery, ToAlertSubscription,
};
use super::repository::AlertStore;
use super::transport::{is_dead_token_reason, NotificationTransport, ReceiptStatus, TransportError};
use crate::quota::{Feature, QuotaOracle};
use crate::retry::Backoff;
use crate::storage::RepositoryError;
use crate::workflows::turnover::{JobStatus, TOEvent, ToEventRepository};
use crate::workflows::UserId;

enum SubscriberOutcome {
    Deferred,
    AlreadyNotified,
    NoTarget,
    SkippedQuota,
    Sent { created: usize, failed: usize },
}

/// Fans TO events out to subscribers and reconciles transport receipts.
pub struct AlertDispatcher<R, T, Q> {
    store: Arc<R>,
    transport: Arc<T>,
    quota: Arc<Q>,
    params: DispatchParams,
}

impl<R, T, Q> AlertDispatcher<R, T, Q>
where
    R: AlertStore + 'static,
    T: NotificationTransport + 'static,
    Q: QuotaOracle + 'static,
{
    pub fn new(store: Arc<R>, transport: Arc<T>, quota: Arc<Q>, params: DispatchParams) -> Self {
        Self {
            store,
            transport,
            quota,
            params,
        }
    }

    pub fn params(&self) -> &DispatchParams {
        &self.params
    }

    fn send_backoff(&self) -> Backoff {
        Backoff::new(
            self.params.max_send_attempts,
            StdDuration::from_millis(self.params.send_backoff_ms),
        )
    }

    /// Dispatches a batch of freshly detected events and sums the per-event reports.
    pub fn dispatch_pending(&self, events: &[TOEvent], now: DateTime<Utc>) -> DispatchReport {
        let mut total = DispatchReport::empty(now);
        for event in events {
            total.absorb(&self.dispatch_event(event, now));
        }
        total
    }

    /// Fans out every stored event whose earlier fan-out never completed, including events
    /// detected by this run. An event is marked dispatched only after a clean report.
    pub fn dispatch_outstanding<E>(&self, events: &E, now: DateTime<Utc>) -> DispatchReport
    where
        E: ToEventRepository + ?Sized,
    {
        let mut total = DispatchReport::empty(now);
        let since = now - Duration::hours(self.params.dispatch_backlog_hours);
        let pending = match events.undispatched(since, self.params.dispatch_batch_limit) {
            Ok(rows) => rows,
            Err(error) => {
                warn!(%error, "could not load undispatched events");
                total.status = JobStatus::Failed;
                total.errors = 1;
                return total;
            }
        };

        for event in &pending {
            let report = self.dispatch_event(event, now);
            let clean = report.status == JobStatus::Completed && report.errors == 0;
            total.absorb(&report);
            if !clean {
                continue;
            }
            if let Err(error) = events.mark_dispatched(event.event_id, now) {
                warn!(event_id = %event.event_id, %error, "could not mark event dispatched");
                total.errors += 1;
                total.status = JobStatus::Partial;
            }
        }
        total
    }

    /// Notifies every matching subscriber of `event`. Safe to re-run: users that already
    /// have a delivery record for the event are skipped.
    pub fn dispatch_event(&self, event: &TOEvent, now: DateTime<Utc>) -> DispatchReport {
        let mut report = DispatchReport::empty(now);

        let subscriptions = match self.store.active_for_facility(&event.facility_id) {
            Ok(rows) => rows,
            Err(error) => {
                warn!(event_id = %event.event_id, %error, "alert fan-out could not load subscriptions");
                report.status = JobStatus::Failed;
                report.errors = 1;
                return report;
            }
        };

        let payload = AlertPayload::for_event(event);
        for subscription in subscriptions.iter().filter(|row| row.matches(event.age_class)) {
            report.subscriptions_matched += 1;
            match self.notify(subscription, event, &payload, now) {
                Ok(SubscriberOutcome::Deferred) => report.deferred += 1,
                Ok(SubscriberOutcome::AlreadyNotified) => {
                    debug!(user_id = %subscription.user_id, event_id = %event.event_id, "already notified");
                }
                Ok(SubscriberOutcome::NoTarget) => report.no_target += 1,
                Ok(SubscriberOutcome::SkippedQuota) => {
                    report.skipped_quota += 1;
                    report.deliveries_created += 1;
                }
                Ok(SubscriberOutcome::Sent { created, failed }) => {
                    report.deliveries_created += created;
                    report.failed += failed;
                }
                Err(error) => {
                    report.errors += 1;
                    warn!(
                        user_id = %subscription.user_id,
                        event_id = %event.event_id,
                        %error,
                        "alert fan-out skipped subscriber"
                    );
                }
            }
        }

        if report.errors > 0 {
            report.status = JobStatus::Partial;
        }
        info!(
            event_id = %event.event_id,
            facility_id = %event.facility_id,
            matched = report.subscriptions_matched,
            created = report.deliveries_created,
            skipped_quota = report.skipped_quota,
            deferred = report.deferred,
            no_target = report.no_target,
            failed = report.failed,
            "alert fan-out finished"
        );
        report
    }

    fn notify(
        &self,
        subscription: &ToAlertSubscription,
        event: &TOEvent,
        payload: &AlertPayload,
        now: DateTime<Utc>,
    ) -> Result<SubscriberOutcome, RepositoryError> {
        if subscription.notify_mode == NotifyMode::Digest {
            return Ok(SubscriberOutcome::Deferred);
        }
        let user_id = &subscription.user_id;
        if !self.store.claim(user_id, event.event_id)? {
            return Ok(SubscriberOutcome::AlreadyNotified);
        }

        let outcome = self.notify_claimed(user_id, event, payload, now);
        let recorded = matches!(
            outcome,
            Ok(SubscriberOutcome::SkippedQuota | SubscriberOutcome::Sent { .. })
        );
        if !recorded {
            // no delivery stored; a later run may retry this user
            if let Err(error) = self.store.release(user_id, event.event_id) {
                warn!(%user_id, event_id = %event.event_id, %error, "alert claim not released");
            }
        }
        outcome
    }

    fn notify_claimed(
        &self,
        user_id: &UserId,
        event: &TOEvent,
        payload: &AlertPayload,
        now: DateTime<Utc>,
    ) -> Result<SubscriberOutcome, RepositoryError> {
        let tokens = self.store.active_tokens(user_id)?;
        if tokens.is_empty() {
            return Ok(SubscriberOutcome::NoTarget);
        }

        let decision = self.quota.check_limit(user_id.as_str(), Feature::ToAlert, now)?;
        if !decision.allowed {
            self.store.insert(ToAlertDelivery {
                record_id: Uuid::new_v4(),
                delivery_id: None,
                user_id: user_id.clone(),
                event_id: event.event_id,
                token: None,
                status: DeliveryStatus::SkippedQuota,
                sent_at: now,
                error_reason: Some("daily alert limit reached".to_string()),
                attempts: 0,
                receipt_checks: 0,
                next_check_at: None,
            })?;
            return Ok(SubscriberOutcome::SkippedQuota);
        }

        let mut created = 0;
        let mut failed = 0;
        for token in &tokens {
            let delivery = self.send_to_token(token, event, payload, now)?;
            if delivery.status == DeliveryStatus::Failed {
                failed += 1;
            }
            self.store.insert(delivery)?;
            created += 1;
        }
        Ok(SubscriberOutcome::Sent { created, failed })
    }

    fn send_to_token(
        &self,
        token: &PushToken,
        event: &TOEvent,
        payload: &AlertPayload,
        now: DateTime<Utc>,
    ) -> Result<ToAlertDelivery, RepositoryError> {
        let mut delivery = ToAlertDelivery {
            record_id: Uuid::new_v4(),
            delivery_id: None,
            user_id: token.user_id.clone(),
            event_id: event.event_id,
            token: Some(token.token.clone()),
            status: DeliveryStatus::Pending,
            sent_at: now,
            error_reason: None,
            attempts: 0,
            receipt_checks: 0,
            next_check_at: None,
        };

        let result = self.send_backoff().run(
            |attempt| {
                delivery.attempts = attempt;
                self.transport.dispatch(&token.token, payload)
            },
            TransportError::is_transient,
        );

        match result {
            Ok(ticket) => {
                delivery.delivery_id = Some(ticket);
                delivery.next_check_at =
                    Some(now + Duration::seconds(self.params.receipt_retry_base_secs));
            }
            Err(exhausted) => {
                delivery.status = DeliveryStatus::Failed;
                delivery.error_reason = Some(match &exhausted.error {
                    TransportError::Unavailable(reason) => format!(
                        "transport unavailable after {} attempts: {reason}",
                        exhausted.attempts
                    ),
                    TransportError::Rejected { reason } => reason.clone(),
                });
                if exhausted.error.deactivates_token() {
                    self.store.deactivate(&token.token, now)?;
                    info!(user_id = %token.user_id, "deactivated dead push token");
                }
            }
        }
        Ok(delivery)
    }

    /// Resolves pending deliveries from transport receipts, expires stale ones, and purges
    /// idle tokens.
    pub fn reconcile(&self, now: DateTime<Utc>) -> ReceiptReport {
        let mut report = ReceiptReport {
            status: JobStatus::Completed,
            checked: 0,
            delivered: 0,
            failed: 0,
            retry_scheduled: 0,
            expired: 0,
            tokens_deactivated: 0,
            tokens_purged: 0,
            timestamp: now,
        };
        let mut errors = 0usize;
        let limit = self.params.receipt_batch_limit;

        let ttl_cutoff = now - Duration::hours(self.params.receipt_ttl_hours);
        match self.store.pending_sent_before(ttl_cutoff, limit) {
            Ok(stale) => {
                for mut delivery in stale {
                    delivery.status = DeliveryStatus::Failed;
                    delivery.error_reason = Some(format!(
                        "receipt not confirmed within {} hours",
                        self.params.receipt_ttl_hours
                    ));
                    delivery.next_check_at = None;
                    match self.store.update(&delivery) {
                        Ok(()) => report.expired += 1,
                        Err(error) => {
                            errors += 1;
                            warn!(record_id = %delivery.record_id, %error, "could not expire delivery");
                        }
                    }
                }
            }
            Err(error) => {
                warn!(%error, "receipt reconciliation could not list stale deliveries");
                report.status = JobStatus::Failed;
                return report;
            }
        }

        let due = match self.store.pending_due(now, limit) {
            Ok(due) => due,
            Err(error) => {
                warn!(%error, "receipt reconciliation could not list pending deliveries");
                report.status = JobStatus::Failed;
                return report;
            }
        };

        for delivery in due {
            report.checked += 1;
            if let Err(error) = self.reconcile_one(delivery, now, &mut report) {
                errors += 1;
                warn!(%error, "receipt reconciliation skipped delivery");
            }
        }

        let inactivity_cutoff = now - Duration::days(self.params.token_inactivity_days);
        match self.store.purge_idle(inactivity_cutoff) {
            Ok(purged) => report.tokens_purged = purged,
            Err(error) => {
                errors += 1;
                warn!(%error, "idle token purge failed");
            }
        }

        if errors > 0 {
            report.status = JobStatus::Partial;
        }
        info!(
            status = ?report.status,
            checked = report.checked,
            delivered = report.delivered,
            failed = report.failed,
            retry_scheduled = report.retry_scheduled,
            expired = report.expired,
            tokens_deactivated = report.tokens_deactivated,
            tokens_purged = report.tokens_purged,
            "receipt reconciliation finished"
        );
        report
    }

    fn reconcile_one(
        &self,
        mut delivery: ToAlertDelivery,
        now: DateTime<Utc>,
        report: &mut ReceiptReport,
    ) -> Result<(), RepositoryError> {
        let receipt = match delivery.delivery_id.as_deref() {
            Some(ticket) => self.transport.receipt(ticket),
            None => Ok(ReceiptStatus::Error {
                reason: "missing delivery id".to_string(),
            }),
        };

        match receipt {
            Ok(ReceiptStatus::Ok) => {
                delivery.status = DeliveryStatus::Delivered;
                delivery.next_check_at = None;
                if let Some(token) = &delivery.token {
                    self.store.record_success(token, now)?;
                }
                report.delivered += 1;
            }
            Ok(ReceiptStatus::Error { reason }) | Err(TransportError::Rejected { reason }) => {
                if is_dead_token_reason(&reason) {
                    if let Some(token) = &delivery.token {
                        if self.store.deactivate(token, now)? {
                            report.tokens_deactivated += 1;
                        }
                    }
                }
                delivery.status = DeliveryStatus::Failed;
                delivery.error_reason = Some(reason);
                delivery.next_check_at = None;
                report.failed += 1;
            }
            Ok(ReceiptStatus::NotReady) | Err(TransportError::Unavailable(_)) => {
                delivery.receipt_checks += 1;
                if delivery.receipt_checks >= self.params.max_receipt_checks {
                    delivery.status = DeliveryStatus::Failed;
                    delivery.error_reason = Some(format!(
                        "receipt unavailable after {} checks",
                        delivery.receipt_checks
                    ));
                    delivery.next_check_at = None;
                    report.failed += 1;
                } else {
                    delivery.next_check_at = Some(now + self.receipt_retry_delay(delivery.receipt_checks));
                    report.retry_scheduled += 1;
                }
            }
        }
        self.store.update(&delivery)
    }

    /// Delay before the next receipt check: base × 2^(checks − 1).
    fn receipt_retry_delay(&self, checks: u32) -> Duration {
        let exponent = checks.saturating_sub(1).min(16);
        Duration::seconds(self.params.receipt_retry_base_secs * (1i64 << exponent))
    }
}
