use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::domain::{
    validate_push_token, PushToken, RegisterTokenRequest, SubscribeRequest, ToAlertSubscription,
};
use super::repository::{PushTokenRepository, SubscribeOutcome, SubscriptionRepository};
use crate::error::ValidationError;
use crate::quota::{Feature, QuotaOracle, RateLimited};
use crate::storage::RepositoryError;
use crate::workflows::snapshots::FacilityId;
use crate::workflows::UserId;

/// Subscription and device-token management for TO alerts.
pub struct SubscriptionService<R, Q> {
    store: Arc<R>,
    quota: Arc<Q>,
}

impl<R, Q> SubscriptionService<R, Q>
where
    R: SubscriptionRepository + PushTokenRepository + 'static,
    Q: QuotaOracle + 'static,
{
    pub fn new(store: Arc<R>, quota: Arc<Q>) -> Self {
        Self { store, quota }
    }

    /// Creates or updates the subscription for (user, facility). Following a new facility
    /// counts against the tier's facility allowance.
    pub fn subscribe(
        &self,
        user_id: &UserId,
        request: &SubscribeRequest,
        now: DateTime<Utc>,
    ) -> Result<ToAlertSubscription, AlertServiceError> {
        let (facility_id, target_classes, notify_mode) = request.validate()?;
        let allowance = self.quota.alert_facility_allowance(user_id.as_str())?;

        let subscription = ToAlertSubscription {
            user_id: user_id.clone(),
            facility_id,
            target_classes,
            notify_mode,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        match self.store.subscribe(subscription, allowance)? {
            SubscribeOutcome::Stored(stored) => {
                info!(
                    user_id = %stored.user_id,
                    facility_id = %stored.facility_id,
                    mode = ?stored.notify_mode,
                    "to alert subscription stored"
                );
                Ok(stored)
            }
            SubscribeOutcome::LimitReached { active } => {
                info!(user_id = %user_id, active, "to alert facility allowance reached");
                Err(RateLimited {
                    feature: Feature::ToAlert,
                    reset_at: None,
                }
                .into())
            }
        }
    }

    pub fn unsubscribe(
        &self,
        user_id: &UserId,
        facility_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ToAlertSubscription, AlertServiceError> {
        let facility_id = FacilityId::parse(facility_id)?;
        Ok(self.store.unsubscribe(user_id, &facility_id, now)?)
    }

    pub fn list(&self, user_id: &UserId) -> Result<Vec<ToAlertSubscription>, AlertServiceError> {
        Ok(self.store.active_for_user(user_id)?)
    }

    pub fn register_token(
        &self,
        user_id: &UserId,
        request: &RegisterTokenRequest,
        now: DateTime<Utc>,
    ) -> Result<PushToken, AlertServiceError> {
        let token = validate_push_token(&request.token)?;
        Ok(self.store.register(user_id, &token, now)?)
    }
}

/// Error raised by alert subscription management.
#[derive(Debug, thiserror::Error)]
pub enum AlertServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    RateLimited(#[from] RateLimited),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
