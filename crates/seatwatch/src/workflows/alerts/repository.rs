use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::domain::{DeliveryStatus, PushToken, ToAlertDelivery, ToAlertSubscription};
use crate::storage::RepositoryError;
use crate::workflows::snapshots::FacilityId;
use crate::workflows::UserId;

/// Result of an upsert guarded by the per-user facility allowance.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscribeOutcome {
    Stored(ToAlertSubscription),
    /// Activating another facility would exceed the allowance; nothing was written.
    LimitReached { active: usize },
}

pub trait SubscriptionRepository: Send + Sync {
    /// Upserts the row for (user, facility). A row that is not already active only becomes
    /// active while the user has fewer than `max_active` active rows. Check and write are atomic.
    fn subscribe(
        &self,
        subscription: ToAlertSubscription,
        max_active: Option<usize>,
    ) -> Result<SubscribeOutcome, RepositoryError>;

    /// Soft-deactivates the row; `NotFound` when the user never subscribed.
    fn unsubscribe(
        &self,
        user_id: &UserId,
        facility_id: &FacilityId,
        now: DateTime<Utc>,
    ) -> Result<ToAlertSubscription, RepositoryError>;

    fn active_for_user(&self, user_id: &UserId) -> Result<Vec<ToAlertSubscription>, RepositoryError>;

    fn active_for_facility(
        &self,
        facility_id: &FacilityId,
    ) -> Result<Vec<ToAlertSubscription>, RepositoryError>;
}

pub trait PushTokenRepository: Send + Sync {
    /// Registers or reactivates a token, reassigning it to `user_id`.
    fn register(
        &self,
        user_id: &UserId,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<PushToken, RepositoryError>;

    fn active_tokens(&self, user_id: &UserId) -> Result<Vec<PushToken>, RepositoryError>;

    /// Returns `true` when the token was active before the call.
    fn deactivate(&self, token: &str, now: DateTime<Utc>) -> Result<bool, RepositoryError>;

    fn record_success(&self, token: &str, now: DateTime<Utc>) -> Result<(), RepositoryError>;

    /// Deletes tokens with neither activity nor a successful delivery since `cutoff`.
    fn purge_idle(&self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError>;
}

pub trait DeliveryRepository: Send + Sync {
    /// Reserves the (user, event) pair for a single fan-out. `false` when another fan-out
    /// holds the pair or deliveries for it already exist.
    fn claim(&self, user_id: &UserId, event_id: Uuid) -> Result<bool, RepositoryError>;

    /// Gives back a reservation whose fan-out stopped before it finished.
    fn release(&self, user_id: &UserId, event_id: Uuid) -> Result<(), RepositoryError>;

    fn insert(&self, delivery: ToAlertDelivery) -> Result<(), RepositoryError>;

    /// Pending deliveries whose next receipt check is due, earliest first.
    fn pending_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ToAlertDelivery>, RepositoryError>;

    /// Pending deliveries sent before `cutoff`, oldest first.
    fn pending_sent_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ToAlertDelivery>, RepositoryError>;

    /// Replaces the stored record with the same `record_id`.
    fn update(&self, delivery: &ToAlertDelivery) -> Result<(), RepositoryError>;

    fn for_event(&self, event_id: Uuid) -> Result<Vec<ToAlertDelivery>, RepositoryError>;
}

/// Everything the dispatcher persists.
pub trait AlertStore: SubscriptionRepository + PushTokenRepository + DeliveryRepository {}

impl<T> AlertStore for T where T: SubscriptionRepository + PushTokenRepository + DeliveryRepository {}

/// In-memory alert storage honouring the same uniqueness rules as the document store:
/// one subscription per (user, facility), one token document per token string.
#[derive(Default)]
pub struct InMemoryAlertStore {
    subscriptions: RwLock<HashMap<(UserId, FacilityId), ToAlertSubscription>>,
    tokens: RwLock<HashMap<String, PushToken>>,
    deliveries: RwLock<Vec<ToAlertDelivery>>,
    claims: Mutex<HashSet<(UserId, Uuid)>>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self, token: &str) -> Option<PushToken> {
        self.tokens.read().ok()?.get(token).cloned()
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.read().map(|guard| guard.len()).unwrap_or(0)
    }
}

fn poisoned() -> RepositoryError {
    RepositoryError::Unavailable("alert store lock poisoned".to_string())
}

impl SubscriptionRepository for InMemoryAlertStore {
    fn subscribe(
        &self,
        subscription: ToAlertSubscription,
        max_active: Option<usize>,
    ) -> Result<SubscribeOutcome, RepositoryError> {
        let mut guard = self.subscriptions.write().map_err(|_| poisoned())?;
        let key = (subscription.user_id.clone(), subscription.facility_id.clone());

        let already_active = guard.get(&key).is_some_and(|existing| existing.is_active);
        if !already_active {
            let active = guard
                .values()
                .filter(|row| row.user_id == subscription.user_id && row.is_active)
                .count();
            if max_active.is_some_and(|max| active >= max) {
                return Ok(SubscribeOutcome::LimitReached { active });
            }
        }

        let stored = match guard.get(&key) {
            Some(existing) => ToAlertSubscription {
                created_at: existing.created_at,
                ..subscription
            },
            None => subscription,
        };
        guard.insert(key, stored.clone());
        Ok(SubscribeOutcome::Stored(stored))
    }

    fn unsubscribe(
        &self,
        user_id: &UserId,
        facility_id: &FacilityId,
        now: DateTime<Utc>,
    ) -> Result<ToAlertSubscription, RepositoryError> {
        let mut guard = self.subscriptions.write().map_err(|_| poisoned())?;
        let row = guard
            .get_mut(&(user_id.clone(), facility_id.clone()))
            .ok_or(RepositoryError::NotFound)?;
        row.is_active = false;
        row.updated_at = now;
        Ok(row.clone())
    }

    fn active_for_user(&self, user_id: &UserId) -> Result<Vec<ToAlertSubscription>, RepositoryError> {
        let guard = self.subscriptions.read().map_err(|_| poisoned())?;
        let mut rows = guard
            .values()
            .filter(|row| &row.user_id == user_id && row.is_active)
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|left, right| left.facility_id.cmp(&right.facility_id));
        Ok(rows)
    }

    fn active_for_facility(
        &self,
        facility_id: &FacilityId,
    ) -> Result<Vec<ToAlertSubscription>, RepositoryError> {
        let guard = self.subscriptions.read().map_err(|_| poisoned())?;
        let mut rows = guard
            .values()
            .filter(|row| &row.facility_id == facility_id && row.is_active)
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|left, right| left.user_id.cmp(&right.user_id));
        Ok(rows)
    }
}

impl PushTokenRepository for InMemoryAlertStore {
    fn register(
        &self,
        user_id: &UserId,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<PushToken, RepositoryError> {
        let mut guard = self.tokens.write().map_err(|_| poisoned())?;
        let entry = guard.entry(token.to_string()).or_insert_with(|| PushToken {
            token: token.to_string(),
            user_id: user_id.clone(),
            is_active: true,
            registered_at: now,
            last_active_at: now,
            last_success_at: None,
        });
        entry.user_id = user_id.clone();
        entry.is_active = true;
        entry.last_active_at = now;
        Ok(entry.clone())
    }

    fn active_tokens(&self, user_id: &UserId) -> Result<Vec<PushToken>, RepositoryError> {
        let guard = self.tokens.read().map_err(|_| poisoned())?;
        let mut tokens = guard
            .values()
            .filter(|token| &token.user_id == user_id && token.is_active)
            .cloned()
            .collect::<Vec<_>>();
        tokens.sort_by(|left, right| left.token.cmp(&right.token));
        Ok(tokens)
    }

    fn deactivate(&self, token: &str, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let mut guard = self.tokens.write().map_err(|_| poisoned())?;
        Ok(match guard.get_mut(token) {
            Some(entry) if entry.is_active => {
                entry.is_active = false;
                entry.last_active_at = now;
                true
            }
            _ => false,
        })
    }

    fn record_success(&self, token: &str, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut guard = self.tokens.write().map_err(|_| poisoned())?;
        if let Some(entry) = guard.get_mut(token) {
            entry.last_success_at = Some(now);
            entry.last_active_at = now;
        }
        Ok(())
    }

    fn purge_idle(&self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let mut guard = self.tokens.write().map_err(|_| poisoned())?;
        let before = guard.len();
        guard.retain(|_, token| {
            token.last_active_at >= cutoff
                || token.last_success_at.is_some_and(|success| success >= cutoff)
        });
        Ok(before - guard.len())
    }
}

impl DeliveryRepository for InMemoryAlertStore {
    fn claim(&self, user_id: &UserId, event_id: Uuid) -> Result<bool, RepositoryError> {
        let mut claims = self.claims.lock().map_err(|_| poisoned())?;
        let key = (user_id.clone(), event_id);
        if claims.contains(&key) {
            return Ok(false);
        }
        let delivered = self
            .deliveries
            .read()
            .map_err(|_| poisoned())?
            .iter()
            .any(|delivery| &delivery.user_id == user_id && delivery.event_id == event_id);
        if delivered {
            return Ok(false);
        }
        claims.insert(key);
        Ok(true)
    }

    fn release(&self, user_id: &UserId, event_id: Uuid) -> Result<(), RepositoryError> {
        let mut claims = self.claims.lock().map_err(|_| poisoned())?;
        claims.remove(&(user_id.clone(), event_id));
        Ok(())
    }

    fn insert(&self, delivery: ToAlertDelivery) -> Result<(), RepositoryError> {
        let mut guard = self.deliveries.write().map_err(|_| poisoned())?;
        if guard.iter().any(|existing| existing.record_id == delivery.record_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(delivery);
        Ok(())
    }

    fn pending_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ToAlertDelivery>, RepositoryError> {
        let guard = self.deliveries.read().map_err(|_| poisoned())?;
        let mut due = guard
            .iter()
            .filter(|delivery| delivery.status == DeliveryStatus::Pending)
            .filter(|delivery| delivery.next_check_at.map_or(true, |at| at <= now))
            .cloned()
            .collect::<Vec<_>>();
        due.sort_by_key(|delivery| delivery.next_check_at.unwrap_or(delivery.sent_at));
        due.truncate(limit);
        Ok(due)
    }

    fn pending_sent_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ToAlertDelivery>, RepositoryError> {
        let guard = self.deliveries.read().map_err(|_| poisoned())?;
        let mut stale = guard
            .iter()
            .filter(|delivery| delivery.status == DeliveryStatus::Pending && delivery.sent_at < cutoff)
            .cloned()
            .collect::<Vec<_>>();
        stale.sort_by_key(|delivery| delivery.sent_at);
        stale.truncate(limit);
        Ok(stale)
    }

    fn update(&self, delivery: &ToAlertDelivery) -> Result<(), RepositoryError> {
        let mut guard = self.deliveries.write().map_err(|_| poisoned())?;
        let stored = guard
            .iter_mut()
            .find(|existing| existing.record_id == delivery.record_id)
            .ok_or(RepositoryError::NotFound)?;
        *stored = delivery.clone();
        Ok(())
    }

    fn for_event(&self, event_id: Uuid) -> Result<Vec<ToAlertDelivery>, RepositoryError> {
        let guard = self.deliveries.read().map_err(|_| poisoned())?;
        Ok(guard
            .iter()
            .filter(|delivery| delivery.event_id == event_id)
            .cloned()
            .collect())
    }
}
