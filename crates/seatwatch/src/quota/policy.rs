use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::counter::{CounterKey, UsageCounter};
use super::{Feature, LimitDecision, QuotaOracle, Tier};
use crate::storage::RepositoryError;

/// Per-tier caps for one metered feature. `None` is unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRule {
    pub feature: Feature,
    pub window_secs: i64,
    pub free: Option<u32>,
    pub basic: Option<u32>,
    pub premium: Option<u32>,
}

impl FeatureRule {
    pub fn cap_for(&self, tier: Tier) -> Option<u32> {
        match tier {
            Tier::Free => self.free,
            Tier::Basic => self.basic,
            Tier::Premium => self.premium,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_secs.max(1))
    }
}

/// Quota table keyed by feature plus the alert follow limits per tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    pub rules: Vec<FeatureRule>,
    pub alert_facilities_free: Option<usize>,
    pub alert_facilities_basic: Option<usize>,
    pub alert_facilities_premium: Option<usize>,
}

const DAY_SECS: i64 = 24 * 60 * 60;

impl QuotaPolicy {
    pub fn standard() -> Self {
        Self {
            rules: vec![
                FeatureRule {
                    feature: Feature::AdmissionScore,
                    window_secs: DAY_SECS,
                    free: Some(5),
                    basic: Some(30),
                    premium: None,
                },
                FeatureRule {
                    feature: Feature::StrategyAnalysis,
                    window_secs: DAY_SECS,
                    free: Some(1),
                    basic: Some(5),
                    premium: None,
                },
                FeatureRule {
                    feature: Feature::ToAlert,
                    window_secs: DAY_SECS,
                    free: Some(3),
                    basic: Some(10),
                    premium: Some(30),
                },
            ],
            alert_facilities_free: Some(1),
            alert_facilities_basic: Some(5),
            alert_facilities_premium: None,
        }
    }

    pub fn rule(&self, feature: Feature) -> Option<&FeatureRule> {
        self.rules.iter().find(|rule| rule.feature == feature)
    }

    pub fn alert_facilities_for(&self, tier: Tier) -> Option<usize> {
        match tier {
            Tier::Free => self.alert_facilities_free,
            Tier::Basic => self.alert_facilities_basic,
            Tier::Premium => self.alert_facilities_premium,
        }
    }
}

/// Lookup of a subject's current subscription tier (billing lives elsewhere).
pub trait TierDirectory: Send + Sync {
    fn tier_for(&self, subject: &str) -> Result<Tier, RepositoryError>;
}

/// Tier table held in memory; unknown subjects are on the free tier.
#[derive(Default)]
pub struct InMemoryTierDirectory {
    tiers: RwLock<HashMap<String, Tier>>,
}

impl InMemoryTierDirectory {
    pub fn set_tier(&self, subject: impl Into<String>, tier: Tier) {
        if let Ok(mut guard) = self.tiers.write() {
            guard.insert(subject.into(), tier);
        }
    }
}

impl TierDirectory for InMemoryTierDirectory {
    fn tier_for(&self, subject: &str) -> Result<Tier, RepositoryError> {
        let guard = self
            .tiers
            .read()
            .map_err(|_| RepositoryError::Unavailable("tier directory poisoned".to_string()))?;
        Ok(guard.get(subject).copied().unwrap_or_default())
    }
}

/// Quota oracle combining tier lookup, the policy table, and an atomic counter.
pub struct SubscriptionQuota<T, C> {
    tiers: Arc<T>,
    counter: Arc<C>,
    policy: QuotaPolicy,
}

impl<T, C> SubscriptionQuota<T, C>
where
    T: TierDirectory,
    C: UsageCounter,
{
    pub fn new(tiers: Arc<T>, counter: Arc<C>, policy: QuotaPolicy) -> Self {
        Self {
            tiers,
            counter,
            policy,
        }
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }
}

impl<T, C> QuotaOracle for SubscriptionQuota<T, C>
where
    T: TierDirectory,
    C: UsageCounter,
{
    fn check_limit(
        &self,
        subject: &str,
        feature: Feature,
        now: DateTime<Utc>,
    ) -> Result<LimitDecision, RepositoryError> {
        let tier = self.tiers.tier_for(subject)?;
        let Some(rule) = self.policy.rule(feature) else {
            return Ok(LimitDecision::unlimited());
        };
        let Some(cap) = rule.cap_for(tier) else {
            return Ok(LimitDecision::unlimited());
        };

        let key = CounterKey::new(subject, feature);
        let state = self
            .counter
            .check_and_increment(&key, cap, rule.window(), now)?;

        Ok(LimitDecision {
            allowed: state.admitted,
            remaining: Some(cap.saturating_sub(state.count)),
            reset_at: Some(state.reset_at),
        })
    }

    fn alert_facility_allowance(&self, subject: &str) -> Result<Option<usize>, RepositoryError> {
        let tier = self.tiers.tier_for(subject)?;
        Ok(self.policy.alert_facilities_for(tier))
    }
}
