use std::collections::HashMap;
use std::sync::RwLock;

use super::domain::{CandidateFacility, GeoPoint};
use crate::storage::RepositoryError;
use crate::workflows::snapshots::{AgeClass, FacilityId};
use crate::workflows::UserId;

/// Supplies candidate facilities when the caller does not pick them explicitly.
pub trait FacilityResolver: Send + Sync {
    /// Facilities near `home` plus those the user follows, without duplicates.
    fn resolve(
        &self,
        user_id: &UserId,
        home: &GeoPoint,
        age_class: AgeClass,
    ) -> Result<Vec<CandidateFacility>, RepositoryError>;
}

/// Directory of facilities with coordinates and per-user follow lists.
pub struct FacilityDirectory {
    facilities: RwLock<Vec<CandidateFacility>>,
    followed: RwLock<HashMap<UserId, Vec<FacilityId>>>,
    radius_km: f64,
    max_nearby: usize,
}

impl FacilityDirectory {
    pub fn new(radius_km: f64, max_nearby: usize) -> Self {
        Self {
            facilities: RwLock::new(Vec::new()),
            followed: RwLock::new(HashMap::new()),
            radius_km,
            max_nearby,
        }
    }

    pub fn with_facilities(self, facilities: impl IntoIterator<Item = CandidateFacility>) -> Self {
        if let Ok(mut guard) = self.facilities.write() {
            guard.extend(facilities);
        }
        self
    }

    pub fn follow(&self, user_id: UserId, facility_id: FacilityId) -> Result<(), RepositoryError> {
        let mut guard = self.followed.write().map_err(|_| poisoned())?;
        let list = guard.entry(user_id).or_default();
        if !list.contains(&facility_id) {
            list.push(facility_id);
        }
        Ok(())
    }
}

impl Default for FacilityDirectory {
    fn default() -> Self {
        Self::new(3.0, 10)
    }
}

fn poisoned() -> RepositoryError {
    RepositoryError::Unavailable("facility directory lock poisoned".to_string())
}

impl FacilityResolver for FacilityDirectory {
    fn resolve(
        &self,
        user_id: &UserId,
        home: &GeoPoint,
        _age_class: AgeClass,
    ) -> Result<Vec<CandidateFacility>, RepositoryError> {
        let facilities = self.facilities.read().map_err(|_| poisoned())?;
        let followed = self.followed.read().map_err(|_| poisoned())?;

        let mut nearby = facilities
            .iter()
            .filter_map(|facility| {
                let distance = facility.location.as_ref()?.distance_km(home);
                (distance <= self.radius_km).then_some((distance, facility))
            })
            .collect::<Vec<_>>();
        nearby.sort_by(|left, right| left.0.total_cmp(&right.0));

        let mut resolved: Vec<CandidateFacility> = nearby
            .into_iter()
            .take(self.max_nearby)
            .map(|(_, facility)| facility.clone())
            .collect();

        for facility_id in followed.get(user_id).into_iter().flatten() {
            if resolved.iter().any(|known| &known.facility_id == facility_id) {
                continue;
            }
            if let Some(facility) = facilities.iter().find(|f| &f.facility_id == facility_id) {
                resolved.push(facility.clone());
            }
        }
        Ok(resolved)
    }
}
