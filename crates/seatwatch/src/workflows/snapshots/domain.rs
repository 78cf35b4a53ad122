use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Identifier for a childcare facility.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityId(pub String);

impl FacilityId {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::new("facility_id", "must not be empty"));
        }
        if trimmed.len() > 64 {
            return Err(ValidationError::new(
                "facility_id",
                "must be at most 64 characters",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Age band used by facilities to allocate classrooms (child age in full years at March 1st).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgeClass {
    #[serde(rename = "AGE_0")]
    Age0,
    #[serde(rename = "AGE_1")]
    Age1,
    #[serde(rename = "AGE_2")]
    Age2,
    #[serde(rename = "AGE_3")]
    Age3,
    #[serde(rename = "AGE_4")]
    Age4,
    #[serde(rename = "AGE_5")]
    Age5,
}

impl AgeClass {
    pub const ALL: [AgeClass; 6] = [
        AgeClass::Age0,
        AgeClass::Age1,
        AgeClass::Age2,
        AgeClass::Age3,
        AgeClass::Age4,
        AgeClass::Age5,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AgeClass::Age0 => "AGE_0",
            AgeClass::Age1 => "AGE_1",
            AgeClass::Age2 => "AGE_2",
            AgeClass::Age3 => "AGE_3",
            AgeClass::Age4 => "AGE_4",
            AgeClass::Age5 => "AGE_5",
        }
    }

    pub fn years(&self) -> u8 {
        match self {
            AgeClass::Age0 => 0,
            AgeClass::Age1 => 1,
            AgeClass::Age2 => 2,
            AgeClass::Age3 => 3,
            AgeClass::Age4 => 4,
            AgeClass::Age5 => 5,
        }
    }
}

impl fmt::Display for AgeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AgeClass {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        AgeClass::ALL
            .into_iter()
            .find(|class| class.label() == normalized)
            .ok_or_else(|| ValidationError::new("age_class", "expected one of AGE_0..AGE_5"))
    }
}

/// How much the upstream feed that produced a snapshot can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReliabilityTier {
    /// Public registry or facility-operated feed.
    #[default]
    Official,
    /// Scraped from facility or portal pages.
    Crawled,
    /// Reported by parents.
    Community,
}

impl ReliabilityTier {
    pub fn base_confidence(&self) -> f64 {
        match self {
            ReliabilityTier::Official => 0.9,
            ReliabilityTier::Crawled => 0.75,
            ReliabilityTier::Community => 0.6,
        }
    }
}

impl FromStr for ReliabilityTier {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "official" => Ok(Self::Official),
            "crawled" => Ok(Self::Crawled),
            "community" => Ok(Self::Community),
            _ => Err(ValidationError::new(
                "reliability",
                "expected official, crawled, or community",
            )),
        }
    }
}

/// Point-in-time capacity observation for one facility and age class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    pub facility_id: FacilityId,
    pub age_class: AgeClass,
    pub capacity_total: u32,
    pub current_occupied: u32,
    pub waiting_count: u32,
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub reliability: ReliabilityTier,
}

impl CapacitySnapshot {
    pub fn key(&self) -> SnapshotKey {
        SnapshotKey {
            facility_id: self.facility_id.clone(),
            age_class: self.age_class,
        }
    }

    pub fn open_seats(&self) -> u32 {
        self.capacity_total.saturating_sub(self.current_occupied)
    }

    /// Structural checks every stored observation must pass.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.facility_id.0.trim().is_empty() {
            return Err(ValidationError::new("facility_id", "must not be empty"));
        }
        if self.current_occupied > self.capacity_total {
            return Err(ValidationError::new(
                "current_occupied",
                format!(
                    "occupied {} exceeds capacity {}",
                    self.current_occupied, self.capacity_total
                ),
            ));
        }
        Ok(())
    }
}

/// Snapshot series identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub facility_id: FacilityId,
    pub age_class: AgeClass,
}

impl SnapshotKey {
    pub fn new(facility_id: FacilityId, age_class: AgeClass) -> Self {
        Self {
            facility_id,
            age_class,
        }
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.facility_id, self.age_class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_class_parses_case_insensitively() {
        assert_eq!("age_2".parse::<AgeClass>().unwrap(), AgeClass::Age2);
        let err = "AGE_9".parse::<AgeClass>().expect_err("unknown class");
        assert_eq!(err.field, "age_class");
    }

    #[test]
    fn age_class_serializes_with_wire_labels() {
        let json = serde_json::to_string(&AgeClass::Age3).expect("serializes");
        assert_eq!(json, "\"AGE_3\"");
    }

    #[test]
    fn facility_id_rejects_blank_values() {
        assert!(FacilityId::parse("   ").is_err());
        assert_eq!(FacilityId::parse(" F1 ").unwrap().as_str(), "F1");
    }
}
