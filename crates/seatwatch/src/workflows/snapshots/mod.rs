//! Capacity observations: domain types, the store seam, and CSV import.

pub mod domain;
pub mod import;
pub mod store;

pub use domain::{AgeClass, CapacitySnapshot, FacilityId, ReliabilityTier, SnapshotKey};
pub use import::{SnapshotCsvImporter, SnapshotImportError};
pub use store::{CapacitySnapshotStore, InMemorySnapshotStore};
