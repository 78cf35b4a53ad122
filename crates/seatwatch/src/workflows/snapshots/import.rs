//! CSV import of capacity observations delivered by the facility data feed.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};

use super::domain::{AgeClass, CapacitySnapshot, FacilityId, ReliabilityTier};
use crate::error::ValidationError;

/// Loads snapshot rows with the header
/// `facility_id,age_class,capacity_total,current_occupied,waiting_count,observed_at[,reliability]`.
pub struct SnapshotCsvImporter;

impl SnapshotCsvImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<CapacitySnapshot>, SnapshotImportError> {
        let file = File::open(path.as_ref()).map_err(SnapshotImportError::Io)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<CapacitySnapshot>, SnapshotImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut snapshots = Vec::new();

        for (index, record) in csv_reader.deserialize::<SnapshotRow>().enumerate() {
            // header occupies line 1
            let line = index + 2;
            let row = record.map_err(SnapshotImportError::Csv)?;
            let snapshot = row
                .into_snapshot()
                .map_err(|source| SnapshotImportError::Row { line, source })?;
            snapshots.push(snapshot);
        }

        Ok(snapshots)
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotRow {
    facility_id: String,
    age_class: String,
    capacity_total: u32,
    current_occupied: u32,
    #[serde(default)]
    waiting_count: u32,
    observed_at: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    reliability: Option<String>,
}

impl SnapshotRow {
    fn into_snapshot(self) -> Result<CapacitySnapshot, ValidationError> {
        let observed_at = parse_timestamp(&self.observed_at).ok_or_else(|| {
            ValidationError::new(
                "observed_at",
                format!("'{}' is not RFC 3339 or YYYY-MM-DD", self.observed_at),
            )
        })?;
        let reliability = match self.reliability.as_deref() {
            Some(raw) => raw.parse::<ReliabilityTier>()?,
            None => ReliabilityTier::default(),
        };

        let snapshot = CapacitySnapshot {
            facility_id: FacilityId::parse(&self.facility_id)?,
            age_class: self.age_class.parse::<AgeClass>()?,
            capacity_total: self.capacity_total,
            current_occupied: self.current_occupied,
            waiting_count: self.waiting_count,
            observed_at,
            reliability,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[derive(Debug)]
pub enum SnapshotImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Row {
        line: usize,
        source: ValidationError,
    },
}

impl fmt::Display for SnapshotImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotImportError::Io(err) => write!(f, "failed to read snapshot file: {err}"),
            SnapshotImportError::Csv(err) => write!(f, "failed to parse snapshot csv: {err}"),
            SnapshotImportError::Row { line, source } => {
                write!(f, "line {line}: {source}")
            }
        }
    }
}

impl std::error::Error for SnapshotImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapshotImportError::Io(err) => Some(err),
            SnapshotImportError::Csv(err) => Some(err),
            SnapshotImportError::Row { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_rows_with_optional_reliability() {
        let csv = "facility_id,age_class,capacity_total,current_occupied,waiting_count,observed_at,reliability\n\
                   F1,AGE_2,20,19,7,2025-03-01T09:00:00Z,\n\
                   F1, age_2 ,20,18,6,2025-03-02,crawled\n";

        let snapshots = SnapshotCsvImporter::from_reader(Cursor::new(csv)).expect("csv parses");

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].reliability, ReliabilityTier::Official);
        assert_eq!(snapshots[1].age_class, AgeClass::Age2);
        assert_eq!(snapshots[1].reliability, ReliabilityTier::Crawled);
        assert_eq!(snapshots[1].current_occupied, 18);
    }

    #[test]
    fn reports_line_of_invalid_row() {
        let csv = "facility_id,age_class,capacity_total,current_occupied,waiting_count,observed_at\n\
                   F1,AGE_2,20,19,7,2025-03-01\n\
                   F1,AGE_2,20,25,7,2025-03-02\n";

        let err = SnapshotCsvImporter::from_reader(Cursor::new(csv)).expect_err("row rejected");
        match err {
            SnapshotImportError::Row { line, source } => {
                assert_eq!(line, 3);
                assert_eq!(source.field, "current_occupied");
            }
            other => panic!("expected row error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unparseable_timestamps() {
        let csv = "facility_id,age_class,capacity_total,current_occupied,waiting_count,observed_at\n\
                   F1,AGE_2,20,19,7,last tuesday\n";
        let err = SnapshotCsvImporter::from_reader(Cursor::new(csv)).expect_err("bad timestamp");
        assert!(err.to_string().contains("observed_at"));
    }
}
