use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::detector::{detect, DetectionError};
use super::domain::{DetectionReport, DetectorParams, JobStatus, TOEvent};
use super::repository::ToEventRepository;
use crate::retry::Backoff;
use crate::storage::{InsertOutcome, RepositoryError};
use crate::workflows::snapshots::{CapacitySnapshotStore, SnapshotKey};

/// Report plus the events that were newly stored by the run.
#[derive(Debug, Clone)]
pub struct DetectionRun {
    pub report: DetectionReport,
    pub events: Vec<TOEvent>,
}

#[derive(Debug, thiserror::Error)]
enum KeyError {
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

enum KeyOutcome {
    Emitted(TOEvent),
    Duplicate,
    Quiet,
}

/// Batch job diffing the latest two snapshots of every series.
pub struct ToDetector<S, E> {
    snapshots: Arc<S>,
    events: Arc<E>,
    params: DetectorParams,
}

impl<S, E> ToDetector<S, E>
where
    S: CapacitySnapshotStore + 'static,
    E: ToEventRepository + 'static,
{
    pub fn new(snapshots: Arc<S>, events: Arc<E>, params: DetectorParams) -> Self {
        Self {
            snapshots,
            events,
            params,
        }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    fn backoff(&self) -> Backoff {
        Backoff::new(
            self.params.list_attempts,
            Duration::from_millis(self.params.list_backoff_ms),
        )
    }

    /// Scans series in stable key order until done or `budget` runs out. Blocks while
    /// backing off from transient store failures.
    pub fn run(&self, now: DateTime<Utc>, budget: Duration) -> DetectionRun {
        let started = Instant::now();
        let backoff = self.backoff();

        let keys = match backoff.run(|_| self.snapshots.keys(), RepositoryError::is_transient) {
            Ok(keys) => keys,
            Err(exhausted) => {
                warn!(
                    attempts = exhausted.attempts,
                    error = %exhausted.error,
                    "to detection could not list snapshot series"
                );
                return DetectionRun {
                    report: DetectionReport {
                        status: JobStatus::Failed,
                        scanned: 0,
                        events_emitted: 0,
                        duplicates: 0,
                        errors: 1,
                        timestamp: now,
                        events: Vec::new(),
                    },
                    events: Vec::new(),
                };
            }
        };

        let mut scanned = 0;
        let mut duplicates = 0;
        let mut errors = 0;
        let mut emitted = Vec::new();
        let mut out_of_budget = false;

        for key in &keys {
            if started.elapsed() >= budget {
                out_of_budget = true;
                break;
            }
            scanned += 1;
            match self.scan_key(key, now, &backoff) {
                Ok(KeyOutcome::Emitted(event)) => emitted.push(event),
                Ok(KeyOutcome::Duplicate) => duplicates += 1,
                Ok(KeyOutcome::Quiet) => {}
                Err(error) => {
                    errors += 1;
                    warn!(series = %key, %error, "to detection skipped series");
                }
            }
        }

        let status = if out_of_budget || errors > 0 {
            JobStatus::Partial
        } else {
            JobStatus::Completed
        };
        let report = DetectionReport {
            status,
            scanned,
            events_emitted: emitted.len(),
            duplicates,
            errors,
            timestamp: now,
            events: emitted.iter().map(|event| event.event_id).collect(),
        };
        info!(
            status = ?report.status,
            series = keys.len(),
            scanned,
            events = report.events_emitted,
            duplicates,
            errors,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "to detection finished"
        );

        DetectionRun {
            report,
            events: emitted,
        }
    }

    fn scan_key(
        &self,
        key: &SnapshotKey,
        now: DateTime<Utc>,
        backoff: &Backoff,
    ) -> Result<KeyOutcome, KeyError> {
        let history = backoff
            .run(
                |_| self.snapshots.history(&key.facility_id, key.age_class),
                RepositoryError::is_transient,
            )
            .map_err(|exhausted| exhausted.error)?;

        let Some((current, earlier)) = history.split_last() else {
            return Ok(KeyOutcome::Quiet);
        };
        let Some(event) = detect(earlier.last(), current, &self.params, now)? else {
            return Ok(KeyOutcome::Quiet);
        };

        let outcome = backoff
            .run(
                |_| self.events.insert_unique(event.clone()),
                RepositoryError::is_transient,
            )
            .map_err(|exhausted| exhausted.error)?;

        Ok(match outcome {
            InsertOutcome::Inserted(stored) => KeyOutcome::Emitted(stored),
            InsertOutcome::Duplicate => KeyOutcome::Duplicate,
        })
    }
}
