use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use metrics_exporter_prometheus::PrometheusHandle;
use seatwatch::error::AppError;
use seatwatch::quota::{InMemoryTierDirectory, InMemoryUsageCounter, QuotaPolicy, SubscriptionQuota};
use seatwatch::workflows::admission::{AdmissionService, FacilityCategory, InMemoryScoreCache, ScoringParams};
use seatwatch::workflows::alerts::{
    AlertDispatcher, AlertPayload, DispatchParams, InMemoryAlertStore, NotificationTransport,
    ReceiptStatus, SubscriptionService, TransportError,
};
use seatwatch::workflows::snapshots::{CapacitySnapshot, InMemorySnapshotStore, SnapshotCsvImporter};
use seatwatch::workflows::strategy::{
    CandidateFacility, FacilityDirectory, InMemoryRecommendationRepository, StrategyParams,
    StrategyService,
};
use seatwatch::workflows::turnover::{DetectorParams, InMemoryToEventStore, ToDetector};
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type Quota = SubscriptionQuota<InMemoryTierDirectory, InMemoryUsageCounter>;
pub(crate) type Admission = AdmissionService<InMemorySnapshotStore, InMemoryScoreCache, Quota>;
pub(crate) type Strategy =
    StrategyService<Admission, InMemoryRecommendationRepository, FacilityDirectory, Quota>;
pub(crate) type Detector = ToDetector<InMemorySnapshotStore, InMemoryToEventStore>;
pub(crate) type Dispatcher = AlertDispatcher<InMemoryAlertStore, LogTransport, Quota>;
pub(crate) type Subscriptions = SubscriptionService<InMemoryAlertStore, Quota>;

/// Every workflow service wired to in-memory storage.
pub(crate) struct Services {
    pub(crate) snapshots: Arc<InMemorySnapshotStore>,
    pub(crate) tiers: Arc<InMemoryTierDirectory>,
    pub(crate) directory: Arc<FacilityDirectory>,
    pub(crate) events: Arc<InMemoryToEventStore>,
    pub(crate) alerts: Arc<InMemoryAlertStore>,
    pub(crate) transport: Arc<LogTransport>,
    pub(crate) admission: Arc<Admission>,
    pub(crate) strategy: Arc<Strategy>,
    pub(crate) subscriptions: Arc<Subscriptions>,
    pub(crate) detector: Arc<Detector>,
    pub(crate) dispatcher: Arc<Dispatcher>,
}

impl Services {
    pub(crate) fn in_memory(snapshots: Vec<CapacitySnapshot>, directory: FacilityDirectory) -> Self {
        let snapshots = Arc::new(InMemorySnapshotStore::with_snapshots(snapshots));
        let tiers = Arc::new(InMemoryTierDirectory::default());
        let quota = Arc::new(SubscriptionQuota::new(
            tiers.clone(),
            Arc::new(InMemoryUsageCounter::default()),
            QuotaPolicy::standard(),
        ));
        let directory = Arc::new(directory);
        let events = Arc::new(InMemoryToEventStore::new());
        let alerts = Arc::new(InMemoryAlertStore::new());
        let transport = Arc::new(LogTransport::default());

        let admission = Arc::new(AdmissionService::new(
            snapshots.clone(),
            Arc::new(InMemoryScoreCache::default()),
            quota.clone(),
            ScoringParams::standard(),
        ));
        let strategy = Arc::new(StrategyService::new(
            admission.clone(),
            Arc::new(InMemoryRecommendationRepository::new()),
            directory.clone(),
            quota.clone(),
            StrategyParams::standard(),
        ));
        let subscriptions = Arc::new(SubscriptionService::new(alerts.clone(), quota.clone()));
        let detector = Arc::new(ToDetector::new(
            snapshots.clone(),
            events.clone(),
            DetectorParams::standard(),
        ));
        let dispatcher = Arc::new(AlertDispatcher::new(
            alerts.clone(),
            transport.clone(),
            quota,
            DispatchParams::standard(),
        ));

        Self {
            snapshots,
            tiers,
            directory,
            events,
            alerts,
            transport,
            admission,
            strategy,
            subscriptions,
            detector,
            dispatcher,
        }
    }
}

/// Reads the optional seed CSV; a missing path starts the service with an empty history.
pub(crate) fn load_snapshots(path: Option<&Path>) -> Result<Vec<CapacitySnapshot>, AppError> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let snapshots = SnapshotCsvImporter::from_path(path)?;
    info!(path = %path.display(), rows = snapshots.len(), "capacity snapshots loaded");
    Ok(snapshots)
}

/// Directory entry for every facility present in the snapshot history. Seeded facilities have
/// no coordinates, so they only reach analysis when named explicitly or followed.
pub(crate) fn directory_from_snapshots(snapshots: &[CapacitySnapshot]) -> FacilityDirectory {
    let ids = snapshots
        .iter()
        .map(|snapshot| snapshot.facility_id.clone())
        .collect::<BTreeSet<_>>();
    FacilityDirectory::default().with_facilities(ids.into_iter().map(|facility_id| {
        CandidateFacility {
            name: facility_id.to_string(),
            facility_id,
            category: FacilityCategory::Public,
            extended_care: false,
            queue_position: None,
            location: None,
        }
    }))
}

/// Push transport that logs each notification instead of calling a push gateway. Receipts
/// always report delivery.
#[derive(Default)]
pub(crate) struct LogTransport {
    sent: Mutex<Vec<(String, AlertPayload)>>,
}

impl LogTransport {
    pub(crate) fn sent(&self) -> Vec<(String, AlertPayload)> {
        self.sent
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl NotificationTransport for LogTransport {
    fn dispatch(&self, token: &str, payload: &AlertPayload) -> Result<String, TransportError> {
        let ticket = Uuid::new_v4().to_string();
        info!(
            %ticket,
            facility_id = %payload.facility_id,
            age_class = %payload.age_class,
            title = %payload.title,
            "push notification sent"
        );
        self.sent
            .lock()
            .map_err(|_| TransportError::Unavailable("transport log poisoned".to_string()))?
            .push((token.to_string(), payload.clone()));
        Ok(ticket)
    }

    fn receipt(&self, _delivery_id: &str) -> Result<ReceiptStatus, TransportError> {
        Ok(ReceiptStatus::Ok)
    }
}
