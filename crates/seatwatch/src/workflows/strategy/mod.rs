//! Route strategy: groups candidate facilities into admission routes, ranks them by
//! admission outlook, and records a recommendation with a document checklist.

pub mod analysis;
pub mod checklist;
pub mod domain;
pub mod params;
pub mod repository;
pub mod resolver;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use analysis::{route_for, route_grade, ScoredCandidate};
pub use checklist::checklist_for;
pub use domain::{
    AnalyzeRequest, CandidateFacility, ChecklistItem, Confidence, FacilityScoreView, GeoPoint,
    RecommendationRecord, RecommendationSummary, RecommendationWidget, RouteCard, RouteGrade,
    RouteKind, UserContext,
};
pub use params::StrategyParams;
pub use repository::{InMemoryRecommendationRepository, RecommendationRepository};
pub use resolver::{FacilityDirectory, FacilityResolver};
pub use router::strategy_router;
pub use service::{CandidateScorer, StrategyService, StrategyServiceError};
