use serde::{Deserialize, Serialize};

/// Tunables for route analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Lower bound on the desired-start window used to judge ETAs, in months.
    pub min_start_window_months: u32,
    /// Upper bound on candidates scored at the same time.
    pub score_concurrency: usize,
    pub min_reasons: usize,
    /// A priority skip this large is reported as the dominant driver.
    pub priority_boost_min_skip: u32,
    /// Same, expressed as a share of the raw queue position.
    pub priority_boost_share: f64,
    pub history_limit: usize,
    pub disclaimer: String,
}

impl StrategyParams {
    pub fn standard() -> Self {
        Self {
            min_start_window_months: 3,
            score_concurrency: 8,
            min_reasons: 3,
            priority_boost_min_skip: 3,
            priority_boost_share: 0.3,
            history_limit: 20,
            disclaimer: "Estimates are derived from published capacity history and do not \
                         guarantee admission. Final decisions rest with each facility and \
                         municipality."
                .to_string(),
        }
    }
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self::standard()
    }
}
