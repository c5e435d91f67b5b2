//! Quality score: weighted log-scaled engagement counters plus a recency
//! decay term. Pure function; the refresh worker and the detail view both
//! call it, so live and persisted scores can never drift in formula.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::prompt::PromptEngagement;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub base: f64,
    pub downloads: f64,
    pub likes: f64,
    pub visits: f64,
    pub recency: f64,
    /// Hours for the recency term to halve... strictly, to fall by 1/e.
    pub half_life_hours: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            base: 10.0,
            downloads: 2.0,
            likes: 3.0,
            visits: 1.0,
            recency: 5.0,
            half_life_hours: 168.0,
        }
    }
}

/// score = base + wD*ln(1+downloads) + wL*ln(1+likes) + wV*ln(1+visits)
///              + wR*exp(-age/halfLife)
///
/// The recency term is omitted when its weight is zero, the half-life is
/// not positive, or the timestamp is unset. Negative counters are treated
/// as zero; the score is monotonically non-decreasing in each counter.
pub fn compute_quality_score(
    engagement: &PromptEngagement,
    now: DateTime<Utc>,
    weights: &ScoreWeights,
) -> f64 {
    let log1p = |n: i64| (1.0 + n.max(0) as f64).ln();

    let mut score = weights.base
        + weights.downloads * log1p(engagement.downloads)
        + weights.likes * log1p(engagement.likes)
        + weights.visits * log1p(engagement.visits);

    if weights.recency != 0.0 && weights.half_life_hours > 0.0 {
        if let Some(updated_at) = engagement.updated_at {
            let age_hours = (now - updated_at).num_seconds().max(0) as f64 / 3600.0;
            score += weights.recency * (-age_hours / weights.half_life_hours).exp();
        }
    }

    score
}
