//! Result payload shapes served by the read API.
//!
//! Light and heavy renditions are explicit tagged variants rather than one
//! record with optional fields probed at the use site: consumers branch on
//! the `detail` tag, and a heavy record is always a field superset of the
//! light record for the same job.

use serde::{Deserialize, Serialize};

/// Small per-job result fields safe to ship on every page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightResult {
    /// Ranking score extracted from the worker result.
    pub score: f64,
    /// Compact worker-reported metrics (small JSON object).
    pub metrics: serde_json::Value,
}

/// Full result including large artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeavyResult {
    pub score: f64,
    pub metrics: serde_json::Value,
    /// Large artifact payload omitted from light pages.
    pub artifacts: serde_json::Value,
}

/// A result payload at one of the two detail levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "detail", rename_all = "snake_case")]
pub enum ResultPayload {
    Light(LightResult),
    Heavy(HeavyResult),
}

impl ResultPayload {
    pub fn score(&self) -> f64 {
        match self {
            Self::Light(light) => light.score,
            Self::Heavy(heavy) => heavy.score,
        }
    }

    pub fn is_heavy(&self) -> bool {
        matches!(self, Self::Heavy(_))
    }

    /// View the light fields regardless of detail level.
    pub fn as_light(&self) -> LightResult {
        match self {
            Self::Light(light) => light.clone(),
            Self::Heavy(heavy) => LightResult {
                score: heavy.score,
                metrics: heavy.metrics.clone(),
            },
        }
    }

    /// Merge an incoming payload over `self`, never downgrading: a heavy
    /// record is kept when the incoming record is light for the same job.
    pub fn merge(self, incoming: ResultPayload) -> ResultPayload {
        match (&self, &incoming) {
            (Self::Heavy(_), Self::Light(_)) => self,
            _ => incoming,
        }
    }
}
