//! Batch submission validation and normalization.
//!
//! Pure functions used by the submission service before anything touches
//! the database: a batch that fails validation never creates any rows.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default cap on candidates per batch. Overridable via configuration.
pub const DEFAULT_MAX_CANDIDATES: usize = 1_000;

/// Default per-batch dispatch window when the submitter does not set one.
pub const DEFAULT_MAX_CONCURRENT: i64 = 4;

/// Maximum length of a batch name.
const MAX_NAME_LEN: usize = 256;

/// One candidate to evaluate against the batch target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Submitter-chosen identifier, unique within the batch.
    pub id: String,
    /// Opaque descriptor handed to the worker.
    pub descriptor: serde_json::Value,
}

/// A validated submission request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitBatch {
    pub name: String,
    /// Opaque target descriptor shared by every job in the batch.
    pub target: serde_json::Value,
    pub candidates: Vec<Candidate>,
    pub max_concurrent: Option<i64>,
    pub priority: Option<i32>,
}

/// Validate a submission and normalize the candidate list in place.
///
/// Rules:
/// - `name` must not be empty or exceed [`MAX_NAME_LEN`] characters.
/// - `candidates` must not be empty.
/// - Duplicate candidate ids are dropped (first occurrence wins) with a
///   warning, not an error.
/// - After dedup, the candidate count must not exceed `max_candidates`
///   (`LimitExceeded` otherwise).
/// - `max_concurrent`, when present, must be positive.
pub fn validate_submission(
    request: &mut SubmitBatch,
    max_candidates: usize,
) -> Result<(), CoreError> {
    if request.name.is_empty() {
        return Err(CoreError::Validation(
            "name: batch name must not be empty".to_string(),
        ));
    }
    if request.name.len() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "name: batch name must not exceed {MAX_NAME_LEN} characters"
        )));
    }
    if request.candidates.is_empty() {
        return Err(CoreError::Validation(
            "candidates: candidate list must not be empty".to_string(),
        ));
    }
    for (i, candidate) in request.candidates.iter().enumerate() {
        if candidate.id.is_empty() {
            return Err(CoreError::Validation(format!(
                "candidates: candidate at index {i} has an empty id"
            )));
        }
    }

    let dropped = dedup_candidates(&mut request.candidates);
    if dropped > 0 {
        tracing::warn!(
            batch_name = %request.name,
            dropped,
            "Duplicate candidate ids dropped from submission",
        );
    }

    if request.candidates.len() > max_candidates {
        return Err(CoreError::LimitExceeded(format!(
            "candidates: {} candidates exceed the cap of {max_candidates}",
            request.candidates.len()
        )));
    }

    if let Some(mc) = request.max_concurrent {
        if mc <= 0 {
            return Err(CoreError::Validation(
                "max_concurrent: must be a positive integer".to_string(),
            ));
        }
    }

    Ok(())
}

/// Remove candidates whose id was already seen, preserving order.
/// Returns the number of dropped entries.
fn dedup_candidates(candidates: &mut Vec<Candidate>) -> usize {
    let before = candidates.len();
    let mut seen = std::collections::HashSet::with_capacity(before);
    candidates.retain(|c| seen.insert(c.id.clone()));
    before - candidates.len()
}
