//! Bounded top-K leaderboard over completed job scores.
//!
//! Fixed-size min-heap: the root is the weakest retained entry, so each
//! completion costs O(log K) and rendering a batch summary never re-sorts
//! the full result set.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::types::DbId;

/// Default leaderboard capacity.
pub const DEFAULT_LEADERBOARD_SIZE: usize = 20;

/// One leaderboard entry. Ordered by score ascending (min-heap root is the
/// current cutoff), ties broken by job id so ordering is total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub job_id: DbId,
    pub candidate_id: String,
    pub score: f64,
}

impl Eq for LeaderboardEntry {}

impl Ord for LeaderboardEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Scores are produced by workers and must be finite; total_cmp keeps
        // the ordering total even if a NaN slips through.
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| other.job_id.cmp(&self.job_id))
    }
}

impl PartialOrd for LeaderboardEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Fixed-capacity top-K collection keyed by score.
#[derive(Debug)]
pub struct Leaderboard {
    capacity: usize,
    // BinaryHeap is a max-heap; LeaderboardEntry's Ord is reversed on score
    // so the heap root is the lowest-scoring retained entry.
    heap: BinaryHeap<LeaderboardEntry>,
}

impl Leaderboard {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            heap: BinaryHeap::with_capacity(capacity.max(1) + 1),
        }
    }

    /// Offer a completed job's score. Returns `true` if the entry was
    /// retained (it ranked above the current cutoff or the board had room).
    pub fn offer(&mut self, entry: LeaderboardEntry) -> bool {
        if self.heap.len() < self.capacity {
            self.heap.push(entry);
            return true;
        }
        // Root is the weakest retained entry.
        match self.heap.peek() {
            Some(weakest) if entry.score > weakest.score => {
                self.heap.pop();
                self.heap.push(entry);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Snapshot the board sorted best-first. O(K log K), independent of the
    /// number of completions offered.
    pub fn top(&self) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self.heap.iter().cloned().collect();
        entries.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.job_id.cmp(&b.job_id)));
        entries
    }
}

impl Default for Leaderboard {
    fn default() -> Self {
        Self::new(DEFAULT_LEADERBOARD_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(job_id: DbId, score: f64) -> LeaderboardEntry {
        LeaderboardEntry {
            job_id,
            candidate_id: format!("cand-{job_id}"),
            score,
        }
    }

    #[test]
    fn fills_up_to_capacity() {
        let mut board = Leaderboard::new(3);
        assert!(board.offer(entry(1, 0.1)));
        assert!(board.offer(entry(2, 0.2)));
        assert!(board.offer(entry(3, 0.3)));
        assert_eq!(board.len(), 3);
    }

    #[test]
    fn evicts_weakest_when_full() {
        let mut board = Leaderboard::new(2);
        board.offer(entry(1, 0.5));
        board.offer(entry(2, 0.9));
        assert!(board.offer(entry(3, 0.7)));

        let top = board.top();
        let ids: Vec<DbId> = top.iter().map(|e| e.job_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn rejects_scores_below_cutoff() {
        let mut board = Leaderboard::new(2);
        board.offer(entry(1, 0.5));
        board.offer(entry(2, 0.9));
        assert!(!board.offer(entry(3, 0.1)));
        assert_eq!(board.len(), 2);
    }

    #[test]
    fn top_is_sorted_best_first() {
        let mut board = Leaderboard::new(5);
        for (id, score) in [(1, 0.3), (2, 0.9), (3, 0.1), (4, 0.7)] {
            board.offer(entry(id, score));
        }
        let scores: Vec<f64> = board.top().iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![0.9, 0.7, 0.3, 0.1]);
    }

    #[test]
    fn many_offers_keep_only_k() {
        let mut board = Leaderboard::new(10);
        for i in 0..1_000 {
            board.offer(entry(i, i as f64 / 1_000.0));
        }
        let top = board.top();
        assert_eq!(top.len(), 10);
        // The ten highest scores survive.
        assert_eq!(top[0].job_id, 999);
        assert_eq!(top[9].job_id, 990);
    }

    #[test]
    fn zero_capacity_clamped_to_one() {
        let mut board = Leaderboard::new(0);
        board.offer(entry(1, 1.0));
        assert_eq!(board.len(), 1);
    }
}
