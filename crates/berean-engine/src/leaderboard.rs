//! Leaderboard ranking with deterministic tie-breaks.
//!
//! Ordering is a total order over score entries:
//!
//! 1. total score, descending;
//! 2. cumulative answered (non-timeout) latency, ascending — the faster
//!    aggregate time ranks higher;
//! 3. room join order, ascending.
//!
//! Join order is unique per room, so two entries can never compare equal:
//! identical inputs always produce the identical ranking, and ranks are
//! assigned positionally (1, 2, 3, …) with no shared ranks.

use std::cmp::Reverse;

use berean_protocol::{LeaderboardEntry, ParticipantId};

use crate::ScoreBoard;

/// Ranks the board into leaderboard rows.
///
/// `join_order` maps a participant to their join sequence; the roster
/// provides it. Does not bump the board version — publishing is the
/// caller's move, so a recompute for display can't perturb the version
/// stream.
pub fn rank<F>(board: &ScoreBoard, join_order: F) -> Vec<LeaderboardEntry>
where
    F: Fn(ParticipantId) -> u64,
{
    let mut rows: Vec<_> = board
        .entries()
        .map(|e| (e.participant, e.total, e.answered_latency))
        .collect();

    rows.sort_by_key(|&(participant, total, latency)| {
        (Reverse(total), latency, join_order(participant))
    });

    rows.into_iter()
        .enumerate()
        .map(|(i, (participant_id, score, _))| LeaderboardEntry {
            participant_id,
            rank: i + 1,
            score,
        })
        .collect()
}

// =========================================================================
// Tests
// =========================================================================
