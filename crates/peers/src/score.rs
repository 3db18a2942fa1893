// Path: crates/peers/src/score.rs

//! The peer score: a 0–100 blend of freshness, latency, reliability,
//! capacity, and shard relevance. Banned peers score zero regardless.

use bytecave_types::peer::{PeerObservation, ScoreWeights};
use bytecave_types::UnixMillis;

/// Freshness decays to zero as the last valid contact ages toward one hour.
const FRESHNESS_HORIZON_MS: f64 = 3600.0 * 1000.0;
/// Latency scores zero at five seconds.
const LATENCY_HORIZON_MS: f64 = 5000.0;
/// Without capacity data every peer scores the midpoint.
const DEFAULT_CAPACITY_SCORE: f64 = 50.0;

fn clamp(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

pub fn freshness_score(last_seen: UnixMillis, now: UnixMillis) -> f64 {
    let age = (now - last_seen).max(0) as f64;
    clamp(100.0 * (1.0 - age / FRESHNESS_HORIZON_MS))
}

pub fn latency_score(avg_latency_ms: f64) -> f64 {
    clamp(100.0 * (1.0 - avg_latency_ms / LATENCY_HORIZON_MS))
}

/// `owns_shard` is `None` when the peer does not advertise its shards.
pub fn shard_relevance_score(owns_shard: Option<bool>) -> f64 {
    match owns_shard {
        Some(true) => 100.0,
        _ => 50.0,
    }
}

/// The weighted score for one peer. A peer with no observations yet gets
/// full freshness credit only if it was just registered.
pub fn score(
    observation: &PeerObservation,
    owns_shard: Option<bool>,
    weights: &ScoreWeights,
    now: UnixMillis,
) -> f64 {
    let freshness = freshness_score(observation.last_seen, now);
    let latency = latency_score(observation.avg_latency_ms);
    let reliability = observation.success_rate() * 100.0;
    let capacity = DEFAULT_CAPACITY_SCORE;
    let relevance = shard_relevance_score(owns_shard);

    weights.freshness * freshness
        + weights.latency * latency
        + weights.reliability * reliability
        + weights.capacity * capacity
        + weights.shard_relevance * relevance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshness_is_linear_over_an_hour() {
        assert_eq!(freshness_score(1000, 1000), 100.0);
        let half = freshness_score(0, 30 * 60 * 1000);
        assert!((half - 50.0).abs() < 0.01);
        assert_eq!(freshness_score(0, 3600 * 1000), 0.0);
        assert_eq!(freshness_score(0, 7200 * 1000), 0.0);
    }

    #[test]
    fn latency_is_linear_to_five_seconds() {
        assert_eq!(latency_score(0.0), 100.0);
        assert_eq!(latency_score(2500.0), 50.0);
        assert_eq!(latency_score(5000.0), 0.0);
        assert_eq!(latency_score(9000.0), 0.0);
    }

    #[test]
    fn perfect_peer_scores_near_the_top() {
        let obs = PeerObservation {
            success_count: 10,
            failure_count: 0,
            avg_latency_ms: 0.0,
            last_seen: 1_000,
            cached_at: 0,
        };
        let s = score(&obs, Some(true), &ScoreWeights::default(), 1_000);
        // 0.4·100 + 0.2·100 + 0.2·100 + 0.1·50 + 0.1·100 = 95
        assert!((s - 95.0).abs() < 0.01);
    }

    #[test]
    fn unknown_shards_take_the_midpoint() {
        assert_eq!(shard_relevance_score(None), 50.0);
        assert_eq!(shard_relevance_score(Some(false)), 50.0);
        assert_eq!(shard_relevance_score(Some(true)), 100.0);
    }
}
