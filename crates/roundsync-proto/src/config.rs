//! Protocol tunables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use roundsync_core::SeqNo;

/// Sequence number reserved for cumulative-only records in the round log.
/// A leaf with this seq-no marks a producer that spent the round announcing
/// a cumulative digest rather than application data; it is never reported
/// through the update callback.
pub const CUMULATIVE_ONLY_SEQ: SeqNo = 0;

/// Timing and retry configuration of the sync state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Lifetime of outgoing data interests.
    pub data_interest_lifetime: Duration,
    /// Lifetime of outgoing sync interests.
    pub sync_interest_lifetime: Duration,
    /// Freshness period stamped on published data.
    pub data_freshness: Duration,
    /// Delay before announcing a round's digest, so the announcement covers
    /// everything fished in that round.
    pub round_digest_delay: Duration,
    /// Period of the cumulative-digest stabilization timer.
    pub stabilize_delay: Duration,
    /// Delay before re-evaluating a recovery decision that is waiting for a
    /// round to stabilize.
    pub retry_check_recovery_delay: Duration,
    /// Upper bound of the jitter applied to cumulative-only emissions.
    pub cumulative_only_delay: Duration,
    /// Jitter range (min..=max, milliseconds) added to re-expressed
    /// current-round data interests.
    pub reexpress_jitter_ms: (u64, u64),
    /// Widest forward round jump that is still gap-fished; anything wider
    /// waits for recovery.
    pub max_rounds_without_recovery: u64,
    /// How many rounds behind the current one are re-fished after applying
    /// a recovery snapshot.
    pub back_unstable_rounds: u64,
    /// Consecutive current-round data-interest timeouts before a
    /// cumulative-only emission is scheduled.
    pub max_data_interest_to_cumulative_only: u32,
    /// Retry budget for data interests in rounds with no local entry.
    pub max_data_interest_timeouts: u32,
    /// Retry budget for recovery interests.
    pub max_reco_interest_timeouts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_interest_lifetime: Duration::from_millis(1000),
            sync_interest_lifetime: Duration::from_millis(1000),
            data_freshness: Duration::from_millis(1000),
            round_digest_delay: Duration::from_millis(1000),
            stabilize_delay: Duration::from_millis(5000),
            retry_check_recovery_delay: Duration::from_millis(2000),
            cumulative_only_delay: Duration::from_millis(1000),
            reexpress_jitter_ms: (100, 500),
            max_rounds_without_recovery: 10,
            back_unstable_rounds: 5,
            max_data_interest_to_cumulative_only: 5,
            max_data_interest_timeouts: 5,
            max_reco_interest_timeouts: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let config = SyncConfig::default();
        assert_eq!(config.data_interest_lifetime, Duration::from_millis(1000));
        assert_eq!(config.stabilize_delay, Duration::from_millis(5000));
        assert_eq!(config.max_rounds_without_recovery, 10);
        assert_eq!(config.back_unstable_rounds, 5);
        assert_eq!(config.reexpress_jitter_ms, (100, 500));
    }
}
