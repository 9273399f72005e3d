//! Inputs and outputs of the sync state machine.
//!
//! The [`Logic`](crate::logic::Logic) is synchronous and performs no I/O:
//! the host delivers [`Event`]s and executes the returned [`Action`]s. Both
//! ids are minted by the state machine itself, so cancelling a timer or a
//! pending request needs no return channel from the host.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use roundsync_core::{Name, SeqNo, Sha256Digest};

use crate::diff::{ExcludeFilter, RoundNo};
use crate::packet::DataPacket;

/// Identifier of a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u64);

/// Identifier of an in-flight named request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingId(pub u64);

/// A contiguous range of sequence numbers newly learned for one session.
///
/// Batches of these are handed to the application whenever reception
/// advances the aggregate state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingDataInfo {
    /// The producer session that advanced.
    pub session: Name,
    /// Lowest newly-available sequence number.
    pub low: SeqNo,
    /// Highest newly-available sequence number.
    pub high: SeqNo,
}

/// What an in-flight request was for; echoed back with its reply or
/// timeout so the state machine needs no side table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterestKind {
    /// Data interest for one round.
    Data {
        /// The round being fished.
        round: RoundNo,
        /// Retry ordinal, starting at 1.
        retries: u32,
    },
    /// Sync interest announcing a round digest. Replies and timeouts are
    /// both ignored.
    Sync {
        /// The announced round.
        round: RoundNo,
    },
    /// Recovery interest asking a peer for its full state.
    Reco {
        /// The peer prefix being asked.
        peer: Name,
    },
}

/// A named request to put on the wire.
#[derive(Debug, Clone)]
pub struct InterestReq {
    /// Cancellation handle, minted by the state machine.
    pub id: PendingId,
    /// The request name.
    pub name: Name,
    /// How long the request stays pending before timing out.
    pub lifetime: Duration,
    /// Whether cached data must still be fresh to satisfy this request.
    pub must_be_fresh: bool,
    /// Response suffixes the requester has already seen.
    pub exclude: ExcludeFilter,
    /// Context echoed back with the reply or timeout.
    pub kind: InterestKind,
}

/// Obligations the state machine schedules for itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerTask {
    /// Express a data interest for a round.
    SendDataInterest {
        /// Round to fish.
        round: RoundNo,
        /// Retry ordinal, starting at 1.
        retries: u32,
    },
    /// Express a sync interest carrying a round's digest.
    SendSyncInterest {
        /// Round whose digest to announce.
        round: RoundNo,
    },
    /// Run a stabilization pass.
    Stabilize,
    /// Re-evaluate a deferred recovery decision.
    RetryCheckRecovery {
        /// Session name the cumulative came from.
        peer: Name,
        /// Round the cumulative covers.
        round: RoundNo,
        /// The received cumulative digest.
        digest: Sha256Digest,
    },
    /// Emit a cumulative-only production.
    ProduceCumulativeOnly {
        /// Round the digest covers.
        round: RoundNo,
        /// The local cumulative digest to announce.
        digest: Sha256Digest,
    },
    /// Express a recovery interest towards a peer.
    SendRecoInterest {
        /// The peer prefix to ask.
        peer: Name,
    },
}

/// One input to the state machine.
#[derive(Debug, Clone)]
pub enum Event {
    /// An interest arrived on one of the node's registered prefixes.
    Interest {
        /// The interest name.
        name: Name,
    },
    /// A reply to one of the node's own requests arrived.
    Reply {
        /// What the request was for.
        kind: InterestKind,
        /// The signed response.
        packet: DataPacket,
    },
    /// One of the node's own requests expired unanswered.
    Timeout {
        /// What the request was for.
        kind: InterestKind,
    },
    /// A scheduled timer fired.
    Timer {
        /// The timer's id.
        id: EventId,
        /// The obligation it carried.
        task: TimerTask,
    },
}

/// One output of the state machine, to be executed by the host.
#[derive(Debug, Clone)]
pub enum Action {
    /// Put a named request on the wire.
    ExpressInterest(InterestReq),
    /// Withdraw an in-flight request (self-satisfaction).
    CancelInterest(PendingId),
    /// Publish a signed data packet.
    PutData(DataPacket),
    /// Schedule `task` after `delay`.
    SetTimer {
        /// Cancellation handle, minted by the state machine.
        id: EventId,
        /// Delay before firing.
        delay: Duration,
        /// The obligation to deliver back.
        task: TimerTask,
    },
    /// Cancel a scheduled timer.
    CancelTimer(EventId),
    /// Hand newly-learned sequence ranges to the application.
    DeliverUpdates(Vec<MissingDataInfo>),
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

impl fmt::Display for PendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pending#{}", self.0)
    }
}
