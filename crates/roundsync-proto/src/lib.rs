//! # roundsync protocol
//!
//! The roundsync synchronization protocol: every node in a group publishes
//! an append-only sequence of numbered updates under a per-session name,
//! and the group converges on the full `{session name → latest seq-no}`
//! map over a named-data substrate.
//!
//! ## Overview
//!
//! Production is organized into rounds. Each round's contributions form a
//! [`DiffState`] with a round digest; sync interests advertise round
//! digests so peers can fish rounds they are missing with data interests.
//! A periodic stabilization pass folds old rounds into a frozen state and
//! commits a cumulative digest per round, which fingerprints the group's
//! whole history; diverging cumulative digests (or a round jump too wide
//! to fish) trigger a full-state recovery from a peer.
//!
//! ## Key Properties
//!
//! - **Monotonic**: per-session seq-nos never regress
//! - **Commutative**: reception order does not affect the converged state
//! - **Self-stabilizing**: partitions heal via gap-fishing or recovery
//!
//! ## Architecture
//!
//! [`Logic`] is a synchronous state machine: the host feeds it [`Event`]s
//! and executes the [`Action`]s it returns. No I/O and no clock live in
//! this crate, which is what makes the protocol simulable and every test
//! deterministic.

pub mod config;
pub mod content;
pub mod diff;
pub mod error;
pub mod event;
pub mod log;
pub mod logic;
pub mod packet;

pub use config::{SyncConfig, CUMULATIVE_ONLY_SEQ};
pub use content::{ContentType, DataContent, RecoData};
pub use diff::{CumulativeInfo, DiffState, ExcludeFilter, RoundNo};
pub use error::ProtoError;
pub use event::{
    Action, Event, EventId, InterestKind, InterestReq, MissingDataInfo, PendingId, TimerTask,
};
pub use log::DiffLog;
pub use logic::Logic;
pub use packet::{AcceptAllVerifier, DataPacket, PacketVerifier, SignatureVerifier};
