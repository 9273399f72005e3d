//! Transport abstraction for the node driver.
//!
//! A [`Face`] connects one node to the named-data substrate. It carries
//! outgoing interests and data, and delivers inbound interests, replies,
//! and request timeouts. Implementations own the pending-request table and
//! its lifetimes; the node only sees the completions.

use async_trait::async_trait;

use roundsync_core::Name;
use roundsync_proto::{DataPacket, Event, InterestKind, InterestReq, PendingId};

use crate::error::Result;

/// An inbound transport completion.
#[derive(Debug, Clone)]
pub enum FaceEvent {
    /// An interest arrived on a registered prefix.
    Interest {
        /// The interest name.
        name: Name,
    },
    /// A reply to one of our requests arrived.
    Reply {
        /// What the request was for.
        kind: InterestKind,
        /// The signed response.
        packet: DataPacket,
    },
    /// One of our requests expired unanswered.
    Timeout {
        /// What the request was for.
        kind: InterestKind,
    },
}

impl From<FaceEvent> for Event {
    fn from(event: FaceEvent) -> Self {
        match event {
            FaceEvent::Interest { name } => Event::Interest { name },
            FaceEvent::Reply { kind, packet } => Event::Reply { kind, packet },
            FaceEvent::Timeout { kind } => Event::Timeout { kind },
        }
    }
}

/// Connection to the named-data substrate.
#[async_trait]
pub trait Face: Send {
    /// Ask the substrate to deliver interests under `prefix`.
    async fn register_prefix(&mut self, prefix: &Name) -> Result<()>;

    /// Put a request on the wire. Its reply or timeout comes back through
    /// [`Face::next_event`] carrying the request's kind.
    async fn express_interest(&mut self, request: InterestReq) -> Result<()>;

    /// Withdraw an in-flight request.
    async fn cancel_interest(&mut self, id: PendingId) -> Result<()>;

    /// Publish a signed data packet, serving pending peers and caches.
    async fn put_data(&mut self, packet: DataPacket) -> Result<()>;

    /// The next inbound completion. Pends until one is available.
    async fn next_event(&mut self) -> Result<FaceEvent>;
}
