//! # roundsync
//!
//! Round-based dataset synchronization over a named-data substrate.
//!
//! Every participant publishes an append-only sequence of numbered updates
//! under a stable per-session name; the group converges on the full
//! `{session name → latest seq-no}` map through per-round digests, a
//! chained cumulative digest, gap-fishing, and full-state recovery — under
//! message loss, reordering, restarts, and partitions.
//!
//! ## Layout
//!
//! - [`roundsync_core`] - names, TLV framing, digests, signing, state
//! - [`roundsync_proto`] - wire codecs, the round log, and the [`Logic`]
//!   state machine
//! - this crate - the async [`Node`] driver binding `Logic` to a [`Face`]
//!   transport
//!
//! ## Usage
//!
//! ```rust,no_run
//! use roundsync::{Node, NodeConfig, Keypair, Name, SyncConfig};
//!
//! async fn example(face: impl roundsync::Face + 'static) {
//!     let config = NodeConfig {
//!         sync_prefix: Name::from_uri("/example/sync"),
//!         user_prefix: Name::from_uri("/example/alice"),
//!         sync: SyncConfig::default(),
//!     };
//!     let (node, handle) = Node::new(
//!         config,
//!         Keypair::generate(),
//!         face,
//!         Box::new(|updates| {
//!             for info in updates {
//!                 println!("{} advanced to {}", info.session, info.high);
//!             }
//!         }),
//!     );
//!     tokio::spawn(node.run());
//!     handle.update_seq_no(1).unwrap();
//! }
//! ```

pub mod error;
pub mod face;
pub mod node;

pub use error::NodeError;
pub use face::{Face, FaceEvent};
pub use node::{Node, NodeConfig, NodeHandle, UpdateCallback};

pub use roundsync_core::{Keypair, Name, NameComponent, SeqNo, Sha256Digest, Signer, State};
pub use roundsync_proto::{
    Action, DataContent, DataPacket, Event, Logic, MissingDataInfo, RecoData, RoundNo, SyncConfig,
};
