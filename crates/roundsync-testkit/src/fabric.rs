//! Deterministic in-process named-data fabric.
//!
//! `SimFabric` runs any number of [`Logic`] nodes against a virtual clock:
//! a single discrete-event queue carries timers, interest forwarding,
//! reply delivery, and request expiry, ordered by (time, insertion). It
//! models the substrate the protocol assumes — multicast interest
//! forwarding, a pending-request table with lifetimes, a content store
//! honoring freshness and exclude filters — plus per-node partition
//! injection for fault tests. Same inputs, same run, every time.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::Duration;

use roundsync_core::{Keypair, Name, SeqNo};
use roundsync_proto::{
    Action, DataPacket, Event, EventId, ExcludeFilter, InterestKind, Logic, MissingDataInfo,
    PendingId, SignatureVerifier, SyncConfig, TimerTask,
};

/// Fabric-wide knobs.
#[derive(Debug, Clone)]
pub struct FabricConfig {
    /// One-way delivery latency for interests and data.
    pub latency: Duration,
    /// Base seed for the nodes' jitter RNGs.
    pub seed: u64,
    /// Protocol configuration handed to every node.
    pub sync: SyncConfig,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(10),
            seed: 0,
            sync: SyncConfig::default(),
        }
    }
}

struct Scheduled {
    at: Duration,
    seq: u64,
    item: Item,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.at.cmp(&other.at).then(self.seq.cmp(&other.seq))
    }
}

enum Item {
    Timer {
        node: usize,
        id: EventId,
        task: TimerTask,
    },
    Interest {
        node: usize,
        name: Name,
    },
    Reply {
        node: usize,
        pending: PendingId,
        packet: DataPacket,
    },
    Expiry {
        node: usize,
        pending: PendingId,
    },
}

struct PendingInterest {
    name: Name,
    exclude: ExcludeFilter,
    kind: InterestKind,
}

struct StoredData {
    packet: DataPacket,
    full_name: Name,
    stored_at: Duration,
}

struct SimNode {
    logic: Logic,
    partitioned: bool,
    cancelled_timers: HashSet<EventId>,
    pending: HashMap<PendingId, PendingInterest>,
    updates: Vec<MissingDataInfo>,
}

/// A simulated sync group.
pub struct SimFabric {
    sync_prefix: Name,
    config: FabricConfig,
    now: Duration,
    next_seq: u64,
    queue: BinaryHeap<Reverse<Scheduled>>,
    nodes: Vec<SimNode>,
    store: Vec<StoredData>,
}

impl SimFabric {
    /// Create an empty fabric for the given sync group prefix.
    pub fn new(sync_prefix: &str) -> Self {
        Self::with_config(sync_prefix, FabricConfig::default())
    }

    /// Create an empty fabric with explicit knobs.
    pub fn with_config(sync_prefix: &str, config: FabricConfig) -> Self {
        Self {
            sync_prefix: Name::from_uri(sync_prefix),
            config,
            now: Duration::ZERO,
            next_seq: 0,
            queue: BinaryHeap::new(),
            nodes: Vec::new(),
            store: Vec::new(),
        }
    }

    /// Add a node under `user_prefix` and start it. Returns its index.
    ///
    /// Each node gets a keypair, a startup timestamp, and a jitter seed
    /// derived from its index, so runs are reproducible.
    pub fn add_node(&mut self, user_prefix: &str) -> usize {
        let index = self.nodes.len();
        let mut seed = [0u8; 32];
        seed[0] = index as u8 + 1;
        let keypair = Keypair::from_seed(&seed);
        let mut logic = Logic::new(
            self.sync_prefix.clone(),
            Name::from_uri(user_prefix),
            1_700_000_000_000 + index as u64,
            Box::new(keypair),
            Box::new(SignatureVerifier),
            self.config.sync.clone(),
            self.config.seed.wrapping_add(index as u64),
        );
        let actions = logic.start();
        self.nodes.push(SimNode {
            logic,
            partitioned: false,
            cancelled_timers: HashSet::new(),
            pending: HashMap::new(),
            updates: Vec::new(),
        });
        self.apply_actions(index, actions);
        index
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Run every queued event with a deadline at or before `deadline`.
    pub fn run_until(&mut self, deadline: Duration) {
        loop {
            let due = match self.queue.peek() {
                Some(Reverse(next)) if next.at <= deadline => true,
                _ => false,
            };
            if !due {
                break;
            }
            let Reverse(scheduled) = self.queue.pop().expect("peeked entry present");
            self.now = scheduled.at;
            self.dispatch(scheduled.item);
        }
        self.now = deadline;
    }

    /// Run the fabric forward by `duration`.
    pub fn run_for(&mut self, duration: Duration) {
        let deadline = self.now + duration;
        self.run_until(deadline);
    }

    /// Publish a new seq-no at `node`, as the application would.
    pub fn update_seq_no(&mut self, node: usize, seq_no: SeqNo) {
        let actions = self.nodes[node].logic.update_seq_no(seq_no);
        self.apply_actions(node, actions);
    }

    /// Attach or detach a node from the network. Timers keep firing while
    /// partitioned; all deliveries to and from the node are dropped.
    pub fn set_partitioned(&mut self, node: usize, partitioned: bool) {
        self.nodes[node].partitioned = partitioned;
    }

    /// The node's state machine, for assertions.
    pub fn logic(&self, node: usize) -> &Logic {
        &self.nodes[node].logic
    }

    /// Drain the update batches delivered to the node's application.
    pub fn take_updates(&mut self, node: usize) -> Vec<MissingDataInfo> {
        std::mem::take(&mut self.nodes[node].updates)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the fabric has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ─── Event machinery ─────────────────────────────────────────────────

    fn push(&mut self, at: Duration, item: Item) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Scheduled { at, seq, item }));
    }

    fn dispatch(&mut self, item: Item) {
        match item {
            Item::Timer { node, id, task } => {
                if self.nodes[node].cancelled_timers.remove(&id) {
                    return;
                }
                let actions = self.nodes[node].logic.handle(Event::Timer { id, task });
                self.apply_actions(node, actions);
            }
            Item::Interest { node, name } => {
                if self.nodes[node].partitioned {
                    return;
                }
                let actions = self.nodes[node].logic.handle(Event::Interest { name });
                self.apply_actions(node, actions);
            }
            Item::Reply {
                node,
                pending,
                packet,
            } => {
                if self.nodes[node].partitioned {
                    return;
                }
                // Consumed on first delivery; a withdrawn or already
                // satisfied request drops the reply.
                let Some(interest) = self.nodes[node].pending.remove(&pending) else {
                    return;
                };
                let actions = self.nodes[node].logic.handle(Event::Reply {
                    kind: interest.kind,
                    packet,
                });
                self.apply_actions(node, actions);
            }
            Item::Expiry { node, pending } => {
                let Some(interest) = self.nodes[node].pending.remove(&pending) else {
                    return;
                };
                let actions = self.nodes[node].logic.handle(Event::Timeout {
                    kind: interest.kind,
                });
                self.apply_actions(node, actions);
            }
        }
    }

    fn apply_actions(&mut self, node: usize, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::SetTimer { id, delay, task } => {
                    self.push(self.now + delay, Item::Timer { node, id, task });
                }
                Action::CancelTimer(id) => {
                    self.nodes[node].cancelled_timers.insert(id);
                }
                Action::ExpressInterest(req) => {
                    self.express_interest(node, req);
                }
                Action::CancelInterest(id) => {
                    self.nodes[node].pending.remove(&id);
                }
                Action::PutData(packet) => {
                    self.put_data(node, packet);
                }
                Action::DeliverUpdates(infos) => {
                    self.nodes[node].updates.extend(infos);
                }
            }
        }
    }

    fn express_interest(&mut self, node: usize, req: roundsync_proto::InterestReq) {
        let expiry = self.now + req.lifetime;
        let satisfied_from_store = if self.nodes[node].partitioned {
            // Detached: the request sits in the table until it expires.
            None
        } else {
            self.store_lookup(&req.name, &req.exclude, req.must_be_fresh)
        };
        if let Some(packet) = satisfied_from_store {
            self.push(
                self.now + self.config.latency,
                Item::Reply {
                    node,
                    pending: req.id,
                    packet,
                },
            );
        } else if !self.nodes[node].partitioned {
            for other in 0..self.nodes.len() {
                if other != node && !self.nodes[other].partitioned {
                    self.push(
                        self.now + self.config.latency,
                        Item::Interest {
                            node: other,
                            name: req.name.clone(),
                        },
                    );
                }
            }
        }
        self.nodes[node].pending.insert(
            req.id,
            PendingInterest {
                name: req.name,
                exclude: req.exclude,
                kind: req.kind,
            },
        );
        self.push(
            expiry,
            Item::Expiry {
                node,
                pending: req.id,
            },
        );
    }

    fn put_data(&mut self, node: usize, packet: DataPacket) {
        if self.nodes[node].partitioned {
            return;
        }
        let full_name = packet.full_name();
        if !self.store.iter().any(|stored| stored.full_name == full_name) {
            self.store.push(StoredData {
                packet: packet.clone(),
                full_name: full_name.clone(),
                stored_at: self.now,
            });
        }

        // Satisfy matching pending requests everywhere. Consumption
        // happens at delivery, so a cancellation still in this batch wins.
        let mut deliveries = Vec::new();
        for (index, sim_node) in self.nodes.iter().enumerate() {
            if sim_node.partitioned {
                continue;
            }
            for (&pending, interest) in &sim_node.pending {
                if Self::matches(interest, &full_name) {
                    deliveries.push((index, pending));
                }
            }
        }
        for (index, pending) in deliveries {
            self.push(
                self.now + self.config.latency,
                Item::Reply {
                    node: index,
                    pending,
                    packet: packet.clone(),
                },
            );
        }
    }

    fn matches(interest: &PendingInterest, full_name: &Name) -> bool {
        if !full_name.starts_with(&interest.name) {
            return false;
        }
        match full_name.get(interest.name.len() as isize) {
            Some(next_component) => !interest.exclude.contains(next_component),
            None => true,
        }
    }

    fn store_lookup(
        &self,
        name: &Name,
        exclude: &ExcludeFilter,
        must_be_fresh: bool,
    ) -> Option<DataPacket> {
        for stored in &self.store {
            if !stored.full_name.starts_with(name) {
                continue;
            }
            if let Some(next_component) = stored.full_name.get(name.len() as isize) {
                if exclude.contains(next_component) {
                    continue;
                }
            }
            if must_be_fresh && stored.stored_at + stored.packet.freshness() <= self.now {
                continue;
            }
            return Some(stored.packet.clone());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_nodes_exchange_one_update() {
        let mut fabric = SimFabric::new("/sync/test");
        let a = fabric.add_node("/node/a");
        let b = fabric.add_node("/node/b");
        fabric.run_for(Duration::from_millis(50));

        fabric.update_seq_no(a, 1);
        fabric.run_for(Duration::from_millis(200));

        let a_session = fabric.logic(a).session_name().clone();
        assert_eq!(fabric.logic(b).state().get_seq_no(&a_session), Some(1));
        assert_eq!(
            fabric.logic(a).root_digest(),
            fabric.logic(b).root_digest()
        );
        let updates = fabric.take_updates(b);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].session, a_session);
        assert_eq!((updates[0].low, updates[0].high), (1, 1));
    }

    #[test]
    fn test_partitioned_node_receives_nothing() {
        let mut fabric = SimFabric::new("/sync/test");
        let a = fabric.add_node("/node/a");
        let b = fabric.add_node("/node/b");
        fabric.set_partitioned(b, true);

        fabric.update_seq_no(a, 1);
        fabric.run_for(Duration::from_millis(500));

        let a_session = fabric.logic(a).session_name().clone();
        assert_eq!(fabric.logic(b).state().get_seq_no(&a_session), None);
    }

    #[test]
    fn test_runs_are_reproducible() {
        let run = || {
            let mut fabric = SimFabric::new("/sync/test");
            let a = fabric.add_node("/node/a");
            let b = fabric.add_node("/node/b");
            fabric.update_seq_no(a, 1);
            fabric.run_for(Duration::from_millis(300));
            fabric.update_seq_no(b, 1);
            fabric.run_for(Duration::from_millis(2000));
            (
                fabric.logic(a).current_round(),
                fabric.logic(a).root_digest(),
                fabric.logic(b).current_round(),
                fabric.logic(b).root_digest(),
            )
        };
        assert_eq!(run(), run());
    }
}
