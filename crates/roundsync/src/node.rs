//! The async node driver.
//!
//! `Node` binds a [`Logic`] state machine to a [`Face`]: one task owns
//! both, executes the state machine's actions, and feeds completions back.
//! Everything runs on a single task, so the protocol's cooperative
//! single-threaded model holds without any locking.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use roundsync_core::{Keypair, Name, SeqNo};
use roundsync_proto::{
    AcceptAllVerifier, Action, Event, EventId, Logic, MissingDataInfo, SyncConfig, TimerTask,
};

use crate::error::{NodeError, Result};
use crate::face::Face;

/// Node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// The sync group prefix shared by all participants.
    pub sync_prefix: Name,
    /// This node's stable user prefix.
    pub user_prefix: Name,
    /// Protocol tunables.
    pub sync: SyncConfig,
}

/// Callback receiving newly-learned sequence ranges.
pub type UpdateCallback = Box<dyn FnMut(Vec<MissingDataInfo>) + Send>;

enum NodeCommand {
    UpdateSeqNo(SeqNo),
    Shutdown,
}

/// Handle for talking to a running [`Node`].
#[derive(Clone)]
pub struct NodeHandle {
    commands: mpsc::UnboundedSender<NodeCommand>,
}

impl NodeHandle {
    /// Publish a new sequence number for the local session.
    pub fn update_seq_no(&self, seq_no: SeqNo) -> Result<()> {
        self.commands
            .send(NodeCommand::UpdateSeqNo(seq_no))
            .map_err(|_| NodeError::NotRunning)
    }

    /// Stop the node. All scheduled work is dropped.
    pub fn shutdown(&self) {
        let _ = self.commands.send(NodeCommand::Shutdown);
    }
}

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    id: EventId,
    task: TimerTask,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

enum Wake {
    Command(Option<NodeCommand>),
    Face(Result<crate::face::FaceEvent>),
    Timer,
}

/// One sync participant bound to a transport.
pub struct Node<F: Face> {
    config: NodeConfig,
    logic: Logic,
    face: F,
    timers: BinaryHeap<Reverse<TimerEntry>>,
    cancelled: HashSet<EventId>,
    timer_seq: u64,
    commands: mpsc::UnboundedReceiver<NodeCommand>,
    on_update: UpdateCallback,
}

impl<F: Face> Node<F> {
    /// Create a node and the handle used to drive it.
    pub fn new(
        config: NodeConfig,
        keypair: Keypair,
        face: F,
        on_update: UpdateCallback,
    ) -> (Self, NodeHandle) {
        let startup_timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let logic = Logic::new(
            config.sync_prefix.clone(),
            config.user_prefix.clone(),
            startup_timestamp,
            Box::new(keypair),
            Box::new(AcceptAllVerifier),
            config.sync.clone(),
            rand::random(),
        );
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        (
            Self {
                config,
                logic,
                face,
                timers: BinaryHeap::new(),
                cancelled: HashSet::new(),
                timer_seq: 0,
                commands: commands_rx,
                on_update,
            },
            NodeHandle {
                commands: commands_tx,
            },
        )
    }

    /// The local session name.
    pub fn session_name(&self) -> &Name {
        self.logic.session_name()
    }

    /// Run the node until its handle shuts it down or the face fails.
    pub async fn run(mut self) -> Result<()> {
        // Prefix registration failure is survivable: we can still fetch and
        // converge, we just cannot serve.
        let sync_prefix = self.config.sync_prefix.clone();
        if let Err(err) = self.face.register_prefix(&sync_prefix).await {
            warn!(prefix = %sync_prefix, %err, "sync prefix registration failed");
        }
        let reco_prefix = self.logic.reco_prefix().clone();
        if let Err(err) = self.face.register_prefix(&reco_prefix).await {
            warn!(prefix = %reco_prefix, %err, "recovery prefix registration failed");
        }

        let actions = self.logic.start();
        self.execute(actions).await?;

        loop {
            self.fire_due_timers().await?;

            let next_deadline = self.timers.peek().map(|Reverse(entry)| entry.deadline);
            let has_deadline = next_deadline.is_some();
            let sleep_until =
                next_deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            let wake = tokio::select! {
                command = self.commands.recv() => Wake::Command(command),
                event = self.face.next_event() => Wake::Face(event),
                _ = tokio::time::sleep_until(sleep_until), if has_deadline => Wake::Timer,
            };

            match wake {
                Wake::Command(Some(NodeCommand::UpdateSeqNo(seq_no))) => {
                    let actions = self.logic.update_seq_no(seq_no);
                    self.execute(actions).await?;
                }
                Wake::Command(Some(NodeCommand::Shutdown)) | Wake::Command(None) => {
                    debug!("node shutting down");
                    return Ok(());
                }
                Wake::Face(event) => {
                    let event: Event = event?.into();
                    let actions = self.logic.handle(event);
                    self.execute(actions).await?;
                }
                Wake::Timer => {
                    // Due timers fire at the top of the loop.
                }
            }
        }
    }

    async fn fire_due_timers(&mut self) -> Result<()> {
        loop {
            let now = Instant::now();
            let due = matches!(self.timers.peek(), Some(Reverse(entry)) if entry.deadline <= now);
            if !due {
                return Ok(());
            }
            let Reverse(entry) = self.timers.pop().expect("peeked entry present");
            if self.cancelled.remove(&entry.id) {
                continue;
            }
            let actions = self.logic.handle(Event::Timer {
                id: entry.id,
                task: entry.task,
            });
            self.execute(actions).await?;
        }
    }

    async fn execute(&mut self, actions: Vec<Action>) -> Result<()> {
        for action in actions {
            match action {
                Action::SetTimer { id, delay, task } => {
                    let seq = self.timer_seq;
                    self.timer_seq += 1;
                    self.timers.push(Reverse(TimerEntry {
                        deadline: Instant::now() + delay,
                        seq,
                        id,
                        task,
                    }));
                }
                Action::CancelTimer(id) => {
                    self.cancelled.insert(id);
                }
                Action::ExpressInterest(request) => {
                    self.face.express_interest(request).await?;
                }
                Action::CancelInterest(id) => {
                    self.face.cancel_interest(id).await?;
                }
                Action::PutData(packet) => {
                    self.face.put_data(packet).await?;
                }
                Action::DeliverUpdates(infos) => {
                    (self.on_update)(infos);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::FaceEvent;
    use async_trait::async_trait;
    use roundsync_core::NameComponent;
    use roundsync_proto::{DataContent, DataPacket, InterestKind, InterestReq, PendingId};

    #[derive(Debug)]
    enum Outbound {
        Interest(InterestReq),
        Cancel(PendingId),
        Data(DataPacket),
    }

    struct ChannelFace {
        events: mpsc::UnboundedReceiver<FaceEvent>,
        outbound: mpsc::UnboundedSender<Outbound>,
    }

    #[async_trait]
    impl Face for ChannelFace {
        async fn register_prefix(&mut self, _prefix: &Name) -> Result<()> {
            Ok(())
        }

        async fn express_interest(&mut self, request: InterestReq) -> Result<()> {
            self.outbound
                .send(Outbound::Interest(request))
                .map_err(|_| NodeError::FaceClosed)
        }

        async fn cancel_interest(&mut self, id: PendingId) -> Result<()> {
            self.outbound
                .send(Outbound::Cancel(id))
                .map_err(|_| NodeError::FaceClosed)
        }

        async fn put_data(&mut self, packet: DataPacket) -> Result<()> {
            self.outbound
                .send(Outbound::Data(packet))
                .map_err(|_| NodeError::FaceClosed)
        }

        async fn next_event(&mut self) -> Result<FaceEvent> {
            self.events.recv().await.ok_or(NodeError::FaceClosed)
        }
    }

    fn test_node() -> (
        NodeHandle,
        mpsc::UnboundedSender<FaceEvent>,
        mpsc::UnboundedReceiver<Outbound>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let face = ChannelFace {
            events: event_rx,
            outbound: outbound_tx,
        };
        let config = NodeConfig {
            sync_prefix: Name::from_uri("/sync/group"),
            user_prefix: Name::from_uri("/node/a"),
            sync: SyncConfig::default(),
        };
        let (node, handle) = Node::new(
            config,
            Keypair::from_seed(&[1; 32]),
            face,
            Box::new(|_| {}),
        );
        let join = tokio::spawn(node.run());
        (handle, event_tx, outbound_rx, join)
    }

    async fn next_matching(
        outbound: &mut mpsc::UnboundedReceiver<Outbound>,
        pred: impl Fn(&Outbound) -> bool,
    ) -> Outbound {
        for _ in 0..64 {
            let item = outbound.recv().await.expect("face still open");
            if pred(&item) {
                return item;
            }
        }
        panic!("expected outbound item never arrived");
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_fishes_and_publishes() {
        let (handle, event_tx, mut outbound, join) = test_node();

        // Startup fishes round 1.
        let first = next_matching(&mut outbound, |o| {
            matches!(
                o,
                Outbound::Interest(req)
                    if matches!(req.kind, InterestKind::Data { round: 1, .. })
            )
        })
        .await;
        let Outbound::Interest(own_interest) = first else {
            unreachable!()
        };

        // A peer asks for round 1; our production answers it and withdraws
        // our own request.
        let interest_name = Name::from_uri("/sync/group")
            .append(NameComponent::from_bytes(b"DATA".to_vec()))
            .append_number(1);
        event_tx
            .send(FaceEvent::Interest {
                name: interest_name.clone(),
            })
            .unwrap();
        handle.update_seq_no(1).unwrap();

        let published = next_matching(&mut outbound, |o| matches!(o, Outbound::Data(_))).await;
        let Outbound::Data(packet) = published else {
            unreachable!()
        };
        assert_eq!(packet.name(), &interest_name);
        let content = DataContent::decode(packet.content()).unwrap();
        assert!(content.state().is_some());

        let cancelled =
            next_matching(&mut outbound, |o| matches!(o, Outbound::Cancel(_))).await;
        let Outbound::Cancel(id) = cancelled else {
            unreachable!()
        };
        assert_eq!(id, own_interest.id);

        // The round advanced: a sync announcement and round-2 fishing.
        next_matching(&mut outbound, |o| {
            matches!(
                o,
                Outbound::Interest(req) if matches!(req.kind, InterestKind::Sync { round: 1 })
            )
        })
        .await;
        next_matching(&mut outbound, |o| {
            matches!(
                o,
                Outbound::Interest(req)
                    if matches!(req.kind, InterestKind::Data { round: 2, .. })
            )
        })
        .await;

        handle.shutdown();
        join.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_the_node() {
        let (handle, _event_tx, mut outbound, join) = test_node();
        next_matching(&mut outbound, |o| matches!(o, Outbound::Interest(_))).await;
        handle.shutdown();
        join.await.unwrap().unwrap();
        assert!(handle.update_seq_no(2).is_err());
    }
}
