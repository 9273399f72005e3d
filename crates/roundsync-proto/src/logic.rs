//! The sync state machine.
//!
//! `Logic` drives one node's participation in the sync group. It is
//! synchronous and deterministic: the host delivers [`Event`]s (arriving
//! interests and replies, request timeouts, timer firings) and executes the
//! returned [`Action`]s. All protocol decisions live here; all I/O lives in
//! the host.
//!
//! The protocol in one breath: every production (including cumulative-only
//! announcements) consumes one round. Nodes fish rounds they suspect they
//! are missing with data interests, announce round digests with sync
//! interests, periodically promote old rounds into a chained cumulative
//! digest, and fall back to full-state recovery when cumulative digests
//! disagree or a round jump is too wide to fish.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

use roundsync_core::{
    Name, NameComponent, SeqNo, Sha256Digest, Signer, State, UpdateResult,
};

use crate::config::{SyncConfig, CUMULATIVE_ONLY_SEQ};
use crate::content::{ContentType, DataContent, RecoData};
use crate::diff::{CumulativeInfo, DiffState, RoundNo};
use crate::event::{
    Action, Event, EventId, InterestKind, InterestReq, MissingDataInfo, PendingId, TimerTask,
};
use crate::log::DiffLog;
use crate::packet::{DataPacket, PacketVerifier};

const DATA_COMPONENT: &[u8] = b"DATA";
const SYNC_COMPONENT: &[u8] = b"SYNC";
const RECO_COMPONENT: &[u8] = b"RECO";

/// The sync state machine for one node.
pub struct Logic {
    config: SyncConfig,
    sync_prefix: Name,
    user_prefix: Name,
    session_name: Name,
    reco_prefix: Name,
    seq_no: SeqNo,

    state: State,
    // Frozen view as of the stable round; cumulative digests are digests of
    // this state folded forward.
    old_state: State,
    log: DiffLog,

    // The greatest round the node is actively fishing in.
    current_round: RoundNo,
    // Candidate round awaiting stabilization.
    stabilizing_round: RoundNo,
    // Highest round whose cumulative digest is committed; 0 when none.
    stable_round: RoundNo,
    // Highest round a recovery snapshot was applied at; 0 when none.
    last_recovery_round: RoundNo,
    // Set when a forward jump was too wide to fish; the next incoming
    // cumulative triggers recovery.
    recovery_desired: bool,

    pending_data_interest: Option<Name>,
    outstanding_data_interest_name: Option<Name>,
    outstanding_data_interest_id: Option<PendingId>,
    pending_recovery_prefixes: BTreeSet<Name>,
    // Scheduled cumulative-only emissions, keyed by the digest they would
    // announce, for suppression when a peer announces the same one.
    cumulative_only_timers: HashMap<Sha256Digest, EventId>,

    reexpress_data_timer: Option<EventId>,
    stabilize_timer: Option<EventId>,
    data_interest_timeouts: u32,
    reco_interest_timeouts: u32,

    next_event_id: u64,
    next_pending_id: u64,
    rng: StdRng,
    signer: Box<dyn Signer + Send>,
    verifier: Box<dyn PacketVerifier + Send>,
    actions: Vec<Action>,
}

impl Logic {
    /// Create a node's state machine.
    ///
    /// `startup_timestamp` disambiguates restarts of the same user prefix;
    /// any per-process-unique value works. `jitter_seed` seeds the timing
    /// jitter so simulated runs are reproducible.
    pub fn new(
        sync_prefix: Name,
        user_prefix: Name,
        startup_timestamp: u64,
        signer: Box<dyn Signer + Send>,
        verifier: Box<dyn PacketVerifier + Send>,
        config: SyncConfig,
        jitter_seed: u64,
    ) -> Self {
        let session_name = user_prefix.clone().append_number(startup_timestamp);
        let reco_prefix = user_prefix
            .clone()
            .append(NameComponent::from_bytes(RECO_COMPONENT));
        Self {
            config,
            sync_prefix,
            user_prefix,
            session_name,
            reco_prefix,
            seq_no: 0,
            state: State::new(),
            old_state: State::new(),
            log: DiffLog::new(),
            current_round: 1,
            stabilizing_round: 1,
            stable_round: 0,
            last_recovery_round: 0,
            recovery_desired: false,
            pending_data_interest: None,
            outstanding_data_interest_name: None,
            outstanding_data_interest_id: None,
            pending_recovery_prefixes: BTreeSet::new(),
            cumulative_only_timers: HashMap::new(),
            reexpress_data_timer: None,
            stabilize_timer: None,
            data_interest_timeouts: 0,
            reco_interest_timeouts: 0,
            next_event_id: 1,
            next_pending_id: 1,
            rng: StdRng::seed_from_u64(jitter_seed),
            signer,
            verifier,
            actions: Vec::new(),
        }
    }

    /// Kick off fishing in round 1 and the stabilization cycle. Call once,
    /// after registering the sync and recovery prefixes.
    pub fn start(&mut self) -> Vec<Action> {
        let fish = self.schedule(
            Duration::ZERO,
            TimerTask::SendDataInterest {
                round: self.current_round,
                retries: 1,
            },
        );
        self.reexpress_data_timer = Some(fish);
        let stabilize = self.schedule(self.config.stabilize_delay, TimerTask::Stabilize);
        self.stabilize_timer = Some(stabilize);
        self.take_actions()
    }

    /// Publish a new sequence number for the local session.
    ///
    /// Values not exceeding the current one (and the reserved 0) are
    /// ignored. A successful update consumes the current round and advances
    /// to the next one.
    pub fn update_seq_no(&mut self, seq_no: SeqNo) -> Vec<Action> {
        if seq_no == 0 || seq_no <= self.seq_no {
            return Vec::new();
        }
        self.seq_no = seq_no;
        let session_name = self.session_name.clone();
        self.state.update(&session_name, seq_no);

        let mut commit = DiffState::new();
        commit.update(&session_name, seq_no);
        // Piggy-back the latest committed cumulative digest on the data.
        if self.stable_round != 0 {
            if let Some(digest) = self
                .log
                .get(self.stable_round)
                .and_then(|entry| entry.cumulative_digest())
            {
                commit.set_cumulative_info(Some(CumulativeInfo {
                    round: self.stable_round,
                    digest,
                }));
            }
        }
        self.update_diff_log(commit.clone(), self.current_round);

        if let Some(pending) = self.pending_data_interest.clone() {
            if data_interest_round(&pending) == Some(self.current_round) {
                debug!(name = %pending, "answering pending data interest with own production");
                self.send_data(&pending, &commit);
                self.pending_data_interest = None;
            }
        }

        // Announce the round digest so everybody learns we produced.
        self.schedule(
            Duration::ZERO,
            TimerTask::SendSyncInterest {
                round: self.current_round,
            },
        );
        let next = self.current_round + 1;
        self.move_to_new_current_round(next);
        self.take_actions()
    }

    /// Deliver one event and collect the resulting actions.
    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::Interest { name } => self.dispatch_interest(&name),
            Event::Reply { kind, packet } => self.dispatch_reply(kind, packet),
            Event::Timeout { kind } => match kind {
                InterestKind::Data { round, retries } => {
                    self.on_data_interest_timeout(round, retries)
                }
                InterestKind::Reco { peer } => self.on_reco_interest_timeout(peer),
                // Sync interests have no useful reply; their expiry means
                // nothing either.
                InterestKind::Sync { .. } => {}
            },
            Event::Timer { id: _, task } => match task {
                TimerTask::SendDataInterest { round, retries } => {
                    self.send_data_interest(round, retries)
                }
                TimerTask::SendSyncInterest { round } => self.send_sync_interest(round),
                TimerTask::Stabilize => self.set_stable_state(),
                TimerTask::RetryCheckRecovery {
                    peer,
                    round,
                    digest,
                } => self.check_recovery(peer, round, digest),
                TimerTask::ProduceCumulativeOnly { round, digest } => {
                    self.produce_cumulative_only(round, digest)
                }
                TimerTask::SendRecoInterest { peer } => self.send_reco_interest(&peer),
            },
        }
        self.take_actions()
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    /// The local session name (user prefix plus startup timestamp).
    pub fn session_name(&self) -> &Name {
        &self.session_name
    }

    /// The user prefix this node answers recovery interests under.
    pub fn user_prefix(&self) -> &Name {
        &self.user_prefix
    }

    /// The recovery prefix (`<user_prefix>/RECO`).
    pub fn reco_prefix(&self) -> &Name {
        &self.reco_prefix
    }

    /// The local session's latest sequence number.
    pub fn seq_no(&self) -> SeqNo {
        self.seq_no
    }

    /// The aggregate state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Root digest of the aggregate state.
    pub fn root_digest(&self) -> Sha256Digest {
        self.state.get_digest()
    }

    /// The differential round log.
    pub fn log(&self) -> &DiffLog {
        &self.log
    }

    /// The greatest round being fished.
    pub fn current_round(&self) -> RoundNo {
        self.current_round
    }

    /// Highest round with a committed cumulative digest (0 when none).
    pub fn stable_round(&self) -> RoundNo {
        self.stable_round
    }

    /// Candidate round awaiting stabilization.
    pub fn stabilizing_round(&self) -> RoundNo {
        self.stabilizing_round
    }

    /// Highest round a recovery snapshot was applied at (0 when none).
    pub fn last_recovery_round(&self) -> RoundNo {
        self.last_recovery_round
    }

    /// Whether the node is waiting for a cumulative to trigger recovery.
    pub fn recovery_desired(&self) -> bool {
        self.recovery_desired
    }

    /// Id of the node's own outstanding current-round data interest, if it
    /// has not been self-satisfied.
    pub fn outstanding_data_interest(&self) -> Option<PendingId> {
        self.outstanding_data_interest_id
    }

    // ─── Interest reception ──────────────────────────────────────────────

    fn dispatch_interest(&mut self, name: &Name) {
        if name.starts_with(&self.sync_prefix) {
            if name.get(-2).map(NameComponent::as_bytes) == Some(DATA_COMPONENT) {
                self.process_data_interest(name);
            } else if name.get(-3).map(NameComponent::as_bytes) == Some(SYNC_COMPONENT) {
                self.process_sync_interest(name);
            } else {
                warn!(%name, "interest under sync prefix not understood");
            }
        } else if name.get(-1).map(NameComponent::as_bytes) == Some(RECO_COMPONENT) {
            self.process_reco_interest(name);
        } else {
            warn!(%name, "interest name not understood");
        }
    }

    fn process_data_interest(&mut self, name: &Name) {
        let Some(round) = data_interest_round(name) else {
            warn!(%name, "data interest without a round number");
            return;
        };
        if round >= self.current_round {
            // Latest wins; answered when we next produce.
            self.pending_data_interest = Some(name.clone());
        }
        if round > self.current_round {
            // Move to the latest known round as soon as we learn it exists.
            self.move_to_new_current_round(round);
        } else if round < self.current_round {
            // Only our own session's contribution is served; other
            // producers' data propagates from them and from caches.
            let reply = self
                .log
                .get(round)
                .and_then(|entry| entry.get_state_from(&self.session_name));
            if let Some((diff, cumulative_only)) = reply {
                if cumulative_only {
                    let info = diff
                        .cumulative_info()
                        .expect("cumulative-only record lost its cumulative info");
                    self.send_cumulative_only(name, info.round, info.digest);
                } else {
                    self.send_data(name, &diff);
                }
            }
        }
    }

    fn process_sync_interest(&mut self, name: &Name) {
        let (Some(round), Some(digest)) = (
            name.get(-2).and_then(NameComponent::to_number),
            name.get(-1)
                .and_then(|c| Sha256Digest::try_from(c.as_bytes()).ok()),
        ) else {
            warn!(%name, "sync interest without round and digest");
            return;
        };
        if round >= self.current_round {
            // Hearing a neighbour's sync for a round implies that round has
            // been fully exchanged; move past it.
            self.move_to_new_current_round(round + 1);
        } else if round <= self.last_recovery_round {
            // Rounds crossed by a recovery carry no trustworthy digest.
            debug!(round, last_recovery = self.last_recovery_round, "ignoring pre-recovery sync");
        } else {
            self.check_round_digests(round, &digest);
        }
    }

    fn check_round_digests(&mut self, round: RoundNo, digest: &Sha256Digest) -> bool {
        match self.log.get(round).and_then(|entry| entry.round_digest()) {
            Some(mine) if mine == *digest => true,
            Some(_) => {
                // Disagreement: we may be missing something, so fish, and
                // announce our own digest once the fishing has settled.
                debug!(round, "round digest mismatch, fishing");
                self.schedule(
                    Duration::ZERO,
                    TimerTask::SendDataInterest { round, retries: 1 },
                );
                let timer = self.schedule(
                    self.config.round_digest_delay,
                    TimerTask::SendSyncInterest { round },
                );
                if let Some(previous) = self
                    .log
                    .get_mut(round)
                    .and_then(|entry| entry.replace_sync_timer(timer))
                {
                    self.cancel_timer(previous);
                }
                false
            }
            None => {
                debug!(round, "no entry for announced round, fishing");
                self.schedule(
                    Duration::ZERO,
                    TimerTask::SendDataInterest { round, retries: 1 },
                );
                false
            }
        }
    }

    fn process_reco_interest(&mut self, name: &Name) {
        debug!(%name, "answering recovery interest with full state");
        let snapshot = RecoData::new(self.current_round - 1, self.state.clone());
        let packet = DataPacket::sign(
            name.clone(),
            self.config.data_freshness,
            snapshot.encode().into(),
            self.signer.as_ref(),
        );
        self.actions.push(Action::PutData(packet));
    }

    // ─── Reply reception ─────────────────────────────────────────────────

    fn dispatch_reply(&mut self, kind: InterestKind, packet: DataPacket) {
        if let Err(err) = self.verifier.verify(&packet) {
            debug!(name = %packet.name(), %err, "dropping unverifiable packet");
            return;
        }
        match kind {
            InterestKind::Data { .. } => self.process_data(&packet),
            InterestKind::Reco { .. } => self.process_reco_data(&packet),
            // Sync interests have no reply in this protocol.
            InterestKind::Sync { .. } => {}
        }
    }

    fn process_data(&mut self, packet: &DataPacket) {
        let full_name = packet.full_name();
        let Some(round) = full_name.get(-2).and_then(NameComponent::to_number) else {
            warn!(name = %full_name, "data reply without a round number");
            return;
        };
        if round <= self.stable_round {
            // History at and below the stable round is frozen; a genuine
            // divergence here surfaces later as a recovery.
            debug!(round, stable = self.stable_round, "dropping data for stabilized round");
            return;
        }
        let content = match DataContent::decode(packet.content()) {
            Ok(content) => content,
            Err(err) => {
                debug!(name = %full_name, %err, "dropping undecodable data");
                return;
            }
        };

        let mut commit = self.log.take(round).unwrap_or_default();
        commit.exclude_mut().insert(packet.implicit_digest());

        let data_type = content.data_type();
        if matches!(
            data_type,
            ContentType::CumulativeOnly | ContentType::DataAndCumulative
        ) {
            let digest = content
                .cumulative_digest()
                .expect("cumulative variants always carry a digest");
            self.check_recovery(content.user_prefix().clone(), content.round_no(), digest);
        }
        if data_type == ContentType::CumulativeOnly {
            commit.update(content.user_prefix(), CUMULATIVE_ONLY_SEQ);
        }

        if let Some(reply_state) = content.state() {
            let mut newly_available = Vec::new();
            for leaf in reply_state.leaves() {
                let session = leaf.session_name();
                let seq = leaf.seq_no();
                if seq == CUMULATIVE_ONLY_SEQ {
                    // Sentinel records pass into the round log but never
                    // into the aggregate state or the callback.
                    commit.update(session, seq);
                    continue;
                }
                // Between a recovery and the next stabilization the frozen
                // view must absorb old-round data too.
                if round <= self.last_recovery_round && self.stable_round == 0 {
                    self.old_state.update(session, seq);
                }
                match self.state.update(session, seq) {
                    UpdateResult::Inserted => newly_available.push(MissingDataInfo {
                        session: session.clone(),
                        low: 1,
                        high: seq,
                    }),
                    UpdateResult::Updated { old_seq } => newly_available.push(MissingDataInfo {
                        session: session.clone(),
                        low: old_seq + 1,
                        high: seq,
                    }),
                    UpdateResult::Unchanged => {}
                }
                // Known or not, the round log entry records it.
                commit.update(session, seq);
            }
            if !newly_available.is_empty() {
                self.actions.push(Action::DeliverUpdates(newly_available));
            }
        }

        if round == self.current_round {
            let next = self.current_round + 1;
            self.move_to_new_current_round(next);
        }
        self.update_diff_log(commit, round);

        // New data at or below the stabilizing round invalidates the
        // pending stabilization pass.
        if round <= self.stabilizing_round {
            let prev = self.stabilize_timer.take();
            self.cancel_timer_opt(prev);
            let timer = self.schedule(self.config.stabilize_delay, TimerTask::Stabilize);
            self.stabilize_timer = Some(timer);
        }

        // Announce the round digest later, so it covers everything fished
        // in this round.
        let timer = self.schedule(
            self.config.round_digest_delay,
            TimerTask::SendSyncInterest { round },
        );
        if let Some(previous) = self
            .log
            .get_mut(round)
            .and_then(|entry| entry.replace_sync_timer(timer))
        {
            self.cancel_timer(previous);
        }
    }

    fn process_reco_data(&mut self, packet: &DataPacket) {
        let full_name = packet.full_name();
        let peer_prefix = full_name.prefix(-2);
        self.pending_recovery_prefixes.remove(&peer_prefix);

        let snapshot = match RecoData::decode(packet.content()) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                debug!(name = %full_name, %err, "dropping undecodable recovery data");
                return;
            }
        };

        let mut newly_available = Vec::new();
        for leaf in snapshot.state().leaves() {
            if leaf.seq_no() == CUMULATIVE_ONLY_SEQ {
                continue;
            }
            match self.state.update(leaf.session_name(), leaf.seq_no()) {
                UpdateResult::Inserted => newly_available.push(MissingDataInfo {
                    session: leaf.session_name().clone(),
                    low: 1,
                    high: leaf.seq_no(),
                }),
                UpdateResult::Updated { old_seq } => newly_available.push(MissingDataInfo {
                    session: leaf.session_name().clone(),
                    low: old_seq + 1,
                    high: leaf.seq_no(),
                }),
                UpdateResult::Unchanged => {}
            }
        }
        if !newly_available.is_empty() {
            self.actions.push(Action::DeliverUpdates(newly_available));
        }

        let snapshot_round = snapshot.round_no();
        if snapshot_round >= self.current_round {
            // The snapshot is the newest production we know of.
            self.last_recovery_round = snapshot_round;
            self.move_to_new_current_round_after_recovery(snapshot_round + 1);
        } else {
            self.last_recovery_round = self.current_round - 1;
        }
        debug!(last_recovery = self.last_recovery_round, "applied recovery snapshot");

        // Refish the recent unstable rounds; their entries may be partial.
        let first = if self.current_round <= self.config.back_unstable_rounds {
            1
        } else {
            self.current_round - self.config.back_unstable_rounds
        };
        for round in first..self.current_round {
            self.schedule(
                Duration::ZERO,
                TimerTask::SendDataInterest { round, retries: 1 },
            );
        }

        // The snapshot invalidates the stabilization in progress; restart
        // it from the recovered round with the recovered state as the
        // frozen view.
        self.stabilizing_round = self.last_recovery_round;
        self.stable_round = 0;
        self.old_state = self.state.clone();
        let prev = self.stabilize_timer.take();
        self.cancel_timer_opt(prev);
        let timer = self.schedule(self.config.stabilize_delay, TimerTask::Stabilize);
        self.stabilize_timer = Some(timer);
    }

    // ─── Recovery decision ───────────────────────────────────────────────

    fn check_recovery(&mut self, peer_session: Name, round: RoundNo, digest: Sha256Digest) {
        // A peer announcing a cumulative equal to one we have queued makes
        // our announcement redundant.
        if let Some(timer) = self.cumulative_only_timers.remove(&digest) {
            debug!(round, "equal cumulative announced by peer, suppressing own emission");
            self.cancel_timer(timer);
            return;
        }

        let mut my_digest = None;
        let mut do_recovery = true;
        if round < self.last_recovery_round || self.stable_round == 0 {
            // No committed cumulative of our own to compare against.
            do_recovery = false;
        } else if round <= self.stable_round {
            if let Some(mine) = self.log.get(round).and_then(|entry| entry.cumulative_digest()) {
                my_digest = Some(mine);
                if mine == digest {
                    do_recovery = false;
                }
            }
        } else if !self.recovery_desired {
            // The announced round has not stabilized here yet; look again
            // once it has had the chance to.
            do_recovery = false;
            self.schedule(
                self.config.retry_check_recovery_delay,
                TimerTask::RetryCheckRecovery {
                    peer: peer_session.clone(),
                    round,
                    digest,
                },
            );
        }

        if do_recovery {
            let peer_prefix = peer_session.prefix(-1);
            if !self.pending_recovery_prefixes.contains(&peer_prefix) {
                warn!(peer = %peer_prefix, round, "cumulative digests diverge, recovering");
                self.schedule(
                    Duration::ZERO,
                    TimerTask::SendRecoInterest {
                        peer: peer_prefix.clone(),
                    },
                );
                self.pending_recovery_prefixes.insert(peer_prefix);
            }
            self.recovery_desired = false;

            // If we committed our own cumulative for that round, announce
            // it (jittered) so the rest of the group can compare too.
            if let Some(mine) = my_digest {
                if !self.cumulative_only_timers.contains_key(&mine) {
                    let delay = self.cumulative_only_jitter();
                    let timer = self.schedule(
                        delay,
                        TimerTask::ProduceCumulativeOnly {
                            round,
                            digest: mine,
                        },
                    );
                    self.cumulative_only_timers.insert(mine, timer);
                }
            }
        }
    }

    // ─── Round progression ───────────────────────────────────────────────

    fn move_to_new_current_round(&mut self, new_round: RoundNo) {
        if new_round - self.current_round <= self.config.max_rounds_without_recovery {
            // Data exists in every round up to the new one; fetch it.
            for round in self.current_round..new_round {
                self.schedule(
                    Duration::ZERO,
                    TimerTask::SendDataInterest { round, retries: 1 },
                );
            }
        } else {
            // Too far to fish round by round. The next incoming cumulative
            // triggers a full-state recovery instead.
            warn!(
                from = self.current_round,
                to = new_round,
                "round jump too wide to fish, awaiting recovery"
            );
            self.recovery_desired = true;
        }
        self.current_round = new_round;
        self.data_interest_timeouts = 0;
        let prev = self.reexpress_data_timer.take();
        self.cancel_timer_opt(prev);
        let timer = self.schedule(
            Duration::ZERO,
            TimerTask::SendDataInterest {
                round: new_round,
                retries: 1,
            },
        );
        self.reexpress_data_timer = Some(timer);
    }

    fn move_to_new_current_round_after_recovery(&mut self, new_round: RoundNo) {
        self.current_round = new_round;
        let prev = self.reexpress_data_timer.take();
        self.cancel_timer_opt(prev);
        let timer = self.schedule(
            Duration::ZERO,
            TimerTask::SendDataInterest {
                round: new_round,
                retries: 1,
            },
        );
        self.reexpress_data_timer = Some(timer);
    }

    // ─── Stabilization ───────────────────────────────────────────────────

    fn set_stable_state(&mut self) {
        let init_round = if self.stable_round == 0 && self.last_recovery_round == 0 {
            // First stabilization from the beginning of time.
            1
        } else if self.stabilizing_round == self.last_recovery_round {
            // First stabilization after a recovery: the recovered round
            // itself needs a cumulative digest.
            self.stabilizing_round
        } else if self.stable_round != 0 {
            self.stable_round + 1
        } else {
            unreachable!("no starting round for cumulative-digest stabilization")
        };

        self.fold_stable_state(init_round, self.stabilizing_round);

        self.stable_round = self.stabilizing_round;
        self.stabilizing_round = self.stable_round + (self.current_round - self.stable_round) / 2;
        debug!(
            stable = self.stable_round,
            stabilizing = self.stabilizing_round,
            current = self.current_round,
            "stabilized cumulative digests"
        );

        let timer = self.schedule(self.config.stabilize_delay, TimerTask::Stabilize);
        self.stabilize_timer = Some(timer);
    }

    /// Fold every logged round in `[init_round, end_round]` into the frozen
    /// state, committing each round's cumulative digest along the way. The
    /// end round gets an (empty) entry if it has none.
    fn fold_stable_state(&mut self, init_round: RoundNo, end_round: RoundNo) {
        let mut old_state = std::mem::take(&mut self.old_state);
        for entry in self.log.range_mut(init_round, end_round) {
            old_state.merge(entry.state());
            entry.set_cumulative_digest(Some(old_state.get_digest()));
        }
        if !self.log.contains(end_round) {
            self.update_diff_log(DiffState::new(), end_round);
        }
        let entry = self
            .log
            .get_mut(end_round)
            .expect("stabilizing round entry just ensured");
        old_state.merge(entry.state());
        entry.set_cumulative_digest(Some(old_state.get_digest()));
        self.old_state = old_state;
    }

    // ─── Cumulative-only production ──────────────────────────────────────

    fn produce_cumulative_only(&mut self, round: RoundNo, digest: Sha256Digest) {
        self.cumulative_only_timers.remove(&digest);

        if let Some(pending) = self.pending_data_interest.clone() {
            if data_interest_round(&pending) == Some(self.current_round) {
                self.send_cumulative_only(&pending, round, digest);
                self.pending_data_interest = None;
            }
        }

        // A cumulative-only emission consumes a round like any production;
        // the sentinel seq-no records it in the log.
        let session_name = self.session_name.clone();
        let mut commit = DiffState::new();
        commit.update(&session_name, CUMULATIVE_ONLY_SEQ);
        commit.set_cumulative_info(Some(CumulativeInfo { round, digest }));
        self.update_diff_log(commit, self.current_round);
        let next = self.current_round + 1;
        self.move_to_new_current_round(next);
    }

    // ─── Timeouts ────────────────────────────────────────────────────────

    fn on_data_interest_timeout(&mut self, round: RoundNo, retries: u32) {
        if round == self.current_round {
            self.data_interest_timeouts += 1;
            if self.data_interest_timeouts >= self.config.max_data_interest_to_cumulative_only
                && self.stable_round == self.current_round - 1
            {
                // Nobody is producing. Announce our stable cumulative so
                // silent divergences still surface.
                self.data_interest_timeouts = 0;
                let digest = self.state.get_digest();
                if !self.cumulative_only_timers.contains_key(&digest) {
                    let delay = self.cumulative_only_jitter();
                    let timer = self.schedule(
                        delay,
                        TimerTask::ProduceCumulativeOnly {
                            round: self.stable_round,
                            digest,
                        },
                    );
                    self.cumulative_only_timers.insert(digest, timer);
                }
            }
        }
        // Older rounds with no entry yet are worth a bounded number of
        // retries; the current round re-expresses on its own timer.
        if round < self.current_round
            && !self.log.contains(round)
            && retries < self.config.max_data_interest_timeouts
        {
            self.schedule(
                Duration::ZERO,
                TimerTask::SendDataInterest {
                    round,
                    retries: retries + 1,
                },
            );
        }
    }

    fn on_reco_interest_timeout(&mut self, peer: Name) {
        self.reco_interest_timeouts += 1;
        if self.reco_interest_timeouts >= self.config.max_reco_interest_timeouts {
            warn!(peer = %peer, "recovery unanswered, giving up on peer");
            self.reco_interest_timeouts = 0;
            self.pending_recovery_prefixes.remove(&peer);
        } else {
            self.schedule(Duration::ZERO, TimerTask::SendRecoInterest { peer });
        }
    }

    // ─── Sending ─────────────────────────────────────────────────────────

    fn send_data_interest(&mut self, round: RoundNo, retries: u32) {
        let name = self
            .sync_prefix
            .clone()
            .append(NameComponent::from_bytes(DATA_COMPONENT))
            .append_number(round);
        let exclude = self
            .log
            .get(round)
            .map(|entry| entry.exclude().clone())
            .unwrap_or_default();
        let id = self.alloc_pending_id();
        self.actions.push(Action::ExpressInterest(InterestReq {
            id,
            name: name.clone(),
            lifetime: self.config.data_interest_lifetime,
            must_be_fresh: false,
            exclude,
            kind: InterestKind::Data { round, retries },
        }));

        if round == self.current_round {
            // Track it so our own production can self-satisfy it, and keep
            // re-expressing it while the round stays current.
            self.outstanding_data_interest_name = Some(name);
            self.outstanding_data_interest_id = Some(id);
            let (low, high) = self.config.reexpress_jitter_ms;
            let jitter = Duration::from_millis(self.rng.gen_range(low..=high));
            let timer = self.schedule(
                self.config.data_interest_lifetime + jitter,
                TimerTask::SendDataInterest { round, retries: 1 },
            );
            let prev = self.reexpress_data_timer.replace(timer);
            self.cancel_timer_opt(prev);
        }
    }

    fn send_sync_interest(&mut self, round: RoundNo) {
        let digest = self
            .log
            .get(round)
            .and_then(|entry| entry.round_digest())
            .unwrap_or(Sha256Digest::EMPTY);
        let name = self
            .sync_prefix
            .clone()
            .append(NameComponent::from_bytes(SYNC_COMPONENT))
            .append_number(round)
            .append(NameComponent::from_bytes(digest.as_bytes().to_vec()));
        let id = self.alloc_pending_id();
        self.actions.push(Action::ExpressInterest(InterestReq {
            id,
            name,
            lifetime: self.config.sync_interest_lifetime,
            must_be_fresh: true,
            exclude: Default::default(),
            kind: InterestKind::Sync { round },
        }));
    }

    fn send_reco_interest(&mut self, peer: &Name) {
        let name = peer
            .clone()
            .append(NameComponent::from_bytes(RECO_COMPONENT));
        debug!(%name, "expressing recovery interest");
        let id = self.alloc_pending_id();
        self.actions.push(Action::ExpressInterest(InterestReq {
            id,
            name,
            lifetime: self.config.sync_interest_lifetime,
            must_be_fresh: true,
            exclude: Default::default(),
            kind: InterestKind::Reco { peer: peer.clone() },
        }));
    }

    fn send_data(&mut self, name: &Name, diff: &DiffState) {
        let (round_no, digest) = match diff.cumulative_info() {
            Some(info) => (info.round, Some(info.digest)),
            None => (0, None),
        };
        let content = DataContent::new(
            self.session_name.clone(),
            round_no,
            digest,
            Some(diff.state().clone()),
        );
        assert!(content.well_formed(), "constructed a malformed DataContent");
        self.publish(name.clone(), content.encode());
    }

    fn send_cumulative_only(&mut self, name: &Name, round: RoundNo, digest: Sha256Digest) {
        let content = DataContent::new(self.session_name.clone(), round, Some(digest), None);
        assert!(
            content.well_formed(),
            "constructed a malformed cumulative-only DataContent"
        );
        self.publish(name.clone(), content.encode());
    }

    /// Sign and emit a reply, recording its digest in the exclude filter of
    /// the round it answers and self-satisfying our own matching interest.
    fn publish(&mut self, name: Name, content: Vec<u8>) {
        let packet = DataPacket::sign(
            name,
            self.config.data_freshness,
            content.into(),
            self.signer.as_ref(),
        );
        if let Some(round) = data_interest_round(packet.name()) {
            if let Some(entry) = self.log.get_mut(round) {
                entry.exclude_mut().insert(packet.implicit_digest());
            }
        }
        let self_satisfied = self.outstanding_data_interest_name.as_ref() == Some(packet.name());
        self.actions.push(Action::PutData(packet));
        if self_satisfied {
            if let Some(id) = self.outstanding_data_interest_id.take() {
                self.actions.push(Action::CancelInterest(id));
            }
        }
    }

    // ─── Plumbing ────────────────────────────────────────────────────────

    /// Stamp `commit` with its round and round digest, then insert it.
    /// An existing entry for the round is left in place.
    fn update_diff_log(&mut self, mut commit: DiffState, round: RoundNo) {
        commit.set_round(round);
        commit.update_round_digest();
        self.log.insert(commit);
    }

    fn schedule(&mut self, delay: Duration, task: TimerTask) -> EventId {
        let id = EventId(self.next_event_id);
        self.next_event_id += 1;
        self.actions.push(Action::SetTimer { id, delay, task });
        id
    }

    fn cancel_timer(&mut self, id: EventId) {
        self.actions.push(Action::CancelTimer(id));
    }

    fn cancel_timer_opt(&mut self, id: Option<EventId>) {
        if let Some(id) = id {
            self.cancel_timer(id);
        }
    }

    fn alloc_pending_id(&mut self) -> PendingId {
        let id = PendingId(self.next_pending_id);
        self.next_pending_id += 1;
        id
    }

    fn cumulative_only_jitter(&mut self) -> Duration {
        let bound = self.config.cumulative_only_delay.as_millis() as u64;
        Duration::from_millis(self.rng.gen_range(0..=bound))
    }

    fn take_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.actions)
    }
}

/// The round a data name (`<sync_prefix>/DATA/<round>`) refers to.
fn data_interest_round(name: &Name) -> Option<RoundNo> {
    if name.get(-2).map(NameComponent::as_bytes) != Some(DATA_COMPONENT) {
        return None;
    }
    name.get(-1).and_then(NameComponent::to_number)
}
