//! Session state shared by the listen, broadcast, tick and failure loops
//!
//! Everything a loop reads or writes lives in one [`SessionState`] guarded by
//! a single `tokio::sync::RwLock`. Each public operation here is meant to run
//! under one write-lock acquisition, which makes compound steps such as
//! "evict, then read the new leader" atomic for every other loop.

use crate::aggregator;
use crate::config::SessionConfig;
use crate::error::NodeError;
use crate::events::SimEvent;
use crate::membership::{Eviction, Membership};
use crate::predictor;
use crate::simulator;
use log::{debug, info, warn};
use shared::{
    Board, Cell, DeadNodes, Direction, Envelope, History, Peer, PeerId, RosterEntry,
};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub type SharedState = Arc<RwLock<SessionState>>;

/// Participation of the local peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalStatus {
    Alive,
    /// Collided and reported; terminal
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Playing,
    GameOver,
}

/// Outcome of one simulation tick
#[derive(Debug, Default)]
pub struct TickReport {
    pub events: Vec<SimEvent>,
    /// Set on the tick the local peer dies; to be sent to every other peer
    pub death_report: Option<Envelope>,
}

pub struct SessionState {
    self_id: PeerId,
    grid_size: usize,
    failure_threshold: Duration,
    membership: Membership,
    /// Authoritative while leading, otherwise the leader's last broadcast
    history: History,
    dead_nodes: DeadNodes,
    board: Board,
    status: LocalStatus,
    phase: Phase,
    initial_count: usize,
    /// Peers whose death report arrived; counted once each
    fallen: BTreeSet<PeerId>,
}

impl SessionState {
    /// Builds the state of a freshly formed session
    ///
    /// Each roster entry gets its spawn from the configuration, and the local
    /// peer is the entry whose endpoint matches `self_endpoint`. A socket bound
    /// to an unspecified address matches a roster entry by port.
    pub fn bootstrap(
        config: &SessionConfig,
        roster: &[RosterEntry],
        self_endpoint: SocketAddr,
        now: Instant,
    ) -> Result<Self, NodeError> {
        config.validate()?;

        if roster.is_empty() {
            return Err(NodeError::EmptyRoster);
        }
        if roster.len() > config.room_size {
            return Err(NodeError::RosterTooLarge {
                count: roster.len(),
                room_size: config.room_size,
            });
        }

        let mut membership = Membership::new();
        let mut board = Board::new(config.grid_size);
        let mut self_id = None;

        for entry in roster {
            let spawn = config
                .spawn_for(&entry.id)
                .ok_or_else(|| NodeError::UnknownSpawn(entry.id.clone()))?;

            let peer = Peer::new(
                entry.id.clone(),
                entry.endpoint,
                spawn.position,
                spawn.heading,
            );
            if !membership.register(peer, now) {
                return Err(NodeError::DuplicatePeer(entry.id.clone()));
            }
            board.set(spawn.position, Cell::Head(entry.id.clone()));

            if self_id.is_none() && endpoint_matches(entry.endpoint, self_endpoint) {
                self_id = Some(entry.id.clone());
            }
        }

        let self_id = self_id.ok_or(NodeError::SelfNotInRoster(self_endpoint))?;

        Ok(Self {
            self_id,
            grid_size: config.grid_size,
            failure_threshold: config.failure_threshold(),
            initial_count: membership.len(),
            membership,
            history: History::new(),
            dead_nodes: DeadNodes::new(),
            board,
            status: LocalStatus::Alive,
            phase: Phase::Playing,
            fallen: BTreeSet::new(),
        })
    }

    pub fn into_shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    pub fn self_id(&self) -> &PeerId {
        &self.self_id
    }

    pub fn leader(&self) -> Option<&PeerId> {
        self.membership.leader()
    }

    pub fn is_leader(&self) -> bool {
        self.membership.is_leader(&self.self_id)
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn dead_nodes(&self) -> &DeadNodes {
        &self.dead_nodes
    }

    pub fn status(&self) -> LocalStatus {
        self.status
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_game_over(&self) -> bool {
        self.phase == Phase::GameOver
    }

    pub fn alive_count(&self) -> usize {
        self.initial_count.saturating_sub(self.fallen.len())
    }

    /// Current snapshot of the local peer
    pub fn self_snapshot(&self) -> Option<Peer> {
        self.membership.get(&self.self_id).cloned()
    }

    /// Every other member's endpoint, in roster order
    pub fn peer_endpoints(&self) -> Vec<(PeerId, SocketAddr)> {
        self.membership.endpoints_except(&self.self_id)
    }

    /// Routes one decoded envelope
    ///
    /// Envelopes from ourselves, from non-members or with positions off the
    /// grid are dropped. Any other envelope refreshes the sender's last-seen
    /// clock before it is handled by tag.
    pub fn apply_envelope(&mut self, envelope: Envelope, now: Instant) -> Vec<SimEvent> {
        let sender_id = envelope.sender().id.clone();
        if sender_id == self.self_id {
            return Vec::new();
        }

        if let Err(position) = envelope.validate(self.grid_size) {
            warn!(
                "Dropping {} from {}: position {} is off the grid",
                envelope.kind(),
                sender_id,
                position
            );
            return Vec::new();
        }

        if !self.membership.touch(&sender_id, now) {
            debug!(
                "Ignoring {} from {}, not in the roster",
                envelope.kind(),
                sender_id
            );
            return Vec::new();
        }

        match envelope {
            Envelope::LeaderState {
                sender,
                dead_nodes,
                history,
            } => self.apply_leader_state(sender, dead_nodes, history),

            Envelope::Update { sender } => {
                if self.is_leader() {
                    aggregator::record(&mut self.history, &sender.id, sender.position);
                }
                Vec::new()
            }

            Envelope::DirectionChange { sender } => {
                if self.is_leader() {
                    aggregator::record(&mut self.history, &sender.id, sender.position);
                }
                if let Some(known) = self.membership.get_mut(&sender.id) {
                    let path = predictor::reckon(&mut self.board, known, &sender);
                    debug!(
                        "{} turned {} at {}, reconstructed {} trail cells",
                        sender.id,
                        sender.heading,
                        sender.position,
                        path.len()
                    );
                }
                Vec::new()
            }

            Envelope::DeathReport { sender } => {
                info!("{} reported its death at {}", sender.id, sender.position);
                if let Some(known) = self.membership.get_mut(&sender.id) {
                    known.position = sender.position;
                }
                self.board
                    .set(sender.position, Cell::Dead(sender.id.clone()));
                self.mark_fallen(&sender.id);
                self.check_victory().into_iter().collect()
            }
        }
    }

    fn apply_leader_state(
        &mut self,
        sender: Peer,
        dead_nodes: DeadNodes,
        history: History,
    ) -> Vec<SimEvent> {
        if !self.membership.is_leader(&sender.id) {
            debug!(
                "Ignoring leader state from {}, believed leader is {:?}",
                sender.id,
                self.membership.leader()
            );
            return Vec::new();
        }

        for id in dead_nodes {
            if id == self.self_id {
                continue;
            }
            if self.membership.remove(&id).is_some() {
                warn!("Leader {} declared {} dead", sender.id, id);
            }
            self.dead_nodes.insert(id);
        }

        aggregator::replace(&mut self.history, history);
        aggregator::overlay(&mut self.board, &self.history);

        vec![SimEvent::BoardUpdated(self.board.clone())]
    }

    /// Advances the local simulation by one tick
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        if self.is_game_over() {
            return report;
        }

        let self_id = &self.self_id;
        let local_dead = self.status == LocalStatus::Dead;
        let fallen = &self.fallen;
        let collisions = simulator::advance(
            &mut self.board,
            self.membership.peers_mut(),
            |id| fallen.contains(id) || (local_dead && id == self_id),
        );

        for collision in collisions {
            if collision.id == self.self_id && self.status == LocalStatus::Alive {
                info!("{} crashed at {}", self.self_id, collision.position);
                self.status = LocalStatus::Dead;
                report.events.push(SimEvent::LocalDeath {
                    id: self.self_id.clone(),
                });
                report.death_report = self.death_report();
            }
        }

        report
            .events
            .push(SimEvent::BoardUpdated(self.board.clone()));
        report
    }

    /// Runs the failure detector against the last-seen clocks
    ///
    /// Every evicted peer is recorded in the Dead-Node Set, propagated once
    /// this peer leads. Eviction changes membership and possibly the leader;
    /// only death reports lower the alive tally.
    pub fn check_failures(&mut self, now: Instant) -> Eviction {
        let eviction =
            self.membership
                .evict_timed_out(&self.self_id, now, self.failure_threshold);

        for id in &eviction.evicted {
            self.dead_nodes.insert(id.clone());
        }

        if eviction.leader_changed() {
            info!(
                "Leadership moved from {:?} to {:?}",
                eviction.leader_before, eviction.leader_after
            );
        }

        eviction
    }

    /// Builds the periodic gossip envelope
    ///
    /// As leader the local position is appended to our own trail first and
    /// the full history plus dead-node set are attached.
    pub fn outbound_update(&mut self) -> Option<Envelope> {
        let sender = self.self_snapshot()?;

        if self.is_leader() {
            aggregator::record(&mut self.history, &sender.id, sender.position);
            Some(Envelope::LeaderState {
                sender,
                dead_nodes: self.dead_nodes.clone(),
                history: self.history.clone(),
            })
        } else {
            Some(Envelope::Update { sender })
        }
    }

    /// Turns the local peer. Returns the envelope announcing the change, or
    /// None when nothing changed or the peer can no longer steer.
    pub fn change_direction(&mut self, heading: Direction) -> Option<Envelope> {
        if self.status != LocalStatus::Alive || self.is_game_over() {
            return None;
        }

        let peer = self.membership.get_mut(&self.self_id)?;
        if peer.heading == heading {
            return None;
        }

        info!(
            "{} turning from {} to {} at {}",
            peer.id, peer.heading, heading, peer.position
        );
        peer.heading = heading;
        Some(Envelope::DirectionChange {
            sender: peer.clone(),
        })
    }

    pub fn death_report(&self) -> Option<Envelope> {
        self.self_snapshot()
            .map(|sender| Envelope::DeathReport { sender })
    }

    fn mark_fallen(&mut self, id: &PeerId) {
        if *id == self.self_id {
            return;
        }
        if self.fallen.insert(id.clone()) {
            info!("{} is out, {} peers still alive", id, self.alive_count());
        }
    }

    fn check_victory(&mut self) -> Option<SimEvent> {
        if self.phase == Phase::Playing && self.alive_count() <= 1 {
            info!("Only one peer left standing, game over");
            self.phase = Phase::GameOver;
            return Some(SimEvent::Victory);
        }
        None
    }
}

fn endpoint_matches(roster: SocketAddr, local: SocketAddr) -> bool {
    roster == local || (local.ip().is_unspecified() && roster.port() == local.port())
}
