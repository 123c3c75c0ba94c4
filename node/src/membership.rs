//! Ordered session roster, last-seen clocks and failure detection
//!
//! This module is the only place that decides who leads a session:
//! - The peer at roster index 0 is the leader, there is no election message
//! - Removing a peer shifts every later peer left, which may promote a new
//!   leader
//! - The failure detector policy depends on the local role: a leader evicts
//!   any silent follower, a follower only watches the leader
//!
//! Leadership is never cached. Callers ask again every time they need it
//! because the roster can change between any two checks.

use log::{info, warn};
use shared::{Peer, PeerId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Ordered, identity-unique list of the peers believed alive
#[derive(Debug, Default)]
pub struct Membership {
    /// Roster order; index 0 leads
    peers: Vec<Peer>,
    /// Arrival time of the last decoded envelope per peer
    last_seen: HashMap<PeerId, Instant>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a peer at the end of the roster
    ///
    /// Returns false without touching the roster if a peer with the same
    /// identity is already registered. The peer's last-seen clock starts at
    /// `now`.
    pub fn register(&mut self, peer: Peer, now: Instant) -> bool {
        if self.contains(&peer.id) {
            return false;
        }
        self.last_seen.insert(peer.id.clone(), now);
        self.peers.push(peer);
        true
    }

    /// Removes a peer, preserving the order of everyone else
    ///
    /// Returns the removed peer, or None when `id` was not a member. Removing
    /// a non-member is a no-op.
    pub fn remove(&mut self, id: &PeerId) -> Option<Peer> {
        let index = self.peers.iter().position(|peer| &peer.id == id)?;
        self.last_seen.remove(id);
        let removed = self.peers.remove(index);
        info!("Removed {} from roster ({} peers left)", id, self.peers.len());
        Some(removed)
    }

    pub fn leader(&self) -> Option<&PeerId> {
        self.peers.first().map(|peer| &peer.id)
    }

    pub fn is_leader(&self, id: &PeerId) -> bool {
        self.leader() == Some(id)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.iter().any(|peer| &peer.id == id)
    }

    pub fn get(&self, id: &PeerId) -> Option<&Peer> {
        self.peers.iter().find(|peer| &peer.id == id)
    }

    pub fn get_mut(&mut self, id: &PeerId) -> Option<&mut Peer> {
        self.peers.iter_mut().find(|peer| &peer.id == id)
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn peers_mut(&mut self) -> &mut [Peer] {
        &mut self.peers
    }

    pub fn ids(&self) -> Vec<PeerId> {
        self.peers.iter().map(|peer| peer.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Refreshes the last-seen clock of a member. Returns false for
    /// non-members, whose clocks are never created mid-session.
    pub fn touch(&mut self, id: &PeerId, now: Instant) -> bool {
        match self.last_seen.get_mut(id) {
            Some(seen) => {
                *seen = now;
                true
            }
            None => false,
        }
    }

    pub fn last_seen(&self, id: &PeerId) -> Option<Instant> {
        self.last_seen.get(id).copied()
    }

    /// Endpoints of every member other than `self_id`, in roster order
    pub fn endpoints_except(&self, self_id: &PeerId) -> Vec<(PeerId, SocketAddr)> {
        self.peers
            .iter()
            .filter(|peer| &peer.id != self_id)
            .map(|peer| (peer.id.clone(), peer.endpoint))
            .collect()
    }

    /// Returns the peers the failure detector should evict
    ///
    /// A peer is silent when `now - last_seen > threshold`. As leader every
    /// silent peer other than `self_id` is returned; as follower only the
    /// leader is considered, other followers are left to whoever leads next.
    pub fn timed_out(&self, self_id: &PeerId, now: Instant, threshold: Duration) -> Vec<PeerId> {
        let is_silent = |id: &PeerId| {
            self.last_seen
                .get(id)
                .map_or(false, |seen| now.saturating_duration_since(*seen) > threshold)
        };

        if self.is_leader(self_id) {
            self.peers
                .iter()
                .filter(|peer| &peer.id != self_id && is_silent(&peer.id))
                .map(|peer| peer.id.clone())
                .collect()
        } else {
            match self.leader() {
                Some(leader) if is_silent(leader) => vec![leader.clone()],
                _ => Vec::new(),
            }
        }
    }

    /// Evicts every peer returned by [`Membership::timed_out`]
    ///
    /// Eviction and the leader re-read happen in the same `&mut self`
    /// borrow, so callers holding the session lock never observe a roster
    /// halfway through a removal.
    pub fn evict_timed_out(
        &mut self,
        self_id: &PeerId,
        now: Instant,
        threshold: Duration,
    ) -> Eviction {
        let leader_before = self.leader().cloned();
        let evicted = self.timed_out(self_id, now, threshold);

        for id in &evicted {
            warn!("{} missed its heartbeat for over {:?}, evicting", id, threshold);
            self.remove(id);
        }

        Eviction {
            evicted,
            leader_before,
            leader_after: self.leader().cloned(),
        }
    }
}

/// Result of one failure-detector sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eviction {
    pub evicted: Vec<PeerId>,
    pub leader_before: Option<PeerId>,
    pub leader_after: Option<PeerId>,
}

impl Eviction {
    pub fn leader_changed(&self) -> bool {
        self.leader_before != self.leader_after
    }
}
