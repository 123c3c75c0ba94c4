//! Peer orchestration: the four protocol loops around the shared state

use crate::config::SessionConfig;
use crate::error::NodeError;
use crate::events::{self, EventSender, SimEvent};
use crate::state::{SessionState, SharedState};
use crate::transport::{Datagram, GossipTransport};
use log::{debug, error, info, warn};
use shared::{Direction, Envelope, PeerId, RosterEntry};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// One participant of a session
///
/// Cloning is cheap; every clone drives the same state, socket and event
/// channel.
#[derive(Clone)]
pub struct Node {
    config: Arc<SessionConfig>,
    state: SharedState,
    transport: Arc<GossipTransport>,
    events: EventSender,
    game_over: Arc<watch::Sender<bool>>,
}

impl Node {
    /// Joins the session described by `roster`
    ///
    /// The local identity is the roster entry whose endpoint equals the
    /// transport's bound address.
    pub fn bootstrap(
        config: SessionConfig,
        roster: &[RosterEntry],
        transport: GossipTransport,
        events: EventSender,
    ) -> Result<Self, NodeError> {
        let state = SessionState::bootstrap(&config, roster, transport.local_addr(), Instant::now())?;
        info!(
            "Joined session as {} with {} peers, leader is {:?}",
            state.self_id(),
            roster.len(),
            state.leader()
        );

        let (game_over, _) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            state: state.into_shared(),
            transport: Arc::new(transport),
            events,
            game_over: Arc::new(game_over),
        })
    }

    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub async fn is_leader(&self) -> bool {
        self.state.read().await.is_leader()
    }

    pub async fn leader(&self) -> Option<PeerId> {
        self.state.read().await.leader().cloned()
    }

    /// Turns the local peer and announces it. Returns false when the heading
    /// did not change.
    pub async fn change_direction(&self, heading: Direction) -> bool {
        let outbound = {
            let mut state = self.state.write().await;
            state
                .change_direction(heading)
                .map(|envelope| (envelope, state.peer_endpoints()))
        };

        match outbound {
            Some((envelope, destinations)) => {
                self.send(&envelope, &destinations);
                true
            }
            None => false,
        }
    }

    /// Spawns the listen, broadcast, tick and failure-detection loops
    pub fn start(self) -> NodeHandle {
        let (receiver, inbox) = self.transport.spawn_receiver();

        let tasks = vec![
            receiver,
            tokio::spawn(self.clone().listen_loop(inbox)),
            tokio::spawn(self.clone().broadcast_loop()),
            tokio::spawn(self.clone().tick_loop()),
            tokio::spawn(self.clone().failure_loop()),
        ];

        info!("Node {} started", self.local_addr());
        NodeHandle { node: self, tasks }
    }

    /// Decodes and routes every inbound datagram
    ///
    /// Keeps running after game over so late death reports still arrive.
    async fn listen_loop(self, mut inbox: mpsc::UnboundedReceiver<Datagram>) {
        while let Some(datagram) = inbox.recv().await {
            let envelope = match Envelope::decode(&datagram.bytes) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("Dropping datagram from {}: {}", datagram.from, e);
                    continue;
                }
            };

            debug!(
                "Received {} from {} ({})",
                envelope.kind(),
                envelope.sender().id,
                datagram.from
            );

            let events = {
                let mut state = self.state.write().await;
                state.apply_envelope(envelope, Instant::now())
            };
            self.publish(events);
        }
    }

    /// Gossips the local snapshot, or the aggregated state while leading
    async fn broadcast_loop(self) {
        let mut game_over = self.game_over.subscribe();
        let mut timer = interval(self.config.broadcast_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if *game_over.borrow() {
                        break;
                    }

                    let outbound = {
                        let mut state = self.state.write().await;
                        state
                            .outbound_update()
                            .map(|envelope| (envelope, state.peer_endpoints()))
                    };

                    if let Some((envelope, destinations)) = outbound {
                        self.send(&envelope, &destinations);
                    }
                }
                changed = game_over.changed() => {
                    if changed.is_err() || *game_over.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Broadcast loop stopped");
    }

    /// Advances the board on a fixed period, independent of the network
    async fn tick_loop(self) {
        let mut game_over = self.game_over.subscribe();
        let mut timer = interval(self.config.tick_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick since it fires immediately
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if *game_over.borrow() {
                        break;
                    }

                    let (report, destinations) = {
                        let mut state = self.state.write().await;
                        (state.tick(), state.peer_endpoints())
                    };

                    if let Some(envelope) = &report.death_report {
                        self.send(envelope, &destinations);
                    }
                    self.publish(report.events);
                }
                changed = game_over.changed() => {
                    if changed.is_err() || *game_over.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Tick loop stopped");
    }

    /// Evicts silent peers once per broadcast interval
    async fn failure_loop(self) {
        let mut game_over = self.game_over.subscribe();
        let mut timer = interval(self.config.broadcast_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        timer.tick().await;

        let mut was_leader = None;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if *game_over.borrow() {
                        break;
                    }

                    let (eviction, is_leader) = {
                        let mut state = self.state.write().await;
                        let eviction = state.check_failures(Instant::now());
                        (eviction, state.is_leader())
                    };

                    if was_leader != Some(is_leader) {
                        info!("Acting as {}", if is_leader { "leader" } else { "follower" });
                        was_leader = Some(is_leader);
                    }
                    if !eviction.evicted.is_empty() {
                        warn!("Evicted {:?}", eviction.evicted);
                    }
                }
                changed = game_over.changed() => {
                    if changed.is_err() || *game_over.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Failure detector stopped");
    }

    fn send(&self, envelope: &Envelope, destinations: &[(PeerId, SocketAddr)]) {
        match self.transport.broadcast(envelope, destinations) {
            Ok(queued) => debug!("Queued {} to {} peers", envelope.kind(), queued),
            Err(e) => error!("Failed to encode {}, dropping it: {}", envelope.kind(), e),
        }
    }

    fn publish(&self, batch: Vec<SimEvent>) {
        for event in batch {
            if event == SimEvent::Victory {
                self.game_over.send_replace(true);
            }
            events::emit(&self.events, event);
        }
    }
}

/// A running node and its loop tasks
pub struct NodeHandle {
    node: Node,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    pub fn node(&self) -> &Node {
        &self.node
    }

    pub async fn change_direction(&self, heading: Direction) -> bool {
        self.node.change_direction(heading).await
    }

    /// Stops every loop. Sends already handed to the socket finish or fail on
    /// their own.
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
        info!("Node {} shut down", self.node.local_addr());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Phase;
    use shared::{Peer, Position};
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    fn fast_config() -> SessionConfig {
        SessionConfig {
            tick_interval: Duration::from_secs(60),
            broadcast_interval: Duration::from_millis(50),
            failure_multiplier: 20,
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_endpoint_outside_roster() {
        let transport = GossipTransport::bind("127.0.0.1:0".parse().unwrap(), 0.0)
            .await
            .unwrap();
        let roster = vec![RosterEntry {
            id: PeerId::from("p1"),
            endpoint: "127.0.0.1:9".parse().unwrap(),
        }];
        let (tx, _rx) = events::channel();

        let result = Node::bootstrap(fast_config(), &roster, transport, tx);
        assert!(matches!(result, Err(NodeError::SelfNotInRoster(_))));
    }

    #[tokio::test]
    async fn test_victory_from_socket_stops_game() {
        let transport = GossipTransport::bind("127.0.0.1:0".parse().unwrap(), 0.0)
            .await
            .unwrap();
        let raw = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let roster = vec![
            RosterEntry {
                id: PeerId::from("p1"),
                endpoint: transport.local_addr(),
            },
            RosterEntry {
                id: PeerId::from("p2"),
                endpoint: raw.local_addr().unwrap(),
            },
        ];
        let target = transport.local_addr();
        let (tx, mut rx) = events::channel();
        let node = Node::bootstrap(fast_config(), &roster, transport, tx).unwrap();
        let handle = node.start();

        let report = Envelope::DeathReport {
            sender: Peer::new(
                PeerId::from("p2"),
                raw.local_addr().unwrap(),
                Position::new(8, 8),
                shared::Direction::Left,
            ),
        };
        raw.send_to(&report.encode().unwrap(), target).await.unwrap();

        let event = timeout(Duration::from_secs(2), async {
            loop {
                match rx.recv().await {
                    Some(SimEvent::Victory) => break SimEvent::Victory,
                    Some(_) => continue,
                    None => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("victory should be announced");

        assert_eq!(event, SimEvent::Victory);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.node().state().read().await.phase(), Phase::GameOver);
        handle.shutdown();
    }
}
