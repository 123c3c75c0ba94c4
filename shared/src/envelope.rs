//! Peer-to-peer wire envelope
//!
//! Internally every message is a typed [`Envelope`]. On the wire it travels as
//! a flat JSON object of flags plus optional payloads so that a receiver can
//! decode messages with fields it does not know about, and missing optional
//! fields fall back to empty/false.

use crate::grid::Position;
use crate::peer::{Peer, PeerId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Trail of every peer since game start, keyed by identity. The last entry
/// of each trail is the peer's head.
pub type History = BTreeMap<PeerId, Vec<Position>>;

/// Identities the leader has declared failed
pub type DeadNodes = BTreeSet<PeerId>;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope carries no sender snapshot")]
    MissingSender,
}

/// A message exchanged between peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Periodic heartbeat carrying the sender's current snapshot
    Update { sender: Peer },
    /// Leader broadcast carrying the aggregated history and the dead-node set
    LeaderState {
        sender: Peer,
        dead_nodes: DeadNodes,
        history: History,
    },
    /// The sender changed heading at its current position
    DirectionChange { sender: Peer },
    /// The sender collided and is out of the game
    DeathReport { sender: Peer },
}

/// Flat wire representation of an [`Envelope`]
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct WireMessage {
    is_leader: bool,
    is_direction_change: bool,
    is_death_report: bool,
    dead_nodes: Vec<PeerId>,
    node: Option<Peer>,
    history: History,
}

impl Envelope {
    pub fn sender(&self) -> &Peer {
        match self {
            Envelope::Update { sender }
            | Envelope::LeaderState { sender, .. }
            | Envelope::DirectionChange { sender }
            | Envelope::DeathReport { sender } => sender,
        }
    }

    /// Short tag name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Update { .. } => "update",
            Envelope::LeaderState { .. } => "leader-state",
            Envelope::DirectionChange { .. } => "direction-change",
            Envelope::DeathReport { .. } => "death-report",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let wire = match self {
            Envelope::Update { sender } => WireMessage {
                node: Some(sender.clone()),
                ..Default::default()
            },
            Envelope::LeaderState {
                sender,
                dead_nodes,
                history,
            } => WireMessage {
                is_leader: true,
                dead_nodes: dead_nodes.iter().cloned().collect(),
                node: Some(sender.clone()),
                history: history.clone(),
                ..Default::default()
            },
            Envelope::DirectionChange { sender } => WireMessage {
                is_direction_change: true,
                node: Some(sender.clone()),
                ..Default::default()
            },
            Envelope::DeathReport { sender } => WireMessage {
                is_death_report: true,
                node: Some(sender.clone()),
                ..Default::default()
            },
        };

        Ok(serde_json::to_vec(&wire)?)
    }

    /// Decodes a datagram payload
    ///
    /// Only one flag is meaningful per message. If several are set the
    /// leader flag wins, then the death report, then the direction change.
    pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
        let wire: WireMessage = serde_json::from_slice(bytes)?;
        let sender = wire.node.ok_or(CodecError::MissingSender)?;

        let envelope = if wire.is_leader {
            Envelope::LeaderState {
                sender,
                dead_nodes: wire.dead_nodes.into_iter().collect(),
                history: wire.history,
            }
        } else if wire.is_death_report {
            Envelope::DeathReport { sender }
        } else if wire.is_direction_change {
            Envelope::DirectionChange { sender }
        } else {
            Envelope::Update { sender }
        };

        Ok(envelope)
    }

    /// Checks that every coordinate carried by the envelope lies on a grid of
    /// `size` cells per side. Returns the first offending position.
    pub fn validate(&self, size: usize) -> Result<(), Position> {
        let position = self.sender().position;
        if !position.in_bounds(size) {
            return Err(position);
        }

        if let Envelope::LeaderState { history, .. } = self {
            if let Some(bad) = history
                .values()
                .flatten()
                .find(|pos| !pos.in_bounds(size))
            {
                return Err(*bad);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Direction;

    fn peer(id: &str, x: usize, y: usize, heading: Direction) -> Peer {
        Peer::new(
            PeerId::from(id),
            "127.0.0.1:9001".parse().unwrap(),
            Position::new(x, y),
            heading,
        )
    }

    #[test]
    fn test_leader_state_survives_the_wire() {
        let mut history = History::new();
        history.insert(
            PeerId::from("p2"),
            vec![Position::new(8, 8), Position::new(7, 8), Position::new(6, 8)],
        );
        history.insert(PeerId::from("p3"), vec![Position::new(8, 1)]);

        let mut dead_nodes = DeadNodes::new();
        dead_nodes.insert(PeerId::from("p4"));

        let envelope = Envelope::LeaderState {
            sender: peer("p1", 2, 1, Direction::Right),
            dead_nodes,
            history,
        };

        let bytes = envelope.encode().unwrap();
        let decoded = Envelope::decode(&bytes).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_flag_tags_map_to_variants() {
        let sender = peer("p2", 8, 8, Direction::Left);
        let cases = vec![
            Envelope::Update {
                sender: sender.clone(),
            },
            Envelope::DirectionChange {
                sender: sender.clone(),
            },
            Envelope::DeathReport {
                sender: sender.clone(),
            },
        ];

        for envelope in cases {
            let decoded = Envelope::decode(&envelope.encode().unwrap()).unwrap();
            assert_eq!(decoded.kind(), envelope.kind());
            assert_eq!(decoded.sender(), &sender);
        }
    }

    #[test]
    fn test_absent_fields_default_to_empty() {
        let json = r#"{
            "node": {
                "id": "p3",
                "endpoint": "127.0.0.1:9003",
                "position": { "x": 8, "y": 1 },
                "heading": "Left"
            }
        }"#;

        match Envelope::decode(json.as_bytes()).unwrap() {
            Envelope::Update { sender } => {
                assert_eq!(sender.id, PeerId::from("p3"));
                assert_eq!(sender.position, Position::new(8, 1));
            }
            other => panic!("Expected update, got {:?}", other),
        }
    }

    #[test]
    fn test_leader_flag_without_payload_yields_empty_state() {
        let json = r#"{
            "is_leader": true,
            "unknown_extension": 42,
            "node": {
                "id": "p1",
                "endpoint": "127.0.0.1:9001",
                "position": { "x": 1, "y": 1 },
                "heading": "Right"
            }
        }"#;

        match Envelope::decode(json.as_bytes()).unwrap() {
            Envelope::LeaderState {
                dead_nodes,
                history,
                ..
            } => {
                assert!(dead_nodes.is_empty());
                assert!(history.is_empty());
            }
            other => panic!("Expected leader state, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_sender_is_rejected() {
        let result = Envelope::decode(br#"{ "is_death_report": true }"#);
        assert!(matches!(result, Err(CodecError::MissingSender)));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            Envelope::decode(b"\x00\x01not json"),
            Err(CodecError::Json(_))
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_grid_positions() {
        let inside = Envelope::Update {
            sender: peer("p1", 9, 9, Direction::Up),
        };
        assert!(inside.validate(10).is_ok());

        let outside = Envelope::Update {
            sender: peer("p1", 10, 0, Direction::Up),
        };
        assert_eq!(outside.validate(10), Err(Position::new(10, 0)));

        let mut history = History::new();
        history.insert(PeerId::from("p2"), vec![Position::new(3, 3), Position::new(3, 12)]);
        let leader = Envelope::LeaderState {
            sender: peer("p1", 1, 1, Direction::Right),
            dead_nodes: DeadNodes::new(),
            history,
        };
        assert_eq!(leader.validate(10), Err(Position::new(3, 12)));
    }
}
