use crate::grid::{Direction, Position};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// Session-stable identity of a participant, e.g. `p1`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        PeerId(value.to_string())
    }
}

impl From<String> for PeerId {
    fn from(value: String) -> Self {
        PeerId(value)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of one participant as carried on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub endpoint: SocketAddr,
    pub position: Position,
    pub heading: Direction,
}

impl Peer {
    pub fn new(id: PeerId, endpoint: SocketAddr, position: Position, heading: Direction) -> Self {
        Self {
            id,
            endpoint,
            position,
            heading,
        }
    }
}

/// One `{identity, endpoint}` pair of the session roster handed over by
/// matchmaking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub id: PeerId,
    pub endpoint: SocketAddr,
}

impl FromStr for RosterEntry {
    type Err = String;

    /// Parses `p1=127.0.0.1:9001`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, addr) = s
            .split_once('=')
            .ok_or_else(|| format!("expected <id>=<ip:port>, got '{}'", s))?;

        let id = id.trim();
        if id.is_empty() {
            return Err(format!("empty peer id in '{}'", s));
        }

        let endpoint = addr
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| format!("invalid endpoint '{}': {}", addr, e))?;

        Ok(RosterEntry {
            id: PeerId::from(id),
            endpoint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_entry_parsing() {
        let entry: RosterEntry = "p2=127.0.0.1:9002".parse().unwrap();
        assert_eq!(entry.id, PeerId::from("p2"));
        assert_eq!(entry.endpoint, "127.0.0.1:9002".parse().unwrap());
    }

    #[test]
    fn test_roster_entry_rejects_garbage() {
        let invalid = vec!["p1", "=127.0.0.1:9001", "p1=localhost", "p1=127.0.0.1:99999"];

        for input in invalid {
            assert!(
                input.parse::<RosterEntry>().is_err(),
                "Should fail to parse: {}",
                input
            );
        }
    }

    #[test]
    fn test_peer_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&PeerId::from("p4")).unwrap();
        assert_eq!(json, "\"p4\"");
    }
}
