use crate::config::ConfigError;
use shared::{CodecError, PeerId};
use std::net::SocketAddr;
use thiserror::Error;

/// Errors that prevent a node from joining or starting a session
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("roster is empty")]
    EmptyRoster,

    #[error("peer {0} appears more than once in the roster")]
    DuplicatePeer(PeerId),

    #[error("roster of {count} peers exceeds the room size of {room_size}")]
    RosterTooLarge { count: usize, room_size: usize },

    #[error("local endpoint {0} is not part of the roster")]
    SelfNotInRoster(SocketAddr),

    #[error("no spawn configured for peer {0}")]
    UnknownSpawn(PeerId),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
