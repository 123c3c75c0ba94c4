//! Session timing, grid and spawn configuration

use shared::{Board, Direction, PeerId, Position};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Initial cell and heading of a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spawn {
    pub position: Position,
    pub heading: Direction,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("tick interval must be non-zero")]
    ZeroTickInterval,
    #[error("broadcast interval must be non-zero")]
    ZeroBroadcastInterval,
    #[error("failure multiplier must be at least 2 (got {0}) so the threshold outlasts a missed heartbeat")]
    FailureMultiplierTooSmall(u32),
    #[error("grid size must be at least 2 (got {0})")]
    GridTooSmall(usize),
    #[error("grid size must be at most {max} (got {size})")]
    GridTooLarge { size: usize, max: usize },
    #[error("room size must be at least 2 (got {0})")]
    RoomTooSmall(usize),
    #[error("spawn of {id} at {position} lies outside a {size}x{size} grid")]
    SpawnOutOfGrid {
        id: PeerId,
        position: Position,
        size: usize,
    },
    #[error("loss rate must be within [0, 1) (got {0})")]
    InvalidLossRate(f64),
}

/// Every recognised option of a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Period of the local collision simulation
    pub tick_interval: Duration,
    /// Period of the gossip broadcast and of the failure check
    pub broadcast_interval: Duration,
    /// Failure threshold in units of the broadcast interval
    pub failure_multiplier: u32,
    /// Cells per side of the square board
    pub grid_size: usize,
    /// Largest roster a session accepts
    pub room_size: usize,
    pub spawns: BTreeMap<PeerId, Spawn>,
    /// Probability of dropping an outbound datagram before it is sent
    pub loss_rate: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(500),
            broadcast_interval: Duration::from_millis(500),
            failure_multiplier: 3,
            grid_size: 10,
            room_size: 6,
            spawns: default_spawns(),
            loss_rate: 0.0,
        }
    }
}

impl SessionConfig {
    /// Silence after which a peer is considered failed
    pub fn failure_threshold(&self) -> Duration {
        self.broadcast_interval * self.failure_multiplier
    }

    pub fn spawn_for(&self, id: &PeerId) -> Option<Spawn> {
        self.spawns.get(id).copied()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroTickInterval);
        }
        if self.broadcast_interval.is_zero() {
            return Err(ConfigError::ZeroBroadcastInterval);
        }
        if self.failure_multiplier < 2 {
            return Err(ConfigError::FailureMultiplierTooSmall(
                self.failure_multiplier,
            ));
        }
        if self.grid_size < 2 {
            return Err(ConfigError::GridTooSmall(self.grid_size));
        }
        if self.grid_size > Board::MAX_SIZE {
            return Err(ConfigError::GridTooLarge {
                size: self.grid_size,
                max: Board::MAX_SIZE,
            });
        }
        if self.room_size < 2 {
            return Err(ConfigError::RoomTooSmall(self.room_size));
        }
        if !(0.0..1.0).contains(&self.loss_rate) {
            return Err(ConfigError::InvalidLossRate(self.loss_rate));
        }

        for (id, spawn) in &self.spawns {
            if !spawn.position.in_bounds(self.grid_size) {
                return Err(ConfigError::SpawnOutOfGrid {
                    id: id.clone(),
                    position: spawn.position,
                    size: self.grid_size,
                });
            }
        }

        Ok(())
    }
}

/// Spawn table for the six seats of a room
pub fn default_spawns() -> BTreeMap<PeerId, Spawn> {
    let table = [
        ("p1", Position::new(1, 1), Direction::Right),
        ("p2", Position::new(8, 8), Direction::Left),
        ("p3", Position::new(8, 1), Direction::Left),
        ("p4", Position::new(1, 8), Direction::Right),
        ("p5", Position::new(4, 1), Direction::Right),
        ("p6", Position::new(5, 8), Direction::Left),
    ];

    table
        .into_iter()
        .map(|(id, position, heading)| (PeerId::from(id), Spawn { position, heading }))
        .collect()
}
