//! Data model and wire format shared by every peer of a light-trail session
//!
//! Nothing in this crate is concurrent. The board, the peer snapshot and the
//! envelope codec are plain values that the node crate wraps in its shared
//! session state.

pub mod envelope;
pub mod grid;
pub mod peer;

pub use envelope::{CodecError, DeadNodes, Envelope, History};
pub use grid::{Board, Cell, Direction, Position};
pub use peer::{Peer, PeerId, RosterEntry};
