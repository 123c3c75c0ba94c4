//! One-way notifications for whatever presents the simulation

use log::debug;
use serde::Serialize;
use shared::{Board, PeerId};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum SimEvent {
    /// The local peer collided
    LocalDeath { id: PeerId },
    /// The board changed; carries the full current board
    BoardUpdated(Board),
    /// The alive tally reached one
    Victory,
}

pub type EventSender = mpsc::UnboundedSender<SimEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SimEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Fire-and-forget delivery. Nobody listening is not an error.
pub fn emit(sender: &EventSender, event: SimEvent) {
    if sender.send(event).is_err() {
        debug!("Simulation event dropped, no receiver attached");
    }
}
