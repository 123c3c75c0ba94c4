//! Leader-side trail aggregation and follower-side board reconstruction

use log::debug;
use shared::{Board, Cell, History, PeerId, Position};

/// Appends a reported position to a peer's trail
///
/// Only the current leader calls this. Consecutive duplicates are kept; they
/// render to the same cells.
pub fn record(history: &mut History, id: &PeerId, position: Position) {
    let trail = history.entry(id.clone()).or_default();
    trail.push(position);
    debug!("History of {} now holds {} positions", id, trail.len());
}

/// Replaces a cached history with the leader's copy
///
/// Last writer wins; there is no merge with what was cached before.
pub fn replace(cached: &mut History, received: History) {
    *cached = received;
}

/// Paints every trail of `history` onto `board`
///
/// All but the last position of a trail become `Trail`, the last becomes
/// `Head`. Cells not mentioned by the history are left as they are, so
/// locally simulated trails survive, and a peer's own `Dead` marker is never
/// painted over. Positions outside the board are skipped. Applying the same
/// history twice yields the same board.
pub fn overlay(board: &mut Board, history: &History) {
    for (id, trail) in history {
        let Some((head, body)) = trail.split_last() else {
            continue;
        };

        for pos in body {
            paint(board, *pos, Cell::Trail(id.clone()));
        }
        paint(board, *head, Cell::Head(id.clone()));
    }
}

fn paint(board: &mut Board, pos: Position, cell: Cell) {
    let is_own_wreck =
        matches!(board.get(pos), Some(Cell::Dead(dead)) if Some(dead) == cell.owner());
    if !is_own_wreck {
        board.set(pos, cell);
    }
}
