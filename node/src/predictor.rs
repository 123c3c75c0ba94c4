//! Dead reckoning of remote peers between two announced fixes
//!
//! Peers broadcast far less often than the board ticks. When a direction
//! change arrives, the path the peer must have taken since its last known
//! fix is drawn as trail so every follower renders a believable history.

use log::debug;
use shared::{Board, Cell, Direction, Peer, Position};

/// Moves `peer` from its last known fix to the newly announced `fix`
///
/// Starting at the old position the path first follows the axis of the old
/// heading until that coordinate matches, then the other axis. This covers a
/// direct run as well as a single missed turn. Every cell left behind is
/// marked `Trail`, the new position `Head`, and the new heading is adopted.
///
/// The local tick may have carried the peer past the point where it really
/// turned. When the first leg runs against the old heading, those cells were
/// never occupied: any marker of this peer on them is cleared instead of
/// being drawn as trail.
///
/// If both fixes share a position only the heading changes. A fix outside
/// the board is ignored. Returns the cells marked as trail.
pub fn reckon(board: &mut Board, peer: &mut Peer, fix: &Peer) -> Vec<Position> {
    if !board.contains(fix.position) {
        return Vec::new();
    }

    if peer.position == fix.position {
        peer.heading = fix.heading;
        return Vec::new();
    }

    let target = fix.position;
    let mut cursor = peer.position;
    let mut path = Vec::new();
    let mut overshot = Vec::new();

    let first_horizontal = peer.heading.is_horizontal();
    let backtracking = runs_against(peer.heading, cursor, target);

    for horizontal in [first_horizontal, !first_horizontal] {
        let leg = if horizontal == first_horizontal && backtracking {
            &mut overshot
        } else {
            &mut path
        };

        if horizontal {
            while cursor.x != target.x {
                leg.push(cursor);
                cursor.x = toward(cursor.x, target.x);
            }
        } else {
            while cursor.y != target.y {
                leg.push(cursor);
                cursor.y = toward(cursor.y, target.y);
            }
        }
    }

    for pos in &overshot {
        let predicted = matches!(
            board.get(*pos),
            Some(Cell::Trail(id)) | Some(Cell::Head(id)) if *id == peer.id
        );
        if predicted {
            board.set(*pos, Cell::Empty);
        }
    }
    for pos in &path {
        board.set(*pos, Cell::Trail(peer.id.clone()));
    }
    board.set(target, Cell::Head(peer.id.clone()));

    if !overshot.is_empty() {
        debug!(
            "{} was predicted {} cells past its turn, cleared them",
            peer.id,
            overshot.len()
        );
    }

    peer.position = target;
    peer.heading = fix.heading;
    path
}

/// True when reaching `target` along the axis of `heading` means moving
/// backwards
fn runs_against(heading: Direction, from: Position, to: Position) -> bool {
    match heading {
        Direction::Right => to.x < from.x,
        Direction::Left => to.x > from.x,
        Direction::Down => to.y < from.y,
        Direction::Up => to.y > from.y,
    }
}

fn toward(from: usize, to: usize) -> usize {
    if from < to {
        from + 1
    } else {
        from - 1
    }
}
