//! Fixed-step movement and collision simulation
//!
//! Every tick each peer moves one cell along its heading. Peers are evaluated
//! sequentially in roster order and later peers see the board changes made by
//! earlier ones in the same tick. This keeps tick outcomes reproducible; it is
//! not a fairness guarantee for head-on meetings.

use log::debug;
use shared::{Board, Cell, Peer, PeerId, Position};

/// A peer that could not move this tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub id: PeerId,
    /// Cell the peer stays on, now marked `Dead`
    pub position: Position,
}

/// Advances every non-frozen peer by one cell
///
/// For each peer the current cell first becomes `Trail`. The candidate cell
/// is one step along the heading, clamped to the board. If the candidate is
/// occupied by any marker (which includes the peer's own cell when it is
/// pinned against a wall) the peer stays put and its cell becomes `Dead`.
/// Otherwise the candidate becomes `Head` and the peer moves there.
pub fn advance<F>(board: &mut Board, peers: &mut [Peer], is_frozen: F) -> Vec<Collision>
where
    F: Fn(&PeerId) -> bool,
{
    let size = board.size();
    let mut collisions = Vec::new();

    for peer in peers.iter_mut() {
        if is_frozen(&peer.id) {
            continue;
        }

        let current = peer.position;
        board.set(current, Cell::Trail(peer.id.clone()));

        let candidate = current.step(peer.heading, size);
        if board.is_occupied(candidate) {
            debug!("{} collided at {} heading {}", peer.id, current, peer.heading);
            board.set(current, Cell::Dead(peer.id.clone()));
            collisions.push(Collision {
                id: peer.id.clone(),
                position: current,
            });
        } else {
            board.set(candidate, Cell::Head(peer.id.clone()));
            peer.position = candidate;
        }
    }

    collisions
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Direction;

    fn peer(id: &str, x: usize, y: usize, heading: Direction) -> Peer {
        Peer::new(
            PeerId::from(id),
            "127.0.0.1:9000".parse().unwrap(),
            Position::new(x, y),
            heading,
        )
    }

    fn id(name: &str) -> PeerId {
        PeerId::from(name)
    }

    #[test]
    fn test_free_move_leaves_trail() {
        let mut board = Board::new(10);
        let mut peers = vec![peer("p1", 1, 1, Direction::Right)];

        let collisions = advance(&mut board, &mut peers, |_| false);

        assert!(collisions.is_empty());
        assert_eq!(peers[0].position, Position::new(2, 1));
        assert_eq!(board.get(Position::new(1, 1)), Some(&Cell::Trail(id("p1"))));
        assert_eq!(board.get(Position::new(2, 1)), Some(&Cell::Head(id("p1"))));
    }

    #[test]
    fn test_position_after_n_free_ticks() {
        let mut board = Board::new(10);
        let mut peers = vec![peer("p1", 0, 5, Direction::Right)];

        for _ in 0..6 {
            assert!(advance(&mut board, &mut peers, |_| false).is_empty());
        }

        assert_eq!(peers[0].position, Position::new(6, 5));
        assert_eq!(board.occupied_count(), 7);
    }

    #[test]
    fn test_position_follows_heading_history_up_to_the_wall() {
        use Direction::*;

        let size = 10;
        let mut board = Board::new(size);
        let mut peers = vec![peer("p1", 2, 2, Right)];
        let mut expected = peers[0].position;

        let turns = [(Right, 3), (Down, 4), (Left, 3), (Up, 2), (Left, 2)];
        for (heading, ticks) in turns {
            peers[0].heading = heading;
            for _ in 0..ticks {
                assert!(advance(&mut board, &mut peers, |_| false).is_empty());
                expected = expected.step(heading, size);
            }
        }
        assert_eq!(expected, Position::new(0, 4));
        assert_eq!(peers[0].position, expected);
        assert_eq!(board.occupied_count(), 15);

        // One more step left is clamped onto the same cell
        let collisions = advance(&mut board, &mut peers, |_| false);
        assert_eq!(expected.step(Left, size), expected);
        assert_eq!(collisions.len(), 1);
        assert_eq!(peers[0].position, expected);
        assert_eq!(board.get(expected), Some(&Cell::Dead(id("p1"))));
    }

    #[test]
    fn test_occupied_candidate_blocks_and_kills_once() {
        let mut board = Board::new(10);
        board.set(Position::new(4, 4), Cell::Trail(id("p9")));
        let mut peers = vec![peer("p1", 3, 4, Direction::Right)];

        let collisions = advance(&mut board, &mut peers, |_| false);

        assert_eq!(
            collisions,
            vec![Collision {
                id: id("p1"),
                position: Position::new(3, 4),
            }]
        );
        assert_eq!(peers[0].position, Position::new(3, 4));
        assert_eq!(board.get(Position::new(3, 4)), Some(&Cell::Dead(id("p1"))));
        assert_eq!(board.get(Position::new(4, 4)), Some(&Cell::Trail(id("p9"))));
    }

    #[test]
    fn test_wall_pins_peer_in_place() {
        let mut board = Board::new(10);
        let mut peers = vec![peer("p1", 9, 2, Direction::Right)];

        let collisions = advance(&mut board, &mut peers, |_| false);

        assert_eq!(collisions.len(), 1);
        assert_eq!(peers[0].position, Position::new(9, 2));
        assert_eq!(board.get(Position::new(9, 2)), Some(&Cell::Dead(id("p1"))));
    }

    #[test]
    fn test_own_trail_counts_as_obstacle() {
        let mut board = Board::new(10);
        let mut peers = vec![peer("p1", 5, 5, Direction::Right)];
        advance(&mut board, &mut peers, |_| false);

        peers[0].heading = Direction::Left;
        let collisions = advance(&mut board, &mut peers, |_| false);

        assert_eq!(collisions.len(), 1);
        assert_eq!(peers[0].position, Position::new(6, 5));
    }

    #[test]
    fn test_earlier_peer_claims_contested_cell() {
        // Both want (5, 5); p1 is first in roster order and wins it
        let mut board = Board::new(10);
        let mut peers = vec![
            peer("p1", 4, 5, Direction::Right),
            peer("p2", 6, 5, Direction::Left),
        ];

        let collisions = advance(&mut board, &mut peers, |_| false);

        assert_eq!(peers[0].position, Position::new(5, 5));
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].id, id("p2"));
        assert_eq!(board.get(Position::new(6, 5)), Some(&Cell::Dead(id("p2"))));
    }

    #[test]
    fn test_frozen_peers_are_skipped() {
        let mut board = Board::new(10);
        board.set(Position::new(2, 2), Cell::Dead(id("p1")));
        let mut peers = vec![peer("p1", 2, 2, Direction::Down)];

        let collisions = advance(&mut board, &mut peers, |peer| peer == &id("p1"));

        assert!(collisions.is_empty());
        assert_eq!(peers[0].position, Position::new(2, 2));
        assert_eq!(board.get(Position::new(2, 2)), Some(&Cell::Dead(id("p1"))));
        assert_eq!(board.occupied_count(), 1);
    }
}
