//! Console steering: one command per line on stdin

use crate::network::Node;
use log::{info, warn};
use shared::Direction;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Maps a typed command to a heading
///
/// Accepts WASD and the spelled-out directions, case-insensitive.
pub fn parse_command(line: &str) -> Option<Direction> {
    match line.trim().to_ascii_lowercase().as_str() {
        "w" | "up" => Some(Direction::Up),
        "s" | "down" => Some(Direction::Down),
        "a" | "left" => Some(Direction::Left),
        "d" | "right" => Some(Direction::Right),
        _ => None,
    }
}

/// Reads stdin until EOF and steers `node` with every recognised command
pub async fn run_console(node: Node) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Steer with w/a/s/d or up/down/left/right, then Enter");

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read console input: {}", e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Some(heading) => {
                if !node.change_direction(heading).await {
                    info!("Ignored {}, heading unchanged or peer out", heading);
                }
            }
            None => warn!("Unknown command {:?}", line.trim()),
        }
    }

    info!("Console input closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wasd_commands() {
        assert_eq!(parse_command("w"), Some(Direction::Up));
        assert_eq!(parse_command("a"), Some(Direction::Left));
        assert_eq!(parse_command("s"), Some(Direction::Down));
        assert_eq!(parse_command("d"), Some(Direction::Right));
    }

    #[test]
    fn test_words_and_whitespace() {
        assert_eq!(parse_command("  Left \n"), Some(Direction::Left));
        assert_eq!(parse_command("UP"), Some(Direction::Up));
    }

    #[test]
    fn test_unknown_commands() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("jump"), None);
        assert_eq!(parse_command("wa"), None);
    }
}
