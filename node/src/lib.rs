//! # Light Trail Race Node
//!
//! Every participant of a race runs one node. There is no dedicated server:
//! peers gossip their positions over UDP and one of them, the leader, folds
//! what it hears into an authoritative history that everyone else adopts.
//!
//! ## Core Responsibilities
//!
//! ### Membership and Leadership
//! The session starts from a fixed roster. Roster order is the leadership
//! order; whoever sits at index 0 leads. Peers that stay silent longer than
//! the failure threshold are evicted, which promotes the next peer in order
//! without any election round.
//!
//! ### History Aggregation
//! The leader appends every reported position to the sender's trail and
//! broadcasts the full trail map together with the set of evicted peers.
//! Followers replace their cached map wholesale and overlay it on the board.
//!
//! ### Local Simulation
//! Each node advances all peers one cell per tick on its own clock. A peer
//! that reports a turn is first dead-reckoned onto the reported position so
//! a late message does not leave gaps in its trail.
//!
//! ## Architecture Design
//!
//! ### Shared State
//! Membership, board, history and the dead-node set live in a single
//! [`state::SessionState`] behind one async read-write lock. Every loop takes
//! the lock for the duration of one step and releases it before touching the
//! network.
//!
//! ### Four Loops
//! [`network::Node::start`] spawns:
//! - **Listen**: decodes inbound envelopes and applies them to the state
//! - **Broadcast**: sends the local snapshot, or the aggregated state when leading
//! - **Tick**: runs the collision simulator on a fixed period
//! - **Failure detector**: evicts silent peers once per broadcast interval
//!
//! Sends are detached per destination, so an unreachable peer never delays
//! the loop that produced the message.
//!
//! ## Module Organization
//!
//! - `config`: session timing, grid geometry and spawn table
//! - `membership`: ordered roster with last-seen clocks
//! - `aggregator`: leader-side history bookkeeping and board overlay
//! - `predictor`: dead reckoning for reported turns
//! - `simulator`: per-tick movement and collisions
//! - `state`: the shared session state and its message handlers
//! - `transport`: UDP socket, receive queue and simulated loss
//! - `network`: the node and its loops
//! - `events`: notifications for a presentation layer
//! - `input`: console steering
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use node::config::SessionConfig;
//! use node::events;
//! use node::network::Node;
//! use node::transport::GossipTransport;
//! use shared::RosterEntry;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let roster: Vec<RosterEntry> = vec![
//!         "p1=127.0.0.1:9001".parse()?,
//!         "p2=127.0.0.1:9002".parse()?,
//!     ];
//!
//!     let transport = GossipTransport::bind("127.0.0.1:9001".parse()?, 0.0).await?;
//!     let (tx, mut rx) = events::channel();
//!     let handle = Node::bootstrap(SessionConfig::default(), &roster, transport, tx)?.start();
//!
//!     while let Some(event) = rx.recv().await {
//!         println!("{:?}", event);
//!     }
//!
//!     handle.shutdown();
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod config;
pub mod error;
pub mod events;
pub mod input;
pub mod membership;
pub mod network;
pub mod predictor;
pub mod simulator;
pub mod state;
pub mod transport;
