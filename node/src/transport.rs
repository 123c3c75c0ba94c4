//! Unreliable datagram transport between peers
//!
//! One UDP socket per node is used for both directions, so the source address
//! of every datagram is the sender's roster endpoint. Nothing here orders,
//! acknowledges or retransmits; callers must tolerate loss and reordering.

use crate::error::NodeError;
use log::{debug, error, info, warn};
use rand::Rng;
use shared::{CodecError, Envelope, PeerId};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// Raw payload as it came off the socket
#[derive(Debug, Clone)]
pub struct Datagram {
    pub bytes: Vec<u8>,
    pub from: SocketAddr,
}

pub struct GossipTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    loss_rate: f64,
}

impl GossipTransport {
    /// Binds the listening endpoint
    ///
    /// `loss_rate` is the probability of silently dropping each outbound
    /// datagram, clamped into `[0, 1]`.
    pub async fn bind(addr: SocketAddr, loss_rate: f64) -> Result<Self, NodeError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| NodeError::Bind { addr, source })?;
        let local_addr = socket.local_addr()?;
        info!("Listening for peers on {}", local_addr);

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            loss_rate: loss_rate.clamp(0.0, 1.0),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the task that drains the socket into an unbounded queue
    ///
    /// Receive errors are logged and the task keeps reading. It stops once the
    /// returned receiver is dropped.
    pub fn spawn_receiver(&self) -> (JoinHandle<()>, mpsc::UnboundedReceiver<Datagram>) {
        let socket = Arc::clone(&self.socket);
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, from)) => {
                        let datagram = Datagram {
                            bytes: buffer[..len].to_vec(),
                            from,
                        };
                        if tx.send(datagram).is_err() {
                            debug!("Inbox closed, stopping receiver");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });

        (handle, rx)
    }

    /// Sends `envelope` to every destination
    ///
    /// The payload is encoded once, then each destination gets its own
    /// detached send task so a slow or failing peer never holds up the
    /// others. Per-destination failures are logged by the task. Returns the
    /// number of sends queued.
    pub fn broadcast(
        &self,
        envelope: &Envelope,
        destinations: &[(PeerId, SocketAddr)],
    ) -> Result<usize, CodecError> {
        let payload: Arc<[u8]> = envelope.encode()?.into();
        let mut queued = 0;

        for (id, addr) in destinations {
            if self.should_drop() {
                debug!("Simulated loss of {} to {}", envelope.kind(), id);
                continue;
            }

            let socket = Arc::clone(&self.socket);
            let payload = Arc::clone(&payload);
            let id = id.clone();
            let addr = *addr;
            let kind = envelope.kind();

            tokio::spawn(async move {
                if let Err(e) = socket.send_to(&payload, addr).await {
                    error!("Failed to send {} to {} at {}: {}", kind, id, addr, e);
                }
            });
            queued += 1;
        }

        Ok(queued)
    }

    fn should_drop(&self) -> bool {
        self.loss_rate > 0.0 && rand::thread_rng().gen_bool(self.loss_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Direction, Peer, Position};
    use tokio::time::timeout;

    fn update_from(addr: SocketAddr) -> Envelope {
        Envelope::Update {
            sender: Peer::new(PeerId::from("p1"), addr, Position::new(1, 1), Direction::Right),
        }
    }

    async fn loopback(loss_rate: f64) -> GossipTransport {
        GossipTransport::bind("127.0.0.1:0".parse().unwrap(), loss_rate)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_broadcast_reaches_receiver() {
        let sender = loopback(0.0).await;
        let receiver = loopback(0.0).await;
        let (_task, mut inbox) = receiver.spawn_receiver();

        let envelope = update_from(sender.local_addr());
        let queued = sender
            .broadcast(&envelope, &[(PeerId::from("p2"), receiver.local_addr())])
            .unwrap();
        assert_eq!(queued, 1);

        let datagram = timeout(Duration::from_secs(2), inbox.recv())
            .await
            .expect("datagram should arrive")
            .unwrap();
        assert_eq!(datagram.from, sender.local_addr());
        assert_eq!(Envelope::decode(&datagram.bytes).unwrap(), envelope);
    }

    #[tokio::test]
    async fn test_one_bad_destination_does_not_block_others() {
        let sender = loopback(0.0).await;
        let receiver = loopback(0.0).await;
        let (_task, mut inbox) = receiver.spawn_receiver();

        let unreachable: SocketAddr = "[::1]:9".parse().unwrap();
        let destinations = vec![
            (PeerId::from("ghost"), unreachable),
            (PeerId::from("p2"), receiver.local_addr()),
        ];

        let queued = sender
            .broadcast(&update_from(sender.local_addr()), &destinations)
            .unwrap();
        assert_eq!(queued, 2);

        let datagram = timeout(Duration::from_secs(2), inbox.recv()).await;
        assert!(datagram.is_ok(), "healthy peer should still receive");
    }

    #[tokio::test]
    async fn test_receiver_survives_malformed_payloads() {
        let receiver = loopback(0.0).await;
        let (_task, mut inbox) = receiver.spawn_receiver();

        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        raw.send_to(b"definitely not an envelope", receiver.local_addr())
            .await
            .unwrap();
        raw.send_to(b"{}", receiver.local_addr()).await.unwrap();

        let first = timeout(Duration::from_secs(2), inbox.recv()).await.unwrap().unwrap();
        let second = timeout(Duration::from_secs(2), inbox.recv()).await.unwrap().unwrap();
        assert!(Envelope::decode(&first.bytes).is_err());
        assert!(Envelope::decode(&second.bytes).is_err());
    }

    #[test]
    fn test_full_loss_queues_nothing() {
        tokio_test::block_on(async {
            let sender = loopback(1.0).await;
            let queued = sender
                .broadcast(
                    &update_from(sender.local_addr()),
                    &[(PeerId::from("p2"), "127.0.0.1:9".parse().unwrap())],
                )
                .unwrap();
            assert_eq!(queued, 0);
        });
    }

    #[test]
    fn test_bind_conflict_is_reported() {
        tokio_test::block_on(async {
            let first = loopback(0.0).await;
            let result = GossipTransport::bind(first.local_addr(), 0.0).await;
            assert!(matches!(result, Err(NodeError::Bind { .. })));
        });
    }
}
