use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use super::advertisement::SessionAdvertisement;
use crate::error::TransportError;

/// Host side of discovery: one advertisement datagram per tick, no acks.
pub struct AdvertisementBroadcaster {
    socket: UdpSocket,
    target: SocketAddr,
    payload: String,
    every: Duration,
}

impl AdvertisementBroadcaster {
    /// Bind an ephemeral socket with broadcast enabled, aimed at `target`.
    pub async fn bind(
        advertisement: &SessionAdvertisement,
        target: SocketAddr,
        every: Duration,
    ) -> Result<Self, TransportError> {
        let local = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| TransportError::Bind { addr: local, source })?;
        socket.set_broadcast(true)?;

        Ok(Self {
            socket,
            target,
            payload: advertisement.encode(),
            every,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub async fn send_once(&self) -> Result<(), TransportError> {
        self.socket
            .send_to(self.payload.as_bytes(), self.target)
            .await
            .map(|_| ())
            .map_err(|source| TransportError::Datagram {
                target: self.target,
                source,
            })
    }

    /// Tick until `shutdown` flips to true or its sender goes away. Failed
    /// sends are logged and the next tick tries again.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(target = %self.target, payload = %self.payload, "advertising session");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.send_once().await {
                        tracing::warn!(error = %err, "advertisement not sent");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::debug!(target = %self.target, "advertiser stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sends_one_datagram_per_tick() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = receiver.local_addr().unwrap();
        let every = Duration::from_millis(100);

        let ad = SessionAdvertisement::new(Ipv4Addr::new(10, 0, 0, 9), "lab");
        let broadcaster = AdvertisementBroadcaster::bind(&ad, target, every).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(broadcaster.run(rx));

        // first tick fires at once, then one per interval: 0, 100, ..., 500
        let deadline = tokio::time::Instant::now() + Duration::from_millis(550);
        let mut buf = [0u8; 256];
        let mut count = 0;
        while let Ok(received) = tokio::time::timeout_at(deadline, receiver.recv_from(&mut buf)).await {
            let (n, _) = received.unwrap();
            assert_eq!(SessionAdvertisement::parse(&buf[..n]).unwrap(), ad);
            count += 1;
        }
        assert!((5..=7).contains(&count), "got {count} datagrams");

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
