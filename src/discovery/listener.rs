use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

use super::advertisement::{CandidateSession, SessionAdvertisement};
use crate::error::{ConfigError, TransportError};

const MAX_DATAGRAM: usize = 1024;

/// Peer side of discovery. Collects advertisements until the wire has been
/// quiet, with respect to new hosts, for a full silence period.
pub struct SessionListener {
    socket: UdpSocket,
}

impl SessionListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        Ok(Self { socket })
    }

    /// Bind the wildcard address on the discovery port
    pub async fn bind_port(port: u16) -> Result<Self, TransportError> {
        Self::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Run one discovery window. Every previously unseen host address pushes
    /// the deadline out by `silence`; repeats from a known host do not. The
    /// socket is closed when this returns.
    pub async fn collect(self, silence: Duration) -> Vec<CandidateSession> {
        let mut seen: HashSet<Ipv4Addr> = HashSet::new();
        let mut candidates = Vec::new();
        let mut deadline = Instant::now() + silence;
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let (len, from) = match timeout_at(deadline, self.socket.recv_from(&mut buf)).await {
                Err(_) => break,
                Ok(Ok(received)) => received,
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "discovery receive failed");
                    continue;
                }
            };

            let ad = match SessionAdvertisement::parse(&buf[..len]) {
                Ok(ad) => ad,
                Err(err) => {
                    tracing::debug!(%from, error = %err, "ignoring datagram");
                    continue;
                }
            };

            if seen.insert(ad.host_address) {
                tracing::info!(host = %ad.host_address, session = %ad.session_name, "found session");
                candidates.push(CandidateSession::from(ad));
                deadline = Instant::now() + silence;
            }
        }

        tracing::debug!(found = candidates.len(), "discovery window closed");
        candidates
    }
}

/// How the user resolved the candidate list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Pick the candidate advertising this session name
    ByName(String),
    /// Ignore the list and use a typed address
    Manual(String),
    /// Take the first candidate found
    First,
}

/// Resolve `selection` against what discovery found. Returns `None` when the
/// user has to fall back to typing an address.
pub fn select_session(
    candidates: &[CandidateSession],
    selection: &Selection,
) -> Result<Option<Ipv4Addr>, ConfigError> {
    match selection {
        Selection::ByName(name) => Ok(candidates
            .iter()
            .find(|c| &c.session_name == name)
            .map(|c| c.host_address)),
        Selection::First => Ok(candidates.first().map(|c| c.host_address)),
        Selection::Manual(addr) => addr
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidHostAddress(addr.clone())),
    }
}
