//! Host and peer roles as owned, stoppable handles.
//!
//! Starting a role validates everything first and only then opens sockets,
//! so a configuration error never leaves half a session running. Stopping a
//! role (or dropping its handle) ends every timer it started and releases
//! every socket.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{Config, SessionSettings};
use crate::discovery::{AdvertisementBroadcaster, SessionAdvertisement};
use crate::editor::{EditorSurface, OverlayRefresher};
use crate::error::{ConfigError, Result};
use crate::net::HostEndpoint;
use crate::registry::SessionRegistry;
use crate::storage::DocumentStore;
use crate::sync::{ReceiverState, SyncPublisher, SyncReceiver};

/// How long `shutdown` waits for tasks before aborting them
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Resolves once `shutdown` holds `true` or its sender is gone
pub async fn stopped(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Sockets a host uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostAddrs {
    /// Address written into advertisements
    pub advertised: Ipv4Addr,
    /// Where advertisements are sent
    pub advertise_to: SocketAddr,
    /// Where the update endpoint listens
    pub listen: SocketAddr,
}

impl HostAddrs {
    /// Advertise to the subnet broadcast address and listen on the
    /// interface address, both on `port`.
    pub fn from_endpoint(endpoint: &HostEndpoint, port: u16) -> Self {
        Self {
            advertised: endpoint.ip,
            advertise_to: SocketAddr::V4(SocketAddrV4::new(endpoint.broadcast, port)),
            listen: SocketAddr::V4(SocketAddrV4::new(endpoint.ip, port)),
        }
    }
}

struct Tasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Tasks {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (shutdown, rx) = watch::channel(false);
        (
            Self {
                shutdown,
                handles: Vec::new(),
            },
            rx,
        )
    }

    async fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        let handles = std::mem::take(&mut self.handles);
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        if tokio::time::timeout(SHUTDOWN_GRACE, join_all(handles)).await.is_err() {
            tracing::warn!("tasks did not stop in time; aborting");
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

impl Drop for Tasks {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// A running host: advertiser, update endpoint and optional overlay refresh
pub struct HostSession {
    settings: SessionSettings,
    registry: Arc<SessionRegistry>,
    local_addr: SocketAddr,
    tasks: Tasks,
}

impl HostSession {
    pub async fn start(
        config: &Config,
        settings: SessionSettings,
        addrs: HostAddrs,
        store: Arc<dyn DocumentStore>,
        editor: Option<Arc<dyn EditorSurface>>,
    ) -> Result<Self> {
        config.validate()?;
        settings.validate()?;
        if addrs.advertised.is_unspecified() {
            return Err(ConfigError::InvalidHostAddress(addrs.advertised.to_string()).into());
        }

        let registry = Arc::new(SessionRegistry::new());
        let state = ReceiverState::new(
            settings.name.clone(),
            settings.password.clone(),
            registry.clone(),
            store,
        );

        let advertisement = SessionAdvertisement::new(addrs.advertised, settings.name.clone());
        let broadcaster = AdvertisementBroadcaster::bind(
            &advertisement,
            addrs.advertise_to,
            config.broadcast_interval(),
        )
        .await?;
        let receiver = SyncReceiver::bind(addrs.listen, state, config.max_body_bytes).await?;
        let local_addr = receiver.local_addr()?;

        let (mut tasks, rx) = Tasks::new();
        tasks.handles.push(tokio::spawn(broadcaster.run(rx.clone())));
        {
            let rx = rx.clone();
            tasks.handles.push(tokio::spawn(async move {
                if let Err(err) = receiver.run(rx).await {
                    tracing::error!(error = %err, "update endpoint failed");
                }
            }));
        }
        if let Some(editor) = editor {
            let refresher = OverlayRefresher::new(registry.clone(), editor, config.overlay_interval());
            tasks.handles.push(tokio::spawn(refresher.run(rx)));
        }

        tracing::info!(session = %settings.name, %local_addr, "hosting session");

        Ok(Self {
            settings,
            registry,
            local_addr,
            tasks,
        })
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Shared with whatever renders peer cursors
    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn shutdown(mut self) {
        self.tasks.stop().await;
        tracing::info!(session = %self.settings.name, "session closed");
    }
}

/// A running peer publishing to one host
pub struct PeerSession {
    host: Ipv4Addr,
    settings: SessionSettings,
    tasks: Tasks,
}

impl PeerSession {
    pub async fn start(
        config: &Config,
        settings: SessionSettings,
        host: Ipv4Addr,
        editor: Arc<dyn EditorSurface>,
    ) -> Result<Self> {
        Self::start_on(config, settings, host, config.port, editor).await
    }

    /// Same as [`PeerSession::start`] with an explicit host port
    pub async fn start_on(
        config: &Config,
        settings: SessionSettings,
        host: Ipv4Addr,
        port: u16,
        editor: Arc<dyn EditorSurface>,
    ) -> Result<Self> {
        config.validate()?;
        settings.validate()?;

        let publisher = SyncPublisher::new(host, port, settings.clone(), config.request_timeout())?;

        let (mut tasks, rx) = Tasks::new();
        tasks
            .handles
            .push(tokio::spawn(publisher.run(editor, config.publish_interval(), rx)));

        Ok(Self {
            host,
            settings,
            tasks,
        })
    }

    pub fn host(&self) -> Ipv4Addr {
        self.host
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub async fn shutdown(mut self) {
        self.tasks.stop().await;
        tracing::info!(host = %self.host, "left session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::HostEndpoint;

    #[test]
    fn test_host_addrs_from_endpoint() {
        let ep = HostEndpoint::parse("192.168.1.20/24", None).unwrap();
        let addrs = HostAddrs::from_endpoint(&ep, 9898);
        assert_eq!(addrs.advertised, Ipv4Addr::new(192, 168, 1, 20));
        assert_eq!(addrs.advertise_to, "192.168.1.255:9898".parse::<SocketAddr>().unwrap());
        assert_eq!(addrs.listen, "192.168.1.20:9898".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_stopped_resolves() {
        let (tx, rx) = watch::channel(false);
        let waiter = tokio::spawn(stopped(rx));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        let (tx, rx) = watch::channel(false);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), stopped(rx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_settings_start_nothing() {
        let store: Arc<dyn DocumentStore> = Arc::new(crate::storage::MemoryDocumentStore::new());
        let addrs = HostAddrs {
            advertised: Ipv4Addr::LOCALHOST,
            advertise_to: "127.0.0.1:9".parse().unwrap(),
            listen: "127.0.0.1:0".parse().unwrap(),
        };
        let err = HostSession::start(
            &Config::default(),
            SessionSettings::new("bad name"),
            addrs,
            store,
            None,
        )
        .await
        .err()
        .unwrap();
        assert!(err.is_fatal());
    }
}
