use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};

use super::update::DocumentUpdate;
use crate::config::SessionSettings;
use crate::editor::EditorSurface;
use crate::error::TransportError;

/// Peer side of sync: snapshots the active document on a fixed cadence and
/// posts it to the chosen host. Fire and forget; the next tick supersedes
/// whatever failed.
#[derive(Clone)]
pub struct SyncPublisher {
    client: Client,
    host: Ipv4Addr,
    port: u16,
    settings: SessionSettings,
}

impl SyncPublisher {
    pub fn new(
        host: Ipv4Addr,
        port: u16,
        settings: SessionSettings,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            host,
            port,
            settings,
        })
    }

    pub fn host(&self) -> Ipv4Addr {
        self.host
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Post a single update and wait for the host's answer
    pub async fn publish(&self, update: &DocumentUpdate) -> Result<(), TransportError> {
        let url = update.url(self.host, self.port)?;

        let response = self
            .client
            .post(url.clone())
            .headers(update.headers())
            .body(update.content.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(())
    }

    /// Snapshot the editor and package it. `None` when nothing is open.
    pub fn snapshot(&self, editor: &dyn EditorSurface) -> Option<DocumentUpdate> {
        let doc = editor.active_document()?;
        DocumentUpdate::from_snapshot(&self.settings, doc)
    }

    /// [`SyncPublisher::snapshot`] on the blocking pool, since editors may
    /// read from disk.
    async fn snapshot_blocking(&self, editor: Arc<dyn EditorSurface>) -> Option<DocumentUpdate> {
        let publisher = self.clone();
        match tokio::task::spawn_blocking(move || publisher.snapshot(editor.as_ref())).await {
            Ok(update) => update,
            Err(err) => {
                tracing::warn!(error = %err, "snapshot task failed");
                None
            }
        }
    }

    /// Tick every `every` until shut down. Each tick's snapshot and send run
    /// as their own task so a slow host or disk never holds back the next
    /// tick; work still in flight is aborted on shutdown.
    pub async fn run(
        self,
        editor: Arc<dyn EditorSurface>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight = JoinSet::new();

        tracing::info!(host = %self.host, port = self.port, session = %self.settings.name, "publishing");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    while in_flight.try_join_next().is_some() {}

                    let publisher = self.clone();
                    let editor = editor.clone();
                    in_flight.spawn(async move {
                        let Some(update) = publisher.snapshot_blocking(editor).await else {
                            return;
                        };
                        if let Err(err) = publisher.publish(&update).await {
                            tracing::warn!(file = %update.file_name, error = %err, "update not delivered");
                        }
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        in_flight.abort_all();
        tracing::debug!(host = %self.host, "publisher stopped");
    }
}
