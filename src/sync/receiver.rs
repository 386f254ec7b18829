use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use super::update::{CursorSelection, UpdateRoute, HEADER_PASSWORD};
use crate::error::{ProtocolError, TransportError};
use crate::registry::{RegistryKey, SessionRegistry};
use crate::storage::{DocumentPath, DocumentStore};

/// Body of every 200 the receiver sends
pub const ACK_BODY: &str = "Post Received";

/// What happened to an update that made it past parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Accepted,
    /// Password mismatch. The peer still sees a 200.
    Rejected,
}

/// Host side of sync: stores the newest snapshot and selection per document
#[derive(Clone)]
pub struct ReceiverState {
    session_name: String,
    password: Option<String>,
    registry: Arc<SessionRegistry>,
    store: Arc<dyn DocumentStore>,
}

impl ReceiverState {
    pub fn new(
        session_name: impl Into<String>,
        password: Option<String>,
        registry: Arc<SessionRegistry>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            session_name: session_name.into(),
            password,
            registry,
            store,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Plain string equality against the configured password. This is not
    /// constant-time and the caller answers 200 either way.
    fn authenticate(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.password else {
            return true;
        };
        headers
            .get(HEADER_PASSWORD)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|given| given == expected.as_str())
    }

    /// Apply one update. The body is the whole new document.
    pub async fn receive(
        &self,
        route: UpdateRoute,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<ReceiveOutcome, ReceiveError> {
        if route.session != self.session_name {
            return Err(ProtocolError::UnknownSession(route.session).into());
        }

        // Malformed requests fail the same way whatever the password says.
        let selection = CursorSelection::from_headers(headers)?;

        if !self.authenticate(headers) {
            tracing::warn!(
                session = %route.session,
                peer = route.peer.as_deref().unwrap_or("-"),
                file = %route.file_name,
                "dropping update with wrong or missing password"
            );
            return Ok(ReceiveOutcome::Rejected);
        }

        let path = DocumentPath::new(route.session, route.peer, route.file_name);
        let store = self.store.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || store.write(&target, &body))
            .await
            .map_err(|err| TransportError::Store {
                path: path.to_string(),
                reason: format!("store task failed: {err}"),
            })?
            .map_err(|err| TransportError::Store {
                path: path.to_string(),
                reason: format!("{err:#}"),
            })?;

        self.registry
            .upsert(RegistryKey::new(path.peer.clone(), path.file_name.clone()), selection);

        tracing::debug!(document = %path, %selection, "stored update");
        Ok(ReceiveOutcome::Accepted)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl IntoResponse for ReceiveError {
    fn into_response(self) -> Response {
        match self {
            ReceiveError::Protocol(err) => err.into_response(),
            ReceiveError::Transport(err) => {
                tracing::error!(error = %err, "failed to persist update");
                (StatusCode::INTERNAL_SERVER_ERROR, "Store Failed").into_response()
            }
        }
    }
}

fn acknowledge() -> Response {
    (StatusCode::OK, Html(ACK_BODY)).into_response()
}

async fn apply(
    state: ReceiverState,
    route: Result<UpdateRoute, ProtocolError>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let route = match route {
        Ok(route) => route,
        Err(err) => return err.into_response(),
    };
    match state.receive(route, &headers, body).await {
        Ok(_) => acknowledge(),
        Err(err) => err.into_response(),
    }
}

async fn post_single(
    State(state): State<ReceiverState>,
    Path((session, file_name)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    apply(state, UpdateRoute::new(session, None, file_name), headers, body).await
}

async fn post_peer(
    State(state): State<ReceiverState>,
    Path((session, peer, file_name)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    apply(state, UpdateRoute::new(session, Some(peer), file_name), headers, body).await
}

/// Routes for the update endpoint. Only POST is routed on update paths;
/// other methods get axum's 405.
pub fn router(state: ReceiverState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/{session}/{file}", post(post_single))
        .route("/{session}/{peer}/{file}", post(post_peer))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct SyncReceiver {
    listener: TcpListener,
    router: Router,
}

impl SyncReceiver {
    pub async fn bind(
        addr: SocketAddr,
        state: ReceiverState,
        max_body_bytes: usize,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        Ok(Self {
            listener,
            router: router(state, max_body_bytes),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` flips to true or its sender goes away
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), TransportError> {
        let addr = self.listener.local_addr()?;
        tracing::info!(%addr, "accepting updates");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(crate::session::stopped(shutdown))
            .await?;

        tracing::debug!(%addr, "receiver stopped");
        Ok(())
    }
}
