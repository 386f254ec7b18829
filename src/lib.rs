//! # lan-share - live document sharing on a local network
//!
//! One participant hosts a named session; peers on the same LAN discover it
//! and keep pushing their active document and cursor selection to it.
//!
//! ## Pieces
//!
//! - **Discovery**: the host broadcasts `Code Sharing Server <ip> <name>` once a
//!   second over UDP; peers listen until no new host has shown up for a full
//!   silence period and then choose one.
//! - **Sync**: peers POST full-document snapshots with the selection in headers;
//!   the host stores the newest file per (peer, file) and remembers the
//!   selection in a [`SessionRegistry`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lan_share::{Config, FsDocumentStore, HostAddrs, HostEndpoint, HostSession, SessionSettings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let endpoint = HostEndpoint::parse("192.168.1.20/24", None)?;
//!     let session = HostSession::start(
//!         &config,
//!         SessionSettings::new("algebra").with_password("p1"),
//!         HostAddrs::from_endpoint(&endpoint, config.port),
//!         Arc::new(FsDocumentStore::new(&config.session_root)),
//!         None,
//!     )
//!     .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod editor;
pub mod error;
pub mod net;
pub mod registry;
pub mod session;
pub mod storage;
pub mod sync;

// Re-export main types for library consumers
pub use config::{Config, SessionSettings, DEFAULT_PORT};
pub use discovery::{discover, select_session, CandidateSession, Selection, SessionAdvertisement};
pub use editor::{DocumentSnapshot, EditorSurface, FileEditor, OverlayRefresher};
pub use error::{ConfigError, ErrorCategory, ProtocolError, ShareError, TransportError};
pub use net::{HostEndpoint, InterfaceAddress};
pub use registry::{RegistryKey, SessionRegistry};
pub use session::{HostAddrs, HostSession, PeerSession};
pub use storage::{DocumentStore, FsDocumentStore};
pub use sync::{CursorSelection, DocumentUpdate, SyncPublisher};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
