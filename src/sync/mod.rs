//! Document/cursor synchronisation from peers to the host.
//!
//! Each peer posts a full snapshot of its active document on a fixed cadence;
//! the host keeps the newest one per (peer, file). There is no diffing and no
//! back-channel.

pub mod publisher;
pub mod receiver;
pub mod update;

pub use publisher::SyncPublisher;
pub use receiver::{ReceiveOutcome, ReceiverState, SyncReceiver, ACK_BODY};
pub use update::{file_name_of, CursorSelection, DocumentUpdate, UpdateRoute};
