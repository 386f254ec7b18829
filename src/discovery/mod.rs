//! LAN session discovery: hosts advertise over UDP broadcast, peers listen
//! for a silence-bounded window and pick one of the sessions they heard.

pub mod advertisement;
pub mod broadcaster;
pub mod listener;

use std::net::SocketAddr;
use std::time::Duration;

pub use advertisement::{CandidateSession, SessionAdvertisement, MARKER};
pub use broadcaster::AdvertisementBroadcaster;
pub use listener::{select_session, Selection, SessionListener};

use crate::error::TransportError;

/// Listen on `port` for one discovery window and return what was heard.
pub async fn discover(port: u16, silence: Duration) -> Result<Vec<CandidateSession>, TransportError> {
    let listener = SessionListener::bind_port(port).await?;
    Ok(listener.collect(silence).await)
}

/// Listen on an explicit address; mostly useful off the well-known port.
pub async fn discover_on(
    addr: SocketAddr,
    silence: Duration,
) -> Result<Vec<CandidateSession>, TransportError> {
    let listener = SessionListener::bind(addr).await?;
    Ok(listener.collect(silence).await)
}
