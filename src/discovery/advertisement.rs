use std::fmt;
use std::net::Ipv4Addr;

use serde::Serialize;

use crate::error::ProtocolError;

/// Fixed prefix every discovery datagram starts with
pub const MARKER: &str = "Code Sharing Server";

/// Words in [`MARKER`]; the address and name follow at these indexes
const MARKER_WORDS: usize = 3;
const FIELDS_AFTER_MARKER: usize = 2;

/// What a host puts on the wire every broadcast tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAdvertisement {
    pub host_address: Ipv4Addr,
    pub session_name: String,
}

impl SessionAdvertisement {
    pub fn new(host_address: Ipv4Addr, session_name: impl Into<String>) -> Self {
        Self {
            host_address,
            session_name: session_name.into(),
        }
    }

    /// `Code Sharing Server <hostAddress> <sessionName>`
    pub fn encode(&self) -> String {
        format!("{MARKER} {} {}", self.host_address, self.session_name)
    }

    /// Parse by fixed index after splitting on single spaces. Anything that
    /// does not have exactly the marker words plus two fields is rejected.
    pub fn parse(datagram: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(datagram).map_err(|_| ProtocolError::NotUtf8)?;
        let text = text.trim_end_matches(['\r', '\n', '\0']);
        let fields: Vec<&str> = text.split(' ').collect();

        if fields.len() < MARKER_WORDS || fields[..MARKER_WORDS].join(" ") != MARKER {
            return Err(ProtocolError::MissingMarker);
        }

        let rest = &fields[MARKER_WORDS..];
        if rest.len() != FIELDS_AFTER_MARKER || rest.iter().any(|f| f.is_empty()) {
            return Err(ProtocolError::FieldCount {
                expected: FIELDS_AFTER_MARKER,
                found: rest.iter().filter(|f| !f.is_empty()).count(),
            });
        }

        let host_address = rest[0]
            .parse()
            .map_err(|_| ProtocolError::BadHostAddress(rest[0].to_string()))?;

        Ok(Self::new(host_address, rest[1]))
    }
}

impl fmt::Display for SessionAdvertisement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// A session seen during one discovery window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateSession {
    pub host_address: Ipv4Addr,
    pub session_name: String,
}

impl From<SessionAdvertisement> for CandidateSession {
    fn from(ad: SessionAdvertisement) -> Self {
        Self {
            host_address: ad.host_address,
            session_name: ad.session_name,
        }
    }
}

impl fmt::Display for CandidateSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.host_address, self.session_name)
    }
}
