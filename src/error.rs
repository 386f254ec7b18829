//! Error taxonomy for sessions, discovery and sync.
//!
//! Errors fall into four categories. Only configuration errors are fatal:
//! they stop a role from starting. Everything else is logged by the
//! periodic task that hit it and the next tick carries on.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Crate-wide result type
pub type Result<T, E = ShareError> = std::result::Result<T, E>;

/// Problems with the values a role is started with. Reported before any
/// socket is opened, so no partial session exists afterwards.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no network interface named `{0}`")]
    UnknownInterface(String),

    #[error("no IPv4 address found on interface `{0}`; only IPv4 is supported")]
    NoIpv4(String),

    #[error("invalid session name `{0}`: use a non-empty alphanumeric name (`-` and `_` allowed)")]
    InvalidSessionName(String),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("{field} contains characters that are not allowed")]
    DisallowedChars { field: &'static str },

    #[error("invalid host address `{0}`: expected a dotted-quad IPv4 address")]
    InvalidHostAddress(String),

    #[error("invalid netmask `{0}`")]
    InvalidNetmask(String),

    #[error("{name} must be greater than zero")]
    ZeroInterval { name: &'static str },

    #[error("publish interval {0} ms is outside the accepted range of 100..=500 ms")]
    PublishIntervalOutOfRange(u64),

    #[error("failed to read config file {path}: {reason}")]
    File { path: String, reason: String },

    #[error("invalid value for {key}: {value}")]
    Env { key: String, value: String },
}

/// Send or receive failures on either transport. Never fatal.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("datagram to {target} failed: {source}")]
    Datagram {
        target: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("update request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cannot build update URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("host answered {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("failed to persist {path}: {reason}")]
    Store { path: String, reason: String },
}

/// Malformed data on the wire. Datagrams with these are dropped silently;
/// update requests with these are answered with a 4xx and not stored.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("datagram does not start with the session marker")]
    MissingMarker,

    #[error("expected {expected} fields after the marker, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("advertised host `{0}` is not an IPv4 address")]
    BadHostAddress(String),

    #[error("datagram is not valid UTF-8")]
    NotUtf8,

    #[error("missing header `{0}`")]
    MissingHeader(&'static str),

    #[error("header `{name}` is not a non-negative integer: `{value}`")]
    BadHeader { name: &'static str, value: String },

    #[error("update path `{0}` is not /<session>/[<peer>/]<file>")]
    BadPath(String),

    #[error("path segment `{0}` is not allowed")]
    BadSegment(String),

    #[error("no session named `{0}` on this host")]
    UnknownSession(String),
}

impl IntoResponse for ProtocolError {
    fn into_response(self) -> Response {
        let status = match self {
            ProtocolError::UnknownSession(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        tracing::debug!(%status, error = %self, "rejecting update");
        (status, self.to_string()).into_response()
    }
}

/// Top-level error wrapping every category
#[derive(Debug, Error)]
pub enum ShareError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Error categories, used to decide whether a failure ends a role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad start-up values (fatal to that role)
    Configuration,

    /// Socket or HTTP failure (next tick retries implicitly)
    Transport,

    /// Malformed datagram or request
    Protocol,
}

impl ErrorCategory {
    /// Only configuration problems stop a role from running
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorCategory::Configuration)
    }
}

impl ShareError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ShareError::Config(_) => ErrorCategory::Configuration,
            ShareError::Transport(_) => ErrorCategory::Transport,
            ShareError::Protocol(_) => ErrorCategory::Protocol,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.category().is_fatal()
    }
}
