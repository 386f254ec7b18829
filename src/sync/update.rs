use std::fmt;
use std::net::Ipv4Addr;

use axum::http::{HeaderMap, HeaderValue};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::SessionSettings;
use crate::editor::DocumentSnapshot;
use crate::error::ProtocolError;
use crate::storage::is_safe_segment;

pub const HEADER_START_CHAR: &str = "cursorselectionstartchar";
pub const HEADER_START_LINE: &str = "cursorselectionstartline";
pub const HEADER_END_CHAR: &str = "cursorselectionendchar";
pub const HEADER_END_LINE: &str = "cursorselectionendline";
pub const HEADER_PASSWORD: &str = "password";

/// A selection as the editor reports it. `end` may precede `start` when the
/// user selected backwards; both ends are carried unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CursorSelection {
    pub start_line: u32,
    pub start_char: u32,
    pub end_line: u32,
    pub end_char: u32,
}

impl CursorSelection {
    pub fn new(start_line: u32, start_char: u32, end_line: u32, end_char: u32) -> Self {
        Self {
            start_line,
            start_char,
            end_line,
            end_char,
        }
    }

    /// A collapsed selection (plain cursor)
    pub fn caret(line: u32, character: u32) -> Self {
        Self::new(line, character, line, character)
    }

    pub fn is_reversed(&self) -> bool {
        (self.end_line, self.end_char) < (self.start_line, self.start_char)
    }

    pub fn header_pairs(&self) -> [(&'static str, String); 4] {
        [
            (HEADER_START_CHAR, self.start_char.to_string()),
            (HEADER_START_LINE, self.start_line.to_string()),
            (HEADER_END_CHAR, self.end_char.to_string()),
            (HEADER_END_LINE, self.end_line.to_string()),
        ]
    }

    /// Read all four selection headers. A missing or non-numeric header is
    /// a protocol error, never a silent default.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ProtocolError> {
        fn field(headers: &HeaderMap, name: &'static str) -> Result<u32, ProtocolError> {
            let raw = headers
                .get(name)
                .ok_or(ProtocolError::MissingHeader(name))?;
            let text = raw.to_str().map_err(|_| ProtocolError::BadHeader {
                name,
                value: String::from_utf8_lossy(raw.as_bytes()).into_owned(),
            })?;
            text.trim().parse().map_err(|_| ProtocolError::BadHeader {
                name,
                value: text.to_string(),
            })
        }

        Ok(Self {
            start_line: field(headers, HEADER_START_LINE)?,
            start_char: field(headers, HEADER_START_CHAR)?,
            end_line: field(headers, HEADER_END_LINE)?,
            end_char: field(headers, HEADER_END_CHAR)?,
        })
    }
}

impl fmt::Display for CursorSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start_line, self.start_char, self.end_line, self.end_char
        )
    }
}

/// Last path component of a document path, accepting both `/` and `\`
/// separators regardless of the platform we run on.
pub fn file_name_of(path: &str) -> Option<&str> {
    path.rsplit(['/', '\\']).next().filter(|name| !name.is_empty())
}

/// Full-state snapshot of one peer document, pushed to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUpdate {
    pub session_name: String,
    pub peer: Option<String>,
    pub file_name: String,
    pub content: Bytes,
    pub selection: CursorSelection,
    pub password: Option<String>,
}

impl DocumentUpdate {
    /// Package an editor snapshot for `settings`. Returns `None` when the
    /// document has no usable file name.
    pub fn from_snapshot(settings: &SessionSettings, snapshot: DocumentSnapshot) -> Option<Self> {
        let file_name = file_name_of(&snapshot.path)?;
        if !is_safe_segment(file_name) {
            return None;
        }

        Some(Self {
            session_name: settings.name.clone(),
            peer: settings.username.clone(),
            file_name: file_name.to_string(),
            content: Bytes::from(snapshot.text),
            selection: snapshot.selection,
            password: settings.password.clone(),
        })
    }

    /// `http://{host}:{port}/{session}/[{peer}/]{file}`
    pub fn url(&self, host: Ipv4Addr, port: u16) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("http://{host}:{port}/"))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
            segments.clear();
            segments.push(&self.session_name);
            if let Some(peer) = &self.peer {
                segments.push(peer);
            }
            segments.push(&self.file_name);
        }
        Ok(url)
    }

    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in self.selection.header_pairs() {
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert(name, value);
            }
        }
        if let Some(password) = &self.password {
            if let Ok(value) = HeaderValue::from_str(password) {
                headers.insert(HEADER_PASSWORD, value);
            }
        }
        headers
    }
}

/// Where an update is filed on the host
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpdateRoute {
    pub session: String,
    pub peer: Option<String>,
    pub file_name: String,
}

impl UpdateRoute {
    /// Validate already percent-decoded path segments
    pub fn new(
        session: String,
        peer: Option<String>,
        file_name: String,
    ) -> Result<Self, ProtocolError> {
        for segment in std::iter::once(&session)
            .chain(peer.as_ref())
            .chain(std::iter::once(&file_name))
        {
            if !is_safe_segment(segment) {
                return Err(ProtocolError::BadSegment(segment.clone()));
            }
        }
        Ok(Self {
            session,
            peer,
            file_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderName;

    #[test]
    fn test_file_name_of() {
        assert_eq!(file_name_of("/proj/src/a.txt"), Some("a.txt"));
        assert_eq!(file_name_of("C:\\proj\\src\\a.txt"), Some("a.txt"));
        assert_eq!(file_name_of("a.txt"), Some("a.txt"));
        assert_eq!(file_name_of("/proj/src/"), None);
        assert_eq!(file_name_of(""), None);
    }

    #[test]
    fn test_selection_headers() {
        let sel = CursorSelection::new(4, 2, 1, 0);
        assert!(sel.is_reversed());

        let update = DocumentUpdate {
            session_name: "lab".into(),
            peer: None,
            file_name: "a.txt".into(),
            content: Bytes::from_static(b"x"),
            selection: sel,
            password: Some("p1".into()),
        };
        let headers = update.headers();
        assert_eq!(headers[HEADER_START_LINE], "4");
        assert_eq!(headers[HEADER_START_CHAR], "2");
        assert_eq!(headers[HEADER_END_LINE], "1");
        assert_eq!(headers[HEADER_END_CHAR], "0");
        assert_eq!(headers[HEADER_PASSWORD], "p1");
        assert_eq!(CursorSelection::from_headers(&headers).unwrap(), sel);
    }

    #[test]
    fn test_missing_or_bad_header_is_rejected() {
        let mut headers = CursorSelection::caret(1, 1)
            .header_pairs()
            .into_iter()
            .map(|(k, v)| (HeaderName::from_static(k), HeaderValue::from_str(&v).unwrap()))
            .collect::<HeaderMap>();
        headers.remove(HEADER_END_LINE);
        assert_eq!(
            CursorSelection::from_headers(&headers),
            Err(ProtocolError::MissingHeader(HEADER_END_LINE))
        );

        headers.insert(HEADER_END_LINE, HeaderValue::from_static("-3"));
        assert!(matches!(
            CursorSelection::from_headers(&headers),
            Err(ProtocolError::BadHeader { .. })
        ));
    }

    #[test]
    fn test_update_url() {
        let mut update = DocumentUpdate {
            session_name: "lab".into(),
            peer: None,
            file_name: "notes 1.md".into(),
            content: Bytes::new(),
            selection: CursorSelection::default(),
            password: None,
        };
        let host = Ipv4Addr::new(192, 168, 0, 3);
        assert_eq!(
            update.url(host, 9898).unwrap().as_str(),
            "http://192.168.0.3:9898/lab/notes%201.md"
        );

        update.peer = Some("ana".into());
        assert_eq!(
            update.url(host, 9898).unwrap().as_str(),
            "http://192.168.0.3:9898/lab/ana/notes%201.md"
        );
    }

    #[test]
    fn test_from_snapshot_strips_directories() {
        let settings = SessionSettings::new("lab").with_username("ana");
        let update = DocumentUpdate::from_snapshot(
            &settings,
            DocumentSnapshot {
                path: "/home/ana/work/main.rs".into(),
                text: "fn main() {}".into(),
                selection: CursorSelection::caret(0, 3),
            },
        )
        .unwrap();
        assert_eq!(update.file_name, "main.rs");
        assert_eq!(update.peer.as_deref(), Some("ana"));
        assert_eq!(&update.content[..], b"fn main() {}");
    }

    #[test]
    fn test_route_rejects_traversal() {
        assert!(UpdateRoute::new("lab".into(), None, "a.txt".into()).is_ok());
        assert!(UpdateRoute::new("lab".into(), None, "..".into()).is_err());
        assert!(UpdateRoute::new("lab".into(), Some("a/b".into()), "x".into()).is_err());
    }
}
