//! URL routes of the session directory and the signaling channel
//!
//! Both live under the origin of the configured base URL:
//!
//! - `PUT /sessions/{sessionName}[?password=...]` - create a session
//! - `PATCH /sessions/{sessionName}[?password=...]` - join a session
//! - `GET /sessions/{sessionName}` - check that a session exists
//! - `ws(s)://.../sessions/{sessionName}?peerId={peerId}` - signaling channel

use reqwest::Method;
use rendezvous_protocol::PeerId;
use url::Url;

const SESSIONS: &str = "sessions";
const PASSWORD_PARAM: &str = "password";
const PEER_ID_PARAM: &str = "peerId";

/// Request/response operations of the session directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryRoute {
    CreateSession,
    JoinSession,
    SessionExists,
}

impl DirectoryRoute {
    pub fn method(self) -> Method {
        match self {
            Self::CreateSession => Method::PUT,
            Self::JoinSession => Method::PATCH,
            Self::SessionExists => Method::GET,
        }
    }

    pub fn accepts_password(self) -> bool {
        !matches!(self, Self::SessionExists)
    }

    /// Target URL for `session_name`; an empty password counts as none
    pub fn url(
        self,
        base: &Url,
        session_name: &str,
        password: Option<&str>,
    ) -> Result<Url, url::ParseError> {
        let mut url = session_url(base, session_name)?;
        if let Some(password) = password.filter(|p| self.accepts_password() && !p.is_empty()) {
            url.query_pairs_mut().append_pair(PASSWORD_PARAM, password);
        }
        Ok(url)
    }
}

/// `base` reduced to `scheme://host[:port]/`
pub fn origin(base: &Url) -> Result<Url, url::ParseError> {
    Url::parse(&base.origin().ascii_serialization())
}

/// Address of the signaling channel for one peer of a session
pub fn channel_url(
    base: &Url,
    session_name: &str,
    peer_id: &PeerId,
) -> Result<Url, url::ParseError> {
    let mut url = session_url(base, session_name)?;
    let upgraded = match url.scheme() {
        "http" => Some("ws"),
        "https" => Some("wss"),
        _ => None,
    };
    if let Some(scheme) = upgraded {
        // http(s) and ws(s) are all special schemes, so the swap is accepted
        let _ = url.set_scheme(scheme);
    }
    url.query_pairs_mut()
        .append_pair(PEER_ID_PARAM, peer_id.as_str());
    Ok(url)
}

fn session_url(base: &Url, session_name: &str) -> Result<Url, url::ParseError> {
    let mut url = origin(base)?;
    url.path_segments_mut()
        .map_err(|()| url::ParseError::RelativeUrlWithoutBase)?
        .clear()
        .push(SESSIONS)
        .push(session_name);
    Ok(url)
}
