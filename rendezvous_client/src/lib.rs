//! Client for the rendezvous WebRTC signaling relay
//!
//! Two pieces talk to the relay:
//!
//! - [`SessionDirectory`] creates, joins and checks named sessions with plain
//!   HTTP requests.
//! - [`SignalingChannel`] keeps one WebSocket open per (session, local peer)
//!   and carries the negotiation traffic: rosters, offers, answers and ICE
//!   candidates.
//!
//! # Protocol
//!
//! - **PUT /sessions/{name}[?password=]** - create a session
//! - **PATCH /sessions/{name}[?password=]** - join a session
//! - **GET /sessions/{name}** - check that a session exists
//! - **WS /sessions/{name}?peerId={id}** - signaling channel
//!
//! Channel frames are JSON text, one [`SignalingMessage`] per frame. See
//! [`rendezvous_protocol`] for the message format.
//!
//! # Example
//!
//! ```no_run
//! use rendezvous_client::{
//!     PeerId, Roster, SessionDirectory, SignalingChannel, WebSocketConnector,
//! };
//! use std::sync::Arc;
//! use url::Url;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let base = Url::parse("http://localhost:4321")?;
//! SessionDirectory::new(&base)?.create("lobby", None).await?;
//!
//! let (channel, _errors) =
//!     SignalingChannel::open(Arc::new(WebSocketConnector), &base, "lobby", PeerId::random())?;
//! channel.subscribe(|roster: &Roster| println!("peers: {:?}", roster.peer_ids));
//! channel.ready().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod channel;
pub mod config;
pub mod directory;
pub mod error;
mod heartbeat;
mod registry;
pub mod routes;
pub mod teardown;
pub mod transport;

pub use channel::{ChannelOptions, ChannelState, ErrorReceiver, SignalingChannel};
pub use config::ClientConfig;
pub use directory::{DirectoryResponse, HttpTransport, ReqwestTransport, SessionDirectory};
pub use error::{ChannelError, ConfigError, DirectoryError, TransportError};
pub use heartbeat::HEARTBEAT_INTERVAL;
pub use registry::{Inbound, Subscription};
pub use teardown::{Teardown, TeardownRegistration};
pub use transport::{Connection, Connector, Frame, WebSocketConnector};

pub use rendezvous_protocol::{
    Answer, IceCandidate, IceCandidateDescriptor, InvalidValue, MessageKind, Offer, ParseError,
    PeerId, Roster, SessionDescriptor, SignalingMessage,
};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, ignoring poisoning; guarded state stays consistent between
/// statements
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
