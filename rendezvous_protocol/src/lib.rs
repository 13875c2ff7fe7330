//! Wire protocol for the rendezvous signaling relay
//!
//! Peers of one session exchange JSON text frames over a duplex channel. Every
//! frame is one [`SignalingMessage`], discriminated by its `type` field:
//!
//! - `{"type":"roster","peerIds":["p1","p2"]}` - peers currently connected
//! - `{"type":"offer","offererId":"p1","answererId":"p2","description":{...}}`
//! - `{"type":"answer","offererId":"p1","answererId":"p2","description":{...}}`
//! - `{"type":"iceCandidate","fromPeerId":"p1","toPeerId":"p2","candidate":{...}}`
//! - `{"type":"keepAlive"}` - heartbeat
//!
//! Inbound frames are checked once by [`validate_and_parse`]; a value of
//! [`SignalingMessage`] always satisfies the structural rules above, whether
//! it was parsed or built in code.

#![forbid(unsafe_code)]

pub mod error;
pub mod message;
pub mod parse;

pub use error::{InvalidValue, ParseError};
pub use message::{
    Answer, IceCandidate, IceCandidateDescriptor, MessageKind, Offer, PeerId, Roster,
    SessionDescriptor, SignalingMessage,
};
pub use parse::{serialize, validate_and_parse};
