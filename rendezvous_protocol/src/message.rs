//! Message types exchanged over a signaling channel
//!
//! Every value here can be serialized and parsed back unchanged: the newtypes
//! reject what the parser would reject.

use crate::error::InvalidValue;
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

/// Identifier a peer chooses for itself when it opens a channel; never empty
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidValue> {
        let id = id.into();
        if id.is_empty() {
            return Err(InvalidValue::EmptyPeerId);
        }
        Ok(Self(id))
    }

    /// A fresh random id (UUID v4)
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PeerId {
    type Error = InvalidValue;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl TryFrom<&str> for PeerId {
    type Error = InvalidValue;

    fn try_from(id: &str) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl FromStr for PeerId {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for PeerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque session description (`RTCSessionDescriptionInit` on the browser side)
///
/// The relay never looks inside; it only forwards the value. Any JSON value
/// except null, false, 0 and "" is accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SessionDescriptor(Value);

impl SessionDescriptor {
    /// Build a description in the usual `{"type": ..., "sdp": ...}` shape
    pub fn new(sdp_type: &str, sdp: impl Into<String>) -> Self {
        Self(json!({ "type": sdp_type, "sdp": sdp.into() }))
    }

    /// `"offer"`, `"answer"`, ... when the payload has that shape
    pub fn sdp_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    pub fn sdp(&self) -> Option<&str> {
        self.0.get("sdp").and_then(Value::as_str)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl TryFrom<Value> for SessionDescriptor {
    type Error = InvalidValue;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        if !is_truthy(&value) {
            return Err(InvalidValue::EmptyDescription);
        }
        Ok(Self(value))
    }
}

/// Opaque ICE candidate (`RTCIceCandidateInit` on the browser side); never null
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct IceCandidateDescriptor(Value);

impl IceCandidateDescriptor {
    pub fn new(
        candidate: impl Into<String>,
        sdp_mid: Option<String>,
        sdp_m_line_index: Option<u16>,
    ) -> Self {
        Self(json!({
            "candidate": candidate.into(),
            "sdpMid": sdp_mid,
            "sdpMLineIndex": sdp_m_line_index,
        }))
    }

    pub fn candidate(&self) -> Option<&str> {
        self.0.get("candidate").and_then(Value::as_str)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl TryFrom<Value> for IceCandidateDescriptor {
    type Error = InvalidValue;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        if value.is_null() {
            return Err(InvalidValue::NullCandidate);
        }
        Ok(Self(value))
    }
}

/// JavaScript truthiness of a JSON value
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Peers currently connected to the session, as seen by the relay
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Roster {
    pub peer_ids: Vec<PeerId>,
}

/// Connection offer from `offerer_id` to `answerer_id`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub offerer_id: PeerId,
    pub answerer_id: PeerId,
    pub description: SessionDescriptor,
}

impl Offer {
    /// The answer to this offer, addressed back to the offerer
    pub fn answer(&self, description: SessionDescriptor) -> Answer {
        Answer {
            offerer_id: self.offerer_id.clone(),
            answerer_id: self.answerer_id.clone(),
            description,
        }
    }
}

/// Reply to an [`Offer`]; addressing fields are those of the offer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub offerer_id: PeerId,
    pub answerer_id: PeerId,
    pub description: SessionDescriptor,
}

/// One network path candidate, routed point to point
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub from_peer_id: PeerId,
    pub to_peer_id: PeerId,
    pub candidate: IceCandidateDescriptor,
}

/// Discriminant of a [`SignalingMessage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Roster,
    Offer,
    Answer,
    IceCandidate,
    KeepAlive,
}

impl MessageKind {
    /// Value of the `type` field on the wire
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Roster => "roster",
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "iceCandidate",
            Self::KeepAlive => "keepAlive",
        }
    }

    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "roster" => Some(Self::Roster),
            "offer" => Some(Self::Offer),
            "answer" => Some(Self::Answer),
            "iceCandidate" => Some(Self::IceCandidate),
            "keepAlive" => Some(Self::KeepAlive),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A frame on the signaling channel, discriminated by `type`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SignalingMessage {
    Roster(Roster),
    Offer(Offer),
    Answer(Answer),
    IceCandidate(IceCandidate),
    KeepAlive,
}

impl SignalingMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Roster(_) => MessageKind::Roster,
            Self::Offer(_) => MessageKind::Offer,
            Self::Answer(_) => MessageKind::Answer,
            Self::IceCandidate(_) => MessageKind::IceCandidate,
            Self::KeepAlive => MessageKind::KeepAlive,
        }
    }

    /// Peer that produced an addressed message
    pub fn sender(&self) -> Option<&PeerId> {
        match self {
            Self::Offer(offer) => Some(&offer.offerer_id),
            Self::Answer(answer) => Some(&answer.answerer_id),
            Self::IceCandidate(candidate) => Some(&candidate.from_peer_id),
            Self::Roster(_) | Self::KeepAlive => None,
        }
    }

    /// Peer an addressed message is routed to
    pub fn recipient(&self) -> Option<&PeerId> {
        match self {
            Self::Offer(offer) => Some(&offer.answerer_id),
            Self::Answer(answer) => Some(&answer.offerer_id),
            Self::IceCandidate(candidate) => Some(&candidate.to_peer_id),
            Self::Roster(_) | Self::KeepAlive => None,
        }
    }
}

impl From<Roster> for SignalingMessage {
    fn from(roster: Roster) -> Self {
        Self::Roster(roster)
    }
}

impl From<Offer> for SignalingMessage {
    fn from(offer: Offer) -> Self {
        Self::Offer(offer)
    }
}

impl From<Answer> for SignalingMessage {
    fn from(answer: Answer) -> Self {
        Self::Answer(answer)
    }
}

impl From<IceCandidate> for SignalingMessage {
    fn from(candidate: IceCandidate) -> Self {
        Self::IceCandidate(candidate)
    }
}
