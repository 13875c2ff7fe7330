//! Boundary validation of inbound frames
//!
//! Frames are checked field by field rather than through a derived
//! `Deserialize`, so every rejection maps onto a precise [`ParseError`] and the
//! order in which offer/answer fields are checked stays fixed.

use crate::error::ParseError;
use crate::message::{
    Answer, IceCandidate, IceCandidateDescriptor, MessageKind, Offer, PeerId, Roster,
    SessionDescriptor, SignalingMessage,
};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

type Fields = Map<String, Value>;

/// Validate a raw frame payload and parse it into a [`SignalingMessage`]
pub fn validate_and_parse(raw: &[u8]) -> Result<SignalingMessage, ParseError> {
    let text =
        std::str::from_utf8(raw).map_err(|e| ParseError::MalformedPayload(e.to_string()))?;
    let value: Value =
        serde_json::from_str(text).map_err(|e| ParseError::MalformedPayload(e.to_string()))?;

    let Value::Object(mut fields) = value else {
        return Err(ParseError::MissingDiscriminator);
    };
    let tag = match fields.remove("type") {
        Some(Value::String(tag)) if !tag.is_empty() => tag,
        _ => return Err(ParseError::MissingDiscriminator),
    };
    let Some(kind) = MessageKind::from_wire(&tag) else {
        return Err(ParseError::UnknownMessageType(tag));
    };

    let message = match kind {
        MessageKind::Roster => SignalingMessage::Roster(Roster {
            peer_ids: peer_list(&mut fields, "peerIds")?,
        }),
        MessageKind::Offer => {
            let (offerer_id, answerer_id, description) = negotiation(&mut fields)?;
            SignalingMessage::Offer(Offer {
                offerer_id,
                answerer_id,
                description,
            })
        }
        MessageKind::Answer => {
            let (offerer_id, answerer_id, description) = negotiation(&mut fields)?;
            SignalingMessage::Answer(Answer {
                offerer_id,
                answerer_id,
                description,
            })
        }
        MessageKind::IceCandidate => {
            let from_peer_id = peer_id(&mut fields, "fromPeerId")?;
            let to_peer_id = peer_id(&mut fields, "toPeerId")?;
            let candidate = match fields.remove("candidate") {
                Some(value) => IceCandidateDescriptor::try_from(value)
                    .map_err(|_| ParseError::InvalidField("candidate"))?,
                None => return Err(ParseError::InvalidField("candidate")),
            };
            SignalingMessage::IceCandidate(IceCandidate {
                from_peer_id,
                to_peer_id,
                candidate,
            })
        }
        MessageKind::KeepAlive => SignalingMessage::KeepAlive,
    };
    Ok(message)
}

/// Encode a message as one JSON text frame
pub fn serialize(message: &SignalingMessage) -> String {
    message.to_string()
}

/// Offer and answer share addressing; fields are checked
/// offererId, then description, then answererId.
fn negotiation(fields: &mut Fields) -> Result<(PeerId, PeerId, SessionDescriptor), ParseError> {
    let offerer_id = peer_id(fields, "offererId")?;
    let description = fields
        .remove("description")
        .and_then(|value| SessionDescriptor::try_from(value).ok())
        .ok_or(ParseError::InvalidField("description"))?;
    let answerer_id = peer_id(fields, "answererId")?;
    Ok((offerer_id, answerer_id, description))
}

fn peer_id(fields: &mut Fields, name: &'static str) -> Result<PeerId, ParseError> {
    match fields.remove(name) {
        Some(Value::String(id)) => PeerId::new(id).map_err(|_| ParseError::InvalidField(name)),
        _ => Err(ParseError::InvalidField(name)),
    }
}

fn peer_list(fields: &mut Fields, name: &'static str) -> Result<Vec<PeerId>, ParseError> {
    let Some(Value::Array(items)) = fields.remove(name) else {
        return Err(ParseError::InvalidField(name));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(id) => PeerId::new(id).map_err(|_| ParseError::InvalidField(name)),
            _ => Err(ParseError::InvalidField(name)),
        })
        .collect()
}

impl fmt::Display for SignalingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let serialized = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&serialized)
    }
}

impl FromStr for SignalingMessage {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_and_parse(s.as_bytes())
    }
}
