//! Per-kind handler registry of a signaling channel
//!
//! Maps each subscribable message kind to its handlers in subscription order.

use rendezvous_protocol::{Answer, IceCandidate, MessageKind, Offer, Roster, SignalingMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_REGISTRY: AtomicU64 = AtomicU64::new(0);

/// Type-erased handler; ignores messages of other kinds
pub(crate) type Handler = Arc<dyn Fn(&SignalingMessage) + Send + Sync>;

/// Message payloads a caller can subscribe to
///
/// Keep-alive frames are consumed by the channel and have no implementation.
pub trait Inbound: Sized + 'static {
    const KIND: MessageKind;

    fn narrow(message: &SignalingMessage) -> Option<&Self>;
}

impl Inbound for Roster {
    const KIND: MessageKind = MessageKind::Roster;

    fn narrow(message: &SignalingMessage) -> Option<&Self> {
        match message {
            SignalingMessage::Roster(roster) => Some(roster),
            _ => None,
        }
    }
}

impl Inbound for Offer {
    const KIND: MessageKind = MessageKind::Offer;

    fn narrow(message: &SignalingMessage) -> Option<&Self> {
        match message {
            SignalingMessage::Offer(offer) => Some(offer),
            _ => None,
        }
    }
}

impl Inbound for Answer {
    const KIND: MessageKind = MessageKind::Answer;

    fn narrow(message: &SignalingMessage) -> Option<&Self> {
        match message {
            SignalingMessage::Answer(answer) => Some(answer),
            _ => None,
        }
    }
}

impl Inbound for IceCandidate {
    const KIND: MessageKind = MessageKind::IceCandidate;

    fn narrow(message: &SignalingMessage) -> Option<&Self> {
        match message {
            SignalingMessage::IceCandidate(candidate) => Some(candidate),
            _ => None,
        }
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
///
/// Only meaningful on the channel that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    registry: u64,
    kind: MessageKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> MessageKind {
        self.kind
    }
}

pub(crate) struct Registry {
    id: u64,
    next_id: u64,
    handlers: HashMap<MessageKind, Vec<(u64, Handler)>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            id: NEXT_REGISTRY.fetch_add(1, Ordering::Relaxed),
            next_id: 0,
            handlers: HashMap::new(),
        }
    }
}

impl Registry {
    pub(crate) fn subscribe<M, F>(&mut self, handler: F) -> Subscription
    where
        M: Inbound,
        F: Fn(&M) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(move |message: &SignalingMessage| {
            if let Some(payload) = M::narrow(message) {
                handler(payload);
            }
        });
        let id = self.next_id;
        self.next_id += 1;
        self.handlers.entry(M::KIND).or_default().push((id, handler));
        Subscription {
            registry: self.id,
            kind: M::KIND,
            id,
        }
    }

    /// Returns whether the subscription was still registered
    pub(crate) fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        if subscription.registry != self.id {
            return false;
        }
        let Some(handlers) = self.handlers.get_mut(&subscription.kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != subscription.id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            self.handlers.remove(&subscription.kind);
        }
        removed
    }

    /// Snapshot of the handlers for `kind`, in subscription order
    pub(crate) fn handlers(&self, kind: MessageKind) -> Vec<Handler> {
        self.handlers
            .get(&kind)
            .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub(crate) fn clear(&mut self) {
        self.handlers.clear();
    }
}
