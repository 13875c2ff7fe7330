//! Duplex transports a signaling channel runs over
//!
//! A [`Connector`] turns a channel URL into a [`Connection`]: a sink of
//! outbound frames and a stream of inbound ones. [`WebSocketConnector`] is the
//! real transport; [`memory`] provides an in-process loopback.

use crate::error::TransportError;
use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use std::pin::Pin;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::debug;
use url::Url;

/// One data frame of the duplex connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Payload bytes, as handed to the message parser
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes.as_slice(),
        }
    }
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// An established duplex connection
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Factory for duplex connections
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Connection, TransportError>;
}

/// WebSocket transport using tokio-tungstenite
///
/// Control frames (ping, pong, close) are answered by tungstenite and never
/// surface as [`Frame`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &Url) -> Result<Connection, TransportError> {
        let (ws, response) = connect_async(url.as_str()).await?;
        debug!(status = %response.status(), "websocket handshake complete");

        let (sink, stream) = ws.split();
        let sink = sink
            .with(|frame: Frame| future::ready(Ok::<_, tungstenite::Error>(Message::from(frame))))
            .sink_map_err(TransportError::from);
        let stream = stream.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
                Ok(Message::Binary(bytes)) => Some(Ok(Frame::Binary(bytes.to_vec()))),
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::from(e))),
            })
        });

        Ok(Connection {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::text(text),
            Frame::Binary(bytes) => Message::binary(bytes),
        }
    }
}

pub mod memory {
    //! In-process loopback transport
    //!
    //! Every [`MemoryConnector::connect`] hands the remote end of the new
    //! connection to the paired [`MemoryListener`] as a [`MemoryPeer`], which
    //! plays the relay: it pushes frames to the client and reads what the
    //! client sent.

    use super::{Connection, Connector, Frame};
    use crate::error::TransportError;
    use async_trait::async_trait;
    use futures::channel::mpsc;
    use futures::{FutureExt, SinkExt, StreamExt};
    use tokio::sync::mpsc as tokio_mpsc;
    use url::Url;

    /// Connector side of the loopback
    #[derive(Debug, Clone)]
    pub struct MemoryConnector {
        accepted: Option<tokio_mpsc::UnboundedSender<MemoryPeer>>,
    }

    impl MemoryConnector {
        pub fn new() -> (Self, MemoryListener) {
            let (tx, rx) = tokio_mpsc::unbounded_channel();
            (
                Self { accepted: Some(tx) },
                MemoryListener { accepted: rx },
            )
        }

        /// A connector whose every attempt is refused
        pub fn refusing() -> Self {
            Self { accepted: None }
        }
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        async fn connect(&self, url: &Url) -> Result<Connection, TransportError> {
            let Some(accepted) = &self.accepted else {
                return Err(TransportError::Refused(url.to_string()));
            };
            let (to_client, client_inbound) = mpsc::unbounded();
            let (client_outbound, from_client) = mpsc::unbounded();
            let peer = MemoryPeer {
                url: url.clone(),
                to_client,
                from_client,
            };
            accepted
                .send(peer)
                .map_err(|_| TransportError::Refused(url.to_string()))?;

            Ok(Connection {
                sink: Box::pin(client_outbound.sink_map_err(|_| TransportError::Closed)),
                stream: Box::pin(client_inbound),
            })
        }
    }

    /// Receives the remote end of every connection made by the paired connector
    #[derive(Debug)]
    pub struct MemoryListener {
        accepted: tokio_mpsc::UnboundedReceiver<MemoryPeer>,
    }

    impl MemoryListener {
        pub async fn accept(&mut self) -> Option<MemoryPeer> {
            self.accepted.recv().await
        }
    }

    /// Relay side of one loopback connection
    #[derive(Debug)]
    pub struct MemoryPeer {
        url: Url,
        to_client: mpsc::UnboundedSender<Result<Frame, TransportError>>,
        from_client: mpsc::UnboundedReceiver<Frame>,
    }

    impl MemoryPeer {
        /// URL the client connected to
        pub fn url(&self) -> &Url {
            &self.url
        }

        pub fn push_text(&self, text: impl Into<String>) {
            self.push(Frame::Text(text.into()));
        }

        pub fn push(&self, frame: Frame) {
            let _ = self.to_client.unbounded_send(Ok(frame));
        }

        /// Fail the client's inbound stream with `error`
        pub fn fail(&self, error: TransportError) {
            let _ = self.to_client.unbounded_send(Err(error));
        }

        /// Close the connection from the relay side
        pub fn hang_up(&self) {
            self.to_client.close_channel();
        }

        /// Next frame sent by the client, `None` once the client closed
        pub async fn next_frame(&mut self) -> Option<Frame> {
            self.from_client.next().await
        }

        /// Frames the client sent so far, without waiting
        pub fn drain(&mut self) -> Vec<Frame> {
            let mut frames = Vec::new();
            while let Some(Some(frame)) = self.from_client.next().now_or_never() {
                frames.push(frame);
            }
            frames
        }
    }
}
