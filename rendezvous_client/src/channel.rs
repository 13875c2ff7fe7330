//! Signaling channel
//!
//! One persistent duplex connection per (session, local peer). A channel moves
//! through `Connecting -> Active -> Closed`:
//!
//! - **Connecting**: the driver task is establishing the connection. Sends
//!   are rejected.
//! - **Active**: the connection is up. A keep-alive frame goes out on every
//!   heartbeat tick, inbound frames are validated and dispatched to the
//!   handlers subscribed to their kind.
//! - **Closed**: terminal. Entered when the relay closes the connection, the
//!   transport fails, [`SignalingChannel::close`] is called, the process
//!   teardown fires, or the handle is dropped.
//!
//! All connection I/O and all dispatch run on the channel's driver task, one
//! event at a time, so handlers see messages strictly in arrival order. No
//! handler runs once the channel is closed.

use crate::error::ChannelError;
use crate::heartbeat::{self, HEARTBEAT_INTERVAL};
use crate::lock;
use crate::registry::{Handler, Inbound, Registry, Subscription};
use crate::routes;
use crate::teardown::{Teardown, TeardownRegistration};
use crate::transport::{Connection, Connector, Frame, FrameSink};
use futures::{SinkExt, StreamExt};
use rendezvous_protocol::{MessageKind, PeerId, SignalingMessage, serialize, validate_and_parse};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

/// Receives the errors a channel reports while it runs
pub type ErrorReceiver = mpsc::UnboundedReceiver<ChannelError>;

/// Lifecycle state of a [`SignalingChannel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Active,
    Closed,
}

/// Tunables for [`SignalingChannel::open_with`]
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Period of the keep-alive frame while active
    pub heartbeat_interval: Duration,
    /// Process teardown to register with for the channel's lifetime
    pub teardown: Option<Teardown>,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: HEARTBEAT_INTERVAL,
            teardown: None,
        }
    }
}

/// State shared by the handle and the driver task
struct Shared {
    state: watch::Sender<ChannelState>,
    registry: Mutex<Registry>,
    cancel: CancellationToken,
    teardown: Mutex<Option<TeardownRegistration>>,
}

impl Shared {
    fn activate(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ChannelState::Connecting && !self.cancel.is_cancelled() {
                *state = ChannelState::Active;
                true
            } else {
                false
            }
        })
    }

    fn is_active(&self) -> bool {
        *self.state.borrow() == ChannelState::Active && !self.cancel.is_cancelled()
    }

    /// Enter `Closed` and release everything the channel holds.
    /// Returns false when the channel was already closed.
    fn shut_down(&self) -> bool {
        let closed_now = self.state.send_if_modified(|state| {
            if *state == ChannelState::Closed {
                false
            } else {
                *state = ChannelState::Closed;
                true
            }
        });
        self.cancel.cancel();
        lock(&self.registry).clear();
        lock(&self.teardown).take();
        closed_now
    }

    fn handlers(&self, kind: MessageKind) -> Vec<Handler> {
        lock(&self.registry).handlers(kind)
    }
}

/// Handle to one signaling channel
///
/// Dropping the handle closes the channel.
pub struct SignalingChannel {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<String>,
    url: Url,
    session_name: String,
    local_peer_id: PeerId,
}

impl std::fmt::Debug for SignalingChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingChannel")
            .field("url", &self.url.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SignalingChannel {
    /// Open a channel for `local_peer_id` in `session_name` with default options
    ///
    /// Must be called from within a Tokio runtime. See [`Self::open_with`].
    pub fn open(
        connector: Arc<dyn Connector>,
        endpoint: &Url,
        session_name: &str,
        local_peer_id: PeerId,
    ) -> Result<(Self, ErrorReceiver), ChannelError> {
        Self::open_with(
            connector,
            endpoint,
            session_name,
            local_peer_id,
            ChannelOptions::default(),
        )
    }

    /// Open a channel for `local_peer_id` in `session_name`
    ///
    /// The channel is returned in the `Connecting` state; the connection is
    /// established by a spawned driver task. A connection failure is not
    /// returned here: it arrives as [`ChannelError::Connection`] on the
    /// returned [`ErrorReceiver`] and the channel becomes `Closed`. Only an
    /// endpoint that cannot address a channel fails synchronously.
    pub fn open_with(
        connector: Arc<dyn Connector>,
        endpoint: &Url,
        session_name: &str,
        local_peer_id: PeerId,
        options: ChannelOptions,
    ) -> Result<(Self, ErrorReceiver), ChannelError> {
        let url = routes::channel_url(endpoint, session_name, &local_peer_id)?;

        let cancel = CancellationToken::new();
        let registration = options
            .teardown
            .as_ref()
            .map(|teardown| teardown.register(cancel.clone()));
        let (state, _) = watch::channel(ChannelState::Connecting);
        let shared = Arc::new(Shared {
            state,
            registry: Mutex::new(Registry::default()),
            cancel,
            teardown: Mutex::new(registration),
        });

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();

        info!(%url, "opening signaling channel");
        let driver = Driver {
            shared: Arc::clone(&shared),
            url: url.clone(),
            outbound: outbound_rx,
            errors: errors_tx,
            heartbeat_interval: options.heartbeat_interval,
        };
        tokio::spawn(driver.run(connector));

        let channel = Self {
            shared,
            outbound: outbound_tx,
            url,
            session_name: session_name.to_string(),
            local_peer_id,
        };
        Ok((channel, errors_rx))
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_peer_id
    }

    /// Wait until the channel is active
    ///
    /// Fails with [`ChannelError::ChannelNotActive`] if it closes first.
    pub async fn ready(&self) -> Result<(), ChannelError> {
        let mut state = self.shared.state.subscribe();
        let reached = state
            .wait_for(|state| *state != ChannelState::Connecting)
            .await
            .map(|state| *state);
        match reached {
            Ok(ChannelState::Active) => Ok(()),
            _ => Err(ChannelError::ChannelNotActive),
        }
    }

    /// Wait until the channel is closed
    pub async fn closed(&self) {
        let mut state = self.shared.state.subscribe();
        let _ = state.wait_for(|state| *state == ChannelState::Closed).await;
    }

    /// Queue `message` for transmission
    ///
    /// Frames leave in call order. Fails with
    /// [`ChannelError::ChannelNotActive`] unless the channel is active.
    pub fn send(&self, message: impl Into<SignalingMessage>) -> Result<(), ChannelError> {
        if !self.shared.is_active() {
            return Err(ChannelError::ChannelNotActive);
        }
        let message = message.into();
        debug!(kind = %message.kind(), "queueing message");
        self.outbound
            .send(serialize(&message))
            .map_err(|_| ChannelError::ChannelNotActive)
    }

    /// Call `handler` for every inbound message of kind `M`
    ///
    /// Handlers of one kind run in subscription order. They run on the
    /// channel's driver task without any lock held, so they may subscribe,
    /// send or close; long work belongs in a spawned task.
    pub fn subscribe<M, F>(&self, handler: F) -> Subscription
    where
        M: Inbound,
        F: Fn(&M) + Send + Sync + 'static,
    {
        lock(&self.shared.registry).subscribe(handler)
    }

    /// Remove one handler; returns whether it was registered
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        lock(&self.shared.registry).unsubscribe(subscription)
    }

    /// Number of handlers currently registered
    pub fn subscriptions(&self) -> usize {
        lock(&self.shared.registry).len()
    }

    /// Close the channel; further calls do nothing
    ///
    /// Messages already accepted by [`Self::send`] are still written before
    /// the connection closes.
    pub fn close(&self) {
        if self.shared.shut_down() {
            info!(url = %self.url, "signaling channel closed");
        }
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Owns the connection; runs until the channel closes
struct Driver {
    shared: Arc<Shared>,
    url: Url,
    outbound: mpsc::UnboundedReceiver<String>,
    errors: mpsc::UnboundedSender<ChannelError>,
    heartbeat_interval: Duration,
}

impl Driver {
    async fn run(mut self, connector: Arc<dyn Connector>) {
        let cancel = self.shared.cancel.clone();
        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = connector.connect(&self.url) => Some(result),
        };

        match connected {
            None => debug!(url = %self.url, "closed before the connection was established"),
            Some(Err(e)) => {
                warn!(url = %self.url, error = %e, "signaling connection failed");
                self.report(ChannelError::Connection(e));
            }
            Some(Ok(connection)) => self.serve(connection).await,
        }

        if self.shared.shut_down() {
            info!(url = %self.url, "signaling channel closed");
        }
    }

    async fn serve(&mut self, connection: Connection) {
        let Connection {
            mut sink,
            mut stream,
        } = connection;

        if self.shared.activate() {
            info!(url = %self.url, "signaling channel active");
            let cancel = self.shared.cancel.clone();
            let mut heartbeat = heartbeat::timer(self.heartbeat_interval);
            let keep_alive = serialize(&SignalingMessage::KeepAlive);

            // Unbiased so a busy inbound stream cannot hold back sends or the
            // heartbeat; cancellation is rechecked before every event
            let healthy = loop {
                if cancel.is_cancelled() {
                    break true;
                }
                tokio::select! {
                    () = cancel.cancelled() => break true,
                    inbound = stream.next() => match inbound {
                        Some(Ok(frame)) => self.dispatch(&frame),
                        Some(Err(e)) => {
                            warn!(error = %e, "signaling connection failed");
                            self.report(ChannelError::Connection(e));
                            break false;
                        }
                        None => {
                            info!(url = %self.url, "signaling connection closed by relay");
                            break false;
                        }
                    },
                    Some(text) = self.outbound.recv() => {
                        if let Err(e) = sink.send(Frame::Text(text)).await {
                            warn!(error = %e, "failed to send frame");
                            self.report(ChannelError::Connection(e));
                            break false;
                        }
                    }
                    _ = heartbeat.tick() => {
                        if cancel.is_cancelled() {
                            break true;
                        }
                        trace!("sending keep-alive");
                        if let Err(e) = sink.send(Frame::Text(keep_alive.clone())).await {
                            warn!(error = %e, "failed to send keep-alive");
                            self.report(ChannelError::Connection(e));
                            break false;
                        }
                    }
                }
            };

            // Sends accepted before close still go out ahead of the close
            if healthy {
                self.flush(&mut sink).await;
            }
        }

        // Closed before the transport goes away, so the timer never ticks again
        if self.shared.shut_down() {
            info!(url = %self.url, "signaling channel closed");
        }
        if let Err(e) = sink.close().await {
            debug!(error = %e, "error closing signaling connection");
        }
    }

    async fn flush(&mut self, sink: &mut FrameSink) {
        let mut flushed = 0usize;
        while let Ok(text) = self.outbound.try_recv() {
            if let Err(e) = sink.send(Frame::Text(text)).await {
                debug!(error = %e, "failed to flush queued frame");
                return;
            }
            flushed += 1;
        }
        if flushed > 0 {
            debug!(flushed, "flushed queued frames");
        }
    }

    fn dispatch(&self, frame: &Frame) {
        let message = match validate_and_parse(frame.as_bytes()) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping invalid frame");
                self.report(ChannelError::Parse(e));
                return;
            }
        };

        let kind = message.kind();
        if kind == MessageKind::KeepAlive {
            trace!("keep-alive received");
            return;
        }

        let handlers = self.shared.handlers(kind);
        debug!(%kind, handlers = handlers.len(), "dispatching message");
        for handler in handlers {
            // A handler may have closed the channel
            if self.shared.cancel.is_cancelled() {
                break;
            }
            handler(&message);
        }
    }

    fn report(&self, error: ChannelError) {
        let _ = self.errors.send(error);
    }
}
