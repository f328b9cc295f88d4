//! Live relay session client.
//!
//! [`LiveClient`] owns one WebSocket to the relay at a time. A spawned task
//! per connect attempt drives the socket: it forwards queued outbound frames
//! and classifies inbound frames, invoking the registered callbacks strictly
//! in arrival order. Lifecycle changes are published on a `watch` channel so
//! callers can wait for the transport without polling.
//!
//! # Example
//!
//! ```rust,ignore
//! use live_session::{LiveClient, SetupConfig};
//! use std::sync::Arc;
//!
//! let client = LiveClient::new("ws://localhost:8081")?;
//!
//! client.on_connect(Arc::new(|client| {
//!     Box::pin(async move {
//!         let _ = client.send_setup_message(SetupConfig::default()).await;
//!     })
//! }));
//!
//! client.on_text_content(Arc::new(|text| {
//!     Box::pin(async move { print!("{text}") })
//! }));
//!
//! client.connect().await?;
//! client.send_text_message("Hello!").await?;
//! ```

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::error::{Error as WsError, ProtocolError};
use tracing::{debug, error, info, trace, warn};

use super::base::{
    AudioDataCallback, ConnectCallback, DEFAULT_CONNECT_TIMEOUT_SECS, ErrorCallback,
    FunctionCallCallback, FunctionResponseCallback, InterruptedCallback, LiveError, LiveResult,
    ReadyCallback, TextContentCallback, TranscriptResult, TranscriptRole, TranscriptionCallback,
    TransportState, TurnCompleteCallback,
};
use super::messages::{
    ClientMessage, FrameError, ServerMessage, SetupConfig, deserialize_binary_message,
    deserialize_server_message, serialize_client_message,
};
use super::ready::{ReadyFuture, ReadySignal, ready_pair};
use crate::config::ClientConfig;
use crate::utils::url_validation::validate_ws_url;

/// Close code reported when the socket ends without a close handshake.
const ABNORMAL_CLOSURE: u16 = 1006;

#[derive(Default)]
struct Callbacks {
    ready: Option<ReadyCallback>,
    audio_data: Option<AudioDataCallback>,
    text_content: Option<TextContentCallback>,
    error: Option<ErrorCallback>,
    turn_complete: Option<TurnCompleteCallback>,
    function_call: Option<FunctionCallCallback>,
    function_response: Option<FunctionResponseCallback>,
    interrupted: Option<InterruptedCallback>,
    connect: Option<ConnectCallback>,
    transcription: Option<TranscriptionCallback>,
}

/// Lifecycle snapshot published by the transport task.
#[derive(Debug, Clone, Default)]
struct Link {
    state: TransportState,
    failure: Option<String>,
}

enum Outbound {
    Frame(String),
    Close,
}

struct Transport {
    attempt: u64,
    link: Arc<watch::Sender<Link>>,
    outbound: mpsc::UnboundedSender<Outbound>,
    ready: ReadyFuture,
}

impl Transport {
    fn state(&self) -> TransportState {
        self.link.borrow().state
    }
}

struct Inner {
    url: String,
    connect_timeout: Duration,
    callbacks: RwLock<Callbacks>,
    speaking: AtomicBool,
    transport: Mutex<Option<Transport>>,
}

/// Client-side manager of a live relay session.
///
/// Cloning is cheap; clones share the connection and the callback registry.
/// Must be used from within a Tokio runtime. Callbacks run on the transport
/// task, one at a time, so a callback should not await [`close`](Self::close)
/// or the readiness future of its own client.
#[derive(Clone)]
pub struct LiveClient {
    inner: Arc<Inner>,
}

impl LiveClient {
    /// Create a client for the relay at `url` with default settings.
    pub fn new(url: impl Into<String>) -> LiveResult<Self> {
        let url = url.into();
        validate_ws_url(&url).map_err(|e| LiveError::InvalidConfiguration(e.to_string()))?;
        Ok(Self::build(
            url,
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        ))
    }

    /// Create a client from loaded configuration.
    pub fn from_config(config: &ClientConfig) -> LiveResult<Self> {
        config.validate().map_err(LiveError::InvalidConfiguration)?;
        Ok(Self::build(config.server_url.clone(), config.connect_timeout))
    }

    fn build(url: String, connect_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                url,
                connect_timeout,
                callbacks: RwLock::new(Callbacks::default()),
                speaking: AtomicBool::new(false),
                transport: Mutex::new(None),
            }),
        }
    }

    /// Relay address this client connects to.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Bound applied by [`ensure_connected`](Self::ensure_connected).
    pub fn connect_timeout(&self) -> Duration {
        self.inner.connect_timeout
    }

    /// State of the current transport, `None` before the first connect.
    pub fn state(&self) -> Option<TransportState> {
        self.inner.transport.lock().as_ref().map(Transport::state)
    }

    pub fn is_open(&self) -> bool {
        self.state() == Some(TransportState::Open)
    }

    /// Whether the model is currently producing audio.
    pub fn is_speaking(&self) -> bool {
        self.inner.speaking.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Callbacks
    // =========================================================================

    /// Called each time the relay signals readiness.
    pub fn on_ready(&self, callback: ReadyCallback) {
        self.inner.callbacks.write().ready = Some(callback);
    }

    /// Called for every audio chunk, with the base64 payload as received.
    pub fn on_audio_data(&self, callback: AudioDataCallback) {
        self.inner.callbacks.write().audio_data = Some(callback);
    }

    pub fn on_text_content(&self, callback: TextContentCallback) {
        self.inner.callbacks.write().text_content = Some(callback);
    }

    /// Called for every error, whatever its source.
    pub fn on_error(&self, callback: ErrorCallback) {
        self.inner.callbacks.write().error = Some(callback);
    }

    pub fn on_turn_complete(&self, callback: TurnCompleteCallback) {
        self.inner.callbacks.write().turn_complete = Some(callback);
    }

    pub fn on_function_call(&self, callback: FunctionCallCallback) {
        self.inner.callbacks.write().function_call = Some(callback);
    }

    pub fn on_function_response(&self, callback: FunctionResponseCallback) {
        self.inner.callbacks.write().function_response = Some(callback);
    }

    pub fn on_interrupted(&self, callback: InterruptedCallback) {
        self.inner.callbacks.write().interrupted = Some(callback);
    }

    /// Called after each readiness signal with a handle to this client.
    pub fn on_connect(&self, callback: ConnectCallback) {
        self.inner.callbacks.write().connect = Some(callback);
    }

    pub fn on_transcription(&self, callback: TranscriptionCallback) {
        self.inner.callbacks.write().transcription = Some(callback);
    }

    fn callback<T>(&self, select: impl FnOnce(&Callbacks) -> Option<T>) -> Option<T> {
        select(&self.inner.callbacks.read())
    }

    async fn report(&self, error: LiveError) {
        match self.callback(|c| c.error.clone()) {
            Some(cb) => cb(error).await,
            None => debug!("No error callback registered: {error}"),
        }
    }

    async fn fail(&self, error: LiveError) -> LiveResult<()> {
        self.report(error.clone()).await;
        Err(error)
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// Open the connection and return its readiness future.
    ///
    /// While a transport is connecting or open this returns the readiness
    /// future of that attempt instead of opening a second socket. The future
    /// resolves once the relay sends `{"ready": true}`; it fails if the
    /// transport ends first.
    pub fn connect(&self) -> ReadyFuture {
        let mut slot = self.inner.transport.lock();

        if let Some(transport) = slot.as_ref()
            && matches!(
                transport.state(),
                TransportState::Connecting | TransportState::Open
            )
        {
            debug!(
                attempt = transport.attempt,
                "Connection already in progress, reusing readiness"
            );
            return transport.ready.clone();
        }

        let (signal, ready) = ready_pair();
        let attempt = ready.attempt();
        let link = Arc::new(watch::Sender::new(Link::default()));
        let (tx, rx) = mpsc::unbounded_channel();

        info!(attempt, "Connecting to live relay at {}", self.inner.url);
        tokio::spawn(Self::run_transport(
            Arc::downgrade(&self.inner),
            self.inner.url.clone(),
            self.inner.connect_timeout,
            attempt,
            link.clone(),
            rx,
            signal,
        ));

        *slot = Some(Transport {
            attempt,
            link,
            outbound: tx,
            ready: ready.clone(),
        });
        ready
    }

    /// Wait until the relay has signalled readiness, connecting if needed.
    ///
    /// There is no timeout; the wait ends when the relay is ready or the
    /// transport closes.
    pub async fn ensure_ready(&self) -> LiveResult<()> {
        self.connect().await
    }

    /// Wait until the transport is open, bounded by the connect timeout.
    ///
    /// Returns immediately when already open. Opens a connection when there is
    /// none, or when the previous one is closing or closed.
    pub async fn ensure_connected(&self) -> LiveResult<()> {
        if self.is_open() {
            return Ok(());
        }

        // Reuses an attempt that is already in progress
        let _ = self.connect();
        let Some(link) = self.subscribe() else {
            return Err(LiveError::closed("no transport"));
        };

        let limit = self.inner.connect_timeout;
        match timeout(
            limit,
            wait_link(link, |l| l.state != TransportState::Connecting),
        )
        .await
        {
            Err(_) => {
                warn!("Timed out after {limit:?} waiting for the connection to open");
                Err(LiveError::Timeout(limit))
            }
            Ok(None) => Err(LiveError::closed("transport dropped")),
            Ok(Some(Link {
                state: TransportState::Open,
                ..
            })) => Ok(()),
            Ok(Some(Link {
                failure: Some(reason),
                ..
            })) => Err(LiveError::WebSocketError(reason)),
            Ok(Some(Link { state, .. })) => Err(LiveError::ConnectionClosed {
                code: None,
                reason: format!("connection is {state}"),
            }),
        }
    }

    /// Close the connection gracefully.
    ///
    /// Sends a close frame and waits (up to the connect timeout) for the relay
    /// to acknowledge it. A clean close is not reported to `on_error`.
    pub async fn close(&self) {
        let link = {
            let slot = self.inner.transport.lock();
            let Some(transport) = slot.as_ref() else {
                return;
            };
            match transport.state() {
                TransportState::Connecting | TransportState::Open => {
                    info!(attempt = transport.attempt, "Closing live relay connection");
                    transport
                        .link
                        .send_modify(|l| l.state = TransportState::Closing);
                    let _ = transport.outbound.send(Outbound::Close);
                }
                TransportState::Closing => {}
                TransportState::Closed => return,
            }
            transport.link.subscribe()
        };

        let limit = self.inner.connect_timeout;
        if timeout(limit, wait_link(link, |l| l.state == TransportState::Closed))
            .await
            .is_err()
        {
            warn!("Relay did not acknowledge close within {limit:?}");
        }
    }

    fn subscribe(&self) -> Option<watch::Receiver<Link>> {
        self.inner
            .transport
            .lock()
            .as_ref()
            .map(|transport| transport.link.subscribe())
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Queue an envelope on the open transport.
    ///
    /// When the transport is not open nothing is transmitted: the error is
    /// reported to `on_error` and returned.
    pub async fn send_message(&self, message: ClientMessage) -> LiveResult<()> {
        let outbound = {
            let slot = self.inner.transport.lock();
            match slot.as_ref() {
                Some(t) if t.state() == TransportState::Open => Ok(t.outbound.clone()),
                Some(t) => Err(t.state()),
                None => Err(TransportState::Closed),
            }
        };

        let outbound = match outbound {
            Ok(outbound) => outbound,
            Err(state) => {
                warn!(
                    kind = message.kind(),
                    "Cannot send message, WebSocket is not open (state: {state})"
                );
                return self.fail(LiveError::NotReady { state }).await;
            }
        };

        let json = match serialize_client_message(&message) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize message: {e}");
                return self
                    .fail(LiveError::Serialization(e.to_string()))
                    .await;
            }
        };

        if outbound.send(Outbound::Frame(json)).is_err() {
            return self
                .fail(LiveError::NotReady {
                    state: TransportState::Closed,
                })
                .await;
        }
        Ok(())
    }

    /// Send a chunk of base64-encoded PCM audio.
    pub async fn send_audio_chunk(&self, data: impl Into<String>) -> LiveResult<()> {
        self.send_message(ClientMessage::Audio(data.into())).await
    }

    /// Send a base64-encoded image.
    pub async fn send_image(&self, data: impl Into<String>) -> LiveResult<()> {
        self.send_message(ClientMessage::Image(data.into())).await
    }

    /// Signal the end of the user's input.
    pub async fn send_end_message(&self) -> LiveResult<()> {
        self.send_message(ClientMessage::End).await
    }

    pub async fn send_text_message(&self, text: impl Into<String>) -> LiveResult<()> {
        self.send_message(ClientMessage::Text(text.into())).await
    }

    /// Configure the session. Usually sent from the `on_connect` callback.
    pub async fn send_setup_message(&self, setup: SetupConfig) -> LiveResult<()> {
        self.send_message(ClientMessage::Setup(setup)).await
    }

    // =========================================================================
    // Transport task
    // =========================================================================

    async fn run_transport(
        weak: Weak<Inner>,
        url: String,
        close_timeout: Duration,
        attempt: u64,
        link: Arc<watch::Sender<Link>>,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
        mut ready: ReadySignal,
    ) {
        let ws_stream = match connect_async(url.as_str()).await {
            Ok((stream, response)) => {
                info!(
                    attempt,
                    "Connected to live relay (status: {})",
                    response.status()
                );
                stream
            }
            Err(e) => {
                error!(attempt, "Failed to connect to live relay: {e}");
                let reason = e.to_string();
                link.send_modify(|l| {
                    l.state = TransportState::Closed;
                    l.failure = Some(reason.clone());
                });
                drop(ready);
                if let Some(client) = current(&weak, attempt) {
                    client
                        .report(LiveError::WebSocketError(reason.clone()))
                        .await;
                    client.report(abnormal_closure(reason)).await;
                }
                return;
            }
        };

        // close() may already have moved the state to Closing
        link.send_modify(|l| {
            if l.state == TransportState::Connecting {
                l.state = TransportState::Open;
            }
        });

        let (mut ws_write, mut ws_read) = ws_stream.split();
        let mut closing = false;
        let mut close_deadline: Option<Instant> = None;
        let mut close_received = false;
        let mut failure: Option<String> = None;

        loop {
            tokio::select! {
                command = outbound.recv(), if !closing => match command {
                    Some(Outbound::Frame(json)) => {
                        trace!(attempt, "Sending frame: {}", json.chars().take(100).collect::<String>());
                        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
                            error!(attempt, "Failed to send WebSocket message: {e}");
                            failure = Some(e.to_string());
                            break;
                        }
                    }
                    // None: every client handle was dropped
                    Some(Outbound::Close) | None => {
                        closing = true;
                        close_deadline = Some(Instant::now() + close_timeout);
                        link.send_modify(|l| l.state = TransportState::Closing);
                        debug!(attempt, "Sending close frame");
                        if let Err(e) = ws_write.send(Message::Close(None)).await {
                            debug!(attempt, "Failed to send close frame: {e}");
                            break;
                        }
                    }
                },

                _ = sleep_until(close_deadline.unwrap_or_else(Instant::now)), if close_deadline.is_some() => {
                    warn!(attempt, "Relay did not answer the close frame within {close_timeout:?}");
                    break;
                }

                frame = ws_read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        trace!(attempt, "Received frame: {}", text.chars().take(100).collect::<String>());
                        if let Some(client) = current(&weak, attempt) {
                            let parsed = deserialize_server_message(text.as_str());
                            client.handle_frame(&mut ready, text.as_str(), parsed).await;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!(attempt, "Received binary frame: {} bytes", data.len());
                        if let Some(client) = current(&weak, attempt) {
                            let parsed = deserialize_binary_message(&data);
                            client
                                .handle_frame(&mut ready, &String::from_utf8_lossy(&data), parsed)
                                .await;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(attempt, "Live relay closed the connection: {:?}", frame);
                        close_received = true;
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake))) => {
                        debug!(attempt, "Connection reset without closing handshake");
                        break;
                    }
                    Some(Err(e)) => {
                        error!(attempt, "WebSocket error: {e}");
                        failure = Some(e.to_string());
                        break;
                    }
                    None => {
                        debug!(attempt, "WebSocket stream ended");
                        break;
                    }
                },
            }
        }

        // Flushes the close reply queued by tungstenite
        if timeout(close_timeout, ws_write.close()).await.is_err() {
            debug!(attempt, "Timed out flushing the close frame");
        }

        let clean = failure.is_none() && (close_received || closing);
        link.send_modify(|l| {
            l.state = TransportState::Closed;
            if l.failure.is_none() {
                l.failure = failure.clone();
            }
        });
        drop(ready);
        info!(attempt, clean, "Live relay message loop ended");

        // A newer connection owns the speaking flag and the error callback
        let Some(client) = current(&weak, attempt) else {
            debug!(attempt, "Superseded connection ended");
            return;
        };
        client.inner.speaking.store(false, Ordering::SeqCst);
        if let Some(reason) = failure {
            client
                .report(LiveError::WebSocketError(reason.clone()))
                .await;
            client.report(abnormal_closure(reason)).await;
        } else if !clean {
            client
                .report(abnormal_closure(
                    "connection ended without a close frame".to_string(),
                ))
                .await;
        }
    }

    async fn handle_frame(
        &self,
        ready: &mut ReadySignal,
        raw: &str,
        parsed: Result<ServerMessage, FrameError>,
    ) {
        let message = match parsed {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    "Failed to parse server message: {e} (payload: {})",
                    raw.chars().take(200).collect::<String>()
                );
                self.report(LiveError::ClientError {
                    message: e.to_string(),
                })
                .await;
                return;
            }
        };

        debug!(kind = message.kind(), "Dispatching server message");
        match message {
            ServerMessage::Error(err) => {
                warn!("Live relay error: {err}");
                self.report(LiveError::Server(err)).await;
            }
            ServerMessage::Ready => {
                if let Some(cb) = self.callback(|c| c.ready.clone()) {
                    cb().await;
                }
                if ready.resolve() {
                    info!("Live relay session is ready");
                } else {
                    debug!("Ignoring repeated ready signal");
                }
                if let Some(cb) = self.callback(|c| c.connect.clone()) {
                    cb(self.clone()).await;
                }
            }
            ServerMessage::Interrupted(data) => {
                self.inner.speaking.store(false, Ordering::SeqCst);
                if let Some(cb) = self.callback(|c| c.interrupted.clone()) {
                    cb(data).await;
                }
            }
            ServerMessage::Audio(chunk) => {
                self.inner.speaking.store(true, Ordering::SeqCst);
                if let Some(cb) = self.callback(|c| c.audio_data.clone()) {
                    cb(chunk).await;
                }
            }
            ServerMessage::Text(text) => {
                if let Some(cb) = self.callback(|c| c.text_content.clone()) {
                    cb(text).await;
                }
            }
            ServerMessage::TurnComplete => {
                self.inner.speaking.store(false, Ordering::SeqCst);
                if let Some(cb) = self.callback(|c| c.turn_complete.clone()) {
                    cb().await;
                }
            }
            ServerMessage::FunctionCall(data) => {
                if let Some(cb) = self.callback(|c| c.function_call.clone()) {
                    cb(data).await;
                }
            }
            ServerMessage::FunctionResponse(data) => {
                if let Some(cb) = self.callback(|c| c.function_response.clone()) {
                    cb(data).await;
                }
            }
            ServerMessage::InputTranscription(text) => {
                self.dispatch_transcript(TranscriptRole::User, text).await;
            }
            ServerMessage::OutputTranscription(text) => {
                self.dispatch_transcript(TranscriptRole::Assistant, text)
                    .await;
            }
            ServerMessage::Unknown(tag) => {
                debug!("Ignoring server message with unknown type: {:?}", tag);
            }
        }
    }

    async fn dispatch_transcript(&self, role: TranscriptRole, text: String) {
        if let Some(cb) = self.callback(|c| c.transcription.clone()) {
            cb(TranscriptResult { text, role }).await;
        }
    }
}

impl fmt::Debug for LiveClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveClient")
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .field("speaking", &self.is_speaking())
            .finish()
    }
}

/// The client, if it is still alive and `attempt` is its current transport.
fn current(weak: &Weak<Inner>, attempt: u64) -> Option<LiveClient> {
    let inner = weak.upgrade()?;
    let is_current = inner
        .transport
        .lock()
        .as_ref()
        .is_some_and(|t| t.attempt == attempt);
    is_current.then_some(LiveClient { inner })
}

fn abnormal_closure(reason: String) -> LiveError {
    LiveError::ConnectionClosed {
        code: Some(ABNORMAL_CLOSURE),
        reason,
    }
}

async fn wait_link(
    mut link: watch::Receiver<Link>,
    done: impl FnMut(&Link) -> bool,
) -> Option<Link> {
    link.wait_for(done).await.ok().map(|l| (*l).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::base::ErrorKind;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_new_client_initial_state() {
        let client = LiveClient::new("ws://localhost:8081").unwrap();
        assert_eq!(client.url(), "ws://localhost:8081");
        assert_eq!(client.state(), None);
        assert!(!client.is_open());
        assert!(!client.is_speaking());
        assert_eq!(client.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        let err = LiveClient::new("http://localhost:8081").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);

        let err = LiveClient::new("not a url").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn test_from_config_uses_timeout() {
        let config = ClientConfig {
            connect_timeout: Duration::from_millis(250),
            ..Default::default()
        };
        let client = LiveClient::from_config(&config).unwrap();
        assert_eq!(client.connect_timeout(), Duration::from_millis(250));
        assert_eq!(client.url(), config.server_url);
    }

    #[tokio::test]
    async fn test_send_without_connection_reports_not_ready() {
        let client = LiveClient::new("ws://localhost:8081").unwrap();
        let reported = Arc::new(AtomicUsize::new(0));
        let counter = reported.clone();
        client.on_error(Arc::new(move |err| {
            let counter = counter.clone();
            Box::pin(async move {
                assert_eq!(err.kind(), ErrorKind::NotReady);
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }));

        let result = client.send_text_message("hello").await;
        match result {
            Err(LiveError::NotReady { state }) => assert_eq!(state, TransportState::Closed),
            other => panic!("expected NotReady, got {other:?}"),
        }
        assert!(client.send_end_message().await.is_err());
        assert_eq!(reported.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_send_without_error_callback_still_returns_error() {
        let client = LiveClient::new("ws://localhost:8081").unwrap();
        let result = client.send_audio_chunk("AAAA").await;
        assert!(matches!(result, Err(LiveError::NotReady { .. })));
    }

    #[tokio::test]
    async fn test_close_without_connection_is_noop() {
        let client = LiveClient::new("ws://localhost:8081").unwrap();
        client.close().await;
        assert_eq!(client.state(), None);
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let client = LiveClient::new("ws://localhost:8081").unwrap();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        client.on_error(Arc::new(move |_| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }));
        let counter = second.clone();
        client.on_error(Arc::new(move |_| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }));

        let _ = client.send_image("AAAA").await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_frame_reports_client_error() {
        let client = LiveClient::new("ws://localhost:8081").unwrap();
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let sink = kinds.clone();
        client.on_error(Arc::new(move |err| {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().push(err.kind());
            })
        }));

        let (mut signal, ready) = ready_pair();
        let raw = "{not json";
        client
            .handle_frame(&mut signal, raw, deserialize_server_message(raw))
            .await;

        assert_eq!(*kinds.lock(), vec![ErrorKind::ClientError]);
        assert!(!ready.is_resolved());
    }

    #[tokio::test]
    async fn test_speaking_flag_transitions() {
        let client = LiveClient::new("ws://localhost:8081").unwrap();
        let (mut signal, _ready) = ready_pair();

        for (raw, speaking) in [
            (r#"{"type":"audio","data":"AAAA"}"#, true),
            (r#"{"type":"text","data":"still talking"}"#, true),
            (r#"{"type":"interrupted","data":{}}"#, false),
            (r#"{"type":"audio","data":"AAAA"}"#, true),
            (r#"{"type":"turn_complete"}"#, false),
        ] {
            client
                .handle_frame(&mut signal, raw, deserialize_server_message(raw))
                .await;
            assert_eq!(client.is_speaking(), speaking, "after {raw}");
        }
    }

    #[tokio::test]
    async fn test_ready_resolves_once_and_calls_connect_each_time() {
        let client = LiveClient::new("ws://localhost:8081").unwrap();
        let ready_calls = Arc::new(AtomicUsize::new(0));
        let connect_calls = Arc::new(AtomicUsize::new(0));

        let counter = ready_calls.clone();
        client.on_ready(Arc::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }));
        let counter = connect_calls.clone();
        client.on_connect(Arc::new(move |_client| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }));

        let (mut signal, ready) = ready_pair();
        let raw = r#"{"ready":true}"#;
        client
            .handle_frame(&mut signal, raw, deserialize_server_message(raw))
            .await;
        assert!(ready.clone().await.is_ok());

        client
            .handle_frame(&mut signal, raw, deserialize_server_message(raw))
            .await;
        assert!(ready.await.is_ok());
        assert_eq!(ready_calls.load(Ordering::SeqCst), 2);
        assert_eq!(connect_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transcription_roles() {
        let client = LiveClient::new("ws://localhost:8081").unwrap();
        let transcripts = Arc::new(Mutex::new(Vec::new()));
        let sink = transcripts.clone();
        client.on_transcription(Arc::new(move |t| {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().push(t);
            })
        }));

        let (mut signal, _ready) = ready_pair();
        for raw in [
            r#"{"type":"input_transcription","data":"what time is it"}"#,
            r#"{"type":"output_transcription","data":"it is noon"}"#,
        ] {
            client
                .handle_frame(&mut signal, raw, deserialize_server_message(raw))
                .await;
        }

        let transcripts = transcripts.lock();
        assert_eq!(transcripts.len(), 2);
        assert_eq!(transcripts[0].role, TranscriptRole::User);
        assert_eq!(transcripts[0].text, "what time is it");
        assert_eq!(transcripts[1].role, TranscriptRole::Assistant);
    }
}
