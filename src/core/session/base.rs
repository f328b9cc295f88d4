//! Base types for the live session client.
//!
//! This module defines the error taxonomy, the transport lifecycle state and
//! the callback signatures shared by [`LiveClient`](super::LiveClient) and its
//! message layer.
//!
//! # Audio Format
//!
//! Audio travels as base64-encoded PCM 16-bit signed little-endian, mono.
//! Model output is produced at 24kHz.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::client::LiveClient;
use super::messages::{AudioChunk, ServerError};

/// Default relay address used when nothing is configured.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8081";

/// Default bound for [`LiveClient::ensure_connected`].
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Sample rate of PCM audio produced by the relay.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Instruction attached to unexpected connection loss.
pub const RECONNECT_ACTION: &str = "Please refresh the page or reconnect to continue.";

// =============================================================================
// Error Types
// =============================================================================

/// Errors surfaced by the live session client.
///
/// Every error reaches the registered `on_error` handler; operations that can
/// fail also return it so callers can branch without a handler.
#[derive(Debug, Clone, Error)]
pub enum LiveError {
    /// An inbound frame could not be decoded and was dropped
    #[error("Failed to parse server message: {message}")]
    ClientError { message: String },

    /// Transport-level failure (handshake, I/O or protocol)
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// The connection ended without a clean close handshake
    #[error("Connection closed unexpectedly: {reason}")]
    ConnectionClosed { code: Option<u16>, reason: String },

    /// A send was attempted while the transport was not open
    #[error("WebSocket is not open (current state: {state}). Please try again.")]
    NotReady { state: TransportState },

    /// `ensure_connected` gave up waiting for the transport
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// An `error` envelope sent by the relay, passed through verbatim
    #[error("Server error: {0}")]
    Server(ServerError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LiveError {
    /// Machine-readable category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LiveError::ClientError { .. } => ErrorKind::ClientError,
            LiveError::WebSocketError(_) => ErrorKind::WebSocketError,
            LiveError::ConnectionClosed { .. } => ErrorKind::ConnectionClosed,
            LiveError::NotReady { .. } => ErrorKind::NotReady,
            LiveError::Timeout(_) => ErrorKind::Timeout,
            LiveError::Server(_) => ErrorKind::ServerError,
            LiveError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            LiveError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// User-facing instruction for recovering from this error, if any.
    pub fn action(&self) -> Option<&str> {
        match self {
            LiveError::ConnectionClosed { .. } => Some(RECONNECT_ACTION),
            LiveError::NotReady { .. } => Some("Wait for the connection to open and try again."),
            LiveError::Timeout(_) => Some("Check that the server is reachable and try again."),
            LiveError::Server(err) => err.action(),
            _ => None,
        }
    }

    pub(crate) fn closed(reason: impl Into<String>) -> Self {
        LiveError::ConnectionClosed {
            code: None,
            reason: reason.into(),
        }
    }
}

/// Result type for live session operations.
pub type LiveResult<T> = Result<T, LiveError>;

/// Category of a [`LiveError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ClientError,
    WebSocketError,
    ConnectionClosed,
    NotReady,
    Timeout,
    ServerError,
    InvalidConfiguration,
    Serialization,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ClientError => "client_error",
            ErrorKind::WebSocketError => "websocket_error",
            ErrorKind::ConnectionClosed => "connection_closed",
            ErrorKind::NotReady => "not_ready",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ServerError => "server_error",
            ErrorKind::InvalidConfiguration => "invalid_configuration",
            ErrorKind::Serialization => "serialization",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Transport State
// =============================================================================

/// Lifecycle state of the underlying WebSocket transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// Handshake in progress
    #[default]
    Connecting,
    /// Frames can be exchanged
    Open,
    /// A close frame was sent, waiting for the peer
    Closing,
    /// The transport is gone
    Closed,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Connecting => write!(f, "CONNECTING"),
            TransportState::Open => write!(f, "OPEN"),
            TransportState::Closing => write!(f, "CLOSING"),
            TransportState::Closed => write!(f, "CLOSED"),
        }
    }
}

// =============================================================================
// Callback Types
// =============================================================================

/// Transcript of user or model speech emitted by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptResult {
    /// The transcribed text
    pub text: String,
    /// Role of the speaker (user or assistant)
    pub role: TranscriptRole,
}

/// Role of the speaker in a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    /// Transcript of the audio the user sent
    User,
    /// Transcript of the audio the model produced
    Assistant,
}

impl fmt::Display for TranscriptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptRole::User => write!(f, "user"),
            TranscriptRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Callback type for the server readiness signal.
pub type ReadyCallback = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for audio output chunks.
pub type AudioDataCallback =
    Arc<dyn Fn(AudioChunk) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for model text output.
pub type TextContentCallback =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for error events.
pub type ErrorCallback =
    Arc<dyn Fn(LiveError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for turn completion.
pub type TurnCompleteCallback =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for function call requests.
pub type FunctionCallCallback =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for function call results.
pub type FunctionResponseCallback =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for interruptions of the model's output.
pub type InterruptedCallback =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type invoked after each readiness signal.
///
/// Receives a handle to the client so the session can be configured (usually
/// by sending `setup`). Storing the handle inside another callback creates a
/// reference cycle that keeps the client alive.
pub type ConnectCallback =
    Arc<dyn Fn(LiveClient) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for speech transcripts.
pub type TranscriptionCallback =
    Arc<dyn Fn(TranscriptResult) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;
