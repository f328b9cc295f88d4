//! Live relay session module.
//!
//! Client side of a multiplexed realtime session with a multimodal relay:
//! one persistent WebSocket carries audio, images, text, setup and control
//! envelopes upstream, and audio, text, transcripts, tool activity and turn
//! boundaries downstream.
//!
//! # Architecture
//!
//! - [`LiveClient`] owns the connection and the callback registry
//! - [`messages`] defines the JSON envelopes and frame classification
//! - [`ReadyFuture`] completes when the relay sends its readiness handshake
//!
//! # Session Flow
//!
//! ```text
//! connect() ──► {"ready": true} ──► on_ready / on_connect ──► setup
//!     │
//!     ├─► audio / image / text ──────────────► relay
//!     ◄── audio / text / transcripts / tools ── relay
//!     │
//!     └─► end / close()
//! ```

mod base;
mod client;
pub mod messages;
mod ready;

pub use base::{
    AudioDataCallback, ConnectCallback, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_SERVER_URL,
    ErrorCallback, ErrorKind, FunctionCallCallback, FunctionResponseCallback,
    InterruptedCallback, LiveError, LiveResult, OUTPUT_SAMPLE_RATE, RECONNECT_ACTION,
    ReadyCallback, TextContentCallback, TranscriptResult, TranscriptRole, TranscriptionCallback,
    TransportState, TurnCompleteCallback,
};
pub use client::LiveClient;
pub use messages::{
    AudioChunk, ClientMessage, FrameError, ResponseModality, ServerError, ServerMessage,
    SetupConfig,
};
pub use ready::ReadyFuture;
