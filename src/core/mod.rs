pub mod session;

// Re-export commonly used types for convenience
pub use session::{
    AudioChunk, ClientMessage, ErrorKind, LiveClient, LiveError, LiveResult, ReadyFuture,
    ResponseModality, ServerError, ServerMessage, SetupConfig, TranscriptResult, TranscriptRole,
    TransportState,
};
