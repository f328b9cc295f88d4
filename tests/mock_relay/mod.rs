//! Scripted WebSocket relay for integration tests
//!
//! Each accepted connection plays the same script: push frames, wait for
//! client frames, pause, then end the connection cleanly or abruptly.
//! Every text or binary frame the client sends is recorded as JSON.

// Not every test binary uses every helper
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// One step of a relay script
#[derive(Debug, Clone)]
pub enum Step {
    /// Send a JSON envelope as a text frame
    Json(Value),
    /// Send raw text, which need not be valid JSON
    Text(String),
    /// Send a JSON envelope as a binary frame
    Binary(Value),
    /// Wait for this many client frames
    Expect(usize),
    Sleep(Duration),
    /// Send a close frame and finish the handshake
    Close,
    /// Drop the TCP connection without a close frame
    Drop,
}

/// Mock relay listening on an ephemeral local port
pub struct MockRelay {
    pub url: String,
    received: mpsc::UnboundedReceiver<Value>,
    connections: Arc<AtomicUsize>,
}

impl MockRelay {
    /// Start a relay that plays `script` on every connection
    pub async fn start(script: Vec<Step>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let connections = Arc::new(AtomicUsize::new(0));
        let script = Arc::new(script);

        let counter = connections.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, script.clone(), tx.clone(), counter.clone()));
            }
        });

        Self {
            url: format!("ws://{addr}"),
            received: rx,
            connections,
        }
    }

    /// Next frame the client sent, if one arrives within two seconds
    pub async fn next_client_message(&mut self) -> Option<Value> {
        tokio::time::timeout(Duration::from_secs(2), self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// Number of completed WebSocket handshakes
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Accepts TCP connections but never answers the WebSocket handshake
pub async fn silent_listener() -> (String, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    (format!("ws://{addr}"), handle)
}

/// Address of a local port with nothing listening on it
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}")
}

fn record(message: Message, received: &mpsc::UnboundedSender<Value>) {
    let text = match message {
        Message::Text(text) => text.as_str().to_string(),
        Message::Binary(data) => String::from_utf8_lossy(&data).into_owned(),
        _ => return,
    };
    let value = serde_json::from_str(&text).unwrap_or(Value::String(text));
    let _ = received.send(value);
}

async fn serve(
    stream: TcpStream,
    script: Arc<Vec<Step>>,
    received: mpsc::UnboundedSender<Value>,
    connections: Arc<AtomicUsize>,
) {
    let Ok(ws_stream) = accept_async(stream).await else {
        return;
    };
    connections.fetch_add(1, Ordering::SeqCst);
    let (mut write, mut read) = ws_stream.split();

    for step in script.iter() {
        match step {
            Step::Json(value) => {
                if write
                    .send(Message::Text(value.to_string().into()))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Step::Text(text) => {
                if write.send(Message::Text(text.clone().into())).await.is_err() {
                    return;
                }
            }
            Step::Binary(value) => {
                if write
                    .send(Message::Binary(value.to_string().into_bytes().into()))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Step::Expect(count) => {
                let mut seen = 0;
                while seen < *count {
                    match read.next().await {
                        Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => {
                            record(msg, &received);
                            seen += 1;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(_)) | None => return,
                    }
                }
            }
            Step::Sleep(duration) => tokio::time::sleep(*duration).await,
            Step::Close => {
                let _ = write.send(Message::Close(None)).await;
                // Drain until the client's reply completes the handshake
                while let Some(Ok(_)) = read.next().await {}
                return;
            }
            Step::Drop => return,
        }
    }

    // Script finished: keep recording until the client goes away
    while let Some(Ok(msg)) = read.next().await {
        record(msg, &received);
    }
}
