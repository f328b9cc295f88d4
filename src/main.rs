use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use clap::{Parser, ValueEnum};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use live_session::core::session::OUTPUT_SAMPLE_RATE;
use live_session::{ClientConfig, ClientMessage, LiveClient, ResponseModality};

/// How long to wait for the model to finish its answer after stdin closes.
const FINAL_TURN_TIMEOUT: Duration = Duration::from_secs(30);

/// Live Session - terminal client for a realtime multimodal relay
#[derive(Parser, Debug)]
#[command(name = "live-session")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Relay WebSocket address (overrides configuration)
    #[arg(short = 'u', long = "url", value_name = "URL")]
    url: Option<String>,

    /// Response modality requested in setup
    #[arg(short = 'm', long = "modality", value_enum)]
    modality: Option<ModalityArg>,

    /// Ask the relay to transcribe user audio
    #[arg(long)]
    input_transcription: bool,

    /// Ask the relay to transcribe model audio
    #[arg(long)]
    output_transcription: bool,

    /// Image sent once the session is ready
    #[arg(long, value_name = "FILE")]
    image: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModalityArg {
    Audio,
    Text,
}

impl From<ModalityArg> for ResponseModality {
    fn from(value: ModalityArg) -> Self {
        match value {
            ModalityArg::Audio => ResponseModality::Audio,
            ModalityArg::Text => ResponseModality::Text,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Logs go to stderr so they do not interleave with the conversation
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Initialize crypto provider for wss:// connections
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    // Load configuration from file or environment
    let mut config = if let Some(config_path) = &cli.config {
        info!("Loading configuration from {}", config_path.display());
        ClientConfig::from_file(config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ClientConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };
    apply_cli_overrides(&mut config, &cli);
    config.validate().map_err(|e| anyhow!(e))?;

    let image = match &cli.image {
        Some(path) => Some(
            tokio::fs::read(path)
                .await
                .map_err(|e| anyhow!("Failed to read image {}: {e}", path.display()))?,
        ),
        None => None,
    };

    let client = LiveClient::from_config(&config)?;
    let turn_done = Arc::new(Notify::new());
    let awaiting_turn = Arc::new(AtomicBool::new(false));
    register_handlers(
        &client,
        &config,
        image,
        turn_done.clone(),
        awaiting_turn.clone(),
    );

    println!("Connecting to {} ...", client.url());
    client.connect().await?;
    println!(
        "Session ready ({}). Type a message and press Enter; Ctrl-D to finish.",
        config.setup.modality
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    let text = line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    if client.send_text_message(text).await.is_ok() {
                        awaiting_turn.store(true, Ordering::SeqCst);
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }

        if !client.is_open() {
            warn!("Connection is no longer open");
            break;
        }
    }

    if client.is_open() {
        let finished = turn_done.notified();
        tokio::pin!(finished);
        finished.as_mut().enable();

        let _ = client.send_end_message().await;
        if awaiting_turn.load(Ordering::SeqCst)
            && tokio::time::timeout(FINAL_TURN_TIMEOUT, finished)
                .await
                .is_err()
        {
            warn!("Model did not finish its turn within {FINAL_TURN_TIMEOUT:?}");
        }
    }

    client.close().await;
    Ok(())
}

fn apply_cli_overrides(config: &mut ClientConfig, cli: &Cli) {
    if let Some(url) = &cli.url {
        config.server_url = url.clone();
    }
    if let Some(modality) = cli.modality {
        config.setup.modality = modality.into();
    }
    if cli.input_transcription {
        config.setup.input_audio_transcription = true;
    }
    if cli.output_transcription {
        config.setup.output_audio_transcription = true;
    }
}

fn register_handlers(
    client: &LiveClient,
    config: &ClientConfig,
    image: Option<Vec<u8>>,
    turn_done: Arc<Notify>,
    awaiting_turn: Arc<AtomicBool>,
) {
    // The image follows setup so the relay has a configured session first
    let setup = config.setup.clone();
    let image = Arc::new(Mutex::new(
        image.map(|bytes| ClientMessage::image_from_bytes(&bytes)),
    ));
    client.on_connect(Arc::new(move |client| {
        let setup = setup.clone();
        let image = image.clone();
        Box::pin(async move {
            if let Err(e) = client.send_setup_message(setup).await {
                warn!("Failed to send setup: {e}");
                return;
            }
            // Sent once, even if the relay signals ready again
            let pending = image.lock().take();
            if let Some(image) = pending {
                match client.send_message(image).await {
                    Ok(()) => println!("[image sent]"),
                    Err(e) => warn!("Failed to send image: {e}"),
                }
            }
        })
    }));

    client.on_text_content(Arc::new(|text| {
        Box::pin(async move {
            print!("{text}");
            let _ = std::io::stdout().flush();
        })
    }));

    let audio_bytes = Arc::new(AtomicUsize::new(0));
    let counter = audio_bytes.clone();
    client.on_audio_data(Arc::new(move |chunk| {
        let counter = counter.clone();
        Box::pin(async move {
            match chunk.decode() {
                Ok(pcm) => {
                    counter.fetch_add(pcm.len(), Ordering::SeqCst);
                }
                Err(e) => warn!("Failed to decode audio chunk: {e}"),
            }
        })
    }));

    client.on_transcription(Arc::new(|transcript| {
        Box::pin(async move {
            println!("[{} transcript] {}", transcript.role, transcript.text);
        })
    }));

    client.on_function_call(Arc::new(|call| {
        Box::pin(async move {
            println!("[function call] {call}");
        })
    }));

    client.on_function_response(Arc::new(|response| {
        Box::pin(async move {
            println!("[function response] {response}");
        })
    }));

    client.on_interrupted(Arc::new(|_| {
        Box::pin(async move {
            println!("\n[interrupted]");
        })
    }));

    client.on_turn_complete(Arc::new(move || {
        let audio_bytes = audio_bytes.clone();
        let turn_done = turn_done.clone();
        let awaiting_turn = awaiting_turn.clone();
        Box::pin(async move {
            let bytes = audio_bytes.swap(0, Ordering::SeqCst);
            if bytes > 0 {
                // PCM16 mono
                let seconds = bytes as f64 / 2.0 / f64::from(OUTPUT_SAMPLE_RATE);
                println!("\n[audio: {bytes} bytes, {seconds:.1}s]");
            }
            println!("\n[turn complete]");
            awaiting_turn.store(false, Ordering::SeqCst);
            turn_done.notify_waiters();
        })
    }));

    client.on_error(Arc::new(|err| {
        Box::pin(async move {
            match err.action() {
                Some(action) => eprintln!("[{}] {err} {action}", err.kind()),
                None => eprintln!("[{}] {err}", err.kind()),
            }
        })
    }));
}
