//! Replays a captured chat response through the reconstruction engine.
//!
//! Without `--url` the file is a recorded response body (NDJSON or SSE) fed
//! to the engine in fixed-size chunks. With `--url` the file is a JSON
//! request body posted to a live backend. The revealed answer is printed
//! as it grows, followed by one JSON line per completed message.

mod replay;

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use chat_stream::observability::init_observability;
use chat_stream::prelude::*;
use chat_stream::transport::{HttpTransport, HttpTransportConfig};
use clap::Parser;
use tokio::sync::{oneshot, watch};

use replay::{LiveText, file_body, request_body, schedule_cancel, write_completed};

#[derive(Parser, Debug)]
#[command(name = "chat-stream-replay")]
#[command(about = "Replay a captured chat stream through the reconstruction engine")]
struct Args {
    /// Captured response body, or the JSON request body when --url is set
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Wire framing (ndjson or sse); default: CHAT_STREAM_PROTOCOL or ndjson
    #[arg(long, value_name = "PROTOCOL")]
    protocol: Option<WireProtocol>,

    /// Bytes per replayed chunk
    #[arg(long, value_name = "N", default_value_t = 64)]
    chunk_bytes: usize,

    /// Press "stop generating" after this many milliseconds
    #[arg(long, value_name = "MS")]
    cancel_after_ms: Option<u64>,

    /// POST the file to this endpoint instead of replaying it
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// Extra request header for --url, as NAME=VALUE (repeatable)
    #[arg(long = "header", value_name = "NAME=VALUE")]
    headers: Vec<String>,

    /// Skip the typewriter output and print only the completed messages
    #[arg(long)]
    no_live: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_observability();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "replay failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), String> {
    let mut config = StreamConfig::from_env();
    if let Some(protocol) = args.protocol {
        config.protocol = protocol;
    }
    let engine = Engine::builder()
        .config(config)
        .build()
        .map_err(|err| err.to_string())?;

    let (stop_tx, renderer) = if args.no_live {
        (None, None)
    } else {
        let (tx, rx) = oneshot::channel();
        (Some(tx), Some(tokio::spawn(render(engine.subscribe(), rx))))
    };
    if let Some(ms) = args.cancel_after_ms {
        schedule_cancel(engine.cancel_token(), Duration::from_millis(ms));
    }

    let result = match &args.url {
        Some(url) => {
            let mut transport_config = HttpTransportConfig::new(url.clone());
            for header in &args.headers {
                let (name, value) = header
                    .split_once('=')
                    .ok_or_else(|| format!("header `{header}` is not NAME=VALUE"))?;
                transport_config = transport_config.header(name.trim(), value.trim());
            }
            let transport = HttpTransport::new(transport_config).map_err(|err| err.to_string())?;
            let request = TurnRequest::with_generated_id(request_body(&args.file)?);
            engine.run(&transport, &request).await
        }
        None => {
            let body = file_body(&args.file, args.chunk_bytes)
                .map_err(|err| format!("failed to read {}: {err}", args.file.display()))?;
            engine.consume(body, "replay").await
        }
    };

    if let (Some(stop), Some(renderer)) = (stop_tx, renderer) {
        let _ = stop.send(());
        let _ = renderer.await;
    }

    let state = engine.snapshot();
    let mut stdout = std::io::stdout().lock();
    write_completed(&mut stdout, &state.completed).map_err(|err| err.to_string())?;
    match result {
        Ok(outcome) => {
            tracing::info!(
                end = ?outcome.end,
                frames_applied = outcome.frames_applied,
                frames_skipped = outcome.frames_skipped,
                completed = state.completed.len(),
                "replay finished"
            );
            Ok(())
        }
        Err(err) => {
            if let Some(open) = &state.open {
                tracing::warn!(id = %open.id, chars = open.answer_text.len(), "partial message left open");
            }
            Err(err.to_string())
        }
    }
}

/// Prints answer growth until told to stop, then flushes what is left.
async fn render(mut updates: watch::Receiver<ConversationState>, mut stop: oneshot::Receiver<()>) {
    let mut live = LiveText::default();
    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let text = live.advance(&updates.borrow_and_update());
                print_live(&text);
            }
        }
    }
    let text = live.advance(&updates.borrow());
    print_live(&text);
}

fn print_live(text: &str) {
    if text.is_empty() {
        return;
    }
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
}
