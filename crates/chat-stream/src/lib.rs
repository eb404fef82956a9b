//! Reconstructs assistant chat messages from a streaming AI backend.
//!
//! Raw response bytes are framed (NDJSON or SSE), classified into thought,
//! source, answer, end-of-turn and error events, and folded in arrival order
//! into one open message per conversation. Text is revealed a few characters
//! at a time for a typewriter effect; cancelling fast-forwards the reveal and
//! finalizes the turn.
//!
//! # Usage
//!
//! ```no_run
//! use chat_stream::prelude::*;
//! use chat_stream::transport::{HttpTransport, HttpTransportConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), StreamError> {
//! let engine = Engine::builder()
//!     .config(StreamConfig::from_env())
//!     .protocol(WireProtocol::Ndjson)
//!     .build()?;
//! let transport = HttpTransport::new(
//!     HttpTransportConfig::new("http://localhost:8080/chat").header("x-session", "abc"),
//! )?;
//!
//! let mut updates = engine.subscribe();
//! tokio::spawn(async move {
//!     while updates.changed().await.is_ok() {
//!         let state = updates.borrow_and_update().clone();
//!         if let Some(open) = &state.open {
//!             println!("{}", open.answer_text);
//!         }
//!     }
//! });
//!
//! let request = TurnRequest::with_generated_id(serde_json::json!({"message": "BTC outlook?"}));
//! engine.run(&transport, &request).await?;
//! println!("{} messages", engine.snapshot().completed.len());
//! # Ok(())
//! # }
//! ```

/// Folding classified frames into conversation state.
pub mod accumulator;
/// Per-engine self-healing cancellation token.
pub mod cancel;
/// Wire frame classification.
pub mod classifier;
/// Engine configuration.
pub mod config;
/// Byte-stream framing.
pub mod decoder;
/// Engine entry point.
pub mod engine;
/// Error taxonomy.
pub mod errors;
/// Classified frame types.
pub mod frame;
/// Message data model.
pub mod message;
/// Tracing subscriber setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Typewriter reveal scheduler.
pub mod reveal;
/// Ordered single-flight job queue.
pub mod sequencer;
/// Observable conversation state.
pub mod store;
/// Transport contract and HTTP implementation.
pub mod transport;

pub use accumulator::{ConversationState, reduce};
pub use cancel::CancelToken;
pub use config::{StreamConfig, WireProtocol};
pub use engine::{Engine, EngineBuilder, StreamEnd, StreamOutcome};
pub use errors::{FrameError, StreamError, TransportError};
pub use frame::{FrameKind, StreamFrame, ThoughtDelta, TurnEvent};
pub use message::{CompletedMessage, FinishReason, PartialMessage, SourceDetail, ThoughtStep};
pub use transport::{AbortHandle, Transport, TransportHandle, TurnRequest};
