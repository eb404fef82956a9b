use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

use crate::accumulator::ConversationState;
use crate::cancel::CancelToken;
use crate::classifier::classify;
use crate::config::{StreamConfig, WireProtocol};
use crate::decoder::{FrameDecoder, RawFrame};
use crate::errors::{FrameError, StreamError};
use crate::message::{CompletedMessage, FinishReason};
use crate::reveal::Revealer;
use crate::sequencer::Sequencer;
use crate::store::MessageStore;
use crate::transport::{Transport, TransportHandle, TurnRequest};

/// How a consumed stream ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamEnd {
    /// The transport closed on its own.
    Closed,
    /// The consumer cancelled and the transport was aborted.
    Cancelled,
}

/// Summary returned once a stream has been fully applied and finalized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamOutcome {
    pub end: StreamEnd,
    /// Classified frames applied to the conversation.
    pub frames_applied: u64,
    /// Frames dropped as malformed or oversize.
    pub frames_skipped: u64,
}

/// Builder for [`Engine`].
#[derive(Clone, Debug, Default)]
pub struct EngineBuilder {
    config: StreamConfig,
}

impl EngineBuilder {
    pub fn config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    pub fn protocol(mut self, protocol: WireProtocol) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// Validates the configuration and builds the engine.
    pub fn build(self) -> Result<Engine, StreamError> {
        self.config.validate()?;
        let store = Arc::new(MessageStore::new());
        let token = CancelToken::new(self.config.cancel_grace);
        let revealer = Revealer::new(Arc::clone(&store), token.clone(), &self.config);
        Ok(Engine {
            config: self.config,
            store,
            token,
            revealer,
            sequencer: Sequencer::new(),
        })
    }
}

/// Streaming response reconstruction for one conversation.
///
/// Bytes from the transport are framed, classified and queued on the
/// sequencer; each queued frame is revealed into the message store before
/// the next one starts. Renderers observe the store through
/// [`Engine::subscribe`].
pub struct Engine {
    config: StreamConfig,
    store: Arc<MessageStore>,
    token: CancelToken,
    revealer: Revealer,
    sequencer: Sequencer,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.store.subscribe()
    }

    pub fn snapshot(&self) -> ConversationState {
        self.store.snapshot()
    }

    /// Token shared with whoever offers "stop generating".
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Finalizes the open message from outside the stream (for example on
    /// teardown). No-op when nothing is open.
    ///
    /// Runs on the sequencer behind any queued frames, with the reveal
    /// fast-forwarded, so an in-flight reveal lands in the message being
    /// finalized instead of reopening it.
    pub async fn finalize(&self) -> Option<CompletedMessage> {
        let (tx, rx) = oneshot::channel();
        let store = Arc::clone(&self.store);
        self.revealer.set_fast_forward(true);
        self.sequencer.push(move || async move {
            let _ = tx.send(store.finalize(FinishReason::Manual));
        });
        let finalized = rx.await.ok().flatten();
        self.revealer.set_fast_forward(false);
        finalized
    }

    /// Opens the turn on `transport` and consumes it. One attempt, no retry.
    pub async fn run(
        &self,
        transport: &dyn Transport,
        request: &TurnRequest,
    ) -> Result<StreamOutcome, StreamError> {
        let handle = transport.open(request).await?;
        self.consume(handle, &request.correlation_id).await
    }

    /// Consumes an already open response body.
    ///
    /// `turn_id` is the correlation id for frames that carry none. On a clean
    /// close or a cancel the open message is finalized. On a transport error
    /// the frames received so far are applied and the open message is left
    /// in place for the caller to keep or discard.
    pub async fn consume(
        &self,
        handle: TransportHandle,
        turn_id: &str,
    ) -> Result<StreamOutcome, StreamError> {
        let TransportHandle { mut stream, abort } = handle;
        let mut decoder = FrameDecoder::new(self.config.protocol, self.config.max_frame_bytes);
        let mark = self.token.mark();
        self.revealer.set_fast_forward(false);
        self.store.begin_turn();
        let mut counts = Counts::default();

        let end = loop {
            tokio::select! {
                biased;
                () = self.token.cancelled_since(mark) => {
                    abort.abort();
                    break StreamEnd::Cancelled;
                }
                next = stream.next() => match next {
                    Some(Ok(chunk)) => {
                        self.dispatch(decoder.push_chunk(&chunk), turn_id, &mut counts);
                    }
                    Some(Err(err)) if err.is_abort() => break StreamEnd::Cancelled,
                    Some(Err(err)) => {
                        warn!(turn_id, error = %err, "transport failed mid-stream");
                        self.sequencer.wait_idle().await;
                        return Err(StreamError::Transport(err));
                    }
                    None => {
                        self.dispatch(decoder.finish(), turn_id, &mut counts);
                        break StreamEnd::Closed;
                    }
                }
            }
        };
        drop(stream);

        if end == StreamEnd::Cancelled {
            self.revealer.set_fast_forward(true);
        }
        self.sequencer.wait_idle().await;
        let reason = match end {
            StreamEnd::Closed => FinishReason::StreamClosed,
            StreamEnd::Cancelled => FinishReason::Cancelled,
        };
        self.store.finalize(reason);
        debug!(
            turn_id,
            ?end,
            frames_applied = counts.applied,
            frames_skipped = counts.skipped,
            "stream consumed"
        );
        Ok(StreamOutcome {
            end,
            frames_applied: counts.applied,
            frames_skipped: counts.skipped,
        })
    }

    fn dispatch(
        &self,
        frames: Vec<Result<RawFrame, FrameError>>,
        turn_id: &str,
        counts: &mut Counts,
    ) {
        for raw in frames {
            let raw = match raw {
                Ok(raw) => raw,
                Err(err) => {
                    counts.skip(turn_id, &err);
                    continue;
                }
            };
            for classified in classify(self.config.protocol, &raw, turn_id) {
                match classified {
                    Ok(frame) => {
                        counts.applied += 1;
                        debug!(correlation_id = %frame.correlation_id, kind = %frame.kind(), "frame queued");
                        let revealer = self.revealer.clone();
                        self.sequencer
                            .push(move || async move { revealer.reveal(frame).await });
                    }
                    Err(err) => counts.skip(turn_id, &err),
                }
            }
        }
    }
}

#[derive(Default)]
struct Counts {
    applied: u64,
    skipped: u64,
}

impl Counts {
    fn skip(&mut self, turn_id: &str, err: &FrameError) {
        self.skipped += 1;
        warn!(turn_id, error = %err, "skipping malformed frame");
    }
}
