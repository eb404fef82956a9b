use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::config::StreamConfig;
use crate::frame::{StreamFrame, TurnEvent};
use crate::store::MessageStore;

/// Typewriter scheduler.
///
/// Answer and thought text is applied a few characters at a time with a
/// delay between slices; each slice is visible to subscribers before the
/// next one lands. While the cancel token is asserted, or after the engine
/// has latched fast-forward for an aborted turn, whatever remains of a chunk
/// is applied in one step.
#[derive(Clone, Debug)]
pub struct Revealer {
    store: Arc<MessageStore>,
    token: CancelToken,
    fast_forward: Arc<AtomicBool>,
    slice_chars: usize,
    answer_delay: Duration,
    thought_delay: Duration,
}

impl Revealer {
    pub fn new(store: Arc<MessageStore>, token: CancelToken, config: &StreamConfig) -> Self {
        Self {
            store,
            token,
            fast_forward: Arc::new(AtomicBool::new(false)),
            slice_chars: config.slice_chars.max(1),
            answer_delay: config.answer_delay,
            thought_delay: config.thought_delay,
        }
    }

    /// Latches fast-forward independently of the token's re-arm window.
    pub(crate) fn set_fast_forward(&self, on: bool) {
        self.fast_forward.store(on, Ordering::SeqCst);
    }

    fn fast_forwarding(&self) -> bool {
        self.token.is_cancelled() || self.fast_forward.load(Ordering::SeqCst)
    }

    /// Applies `frame`, slicing its text when the kind is animated.
    pub async fn reveal(&self, frame: StreamFrame) {
        match &frame.event {
            TurnEvent::AnswerDelta(text) => {
                self.reveal_text(&frame, text, self.answer_delay, |slice| {
                    TurnEvent::AnswerDelta(slice.to_string())
                })
                .await;
            }
            TurnEvent::ThoughtDelta(delta) => {
                self.reveal_text(&frame, &delta.description, self.thought_delay, |slice| {
                    TurnEvent::ThoughtDelta(delta.with_description(slice))
                })
                .await;
            }
            // Sources, errors and end-of-turn are never animated.
            _ => self.store.apply(&frame),
        }
    }

    async fn reveal_text(
        &self,
        frame: &StreamFrame,
        text: &str,
        delay: Duration,
        slice_event: impl Fn(&str) -> TurnEvent,
    ) {
        if text.is_empty() {
            // Still opens the message or thought step.
            self.store.apply(frame);
            return;
        }
        let mut rest = text;
        while !rest.is_empty() {
            let take = if self.fast_forwarding() {
                rest.len()
            } else {
                slice_end(rest, self.slice_chars)
            };
            let (head, tail) = rest.split_at(take);
            self.store.apply(&frame.with_event(slice_event(head)));
            rest = tail;
            if rest.is_empty() || delay.is_zero() || self.fast_forwarding() {
                continue;
            }
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.token.cancelled() => {}
            }
        }
    }
}

/// Byte offset just past the first `chars` characters of `text`.
fn slice_end(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map_or(text.len(), |(idx, _)| idx)
}
