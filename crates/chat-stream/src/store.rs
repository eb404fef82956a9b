use tokio::sync::watch;
use tracing::info;

use crate::accumulator::ConversationState;
use crate::frame::StreamFrame;
use crate::message::{CompletedMessage, FinishReason};

/// Observable home of the conversation state.
///
/// The engine is the only writer. Renderers call [`MessageStore::subscribe`]
/// and read plain snapshots; every applied slice wakes them.
#[derive(Debug)]
pub struct MessageStore {
    tx: watch::Sender<ConversationState>,
}

impl Default for MessageStore {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(ConversationState::default());
        Self { tx }
    }
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.tx.subscribe()
    }

    /// Clones the current state.
    pub fn snapshot(&self) -> ConversationState {
        self.tx.borrow().clone()
    }

    pub(crate) fn apply(&self, frame: &StreamFrame) {
        let mut finalized = Vec::new();
        self.tx.send_modify(|state| finalized = state.apply(frame));
        for message in &finalized {
            log_finalized(message);
        }
    }

    /// Clears the finalized-id guard at the start of a turn. Subscribers are
    /// not woken; nothing they render changes.
    pub(crate) fn begin_turn(&self) {
        self.tx.send_if_modified(|state| {
            state.begin_turn();
            false
        });
    }

    /// Finalizes the open message, if there is one.
    pub fn finalize(&self, reason: FinishReason) -> Option<CompletedMessage> {
        let mut finalized = None;
        self.tx.send_if_modified(|state| {
            finalized = state.finalize(reason);
            finalized.is_some()
        });
        if let Some(message) = &finalized {
            log_finalized(message);
        }
        finalized
    }
}

fn log_finalized(message: &CompletedMessage) {
    info!(
        correlation_id = %message.id,
        reason = ?message.finish_reason,
        answer_chars = message.answer_text.chars().count(),
        thoughts = message.thoughts.len(),
        sources = message.sources.len(),
        "turn finalized"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_each_apply() {
        let store = MessageStore::new();
        let mut rx = store.subscribe();
        store.apply(&StreamFrame::answer("m1", "a"));
        rx.changed().await.expect("changed");
        assert_eq!(
            rx.borrow_and_update().open.as_ref().map(|m| m.answer_text.clone()),
            Some("a".to_string())
        );
    }

    #[tokio::test]
    async fn noop_finalize_does_not_notify() {
        let store = MessageStore::new();
        let rx = store.subscribe();
        assert!(store.finalize(FinishReason::Manual).is_none());
        assert!(!rx.has_changed().expect("sender alive"));
    }
}
