//! Folds classified frames into the open message and the completed list.
use std::sync::Arc;

use crate::frame::{StreamFrame, ThoughtDelta, TurnEvent};
use crate::message::{CompletedMessage, FinishReason, PartialMessage, ThoughtStep};

/// Everything a renderer needs: the open turn and the finalized history.
///
/// `completed` is replaced copy-on-write, so a reader holding a clone of the
/// `Arc` keeps a consistent list while new turns are appended.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationState {
    pub open: Option<PartialMessage>,
    pub completed: Arc<Vec<CompletedMessage>>,
    /// Bumped on every mutation.
    pub revision: u64,
    /// Correlation id of the most recently finalized message. Late frames
    /// for it are dropped instead of opening a second message with that id.
    pub closed_id: Option<String>,
}

impl ConversationState {
    /// Applies one frame (or one reveal slice of a frame).
    ///
    /// A frame for a correlation id other than the open one finalizes the
    /// open message first. `EndOfTurn` and `Error` finalize the turn they
    /// belong to. Returns every message finalized by this call, oldest first.
    pub fn apply(&mut self, frame: &StreamFrame) -> Vec<CompletedMessage> {
        let mut finalized = Vec::new();
        if self.closed_id.as_deref() == Some(frame.correlation_id.as_str()) {
            tracing::debug!(
                correlation_id = %frame.correlation_id,
                kind = %frame.kind(),
                "dropping frame for finalized message"
            );
            return finalized;
        }
        if self
            .open
            .as_ref()
            .is_some_and(|open| open.id != frame.correlation_id)
        {
            finalized.extend(self.finalize(FinishReason::Superseded));
        }

        match &frame.event {
            TurnEvent::EndOfTurn { result } => {
                if result.is_some() || self.open.is_some() {
                    let open = self.open_for(frame);
                    apply_event(open, &frame.event);
                    self.revision += 1;
                }
                finalized.extend(self.finalize(FinishReason::EndOfTurn));
            }
            event => {
                let open = self.open_for(frame);
                apply_event(open, event);
                self.revision += 1;
                if matches!(event, TurnEvent::Error(_)) {
                    finalized.extend(self.finalize(FinishReason::Error));
                }
            }
        }
        finalized
    }

    /// Moves the open message into the completed list.
    ///
    /// Finalizing when nothing is open is a no-op and returns `None`, so an
    /// end-of-turn frame racing a cleanup call yields a single message.
    pub fn finalize(&mut self, reason: FinishReason) -> Option<CompletedMessage> {
        let partial = self.open.take()?;
        let message = CompletedMessage::from_partial(partial, reason);
        self.closed_id = Some(message.id.clone());
        Arc::make_mut(&mut self.completed).push(message.clone());
        self.revision += 1;
        Some(message)
    }

    /// Forgets the finalized id so a new turn may reuse it.
    pub fn begin_turn(&mut self) {
        self.closed_id = None;
    }

    /// Id of the open message, if any.
    pub fn open_id(&self) -> Option<&str> {
        self.open.as_ref().map(|open| open.id.as_str())
    }

    fn open_for(&mut self, frame: &StreamFrame) -> &mut PartialMessage {
        let open = self
            .open
            .get_or_insert_with(|| PartialMessage::new(frame.correlation_id.clone()));
        if frame.strategy_id.is_some() {
            open.strategy_id = frame.strategy_id.clone();
        }
        open
    }
}

/// Pure form of [`ConversationState::apply`].
pub fn reduce(mut state: ConversationState, frame: &StreamFrame) -> ConversationState {
    state.apply(frame);
    state
}

/// Mutates one partial message with one event. Text only ever grows.
pub fn apply_event(message: &mut PartialMessage, event: &TurnEvent) {
    match event {
        TurnEvent::ThoughtDelta(delta) => apply_thought(message, delta),
        // Appended, never replaced.
        TurnEvent::SourceList(sources) => message.sources.extend(sources.iter().cloned()),
        TurnEvent::AnswerDelta(text) | TurnEvent::Error(text) => message.answer_text.push_str(text),
        TurnEvent::EndOfTurn { result } => {
            if result.is_some() {
                message.result = result.clone();
            }
        }
    }
}

fn apply_thought(message: &mut PartialMessage, delta: &ThoughtDelta) {
    match message
        .thoughts
        .iter_mut()
        .find(|step| step.step_id == delta.step_id)
    {
        Some(step) => {
            step.description.push_str(&delta.description);
            if step.tool_name.is_empty() {
                step.tool_name.clone_from(&delta.tool_name);
            }
            if delta.progress.is_some() {
                step.progress = delta.progress;
            }
        }
        None => message.thoughts.push(ThoughtStep {
            step_id: delta.step_id.clone(),
            tool_name: delta.tool_name.clone(),
            tool_type: delta.tool_type.clone(),
            description: delta.description.clone(),
            progress: delta.progress,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SourceDetail;

    fn thought(id: &str, step: &str, description: &str) -> StreamFrame {
        StreamFrame::new(
            id,
            TurnEvent::ThoughtDelta(ThoughtDelta {
                step_id: step.into(),
                tool_name: "search".into(),
                tool_type: "web".into(),
                description: description.into(),
                progress: None,
            }),
        )
    }

    fn sources(id: &str, ids: &[&str]) -> StreamFrame {
        StreamFrame::new(
            id,
            TurnEvent::SourceList(
                ids.iter()
                    .map(|source_id| SourceDetail {
                        id: source_id.to_string(),
                        title: format!("title {source_id}"),
                        description: String::new(),
                    })
                    .collect(),
            ),
        )
    }

    #[test]
    fn concrete_turn_produces_single_completed_message() {
        let state = [
            StreamFrame::answer("m1", "Hel"),
            StreamFrame::answer("m1", "lo"),
            StreamFrame::end_of_turn("m1"),
        ]
        .iter()
        .fold(ConversationState::default(), reduce);

        assert!(state.open.is_none());
        assert_eq!(state.completed.len(), 1);
        let done = &state.completed[0];
        assert_eq!(done.id, "m1");
        assert_eq!(done.answer_text, "Hello");
        assert!(done.thoughts.is_empty());
        assert!(done.sources.is_empty());
        assert_eq!(done.finish_reason, FinishReason::EndOfTurn);
    }

    #[test]
    fn thought_deltas_group_by_step_id() {
        let state = [
            thought("m1", "s1", "foo"),
            thought("m1", "s1", "bar"),
            thought("m1", "s2", "baz"),
        ]
        .iter()
        .fold(ConversationState::default(), reduce);

        let open = state.open.expect("open message");
        assert_eq!(open.thoughts.len(), 2);
        assert_eq!(open.thoughts[0].description, "foobar");
        assert_eq!(open.thoughts[1].step_id, "s2");
        assert_eq!(open.thoughts[1].description, "baz");
    }

    #[test]
    fn source_lists_append() {
        let state = [sources("m1", &["a", "b"]), sources("m1", &["c"])]
            .iter()
            .fold(ConversationState::default(), reduce);
        let ids: Vec<String> = state
            .open
            .expect("open")
            .sources
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn switching_id_finalizes_previous_message() {
        let mut state = ConversationState::default();
        assert!(state.apply(&StreamFrame::answer("A", "hi")).is_empty());
        let finalized = state.apply(&StreamFrame::answer("B", "yo"));

        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[0].id, "A");
        assert_eq!(finalized[0].answer_text, "hi");
        assert_eq!(finalized[0].finish_reason, FinishReason::Superseded);
        assert_eq!(state.open_id(), Some("B"));
        assert_eq!(state.open.as_ref().map(|m| m.answer_text.as_str()), Some("yo"));
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut state = reduce(ConversationState::default(), &StreamFrame::answer("m1", "x"));
        assert!(state.finalize(FinishReason::EndOfTurn).is_some());
        let revision = state.revision;
        assert!(state.finalize(FinishReason::Manual).is_none());
        assert_eq!(state.completed.len(), 1);
        assert_eq!(state.revision, revision);
    }

    #[test]
    fn end_of_turn_after_finalize_is_noop() {
        let mut state = ConversationState::default();
        state.apply(&StreamFrame::answer("m1", "x"));
        state.apply(&StreamFrame::end_of_turn("m1"));
        let finalized = state.apply(&StreamFrame::end_of_turn("m1"));
        assert!(finalized.is_empty());
        assert_eq!(state.completed.len(), 1);
    }

    #[test]
    fn late_frames_for_finalized_id_are_dropped() {
        let mut state = ConversationState::default();
        state.apply(&StreamFrame::answer("m1", "Hi"));
        state.apply(&StreamFrame::end_of_turn("m1"));
        let revision = state.revision;

        assert!(state.apply(&sources("m1", &["a"])).is_empty());
        assert!(state.apply(&StreamFrame::answer("m1", " again")).is_empty());
        assert!(state.open.is_none());
        assert_eq!(state.revision, revision);
        assert_eq!(state.completed.len(), 1);
        assert_eq!(state.completed[0].answer_text, "Hi");
        assert!(state.completed[0].sources.is_empty());
    }

    #[test]
    fn frames_after_error_do_not_reopen_the_turn() {
        let mut state = ConversationState::default();
        state.apply(&StreamFrame::new("m1", TurnEvent::Error("boom".into())));
        state.apply(&StreamFrame::answer("m1", "tail"));
        state.apply(&StreamFrame::answer("m2", "next"));
        assert_eq!(state.completed.len(), 1);
        assert_eq!(state.completed[0].answer_text, "boom");
        assert_eq!(state.open_id(), Some("m2"));
    }

    #[test]
    fn begin_turn_allows_reusing_a_finalized_id() {
        let mut state = ConversationState::default();
        state.apply(&StreamFrame::answer("turn", "one"));
        state.finalize(FinishReason::StreamClosed);
        state.begin_turn();
        state.apply(&StreamFrame::answer("turn", "two"));
        assert_eq!(state.open.as_ref().map(|m| m.answer_text.as_str()), Some("two"));
    }

    #[test]
    fn error_is_visible_and_finalizes() {
        let mut state = ConversationState::default();
        state.apply(&StreamFrame::answer("m1", "Partial answer. "));
        let finalized = state.apply(&StreamFrame::new(
            "m1",
            TurnEvent::Error("Upstream timeout".into()),
        ));
        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[0].answer_text, "Partial answer. Upstream timeout");
        assert_eq!(finalized[0].finish_reason, FinishReason::Error);
        assert!(state.open.is_none());
    }

    #[test]
    fn end_of_turn_result_is_kept() {
        let mut state = ConversationState::default();
        state.apply(&thought("t1", "analyzing", "Reading"));
        state.apply(&StreamFrame::new(
            "t1",
            TurnEvent::EndOfTurn {
                result: Some(serde_json::json!({"grid_levels": 12})),
            },
        ));
        assert_eq!(
            state.completed[0].result,
            Some(serde_json::json!({"grid_levels": 12}))
        );
    }

    #[test]
    fn readers_keep_their_snapshot_of_completed() {
        let mut state = ConversationState::default();
        state.apply(&StreamFrame::answer("A", "1"));
        state.finalize(FinishReason::EndOfTurn);
        let reader = Arc::clone(&state.completed);
        state.apply(&StreamFrame::answer("B", "2"));
        state.finalize(FinishReason::EndOfTurn);
        assert_eq!(reader.len(), 1);
        assert_eq!(state.completed.len(), 2);
    }
}
