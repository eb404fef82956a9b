use chrono::{DateTime, Utc};

/// One tool-call "thought" shown while the assistant works.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ThoughtStep {
    pub step_id: String,
    pub tool_name: String,
    pub tool_type: String,
    /// Concatenation of every description fragment received for `step_id`.
    pub description: String,
    /// Latest progress value reported for this step (SSE backends only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

/// A citation attached to an answer.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SourceDetail {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// The in-progress assistant turn.
///
/// At most one is open per engine. It is owned by the accumulator and
/// mutated in place until it is finalized into a [`CompletedMessage`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PartialMessage {
    pub id: String,
    pub answer_text: String,
    pub thoughts: Vec<ThoughtStep>,
    pub sources: Vec<SourceDetail>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_id: Option<String>,
    /// Structured result delivered with an SSE `complete` step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl PartialMessage {
    /// Opens an empty message for `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            answer_text: String::new(),
            thoughts: Vec::new(),
            sources: Vec::new(),
            created_at: Utc::now(),
            strategy_id: None,
            result: None,
        }
    }

    /// Returns the thought step with `step_id`, if any.
    pub fn thought(&self, step_id: &str) -> Option<&ThoughtStep> {
        self.thoughts.iter().find(|step| step.step_id == step_id)
    }
}

/// Why a turn was finalized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Backend sent an explicit end-of-turn frame.
    EndOfTurn,
    /// Backend reported an error; its text is part of the answer.
    Error,
    /// A frame for a different correlation id arrived.
    Superseded,
    /// The transport closed cleanly.
    StreamClosed,
    /// The consumer cancelled the turn.
    Cancelled,
    /// Finalized by an explicit caller request (cleanup paths).
    Manual,
}

/// Immutable snapshot of a finalized turn.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CompletedMessage {
    pub id: String,
    pub answer_text: String,
    pub thoughts: Vec<ThoughtStep>,
    pub sources: Vec<SourceDetail>,
    pub created_at: DateTime<Utc>,
    pub finalized_at: DateTime<Utc>,
    pub finish_reason: FinishReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl CompletedMessage {
    /// Freezes `partial`, assigning a fresh id when the turn never got one.
    pub(crate) fn from_partial(partial: PartialMessage, finish_reason: FinishReason) -> Self {
        let id = if partial.id.trim().is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            partial.id
        };
        Self {
            id,
            answer_text: partial.answer_text,
            thoughts: partial.thoughts,
            sources: partial.sources,
            created_at: partial.created_at,
            finalized_at: Utc::now(),
            finish_reason,
            strategy_id: partial.strategy_id,
            result: partial.result,
        }
    }
}
