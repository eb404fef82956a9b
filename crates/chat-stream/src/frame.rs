use std::fmt;

use crate::message::SourceDetail;

/// Closed set of event kinds the engine understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    ThoughtDelta,
    SourceList,
    AnswerDelta,
    EndOfTurn,
    Error,
}

impl FrameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThoughtDelta => "thought_delta",
            Self::SourceList => "source_list",
            Self::AnswerDelta => "answer_delta",
            Self::EndOfTurn => "end_of_turn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fragment of one tool-call step.
#[derive(Clone, Debug, PartialEq)]
pub struct ThoughtDelta {
    pub step_id: String,
    pub tool_name: String,
    pub tool_type: String,
    pub description: String,
    pub progress: Option<f64>,
}

impl ThoughtDelta {
    /// Same step, different description fragment.
    pub(crate) fn with_description(&self, description: &str) -> Self {
        Self {
            step_id: self.step_id.clone(),
            tool_name: self.tool_name.clone(),
            tool_type: self.tool_type.clone(),
            description: description.to_string(),
            progress: self.progress,
        }
    }
}

/// Classified payload of a frame.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnEvent {
    ThoughtDelta(ThoughtDelta),
    SourceList(Vec<SourceDetail>),
    AnswerDelta(String),
    EndOfTurn {
        result: Option<serde_json::Value>,
    },
    /// Backend-reported failure text, surfaced as answer content.
    Error(String),
}

impl TurnEvent {
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::ThoughtDelta(_) => FrameKind::ThoughtDelta,
            Self::SourceList(_) => FrameKind::SourceList,
            Self::AnswerDelta(_) => FrameKind::AnswerDelta,
            Self::EndOfTurn { .. } => FrameKind::EndOfTurn,
            Self::Error(_) => FrameKind::Error,
        }
    }
}

/// One classified frame, ready for the accumulator.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamFrame {
    pub correlation_id: String,
    pub event: TurnEvent,
    pub strategy_id: Option<String>,
}

impl StreamFrame {
    pub fn new(correlation_id: impl Into<String>, event: TurnEvent) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            event,
            strategy_id: None,
        }
    }

    pub fn answer(correlation_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(correlation_id, TurnEvent::AnswerDelta(text.into()))
    }

    pub fn end_of_turn(correlation_id: impl Into<String>) -> Self {
        Self::new(correlation_id, TurnEvent::EndOfTurn { result: None })
    }

    pub fn with_strategy_id(mut self, strategy_id: Option<String>) -> Self {
        self.strategy_id = strategy_id;
        self
    }

    pub fn kind(&self) -> FrameKind {
        self.event.kind()
    }

    /// Copy of this frame carrying `event` instead. Used to apply reveal slices.
    pub(crate) fn with_event(&self, event: TurnEvent) -> Self {
        Self {
            correlation_id: self.correlation_id.clone(),
            event,
            strategy_id: self.strategy_id.clone(),
        }
    }
}
