//! Common imports for typical engine usage.
//!
//! This module intentionally exports the types most hosts touch so
//! application code needs fewer import lines.
pub use crate::{
    CancelToken, CompletedMessage, ConversationState, Engine, EngineBuilder, FinishReason,
    PartialMessage, SourceDetail, StreamConfig, StreamEnd, StreamError, StreamOutcome,
    ThoughtStep, Transport, TransportError, TransportHandle, TurnRequest, WireProtocol,
};
