use std::str::FromStr;
use std::time::Duration;

use crate::errors::StreamError;

/// Wire framing spoken by the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireProtocol {
    /// One JSON object per line.
    #[default]
    Ndjson,
    /// Server-sent events, one JSON body per blank-line-delimited block.
    Sse,
}

impl FromStr for WireProtocol {
    type Err = StreamError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ndjson" | "jsonl" => Ok(Self::Ndjson),
            "sse" | "event-stream" => Ok(Self::Sse),
            other => Err(StreamError::config(format!(
                "unknown wire protocol `{other}` (expected ndjson or sse)"
            ))),
        }
    }
}

/// Engine configuration.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StreamConfig {
    pub protocol: WireProtocol,
    /// Characters revealed per typewriter tick.
    pub slice_chars: usize,
    /// Delay between answer-text slices.
    pub answer_delay: Duration,
    /// Delay between thought-description slices.
    pub thought_delay: Duration,
    /// How long a cancellation stays asserted before the token re-arms.
    pub cancel_grace: Duration,
    /// Largest frame the decoder will buffer before dropping it.
    pub max_frame_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            protocol: WireProtocol::Ndjson,
            slice_chars: 2,
            answer_delay: Duration::from_millis(15),
            thought_delay: Duration::from_millis(30),
            cancel_grace: Duration::from_millis(500),
            max_frame_bytes: 1024 * 1024,
        }
    }
}

impl StreamConfig {
    /// Builds a config from `CHAT_STREAM_*` variables, loading `.env` first.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unset keys keep their
    /// defaults; unparsable values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(protocol) = parse_var::<WireProtocol>(&lookup, "CHAT_STREAM_PROTOCOL") {
            config.protocol = protocol;
        }
        if let Some(chars) = parse_var::<usize>(&lookup, "CHAT_STREAM_SLICE_CHARS") {
            config.slice_chars = chars;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "CHAT_STREAM_ANSWER_DELAY_MS") {
            config.answer_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "CHAT_STREAM_THOUGHT_DELAY_MS") {
            config.thought_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "CHAT_STREAM_CANCEL_GRACE_MS") {
            config.cancel_grace = Duration::from_millis(ms);
        }
        if let Some(bytes) = parse_var::<usize>(&lookup, "CHAT_STREAM_MAX_FRAME_BYTES") {
            config.max_frame_bytes = bytes;
        }
        config
    }

    pub fn protocol(mut self, protocol: WireProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn slice_chars(mut self, chars: usize) -> Self {
        self.slice_chars = chars;
        self
    }

    pub fn answer_delay(mut self, delay: Duration) -> Self {
        self.answer_delay = delay;
        self
    }

    pub fn thought_delay(mut self, delay: Duration) -> Self {
        self.thought_delay = delay;
        self
    }

    pub fn cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    pub fn max_frame_bytes(mut self, bytes: usize) -> Self {
        self.max_frame_bytes = bytes;
        self
    }

    /// Disables the typewriter effect: every chunk is applied in one step.
    pub fn instant(mut self) -> Self {
        self.answer_delay = Duration::ZERO;
        self.thought_delay = Duration::ZERO;
        self.slice_chars = usize::MAX;
        self
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.slice_chars == 0 {
            return Err(StreamError::config("slice_chars must be greater than 0"));
        }
        if self.max_frame_bytes == 0 {
            return Err(StreamError::config(
                "max_frame_bytes must be greater than 0",
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    if raw.trim().is_empty() {
        return None;
    }
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::error!(key, value = %raw, "ignoring unparsable config value");
            None
        }
    }
}
