/// Failure to turn one wire frame into a classified event.
///
/// Frame errors are recovered inside the engine: the frame is logged and
/// skipped, and the rest of the turn keeps streaming.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Frame body was not valid JSON.
    #[error("invalid JSON frame: {message}")]
    InvalidJson { message: String },
    /// A field the frame kind requires was absent or had the wrong type.
    #[error("frame is missing field `{field}`")]
    MissingField { field: &'static str },
    /// The embedded payload of a known frame kind could not be decoded.
    #[error("invalid {kind} payload: {message}")]
    InvalidPayload { kind: &'static str, message: String },
    /// The decoder buffered more than the configured limit without a delimiter.
    #[error("frame exceeded {limit} bytes without a delimiter")]
    Oversize { limit: usize },
}

impl FrameError {
    pub(crate) fn invalid_json(err: &serde_json::Error) -> Self {
        Self::InvalidJson {
            message: err.to_string(),
        }
    }

    pub(crate) fn invalid_payload(kind: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            kind,
            message: message.into(),
        }
    }
}

/// Errors raised by a transport while opening or reading a response body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The read was aborted by the consumer. Not a failure of the turn.
    #[error("transport aborted")]
    Aborted,
    /// The request could not be sent.
    #[error("request failed: {0}")]
    Request(String),
    /// The backend answered with a non-success status.
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// Reading the streaming body failed part way through.
    #[error("stream read failed: {0}")]
    Read(String),
}

impl TransportError {
    /// Returns `true` for the consumer-initiated abort.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// Top-level error type returned by engine operations.
///
/// Only configuration problems and non-abort transport failures cross the
/// engine boundary; everything else is expressed as message data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Invalid engine configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Terminal transport failure for the current turn.
    #[error(transparent)]
    Transport(TransportError),
}

impl StreamError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<TransportError> for StreamError {
    fn from(value: TransportError) -> Self {
        StreamError::Transport(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_aborted_counts_as_abort() {
        assert!(TransportError::Aborted.is_abort());
        assert!(!TransportError::Read("reset".into()).is_abort());
        assert!(
            !TransportError::Status {
                status: 502,
                body: String::new()
            }
            .is_abort()
        );
    }

    #[test]
    fn transport_error_is_transparent_inside_stream_error() {
        let err = StreamError::from(TransportError::Request("dns".into()));
        assert_eq!(err.to_string(), "request failed: dns");
    }
}
