//! Transport collaborator contract and the reqwest-backed implementation.
//!
//! A transport opens one streaming response per turn and hands back its body
//! as a byte stream together with an [`AbortHandle`]. There is exactly one
//! attempt per turn; retry policy belongs to the caller.
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt as _;
use futures::stream;
use tokio::sync::watch;
use tracing::debug;

use crate::errors::{StreamError, TransportError};

/// Streaming response body.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<Bytes, TransportError>> + Send + 'static>>;

/// Handle used to abort an open response body.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Requests the abort. The body yields [`TransportError::Aborted`] once
    /// and then ends.
    pub fn abort(&self) {
        let _ = self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// An open response body plus the means to abort it.
pub struct TransportHandle {
    pub stream: ByteStream,
    pub abort: AbortHandle,
}

impl TransportHandle {
    /// Wraps any byte stream so it honours [`AbortHandle::abort`].
    pub fn new<S>(body: S) -> Self
    where
        S: futures::Stream<Item = Result<Bytes, TransportError>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(false);
        Self {
            stream: Box::pin(abortable(Box::pin(body), rx)),
            abort: AbortHandle { tx: Arc::new(tx) },
        }
    }
}

enum Next {
    Aborted,
    Item(Option<Result<Bytes, TransportError>>),
}

fn abortable(
    body: ByteStream,
    abort_rx: watch::Receiver<bool>,
) -> impl futures::Stream<Item = Result<Bytes, TransportError>> + Send {
    stream::unfold(
        (body, abort_rx, false),
        |(mut body, mut abort_rx, done)| async move {
            if done {
                return None;
            }
            let next = tokio::select! {
                biased;
                () = wait_aborted(&mut abort_rx) => Next::Aborted,
                item = body.next() => Next::Item(item),
            };
            match next {
                Next::Aborted => Some((Err(TransportError::Aborted), (body, abort_rx, true))),
                Next::Item(Some(item)) => Some((item, (body, abort_rx, false))),
                Next::Item(None) => None,
            }
        },
    )
}

async fn wait_aborted(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|aborted| *aborted).await.is_err();
    if closed {
        // Handle dropped without aborting.
        std::future::pending::<()>().await;
    }
}

/// Outbound request for one turn. Building the body (message text, thread
/// id, auth) is the caller's concern.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TurnRequest {
    /// Correlation id used when the backend's frames carry none.
    pub correlation_id: String,
    pub body: serde_json::Value,
}

impl TurnRequest {
    pub fn new(correlation_id: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            body,
        }
    }

    /// Request with a freshly generated correlation id.
    pub fn with_generated_id(body: serde_json::Value) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), body)
    }
}

/// Opens the streaming response for a turn.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: &TurnRequest) -> Result<TransportHandle, TransportError>;
}

/// Configuration for [`HttpTransport`].
#[derive(Clone, Debug)]
pub struct HttpTransportConfig {
    pub url: String,
    /// Extra request headers (auth, session).
    pub headers: Vec<(String, String)>,
    /// Connect timeout. The body itself is never timed out.
    pub connect_timeout: Duration,
}

impl HttpTransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            connect_timeout: Duration::from_secs(30),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// POSTs the turn request as JSON and streams the response body.
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, StreamError> {
        if config.url.trim().is_empty() {
            return Err(StreamError::config("transport url must not be empty"));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| StreamError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &TurnRequest) -> Result<TransportHandle, TransportError> {
        debug!(correlation_id = %request.correlation_id, url = %self.config.url, "opening response stream");
        let mut http_req = self.client.post(&self.config.url).json(&request.body);
        for (name, value) in &self.config.headers {
            http_req = http_req.header(name, value);
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Read(e.to_string())));
        Ok(TransportHandle::new(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&'static str]) -> Vec<Result<Bytes, TransportError>> {
        parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect()
    }

    #[tokio::test]
    async fn passes_chunks_through_until_end() {
        let mut handle = TransportHandle::new(stream::iter(chunks(&["a", "b"])));
        let mut seen = Vec::new();
        while let Some(chunk) = handle.stream.next().await {
            seen.push(chunk.expect("chunk"));
        }
        assert_eq!(seen, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
    }

    #[tokio::test]
    async fn abort_yields_aborted_then_ends() {
        let mut handle = TransportHandle::new(stream::pending());
        handle.abort.abort();
        assert!(handle.abort.is_aborted());
        assert_eq!(handle.stream.next().await, Some(Err(TransportError::Aborted)));
        assert_eq!(handle.stream.next().await, None);
    }

    #[tokio::test]
    async fn abort_from_another_task_wakes_pending_read() {
        let mut handle = TransportHandle::new(stream::pending());
        let abort = handle.abort.clone();
        tokio::spawn(async move { abort.abort() });
        assert_eq!(handle.stream.next().await, Some(Err(TransportError::Aborted)));
    }

    #[test]
    fn http_transport_rejects_empty_url() {
        assert!(matches!(
            HttpTransport::new(HttpTransportConfig::new("  ")),
            Err(StreamError::Config(_))
        ));
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = TurnRequest::with_generated_id(serde_json::json!({}));
        let b = TurnRequest::with_generated_id(serde_json::json!({}));
        assert_ne!(a.correlation_id, b.correlation_id);
    }
}
