use std::io::Write;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use chat_stream::prelude::*;
use futures::stream;

/// Reads a captured response body and replays it in `chunk_bytes` pieces,
/// ignoring frame boundaries the way a real socket would.
pub fn file_body(path: &Path, chunk_bytes: usize) -> std::io::Result<TransportHandle> {
    let bytes = std::fs::read(path)?;
    Ok(chunked_body(Bytes::from(bytes), chunk_bytes))
}

pub fn chunked_body(bytes: Bytes, chunk_bytes: usize) -> TransportHandle {
    let size = chunk_bytes.max(1);
    let chunks: Vec<Result<Bytes, TransportError>> = (0..bytes.len())
        .step_by(size)
        .map(|start| Ok(bytes.slice(start..(start + size).min(bytes.len()))))
        .collect();
    TransportHandle::new(stream::iter(chunks))
}

/// Reads the JSON request body posted with `--url`.
pub fn request_body(path: &Path) -> Result<serde_json::Value, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    serde_json::from_str(&text).map_err(|err| format!("{} is not JSON: {err}", path.display()))
}

/// Fires `token` once `after` has elapsed.
pub fn schedule_cancel(token: CancelToken, after: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        tracing::info!(after_ms = after.as_millis() as u64, "cancelling replay");
        token.cancel();
    });
}

/// Writes the visible growth of the open answer between two observations.
#[derive(Debug, Default)]
pub struct LiveText {
    message_id: Option<String>,
    printed: usize,
}

impl LiveText {
    /// Returns the text that appeared since the previous call.
    pub fn advance(&mut self, state: &ConversationState) -> String {
        let mut out = String::new();
        // Tail of a message that finalized between observations.
        if let Some(id) = &self.message_id
            && state.open_id() != Some(id.as_str())
        {
            if let Some(done) = state.completed.iter().rev().find(|m| &m.id == id) {
                out.push_str(done.answer_text.get(self.printed..).unwrap_or_default());
            }
            out.push('\n');
            self.message_id = None;
            self.printed = 0;
        }
        if let Some(open) = &state.open {
            if self.message_id.as_deref() != Some(open.id.as_str()) {
                self.message_id = Some(open.id.clone());
                self.printed = 0;
            }
            out.push_str(open.answer_text.get(self.printed..).unwrap_or_default());
            self.printed = open.answer_text.len();
        }
        out
    }
}

/// Prints every completed message as one JSON line.
pub fn write_completed(
    out: &mut impl Write,
    completed: &[CompletedMessage],
) -> std::io::Result<()> {
    for message in completed {
        let line = serde_json::to_string(message).map_err(std::io::Error::other)?;
        writeln!(out, "{line}")?;
    }
    Ok(())
}
