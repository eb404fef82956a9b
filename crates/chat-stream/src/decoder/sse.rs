use crate::errors::FrameError;

use super::RawFrame;

/// Splits a byte stream into blank-line-delimited `event:`/`data:` blocks.
#[derive(Debug)]
pub struct SseDecoder {
    buf: Vec<u8>,
    scanned: usize,
    max_frame_bytes: usize,
    discarding: bool,
}

impl SseDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            max_frame_bytes,
            discarding: false,
        }
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<Result<RawFrame, FrameError>> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some((idx, delim_len)) = find_frame_delimiter(&self.buf, self.scanned) {
            let frame_bytes = self.buf[..idx].to_vec();
            self.buf.drain(..idx + delim_len);
            self.scanned = 0;
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if frame_bytes.len() > self.max_frame_bytes {
                frames.push(Err(FrameError::Oversize {
                    limit: self.max_frame_bytes,
                }));
                continue;
            }
            if let Some(frame) = parse_sse_frame(&frame_bytes) {
                frames.push(Ok(frame));
            }
        }
        // A delimiter may straddle the next chunk boundary.
        self.scanned = self.buf.len().saturating_sub(3);
        if self.buf.len() > self.max_frame_bytes {
            self.buf.clear();
            self.scanned = 0;
            if !self.discarding {
                self.discarding = true;
                frames.push(Err(FrameError::Oversize {
                    limit: self.max_frame_bytes,
                }));
            }
        }
        frames
    }

    /// Flushes a trailing block that was never blank-line-terminated.
    pub fn finish(&mut self) -> Vec<Result<RawFrame, FrameError>> {
        let block = std::mem::take(&mut self.buf);
        self.scanned = 0;
        if std::mem::take(&mut self.discarding) {
            return Vec::new();
        }
        parse_sse_frame(&block).map(Ok).into_iter().collect()
    }
}

fn find_frame_delimiter(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if i + 3 < buf.len()
            && buf[i] == b'\r'
            && buf[i + 1] == b'\n'
            && buf[i + 2] == b'\r'
            && buf[i + 3] == b'\n'
        {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

fn parse_sse_frame(bytes: &[u8]) -> Option<RawFrame> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    let mut event: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();
    for raw_line in text.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim_start().to_string());
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start());
        }
    }
    if data_lines.is_empty() {
        return None;
    }
    Some(RawFrame {
        event,
        data: data_lines.join("\n"),
    })
}
