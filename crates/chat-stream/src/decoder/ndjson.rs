use crate::errors::FrameError;

use super::RawFrame;

/// Splits a byte stream into newline-delimited JSON lines.
#[derive(Debug)]
pub struct NdjsonDecoder {
    buf: Vec<u8>,
    /// Bytes of `buf` already known to hold no newline.
    scanned: usize,
    max_frame_bytes: usize,
    discarding: bool,
}

impl NdjsonDecoder {
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
        while let Some(idx) = self.buf[self.scanned..]
            .iter()
            .position(|byte| *byte == b'\n')
            .map(|pos| self.scanned + pos)
        {
            let mut line = self.buf.drain(..=idx).collect::<Vec<u8>>();
            self.scanned = 0;
            if self.discarding {
                // tail of an oversize line
                self.discarding = false;
                continue;
            }
            line.pop();
            if let Some(frame) = self.line_to_frame(line) {
                frames.push(frame);
            }
        }
        self.scanned = self.buf.len();
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

    /// Flushes a trailing line that was never newline-terminated.
    pub fn finish(&mut self) -> Vec<Result<RawFrame, FrameError>> {
        let line = std::mem::take(&mut self.buf);
        self.scanned = 0;
        if self.discarding {
            self.discarding = false;
            return Vec::new();
        }
        self.line_to_frame(line).into_iter().collect()
    }

    fn line_to_frame(&self, mut line: Vec<u8>) -> Option<Result<RawFrame, FrameError>> {
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.len() > self.max_frame_bytes {
            return Some(Err(FrameError::Oversize {
                limit: self.max_frame_bytes,
            }));
        }
        let text = String::from_utf8_lossy(&line);
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Ok(RawFrame {
            event: None,
            data: text.to_string(),
        }))
    }
}
