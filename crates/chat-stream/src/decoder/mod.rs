//! Byte-stream framing for the two wire protocols.
//!
//! Both decoders keep the unconsumed tail of the stream in a byte buffer so a
//! UTF-8 sequence or a frame split across transport reads is reassembled
//! before it is emitted. Frames come out strictly in arrival order and a
//! partial frame is never emitted.
mod ndjson;
mod sse;

pub use ndjson::NdjsonDecoder;
pub use sse::SseDecoder;

use crate::config::WireProtocol;
use crate::errors::FrameError;

/// One undecoded wire frame: an NDJSON line or the joined `data:` lines of an
/// SSE block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    /// SSE `event:` field, when the block had one.
    pub event: Option<String>,
    pub data: String,
}

/// Protocol-specific framing behind one interface.
#[derive(Debug)]
pub enum FrameDecoder {
    Ndjson(NdjsonDecoder),
    Sse(SseDecoder),
}

impl FrameDecoder {
    pub fn new(protocol: WireProtocol, max_frame_bytes: usize) -> Self {
        match protocol {
            WireProtocol::Ndjson => Self::Ndjson(NdjsonDecoder::new(max_frame_bytes)),
            WireProtocol::Sse => Self::Sse(SseDecoder::new(max_frame_bytes)),
        }
    }

    /// Appends `chunk` and returns every frame it completed.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<Result<RawFrame, FrameError>> {
        match self {
            Self::Ndjson(decoder) => decoder.push_chunk(chunk),
            Self::Sse(decoder) => decoder.push_chunk(chunk),
        }
    }

    /// Drains whatever is left once the transport has closed.
    pub fn finish(&mut self) -> Vec<Result<RawFrame, FrameError>> {
        match self {
            Self::Ndjson(decoder) => decoder.finish(),
            Self::Sse(decoder) => decoder.finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_on_protocol() {
        let mut ndjson = FrameDecoder::new(WireProtocol::Ndjson, 1024);
        assert_eq!(ndjson.push_chunk(b"{}\n").len(), 1);

        let mut sse = FrameDecoder::new(WireProtocol::Sse, 1024);
        assert!(sse.push_chunk(b"{}\n").is_empty());
        assert_eq!(sse.push_chunk(b"data: {}\n\n").len(), 1);
    }

    #[test]
    fn utf8_split_across_chunks_is_reassembled() {
        let text = "{\"content\":\"caf\u{e9}\"}\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xc3).expect("lead byte") + 1;
        let mut decoder = FrameDecoder::new(WireProtocol::Ndjson, 1024);
        assert!(decoder.push_chunk(&text[..split]).is_empty());
        let frames = decoder.push_chunk(&text[split..]);
        assert_eq!(frames[0].as_ref().expect("frame").data, "{\"content\":\"caf\u{e9}\"}");
    }
}
