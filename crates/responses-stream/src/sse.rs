//! SSE line framing for the Responses stream.
//!
//! Only `data: ` lines carry payloads. Blank lines, comments, and other SSE
//! fields (`event:`, `id:`, `retry:`) are skipped. `data: [DONE]` ends the
//! stream cleanly.

use std::collections::VecDeque;

use futures::StreamExt as _;

use crate::errors::StreamError;
use crate::transport::ByteStream;

pub(crate) const DATA_PREFIX: &str = "data: ";
pub(crate) const DONE_SENTINEL: &str = "[DONE]";

/// One meaningful line of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// JSON text following `data: `, trimmed.
    Payload(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Classifies a single line with its terminator already removed.
pub fn classify_line(line: &str) -> Option<SseLine> {
    let data = line.strip_prefix(DATA_PREFIX)?.trim();
    if data == DONE_SENTINEL {
        return Some(SseLine::Done);
    }
    if data.is_empty() {
        return None;
    }
    Some(SseLine::Payload(data.to_string()))
}

/// Incremental line splitter. Bytes are buffered until a `\n` arrives, so a
/// line split across chunk boundaries (including inside a multi-byte UTF-8
/// sequence) is reassembled before classification.
#[derive(Default)]
pub struct SseLineDecoder {
    buf: Vec<u8>,
    /// Prefix of `buf` already known to hold no `\n`.
    scanned: usize,
    done: bool,
}

impl SseLineDecoder {
    /// Feeds a chunk and returns the lines it completed. Nothing is returned
    /// once `[DONE]` has been seen.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseLine> {
        if self.done {
            return Vec::new();
        }
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        let mut cursor = self.scanned;
        while let Some(offset) = self.buf[cursor..].iter().position(|b| *b == b'\n') {
            let end = cursor + offset;
            cursor = end + 1;
            let line = decode_line(&self.buf[start..end]);
            start = cursor;
            if let Some(line) = line {
                let done = line == SseLine::Done;
                lines.push(line);
                if done {
                    self.mark_done();
                    return lines;
                }
            }
        }
        self.buf.drain(..start);
        self.scanned = self.buf.len();
        lines
    }

    /// Flushes an unterminated final line at end of body.
    pub fn finish(&mut self) -> Option<SseLine> {
        if self.done || self.buf.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buf);
        self.scanned = 0;
        let line = decode_line(&raw)?;
        if line == SseLine::Done {
            self.mark_done();
        }
        Some(line)
    }

    /// True once `[DONE]` has been decoded.
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn mark_done(&mut self) {
        self.done = true;
        self.buf.clear();
        self.scanned = 0;
    }
}

fn decode_line(raw: &[u8]) -> Option<SseLine> {
    let text = String::from_utf8_lossy(raw);
    classify_line(text.trim_end_matches('\r'))
}

/// Pulls payload strings out of a response body.
pub struct FrameReader {
    body: ByteStream,
    decoder: SseLineDecoder,
    pending: VecDeque<String>,
    exhausted: bool,
}

impl FrameReader {
    pub fn new(body: ByteStream) -> Self {
        Self {
            body,
            decoder: SseLineDecoder::default(),
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Next payload, `None` at `[DONE]` or end of body.
    ///
    /// Cancel-safe: dropping the future between polls loses no data.
    pub async fn next_payload(&mut self) -> Option<Result<String, StreamError>> {
        loop {
            if let Some(payload) = self.pending.pop_front() {
                return Some(Ok(payload));
            }
            if self.exhausted || self.decoder.is_done() {
                return None;
            }
            match self.body.next().await {
                Some(Ok(chunk)) => {
                    let lines = self.decoder.push_chunk(&chunk);
                    self.enqueue(lines);
                }
                Some(Err(err)) => {
                    self.exhausted = true;
                    return Some(Err(err));
                }
                None => {
                    self.exhausted = true;
                    let tail = self.decoder.finish();
                    self.enqueue(tail);
                }
            }
        }
    }

    /// True once `[DONE]` was read, as opposed to the body simply ending.
    pub fn saw_done(&self) -> bool {
        self.decoder.is_done()
    }

    fn enqueue(&mut self, lines: impl IntoIterator<Item = SseLine>) {
        for line in lines {
            if let SseLine::Payload(payload) = line {
                self.pending.push_back(payload);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;

    fn reader(chunks: Vec<&'static str>) -> FrameReader {
        FrameReader::new(Box::pin(stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect::<Vec<_>>(),
        )))
    }

    async fn collect(mut reader: FrameReader) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(payload) = reader.next_payload().await {
            out.push(payload.expect("payload"));
        }
        out
    }

    #[test]
    fn classify_skips_non_data_lines() {
        assert_eq!(classify_line("event: ping"), None);
        assert_eq!(classify_line(": keep-alive"), None);
        assert_eq!(classify_line("id: 7"), None);
        assert_eq!(classify_line(""), None);
        assert_eq!(classify_line("data: [DONE]"), Some(SseLine::Done));
        assert_eq!(
            classify_line("data:  {\"a\":1}  "),
            Some(SseLine::Payload("{\"a\":1}".into()))
        );
    }

    #[test]
    fn decoder_handles_partial_chunk_boundaries() {
        let mut decoder = SseLineDecoder::default();
        assert!(decoder.push_chunk(b"data: {\"type\":\"response.output_text.delta\",\"delta\":\"hel").is_empty());
        let lines = decoder.push_chunk(b"lo\"}\r\n\r\n");
        assert_eq!(
            lines,
            vec![SseLine::Payload(
                "{\"type\":\"response.output_text.delta\",\"delta\":\"hello\"}".into()
            )]
        );
    }

    #[test]
    fn decoder_reassembles_split_utf8() {
        let mut decoder = SseLineDecoder::default();
        let text = "data: {\"delta\":\"caf\u{e9}\"}\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xC3).expect("multibyte start") + 1;
        assert!(decoder.push_chunk(&text[..split]).is_empty());
        assert_eq!(
            decoder.push_chunk(&text[split..]),
            vec![SseLine::Payload("{\"delta\":\"caf\u{e9}\"}".into())]
        );
    }

    #[tokio::test]
    async fn reader_ignores_event_lines_and_stops_at_done() {
        let payloads = collect(reader(vec![
            "event: ping\n\n",
            "data: {\"n\":1}\n\n",
            ": comment\ndata: {\"n\":2}\n\ndata: [DONE]\n\n",
            "data: {\"n\":3}\n\n",
        ]))
        .await;
        assert_eq!(payloads, vec!["{\"n\":1}", "{\"n\":2}"]);
    }

    #[tokio::test]
    async fn reader_flushes_unterminated_last_line() {
        let mut r = reader(vec!["data: {\"n\":1}\n", "data: {\"n\":2}"]);
        assert_eq!(r.next_payload().await.expect("first").expect("ok"), "{\"n\":1}");
        assert_eq!(r.next_payload().await.expect("second").expect("ok"), "{\"n\":2}");
        assert!(r.next_payload().await.is_none());
        assert!(!r.saw_done());
    }

    #[test]
    fn line_dribbled_byte_by_byte_is_emitted_once() {
        let payload = format!("{{\"text\":\"{}\"}}", "x".repeat(4096));
        let wire = format!("data: {payload}\r\n");
        let mut decoder = SseLineDecoder::default();
        let mut lines = Vec::new();
        for byte in wire.as_bytes() {
            lines.extend(decoder.push_chunk(std::slice::from_ref(byte)));
        }
        assert_eq!(lines, vec![SseLine::Payload(payload)]);
        assert!(decoder.buf.is_empty());
        assert_eq!(decoder.scanned, 0);
    }

    #[test]
    fn scan_resumes_across_partial_chunks() {
        let mut decoder = SseLineDecoder::default();
        assert!(decoder.push_chunk(b"data: {\"a\"").is_empty());
        assert_eq!(decoder.scanned, 10);
        let lines = decoder.push_chunk(b":1}\ndata: {\"b\":2}\ndata: [DO");
        assert_eq!(
            lines,
            vec![
                SseLine::Payload("{\"a\":1}".into()),
                SseLine::Payload("{\"b\":2}".into())
            ]
        );
        assert_eq!(decoder.push_chunk(b"NE]\ndata: {}\n"), vec![SseLine::Done]);
        assert!(decoder.is_done());
    }

    #[tokio::test]
    async fn reader_surfaces_body_errors_once() {
        let mut r = FrameReader::new(Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"n\":1}\n")),
            Err(StreamError::network("reset")),
        ])));
        assert!(r.next_payload().await.expect("first").is_ok());
        assert!(matches!(
            r.next_payload().await,
            Some(Err(StreamError::Network { .. }))
        ));
        assert!(r.next_payload().await.is_none());
    }
}
