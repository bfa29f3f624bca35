//! Decoding of `data:` frames from the `/stream/<id>` endpoint

use futures::{Stream, StreamExt};
use serde_json::Value;

use super::JobError;

const DATA_PREFIX: &str = "data:";
const EVENT_PREFIX: &str = "event:";

/// One decoded unit of a token stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Token(String),
    /// Data sent under `event: end`; the producer is done
    End,
    /// Data sent under `event: error`
    Error(String),
}

/// Incremental line splitter for a chunked response body.
///
/// Bytes are buffered until a newline arrives, so a frame split across two
/// chunks (or a multi-byte character split across two chunks) is decoded once.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning the events completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = self.decode_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that was not newline-terminated
    pub fn finish(&mut self) -> Option<StreamEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&line)
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<StreamEvent> {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim_end_matches('\r');

        if line.is_empty() {
            self.event = None;
            return None;
        }

        if let Some(name) = line.strip_prefix(EVENT_PREFIX) {
            self.event = Some(name.trim().to_string());
            return None;
        }

        let token = line.strip_prefix(DATA_PREFIX)?.trim();
        match self.event.as_deref() {
            Some("end") => Some(StreamEvent::End),
            Some("error") => Some(StreamEvent::Error(token.to_string())),
            _ if token.is_empty() => None,
            _ => Some(StreamEvent::Token(decode_token(token))),
        }
    }
}

/// JSON string tokens are unescaped; anything else is used verbatim
pub fn decode_token(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::String(text)) => text,
        _ => raw.to_string(),
    }
}

/// Turn a streaming response body into decoded events
pub fn token_stream(
    response: reqwest::Response,
) -> impl Stream<Item = Result<StreamEvent, JobError>> {
    async_stream::try_stream! {
        let mut decoder = FrameDecoder::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for event in decoder.push(&chunk) {
                yield event;
            }
        }

        if let Some(event) = decoder.finish() {
            yield event;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(events: Vec<StreamEvent>) -> Vec<String> {
        events
            .into_iter()
            .filter_map(|e| match e {
                StreamEvent::Token(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_data_lines_become_tokens() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(b"data: hello\n\ndata: world\n\n");
        assert_eq!(tokens(events), vec!["hello", "world"]);
    }

    #[test]
    fn test_non_data_lines_ignored() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(b": keep-alive\nid: 7\ndata: x\n");
        assert_eq!(events, vec![StreamEvent::Token("x".to_string())]);
    }

    #[test]
    fn test_empty_data_skipped() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data:   \n").is_empty());
    }

    #[test]
    fn test_json_string_tokens_unescaped() {
        assert_eq!(decode_token("\"Summary: \""), "Summary: ");
        assert_eq!(decode_token("\"line\\nbreak\""), "line\nbreak");
        assert_eq!(decode_token("plain words"), "plain words");
        assert_eq!(decode_token("42"), "42");
        assert_eq!(decode_token("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"da").is_empty());
        assert!(decoder.push(b"ta: \"par").is_empty());
        let events = decoder.push(b"tial\"\r\n");
        assert_eq!(events, vec![StreamEvent::Token("partial".to_string())]);
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        let frame = "data: नमस्ते\n".as_bytes();
        assert!(decoder.push(&frame[..8]).is_empty());
        let events = decoder.push(&frame[8..]);
        assert_eq!(events, vec![StreamEvent::Token("नमस्ते".to_string())]);
    }

    #[test]
    fn test_end_event_not_a_token() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(b"data: <p>a</p>\n\nevent: end\ndata: finished\n\n");
        assert_eq!(
            events,
            vec![StreamEvent::Token("<p>a</p>".to_string()), StreamEvent::End]
        );
    }

    #[test]
    fn test_error_event() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(b"event: error\ndata: Job not found\n\n");
        assert_eq!(events, vec![StreamEvent::Error("Job not found".to_string())]);
    }

    #[test]
    fn test_event_name_reset_by_blank_line() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(b"event: progress\ndata: 10%\n\ndata: text\n");
        assert_eq!(tokens(events), vec!["10%", "text"]);
    }

    #[test]
    fn test_finish_flushes_trailing_line() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), Some(StreamEvent::Token("tail".to_string())));
        assert_eq!(decoder.finish(), None);
    }
}
