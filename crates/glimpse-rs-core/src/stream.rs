//! Incremental decoder for server-sent generation events.
//!
//! Records are newline delimited. Lines starting with `data: ` carry a JSON
//! chunk whose first candidate's first part holds the text delta; `[DONE]`
//! carries no text; every other line is ignored. Fragments may split lines and
//! UTF-8 sequences at arbitrary byte offsets.

use crate::error::GlimpseCoreError;
use futures_util::{Stream, StreamExt, stream};
use log::{debug, warn};
use serde::Deserialize;
use std::collections::VecDeque;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded event payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

impl StreamChunk {
    /// Text of the first part of the first candidate, if present.
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
    }
}

/// Line-buffering decoder turning byte fragments into text deltas.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    /// Bytes of a UTF-8 sequence cut off at the end of the last fragment.
    carry: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a fragment and return the deltas of every line it completes.
    pub fn push(&mut self, fragment: &[u8]) -> Vec<String> {
        self.append_utf8(fragment);
        let mut deltas = Vec::new();
        while let Some(end) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=end).collect();
            let line = &line[..end];
            if let Some(delta) = parse_line(line.strip_suffix('\r').unwrap_or(line)) {
                deltas.push(delta);
            }
        }
        deltas
    }

    /// Flush the trailing unterminated line, if it carries a delta.
    ///
    /// The buffer is discarded afterwards, so calling this twice yields the
    /// delta at most once.
    pub fn finish(&mut self) -> Option<String> {
        if !self.carry.is_empty() {
            let carry = std::mem::take(&mut self.carry);
            self.buffer.push_str(&String::from_utf8_lossy(&carry));
        }
        let rest = std::mem::take(&mut self.buffer);
        if !rest.is_empty() {
            debug!("flushing unterminated stream line (len={})", rest.len());
        }
        parse_line(rest.strip_suffix('\r').unwrap_or(&rest))
    }

    fn append_utf8(&mut self, fragment: &[u8]) {
        let mut pending = std::mem::take(&mut self.carry);
        pending.extend_from_slice(fragment);
        let mut input = pending.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    self.buffer.push_str(valid);
                    return;
                }
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    self.buffer.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        None => {
                            self.carry = rest.to_vec();
                            return;
                        }
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                    }
                }
            }
        }
    }
}

/// Delta carried by a single complete line.
fn parse_line(line: &str) -> Option<String> {
    let payload = line.strip_prefix(DATA_PREFIX)?;
    if payload == DONE_SENTINEL {
        return None;
    }
    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => chunk
            .first_text()
            .filter(|text| !text.is_empty())
            .map(str::to_string),
        Err(err) => {
            warn!(
                "skipping malformed stream record (len={}, err={})",
                payload.len(),
                err
            );
            None
        }
    }
}

struct DecodeState<S> {
    source: S,
    decoder: SseDecoder,
    ready: VecDeque<String>,
    done: bool,
}

/// Decode a byte stream into a stream of text deltas.
///
/// A transport error is yielded once and ends the stream; deltas decoded
/// before it have already been yielded.
pub fn decode_stream<S>(source: S) -> impl Stream<Item = Result<String, GlimpseCoreError>>
where
    S: Stream<Item = Result<Vec<u8>, GlimpseCoreError>> + Unpin,
{
    let state = DecodeState {
        source,
        decoder: SseDecoder::new(),
        ready: VecDeque::new(),
        done: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(delta) = state.ready.pop_front() {
                return Some((Ok(delta), state));
            }
            if state.done {
                return None;
            }
            match state.source.next().await {
                Some(Ok(fragment)) => {
                    let deltas = state.decoder.push(&fragment);
                    state.ready.extend(deltas);
                }
                Some(Err(err)) => {
                    state.done = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.done = true;
                    let last = state.decoder.finish();
                    state.ready.extend(last);
                }
            }
        }
    })
}
