use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;

use ragloop_core::error::{RagError, Result};

/// Incremental parser for `text/event-stream` bodies.
///
/// Events are separated by a blank line; `data:` lines within one event are
/// joined with `\n`. Comment lines (leading `:`) are keep-alives and dropped.
#[derive(Default)]
pub struct SseParser {
    buffer: String,
}

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
}

impl SseEvent {
    /// OpenAI-style end-of-stream sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a decoded chunk and drain every complete event.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        if chunk.contains('\r') {
            self.buffer.push_str(&chunk.replace("\r\n", "\n"));
        } else {
            self.buffer.push_str(chunk);
        }

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = parse_block(&block) {
                events.push(event);
            }
        }
        events
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event_type = None;
    let mut data_lines = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(val) = line.strip_prefix("event:") {
            event_type = Some(val.trim_start().to_string());
        } else if let Some(val) = line.strip_prefix("data:") {
            data_lines.push(val.strip_prefix(' ').unwrap_or(val).to_string());
        }
    }

    if data_lines.is_empty() {
        None
    } else {
        Some(SseEvent {
            event_type,
            data: data_lines.join("\n"),
        })
    }
}

/// A stream of SSE events over a response byte stream.
///
/// Bytes are buffered until they form valid UTF-8, so multi-byte characters
/// split across network chunks are decoded intact. Invalid sequences become
/// U+FFFD. A transport error ends the stream with `RagError::LlmStream`.
pub struct SseStream<S> {
    inner: S,
    parser: SseParser,
    pending: VecDeque<SseEvent>,
    partial: Vec<u8>,
    finished: bool,
}

impl<S> SseStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            parser: SseParser::new(),
            pending: VecDeque::new(),
            partial: Vec::new(),
            finished: false,
        }
    }

    fn absorb(&mut self, bytes: &[u8]) {
        self.partial.extend_from_slice(bytes);
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.partial) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.partial.clear();
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.partial[..valid_up_to]));
                    match e.error_len() {
                        Some(invalid) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.partial.drain(..valid_up_to + invalid);
                        }
                        // Incomplete trailing sequence: wait for the next chunk.
                        None => {
                            self.partial.drain(..valid_up_to);
                            break;
                        }
                    }
                }
            }
        }
        if !text.is_empty() {
            self.pending.extend(self.parser.feed(&text));
        }
    }

    fn flush(&mut self) {
        if !self.partial.is_empty() {
            let rest = String::from_utf8_lossy(&self.partial).into_owned();
            self.partial.clear();
            self.pending.extend(self.parser.feed(&rest));
        }
        // A final event without the trailing blank line.
        if !self.parser.buffer.trim().is_empty() {
            let rest = std::mem::take(&mut self.parser.buffer);
            self.pending.extend(parse_block(&rest));
        }
    }
}

impl<S, E> Stream for SseStream<S>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    type Item = Result<SseEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.absorb(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    this.partial.clear();
                    return Poll::Ready(Some(Err(RagError::LlmStream(format!(
                        "response body interrupted: {}",
                        e
                    )))));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    this.flush();
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
