// ABOUTME: Streaming wire-format decoder: line buffering across TCP chunks plus frame assembly
// ABOUTME: Handles partial lines, multi-line data payloads, and comment/garbage lines without desync
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::mem;

use crate::event::TextEvent;

/// Line-buffering stage that handles partial lines across chunk boundaries.
///
/// The byte stream is newline-delimited but TCP does not align network chunks
/// with line boundaries. Complete lines (terminated by `\n`, with a trailing
/// `\r` trimmed) are yielded as they become available; a trailing partial
/// line stays buffered for the next `feed` call.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    /// Creates an empty line buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes and returns every complete line they unlock.
    ///
    /// Buffering stays byte-level so a multi-byte UTF-8 character split
    /// across chunks is reassembled before conversion; only complete lines
    /// are converted to text.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Whether a partial line is still buffered.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }
}

/// Frame-assembly stage: consumes lines and yields completed events.
///
/// At most one partially assembled event exists at a time; the protocol is
/// strictly sequential per connection. A blank line snapshots the accumulator
/// into an immutable event and resets it. Lines matching none of the `id:`,
/// `event:`, `data:` prefixes (heartbeat comments included) are ignored and
/// never start or corrupt an accumulator.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    partial: Option<TextEvent>,
}

impl FrameDecoder {
    /// Creates a decoder with no event in progress.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one line; returns a completed event when the line is the
    /// blank-line terminator of a frame in progress.
    pub fn push_line(&mut self, line: &str) -> Option<TextEvent> {
        if line.is_empty() {
            return self.partial.take();
        }

        if let Some(rest) = strip_field(line, "id") {
            let partial = self.partial.get_or_insert_with(TextEvent::default);
            partial.id = rest.to_owned();
        } else if let Some(rest) = strip_field(line, "event") {
            let partial = self.partial.get_or_insert_with(TextEvent::default);
            partial.event = rest.to_owned();
        } else if let Some(rest) = strip_field(line, "data") {
            let partial = self.partial.get_or_insert_with(TextEvent::default);
            // Data lines rejoin with the newline that split them at encode
            // time; the frame's first data line carries no leading break.
            partial.data.push('\n');
            partial.data.push_str(rest);
            if partial.data.starts_with('\n') {
                partial.data = partial.data.trim_start_matches('\n').to_owned();
            }
        }

        None
    }

    /// Whether a frame is partially assembled.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        self.partial.is_some()
    }
}

/// Strips `<field>:` plus at most one following space or tab.
fn strip_field<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(field)?.strip_prefix(':')?;
    match rest.as_bytes().first() {
        Some(b' ' | b'\t') => Some(&rest[1..]),
        _ => Some(rest),
    }
}

/// Complete decoder: bytes in, events out.
///
/// Composes [`LineBuffer`] and [`FrameDecoder`]; this is what the feed
/// reader's decode task runs over the response body.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    lines: LineBuffer,
    frames: FrameDecoder,
}

impl StreamDecoder {
    /// Creates an empty stream decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk of raw bytes and returns every event completed by it.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<TextEvent> {
        let mut events = Vec::new();
        for line in self.lines.feed(bytes) {
            if let Some(event) = self.frames.push_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Discards any unterminated frame at end-of-stream. A frame is only
    /// complete at its blank line, so dangling state is dropped, not emitted.
    pub fn finish(&mut self) {
        let _ = mem::take(&mut self.frames);
        let _ = mem::take(&mut self.lines);
    }
}
