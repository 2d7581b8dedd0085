// ABOUTME: Unit tests for the streaming wire-format decoder
// ABOUTME: Covers chunk-boundary buffering, multi-line payloads, ignored lines, and the round-trip law
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use sse_relay::{Event, FrameDecoder, LineBuffer, StreamDecoder, TextEvent};

// =============================================================================
// LineBuffer
// =============================================================================

#[test]
fn test_line_buffer_holds_partial_line() {
    let mut lines = LineBuffer::new();

    assert!(lines.feed(b"id: 4").is_empty());
    assert!(lines.has_partial());
    assert_eq!(lines.feed(b"2\n"), vec!["id: 42".to_owned()]);
    assert!(!lines.has_partial());
}

#[test]
fn test_line_buffer_yields_multiple_lines_per_chunk() {
    let mut lines = LineBuffer::new();

    assert_eq!(
        lines.feed(b"event: a\ndata: b\n\n"),
        vec!["event: a".to_owned(), "data: b".to_owned(), String::new()]
    );
}

#[test]
fn test_line_buffer_trims_carriage_return() {
    let mut lines = LineBuffer::new();

    assert_eq!(lines.feed(b"data: x\r\n"), vec!["data: x".to_owned()]);
}

// =============================================================================
// FrameDecoder
// =============================================================================

#[test]
fn test_frame_completes_at_blank_line() {
    let mut frames = FrameDecoder::new();

    assert!(frames.push_line("id: 1").is_none());
    assert!(frames.push_line("event: message").is_none());
    assert!(frames.push_line("data: 42").is_none());
    assert!(frames.has_partial());

    let event = frames.push_line("").unwrap();
    assert_eq!(event, TextEvent::new("1", "message", "42"));
    assert!(!frames.has_partial());
}

#[test]
fn test_blank_line_without_accumulator_yields_nothing() {
    let mut frames = FrameDecoder::new();

    assert!(frames.push_line("").is_none());
    assert!(frames.push_line("").is_none());
}

#[test]
fn test_later_id_and_event_lines_overwrite() {
    let mut frames = FrameDecoder::new();

    frames.push_line("id: 1");
    frames.push_line("id: 2");
    frames.push_line("event: a");
    frames.push_line("event: b");
    frames.push_line("data: x");

    let event = frames.push_line("").unwrap();
    assert_eq!(event, TextEvent::new("2", "b", "x"));
}

#[test]
fn test_data_lines_rejoin_with_newline() {
    let mut frames = FrameDecoder::new();

    frames.push_line("event: message");
    frames.push_line("data: line one");
    frames.push_line("data: line two");

    let event = frames.push_line("").unwrap();
    assert_eq!(event.data, "line one\nline two");
}

#[test]
fn test_field_without_space_after_colon() {
    let mut frames = FrameDecoder::new();

    frames.push_line("event:message");
    frames.push_line("data:42");

    let event = frames.push_line("").unwrap();
    assert_eq!(event, TextEvent::new("", "message", "42"));
}

#[test]
fn test_comment_and_garbage_lines_are_ignored() {
    let mut frames = FrameDecoder::new();

    assert!(frames.push_line(": heartbeat").is_none());
    assert!(!frames.has_partial(), "comment must not start an accumulator");

    frames.push_line("event: message");
    frames.push_line(": interleaved comment");
    frames.push_line("retry: 3000");
    frames.push_line("data: 42");

    let event = frames.push_line("").unwrap();
    assert_eq!(event, TextEvent::new("", "message", "42"));
}

// =============================================================================
// StreamDecoder
// =============================================================================

#[test]
fn test_heartbeat_frame_decodes_to_no_event() {
    let mut decoder = StreamDecoder::new();

    assert!(decoder.feed(b": heartbeat\n\n").is_empty());

    // A heartbeat never desynchronizes the frames around it.
    let events = decoder.feed(b"event: message\ndata: after\n\n");
    assert_eq!(events, vec![TextEvent::new("", "message", "after")]);
}

#[test]
fn test_frame_split_across_chunks() {
    let mut decoder = StreamDecoder::new();

    assert!(decoder.feed(b"id: 1\neve").is_empty());
    assert!(decoder.feed(b"nt: message\ndata: 4").is_empty());

    let events = decoder.feed(b"2\n\n");
    assert_eq!(events, vec![TextEvent::new("1", "message", "42")]);
}

#[test]
fn test_multiple_frames_in_one_chunk() {
    let mut decoder = StreamDecoder::new();

    let events = decoder.feed(b"event: a\ndata: 1\n\nevent: b\ndata: 2\n\n");
    assert_eq!(
        events,
        vec![
            TextEvent::new("", "a", "1"),
            TextEvent::new("", "b", "2"),
        ]
    );
}

#[test]
fn test_unterminated_frame_is_not_emitted() {
    let mut decoder = StreamDecoder::new();

    assert!(decoder.feed(b"event: message\ndata: dangling\n").is_empty());
    decoder.finish();
    assert!(decoder.feed(b"\n").is_empty(), "finish drops dangling state");
}

// =============================================================================
// Round-trip law
// =============================================================================

fn roundtrip(original: TextEvent) {
    let mut decoder = StreamDecoder::new();
    let frame = Event::Text(original.clone()).encode();

    let events = decoder.feed(&frame);
    assert_eq!(events, vec![original]);
}

#[test]
fn test_roundtrip_simple_event() {
    roundtrip(TextEvent::new("1", "message", "42"));
}

#[test]
fn test_roundtrip_preserves_embedded_newlines() {
    roundtrip(TextEvent::new("9", "multi", "first\nsecond\n\nfourth"));
}

#[test]
fn test_roundtrip_empty_data() {
    roundtrip(TextEvent::new("", "ping", ""));
}

#[test]
fn test_roundtrip_multibyte_payload_split_across_chunks() {
    let original = TextEvent::new("7", "message", "café – 団結 – 🚀");
    let frame = Event::Text(original.clone()).encode();

    // Byte-at-a-time feeding splits every multi-byte character across chunk
    // boundaries; the line buffer must reassemble them intact.
    let mut decoder = StreamDecoder::new();
    let mut decoded = Vec::new();
    for byte in &frame {
        decoded.extend(decoder.feed(&[*byte]));
    }

    assert_eq!(decoded, vec![original]);
}

#[test]
fn test_roundtrip_sequence_preserves_order_field_for_field() {
    let originals = vec![
        TextEvent::new("1", "message", "alpha"),
        TextEvent::new("2", "update", "beta\ngamma"),
        TextEvent::new("", "message", "delta"),
    ];

    let mut wire = Vec::new();
    for event in &originals {
        wire.extend_from_slice(&Event::Text(event.clone()).encode());
        wire.extend_from_slice(&Event::Heartbeat.encode());
    }

    // Feed the whole wire image one byte at a time: the harshest chunking.
    let mut decoder = StreamDecoder::new();
    let mut decoded = Vec::new();
    for byte in wire {
        decoded.extend(decoder.feed(&[byte]));
    }

    assert_eq!(decoded, originals);
}
