//! Server-sent-events wire handling
//!
//! The server under test streams `data: <payload>` lines separated by blank
//! lines. Chunks arrive at arbitrary boundaries, so [`EventScanner`] buffers the
//! trailing partial line between calls.

use bytes::BytesMut;

/// Payload of the event a server sends once, right after accepting `/events`
pub const WELCOME_PAYLOAD: &str = "connected";

/// Full welcome line as it appears on the wire
pub const WELCOME_MARKER: &str = "data: connected\n";

/// Keep-alive payload sent periodically by the reference server
pub const PING_PAYLOAD: &str = "ping";

/// Lines longer than this are discarded rather than buffered without bound
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// One decoded `data:` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Welcome,
    Ping,
    Data(String),
}

impl SseEvent {
    fn from_payload(payload: &str) -> Self {
        match payload {
            WELCOME_PAYLOAD => SseEvent::Welcome,
            PING_PAYLOAD => SseEvent::Ping,
            other => SseEvent::Data(other.to_string()),
        }
    }
}

/// Incremental line scanner for an event-stream body
#[derive(Debug, Default)]
pub struct EventScanner {
    pending: BytesMut,
    overflowed: bool,
}

impl EventScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one body chunk, returning every complete `data:` event it finished
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line = self.pending.split_to(pos + 1);
            if std::mem::take(&mut self.overflowed) {
                // Tail of a line we already gave up on
                continue;
            }
            if let Some(event) = parse_line(&line[..pos]) {
                events.push(event);
            }
        }

        if self.pending.len() > MAX_LINE_LENGTH {
            self.pending.clear();
            self.overflowed = true;
        }

        events
    }

    /// Bytes held back waiting for a line terminator
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}

fn parse_line(line: &[u8]) -> Option<SseEvent> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let value = line.strip_prefix(b"data:")?;
    let value = value.strip_prefix(b" ").unwrap_or(value);
    let payload = std::str::from_utf8(value).ok()?;
    Some(SseEvent::from_payload(payload))
}

/// Payload published for a given benchmark cycle.
///
/// Tagging every publish with its cycle keeps a straggler from cycle `k`
/// from being counted as a delivery in cycle `k + 1`.
pub fn cycle_payload(message: &str, cycle: u64) -> String {
    format!("{message}-{cycle}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welcome_marker_in_single_chunk() {
        let mut scanner = EventScanner::new();
        let events = scanner.feed(b"data: connected\n\n");
        assert_eq!(events, vec![SseEvent::Welcome]);
        assert_eq!(scanner.buffered(), 0);
    }

    #[test]
    fn test_marker_constant_matches_wire_format() {
        let mut scanner = EventScanner::new();
        assert_eq!(scanner.feed(WELCOME_MARKER.as_bytes()), vec![SseEvent::Welcome]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut scanner = EventScanner::new();
        assert!(scanner.feed(b"data: conn").is_empty());
        assert!(scanner.buffered() > 0);
        assert_eq!(scanner.feed(b"ected\n\ndata: msg-1"), vec![SseEvent::Welcome]);
        assert_eq!(
            scanner.feed(b"\n\n"),
            vec![SseEvent::Data("msg-1".to_string())]
        );
    }

    #[test]
    fn test_multiple_events_in_one_chunk() {
        let mut scanner = EventScanner::new();
        let events = scanner.feed(b"data: connected\n\ndata: ping\n\ndata: hello\n\n");
        assert_eq!(
            events,
            vec![
                SseEvent::Welcome,
                SseEvent::Ping,
                SseEvent::Data("hello".to_string())
            ]
        );
    }

    #[test]
    fn test_crlf_and_no_space_variants() {
        let mut scanner = EventScanner::new();
        let events = scanner.feed(b"data:connected\r\n\r\ndata:  padded\r\n");
        assert_eq!(
            events,
            vec![SseEvent::Welcome, SseEvent::Data(" padded".to_string())]
        );
    }

    #[test]
    fn test_non_data_fields_are_ignored() {
        let mut scanner = EventScanner::new();
        let events = scanner.feed(b": comment\nevent: update\nid: 7\nretry: 10\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_overlong_line_is_discarded() {
        let mut scanner = EventScanner::new();
        let junk = vec![b'x'; MAX_LINE_LENGTH + 1];
        assert!(scanner.feed(&junk).is_empty());
        assert_eq!(scanner.buffered(), 0);
        // Rest of the oversized line is dropped, the next line parses normally
        assert_eq!(scanner.feed(b"xxx\ndata: connected\n"), vec![SseEvent::Welcome]);
    }

    #[test]
    fn test_cycle_payload() {
        assert_eq!(cycle_payload("msg", 3), "msg-3");
        assert_ne!(cycle_payload("msg", 1), cycle_payload("msg", 11));
    }
}
