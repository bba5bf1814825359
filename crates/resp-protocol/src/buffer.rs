//! Byte buffer and token layer.
//!
//! `ReadBuffer` is an append-only write head with a consumer-advanced read
//! head, compacted back to the front once consumed bytes fall behind. All
//! parse helpers obey one rule: a partial frame leaves the read position
//! unchanged and returns `None` ("need more bytes"); a complete frame
//! advances exactly past its trailing CRLF.

const CRLF: &[u8] = b"\r\n";

/// Growable byte buffer with a read cursor, used to accumulate socket reads
/// and parse RESP frames out of them incrementally.
#[derive(Debug, Default)]
pub struct ReadBuffer {
    data: Vec<u8>,
    pos: usize,
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(4096),
            pos: 0,
        }
    }

    /// Append freshly-read socket bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Bytes not yet consumed by the parser.
    pub fn unconsumed(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Drop consumed bytes from the front once they dominate the buffer, so
    /// it doesn't grow unbounded across a long-lived connection.
    pub fn compact(&mut self) {
        if self.pos == 0 {
            return;
        }
        if self.pos == self.data.len() {
            self.data.clear();
            self.pos = 0;
        } else if self.pos > 4096 {
            self.data.drain(..self.pos);
            self.pos = 0;
        }
    }

    /// Peek the next unconsumed byte without advancing.
    pub fn peek_byte(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn find_crlf(&self) -> Option<usize> {
        let hay = &self.data[self.pos..];
        hay.windows(2).position(|w| w == CRLF)
    }

    /// Consume a line up to (but excluding) the next CRLF. Returns `None`
    /// and leaves `pos` untouched if the terminator hasn't arrived yet.
    pub fn consume_line(&mut self) -> Option<&[u8]> {
        let rel = self.find_crlf()?;
        let start = self.pos;
        let end = start + rel;
        self.pos = end + CRLF.len();
        Some(&self.data[start..end])
    }

    /// Consume exactly `n` payload bytes followed by a CRLF.
    pub fn consume_exact(&mut self, n: usize) -> ConsumeOutcome<'_> {
        let start = self.pos;
        let needed = n + CRLF.len();
        if self.data.len() - start < needed {
            return ConsumeOutcome::Pending;
        }
        let payload_end = start + n;
        if &self.data[payload_end..payload_end + CRLF.len()] != CRLF {
            return ConsumeOutcome::Malformed;
        }
        self.pos = payload_end + CRLF.len();
        ConsumeOutcome::Ready(&self.data[start..payload_end])
    }

    /// Current read position, for rollback on a partial multi-token frame.
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    /// Roll back to a previously captured position.
    pub(crate) fn restore(&mut self, pos: usize) {
        self.pos = pos;
    }
}

/// Outcome of [`ReadBuffer::consume_exact`]: distinguishes "not enough bytes
/// yet" from "enough bytes, but the trailing CRLF is missing" (a malformed,
/// not merely incomplete, frame).
pub enum ConsumeOutcome<'a> {
    Pending,
    Malformed,
    Ready(&'a [u8]),
}

/// Parse a decimal (optionally negative) signed integer from a line.
pub fn parse_i64(line: &[u8]) -> Option<i64> {
    if line.is_empty() {
        return None;
    }
    let (neg, digits) = match line[0] {
        b'-' => (true, &line[1..]),
        b'+' => (false, &line[1..]),
        _ => (false, line),
    };
    if digits.is_empty() {
        return None;
    }
    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add((b - b'0') as i64)?;
    }
    Some(if neg { -value } else { value })
}

/// Parse an IEEE-754 double, including RESP3's `inf`/`-inf`/`nan` spellings.
pub fn parse_f64(line: &[u8]) -> Option<f64> {
    let s = std::str::from_utf8(line).ok()?;
    match s {
        "inf" | "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        "nan" => Some(f64::NAN),
        _ => s.parse::<f64>().ok(),
    }
}

/// Shortest-decimal rendering used when encoding numeric command arguments.
pub fn format_i64(v: i64) -> String {
    v.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_line_returns_none_and_does_not_advance() {
        let mut buf = ReadBuffer::new();
        buf.extend(b"+OK");
        assert!(buf.consume_line().is_none());
        assert_eq!(buf.unconsumed(), b"+OK");
    }

    #[test]
    fn complete_line_advances_past_crlf() {
        let mut buf = ReadBuffer::new();
        buf.extend(b"+OK\r\nrest");
        assert_eq!(buf.consume_line(), Some(&b"+OK"[..]));
        assert_eq!(buf.unconsumed(), b"rest");
    }

    #[test]
    fn consume_exact_requires_trailing_crlf() {
        let mut buf = ReadBuffer::new();
        buf.extend(b"abc\r\n");
        assert!(matches!(buf.consume_exact(3), ConsumeOutcome::Ready(b) if b == b"abc"));
    }

    #[test]
    fn consume_exact_partial_leaves_position_unchanged() {
        let mut buf = ReadBuffer::new();
        buf.extend(b"ab");
        assert!(matches!(buf.consume_exact(3), ConsumeOutcome::Pending));
        assert_eq!(buf.unconsumed(), b"ab");
    }

    #[test]
    fn consume_exact_detects_missing_terminator() {
        let mut buf = ReadBuffer::new();
        buf.extend(b"abcXY");
        assert!(matches!(buf.consume_exact(3), ConsumeOutcome::Malformed));
    }

    #[test]
    fn parse_i64_handles_sign_and_rejects_garbage() {
        assert_eq!(parse_i64(b"123"), Some(123));
        assert_eq!(parse_i64(b"-123"), Some(-123));
        assert_eq!(parse_i64(b"+5"), Some(5));
        assert_eq!(parse_i64(b""), None);
        assert_eq!(parse_i64(b"12a"), None);
        assert_eq!(parse_i64(b"-"), None);
    }

    #[test]
    fn parse_f64_handles_special_values() {
        assert_eq!(parse_f64(b"inf"), Some(f64::INFINITY));
        assert_eq!(parse_f64(b"-inf"), Some(f64::NEG_INFINITY));
        assert!(parse_f64(b"nan").unwrap().is_nan());
        assert_eq!(parse_f64(b"3.14"), Some(3.14));
    }

    #[test]
    fn split_feed_yields_same_result_as_one_shot() {
        let whole = b"+PONG\r\n";
        for split in 0..whole.len() {
            let mut buf = ReadBuffer::new();
            buf.extend(&whole[..split]);
            let first = buf.consume_line().map(<[u8]>::to_vec);
            buf.extend(&whole[split..]);
            let second = if first.is_none() {
                buf.consume_line().map(<[u8]>::to_vec)
            } else {
                first.clone()
            };
            assert_eq!(second, Some(b"PONG".to_vec()));
        }
    }
}
