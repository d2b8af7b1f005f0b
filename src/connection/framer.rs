//! Line framing for received data and line sanitization for sent data.
//!
//! # Framing
//!
//! Received chunks are appended to a buffer. Every `\r\n`-terminated
//! segment is emitted as one line; the unterminated tail stays buffered
//! until a later chunk completes it. Lines, terminators and multi-byte
//! characters may all be split across chunks.

// ============================================================================
// Constants
// ============================================================================

/// Canonical line terminator.
pub const LINE_TERMINATOR: &str = "\r\n";

const TERMINATOR_BYTES: &[u8] = LINE_TERMINATOR.as_bytes();

// ============================================================================
// LineFramer
// ============================================================================

/// Reassembles complete lines from chunked input.
#[derive(Debug, Default, Clone)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    /// Creates an empty framer.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a received chunk and returns the lines it completed, in order.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        // A terminator may straddle the previous chunk boundary.
        let mut search_from = self.buffer.len().saturating_sub(TERMINATOR_BYTES.len() - 1);
        self.buffer.extend_from_slice(data);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = find_terminator(&self.buffer[search_from..]) {
            let end = search_from + pos;
            lines.push(String::from_utf8_lossy(&self.buffer[start..end]).into_owned());
            start = end + TERMINATOR_BYTES.len();
            search_from = start;
        }

        self.buffer.drain(..start);
        lines
    }

    /// Returns the bytes received but not yet forming a complete line.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Discards any partial line.
    #[inline]
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

fn find_terminator(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(TERMINATOR_BYTES.len())
        .position(|window| window == TERMINATOR_BYTES)
}

// ============================================================================
// Sanitization
// ============================================================================

/// Strips NUL, CR and LF from `line` and appends the line terminator.
///
/// The result always holds exactly one terminator, at the end, so caller
/// text can never inject an extra protocol line.
#[must_use]
pub fn format_line(line: &str) -> String {
    let mut formatted: String = line
        .chars()
        .filter(|c| !matches!(c, '\0' | '\r' | '\n'))
        .collect();
    formatted.push_str(LINE_TERMINATOR);
    formatted
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn reference_split(input: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(input);
        let mut segments: Vec<String> = text.split(LINE_TERMINATOR).map(String::from).collect();
        segments.pop();
        segments
    }

    #[test]
    fn test_single_chunk() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"PING :a\r\nPING :b\r\n");
        assert_eq!(lines, vec!["PING :a", "PING :b"]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_partial_line_is_buffered() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"PRIVMSG #chan :hel").is_empty());
        assert_eq!(framer.pending(), b"PRIVMSG #chan :hel");

        let lines = framer.push(b"lo\r\nNEXT");
        assert_eq!(lines, vec!["PRIVMSG #chan :hello"]);
        assert_eq!(framer.pending(), b"NEXT");
    }

    #[test]
    fn test_terminator_split_across_chunks() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"first\r").is_empty());
        assert_eq!(framer.push(b"\nsecond\r\n"), vec!["first", "second"]);
    }

    #[test]
    fn test_empty_lines_are_emitted() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"\r\n\r\nx\r\n"), vec!["", "", "x"]);
    }

    #[test]
    fn test_multibyte_character_split() {
        let bytes = "caf\u{e9}\r\n".as_bytes();
        let mut framer = LineFramer::new();
        assert!(framer.push(&bytes[..4]).is_empty());
        assert_eq!(framer.push(&bytes[4..]), vec!["caf\u{e9}"]);
    }

    #[test]
    fn test_clear_discards_partial_line() {
        let mut framer = LineFramer::new();
        framer.push(b"half");
        framer.clear();
        assert_eq!(framer.push(b" line\r\n"), vec![" line"]);
    }

    #[test]
    fn test_format_line_strips_injection() {
        assert_eq!(format_line("PRIVMSG #a :hi\r\nQUIT"), "PRIVMSG #a :hiQUIT\r\n");
        assert_eq!(format_line("a\0b\nc"), "abc\r\n");
        assert_eq!(format_line(""), "\r\n");
    }

    proptest! {
        #[test]
        fn prop_chunking_matches_reference_split(
            input in prop::collection::vec(
                prop::sample::select(vec![b'a', b'b', b' ', b':', b'\r', b'\n']),
                0..256,
            ),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
        ) {
            let mut points: Vec<usize> = cuts.iter().map(|cut| cut.index(input.len() + 1)).collect();
            points.sort_unstable();

            let mut framer = LineFramer::new();
            let mut lines = Vec::new();
            let mut last = 0;
            for point in points.into_iter().chain(std::iter::once(input.len())) {
                lines.extend(framer.push(&input[last..point]));
                last = point;
            }

            prop_assert_eq!(lines, reference_split(&input));
        }

        #[test]
        fn prop_formatted_line_loops_back(line in any::<String>()) {
            let formatted = format_line(&line);
            prop_assert!(formatted.ends_with(LINE_TERMINATOR));
            prop_assert_eq!(formatted.matches(LINE_TERMINATOR).count(), 1);

            let expected: String = line.chars().filter(|c| !matches!(c, '\0' | '\r' | '\n')).collect();
            let mut framer = LineFramer::new();
            prop_assert_eq!(framer.push(formatted.as_bytes()), vec![expected]);
            prop_assert!(framer.pending().is_empty());
        }
    }
}
