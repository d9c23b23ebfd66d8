//! Newline framing for the backend's stdout.
//!
//! Stdout is delivered in arbitrary chunks. `LineFramer` buffers them and
//! only hands out whole lines, so a JSON message is never parsed until its
//! terminating `\n` has arrived.

/// Reassembles chunked stdout into trimmed, non-blank lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one delivery and return every message it completed, in order.
    ///
    /// Works on bytes so a UTF-8 sequence split across two deliveries is
    /// joined before it is decoded.
    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) -> Vec<String> {
        let chunk = chunk.as_ref();
        self.pending.extend_from_slice(chunk);

        // The remainder never holds a newline, so only the new chunk can
        // complete a message.
        let Some(last_newline) = chunk.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let last_newline = self.pending.len() - chunk.len() + last_newline;

        let remainder = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, remainder);

        complete
            .split(|b| *b == b'\n')
            .map(String::from_utf8_lossy)
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// The buffered fragment still waiting for its terminator.
    pub fn remainder(&self) -> &[u8] {
        &self.pending
    }

    /// Drop the buffered fragment, returning it if it held anything but
    /// whitespace.
    pub fn take_remainder(&mut self) -> Option<String> {
        let fragment = std::mem::take(&mut self.pending);
        let fragment = String::from_utf8_lossy(&fragment).trim().to_string();
        if fragment.is_empty() {
            None
        } else {
            Some(fragment)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LineFramer;

    #[test]
    fn test_split_mid_message() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(r#"{"id":"1","#).is_empty());
        assert_eq!(framer.remainder(), br#"{"id":"1","#);

        let messages = framer.feed("\"result\":1}\n");
        assert_eq!(messages, vec![r#"{"id":"1","result":1}"#.to_string()]);
        assert!(framer.remainder().is_empty());
    }

    #[test]
    fn test_chunking_invariance() {
        let stream = "{\"event\":\"a\"}\n\n  {\"id\":\"1\",\"result\":null}\r\nplain output\n{\"id\":\"2\"}\n";

        let mut whole = LineFramer::new();
        let expected = whole.feed(stream);
        assert_eq!(expected.len(), 4);

        for size in 1..stream.len() {
            let mut framer = LineFramer::new();
            let mut got = Vec::new();
            for chunk in stream.as_bytes().chunks(size) {
                got.extend(framer.feed(chunk));
            }
            assert_eq!(got, expected, "chunk size {}", size);
        }
    }

    #[test]
    fn test_keeps_trailing_fragment() {
        let mut framer = LineFramer::new();
        let messages = framer.feed("one\ntwo\nthr");
        assert_eq!(messages, vec!["one", "two"]);
        assert_eq!(framer.remainder(), b"thr");

        let messages = framer.feed("ee\n");
        assert_eq!(messages, vec!["three"]);
    }

    #[test]
    fn test_blank_lines_are_dropped() {
        let mut framer = LineFramer::new();
        assert!(framer.feed("\n \r\n\t\n").is_empty());
        assert!(framer.remainder().is_empty());
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let text = "{\"event\":\"log\",\"params\":\"héllo\"}\n";
        let bytes = text.as_bytes();
        let split = text.find('é').unwrap() + 1;

        let mut framer = LineFramer::new();
        assert!(framer.feed(&bytes[..split]).is_empty());
        let messages = framer.feed(&bytes[split..]);
        assert_eq!(messages, vec![text.trim().to_string()]);
    }

    #[test]
    fn test_take_remainder() {
        let mut framer = LineFramer::new();
        framer.feed("done\npartial");
        assert_eq!(framer.take_remainder().as_deref(), Some("partial"));
        assert!(framer.take_remainder().is_none());

        framer.feed("   ");
        assert!(framer.take_remainder().is_none());
    }
}
