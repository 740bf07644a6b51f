// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Line filter between the upstream body and the client.
//!
//! Upstream chunks do not respect line boundaries, so the filter buffers the
//! trailing partial line until its newline arrives. Complete lines are
//! forwarded byte for byte unless they equal the keep-alive sentinel.

use bytes::{Bytes, BytesMut};

const DONE_LINE: &[u8] = b"data: [DONE]";

#[derive(Debug)]
pub struct LineFilter {
    sentinel: Vec<u8>,
    partial: BytesMut,
    dropped: usize,
    saw_done: bool,
}

impl LineFilter {
    pub fn new(sentinel: &str) -> Self {
        Self {
            sentinel: sentinel.as_bytes().to_vec(),
            partial: BytesMut::new(),
            dropped: 0,
            saw_done: false,
        }
    }

    /// Feeds one upstream chunk and returns the bytes ready to forward.
    ///
    /// The result is empty when the chunk completed no line, or when every
    /// completed line was the sentinel.
    pub fn push(&mut self, chunk: &[u8]) -> Bytes {
        self.partial.extend_from_slice(chunk);
        let Some(last_newline) = self.partial.iter().rposition(|&b| b == b'\n') else {
            return Bytes::new();
        };
        let complete = self.partial.split_to(last_newline + 1);

        let mut out = BytesMut::with_capacity(complete.len());
        for line in complete.split_inclusive(|&b| b == b'\n') {
            if self.keep(line) {
                out.extend_from_slice(line);
            }
        }
        out.freeze()
    }

    /// Flushes a trailing line that never got its newline.
    pub fn finish(&mut self) -> Bytes {
        let rest = self.partial.split();
        if rest.is_empty() || !self.keep(&rest) {
            return Bytes::new();
        }
        rest.freeze()
    }

    /// Whether upstream sent its `data: [DONE]` terminator.
    pub fn saw_done(&self) -> bool {
        self.saw_done
    }

    /// Number of sentinel lines removed so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn keep(&mut self, line: &[u8]) -> bool {
        let content = trim_line_end(line);
        if content == self.sentinel.as_slice() {
            self.dropped += 1;
            return false;
        }
        if content == DONE_LINE {
            self.saw_done = true;
        }
        true
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENTINEL: &str = ": OPENROUTER PROCESSING";

    #[test]
    fn forwards_everything_but_the_sentinel() {
        let mut filter = LineFilter::new(SENTINEL);
        let out = filter.push(b": OPENROUTER PROCESSING\n\ndata: {\"a\":1}\n\n");
        assert_eq!(&out[..], b"\ndata: {\"a\":1}\n\n");
        assert_eq!(filter.dropped(), 1);
    }

    #[test]
    fn joins_lines_split_across_chunks() {
        let mut filter = LineFilter::new(SENTINEL);
        assert!(filter.push(b"data: {\"del").is_empty());
        assert_eq!(&filter.push(b"ta\":1}\n\n")[..], b"data: {\"delta\":1}\n\n");
    }

    #[test]
    fn sentinel_split_across_chunks_is_still_dropped() {
        let mut filter = LineFilter::new(SENTINEL);
        assert!(filter.push(b": OPENROUTER PRO").is_empty());
        assert!(filter.push(b"CESSING\r\n").is_empty());
        assert_eq!(filter.dropped(), 1);
    }

    #[test]
    fn similar_lines_pass_through() {
        let mut filter = LineFilter::new(SENTINEL);
        let input = b": OPENROUTER PROCESSING!\ndata: : OPENROUTER PROCESSING\n";
        assert_eq!(&filter.push(input)[..], &input[..]);
        assert_eq!(filter.dropped(), 0);
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut filter = LineFilter::new(SENTINEL);
        filter.push(b"data: [DONE]");
        assert!(!filter.saw_done());
        assert_eq!(&filter.finish()[..], b"data: [DONE]");
        assert!(filter.saw_done());
        assert!(filter.finish().is_empty());
    }

    #[test]
    fn multibyte_text_split_mid_character() {
        let text = "data: 读书\n".as_bytes();
        let mut filter = LineFilter::new(SENTINEL);
        assert!(filter.push(&text[..8]).is_empty());
        assert_eq!(&filter.push(&text[8..])[..], text);
    }
}
