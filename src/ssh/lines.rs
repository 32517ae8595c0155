// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Splits raw channel data into lines.
//!
//! SSH channel data arrives in arbitrary chunks. Only the trailing partial line
//! is kept between chunks, so memory stays bounded by the longest line rather
//! than by the whole command output.

/// A line longer than this is emitted in pieces.
const MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                lines.push(self.take_line());
            } else {
                self.partial.push(byte);
                if self.partial.len() >= MAX_LINE_BYTES {
                    tracing::warn!(
                        "Line exceeds {} bytes, splitting it",
                        MAX_LINE_BYTES
                    );
                    lines.push(self.take_overlong());
                }
            }
        }
        lines
    }

    /// Return the unterminated tail, if any. Called once the stream ends.
    pub fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    fn take_line(&mut self) -> String {
        let mut line = std::mem::take(&mut self.partial);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8_lossy(&line).into_owned()
    }

    /// Emit the buffered piece of an overlong line. A character cut short at
    /// the end is carried over to the next piece.
    fn take_overlong(&mut self) -> String {
        let split = incomplete_char_start(&self.partial).unwrap_or(self.partial.len());
        let carry = self.partial.split_off(split);
        let piece = std::mem::replace(&mut self.partial, carry);
        String::from_utf8_lossy(&piece).into_owned()
    }
}

/// Index of a multi-byte UTF-8 sequence left incomplete at the end of `bytes`.
fn incomplete_char_start(bytes: &[u8]) -> Option<usize> {
    let len = bytes.len();
    for back in 1..=len.min(4) {
        let start = len - back;
        let byte = bytes[start];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return (width > back).then_some(start);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_lines() {
        let mut buf = LineBuffer::new();
        assert_eq!(buf.push(b"one\ntwo\n"), vec!["one", "two"]);
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn test_partial_line_spans_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"hel").is_empty());
        assert_eq!(buf.push(b"lo\nwor"), vec!["hello"]);
        assert_eq!(buf.finish(), Some("wor".to_string()));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn test_crlf_is_stripped() {
        let mut buf = LineBuffer::new();
        assert_eq!(buf.push(b"a\r\nb\r\n"), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_lines_are_kept() {
        let mut buf = LineBuffer::new();
        assert_eq!(buf.push(b"\n\nx\n"), vec!["", "", "x"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"ok \xff\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ok "));
        assert!(lines[0].contains('\u{FFFD}'));
    }

    #[test]
    fn test_overlong_line_is_split() {
        let mut buf = LineBuffer::new();
        let chunk = vec![b'x'; MAX_LINE_BYTES + 10];
        let lines = buf.push(&chunk);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), MAX_LINE_BYTES);
        assert_eq!(buf.finish().map(|s| s.len()), Some(10));
    }

    #[test]
    fn test_overlong_split_keeps_characters_whole() {
        let mut buf = LineBuffer::new();
        let mut chunk = vec![b'x'; MAX_LINE_BYTES - 1];
        chunk.extend_from_slice("éx\n".as_bytes());

        let lines = buf.push(&chunk);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), MAX_LINE_BYTES - 1);
        assert!(!lines[0].contains('\u{FFFD}'));
        assert_eq!(lines[1], "éx");
    }

    #[test]
    fn test_incomplete_char_start() {
        assert_eq!(incomplete_char_start(b"abc"), None);
        assert_eq!(incomplete_char_start("aé".as_bytes()), None);
        assert_eq!(incomplete_char_start(b"a\xc3"), Some(1));
        assert_eq!(incomplete_char_start(b"a\xe2\x82"), Some(1));
        assert_eq!(incomplete_char_start("a€".as_bytes()), None);
    }
}
