// Line reassembly for the byte-oriented serial read path

use std::borrow::Cow;

/// Accumulates raw byte chunks and hands back complete `\n`-terminated lines.
///
/// Decoding is lossy: invalid UTF-8 sequences are replaced, never fatal, so
/// a corrupted byte in the stream can at worst spoil the frames of the line
/// it lands in.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of raw bytes, replacing invalid UTF-8 sequences.
    ///
    /// Returns `false` when at least one byte had to be replaced, so the
    /// caller can classify the decode fault without interrupting the stream.
    pub fn extend_lossy(&mut self, chunk: &[u8]) -> bool {
        match String::from_utf8_lossy(chunk) {
            Cow::Borrowed(text) => {
                self.buf.push_str(text);
                true
            }
            Cow::Owned(text) => {
                self.buf.push_str(&text);
                false
            }
        }
    }

    /// Remove and return the next complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let newline = self.buf.find('\n')?;
        let line = self.buf[..newline].to_string();
        self.buf.drain(..=newline);
        Some(line)
    }

    /// Number of buffered bytes still waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}
