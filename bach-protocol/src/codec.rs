//! Line codec for the host's text framing

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Maximum line length (1 MiB)
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Line codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line too long: {size} bytes (max {max})")]
    LineTooLong { size: usize, max: usize },
}

/// Codec for newline-delimited text.
///
/// Decoding yields one `String` per line with trailing whitespace removed.
/// Blank lines are skipped. Encoding appends `\n` unless the line already
/// ends with one.
#[derive(Debug, Clone)]
pub struct LineCodec {
    /// Index into the buffer already scanned for a newline
    next_index: usize,
    max_length: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble a line and trim only after it is complete
fn finish_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end().to_string()
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline = src[self.next_index..].iter().position(|b| *b == b'\n');

            let Some(offset) = newline else {
                if src.len() > self.max_length {
                    let size = src.len();
                    src.clear();
                    self.next_index = 0;
                    return Err(CodecError::LineTooLong {
                        size,
                        max: self.max_length,
                    });
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let line_end = self.next_index + offset;
            self.next_index = 0;

            if line_end > self.max_length {
                src.clear();
                return Err(CodecError::LineTooLong {
                    size: line_end,
                    max: self.max_length,
                });
            }

            let raw = src.split_to(line_end + 1);
            let line = finish_line(&raw[..line_end]);
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(line));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        // Unterminated trailing line at EOF
        self.next_index = 0;
        if src.is_empty() {
            return Ok(None);
        }
        let raw = src.split_to(src.len());
        let line = finish_line(&raw);
        if line.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(line))
        }
    }
}

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.as_ref();

        if line.len() > self.max_length {
            return Err(CodecError::LineTooLong {
                size: line.len(),
                max: self.max_length,
            });
        }

        let terminated = line.ends_with('\n');
        dst.reserve(line.len() + usize::from(!terminated));
        dst.put_slice(line.as_bytes());
        if !terminated {
            dst.put_u8(b'\n');
        }
        Ok(())
    }
}
