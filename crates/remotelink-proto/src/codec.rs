//! Newline-delimited codec for relay control connections
//!
//! The decoder yields raw lines rather than parsed commands: a malformed line
//! must be logged and skipped by the dispatcher, not tear down the stream.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::command::RelayCommand;
use crate::MAX_LINE_LENGTH;

/// Codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Field of {command} contains whitespace or is empty: '{field}'")]
    InvalidField { command: String, field: String },

    #[error("Trailing field of {command} contains a line break")]
    LineBreakInField { command: String },
}

/// Line codec for the relay control protocol
#[derive(Debug, Clone)]
pub struct RelayCodec {
    max_length: usize,
    /// Set while skipping the remainder of an oversized line
    discarding: bool,
    /// Offset up to which the buffer has been searched for `\n`
    next_index: usize,
}

impl RelayCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            discarding: false,
            next_index: 0,
        }
    }
}

impl Default for RelayCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim().to_string()
}

impl Decoder for RelayCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, CodecError> {
        loop {
            let search_end = src.len().min(self.max_length.saturating_add(1));
            let newline = src[self.next_index..search_end]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.next_index + offset);

            match (self.discarding, newline) {
                (true, Some(idx)) => {
                    src.advance(idx + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    src.advance(search_end);
                    self.next_index = 0;
                    if src.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(idx)) => {
                    let line = src.split_to(idx + 1);
                    self.next_index = 0;
                    return Ok(Some(trim_line(&line[..idx])));
                }
                (false, None) if src.len() > self.max_length => {
                    tracing::warn!(
                        max_length = self.max_length,
                        "Control line exceeds maximum length, discarding"
                    );
                    self.discarding = true;
                }
                (false, None) => {
                    self.next_index = search_end;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, CodecError> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None => {
                // An unterminated final line is still delivered.
                self.next_index = 0;
                if src.is_empty() || self.discarding {
                    src.clear();
                    Ok(None)
                } else {
                    let line = src.split_to(src.len());
                    Ok(Some(trim_line(&line)))
                }
            }
        }
    }
}

impl Encoder<RelayCommand> for RelayCodec {
    type Error = CodecError;

    fn encode(&mut self, command: RelayCommand, dst: &mut BytesMut) -> Result<(), CodecError> {
        let (tokens, trailing) = command.fields();
        for field in tokens {
            if field.is_empty() || field.chars().any(char::is_whitespace) {
                return Err(CodecError::InvalidField {
                    command: command.name().to_string(),
                    field: field.to_string(),
                });
            }
        }
        if trailing.is_some_and(|t| t.contains(['\n', '\r'])) {
            return Err(CodecError::LineBreakInField {
                command: command.name().to_string(),
            });
        }

        let line = command.to_line();
        dst.reserve(line.len());
        dst.put_slice(line.as_bytes());
        Ok(())
    }
}
