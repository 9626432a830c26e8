//! Manager interface wire codec
//!
//! Messages are sequences of CRLF-terminated `Key: Value` lines closed by one blank
//! line. A `Response: Follows` reply switches the decoder into command-body mode, where
//! free-form lines accumulate into the synthetic `CommandResponse` field until the
//! `--END COMMAND--` sentinel.
//!
//! The decoder keeps its partial state between calls, so wrapping `FramedRead::next`
//! in a timeout never loses bytes that were already buffered.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::message::{fields, Message};

/// Longest single line accepted before the stream is considered corrupt
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Largest accumulated message, fields and command body together
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

// ----------------------------------------------------------------------------
// Encoding
// ----------------------------------------------------------------------------

/// Serialize a message into its wire form
pub fn serialize(message: &Message) -> Bytes {
    let mut buf = BytesMut::new();
    write_message(message, &mut buf);
    buf.freeze()
}

fn write_message(message: &Message, dst: &mut BytesMut) {
    for (key, value) in message.iter() {
        dst.reserve(key.len() + value.len() + 4);
        dst.put_slice(key.as_bytes());
        dst.put_slice(b": ");
        dst.put_slice(value.as_bytes());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
}

// ----------------------------------------------------------------------------
// Codec
// ----------------------------------------------------------------------------

/// Stateful line decoder and encoder for manager interface messages
#[derive(Debug, Default)]
pub struct AmiCodec {
    /// Fields collected for the message currently being decoded
    partial: Message,
    /// Set once `Response: Follows` has been seen in the current message
    in_command_body: bool,
    /// Bytes at the front of the buffer already known to contain no newline
    scanned: usize,
    /// Line bytes accepted into `partial` so far
    partial_size: usize,
}

impl AmiCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its line ending); returns a message once complete
    fn push_line(&mut self, line: &str) -> Option<Message> {
        if line.is_empty() {
            if self.partial.is_empty() {
                return None;
            }
            self.in_command_body = false;
            self.partial_size = 0;
            return Some(std::mem::take(&mut self.partial));
        }

        let (key, value) = split_field(line);

        if key.is_empty() && !self.in_command_body {
            return None;
        }

        if self.in_command_body && key != fields::PRIVILEGE && key != fields::ACTION_ID {
            if line == fields::END_COMMAND {
                self.in_command_body = false;
            } else {
                self.partial_size += line.len();
                self.partial.append_command_line(line);
            }
            return None;
        }

        if key == fields::RESPONSE && value == "Follows" {
            self.in_command_body = true;
        }
        self.partial_size += line.len();
        self.partial.insert(key, value);
        None
    }

    fn reset(&mut self) {
        self.partial = Message::new();
        self.in_command_body = false;
        self.scanned = 0;
        self.partial_size = 0;
    }
}

/// Split a line on its first `:` into a key (trailing spaces trimmed) and a value
/// (leading blanks skipped). Lines without a colon yield an empty key.
fn split_field(line: &str) -> (&str, &str) {
    match line.find(':') {
        Some(idx) => (
            line[..idx].trim_end_matches(' '),
            line[idx + 1..].trim_start_matches([' ', '\t']),
        ),
        None => ("", ""),
    }
}

fn strip_line_ending(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

fn line_too_long(len: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("line of {} bytes exceeds limit of {}", len, MAX_LINE_LENGTH),
    )
}

impl Decoder for AmiCodec {
    type Item = Message;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, io::Error> {
        loop {
            let start = self.scanned.min(src.len());
            let Some(offset) = src[start..].iter().position(|b| *b == b'\n') else {
                if src.len() > MAX_LINE_LENGTH {
                    return Err(line_too_long(src.len()));
                }
                self.scanned = src.len();
                return Ok(None);
            };

            let end = start + offset;
            self.scanned = 0;
            if end > MAX_LINE_LENGTH {
                return Err(line_too_long(end));
            }

            let raw = src.split_to(end + 1);
            let line = String::from_utf8_lossy(strip_line_ending(&raw));
            if let Some(message) = self.push_line(&line) {
                return Ok(Some(message));
            }
            if self.partial_size > MAX_MESSAGE_SIZE {
                let size = self.partial_size;
                self.reset();
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("message of {} bytes exceeds limit of {}", size, MAX_MESSAGE_SIZE),
                ));
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Message>, io::Error> {
        if let Some(message) = self.decode(buf)? {
            return Ok(Some(message));
        }
        // An unterminated message cannot be completed once the peer is gone
        buf.clear();
        self.reset();
        Ok(None)
    }
}

impl Encoder<Message> for AmiCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), io::Error> {
        write_message(&item, dst);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
