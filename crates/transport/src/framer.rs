//! Splits the incoming byte stream into terminated lines.

use bytes::{Buf, BytesMut};

use crate::config::LineEnding;
use crate::error::Error;
use crate::message::Message;

/// Stateful line framer.
///
/// Bytes are appended with [`Framer::feed`]; the returned iterator yields every
/// line completed so far. Bytes after the last terminator stay buffered until a
/// later call completes them.
#[derive(Debug)]
pub struct Framer {
    buffer: BytesMut,
    line_ending: LineEnding,
    max_frame_len: usize,
    // prefix of `buffer` already known to contain no terminator
    scanned: usize,
}

impl Framer {
    pub fn new(line_ending: LineEnding, max_frame_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(256),
            line_ending,
            max_frame_len,
            scanned: 0,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Frames<'_> {
        self.buffer.extend_from_slice(bytes);
        Frames { framer: self }
    }

    /// Number of bytes waiting for a terminator.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn next_frame(&mut self) -> Option<Result<Message, Error>> {
        loop {
            let Some((end, terminator_len)) = self.find_terminator() else {
                self.scanned = self.buffer.len();
                if self.unterminated_len() > self.max_frame_len {
                    return Some(Err(self.overflow()));
                }
                return None;
            };

            let line = self.buffer.split_to(end).freeze();
            self.buffer.advance(terminator_len);
            self.scanned = 0;

            if line.len() > self.max_frame_len {
                return Some(Err(self.overflow()));
            }
            if line.is_empty() {
                continue;
            }
            return Some(Ok(Message::new(line)));
        }
    }

    fn find_terminator(&self) -> Option<(usize, usize)> {
        match self.line_ending {
            LineEnding::Any => self.buffer[self.scanned..]
                .iter()
                .position(|&b| b == b'\r' || b == b'\n')
                .map(|i| (self.scanned + i, 1)),
            LineEnding::CrLf => {
                // a trailing `\r` from the previous scan may pair with a new `\n`
                let start = self.scanned.saturating_sub(1);
                self.buffer[start..]
                    .windows(2)
                    .position(|w| w == b"\r\n")
                    .map(|i| (start + i, 2))
            }
        }
    }

    /// Length of the incomplete line. In CRLF mode a trailing `\r` may be the
    /// first half of the terminator and does not count.
    fn unterminated_len(&self) -> usize {
        match self.line_ending {
            LineEnding::CrLf if self.buffer.ends_with(b"\r") => self.buffer.len() - 1,
            _ => self.buffer.len(),
        }
    }

    fn overflow(&mut self) -> Error {
        tracing::warn!(
            buffered = self.buffer.len(),
            max = self.max_frame_len,
            "discarding oversized frame"
        );
        self.buffer.clear();
        self.scanned = 0;
        Error::FramingOverflow {
            max: self.max_frame_len,
        }
    }
}

/// Lines completed by one [`Framer::feed`] call.
pub struct Frames<'a> {
    framer: &'a mut Framer,
}

impl Iterator for Frames<'_> {
    type Item = Result<Message, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.framer.next_frame()
    }
}
