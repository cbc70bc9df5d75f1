//! Line framing for the agent's report stream.

// External crates
use bytes::{Buf, BytesMut};
use std::io;
use tokio_util::codec::Decoder;

/// Splits the agent's report into lines.
///
/// A line ends at `\n`, at `\r`, or at `\r\n`, and the terminator is not part
/// of the line. Bytes that are not valid UTF-8 are replaced with U+FFFD. A
/// final line without a terminator is still produced at end of stream.
#[derive(Debug, Default)]
pub struct ReportLineCodec {
    /// The previous line ended with `\r`, so a leading `\n` belongs to it.
    skip_lf: bool,
    /// Bytes already searched for a terminator.
    next_index: usize,
}

impl ReportLineCodec {
    /// A codec with no pending state.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for ReportLineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if self.skip_lf && !buf.is_empty() {
            if buf[0] == b'\n' {
                buf.advance(1);
            }
            self.skip_lf = false;
        }

        let terminator = buf[self.next_index..]
            .iter()
            .position(|b| *b == b'\n' || *b == b'\r');

        match terminator {
            Some(offset) => {
                let end = self.next_index + offset;
                self.next_index = 0;
                let line = buf.split_to(end);
                self.skip_lf = buf[0] == b'\r';
                buf.advance(1);
                Ok(Some(String::from_utf8_lossy(&line).into_owned()))
            }
            None => {
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if buf.is_empty() {
            return Ok(None);
        }
        let line = buf.split();
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }
}
