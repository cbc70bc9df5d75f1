//! Where relayed lines end up.

// External crates
use std::future::Future;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::mpsc;

/// Destination for relayed log lines.
///
/// Lines arrive without their terminator, one call per line, in receipt
/// order. Implementations must not hold a line back: it should be visible to
/// the reader of the sink once the returned future completes.
pub trait LineSink: Send + 'static {
    /// Deliver one line.
    fn write_line(&mut self, line: &str) -> impl Future<Output = io::Result<()>> + Send;
}

/// Writes each line, newline terminated, to an async writer and flushes it.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    /// Wrap `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Give back the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: AsyncWrite + Unpin + Send + 'static> LineSink for WriterSink<W> {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        self.writer.write_all(&buf).await?;
        self.writer.flush().await
    }
}

/// The process's standard output.
pub type StdoutSink = WriterSink<Stdout>;

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new(tokio::io::stdout())
    }
}

/// Forwards lines over a channel, used when another task consumes the output.
impl LineSink for mpsc::UnboundedSender<String> {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.send(line.to_string())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "line receiver dropped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writer_sink_appends_terminator() {
        let mut sink = WriterSink::new(Vec::new());
        sink.write_line("hello").await.unwrap();
        sink.write_line("").await.unwrap();
        sink.write_line("world").await.unwrap();
        assert_eq!(sink.into_inner(), b"hello\n\nworld\n");
    }

    #[tokio::test]
    async fn channel_sink_reports_dropped_receiver() {
        let (mut tx, rx) = mpsc::unbounded_channel::<String>();
        tx.write_line("one").await.unwrap();
        drop(rx);
        let err = tx.write_line("two").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
