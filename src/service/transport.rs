//! Outbound half of the stdio transport.
use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Minimal async trait for writing already-encoded messages.
/// - `write` takes a complete line (terminator included) and sends it as is.
/// - `shutdown` closes the stream so the backend sees end-of-input.
#[async_trait]
pub trait MessageWriter: Send {
    async fn write(&mut self, line: &str) -> io::Result<()>;
    async fn shutdown(&mut self) -> io::Result<()>;
}

/// Writes messages to any async byte sink, typically the child's stdin.
pub struct StreamWriter<W> {
    inner: W,
}

impl<W> StreamWriter<W> {
    pub fn new(inner: W) -> Self {
        StreamWriter { inner }
    }
}

#[async_trait]
impl<W> MessageWriter for StreamWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, line: &str) -> io::Result<()> {
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.flush().await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn test_write_passes_line_through() {
        let (a, mut b) = duplex(1024);
        let mut writer = StreamWriter::new(a);

        let reader = tokio::spawn(async move {
            let mut received = String::new();
            b.read_to_string(&mut received).await.unwrap();
            received
        });

        writer
            .write("{\"id\":\"1\",\"method\":\"ping\"}\r\n")
            .await
            .expect("write failed");
        writer.shutdown().await.expect("shutdown failed");
        drop(writer);

        let received = reader.await.expect("reader task failed");
        assert_eq!(received, "{\"id\":\"1\",\"method\":\"ping\"}\r\n");
    }

    #[tokio::test]
    async fn test_write_after_peer_closed_fails() {
        let (a, b) = duplex(64);
        drop(b);
        let mut writer = StreamWriter::new(a);
        assert!(writer.write("x\r\n").await.is_err());
    }
}
