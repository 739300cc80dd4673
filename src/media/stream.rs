use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::debug;

/// Capacity of the merged line channel between reader tasks and the consumer
pub const LINE_CHANNEL_CAPACITY: usize = 256;

/// Incremental splitter over raw encoder output.
///
/// ffmpeg redraws its status line with bare carriage returns, so `\r` ends a
/// line just like `\n`. Empty fragments (e.g. from `\r\n`) are dropped.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the lines it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if let Some(line) = self.take_pending() {
                    lines.push(line);
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Flush whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<String> {
        self.take_pending()
    }

    fn take_pending(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}

/// Read `reader` to the end, forwarding each line into `tx`.
///
/// Returns early when the receiving side has gone away.
pub async fn pump_lines<R>(mut reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::new();
    let mut buf = [0u8; 4096];

    loop {
        let read = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("Encoder output stream closed with error: {}", e);
                break;
            }
        };

        for line in splitter.push(&buf[..read]) {
            if tx.send(line).await.is_err() {
                return;
            }
        }
    }

    if let Some(line) = splitter.finish() {
        let _ = tx.send(line).await;
    }
}
