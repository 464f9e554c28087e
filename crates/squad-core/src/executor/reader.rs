//! Background tasks that drain a child's output pipes into a bounded queue.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the per-execution line queue.
pub const QUEUE_CAPACITY: usize = 256;

/// One item on the line queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderMessage {
    /// One output line, without its terminator. Invalid UTF-8 is replaced.
    Line(String),
    /// The source pipe reached end of stream.
    Closed,
}

/// Forward every line of `source` into `tx`, then push [`ReaderMessage::Closed`].
///
/// The task stops early if the receiving side is dropped.
pub fn spawn_line_reader<R>(source: R, tx: mpsc::Sender<ReaderMessage>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(source);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\n', '\r'])
                        .to_string();
                    if tx.send(ReaderMessage::Line(line)).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "error reading agent CLI output");
                    break;
                }
            }
        }
        let _ = tx.send(ReaderMessage::Closed).await;
    })
}
