//! Log stream multiplexer.
//!
//! Drives a [`FramedRead`] backed by [`LogLineCodec`] over one child output
//! stream and forwards each line to an [`EventSink`]. stdout and stderr each
//! get their own task, so a chatty stream never holds up the other one.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, trace, warn};

use crate::models::event::{EventSink, LogLine, LogSource};
use crate::process::codec::LogLineCodec;

/// Relay every line of `stream` to `sink` until end of stream.
///
/// The stream is always read to the end, even when the sink is detached, so
/// the child never blocks on a full pipe. A read error ends the relay early
/// and is logged.
///
/// Returns the number of lines read.
pub async fn pipe_lines<R>(stream: R, source: LogSource, sink: EventSink) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut framed = FramedRead::new(stream, LogLineCodec::new());
    let mut count = 0;

    while let Some(item) = framed.next().await {
        match item {
            Ok(text) => {
                count += 1;
                trace!(%source, line = %text, "proxy output");
                sink.log(LogLine { source, text });
            }
            Err(err) => {
                warn!(%source, %err, "failed to read proxy output, stopping relay");
                break;
            }
        }
    }

    debug!(%source, lines = count, "proxy output stream closed");
    count
}

/// Run [`pipe_lines`] on its own task.
#[must_use]
pub fn spawn_pipe<R>(stream: R, source: LogSource, sink: EventSink) -> JoinHandle<usize>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(pipe_lines(stream, source, sink))
}
