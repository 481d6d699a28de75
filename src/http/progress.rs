//! Streaming body copy with throttled progress reporting.

use std::path::Path;
use std::time::{Duration, Instant};

use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::constants::STREAM_CHUNK_SIZE;
use super::error::TransportError;

/// Progress snapshot handed to a progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes written since the previous callback.
    pub since_last: u64,
    /// Bytes written so far in this transfer.
    pub total: u64,
    /// Body length declared by the server, when known.
    pub content_length: Option<u64>,
}

/// Progress callback accepted by the streaming read operations.
pub type ProgressFn<'a> = &'a mut (dyn FnMut(TransferProgress) + Send);

/// Batches byte counts so a callback fires at most once per interval.
#[derive(Debug)]
pub(crate) struct ProgressThrottle {
    interval: Duration,
    last_fired: Instant,
    unreported: u64,
    total: u64,
    content_length: Option<u64>,
}

impl ProgressThrottle {
    pub(crate) fn new(interval: Duration, content_length: Option<u64>) -> Self {
        Self::starting_at(interval, content_length, Instant::now())
    }

    fn starting_at(interval: Duration, content_length: Option<u64>, start: Instant) -> Self {
        Self {
            interval,
            last_fired: start,
            unreported: 0,
            total: 0,
            content_length,
        }
    }

    pub(crate) fn record(&mut self, bytes: u64) -> Option<TransferProgress> {
        self.record_at(bytes, Instant::now())
    }

    fn record_at(&mut self, bytes: u64, now: Instant) -> Option<TransferProgress> {
        self.total += bytes;
        self.unreported += bytes;
        if now.saturating_duration_since(self.last_fired) < self.interval {
            return None;
        }
        self.last_fired = now;
        self.take_report()
    }

    /// Reports whatever is still unreported at the end of the stream.
    pub(crate) fn finish(&mut self) -> Option<TransferProgress> {
        self.take_report()
    }

    pub(crate) fn total(&self) -> u64 {
        self.total
    }

    fn take_report(&mut self) -> Option<TransferProgress> {
        if self.unreported == 0 {
            return None;
        }
        let since_last = std::mem::take(&mut self.unreported);
        Some(TransferProgress {
            since_last,
            total: self.total,
            content_length: self.content_length,
        })
    }
}

/// Copies a body stream into `sink` in `STREAM_CHUNK_SIZE` slices.
///
/// The throttle is consulted after every slice; a final report is emitted
/// for trailing bytes once the stream ends. Returns the total bytes written.
pub(crate) async fn copy_stream<S, B, E, W>(
    stream: S,
    sink: &mut W,
    throttle: &mut ProgressThrottle,
    mut progress: Option<ProgressFn<'_>>,
    stream_error: impl Fn(E) -> TransportError,
    dest: Option<&Path>,
) -> Result<u64, TransportError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut stream = std::pin::pin!(stream);
    let write_error = |e: std::io::Error| TransportError::io(dest.map(Path::to_path_buf), e);

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(&stream_error)?;
        for slice in chunk.as_ref().chunks(STREAM_CHUNK_SIZE) {
            sink.write_all(slice).await.map_err(write_error)?;
            if let Some(update) = throttle.record(slice.len() as u64)
                && let Some(callback) = progress.as_deref_mut()
            {
                callback(update);
            }
        }
    }

    sink.flush().await.map_err(write_error)?;

    if let Some(update) = throttle.finish()
        && let Some(callback) = progress.as_deref_mut()
    {
        callback(update);
    }

    Ok(throttle.total())
}
