use std::future::Future;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::codec::{Frame, StreamKind};
use crate::decoder::FrameDecoder;

/// Broadcast buffer depth for the split view.
pub const DEFAULT_FANOUT_CAPACITY: usize = 256;

/// Anything that yields frames in order: a [`FrameDecoder`] over a byte
/// source, or a relay's inbound queue.
pub trait FrameSource: Send {
    /// Next frame, or `None` when the source is exhausted.
    fn next_frame(&mut self) -> impl Future<Output = Option<Frame>> + Send;
}

impl<R: AsyncRead + Unpin + Send> FrameSource for FrameDecoder<R> {
    fn next_frame(&mut self) -> impl Future<Output = Option<Frame>> + Send {
        FrameDecoder::next_frame(self)
    }
}

impl FrameSource for mpsc::Receiver<Frame> {
    fn next_frame(&mut self) -> impl Future<Output = Option<Frame>> + Send {
        self.recv()
    }
}

/// Accumulate every frame's text into one string, in arrival order,
/// returning once the source is exhausted.
pub async fn collect_combined<S: FrameSource>(mut source: S) -> String {
    let mut out = String::new();
    while let Some(frame) = source.next_frame().await {
        out.push_str(&frame.text);
    }
    out
}

/// Output of [`collect_split`]: one string per demuxed channel.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DemuxedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Accumulate stdout and stderr separately, discarding frames of any
/// other kind, returning once the source is exhausted.
pub async fn collect_split<S: FrameSource>(mut source: S) -> DemuxedOutput {
    let mut out = DemuxedOutput::default();
    while let Some(frame) = source.next_frame().await {
        match frame.kind {
            StreamKind::StdOut => out.stdout.push_str(&frame.text),
            StreamKind::StdErr => out.stderr.push_str(&frame.text),
            _ => {}
        }
    }
    out
}

/// A filtered cursor over the shared frame broadcast.
///
/// Frames not matching the filter are dropped from this cursor's
/// perspective, never buffered for replay. Dropping the subscription
/// releases its share of the underlying read loop.
pub struct FrameSubscription {
    rx: broadcast::Receiver<Frame>,
    filter: Option<StreamKind>,
    _guard: Arc<DropGuard>,
}

impl FrameSubscription {
    /// Next matching frame, or `None` once the producer has finished and
    /// all buffered frames are drained.
    pub async fn next(&mut self) -> Option<Frame> {
        loop {
            match self.rx.recv().await {
                Ok(frame) => {
                    if self.filter.is_none_or(|kind| frame.kind == kind) {
                        return Some(frame);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "subscriber lagging, frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// The split (stdout/stderr) view over one shared decode pass.
pub struct DemuxedStreams {
    pub stdout: FrameSubscription,
    pub stderr: FrameSubscription,
    /// The background task driving the shared read loop. Dropping it
    /// detaches; aborting it force-stops the fan-out.
    pub driver: JoinHandle<()>,
}

/// Fan one frame source out into independent stdout and stderr
/// sequences.
///
/// Exactly one read loop runs regardless of consumer count; both
/// subscriptions observe the underlying frames in arrival order. The loop
/// stops when the source ends, when no live subscription remains, or when
/// the last subscription is dropped while the source is idle — an
/// abandoned split view can never leak the upstream read.
pub fn demux_streams<S>(mut source: S, capacity: usize) -> DemuxedStreams
where
    S: FrameSource + 'static,
{
    let (tx, rx_out) = broadcast::channel(capacity);
    let rx_err = tx.subscribe();
    let token = CancellationToken::new();
    let guard = Arc::new(token.clone().drop_guard());

    let driver = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                frame = source.next_frame() => match frame {
                    Some(frame) => {
                        // No receivers left: tear the loop down.
                        if tx.send(frame).is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    });

    DemuxedStreams {
        stdout: FrameSubscription {
            rx: rx_out,
            filter: Some(StreamKind::StdOut),
            _guard: Arc::clone(&guard),
        },
        stderr: FrameSubscription {
            rx: rx_err,
            filter: Some(StreamKind::StdErr),
            _guard: guard,
        },
        driver,
    }
}
