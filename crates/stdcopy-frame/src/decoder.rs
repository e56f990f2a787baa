use tokio::io::{AsyncRead, AsyncReadExt};

use crate::codec::{demux_kind, payload_size, Frame, StreamKind, StreamMode, HEADER_SIZE};

/// Chunk size for raw (TTY) streams.
pub const RAW_CHUNK_SIZE: usize = 8 * 1024;

/// Extracts frames from a byte stream, one pass, never rewinding.
///
/// The stream mode is decided from the first 8-byte window and stays fixed
/// for the remainder of the source. End of stream — including short reads
/// at a header or payload boundary — terminates decoding silently:
/// [`next_frame`](Self::next_frame) returns `None` and never surfaces an
/// I/O fault. Frames already produced remain valid.
pub struct FrameDecoder<R> {
    src: R,
    mode: Option<StreamMode>,
    done: bool,
}

impl<R: AsyncRead + Unpin> FrameDecoder<R> {
    /// Create a decoder that infers the stream mode from the first window.
    pub fn new(src: R) -> Self {
        Self {
            src,
            mode: None,
            done: false,
        }
    }

    /// Create a decoder with a known mode, skipping inference.
    ///
    /// Callers that already know whether the remote end allocated a TTY
    /// can thread that decision in explicitly instead of re-inferring it
    /// from payload bytes.
    pub fn with_mode(src: R, mode: StreamMode) -> Self {
        Self {
            src,
            mode: Some(mode),
            done: false,
        }
    }

    /// The mode this stream was classified as, once known.
    pub fn mode(&self) -> Option<StreamMode> {
        self.mode
    }

    /// Consume the decoder and return the underlying source.
    pub fn into_inner(self) -> R {
        self.src
    }

    /// Read the next frame. `None` means the source is exhausted (or
    /// failed); subsequent calls keep returning `None`.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        if self.done {
            return None;
        }
        match self.mode {
            None => self.first_frame().await,
            Some(StreamMode::Raw) => self.next_raw_chunk().await,
            Some(StreamMode::Multiplexed) => self.next_multiplexed().await,
        }
    }

    async fn first_frame(&mut self) -> Option<Frame> {
        let mut window = [0u8; HEADER_SIZE];
        if self.src.read_exact(&mut window).await.is_err() {
            self.done = true;
            return None;
        }

        let mode = StreamMode::classify(&window);
        tracing::debug!(?mode, "stream mode classified");
        self.mode = Some(mode);

        match mode {
            // The window bytes are payload, not a header.
            StreamMode::Raw => Some(Frame::from_bytes(StreamKind::StdOut, &window)),
            StreamMode::Multiplexed => self.read_payload(&window).await,
        }
    }

    async fn next_multiplexed(&mut self) -> Option<Frame> {
        loop {
            let mut window = [0u8; HEADER_SIZE];
            if self.src.read_exact(&mut window).await.is_err() {
                self.done = true;
                return None;
            }
            // Mode is sticky: the declared size is honored without
            // re-running the classifier. Zero-size headers are valid
            // no-ops, skipped without emission.
            if payload_size(&window) == 0 {
                continue;
            }
            return self.read_payload(&window).await;
        }
    }

    async fn read_payload(&mut self, window: &[u8; HEADER_SIZE]) -> Option<Frame> {
        let size = payload_size(window);
        let mut payload = Vec::new();
        let read = (&mut self.src)
            .take(size as u64)
            .read_to_end(&mut payload)
            .await;
        if read.is_err() || payload.len() < size {
            // Source ended inside the payload: no partial frame.
            self.done = true;
            return None;
        }

        Some(Frame::from_bytes(demux_kind(window[0]), &payload))
    }

    async fn next_raw_chunk(&mut self) -> Option<Frame> {
        let mut chunk = [0u8; RAW_CHUNK_SIZE];
        match self.src.read(&mut chunk).await {
            Ok(0) | Err(_) => {
                self.done = true;
                None
            }
            Ok(n) => Some(Frame::from_bytes(StreamKind::StdOut, &chunk[..n])),
        }
    }
}
