use bytes::{BufMut, BytesMut};

/// Frame header: stream type (1) + reserved (3) + payload size (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Largest payload size accepted by the classifier: 10 MiB.
pub const MAX_FRAME_PAYLOAD: usize = 10 * 1024 * 1024;

/// The channel a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    StdIn,
    StdOut,
    StdErr,
    /// Decode fallback for type bytes outside 0..=2. Never produced by the
    /// classifier success path and excluded from demuxed output.
    Unknown,
}

impl StreamKind {
    /// Map a wire type byte to a stream kind. 0/1/2 are the only valid codes.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => StreamKind::StdIn,
            1 => StreamKind::StdOut,
            2 => StreamKind::StdErr,
            _ => StreamKind::Unknown,
        }
    }

    /// The wire type byte for this kind. `Unknown` encodes as stdout,
    /// mirroring the decode fallback.
    pub fn type_byte(self) -> u8 {
        match self {
            StreamKind::StdIn => 0,
            StreamKind::StdOut => 1,
            StreamKind::StdErr => 2,
            StreamKind::Unknown => 1,
        }
    }
}

/// One decoded unit of a stdio stream.
///
/// `len` is the number of raw bytes consumed to build `text`, which can
/// differ from `text.chars().count()` for multi-byte UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The channel this frame belongs to.
    pub kind: StreamKind,
    /// Declared payload byte length.
    pub len: usize,
    /// Payload decoded as UTF-8 (lossy).
    pub text: String,
}

impl Frame {
    /// Build a frame from raw payload bytes.
    pub fn from_bytes(kind: StreamKind, payload: &[u8]) -> Self {
        Self {
            kind,
            len: payload.len(),
            text: String::from_utf8_lossy(payload).into_owned(),
        }
    }
}

/// How a logical stream is framed. Decided once from the first 8-byte
/// window and sticky for the remainder of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Length-prefixed frames with a channel tag.
    Multiplexed,
    /// TTY output: verbatim bytes, no headers, single channel.
    Raw,
}

impl StreamMode {
    /// Classify an 8-byte window as a frame header or raw data.
    ///
    /// `Multiplexed` requires all of: type byte in 0..=2, three zero
    /// reserved bytes, and a big-endian payload size in [1, 10 MiB].
    /// This is a heuristic, not a handshake — raw TTY bytes that happen
    /// to satisfy every rule will be misclassified.
    pub fn classify(window: &[u8; HEADER_SIZE]) -> Self {
        if window[0] > 2 {
            return StreamMode::Raw;
        }
        if window[1..4] != [0, 0, 0] {
            return StreamMode::Raw;
        }
        let size = payload_size(window);
        if size == 0 || size > MAX_FRAME_PAYLOAD {
            return StreamMode::Raw;
        }
        StreamMode::Multiplexed
    }
}

/// Read the declared payload size from a header window.
pub fn payload_size(window: &[u8; HEADER_SIZE]) -> usize {
    u32::from_be_bytes(window[4..8].try_into().expect("4-byte slice")) as usize
}

/// Decode-path channel mapping for a header type byte.
///
/// Unlike [`StreamKind::from_byte`], unexpected bytes fall back to stdout
/// rather than `Unknown` — decoded frames always land on a real channel.
pub fn demux_kind(byte: u8) -> StreamKind {
    match byte {
        0 => StreamKind::StdIn,
        2 => StreamKind::StdErr,
        _ => StreamKind::StdOut,
    }
}

/// Encode one multiplexed frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────────┬──────────────┬─────────────────┐
/// │ Type (1B)    │ Reserved (3B) │ Size (4B BE) │ Payload          │
/// │ 0/1/2        │ 0x00 00 00    │              │ (Size bytes)     │
/// └──────────────┴───────────────┴──────────────┴─────────────────┘
/// ```
pub fn encode_frame(kind: StreamKind, payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(kind.type_byte());
    dst.put_bytes(0, 3);
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
}
