//! Multiplexed stdio stream detection, decoding and demultiplexing.
//!
//! This is the core value-add layer of stdcopy. Attach and log endpoints
//! deliver one ordered byte stream that is either raw TTY output or a
//! sequence of length-prefixed frames:
//! - A 1-byte stream type (0=stdin, 1=stdout, 2=stderr)
//! - 3 reserved zero bytes
//! - A 4-byte big-endian payload size
//!
//! The mode is decided once from the first 8-byte window and is sticky for
//! the remainder of the stream. Decoding is best-effort: a short read ends
//! the stream, it is never surfaced as an error.

pub mod codec;
pub mod decoder;
pub mod demux;

pub use codec::{
    demux_kind, encode_frame, payload_size, Frame, StreamKind, StreamMode, HEADER_SIZE,
    MAX_FRAME_PAYLOAD,
};
pub use decoder::{FrameDecoder, RAW_CHUNK_SIZE};
pub use demux::{
    collect_combined, collect_split, demux_streams, DemuxedOutput, DemuxedStreams, FrameSource,
    FrameSubscription, DEFAULT_FANOUT_CAPACITY,
};
