//! stdcopy: stream framing and archive codecs for container stdio
//! endpoints.
//!
//! Attach/log transports hand this crate an ordered byte stream (or a
//! message-oriented duplex session); it hands back typed frames,
//! demultiplexed per channel. Filesystem copy endpoints exchange TAR
//! blobs built and unpacked here. Everything else — HTTP, JSON models,
//! transport selection — is a collaborator, not a concern of this crate.

pub use stdcopy_frame::{
    collect_combined, collect_split, demux_kind, demux_streams, encode_frame, payload_size,
    DemuxedOutput, DemuxedStreams, Frame, FrameDecoder, FrameSource, FrameSubscription,
    StreamKind, StreamMode, DEFAULT_FANOUT_CAPACITY, HEADER_SIZE, MAX_FRAME_PAYLOAD,
    RAW_CHUNK_SIZE,
};

pub use stdcopy_relay::{DuplexRelay, RelayConfig, RelayError};

pub use stdcopy_tar as tar;
