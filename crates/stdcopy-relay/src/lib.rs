//! Bidirectional WebSocket relay onto the multiplexed frame model.
//!
//! Attach endpoints can speak a message-oriented duplex protocol instead
//! of one raw byte stream. The relay consumes inbound messages on a
//! dedicated task — applying the same 8-byte header classification to
//! binary messages that byte streams get — and exposes independent
//! outbound text/binary sends. The transport handle has exactly one
//! reader (the inbound task) and one writer-closer (the relay).

pub mod error;
pub mod relay;

pub use error::{RelayError, Result};
pub use relay::{DuplexRelay, RelayConfig};
