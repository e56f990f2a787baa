use tokio_tungstenite::tungstenite;

/// Errors surfaced at the relay boundary.
///
/// Inbound decode faults are never errors (the frame queue simply ends);
/// only contract violations around the session lifecycle surface here.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The session never became ready within the attempt budget.
    #[error("session not established after {attempts} attempts")]
    NeverReady { attempts: u32 },

    /// The session is closed; no further sends are possible.
    #[error("session closed")]
    Closed,

    /// The underlying WebSocket transport failed mid-send.
    #[error("session transport error: {0}")]
    Transport(#[from] tungstenite::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
