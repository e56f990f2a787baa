use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;

use stdcopy_frame::{
    demux_kind, demux_streams, payload_size, DemuxedStreams, Frame, StreamKind, StreamMode,
    DEFAULT_FANOUT_CAPACITY, HEADER_SIZE,
};

use crate::error::{RelayError, Result};

type WsSink<S> = SplitSink<WebSocketStream<S>, Message>;

/// Relay tuning knobs.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bounded inbound frame queue depth. A full queue suspends the
    /// inbound task, backpressuring the session.
    pub queue_capacity: usize,
    /// How many times a send polls for session readiness before giving up.
    pub ready_attempts: u32,
    /// Pause between readiness polls.
    pub ready_backoff: Duration,
    /// Broadcast depth for the split stdout/stderr view.
    pub fanout_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            ready_attempts: 50,
            ready_backoff: Duration::from_millis(100),
            fanout_capacity: DEFAULT_FANOUT_CAPACITY,
        }
    }
}

/// Bridges a message-oriented bidirectional session to the frame model.
///
/// One background task owns the inbound half: text messages become stdout
/// frames, binary messages go through the same header classification as
/// byte streams, and a close message ends the frame queue without error.
/// Outbound sends are independent of inbound delivery and may run
/// concurrently with it.
///
/// Lifecycle is `Connecting → Open → Closed`: sends poll with a bounded
/// budget while the session handle is not yet available, and fail with
/// [`RelayError::Closed`] once the session has ended.
pub struct DuplexRelay<S> {
    sink: Arc<Mutex<Option<WsSink<S>>>>,
    closed: Arc<AtomicBool>,
    frames: Option<mpsc::Receiver<Frame>>,
    inbound: JoinHandle<()>,
    config: RelayConfig,
}

impl<S> DuplexRelay<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Start a relay over a session that is still being established.
    ///
    /// The relay is Connecting until `connect` resolves; if it resolves to
    /// an error the relay goes straight to Closed.
    pub fn spawn<F>(connect: F, config: RelayConfig) -> Self
    where
        F: Future<Output = std::result::Result<WebSocketStream<S>, tungstenite::Error>>
            + Send
            + 'static,
    {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let sink = Arc::new(Mutex::new(None));
        let closed = Arc::new(AtomicBool::new(false));
        let inbound = tokio::spawn(inbound_loop(
            connect,
            Arc::clone(&sink),
            Arc::clone(&closed),
            tx,
        ));
        Self {
            sink,
            closed,
            frames: Some(rx),
            inbound,
            config,
        }
    }

    /// Wrap an already-established session.
    pub fn open(session: WebSocketStream<S>, config: RelayConfig) -> Self {
        Self::spawn(std::future::ready(Ok(session)), config)
    }

    /// Whether the session has ended (close handshake, read failure, or
    /// failed establishment).
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Send a text message, unframed.
    pub async fn send_text(&self, text: &str) -> Result<()> {
        self.send(Message::Text(text.to_string())).await
    }

    /// Send a binary message, unframed.
    pub async fn send_binary(&self, bytes: &[u8]) -> Result<()> {
        self.send(Message::Binary(bytes.to_vec())).await
    }

    async fn send(&self, message: Message) -> Result<()> {
        let mut message = Some(message);
        for _ in 0..self.config.ready_attempts {
            if self.is_closed() {
                return Err(RelayError::Closed);
            }
            {
                let mut slot = self.sink.lock().await;
                if let Some(sink) = slot.as_mut() {
                    let message = message.take().expect("send consumes the message once");
                    return sink.send(message).await.map_err(RelayError::from);
                }
            }
            tokio::time::sleep(self.config.ready_backoff).await;
        }
        Err(RelayError::NeverReady {
            attempts: self.config.ready_attempts,
        })
    }

    /// Next inbound frame. `None` once the session has ended and the
    /// queue is drained.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.frames.as_mut()?.recv().await
    }

    /// The demultiplexed stdout/stderr view over the shared inbound
    /// sequence, for callers that want both channels without racing a
    /// single-consumer queue.
    ///
    /// Consumes the inbound queue; returns `None` if it was already
    /// taken.
    pub fn split_output(&mut self) -> Option<DemuxedStreams> {
        let queue = self.frames.take()?;
        Some(demux_streams(queue, self.config.fanout_capacity))
    }

    /// Graceful close: best-effort close handshake (failures swallowed),
    /// then the inbound task is released. Frames already queued remain
    /// consumable.
    pub async fn close(&mut self) {
        self.closed.store(true, Ordering::Release);
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.send(Message::Close(None)).await;
        }
        self.inbound.abort();
    }
}

async fn inbound_loop<S, F>(
    connect: F,
    sink_slot: Arc<Mutex<Option<WsSink<S>>>>,
    closed: Arc<AtomicBool>,
    frames: mpsc::Sender<Frame>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: Future<Output = std::result::Result<WebSocketStream<S>, tungstenite::Error>> + Send,
{
    let session = match connect.await {
        Ok(session) => session,
        Err(err) => {
            tracing::warn!(%err, "session establishment failed");
            closed.store(true, Ordering::Release);
            return;
        }
    };
    let (sink, mut stream) = session.split();
    *sink_slot.lock().await = Some(sink);

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(%err, "session read failed, ending stream");
                break;
            }
        };
        let frame = match message {
            Message::Text(text) => Frame::from_bytes(StreamKind::StdOut, text.as_bytes()),
            Message::Binary(data) => match binary_frame(&data) {
                Some(frame) => frame,
                None => continue,
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
        };
        // Suspends when the queue is full; ends when the consumer is gone.
        if frames.send(frame).await.is_err() {
            break;
        }
    }
    closed.store(true, Ordering::Release);
}

/// Map one binary message to at most one frame.
///
/// Messages shorter than a header, or failing classification, pass
/// through whole as raw stdout. A multiplexed message shorter than its
/// declared payload is dropped, never partially emitted.
fn binary_frame(data: &[u8]) -> Option<Frame> {
    let Some(window) = data.get(..HEADER_SIZE) else {
        return Some(Frame::from_bytes(StreamKind::StdOut, data));
    };
    let window: [u8; HEADER_SIZE] = window.try_into().expect("8-byte slice");

    match StreamMode::classify(&window) {
        StreamMode::Raw => Some(Frame::from_bytes(StreamKind::StdOut, data)),
        StreamMode::Multiplexed => {
            let size = payload_size(&window);
            let Some(payload) = data.get(HEADER_SIZE..HEADER_SIZE + size) else {
                tracing::warn!(
                    declared = size,
                    actual = data.len() - HEADER_SIZE,
                    "truncated multiplexed message dropped"
                );
                return None;
            };
            Some(Frame::from_bytes(demux_kind(window[0]), payload))
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use stdcopy_frame::encode_frame;
    use tokio::io::DuplexStream;
    use tokio::time::timeout;

    use super::*;

    type TestSession = WebSocketStream<DuplexStream>;

    async fn session_pair() -> (TestSession, TestSession) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::join!(
            async {
                tokio_tungstenite::client_async("ws://localhost/", client)
                    .await
                    .expect("client handshake")
                    .0
            },
            async {
                tokio_tungstenite::accept_async(server)
                    .await
                    .expect("server handshake")
            }
        )
    }

    fn quick_config() -> RelayConfig {
        RelayConfig {
            ready_attempts: 5,
            ready_backoff: Duration::from_millis(5),
            ..RelayConfig::default()
        }
    }

    #[tokio::test]
    async fn text_message_becomes_stdout_frame() {
        let (client, mut server) = session_pair().await;
        let mut relay = DuplexRelay::open(client, quick_config());

        server.send(Message::Text("hello".into())).await.unwrap();

        let frame = relay.next_frame().await.unwrap();
        assert_eq!(frame.kind, StreamKind::StdOut);
        assert_eq!(frame.len, 5);
        assert_eq!(frame.text, "hello");
    }

    #[tokio::test]
    async fn multiplexed_binary_message_is_decoded() {
        let (client, mut server) = session_pair().await;
        let mut relay = DuplexRelay::open(client, quick_config());

        let mut wire = BytesMut::new();
        encode_frame(StreamKind::StdErr, b"oops", &mut wire);
        server.send(Message::Binary(wire.to_vec())).await.unwrap();

        let frame = relay.next_frame().await.unwrap();
        assert_eq!(frame.kind, StreamKind::StdErr);
        assert_eq!(frame.text, "oops");
    }

    #[tokio::test]
    async fn raw_binary_message_passes_through_whole() {
        let (client, mut server) = session_pair().await;
        let mut relay = DuplexRelay::open(client, quick_config());

        server
            .send(Message::Binary(b"just bytes".to_vec()))
            .await
            .unwrap();

        let frame = relay.next_frame().await.unwrap();
        assert_eq!(frame.kind, StreamKind::StdOut);
        assert_eq!(frame.text, "just bytes");
    }

    #[tokio::test]
    async fn short_binary_message_is_raw() {
        let (client, mut server) = session_pair().await;
        let mut relay = DuplexRelay::open(client, quick_config());

        server.send(Message::Binary(b"tiny".to_vec())).await.unwrap();

        let frame = relay.next_frame().await.unwrap();
        assert_eq!(frame.text, "tiny");
        assert_eq!(frame.len, 4);
    }

    #[tokio::test]
    async fn truncated_multiplexed_message_is_dropped() {
        let (client, mut server) = session_pair().await;
        let mut relay = DuplexRelay::open(client, quick_config());

        // declares 10 payload bytes, carries 4
        let mut wire = vec![1u8, 0, 0, 0, 0, 0, 0, 10];
        wire.extend_from_slice(b"shrt");
        server.send(Message::Binary(wire)).await.unwrap();
        server.send(Message::Text("after".into())).await.unwrap();

        let frame = relay.next_frame().await.unwrap();
        assert_eq!(frame.text, "after");
    }

    #[tokio::test]
    async fn outbound_sends_reach_the_session() {
        let (client, mut server) = session_pair().await;
        let relay = DuplexRelay::open(client, quick_config());

        relay.send_text("stdin line\n").await.unwrap();
        relay.send_binary(&[0xDE, 0xAD]).await.unwrap();

        match server.next().await.unwrap().unwrap() {
            Message::Text(text) => assert_eq!(text, "stdin line\n"),
            other => panic!("expected text, got {other:?}"),
        }
        match server.next().await.unwrap().unwrap() {
            Message::Binary(data) => assert_eq!(data, vec![0xDE, 0xAD]),
            other => panic!("expected binary, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn remote_close_ends_the_queue_without_error() {
        let (client, mut server) = session_pair().await;
        let mut relay = DuplexRelay::open(client, quick_config());

        server.send(Message::Text("last".into())).await.unwrap();
        server.close(None).await.unwrap();

        assert_eq!(relay.next_frame().await.unwrap().text, "last");
        assert!(relay.next_frame().await.is_none());
        assert!(relay.is_closed());

        let err = relay.send_text("too late").await.unwrap_err();
        assert!(matches!(err, RelayError::Closed));
    }

    #[tokio::test]
    async fn local_close_is_graceful_and_final() {
        let (client, mut server) = session_pair().await;
        let mut relay = DuplexRelay::open(client, quick_config());

        relay.send_text("before close").await.unwrap();
        relay.close().await;

        let err = relay.send_text("after close").await.unwrap_err();
        assert!(matches!(err, RelayError::Closed));

        // the peer observes the close handshake
        match server.next().await.unwrap().unwrap() {
            Message::Text(_) => {}
            other => panic!("expected text, got {other:?}"),
        }
        assert!(matches!(
            server.next().await.unwrap().unwrap(),
            Message::Close(_)
        ));
    }

    #[tokio::test]
    async fn buffered_frames_survive_close() {
        let (client, mut server) = session_pair().await;
        let mut relay = DuplexRelay::open(client, quick_config());

        server.send(Message::Text("queued".into())).await.unwrap();
        // let the inbound task enqueue it before tearing down
        tokio::time::sleep(Duration::from_millis(100)).await;
        relay.close().await;

        assert_eq!(relay.next_frame().await.unwrap().text, "queued");
        assert!(relay.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn never_ready_session_fails_sends_within_budget() {
        let relay = DuplexRelay::<DuplexStream>::spawn(
            std::future::pending::<std::result::Result<TestSession, tungstenite::Error>>(),
            quick_config(),
        );

        let err = timeout(Duration::from_secs(1), relay.send_text("hi"))
            .await
            .expect("bounded budget")
            .unwrap_err();
        assert!(matches!(err, RelayError::NeverReady { attempts: 5 }));
    }

    #[tokio::test]
    async fn failed_establishment_closes_the_relay() {
        let mut relay = DuplexRelay::<DuplexStream>::spawn(
            async { Err(tungstenite::Error::ConnectionClosed) },
            quick_config(),
        );

        assert!(relay.next_frame().await.is_none());
        assert!(relay.is_closed());
        assert!(relay.send_text("nope").await.is_err());
    }

    #[tokio::test]
    async fn split_output_demuxes_the_inbound_sequence() {
        let (client, mut server) = session_pair().await;
        let mut relay = DuplexRelay::open(client, quick_config());

        let mut out = BytesMut::new();
        encode_frame(StreamKind::StdOut, b"result", &mut out);
        server.send(Message::Binary(out.to_vec())).await.unwrap();

        let mut err_wire = BytesMut::new();
        encode_frame(StreamKind::StdErr, b"warning", &mut err_wire);
        server
            .send(Message::Binary(err_wire.to_vec()))
            .await
            .unwrap();
        server.close(None).await.unwrap();

        let mut demux = relay.split_output().expect("first take");
        assert!(relay.split_output().is_none());

        assert_eq!(demux.stdout.next().await.unwrap().text, "result");
        assert!(demux.stdout.next().await.is_none());
        assert_eq!(demux.stderr.next().await.unwrap().text, "warning");
        assert!(demux.stderr.next().await.is_none());
    }
}
