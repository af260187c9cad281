//! TCP transport client.
//!
//! Each client owns at most one connection to its endpoint, established
//! lazily on the first send and re-established after the previous one broke.
//! Frames are length-delimited `MsgPack` [`TransportMessage`]s; a reader task
//! routes each `RESULT` frame to the caller waiting on the same id, so
//! concurrent calls share the connection.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use courier_core::{decode_frame, encode_frame, Endpoint, InvokeMessage, ResultMessage, TransportMessage};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::traits::TransportClient;

/// Callers waiting for a response, by message id.
type PendingMap = DashMap<u64, oneshot::Sender<ResultMessage>>;

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// One established connection and its reader task.
struct Connection {
    writer: Mutex<FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>>,
    pending: Arc<PendingMap>,
    /// Cancelled once the connection is unusable.
    closed: CancellationToken,
    reader: JoinHandle<()>,
}

impl Connection {
    async fn open(endpoint: &Endpoint, config: &TransportConfig) -> Result<Self, TransportError> {
        let connect = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
        let stream = match tokio::time::timeout(config.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(TransportError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                })
            }
            Err(_elapsed) => {
                return Err(TransportError::Connect {
                    endpoint: endpoint.to_string(),
                    source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                })
            }
        };
        if let Err(err) = stream.set_nodelay(true) {
            debug!(%endpoint, error = %err, "failed to set TCP_NODELAY");
        }

        let codec = || {
            LengthDelimitedCodec::builder()
                .max_frame_length(config.max_frame_length)
                .new_codec()
        };
        let (read_half, write_half) = stream.into_split();
        let pending = Arc::new(PendingMap::new());
        let closed = CancellationToken::new();

        let reader = tokio::spawn(read_loop(
            FramedRead::new(read_half, codec()),
            Arc::clone(&pending),
            closed.clone(),
            endpoint.clone(),
        ));

        debug!(%endpoint, "connection established");
        Ok(Self {
            writer: Mutex::new(FramedWrite::new(write_half, codec())),
            pending,
            closed,
            reader,
        })
    }

    fn is_open(&self) -> bool {
        !self.closed.is_cancelled()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.closed.cancel();
        self.reader.abort();
    }
}

/// Routes response frames to waiting callers until the connection ends.
async fn read_loop(
    mut frames: FramedRead<OwnedReadHalf, LengthDelimitedCodec>,
    pending: Arc<PendingMap>,
    closed: CancellationToken,
    endpoint: Endpoint,
) {
    while let Some(frame) = frames.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%endpoint, error = %err, "connection read failed");
                break;
            }
        };
        match decode_frame(&frame) {
            Ok(TransportMessage::Result { id, payload }) => match pending.remove(&id) {
                // The receiver may already be gone if the caller stopped waiting.
                Some((_, tx)) => {
                    let _ = tx.send(payload);
                }
                None => debug!(%endpoint, id, "response for unknown or abandoned call"),
            },
            Ok(other) => warn!(%endpoint, kind = other.kind(), "unexpected frame from server"),
            Err(err) => {
                // The id of the call this frame answered is unknown, so the
                // connection cannot be trusted any more.
                warn!(%endpoint, error = %err, "undecodable frame, closing connection");
                break;
            }
        }
    }

    debug!(%endpoint, pending = pending.len(), "connection closed");
    closed.cancel();
    // Dropping the senders wakes every waiter with a closed-connection error.
    pending.clear();
}

/// Removes a pending entry when the waiting call finishes or is dropped.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

// ---------------------------------------------------------------------------
// TcpTransportClient
// ---------------------------------------------------------------------------

/// [`TransportClient`] speaking length-delimited `MsgPack` over TCP.
pub struct TcpTransportClient {
    endpoint: Endpoint,
    config: TransportConfig,
    next_id: AtomicU64,
    connection: Mutex<Option<Arc<Connection>>>,
}

impl TcpTransportClient {
    #[must_use]
    pub fn new(endpoint: Endpoint, config: TransportConfig) -> Self {
        Self {
            endpoint,
            config,
            next_id: AtomicU64::new(1),
            connection: Mutex::new(None),
        }
    }

    /// The endpoint this client talks to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// `true` while an open connection is held.
    pub async fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(|conn| conn.is_open())
    }

    /// Returns the open connection, connecting first if there is none.
    async fn connection(&self) -> Result<Arc<Connection>, TransportError> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref().filter(|conn| conn.is_open()) {
            return Ok(Arc::clone(conn));
        }
        let conn = Arc::new(Connection::open(&self.endpoint, &self.config).await?);
        *slot = Some(Arc::clone(&conn));
        Ok(conn)
    }

    fn closed_error(&self) -> TransportError {
        TransportError::ConnectionClosed {
            endpoint: self.endpoint.to_string(),
        }
    }
}

#[async_trait]
impl TransportClient for TcpTransportClient {
    async fn send(
        &self,
        message: InvokeMessage,
        cancel: &CancellationToken,
    ) -> Result<ResultMessage, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame: Bytes = encode_frame(&TransportMessage::Invoke {
            id,
            payload: message,
        })?;
        if frame.len() > self.config.max_frame_length {
            return Err(TransportError::Protocol(format!(
                "frame of {} bytes exceeds limit of {} bytes",
                frame.len(),
                self.config.max_frame_length
            )));
        }

        let conn = self.connection().await?;

        let (tx, rx) = oneshot::channel();
        conn.pending.insert(id, tx);
        let _guard = PendingGuard {
            pending: conn.pending.as_ref(),
            id,
        };

        if let Err(source) = conn.writer.lock().await.send(frame).await {
            conn.closed.cancel();
            return Err(TransportError::Io {
                endpoint: self.endpoint.to_string(),
                source,
            });
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TransportError::Cancelled),
            response = rx => response.map_err(|_| self.closed_error()),
            () = conn.closed.cancelled() => Err(self.closed_error()),
        }?;

        if result.is_success() {
            Ok(result)
        } else {
            Err(TransportError::Remote {
                status_code: result.status_code,
                message: result.exception_message.unwrap_or_default(),
            })
        }
    }
}

impl std::fmt::Debug for TcpTransportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransportClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use courier_core::Parameters;
    use rmpv::Value;
    use tokio::net::TcpListener;
    use tokio_util::codec::Framed;

    use super::*;
    use crate::error::FaultKind;

    /// Loopback server. Behaviour is chosen by the call's service id:
    /// `echo-token` returns the message token, `echo-n` returns parameter `n`,
    /// `fail` returns a remote failure, `slow` never answers, `drop` closes
    /// the connection, `garbage` answers with an undecodable frame.
    async fn spawn_server() -> Endpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_connection(stream));
            }
        });
        Endpoint::new("127.0.0.1", port)
    }

    async fn serve_connection(stream: TcpStream) {
        let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
        while let Some(Ok(frame)) = framed.next().await {
            let Ok(TransportMessage::Invoke { id, payload }) = decode_frame(&frame) else {
                continue;
            };
            let reply = match payload.service_id.as_str() {
                "echo-token" => ResultMessage::ok(payload.token.unwrap_or_default()),
                "echo-n" => ResultMessage::ok(
                    payload.parameters.get("n").cloned().unwrap_or(Value::Nil),
                ),
                "fail" => ResultMessage::failure(500, "boom"),
                "slow" => continue,
                "drop" => return,
                "garbage" => {
                    if framed.send(Bytes::from_static(&[0xc1, 0x00])).await.is_err() {
                        return;
                    }
                    continue;
                }
                _ => ResultMessage::failure(404, "unknown service"),
            };
            let frame = encode_frame(&TransportMessage::Result { id, payload: reply }).unwrap();
            if framed.send(frame).await.is_err() {
                return;
            }
        }
    }

    fn client(endpoint: Endpoint) -> TcpTransportClient {
        TcpTransportClient::new(
            endpoint,
            TransportConfig {
                connect_timeout: Duration::from_secs(2),
                ..TransportConfig::default()
            },
        )
    }

    fn message(service_id: &str) -> InvokeMessage {
        InvokeMessage::new(service_id, Parameters::new())
    }

    #[tokio::test]
    async fn round_trip_returns_result() {
        let client = client(spawn_server().await);
        let msg = message("echo-token").with_token(Some("abc".to_string()));

        let result = client.send(msg, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.result, Value::from("abc"));
        assert!(client.is_connected().await);
    }

    #[tokio::test]
    async fn remote_failure_is_not_a_communication_fault() {
        let client = client(spawn_server().await);

        let err = client
            .send(message("fail"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Remote { status_code: 500, .. }));
        assert_eq!(err.kind(), FaultKind::Other);
    }

    #[tokio::test]
    async fn refused_connection_is_a_communication_fault() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = client(Endpoint::new("127.0.0.1", port));

        let err = client
            .send(message("echo-token"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Connect { .. }));
        assert!(err.is_communication());
    }

    #[tokio::test]
    async fn closed_connection_fails_call_and_next_call_reconnects() {
        let client = client(spawn_server().await);

        let err = client
            .send(message("drop"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed { .. }));
        assert!(err.is_communication());

        let result = client
            .send(
                message("echo-token").with_token(Some("again".to_string())),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.result, Value::from("again"));
    }

    #[tokio::test]
    async fn undecodable_reply_fails_call_and_next_call_reconnects() {
        let client = client(spawn_server().await);

        let err = tokio::time::timeout(
            Duration::from_secs(2),
            client.send(message("garbage"), &CancellationToken::new()),
        )
        .await
        .expect("call must fail instead of waiting forever")
        .unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed { .. }));
        assert!(!client.is_connected().await);

        let result = client
            .send(
                message("echo-token").with_token(Some("fresh".to_string())),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.result, Value::from("fresh"));
    }

    #[tokio::test]
    async fn concurrent_calls_receive_their_own_responses() {
        let client = Arc::new(client(spawn_server().await));

        let handles: Vec<_> = (0..16)
            .map(|n| {
                let client = Arc::clone(&client);
                tokio::spawn(async move {
                    let msg = message("echo-n").with_parameter("n", n);
                    (n, client.send(msg, &CancellationToken::new()).await)
                })
            })
            .collect();

        for handle in handles {
            let (n, result) = handle.await.unwrap();
            assert_eq!(result.unwrap().result, Value::from(n));
        }
    }

    #[tokio::test]
    async fn cancellation_releases_pending_call() {
        let client = client(spawn_server().await);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = client.send(message("slow"), &cancel).await.unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));

        let conn = client.connection().await.unwrap();
        assert!(conn.pending.is_empty());
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_before_connecting() {
        let client = TcpTransportClient::new(
            Endpoint::new("127.0.0.1", 1),
            TransportConfig {
                max_frame_length: 8,
                ..TransportConfig::default()
            },
        );

        let err = client
            .send(message("echo-token"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Protocol(_)));
        assert!(!client.is_connected().await);
    }
}
