//! Persistent niri event stream connection
//!
//! `NiriEventStream` owns the single long-lived connection to niri's socket.
//!
//! ## Protocol
//!
//! 1. Connect to the niri socket
//! 2. Send `"Workspaces"` for an initial snapshot
//! 3. Send `"EventStream"` to switch the connection to event mode
//! 4. Read one JSON value per line: the snapshot reply, the `Ok(Handled)`
//!    acknowledgement, then events until the connection closes
//!
//! Lines are read as raw bytes. One that is not valid UTF-8 is logged and
//! skipped like any other undecodable message; it does not drop the
//! connection.
//!
//! ## Reconnection
//!
//! Any connect, write or read failure (EOF included) drops the connection and
//! arms a single reconnect timer with a fixed delay. Arming it again replaces
//! the pending timer. There is no retry limit: niri restarts are expected
//! and the bar should pick the compositor back up whenever it returns.
//!
//! The stream never reconnects on its own. `recv()` reports
//! `StreamEvent::ReconnectDue` when the timer fires and the owner calls
//! `connect()`, which keeps all I/O inside one cooperative loop.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::{sleep, Sleep};
use tokio_stream::wrappers::SplitStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use super::client::{get_socket_path, resolve_socket_path, write_request, NiriClient};
use super::error::NiriError;

/// What the event stream produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One line received from niri, without its trailing newline
    Line(String),

    /// The connection was lost; a reconnect has been scheduled
    Disconnected,

    /// The reconnect delay has elapsed and `connect()` should be called
    ReconnectDue,
}

#[derive(Debug)]
struct Connection {
    // Raw newline-delimited segments; UTF-8 is checked per line
    segments: SplitStream<BufReader<OwnedReadHalf>>,
    // Held so the socket stays open for writing until the connection drops
    _writer: OwnedWriteHalf,
    socket_path: PathBuf,
}

/// The long-lived event stream connection to niri
///
/// # Example
///
/// ```ignore
/// let mut stream = NiriEventStream::new(None, Duration::from_secs(2));
/// let _ = stream.connect().await;
/// loop {
///     match stream.recv().await {
///         StreamEvent::Line(line) => handle(&line),
///         StreamEvent::Disconnected => {}
///         StreamEvent::ReconnectDue => {
///             let _ = stream.connect().await;
///         }
///     }
/// }
/// ```
#[derive(Debug)]
pub struct NiriEventStream {
    socket_override: Option<PathBuf>,
    reconnect_delay: Duration,
    connection: Option<Connection>,
    reconnect: Option<Pin<Box<Sleep>>>,
    shut_down: bool,
}

impl NiriEventStream {
    /// Create a disconnected stream
    ///
    /// `socket_override` takes precedence over the environment when the
    /// socket path is resolved, which happens again on every connect.
    pub fn new(socket_override: Option<PathBuf>, reconnect_delay: Duration) -> Self {
        Self {
            socket_override,
            reconnect_delay,
            connection: None,
            reconnect: None,
            shut_down: false,
        }
    }

    /// Whether a connection is currently open
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Whether a reconnect timer is armed
    pub fn is_reconnect_scheduled(&self) -> bool {
        self.reconnect.is_some()
    }

    /// The socket path a connect attempt would use right now
    pub fn socket_path(&self) -> PathBuf {
        resolve_socket_path(self.socket_override.as_deref())
    }

    /// Connect to niri and request the snapshot and the event stream
    ///
    /// Clears any pending reconnect timer first. On failure the connection
    /// stays closed and a new reconnect is scheduled before the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns `NiriError::SocketNotFound`, `NiriError::ConnectionFailed` or
    /// `NiriError::SendFailed`.
    pub async fn connect(&mut self) -> Result<(), NiriError> {
        if self.shut_down {
            debug!("Ignoring connect request after shutdown");
            return Ok(());
        }

        self.reconnect = None;
        self.connection = None;

        match self.open().await {
            Ok(connection) => {
                info!(
                    path = %connection.socket_path.display(),
                    "Connected to niri event stream"
                );
                self.connection = Some(connection);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to connect to niri IPC");
                self.schedule_reconnect();
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<Connection, NiriError> {
        let socket_path = get_socket_path(self.socket_override.as_deref())?;

        let socket = UnixStream::connect(&socket_path)
            .await
            .map_err(|e| NiriError::ConnectionFailed {
                path: socket_path.clone(),
                source: e,
            })?;

        let (read_half, mut writer) = socket.into_split();

        write_request(&mut writer, &niri_ipc::Request::Workspaces).await?;
        write_request(&mut writer, &niri_ipc::Request::EventStream).await?;

        Ok(Connection {
            segments: SplitStream::new(BufReader::new(read_half).split(b'\n')),
            _writer: writer,
            socket_path,
        })
    }

    /// Wait for the next thing that happens on the stream
    ///
    /// Cancel-safe, so it can sit in a `tokio::select!` next to other
    /// sources. With no connection and no pending timer (after `shutdown()`,
    /// or after `ReconnectDue` was returned and `connect()` not yet called)
    /// this never resolves.
    pub async fn recv(&mut self) -> StreamEvent {
        if let Some(connection) = self.connection.as_mut() {
            loop {
                match connection.segments.next().await {
                    Some(Ok(mut bytes)) => {
                        if bytes.last() == Some(&b'\r') {
                            bytes.pop();
                        }
                        match String::from_utf8(bytes) {
                            Ok(line) => return StreamEvent::Line(line),
                            Err(e) => {
                                warn!(error = %e, "Discarding non-UTF-8 line from niri");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Error reading from niri socket");
                        break;
                    }
                    None => {
                        warn!("Niri event stream disconnected (EOF)");
                        break;
                    }
                }
            }

            self.connection = None;
            self.schedule_reconnect();
            return StreamEvent::Disconnected;
        }

        if let Some(timer) = self.reconnect.as_mut() {
            timer.as_mut().await;
            self.reconnect = None;
            info!("Attempting to reconnect to niri IPC");
            return StreamEvent::ReconnectDue;
        }

        std::future::pending().await
    }

    /// Arm the reconnect timer, replacing any pending one
    ///
    /// Does nothing after `shutdown()`.
    pub fn schedule_reconnect(&mut self) {
        if self.shut_down {
            return;
        }

        if self.reconnect.is_some() {
            debug!("Replacing pending reconnect timer");
        }

        debug!(
            delay_ms = self.reconnect_delay.as_millis() as u64,
            "Scheduling niri reconnect"
        );
        self.reconnect = Some(Box::pin(sleep(self.reconnect_delay)));
    }

    /// Send an action to niri without waiting for it
    ///
    /// niri no longer reads requests on an event-stream socket, so the
    /// action goes over a fresh connection to the same socket on a spawned
    /// task, and the reply is only logged. Returns `false` and drops the
    /// request when the event stream is down.
    pub fn send_action(&self, request: niri_ipc::Request) -> bool {
        let Some(connection) = self.connection.as_ref() else {
            warn!("Cannot send request - not connected to niri socket");
            return false;
        };

        let socket_path = connection.socket_path.clone();
        tokio::spawn(async move {
            if let Err(e) = send_one_shot(&socket_path, &request).await {
                warn!(error = %e, "Niri action request failed");
            }
        });

        true
    }

    /// Close the connection for good
    ///
    /// Drops the socket, cancels any pending reconnect, and makes later
    /// `connect()` and `schedule_reconnect()` calls no-ops.
    pub fn shutdown(&mut self) {
        info!("Shutting down niri event stream");
        self.shut_down = true;
        self.connection = None;
        self.reconnect = None;
    }
}

async fn send_one_shot(socket_path: &Path, request: &niri_ipc::Request) -> Result<(), NiriError> {
    let mut client = NiriClient::connect(socket_path).await?;
    let reply = client.send_request(request).await?;
    debug!(?reply, "Niri acknowledged action");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixListener;
    use tokio::time::timeout;

    const TEST_DELAY: Duration = Duration::from_millis(50);

    fn bind() -> (tempfile::TempDir, PathBuf, UnixListener) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("niri.sock");
        let listener = UnixListener::bind(&path).expect("Failed to bind test socket");
        (dir, path, listener)
    }

    #[tokio::test]
    async fn test_connect_sends_snapshot_then_event_stream() {
        let (_dir, path, listener) = bind();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let first = lines.next_line().await.unwrap().unwrap();
            let second = lines.next_line().await.unwrap().unwrap();
            write_half.write_all(b"{\"Ok\":\"Handled\"}\n").await.unwrap();
            (first, second, write_half)
        });

        let mut stream = NiriEventStream::new(Some(path), TEST_DELAY);
        stream.connect().await.unwrap();
        assert!(stream.is_connected());

        let event = stream.recv().await;
        assert_eq!(event, StreamEvent::Line(r#"{"Ok":"Handled"}"#.to_string()));

        let (first, second, _write_half) = server.await.unwrap();
        assert_eq!(first, r#""Workspaces""#);
        assert_eq!(second, r#""EventStream""#);
    }

    #[tokio::test]
    async fn test_close_mid_stream_schedules_one_reconnect() {
        let (_dir, path, listener) = bind();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            lines.next_line().await.unwrap();
            lines.next_line().await.unwrap();
            write_half
                .write_all(b"{\"WorkspaceActivated\":{\"id\":1,\"focused\":true}}\n")
                .await
                .unwrap();
            // Dropping both halves closes the connection
        });

        let mut stream = NiriEventStream::new(Some(path), TEST_DELAY);
        stream.connect().await.unwrap();

        assert!(matches!(stream.recv().await, StreamEvent::Line(_)));
        assert_eq!(stream.recv().await, StreamEvent::Disconnected);
        assert!(!stream.is_connected());
        assert!(stream.is_reconnect_scheduled());

        let start = Instant::now();
        assert_eq!(stream.recv().await, StreamEvent::ReconnectDue);
        assert!(start.elapsed() >= TEST_DELAY - Duration::from_millis(5));
        assert!(!stream.is_reconnect_scheduled());

        // Nothing else fires until the owner reconnects
        assert!(timeout(TEST_DELAY * 3, stream.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_non_utf8_line_is_skipped_without_disconnect() {
        let (_dir, path, listener) = bind();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            lines.next_line().await.unwrap();
            lines.next_line().await.unwrap();
            write_half.write_all(b"\xff\xfe garbage\n").await.unwrap();
            write_half.write_all(b"{\"Ok\":\"Handled\"}\n").await.unwrap();
            std::future::pending::<()>().await;
        });

        let mut stream = NiriEventStream::new(Some(path), TEST_DELAY);
        stream.connect().await.unwrap();

        assert_eq!(
            stream.recv().await,
            StreamEvent::Line(r#"{"Ok":"Handled"}"#.to_string())
        );
        assert!(stream.is_connected());
        assert!(!stream.is_reconnect_scheduled());
    }

    #[tokio::test]
    async fn test_failed_connect_schedules_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let mut stream = NiriEventStream::new(Some(dir.path().join("missing.sock")), TEST_DELAY);

        let err = stream.connect().await.unwrap_err();

        assert!(matches!(err, NiriError::SocketNotFound { .. }));
        assert!(!stream.is_connected());
        assert!(stream.is_reconnect_scheduled());
    }

    #[tokio::test]
    async fn test_repeated_failures_replace_timer() {
        let dir = tempfile::tempdir().unwrap();
        let mut stream = NiriEventStream::new(Some(dir.path().join("missing.sock")), TEST_DELAY);

        let _ = stream.connect().await;
        stream.schedule_reconnect();
        stream.schedule_reconnect();

        assert_eq!(stream.recv().await, StreamEvent::ReconnectDue);
        assert!(timeout(TEST_DELAY * 3, stream.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let mut stream = NiriEventStream::new(Some(dir.path().join("missing.sock")), TEST_DELAY);

        let _ = stream.connect().await;
        assert!(stream.is_reconnect_scheduled());

        stream.shutdown();
        assert!(!stream.is_reconnect_scheduled());

        stream.schedule_reconnect();
        assert!(!stream.is_reconnect_scheduled());

        stream.connect().await.unwrap();
        assert!(!stream.is_connected());
        assert!(timeout(TEST_DELAY * 3, stream.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_reconnect_after_server_returns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("niri.sock");
        let mut stream = NiriEventStream::new(Some(path.clone()), TEST_DELAY);

        assert!(stream.connect().await.is_err());

        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (_read_half, mut write_half) = stream.into_split();
            write_half.write_all(b"{\"Ok\":\"Handled\"}\n").await.unwrap();
            std::future::pending::<()>().await;
        });

        assert_eq!(stream.recv().await, StreamEvent::ReconnectDue);
        stream.connect().await.unwrap();
        assert_eq!(
            stream.recv().await,
            StreamEvent::Line(r#"{"Ok":"Handled"}"#.to_string())
        );
    }

    #[test]
    fn test_send_action_dropped_when_disconnected() {
        let stream = NiriEventStream::new(None, TEST_DELAY);
        assert!(!stream.send_action(super::super::client::focus_workspace_request(1)));
    }
}
