//! Niri socket discovery and one-shot request client
//!
//! `NiriClient` is used for request/response traffic that cannot share the
//! long-lived event stream connection (niri stops reading requests once a
//! socket is switched to event-stream mode): workspace focus actions, and the
//! CLI's snapshot queries.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use super::types::{decode_message, Message, Workspace};
use super::NiriError;

/// Environment variable name for the niri socket path
const NIRI_SOCKET_ENV: &str = "NIRI_SOCKET";

/// Environment variable name for the per-user runtime directory
const XDG_RUNTIME_DIR_ENV: &str = "XDG_RUNTIME_DIR";

/// Socket location relative to the runtime directory
const RUNTIME_SOCKET_PATH: &str = "niri/niri.sock";

/// Work out where the niri socket should be, without touching the filesystem
///
/// Precedence: the explicit `override_path` (from configuration), then
/// `$NIRI_SOCKET`, then `$XDG_RUNTIME_DIR/niri/niri.sock`, and finally
/// `/run/user/$UID/niri/niri.sock` when no runtime directory is set.
/// Empty environment values count as unset.
pub fn resolve_socket_path(override_path: Option<&Path>) -> PathBuf {
    if let Some(path) = override_path {
        return path.to_path_buf();
    }

    match std::env::var_os(NIRI_SOCKET_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => runtime_dir().join(RUNTIME_SOCKET_PATH),
    }
}

fn runtime_dir() -> PathBuf {
    match std::env::var_os(XDG_RUNTIME_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            tracing::debug!("XDG_RUNTIME_DIR not set, deriving runtime dir from uid");
            let uid = unsafe { nix::libc::getuid() };
            PathBuf::from(format!("/run/user/{}", uid))
        }
    }
}

/// Discover the niri IPC socket path and validate that it exists
///
/// # Errors
///
/// Returns `NiriError::SocketNotFound` if the resolved path doesn't exist.
pub fn get_socket_path(override_path: Option<&Path>) -> Result<PathBuf, NiriError> {
    let socket_path = resolve_socket_path(override_path);

    if !socket_path.exists() {
        return Err(NiriError::SocketNotFound { path: socket_path });
    }

    Ok(socket_path)
}

/// Build the request that focuses a workspace by its niri id
pub fn focus_workspace_request(id: u64) -> niri_ipc::Request {
    niri_ipc::Request::Action(niri_ipc::Action::FocusWorkspace {
        reference: niri_ipc::WorkspaceReferenceArg::Id(id),
    })
}

/// Serialize a request and write it as a single newline-terminated line
pub(crate) async fn write_request<W>(
    writer: &mut W,
    request: &niri_ipc::Request,
) -> Result<(), NiriError>
where
    W: AsyncWrite + Unpin,
{
    let mut request_json = serde_json::to_string(request).map_err(NiriError::SerializeFailed)?;
    request_json.push('\n');

    writer
        .write_all(request_json.as_bytes())
        .await
        .map_err(NiriError::SendFailed)?;
    writer.flush().await.map_err(NiriError::SendFailed)
}

/// Client for request/response exchanges with the niri compositor
///
/// # Example
///
/// ```ignore
/// let path = get_socket_path(None)?;
/// let mut client = NiriClient::connect(&path).await?;
/// let workspaces = client.get_workspaces().await?;
/// ```
#[derive(Debug)]
pub struct NiriClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl NiriClient {
    /// Connect to the niri socket at `socket_path`
    ///
    /// # Errors
    ///
    /// Returns `NiriError::ConnectionFailed` if the connection fails.
    pub async fn connect(socket_path: &Path) -> Result<Self, NiriError> {
        let socket = UnixStream::connect(socket_path)
            .await
            .map_err(|e| NiriError::ConnectionFailed {
                path: socket_path.to_path_buf(),
                source: e,
            })?;

        let (read_half, writer) = socket.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer,
        })
    }

    /// Send a request to niri and read one reply line
    ///
    /// # Errors
    ///
    /// Returns `NiriError::SendFailed` / `ReceiveFailed` on socket errors,
    /// `NiriError::ConnectionClosed` on EOF before a reply,
    /// `NiriError::DeserializeFailed` / `UnexpectedMessage` for a reply that
    /// doesn't decode, and `NiriError::Compositor` for an `Err` reply.
    pub async fn send_request(
        &mut self,
        request: &niri_ipc::Request,
    ) -> Result<Message, NiriError> {
        write_request(&mut self.writer, request).await?;

        let mut response_line = String::new();
        let bytes_read = self
            .reader
            .read_line(&mut response_line)
            .await
            .map_err(NiriError::ReceiveFailed)?;

        if bytes_read == 0 {
            return Err(NiriError::ConnectionClosed);
        }

        match decode_message(&response_line)? {
            Message::Error(message) => Err(NiriError::Compositor { message }),
            message => Ok(message),
        }
    }

    /// Query the full list of workspaces
    ///
    /// # Errors
    ///
    /// Returns any error from `send_request()`, or
    /// `NiriError::UnexpectedMessage` if niri answers with something other
    /// than a workspace list.
    pub async fn get_workspaces(&mut self) -> Result<Vec<Workspace>, NiriError> {
        match self.send_request(&niri_ipc::Request::Workspaces).await? {
            Message::Snapshot(workspaces) => Ok(workspaces),
            other => Err(NiriError::UnexpectedMessage {
                message: format!("expected a workspace list, got {:?}", other),
            }),
        }
    }

    /// Ask niri to focus the workspace with the given id
    ///
    /// # Errors
    ///
    /// Returns any error from `send_request()`.
    pub async fn focus_workspace(&mut self, id: u64) -> Result<(), NiriError> {
        self.send_request(&focus_workspace_request(id)).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tokio::net::UnixListener;

    // Environment variables are process-global, so tests touching them must
    // not run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Run `f` with the given variables set (or removed), restoring them after
    fn with_env<T>(vars: &[(&str, Option<&str>)], f: impl FnOnce() -> T) -> T {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let saved: Vec<_> = vars
            .iter()
            .map(|(name, _)| (name.to_string(), env::var_os(name)))
            .collect();

        for (name, value) in vars {
            match value {
                Some(v) => env::set_var(name, v),
                None => env::remove_var(name),
            }
        }

        let result = f();

        for (name, value) in saved {
            match value {
                Some(v) => env::set_var(&name, v),
                None => env::remove_var(&name),
            }
        }

        result
    }

    #[test]
    fn test_override_path_wins() {
        let path = with_env(&[(NIRI_SOCKET_ENV, Some("/tmp/from-env.sock"))], || {
            resolve_socket_path(Some(Path::new("/tmp/override.sock")))
        });

        assert_eq!(path, PathBuf::from("/tmp/override.sock"));
    }

    #[test]
    fn test_niri_socket_env_used_without_override() {
        let path = with_env(&[(NIRI_SOCKET_ENV, Some("/tmp/from-env.sock"))], || {
            resolve_socket_path(None)
        });

        assert_eq!(path, PathBuf::from("/tmp/from-env.sock"));
    }

    #[test]
    fn test_runtime_dir_fallback() {
        let path = with_env(
            &[
                (NIRI_SOCKET_ENV, None),
                (XDG_RUNTIME_DIR_ENV, Some("/run/user/1000")),
            ],
            || resolve_socket_path(None),
        );

        assert_eq!(path, PathBuf::from("/run/user/1000/niri/niri.sock"));
    }

    #[test]
    fn test_empty_niri_socket_counts_as_unset() {
        let path = with_env(
            &[
                (NIRI_SOCKET_ENV, Some("")),
                (XDG_RUNTIME_DIR_ENV, Some("/run/user/1000")),
            ],
            || resolve_socket_path(None),
        );

        assert_eq!(path, PathBuf::from("/run/user/1000/niri/niri.sock"));
    }

    #[test]
    fn test_uid_fallback_without_runtime_dir() {
        let path = with_env(
            &[(NIRI_SOCKET_ENV, None), (XDG_RUNTIME_DIR_ENV, None)],
            || resolve_socket_path(None),
        );

        let uid = unsafe { nix::libc::getuid() };
        assert_eq!(
            path,
            PathBuf::from(format!("/run/user/{}/niri/niri.sock", uid))
        );
    }

    #[test]
    fn test_socket_not_found_error() {
        let fake_path = Path::new("/tmp/nonexistent-niri-bar-socket-12345");

        let err = get_socket_path(Some(fake_path)).unwrap_err();

        match &err {
            NiriError::SocketNotFound { path } => assert_eq!(path, fake_path),
            other => panic!("Expected SocketNotFound error, got: {:?}", other),
        }
        assert!(err.to_string().contains(fake_path.to_str().unwrap()));
    }

    #[test]
    fn test_focus_workspace_request_format() {
        let json = serde_json::to_string(&focus_workspace_request(5)).unwrap();

        assert!(json.starts_with(r#"{"Action":{"FocusWorkspace""#), "{}", json);
        assert!(json.contains(r#""Id":5"#), "{}", json);
    }

    #[test]
    fn test_parameterless_requests_are_bare_strings() {
        assert_eq!(
            serde_json::to_string(&niri_ipc::Request::Workspaces).unwrap(),
            r#""Workspaces""#
        );
        assert_eq!(
            serde_json::to_string(&niri_ipc::Request::EventStream).unwrap(),
            r#""EventStream""#
        );
    }

    /// Bind a listener that answers the first request line with `reply`
    pub(crate) fn reply_once(reply: &'static str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("niri.sock");
        let listener = UnixListener::bind(&path).expect("Failed to bind test socket");

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let _request = lines.next_line().await.unwrap();
            if !reply.is_empty() {
                write_half.write_all(reply.as_bytes()).await.unwrap();
                write_half.write_all(b"\n").await.unwrap();
            }
        });

        (dir, path)
    }

    #[tokio::test]
    async fn test_get_workspaces_from_reply() {
        let (_dir, path) = reply_once(
            r#"{"Ok":{"Workspaces":[{"id":1,"idx":1,"output":"DP-1","is_active":true,"is_focused":true}]}}"#,
        );

        let mut client = NiriClient::connect(&path).await.unwrap();
        let workspaces = client.get_workspaces().await.unwrap();

        assert_eq!(workspaces.len(), 1);
        assert_eq!(workspaces[0].output.as_deref(), Some("DP-1"));
    }

    #[tokio::test]
    async fn test_error_reply_is_compositor_error() {
        let (_dir, path) = reply_once(r#"{"Err":"workspace not found"}"#);

        let mut client = NiriClient::connect(&path).await.unwrap();
        let err = client.focus_workspace(99).await.unwrap_err();

        match err {
            NiriError::Compositor { message } => assert_eq!(message, "workspace not found"),
            other => panic!("Expected Compositor error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_without_reply() {
        let (_dir, path) = reply_once("");

        let mut client = NiriClient::connect(&path).await.unwrap();
        let err = client.get_workspaces().await.unwrap_err();

        assert!(matches!(err, NiriError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_connection_to_non_socket_fails() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let socket_path = temp_dir.path().join("not-a-socket");
        std::fs::write(&socket_path, "").expect("Failed to create dummy file");

        let err = NiriClient::connect(&socket_path).await.unwrap_err();

        match &err {
            NiriError::ConnectionFailed { path, .. } => assert_eq!(path, &socket_path),
            other => panic!("Expected ConnectionFailed error, got: {:?}", other),
        }
        assert!(err.to_string().contains("Failed to connect"));
    }
}
