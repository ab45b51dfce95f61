//! Wire types and message classification for niri IPC
//!
//! niri writes one JSON value per line. On a connection that has sent
//! requests, each value is either a reply envelope (`{"Ok": ...}` or
//! `{"Err": "..."}`) or, once `EventStream` is active, a bare event object
//! keyed by the event name.
//!
//! Events are decoded into the closed [`NiriEvent`] enum. Event kinds the bar
//! has no use for land in [`NiriEvent::Other`] instead of failing, because
//! niri adds new event variants between releases.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::NiriError;

/// Longest slice of an offending line quoted in error messages
const MAX_QUOTED_LEN: usize = 120;

/// A workspace as reported by niri
///
/// Only `id` is mandatory on the wire. Everything else defaults so that
/// older or trimmed-down payloads still decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Unique workspace identifier assigned by niri
    ///
    /// Stable for the lifetime of the workspace, even when it moves between
    /// outputs.
    pub id: u64,

    /// Position of the workspace on its output, dense and 1-based in niri
    #[serde(default)]
    pub idx: u8,

    /// Optional human-readable workspace name
    #[serde(default)]
    pub name: Option<String>,

    /// The output (monitor) this workspace is on
    #[serde(default)]
    pub output: Option<String>,

    /// Whether this workspace is the visible one on its output
    #[serde(default)]
    pub is_active: bool,

    /// Whether this workspace has keyboard focus
    #[serde(default)]
    pub is_focused: bool,

    /// Whether a window on this workspace requested attention
    #[serde(default)]
    pub is_urgent: bool,

    /// The window that was last focused on this workspace
    #[serde(default)]
    pub active_window_id: Option<u64>,
}

/// Compositor events the bar understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NiriEvent {
    /// The whole workspace topology was replaced, e.g. after a monitor
    /// hot-plug
    WorkspacesChanged { workspaces: Vec<Workspace> },

    /// A workspace became active on its output
    WorkspaceActivated { id: u64, focused: bool },

    /// Any other event; carries the event name for logging
    Other(String),
}

/// One decoded line from the niri socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `{"Ok": {"Workspaces": [...]}}`, the reply to a snapshot request
    Snapshot(Vec<Workspace>),

    /// Any other successful reply, such as `{"Ok": "Handled"}`
    Handled,

    /// `{"Err": "..."}`
    Error(String),

    /// A bare event object from the event stream
    Event(NiriEvent),
}

#[derive(Deserialize)]
struct WorkspacesChangedBody {
    workspaces: Vec<Workspace>,
}

#[derive(Deserialize)]
struct WorkspaceActivatedBody {
    id: u64,
    #[serde(default)]
    focused: bool,
}

/// Classify and decode one line received from niri
///
/// # Errors
///
/// Returns `NiriError::DeserializeFailed` if the line is not JSON or a known
/// event has a malformed body, and `NiriError::UnexpectedMessage` if the JSON
/// is not a single-key object.
pub fn decode_message(line: &str) -> Result<Message, NiriError> {
    let value: Value = serde_json::from_str(line).map_err(NiriError::DeserializeFailed)?;

    let Value::Object(object) = value else {
        return Err(unexpected(line));
    };

    let mut entries = object.into_iter();
    let (kind, body) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        _ => return Err(unexpected(line)),
    };

    match kind.as_str() {
        "Ok" => decode_reply(body),
        "Err" => Ok(Message::Error(match body {
            Value::String(message) => message,
            other => other.to_string(),
        })),
        _ => decode_event(kind, body).map(Message::Event),
    }
}

fn decode_reply(body: Value) -> Result<Message, NiriError> {
    match body {
        Value::Object(mut response) => match response.remove("Workspaces") {
            Some(list) => serde_json::from_value(list)
                .map(Message::Snapshot)
                .map_err(NiriError::DeserializeFailed),
            None => Ok(Message::Handled),
        },
        _ => Ok(Message::Handled),
    }
}

fn decode_event(kind: String, body: Value) -> Result<NiriEvent, NiriError> {
    match kind.as_str() {
        "WorkspacesChanged" => {
            let body: WorkspacesChangedBody =
                serde_json::from_value(body).map_err(NiriError::DeserializeFailed)?;
            Ok(NiriEvent::WorkspacesChanged {
                workspaces: body.workspaces,
            })
        }
        "WorkspaceActivated" => {
            let body: WorkspaceActivatedBody =
                serde_json::from_value(body).map_err(NiriError::DeserializeFailed)?;
            Ok(NiriEvent::WorkspaceActivated {
                id: body.id,
                focused: body.focused,
            })
        }
        _ => Ok(NiriEvent::Other(kind)),
    }
}

fn unexpected(line: &str) -> NiriError {
    NiriError::UnexpectedMessage {
        message: line.trim().chars().take(MAX_QUOTED_LEN).collect(),
    }
}
