//! Niri IPC client for compositor integration
//!
//! This module provides communication with the niri compositor via its IPC
//! socket. It lets niri-bar:
//! - Keep a persistent event stream open and survive compositor restarts
//! - Decode snapshot replies and workspace events
//! - Send one-shot requests such as focusing a workspace
//!
//! ## Architecture
//!
//! - `NiriEventStream`: the long-lived connection with reconnect timer
//! - `NiriClient`: short-lived request/response connections
//! - `decode_message`: classifies each received line into a `Message`
//! - `NiriError`: error types for IPC operations
//!
//! ## Protocol
//!
//! Niri exposes a Unix socket at `$NIRI_SOCKET`. Clients send JSON-formatted
//! requests (one per line) and receive JSON replies. After `"EventStream"`
//! the connection only carries events, one JSON object per line.

mod client;
mod error;
mod events;
mod types;

pub use client::{focus_workspace_request, get_socket_path, resolve_socket_path, NiriClient};
pub use error::NiriError;
pub use events::{NiriEventStream, StreamEvent};
pub use types::{decode_message, Message, NiriEvent, Workspace};
