//! Workspace synchronization between niri and bar windows
//!
//! One [`WorkspaceManager`] per process keeps a live copy of niri's
//! workspace table and pushes each registered display the workspaces of the
//! niri output it sits on.
//!
//! ```text
//!  niri socket ──> NiriEventStream ──> decode_message ──> WorkspaceStore
//!                                                              │
//!                         OutputMapper <── Dispatcher <────────┘
//!                                              │
//!                                  DisplaySurface (one per bar)
//! ```
//!
//! Display identifiers are whatever the windowing toolkit calls a monitor
//! (a model string such as `"LS27AG55x"`, or a connector name). The
//! [`OutputMapper`] turns those into niri output names and remembers the
//! answer in a [`ResolutionCache`] that outlives any single manager.

pub mod dispatcher;
pub mod manager;
pub mod niri_ipc;
pub mod output_mapper;
pub mod workspaces;

pub use dispatcher::{DisplaySurface, PushError, WorkspaceUpdate};
pub use manager::{ManagerSettings, WorkspaceManager, WorkspaceSync};
pub use niri_ipc::{NiriError, Workspace};
pub use output_mapper::{OutputMapper, ResolutionCache};
pub use workspaces::{StoreChange, WorkspaceStore};
