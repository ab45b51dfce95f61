//! Fan-out of workspace state to registered display surfaces
//!
//! Each bar window registers a [`DisplaySurface`] under its display
//! identifier. The dispatcher tracks which niri output every display resolved
//! to and pushes that output's workspaces, sorted by `idx`, whenever they may
//! have changed.
//!
//! Delivery is isolated per surface: a surface that fails to accept an update
//! is logged and skipped, and the rest still receive theirs.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::niri_ipc::Workspace;
use crate::output_mapper::OutputMapper;
use crate::workspaces::{StoreChange, WorkspaceStore};

/// Workspace state pushed to one display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceUpdate {
    /// Display identifier the update is for
    pub display: String,

    /// niri output the display resolved to, `None` while unresolved
    pub output: Option<String>,

    /// Workspaces on `output`, ascending by `idx`; empty while unresolved
    pub workspaces: Vec<Workspace>,

    /// Id of the globally focused workspace
    pub focused: Option<u64>,
}

/// Errors a surface can report when handed an update
#[derive(Debug, Error)]
pub enum PushError {
    /// The receiving side has gone away
    #[error("display surface closed")]
    Closed,

    /// The receiving side is not keeping up
    #[error("display surface is full")]
    Full,
}

/// Something that can receive workspace updates for one display
///
/// Implementations must not block: pushes happen on the manager task.
pub trait DisplaySurface: Send {
    fn push(&self, update: WorkspaceUpdate) -> Result<(), PushError>;
}

impl DisplaySurface for mpsc::UnboundedSender<WorkspaceUpdate> {
    fn push(&self, update: WorkspaceUpdate) -> Result<(), PushError> {
        self.send(update).map_err(|_| PushError::Closed)
    }
}

impl DisplaySurface for mpsc::Sender<WorkspaceUpdate> {
    fn push(&self, update: WorkspaceUpdate) -> Result<(), PushError> {
        self.try_send(update).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PushError::Full,
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
        })
    }
}

struct Registration {
    surface: Box<dyn DisplaySurface>,
    output: Option<String>,
}

/// Live display registrations and their resolved outputs
#[derive(Default)]
pub struct Dispatcher {
    registrations: BTreeMap<String, Registration>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the registration for `display` and push its current
    /// workspaces
    ///
    /// Other displays still waiting for an output are retried afterwards,
    /// since a new registration can settle the unclaimed-output and
    /// positional rules for them.
    pub fn register(
        &mut self,
        display_id: String,
        surface: Box<dyn DisplaySurface>,
        store: &WorkspaceStore,
        mapper: &mut OutputMapper,
    ) {
        let previous = self.registrations.insert(
            display_id.clone(),
            Registration {
                surface,
                output: None,
            },
        );
        if previous.is_some() {
            debug!(display = %display_id, "Replacing existing display registration");
        }

        let outputs = store.outputs();
        self.refresh(&display_id, &outputs, mapper);
        info!(
            display = %display_id,
            output = ?self.resolved_output(&display_id),
            "Registered display"
        );
        self.push(&display_id, store);

        let waiting: Vec<String> = self
            .registrations
            .iter()
            .filter(|(id, reg)| **id != display_id && reg.output.is_none())
            .map(|(id, _)| id.clone())
            .collect();

        for other in waiting {
            if self.refresh(&other, &outputs, mapper) {
                self.push(&other, store);
            }
        }
    }

    /// Drop the registration for `display`
    ///
    /// Nothing is pushed, and the mapper's cached resolution is kept so the
    /// display gets the same output if it comes back.
    pub fn unregister(&mut self, display_id: &str) -> bool {
        let removed = self.registrations.remove(display_id).is_some();
        if removed {
            info!(display = %display_id, "Unregistered display");
        } else {
            debug!(
                display = %display_id,
                "Unregister for unknown display ignored"
            );
        }
        removed
    }

    /// Re-resolve where needed and push to the displays `change` affects
    ///
    /// A full replace reaches every display. An activation reaches the
    /// displays on that output, plus any display whose output just changed.
    pub fn on_change(
        &mut self,
        change: &StoreChange,
        store: &WorkspaceStore,
        mapper: &mut OutputMapper,
    ) {
        let outputs = store.outputs();
        let displays: Vec<String> = self.registrations.keys().cloned().collect();

        for display_id in displays {
            let moved = self.refresh(&display_id, &outputs, mapper);

            let affected = match change {
                StoreChange::Replaced => true,
                StoreChange::Activated { output } => {
                    moved
                        || (output.is_some()
                            && self.resolved_output(&display_id) == output.as_deref())
                }
            };

            if affected {
                self.push(&display_id, store);
            }
        }
    }

    /// The output `display` currently resolves to
    pub fn resolved_output(&self, display_id: &str) -> Option<&str> {
        self.registrations
            .get(display_id)
            .and_then(|reg| reg.output.as_deref())
    }

    /// Registered display identifiers, sorted
    pub fn displays(&self) -> impl Iterator<Item = &str> {
        self.registrations.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Keep a still-valid output, otherwise resolve again
    ///
    /// Returns whether the display's output changed.
    fn refresh(
        &mut self,
        display_id: &str,
        outputs: &[String],
        mapper: &mut OutputMapper,
    ) -> bool {
        let current = match self.registrations.get(display_id) {
            Some(reg) => reg.output.clone(),
            None => return false,
        };

        if let Some(output) = &current {
            if outputs.contains(output) {
                return false;
            }
            warn!(
                display = %display_id,
                output = %output,
                "Display lost its output, resolving again"
            );
        }

        let live: BTreeMap<String, Option<String>> = self
            .registrations
            .iter()
            .map(|(id, reg)| (id.clone(), reg.output.clone()))
            .collect();
        let resolved = mapper.resolve(display_id, outputs, &live);

        if resolved.is_none() {
            debug!(display = %display_id, "No output for display yet");
        }

        let changed = resolved != current;
        if let Some(reg) = self.registrations.get_mut(display_id) {
            reg.output = resolved;
        }
        changed
    }

    fn push(&self, display_id: &str, store: &WorkspaceStore) {
        let Some(reg) = self.registrations.get(display_id) else {
            return;
        };

        let update = WorkspaceUpdate {
            display: display_id.to_string(),
            output: reg.output.clone(),
            workspaces: reg
                .output
                .as_deref()
                .map(|output| store.query(output))
                .unwrap_or_default(),
            focused: store.focused(),
        };

        if let Err(e) = reg.surface.push(update) {
            warn!(display = %display_id, error = %e, "Failed to push workspace update");
        }
    }
}
