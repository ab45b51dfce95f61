//! Authoritative in-memory table of niri workspaces
//!
//! The store is only ever written from the decoded niri stream (plus the
//! optimistic activation of a requested switch). Full snapshots replace it
//! wholesale; activation events flip flags in place.
//!
//! Two invariants are enforced here rather than trusted from the input:
//! at most one active workspace per output, and at most one focused
//! workspace overall.

use std::collections::{BTreeMap, HashMap, HashSet};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::niri_ipc::Workspace;

/// Buffered change notifications per subscriber before it starts lagging
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// What a successful store mutation touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// The whole table was replaced; any output may have changed
    Replaced,

    /// A single workspace was activated on this output
    Activated { output: Option<String> },
}

/// Workspace table keyed by niri workspace id
#[derive(Debug)]
pub struct WorkspaceStore {
    workspaces: BTreeMap<u64, Workspace>,
    focused: Option<u64>,
    changes: broadcast::Sender<StoreChange>,
}

impl Default for WorkspaceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            workspaces: BTreeMap::new(),
            focused: None,
            changes,
        }
    }

    /// Receive a `StoreChange` after every successful mutation
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// A sender handle for creating subscriptions from elsewhere
    pub fn change_sender(&self) -> broadcast::Sender<StoreChange> {
        self.changes.clone()
    }

    /// Discard the table and install `list`
    ///
    /// Later duplicates of an id win. If the list claims several focused
    /// workspaces, the lowest id keeps focus. If it claims several active
    /// workspaces on one output, the focused one is kept, otherwise the one
    /// with the lowest `idx`.
    pub fn replace(&mut self, list: Vec<Workspace>) -> StoreChange {
        let mut workspaces: BTreeMap<u64, Workspace> =
            list.into_iter().map(|ws| (ws.id, ws)).collect();

        self.focused = normalize(&mut workspaces);
        self.workspaces = workspaces;

        debug!(
            count = self.workspaces.len(),
            focused = ?self.focused,
            "Replaced workspace table"
        );

        self.notify(StoreChange::Replaced)
    }

    /// Make workspace `id` the active one on its output
    ///
    /// Every workspace on the same output loses `is_active`/`is_focused`,
    /// then the target becomes active with `is_focused = focused`. A focused
    /// activation also takes focus away from the other outputs.
    ///
    /// Returns `None` without touching anything when `id` is unknown, which
    /// usually means an event raced ahead of the snapshot.
    pub fn activate(&mut self, id: u64, focused: bool) -> Option<StoreChange> {
        let Some(output) = self.workspaces.get(&id).map(|ws| ws.output.clone()) else {
            warn!(id, "Ignoring activation of unknown workspace");
            return None;
        };

        for ws in self.workspaces.values_mut() {
            if ws.output == output {
                ws.is_active = false;
                ws.is_focused = false;
            } else if focused {
                ws.is_focused = false;
            }
        }

        if let Some(ws) = self.workspaces.get_mut(&id) {
            ws.is_active = true;
            ws.is_focused = focused;
        }

        self.focused = self
            .workspaces
            .values()
            .find(|ws| ws.is_focused)
            .map(|ws| ws.id);

        debug!(id, focused, output = ?output, "Activated workspace");

        Some(self.notify(StoreChange::Activated { output }))
    }

    /// Workspaces on `output`, ascending by `idx`
    pub fn query(&self, output: &str) -> Vec<Workspace> {
        let mut result: Vec<Workspace> = self
            .workspaces
            .values()
            .filter(|ws| ws.output.as_deref() == Some(output))
            .cloned()
            .collect();
        result.sort_by_key(|ws| (ws.idx, ws.id));
        result
    }

    /// Distinct output names, in ascending order of the lowest workspace id
    /// on each
    pub fn outputs(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.workspaces
            .values()
            .filter_map(|ws| ws.output.as_ref())
            .filter(|output| seen.insert(output.as_str()))
            .cloned()
            .collect()
    }

    /// Id of the focused workspace, if any
    pub fn focused(&self) -> Option<u64> {
        self.focused
    }

    pub fn get(&self, id: u64) -> Option<&Workspace> {
        self.workspaces.get(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.workspaces.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty()
    }

    /// All workspaces, ascending by id
    pub fn iter(&self) -> impl Iterator<Item = &Workspace> {
        self.workspaces.values()
    }

    fn notify(&self, change: StoreChange) -> StoreChange {
        // No subscribers is fine
        let _ = self.changes.send(change.clone());
        change
    }
}

/// Enforce the focus and per-output activity invariants, returning the
/// focused id
fn normalize(workspaces: &mut BTreeMap<u64, Workspace>) -> Option<u64> {
    let mut focused = None;
    for ws in workspaces.values_mut().filter(|ws| ws.is_focused) {
        if focused.is_none() {
            focused = Some(ws.id);
        } else {
            warn!(id = ws.id, "Dropping focus from extra focused workspace");
            ws.is_focused = false;
        }
    }

    let mut keepers: HashMap<Option<&str>, &Workspace> = HashMap::new();
    for ws in workspaces.values().filter(|ws| ws.is_active) {
        keepers
            .entry(ws.output.as_deref())
            .and_modify(|kept| {
                if outranks(ws, kept) {
                    *kept = ws;
                }
            })
            .or_insert(ws);
    }
    let keep: HashSet<u64> = keepers.values().map(|ws| ws.id).collect();

    for ws in workspaces.values_mut() {
        if ws.is_active && !keep.contains(&ws.id) {
            warn!(id = ws.id, output = ?ws.output, "Dropping extra active workspace");
            ws.is_active = false;
        }
    }

    focused
}

fn outranks(candidate: &Workspace, kept: &Workspace) -> bool {
    (candidate.is_focused, std::cmp::Reverse(candidate.idx))
        > (kept.is_focused, std::cmp::Reverse(kept.idx))
}
