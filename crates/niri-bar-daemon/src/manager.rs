//! The workspace manager task
//!
//! `WorkspaceManager` is the handle to a single tokio task that
//! owns all workspace state: the store, the output mapper and the display
//! registrations. The task multiplexes two sources:
//!
//! - commands from the handle (register, unregister, switch, shutdown)
//! - lines and reconnect timers from the niri event stream
//!
//! Every mutation and every push happens on that task, so no locking is
//! needed and updates reach displays in the order niri sent them.

use std::path::PathBuf;
use std::time::Duration;

use niri_bar_config::{NiriConfig, DEFAULT_RECONNECT_DELAY};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dispatcher::{Dispatcher, DisplaySurface};
use crate::niri_ipc::{
    decode_message, focus_workspace_request, Message, NiriError, NiriEvent, NiriEventStream,
    StreamEvent,
};
use crate::output_mapper::{OutputMapper, ResolutionCache};
use crate::workspaces::{StoreChange, WorkspaceStore};

/// How the manager reaches niri
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Explicit socket path; `None` resolves it from the environment
    pub socket_path: Option<PathBuf>,

    /// Fixed delay before each reconnect attempt
    pub reconnect_delay: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            socket_path: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ManagerSettings {
    pub fn from_config(config: &NiriConfig) -> Self {
        Self {
            socket_path: config.socket_path.clone(),
            reconnect_delay: config.reconnect_delay,
        }
    }
}

/// Workspace state and the displays watching it
///
/// This is the synchronous core of the manager task. Feeding it lines in
/// order gives exactly the pushes a display would see from the live task.
pub struct WorkspaceSync {
    store: WorkspaceStore,
    mapper: OutputMapper,
    dispatcher: Dispatcher,
}

impl WorkspaceSync {
    pub fn new(cache: ResolutionCache) -> Self {
        Self {
            store: WorkspaceStore::new(),
            mapper: OutputMapper::new(cache),
            dispatcher: Dispatcher::new(),
        }
    }

    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn cache(&self) -> &ResolutionCache {
        self.mapper.cache()
    }

    /// Hand back the resolution cache so it outlives this manager
    pub fn into_cache(self) -> ResolutionCache {
        self.mapper.into_cache()
    }

    /// Decode one line from the event stream and apply it
    ///
    /// Lines that fail to decode are logged and dropped; the stream carries on.
    pub fn handle_line(&mut self, line: &str) {
        match decode_message(line) {
            Ok(message) => self.handle_message(message),
            Err(e) => warn!(error = %e, "Discarding undecodable niri message"),
        }
    }

    pub fn handle_message(&mut self, message: Message) {
        match message {
            Message::Snapshot(workspaces) => {
                debug!(count = workspaces.len(), "Received workspace snapshot");
                let change = self.store.replace(workspaces);
                self.fan_out(Some(change));
            }
            Message::Handled => {
                debug!("niri acknowledged request");
            }
            Message::Error(message) => {
                warn!(%message, "niri returned an error");
            }
            Message::Event(NiriEvent::WorkspacesChanged { workspaces }) => {
                debug!(count = workspaces.len(), "Workspaces changed");
                let change = self.store.replace(workspaces);
                self.fan_out(Some(change));
            }
            Message::Event(NiriEvent::WorkspaceActivated { id, focused }) => {
                debug!(id, focused, "Workspace activated");
                let change = self.store.activate(id, focused);
                self.fan_out(change);
            }
            Message::Event(NiriEvent::Other(kind)) => {
                debug!(kind = %kind, "Ignoring niri event");
            }
        }
    }

    pub fn register_display(&mut self, display: String, surface: Box<dyn DisplaySurface>) {
        self.dispatcher
            .register(display, surface, &self.store, &mut self.mapper);
    }

    pub fn unregister_display(&mut self, display: &str) {
        self.dispatcher.unregister(display);
    }

    /// Ask niri to focus workspace `id` and show it active right away
    ///
    /// The optimistic activation is corrected by whatever niri reports next.
    ///
    /// # Errors
    ///
    /// Returns `NiriError::UnknownWorkspace` without contacting niri when
    /// `id` is not in the store.
    pub fn request_switch(&mut self, id: u64, stream: &NiriEventStream) -> Result<(), NiriError> {
        if !self.store.contains(id) {
            warn!(id, "Switch requested for unknown workspace");
            return Err(NiriError::UnknownWorkspace { id });
        }

        info!(id, "Switching workspace");
        stream.send_action(focus_workspace_request(id));

        let change = self.store.activate(id, true);
        self.fan_out(change);
        Ok(())
    }

    fn fan_out(&mut self, change: Option<StoreChange>) {
        if let Some(change) = change {
            self.dispatcher
                .on_change(&change, &self.store, &mut self.mapper);
        }
    }
}

enum Command {
    RegisterDisplay {
        display: String,
        surface: Box<dyn DisplaySurface>,
    },
    UnregisterDisplay {
        display: String,
    },
    RequestSwitch {
        id: u64,
        reply: oneshot::Sender<Result<(), NiriError>>,
    },
    Shutdown,
}

/// Handle to the running workspace manager task
pub struct WorkspaceManager {
    commands: mpsc::UnboundedSender<Command>,
    changes: broadcast::Sender<StoreChange>,
    task: JoinHandle<ResolutionCache>,
}

impl WorkspaceManager {
    /// Start the manager task and connect to niri
    ///
    /// `cache` carries display resolutions from an earlier manager (or from
    /// configured hints) and is returned by `shutdown()`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(settings: ManagerSettings, cache: ResolutionCache) -> Self {
        let sync = WorkspaceSync::new(cache);
        let changes = sync.store().change_sender();
        let stream = NiriEventStream::new(settings.socket_path, settings.reconnect_delay);
        let (commands, command_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(
            ManagerTask {
                sync,
                stream,
                commands: command_rx,
            }
            .run(),
        );

        Self {
            commands,
            changes,
            task,
        }
    }

    /// Start pushing workspace updates for `display` to `surface`
    ///
    /// A display registered twice keeps only the newest surface.
    pub fn register_display(
        &self,
        display: impl Into<String>,
        surface: impl DisplaySurface + 'static,
    ) {
        self.send(Command::RegisterDisplay {
            display: display.into(),
            surface: Box::new(surface),
        });
    }

    pub fn unregister_display(&self, display: impl Into<String>) {
        self.send(Command::UnregisterDisplay {
            display: display.into(),
        });
    }

    /// Focus workspace `id` in niri
    ///
    /// Resolves once the request has been handed to niri (or dropped
    /// because the stream is down); it does not wait for niri's reply.
    ///
    /// # Errors
    ///
    /// Returns `NiriError::UnknownWorkspace` for an id not in the store, or
    /// `NiriError::ManagerStopped` if the task has exited.
    pub async fn request_switch(&self, id: u64) -> Result<(), NiriError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::RequestSwitch { id, reply })
            .map_err(|_| NiriError::ManagerStopped)?;
        response.await.map_err(|_| NiriError::ManagerStopped)?
    }

    /// Receive a `StoreChange` after every mutation of the workspace table
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// Stop the task, close the niri connection and return the cache
    pub async fn shutdown(self) -> ResolutionCache {
        self.send(Command::Shutdown);

        match self.task.await {
            Ok(cache) => cache,
            Err(e) => {
                warn!(error = %e, "Workspace manager task failed");
                ResolutionCache::default()
            }
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("Workspace manager has stopped, dropping command");
        }
    }
}

struct ManagerTask {
    sync: WorkspaceSync,
    stream: NiriEventStream,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl ManagerTask {
    async fn run(mut self) -> ResolutionCache {
        info!(path = %self.stream.socket_path().display(), "Workspace manager starting");

        // A failed first attempt has already scheduled a retry
        let _ = self.stream.connect().await;

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                event = self.stream.recv() => match event {
                    StreamEvent::Line(line) => self.sync.handle_line(&line),
                    StreamEvent::Disconnected => {
                        debug!("Keeping last known workspaces until niri is back");
                    }
                    StreamEvent::ReconnectDue => {
                        let _ = self.stream.connect().await;
                    }
                },
            }
        }

        self.stream.shutdown();
        info!("Workspace manager stopped");
        self.sync.into_cache()
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::RegisterDisplay { display, surface } => {
                self.sync.register_display(display, surface);
            }
            Command::UnregisterDisplay { display } => {
                self.sync.unregister_display(&display);
            }
            Command::RequestSwitch { id, reply } => {
                let result = self.sync.request_switch(id, &self.stream);
                if reply.send(result).is_err() {
                    debug!(id, "Switch requester went away before the reply");
                }
            }
            Command::Shutdown => {}
        }
    }
}
