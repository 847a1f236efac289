//! Session lifecycle and the debuggee event loop.

use std::path::Path;
use std::sync::Arc;

use nova_config::DebuggerConfig;
use nova_jdwp::{JdwpError, JdwpEvent, VirtualMachine};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::factory::BreakpointFactory;
use crate::manager::BreakpointManager;
use crate::persist::{BreakpointStore, FileBreakpointStore, MemoryBreakpointStore};

/// Callbacks fired as a debug session moves through its lifecycle.
pub trait SessionListener: Send {
    fn opened(&mut self) {}

    fn connected(&mut self, _vm: &Arc<dyn VirtualMachine>) {}

    fn disconnected(&mut self) {}

    fn resuming(&mut self) {}

    fn suspended(&mut self) {}

    fn closing(&mut self) {}

    /// The session is gone for good; drop anything persisted for it.
    fn session_removed(&mut self) {}
}

impl SessionListener for BreakpointManager {
    fn opened(&mut self) {
        if let Err(err) = self.load() {
            self.report_persist_error(err);
        }
        self.ensure_uncaught_exception_breakpoint();
    }

    fn connected(&mut self, vm: &Arc<dyn VirtualMachine>) {
        self.attach(Arc::clone(vm));
    }

    fn disconnected(&mut self) {
        self.detach();
    }

    fn closing(&mut self) {
        if let Err(err) = self.save() {
            self.report_persist_error(err);
        }
    }

    fn session_removed(&mut self) {
        if let Err(err) = self.delete_store() {
            self.report_persist_error(err);
        }
    }
}

type Listeners = Arc<Mutex<Vec<Box<dyn SessionListener>>>>;

struct EventLoop {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// One debug session: owns the breakpoint manager, the factory used to
/// create breakpoints for it, and the task pumping debuggee events into the
/// manager.
pub struct DebugSession {
    id: String,
    manager: Arc<Mutex<BreakpointManager>>,
    factory: BreakpointFactory,
    listeners: Listeners,
    vm: Option<Arc<dyn VirtualMachine>>,
    event_loop: Option<EventLoop>,
    save_on_close: bool,
}

impl std::fmt::Debug for DebugSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugSession")
            .field("id", &self.id)
            .field("connected", &self.vm.is_some())
            .finish_non_exhaustive()
    }
}

impl DebugSession {
    /// Session whose breakpoints persist under the configured store
    /// directory, or only in memory when none is configured.
    pub fn new(id: impl Into<String>, config: &DebuggerConfig, workspace_root: &Path) -> Self {
        let store: Arc<dyn BreakpointStore> = match config.breakpoint_store_dir(workspace_root) {
            Some(dir) => Arc::new(FileBreakpointStore::new(dir)),
            None => Arc::new(MemoryBreakpointStore::new()),
        };
        Self::with_store(id, store, config)
    }

    pub fn with_store(
        id: impl Into<String>,
        store: Arc<dyn BreakpointStore>,
        config: &DebuggerConfig,
    ) -> Self {
        let id = id.into();
        Self {
            manager: Arc::new(Mutex::new(BreakpointManager::new(id.clone(), store))),
            id,
            factory: BreakpointFactory::from_config(config),
            listeners: Arc::new(Mutex::new(Vec::new())),
            vm: None,
            event_loop: None,
            save_on_close: config.save_on_close,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn manager(&self) -> &Arc<Mutex<BreakpointManager>> {
        &self.manager
    }

    pub fn factory(&self) -> &BreakpointFactory {
        &self.factory
    }

    pub fn is_connected(&self) -> bool {
        self.manager.lock().is_connected()
    }

    /// Listeners are notified after the breakpoint manager.
    pub fn add_listener(&mut self, listener: Box<dyn SessionListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn open(&self) {
        tracing::debug!(target: "nova.breakpoints", session = %self.id, "session opened");
        notify(&self.manager, &self.listeners, |l| l.opened());
    }

    /// Attach to `vm` and start routing its events. Must be called from
    /// within a tokio runtime.
    pub async fn connect(
        &mut self,
        vm: Arc<dyn VirtualMachine>,
        events: broadcast::Receiver<JdwpEvent>,
    ) {
        if self.vm.is_some() {
            self.disconnect().await;
        }
        notify(&self.manager, &self.listeners, |l| l.connected(&vm));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_event_loop(
            self.manager.clone(),
            self.listeners.clone(),
            vm.clone(),
            events,
            cancel.clone(),
        ));
        self.vm = Some(vm);
        self.event_loop = Some(EventLoop { cancel, task });
    }

    /// Stop the event loop and detach from the debuggee, if attached.
    pub async fn disconnect(&mut self) {
        self.stop_event_loop().await;
        if self.vm.take().is_some() && self.manager.lock().is_connected() {
            notify(&self.manager, &self.listeners, |l| l.disconnected());
        }
    }

    /// Resume the debuggee on the user's behalf.
    pub fn resume(&self) -> Result<(), JdwpError> {
        let vm = self.vm.as_ref().ok_or(JdwpError::VmDisconnected)?;
        notify(&self.manager, &self.listeners, |l| l.resuming());
        vm.resume()
    }

    pub async fn close(&mut self) {
        self.disconnect().await;
        tracing::debug!(target: "nova.breakpoints", session = %self.id, "session closing");
        if self.save_on_close {
            self.manager.lock().closing();
        }
        for listener in self.listeners.lock().iter_mut() {
            listener.closing();
        }
    }

    pub fn remove(&self) {
        notify(&self.manager, &self.listeners, |l| l.session_removed());
    }

    /// `[n] description` per breakpoint, for command-line listings.
    pub fn list_breakpoints(&self) -> Vec<String> {
        let manager = self.manager.lock();
        manager
            .breakpoints()
            .map(|(id, bp)| {
                let number = bp
                    .property(crate::props::NUMBER)
                    .and_then(|n| n.as_u64())
                    .unwrap_or_else(|| id.get());
                format!("[{number}] {}", bp.description())
            })
            .collect()
    }

    async fn stop_event_loop(&mut self) {
        let Some(event_loop) = self.event_loop.take() else {
            return;
        };
        event_loop.cancel.cancel();
        if let Err(err) = event_loop.task.await {
            tracing::warn!(target: "nova.breakpoints", session = %self.id, error = %err, "event loop task failed");
        }
    }
}

fn notify(
    manager: &Mutex<BreakpointManager>,
    listeners: &Mutex<Vec<Box<dyn SessionListener>>>,
    f: impl Fn(&mut dyn SessionListener),
) {
    {
        let mut manager = manager.lock();
        let manager: &mut dyn SessionListener = &mut *manager;
        f(manager);
    }
    for listener in listeners.lock().iter_mut() {
        f(listener.as_mut());
    }
}

async fn run_event_loop(
    manager: Arc<Mutex<BreakpointManager>>,
    listeners: Listeners,
    vm: Arc<dyn VirtualMachine>,
    mut events: broadcast::Receiver<JdwpEvent>,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => return,
            received = events.recv() => received,
        };
        let event = match received {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Closed) => return,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(target: "nova.breakpoints", skipped, "debuggee event loop lagged");
                continue;
            }
        };

        if matches!(event, JdwpEvent::VmDisconnected) {
            notify(&manager, &listeners, |l| l.disconnected());
            return;
        }

        let resume = manager.lock().dispatch(&event);
        if resume {
            match vm.resume() {
                Ok(()) => {}
                Err(err) if err.is_disconnect() => {
                    tracing::trace!(target: "nova.breakpoints", "resume after disconnect ignored");
                }
                Err(err) => {
                    tracing::warn!(target: "nova.breakpoints", error = %err, "failed to resume debuggee");
                }
            }
        } else {
            notify(&manager, &listeners, |l| l.suspended());
        }
    }
}
