use std::sync::Arc;

use nova_breakpoints::{BreakpointEvent, BreakpointManager, MemoryBreakpointStore};
use tokio::sync::broadcast;

pub fn manager() -> BreakpointManager {
    BreakpointManager::new("test-session", Arc::new(MemoryBreakpointStore::new()))
}

/// Everything published so far.
pub fn drain(rx: &mut broadcast::Receiver<BreakpointEvent>) -> Vec<BreakpointEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

pub fn property_changes<'a>(events: &'a [BreakpointEvent], name: &'a str) -> impl Iterator<Item = &'a BreakpointEvent> {
    events.iter().filter(move |e| e.property() == Some(name))
}
