use std::borrow::Cow;
use std::sync::Arc;

use nova_jdwp::JdwpEvent;
use serde_json::Value;

use crate::error::Fault;
use crate::{BreakpointId, GroupId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventSource {
    Breakpoint(BreakpointId),
    Group(GroupId),
}

/// A single attribute change on a breakpoint or group.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyChange {
    pub source: EventSource,
    pub property: Cow<'static, str>,
    pub old: Value,
    pub new: Value,
}

/// Notification published to every [`crate::BreakpointManager::subscribe`]r.
#[derive(Clone, Debug)]
pub enum BreakpointEvent {
    Added {
        breakpoint: BreakpointId,
        group: GroupId,
    },
    /// Published before the breakpoint is unlinked; `group` is the group it
    /// belonged to.
    Removed {
        breakpoint: BreakpointId,
        group: GroupId,
        description: String,
    },
    Stopped {
        breakpoint: BreakpointId,
        description: String,
        event: JdwpEvent,
    },
    /// A delete-on-hit breakpoint fired and is about to be removed; the
    /// matching [`BreakpointEvent::Removed`] follows.
    Expired {
        breakpoint: BreakpointId,
    },
    Error {
        breakpoint: BreakpointId,
        error: Arc<Fault>,
    },
    PropertyChanged(PropertyChange),
    GroupAdded {
        group: GroupId,
        parent: Option<GroupId>,
    },
    GroupRemoved {
        group: GroupId,
        name: String,
    },
    GroupError {
        group: GroupId,
        error: Arc<Fault>,
    },
}

impl BreakpointEvent {
    pub fn breakpoint(&self) -> Option<BreakpointId> {
        match self {
            BreakpointEvent::Added { breakpoint, .. }
            | BreakpointEvent::Removed { breakpoint, .. }
            | BreakpointEvent::Stopped { breakpoint, .. }
            | BreakpointEvent::Expired { breakpoint }
            | BreakpointEvent::Error { breakpoint, .. } => Some(*breakpoint),
            BreakpointEvent::PropertyChanged(change) => match change.source {
                EventSource::Breakpoint(id) => Some(id),
                EventSource::Group(_) => None,
            },
            _ => None,
        }
    }

    /// Property name, for [`BreakpointEvent::PropertyChanged`].
    pub fn property(&self) -> Option<&str> {
        match self {
            BreakpointEvent::PropertyChanged(change) => Some(&change.property),
            _ => None,
        }
    }
}
