//! Breakpoint engine for the Nova Java debugger.
//!
//! A [`BreakpointManager`] owns the breakpoint/group arena of one debug
//! session. Breakpoints are created by the [`BreakpointFactory`] (explicitly or
//! from a `Class:line` / `Class:method(args)` spec), attached to a group, and
//! resolved against the debuggee whenever a VM is connected:
//!
//! - already-loaded classes are matched eagerly,
//! - a class-prepare request catches classes that load later,
//! - debuggee events for owned requests are routed back through
//!   [`BreakpointManager::dispatch`], which applies filters, conditions and
//!   monitors and returns whether the VM should resume.
//!
//! Listeners observe the engine through [`BreakpointManager::subscribe`].

mod breakpoint;
mod condition;
mod error;
mod event;
mod factory;
mod group;
mod manager;
mod monitor;
mod names;
mod pattern;
mod persist;
mod session;
mod snapshot;

pub mod props;

use std::fmt;

pub use breakpoint::{
    Breakpoint, BreakpointKind, ClassBreakpoint, ExceptionBreakpoint, InstanceWatchBreakpoint,
    LineBreakpoint, LocationBreakpoint, MethodBreakpoint, ThreadBreakpoint, TraceBreakpoint,
    UncaughtExceptionBreakpoint, WatchBreakpoint,
};
pub use condition::{Condition, ConditionConfig, ExpressionCondition, HitCountCondition, HitCountKind};
pub use error::{BreakpointError, EvalError, Fault, PersistError, ResolveError};
pub use event::{BreakpointEvent, EventSource, PropertyChange};
pub use factory::{BreakpointFactory, DebuggingContext};
pub use group::BreakpointGroup;
pub use manager::BreakpointManager;
pub use monitor::{
    BeepMonitor, BufferedOutput, ExpressionMonitor, HitContext, Monitor, MonitorConfig,
    OutputSink, StackTraceMonitor, TracingOutput,
};
pub use pattern::ClassPattern;
pub use persist::{
    blob_name, BreakpointStore, FileBreakpointStore, MemoryBreakpointStore, PersistedBreakpoint,
    PersistedGroup, PersistedKind,
};
pub use session::{DebugSession, SessionListener};
pub use snapshot::SnapshotList;

use nova_jdwp::SuspendPolicy;

/// Stable handle of a breakpoint inside its manager's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId(u64);

/// Stable handle of a breakpoint group inside its manager's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(u64);

impl BreakpointId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl GroupId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "breakpoint#{}", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

/// User-facing name of a suspend policy (`all`, `thread`, `none`).
pub fn suspend_policy_name(policy: SuspendPolicy) -> &'static str {
    match policy {
        SuspendPolicy::All => "all",
        SuspendPolicy::EventThread => "thread",
        SuspendPolicy::None => "none",
    }
}

pub fn parse_suspend_policy(name: &str) -> Result<SuspendPolicy, BreakpointError> {
    match name.trim() {
        "all" => Ok(SuspendPolicy::All),
        "thread" => Ok(SuspendPolicy::EventThread),
        "none" => Ok(SuspendPolicy::None),
        other => Err(BreakpointError::InvalidSuspendPolicy(other.to_string())),
    }
}

/// Map the `[debugger] default_suspend_policy` setting onto a JDWP policy.
pub fn policy_from_config(policy: nova_config::DefaultSuspendPolicy) -> SuspendPolicy {
    match policy {
        nova_config::DefaultSuspendPolicy::All => SuspendPolicy::All,
        nova_config::DefaultSuspendPolicy::Thread => SuspendPolicy::EventThread,
        nova_config::DefaultSuspendPolicy::None => SuspendPolicy::None,
    }
}
