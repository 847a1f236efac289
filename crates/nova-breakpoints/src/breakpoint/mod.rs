//! Breakpoints: common state plus one struct per kind.

mod class;
mod exception;
mod line;
mod location;
mod method;
mod resolve;
mod thread;
mod trace;
mod watch;

use std::collections::BTreeMap;
use std::sync::Arc;

use nova_jdwp::{
    ClassInfo, JdwpEvent, Location, RequestId, SuspendPolicy, ThreadId, VirtualMachine,
};
use serde_json::{json, Value};

use crate::condition::Condition;
use crate::error::{BreakpointError, ResolveError};
use crate::monitor::Monitor;
use crate::pattern::ClassPattern;
use crate::snapshot::SnapshotList;
use crate::{props, suspend_policy_name, GroupId};

pub use class::ClassBreakpoint;
pub use exception::{ExceptionBreakpoint, UncaughtExceptionBreakpoint};
pub use line::LineBreakpoint;
pub use location::LocationBreakpoint;
pub use method::MethodBreakpoint;
pub use thread::ThreadBreakpoint;
pub use trace::TraceBreakpoint;
pub use watch::{InstanceWatchBreakpoint, WatchBreakpoint};

pub(crate) use resolve::RequestSettings;

/// Per-kind state.
#[derive(Clone, Debug, PartialEq)]
pub enum BreakpointKind {
    Line(LineBreakpoint),
    Method(MethodBreakpoint),
    Location(LocationBreakpoint),
    Exception(ExceptionBreakpoint),
    Watch(WatchBreakpoint),
    InstanceWatch(InstanceWatchBreakpoint),
    Thread(ThreadBreakpoint),
    Class(ClassBreakpoint),
    Trace(TraceBreakpoint),
    UncaughtException(UncaughtExceptionBreakpoint),
}

impl BreakpointKind {
    pub fn name(&self) -> &'static str {
        match self {
            BreakpointKind::Line(_) => "line",
            BreakpointKind::Method(_) => "method",
            BreakpointKind::Location(_) => "location",
            BreakpointKind::Exception(_) => "exception",
            BreakpointKind::Watch(_) => "watch",
            BreakpointKind::InstanceWatch(_) => "instance watch",
            BreakpointKind::Thread(_) => "thread",
            BreakpointKind::Class(_) => "class",
            BreakpointKind::Trace(_) => "trace",
            BreakpointKind::UncaughtException(_) => "uncaught exception",
        }
    }

    pub fn can_filter_class(&self) -> bool {
        matches!(
            self,
            BreakpointKind::Exception(_)
                | BreakpointKind::Watch(_)
                | BreakpointKind::InstanceWatch(_)
                | BreakpointKind::Class(_)
                | BreakpointKind::Trace(_)
        )
    }

    pub fn can_filter_thread(&self) -> bool {
        !matches!(
            self,
            BreakpointKind::Method(_)
                | BreakpointKind::Class(_)
                | BreakpointKind::UncaughtException(_)
        )
    }

    /// Pattern of the classes this kind resolves against; `None` for kinds
    /// that install their requests directly on connect.
    pub fn class_pattern(&self) -> Option<&ClassPattern> {
        match self {
            BreakpointKind::Line(bp) => Some(bp.class_pattern()),
            BreakpointKind::Method(bp) => Some(bp.class_pattern()),
            BreakpointKind::Exception(bp) => Some(bp.class_pattern()),
            BreakpointKind::Watch(bp) => Some(bp.class_pattern()),
            _ => None,
        }
    }

    /// Kinds that reference debuggee state which a disconnect invalidates.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BreakpointKind::Location(_) | BreakpointKind::InstanceWatch(_)
        )
    }

    pub(crate) fn matches(&self, vm: &dyn VirtualMachine, class: &ClassInfo) -> bool {
        match self {
            BreakpointKind::Line(bp) => bp.matches(vm, class),
            other => other
                .class_pattern()
                .is_some_and(|pattern| pattern.matches(&class.name)),
        }
    }

    pub(crate) fn resolve_reference(
        &self,
        vm: &dyn VirtualMachine,
        class: &ClassInfo,
        settings: &RequestSettings<'_>,
    ) -> Result<Vec<RequestId>, ResolveError> {
        match self {
            BreakpointKind::Line(bp) => bp.resolve_reference(vm, class, settings),
            BreakpointKind::Method(bp) => bp.resolve_reference(vm, class, settings),
            BreakpointKind::Exception(bp) => bp.resolve_reference(vm, class, settings),
            BreakpointKind::Watch(bp) => bp.resolve_reference(vm, class, settings),
            _ => Ok(Vec::new()),
        }
    }

    pub(crate) fn create_requests(
        &self,
        vm: &dyn VirtualMachine,
        settings: &RequestSettings<'_>,
    ) -> Result<Vec<RequestId>, ResolveError> {
        match self {
            BreakpointKind::Location(bp) => bp.create_requests(vm, settings),
            BreakpointKind::InstanceWatch(bp) => bp.create_requests(vm, settings),
            BreakpointKind::Thread(bp) => bp.create_requests(vm, settings),
            BreakpointKind::Class(bp) => bp.create_requests(vm, settings),
            BreakpointKind::Trace(bp) => bp.create_requests(vm, settings),
            BreakpointKind::UncaughtException(bp) => bp.create_requests(vm, settings),
            _ => Ok(Vec::new()),
        }
    }

    fn description(&self) -> String {
        match self {
            BreakpointKind::Line(bp) => bp.description(),
            BreakpointKind::Method(bp) => bp.description(),
            BreakpointKind::Location(bp) => bp.description(),
            BreakpointKind::Exception(bp) => bp.description(),
            BreakpointKind::Watch(bp) => bp.description(),
            BreakpointKind::InstanceWatch(bp) => bp.description(),
            BreakpointKind::Thread(bp) => bp.description(),
            BreakpointKind::Class(bp) => bp.description(),
            BreakpointKind::Trace(bp) => bp.description(),
            BreakpointKind::UncaughtException(bp) => bp.description(),
        }
    }

    fn property_values(&self, out: &mut Vec<(&'static str, Value)>) {
        match self {
            BreakpointKind::Line(bp) => bp.property_values(out),
            BreakpointKind::Method(bp) => bp.property_values(out),
            BreakpointKind::Location(bp) => bp.property_values(out),
            BreakpointKind::Exception(bp) => bp.property_values(out),
            BreakpointKind::Watch(bp) => bp.property_values(out),
            BreakpointKind::InstanceWatch(bp) => bp.property_values(out),
            BreakpointKind::Thread(bp) => bp.property_values(out),
            BreakpointKind::Class(bp) => bp.property_values(out),
            BreakpointKind::Trace(bp) => bp.property_values(out),
            BreakpointKind::UncaughtException(_) => {}
        }
    }
}

/// A user-defined stop point.
///
/// A breakpoint is plain data until a [`crate::BreakpointManager`] adopts it;
/// from then on it is addressed by [`crate::BreakpointId`] and mutated through
/// the manager so that event requests and listeners stay in sync.
#[derive(Debug)]
pub struct Breakpoint {
    pub(crate) group: Option<GroupId>,
    enabled: bool,
    suspend_policy: SuspendPolicy,
    force_suspend: bool,
    hit_count: u64,
    delete_on_expire: bool,
    delete_on_hit: bool,
    class_filter: Option<String>,
    thread_filter: Option<String>,
    conditions: SnapshotList<Arc<dyn Condition>>,
    monitors: SnapshotList<Arc<dyn Monitor>>,
    properties: BTreeMap<String, Value>,
    kind: BreakpointKind,
    requests: Vec<RequestId>,
    prepare_request: Option<RequestId>,
}

impl Breakpoint {
    pub fn new(kind: BreakpointKind) -> Self {
        let suspend_policy = match kind {
            // Tracing never stops the debuggee.
            BreakpointKind::Trace(_) => SuspendPolicy::None,
            _ => SuspendPolicy::All,
        };
        Self {
            group: None,
            enabled: true,
            suspend_policy,
            force_suspend: false,
            hit_count: 0,
            delete_on_expire: false,
            delete_on_hit: false,
            class_filter: None,
            thread_filter: None,
            conditions: SnapshotList::new(),
            monitors: SnapshotList::new(),
            properties: BTreeMap::new(),
            kind,
            requests: Vec::new(),
            prepare_request: None,
        }
    }

    pub fn kind(&self) -> &BreakpointKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut BreakpointKind {
        &mut self.kind
    }

    /// Owning group; `None` until the breakpoint is added to a manager.
    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    /// The breakpoint's own enabled flag. Effective enablement also depends
    /// on the ancestor groups; see [`crate::BreakpointManager::is_enabled`].
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    pub(crate) fn increment_hit_count(&mut self) -> u64 {
        self.hit_count += 1;
        self.hit_count
    }

    /// Zero the hit count.
    pub fn reset(&mut self) {
        self.hit_count = 0;
    }

    /// Policy chosen by the user.
    pub fn suspend_policy(&self) -> SuspendPolicy {
        self.suspend_policy
    }

    /// Policy actually applied to event requests.
    pub fn effective_suspend_policy(&self) -> SuspendPolicy {
        if self.force_suspend {
            SuspendPolicy::All
        } else {
            self.suspend_policy
        }
    }

    pub fn is_force_suspend(&self) -> bool {
        self.force_suspend
    }

    pub fn set_suspend_policy(&mut self, policy: SuspendPolicy) {
        if matches!(self.kind, BreakpointKind::Trace(_)) {
            return;
        }
        self.suspend_policy = policy;
        self.force_suspend = self.monitors.any(|m| m.requires_thread());
    }

    pub fn delete_on_expire(&self) -> bool {
        self.delete_on_expire
    }

    /// Kept for persisted data; expiry no longer triggers deletion.
    pub fn set_delete_on_expire(&mut self, delete: bool) {
        self.delete_on_expire = delete;
    }

    pub fn delete_on_hit(&self) -> bool {
        self.delete_on_hit
    }

    pub fn set_delete_on_hit(&mut self, delete: bool) {
        self.delete_on_hit = delete;
    }

    pub fn can_filter_class(&self) -> bool {
        self.kind.can_filter_class()
    }

    pub fn can_filter_thread(&self) -> bool {
        self.kind.can_filter_thread()
    }

    pub fn class_filter(&self) -> Option<&str> {
        self.class_filter.as_deref()
    }

    /// Restrict hits to classes matching `filter`. An empty string clears
    /// the filter.
    pub fn set_class_filter(&mut self, filter: Option<&str>) -> Result<(), BreakpointError> {
        let filter = filter.map(str::trim).filter(|f| !f.is_empty());
        if filter.is_some() && !self.can_filter_class() {
            return Err(BreakpointError::ClassFilterNotSupported(self.kind.name()));
        }
        if let Some(filter) = filter {
            ClassPattern::parse(filter)?;
        }
        self.class_filter = filter.map(str::to_string);
        Ok(())
    }

    pub fn thread_filter(&self) -> Option<&str> {
        self.thread_filter.as_deref()
    }

    /// Restrict hits to the thread with exactly this name. An empty string
    /// clears the filter.
    pub fn set_thread_filter(&mut self, filter: Option<&str>) -> Result<(), BreakpointError> {
        let filter = filter.map(str::trim).filter(|f| !f.is_empty());
        if filter.is_some() && !self.can_filter_thread() {
            return Err(BreakpointError::ThreadFilterNotSupported(self.kind.name()));
        }
        self.thread_filter = filter.map(str::to_string);
        Ok(())
    }

    pub fn conditions(&self) -> Arc<Vec<Arc<dyn Condition>>> {
        self.conditions.snapshot()
    }

    pub fn add_condition(&mut self, condition: Arc<dyn Condition>) {
        self.conditions.push(condition);
    }

    pub fn remove_condition(&mut self, condition: &Arc<dyn Condition>) -> bool {
        self.conditions
            .remove_first(|c| Arc::ptr_eq(c, condition))
    }

    pub fn monitors(&self) -> Arc<Vec<Arc<dyn Monitor>>> {
        self.monitors.snapshot()
    }

    pub fn add_monitor(&mut self, monitor: Arc<dyn Monitor>) {
        self.monitors.push(monitor);
        self.set_suspend_policy(self.suspend_policy);
    }

    pub fn remove_monitor(&mut self, monitor: &Arc<dyn Monitor>) -> bool {
        let removed = self.monitors.remove_first(|m| Arc::ptr_eq(m, monitor));
        self.set_suspend_policy(self.suspend_policy);
        removed
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    /// Set (or with `Value::Null`, clear) an entry of the property bag.
    pub fn set_property(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if value.is_null() {
            self.properties.remove(&name);
        } else {
            self.properties.insert(name, value);
        }
    }

    /// A breakpoint is resolved once it owns at least one live event request.
    /// Kinds that need no class matching are always resolved.
    pub fn is_resolved(&self) -> bool {
        match self.kind.class_pattern() {
            Some(_) => !self.requests.is_empty(),
            None => true,
        }
    }

    /// Live event requests owned by this breakpoint.
    pub fn requests(&self) -> &[RequestId] {
        &self.requests
    }

    pub fn prepare_request(&self) -> Option<RequestId> {
        self.prepare_request
    }

    pub(crate) fn owns_request(&self, id: RequestId) -> bool {
        self.prepare_request == Some(id) || self.requests.contains(&id)
    }

    /// Static one-line summary, e.g. for breakpoint listings.
    pub fn description(&self) -> String {
        let mut out = self.kind.description();
        if let Some(filter) = &self.class_filter {
            out.push_str(&format!(" [class {filter}]"));
        }
        if let Some(filter) = &self.thread_filter {
            out.push_str(&format!(" [thread {filter}]"));
        }
        if !self.enabled {
            out.push_str(" (disabled)");
        }
        out
    }

    /// Incident-specific description of a hit.
    pub fn describe(&self, vm: &dyn VirtualMachine, event: &JdwpEvent) -> String {
        describe_event(self.kind.name(), vm, event)
    }

    /// Observable attributes, in the order property changes are published.
    pub(crate) fn property_values(&self) -> Vec<(&'static str, Value)> {
        let mut out = vec![
            (props::ENABLED, json!(self.enabled)),
            (
                props::SUSPEND_POLICY,
                json!(suspend_policy_name(self.suspend_policy)),
            ),
            (props::CLASS_FILTER, json!(self.class_filter)),
            (props::THREAD_FILTER, json!(self.thread_filter)),
            (props::DELETE_ON_HIT, json!(self.delete_on_hit)),
            (props::DELETE_ON_EXPIRE, json!(self.delete_on_expire)),
            (props::HIT_COUNT, json!(self.hit_count)),
            (props::RESOLVED, json!(self.is_resolved())),
            (
                props::CONDITIONS,
                Value::from_iter(self.conditions.snapshot().iter().map(|c| c.describe())),
            ),
            (
                props::MONITORS,
                Value::from_iter(self.monitors.snapshot().iter().map(|m| m.describe())),
            ),
        ];
        self.kind.property_values(&mut out);
        out
    }

    pub(crate) fn request_settings(&self) -> RequestSettings<'_> {
        RequestSettings {
            policy: self.effective_suspend_policy(),
            class_filter: self.class_filter.as_deref(),
        }
    }
}

pub(crate) fn thread_label(vm: &dyn VirtualMachine, thread: ThreadId) -> String {
    vm.thread_name(thread)
        .unwrap_or_else(|_| format!("thread #{thread}"))
}

pub(crate) fn location_label(vm: &dyn VirtualMachine, location: Location) -> String {
    match vm.location_info(location) {
        Ok(info) => {
            let mut out = format!(
                "{}.{}({})",
                info.class_name,
                info.method_name,
                info.argument_type_names.join(", ")
            );
            if let Some(line) = info.line {
                out.push_str(&format!(" line {line}"));
            }
            out
        }
        Err(_) => format!(
            "class #{} method #{} index {}",
            location.class_id, location.method_id, location.index
        ),
    }
}

fn describe_event(kind: &str, vm: &dyn VirtualMachine, event: &JdwpEvent) -> String {
    match event {
        JdwpEvent::Breakpoint {
            thread, location, ..
        } => format!(
            "{} breakpoint hit at {} in {}",
            capitalize(kind),
            location_label(vm, *location),
            thread_label(vm, *thread)
        ),
        JdwpEvent::Exception {
            thread,
            location,
            exception,
            catch_location,
            ..
        } => format!(
            "{} {} thrown at {} in {}",
            if catch_location.is_some() {
                "Caught exception"
            } else {
                "Uncaught exception"
            },
            exception.runtime_type,
            location_label(vm, *location),
            thread_label(vm, *thread)
        ),
        JdwpEvent::FieldAccess {
            thread,
            location,
            field,
            ..
        } => format!(
            "Field {} accessed at {} in {}",
            field.name,
            location_label(vm, *location),
            thread_label(vm, *thread)
        ),
        JdwpEvent::FieldModification {
            thread,
            location,
            field,
            value,
            ..
        } => format!(
            "Field {} set to {} at {} in {}",
            field.name,
            value,
            location_label(vm, *location),
            thread_label(vm, *thread)
        ),
        JdwpEvent::ThreadStart { thread, .. } => {
            format!("Thread {} started", thread_label(vm, *thread))
        }
        JdwpEvent::ThreadDeath { thread, .. } => {
            format!("Thread {} died", thread_label(vm, *thread))
        }
        JdwpEvent::ClassPrepare { class, .. } => format!("Class {} prepared", class.name),
        JdwpEvent::ClassUnload { class_name, .. } => format!("Class {class_name} unloaded"),
        JdwpEvent::MethodEntry {
            thread, location, ..
        } => format!(
            "Entered {} in {}",
            location_label(vm, *location),
            thread_label(vm, *thread)
        ),
        JdwpEvent::MethodExit {
            thread,
            location,
            return_value,
            ..
        } => {
            let mut out = format!(
                "Exited {} in {}",
                location_label(vm, *location),
                thread_label(vm, *thread)
            );
            if let Some(value) = return_value {
                out.push_str(&format!(", returning {value}"));
            }
            out
        }
        JdwpEvent::VmDisconnected => "Debuggee disconnected".to_string(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
