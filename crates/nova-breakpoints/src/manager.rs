use std::collections::BTreeMap;
use std::sync::Arc;

use nova_jdwp::{ClassInfo, JdwpEvent, RequestId, SuspendPolicy, VirtualMachine};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::breakpoint::{Breakpoint, BreakpointKind, UncaughtExceptionBreakpoint};
use crate::condition::Condition;
use crate::error::{BreakpointError, Fault, PersistError, ResolveError};
use crate::event::{BreakpointEvent, EventSource, PropertyChange};
use crate::group::BreakpointGroup;
use crate::monitor::{HitContext, Monitor, OutputSink, TracingOutput};
use crate::persist::BreakpointStore;
use crate::{props, BreakpointId, GroupId};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

const DEFAULT_GROUP_NAME: &str = "Default";

/// Owns every breakpoint and group of one debug session.
///
/// All mutation goes through the manager so that event requests in the
/// debuggee and [`BreakpointEvent`] subscribers stay consistent with the
/// in-memory tree.
pub struct BreakpointManager {
    session_id: String,
    pub(crate) groups: BTreeMap<GroupId, BreakpointGroup>,
    pub(crate) breakpoints: BTreeMap<BreakpointId, Breakpoint>,
    pub(crate) default_group: GroupId,
    next_id: u64,
    next_number: u64,
    vm: Option<Arc<dyn VirtualMachine>>,
    store: Arc<dyn BreakpointStore>,
    output: Arc<dyn OutputSink>,
    events: broadcast::Sender<BreakpointEvent>,
}

impl std::fmt::Debug for BreakpointManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakpointManager")
            .field("session_id", &self.session_id)
            .field("groups", &self.groups.len())
            .field("breakpoints", &self.breakpoints.len())
            .field("connected", &self.vm.is_some())
            .finish()
    }
}

impl BreakpointManager {
    pub fn new(session_id: impl Into<String>, store: Arc<dyn BreakpointStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let mut groups = BTreeMap::new();
        let default_group = GroupId(1);
        groups.insert(
            default_group,
            BreakpointGroup::named(DEFAULT_GROUP_NAME.to_string()),
        );
        Self {
            session_id: session_id.into(),
            groups,
            breakpoints: BTreeMap::new(),
            default_group,
            next_id: 2,
            next_number: 1,
            vm: None,
            store,
            output: Arc::new(TracingOutput),
            events,
        }
    }

    /// Where monitors print. Defaults to [`TracingOutput`].
    pub fn set_output(&mut self, output: Arc<dyn OutputSink>) {
        self.output = output;
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub(crate) fn store(&self) -> &dyn BreakpointStore {
        &*self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BreakpointEvent> {
        self.events.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.vm.is_some()
    }

    pub fn vm(&self) -> Option<&Arc<dyn VirtualMachine>> {
        self.vm.as_ref()
    }

    /// Root of the tree. Always present.
    pub fn default_group(&self) -> GroupId {
        self.default_group
    }

    pub fn breakpoint(&self, id: BreakpointId) -> Option<&Breakpoint> {
        self.breakpoints.get(&id)
    }

    /// Every breakpoint, in creation order.
    pub fn breakpoints(&self) -> impl Iterator<Item = (BreakpointId, &Breakpoint)> {
        self.breakpoints.iter().map(|(id, bp)| (*id, bp))
    }

    pub(crate) fn publish(&self, event: BreakpointEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn allocate_group_id(&mut self) -> GroupId {
        let id = GroupId(self.next_id);
        self.next_id += 1;
        id
    }

    fn allocate_breakpoint_id(&mut self) -> BreakpointId {
        let id = BreakpointId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Add to the default group.
    pub fn add_breakpoint(&mut self, bp: Breakpoint) -> BreakpointId {
        let group = self.default_group;
        self.insert_breakpoint(group, bp)
    }

    pub fn add_breakpoint_to(
        &mut self,
        group: GroupId,
        bp: Breakpoint,
    ) -> Result<BreakpointId, BreakpointError> {
        if !self.groups.contains_key(&group) {
            return Err(BreakpointError::UnknownGroup(group));
        }
        Ok(self.insert_breakpoint(group, bp))
    }

    fn insert_breakpoint(&mut self, group: GroupId, mut bp: Breakpoint) -> BreakpointId {
        let id = self.allocate_breakpoint_id();
        bp.group = Some(group);
        bp.set_property(props::NUMBER, json!(self.next_number));
        self.next_number += 1;
        tracing::debug!(target: "nova.breakpoints", breakpoint = %id, group = %group, description = %bp.description(), "breakpoint added");
        self.breakpoints.insert(id, bp);
        if let Some(g) = self.groups.get_mut(&group) {
            g.breakpoints.push(id);
        }
        self.publish(BreakpointEvent::Added {
            breakpoint: id,
            group,
        });
        if self.vm.is_some() {
            self.tracked(id, |manager| manager.refresh(id));
        }
        id
    }

    /// Remove and destroy a breakpoint. `Removed` is published while the
    /// breakpoint is still linked into its group.
    pub fn remove_breakpoint(&mut self, id: BreakpointId) -> Result<Breakpoint, BreakpointError> {
        let bp = self
            .breakpoints
            .get(&id)
            .ok_or(BreakpointError::UnknownBreakpoint(id))?;
        let group = bp.group.unwrap_or(self.default_group);
        self.publish(BreakpointEvent::Removed {
            breakpoint: id,
            group,
            description: bp.description(),
        });

        if let Some(g) = self.groups.get_mut(&group) {
            g.breakpoints.retain(|b| *b != id);
        }
        let mut bp = self
            .breakpoints
            .remove(&id)
            .ok_or(BreakpointError::UnknownBreakpoint(id))?;
        match &self.vm {
            Some(vm) => bp.delete_requests(&**vm),
            None => bp.forget_requests(),
        }
        bp.group = None;
        tracing::debug!(target: "nova.breakpoints", breakpoint = %id, "breakpoint removed");
        Ok(bp)
    }

    /// Move a breakpoint to another group.
    pub fn move_breakpoint(&mut self, id: BreakpointId, to: GroupId) -> Result<(), BreakpointError> {
        if !self.groups.contains_key(&to) {
            return Err(BreakpointError::UnknownGroup(to));
        }
        let from = self
            .breakpoints
            .get(&id)
            .ok_or(BreakpointError::UnknownBreakpoint(id))?
            .group
            .unwrap_or(self.default_group);
        if from == to {
            return Ok(());
        }
        if let Some(g) = self.groups.get_mut(&from) {
            g.breakpoints.retain(|b| *b != id);
        }
        if let Some(g) = self.groups.get_mut(&to) {
            g.breakpoints.push(id);
        }
        if let Some(bp) = self.breakpoints.get_mut(&id) {
            bp.group = Some(to);
        }
        self.publish(BreakpointEvent::PropertyChanged(PropertyChange {
            source: EventSource::Breakpoint(id),
            property: props::BREAKPOINT_GROUP.into(),
            old: json!(from.get()),
            new: json!(to.get()),
        }));
        if self.is_group_enabled(from) != self.is_group_enabled(to) {
            self.tracked(id, |manager| manager.refresh(id));
        }
        Ok(())
    }

    /// A breakpoint is effectively enabled when its own flag and that of
    /// every ancestor group are set.
    pub fn is_enabled(&self, id: BreakpointId) -> bool {
        let Some(bp) = self.breakpoints.get(&id) else {
            return false;
        };
        bp.enabled() && self.is_group_enabled(bp.group.unwrap_or(self.default_group))
    }

    /// Apply `f` to a breakpoint, keep its event requests in sync and publish
    /// a [`BreakpointEvent::PropertyChanged`] per modified attribute.
    ///
    /// Changes that affect which requests exist (enablement, class filter,
    /// kind-specific settings) tear the old requests down before resolving
    /// again; suspend-policy changes are pushed to the live requests.
    pub fn update_breakpoint<R>(
        &mut self,
        id: BreakpointId,
        f: impl FnOnce(&mut Breakpoint) -> Result<R, BreakpointError>,
    ) -> Result<R, BreakpointError> {
        let bp = self
            .breakpoints
            .get_mut(&id)
            .ok_or(BreakpointError::UnknownBreakpoint(id))?;
        let before = bp.property_values();
        let policy_before = bp.effective_suspend_policy();
        let result = f(bp)?;
        let policy_after = bp.effective_suspend_policy();
        let after = bp.property_values();

        let refresh = after.iter().any(|(name, new)| {
            affects_resolution(name) && lookup(&before, name) != *new
        }) || before.len() != after.len();
        if refresh {
            self.refresh(id);
        } else if policy_before != policy_after {
            if let (Some(vm), Some(bp)) = (&self.vm, self.breakpoints.get(&id)) {
                bp.apply_suspend_policy(&**vm);
            }
        }
        self.publish_changes(id, before);
        Ok(result)
    }

    pub fn set_enabled(&mut self, id: BreakpointId, enabled: bool) -> Result<(), BreakpointError> {
        self.update_breakpoint(id, |bp| {
            bp.set_enabled(enabled);
            Ok(())
        })
    }

    pub fn set_suspend_policy(
        &mut self,
        id: BreakpointId,
        policy: SuspendPolicy,
    ) -> Result<(), BreakpointError> {
        self.update_breakpoint(id, |bp| {
            bp.set_suspend_policy(policy);
            Ok(())
        })
    }

    pub fn set_class_filter(&mut self, id: BreakpointId, filter: Option<&str>) -> Result<(), BreakpointError> {
        self.update_breakpoint(id, |bp| bp.set_class_filter(filter))
    }

    pub fn set_thread_filter(&mut self, id: BreakpointId, filter: Option<&str>) -> Result<(), BreakpointError> {
        self.update_breakpoint(id, |bp| bp.set_thread_filter(filter))
    }

    pub fn set_delete_on_hit(&mut self, id: BreakpointId, delete: bool) -> Result<(), BreakpointError> {
        self.update_breakpoint(id, |bp| {
            bp.set_delete_on_hit(delete);
            Ok(())
        })
    }

    pub fn add_condition(
        &mut self,
        id: BreakpointId,
        condition: Arc<dyn Condition>,
    ) -> Result<(), BreakpointError> {
        self.update_breakpoint(id, |bp| {
            bp.add_condition(condition);
            Ok(())
        })
    }

    pub fn remove_condition(
        &mut self,
        id: BreakpointId,
        condition: &Arc<dyn Condition>,
    ) -> Result<bool, BreakpointError> {
        self.update_breakpoint(id, |bp| Ok(bp.remove_condition(condition)))
    }

    pub fn add_monitor(&mut self, id: BreakpointId, monitor: Arc<dyn Monitor>) -> Result<(), BreakpointError> {
        self.update_breakpoint(id, |bp| {
            bp.add_monitor(monitor);
            Ok(())
        })
    }

    pub fn remove_monitor(
        &mut self,
        id: BreakpointId,
        monitor: &Arc<dyn Monitor>,
    ) -> Result<bool, BreakpointError> {
        self.update_breakpoint(id, |bp| Ok(bp.remove_monitor(monitor)))
    }

    pub fn reset(&mut self, id: BreakpointId) -> Result<(), BreakpointError> {
        self.update_breakpoint(id, |bp| {
            bp.reset();
            Ok(())
        })
    }

    /// Set an entry of the breakpoint's property bag; `Value::Null` clears it.
    pub fn set_property(&mut self, id: BreakpointId, name: &str, value: Value) -> Result<(), BreakpointError> {
        let bp = self
            .breakpoints
            .get_mut(&id)
            .ok_or(BreakpointError::UnknownBreakpoint(id))?;
        let old = bp.property(name).cloned().unwrap_or(Value::Null);
        bp.set_property(name, value.clone());
        if old != value {
            self.publish(BreakpointEvent::PropertyChanged(PropertyChange {
                source: EventSource::Breakpoint(id),
                property: name.to_string().into(),
                old,
                new: value,
            }));
        }
        Ok(())
    }

    /// Run `f` and publish whatever observable attributes it changed.
    pub(crate) fn tracked<R>(&mut self, id: BreakpointId, f: impl FnOnce(&mut Self) -> R) -> R {
        let before = self
            .breakpoints
            .get(&id)
            .map(Breakpoint::property_values)
            .unwrap_or_default();
        let result = f(self);
        self.publish_changes(id, before);
        result
    }

    fn publish_changes(&self, id: BreakpointId, before: Vec<(&'static str, Value)>) {
        let Some(bp) = self.breakpoints.get(&id) else {
            return;
        };
        let after = bp.property_values();
        for (name, new) in &after {
            let old = lookup(&before, name);
            if old != *new {
                self.publish(BreakpointEvent::PropertyChanged(PropertyChange {
                    source: EventSource::Breakpoint(id),
                    property: (*name).into(),
                    old,
                    new: new.clone(),
                }));
            }
        }
        for (name, old) in before {
            if !after.iter().any(|(n, _)| *n == name) {
                self.publish(BreakpointEvent::PropertyChanged(PropertyChange {
                    source: EventSource::Breakpoint(id),
                    property: name.into(),
                    old,
                    new: Value::Null,
                }));
            }
        }
    }

    /// Tear down the breakpoint's requests and, if it is live, resolve it
    /// again from scratch.
    pub(crate) fn refresh(&mut self, id: BreakpointId) {
        let Some(vm) = self.vm.clone() else {
            return;
        };
        let live = self.is_enabled(id);
        let Some(bp) = self.breakpoints.get_mut(&id) else {
            return;
        };
        bp.delete_requests(&*vm);
        if !live {
            return;
        }
        if let Err(err) = bp.resolve_eagerly(&*vm) {
            self.publish_resolve_error(id, err);
        }
    }

    fn publish_resolve_error(&self, id: BreakpointId, err: ResolveError) {
        if let ResolveError::Jdwp(jdwp) = &err {
            if jdwp.is_disconnect() {
                tracing::trace!(target: "nova.breakpoints", breakpoint = %id, "resolution interrupted by disconnect");
                return;
            }
        }
        tracing::warn!(target: "nova.breakpoints", breakpoint = %id, error = %err, "breakpoint resolution failed");
        self.publish_error(id, Fault::Resolve(err));
    }

    fn publish_error(&self, id: BreakpointId, fault: Fault) {
        self.publish(BreakpointEvent::Error {
            breakpoint: id,
            error: Arc::new(fault),
        });
    }

    pub(crate) fn report_persist_error(&self, err: PersistError) {
        self.publish_group_error(self.default_group, Fault::Persist(err));
    }

    /// Make sure the session has an uncaught-exception breakpoint.
    pub fn ensure_uncaught_exception_breakpoint(&mut self) -> BreakpointId {
        let existing = self
            .breakpoints
            .iter()
            .find(|(_, bp)| matches!(bp.kind(), BreakpointKind::UncaughtException(_)))
            .map(|(id, _)| *id);
        match existing {
            Some(id) => id,
            None => self.add_breakpoint(Breakpoint::new(BreakpointKind::UncaughtException(
                UncaughtExceptionBreakpoint,
            ))),
        }
    }

    /// Attach to a debuggee: enable the root group and resolve every
    /// breakpoint.
    pub fn attach(&mut self, vm: Arc<dyn VirtualMachine>) {
        tracing::debug!(target: "nova.breakpoints", session = %self.session_id, "debuggee connected");
        self.vm = Some(vm);
        let root = self.default_group;
        if let Err(err) = self.set_group_enabled(root, true) {
            tracing::warn!(target: "nova.breakpoints", error = %err, "failed to enable default group");
        }
        let ids: Vec<BreakpointId> = self.breakpoints.keys().copied().collect();
        for id in ids {
            self.tracked(id, |manager| manager.refresh(id));
        }
    }

    /// Detach from a debuggee that went away: drop breakpoints tied to it,
    /// tear down every request and zero the hit counts.
    pub fn detach(&mut self) {
        tracing::debug!(target: "nova.breakpoints", session = %self.session_id, "debuggee disconnected");
        let transient: Vec<BreakpointId> = self
            .breakpoints
            .iter()
            .filter(|(_, bp)| bp.kind().is_transient())
            .map(|(id, _)| *id)
            .collect();
        for id in transient {
            if let Err(err) = self.remove_breakpoint(id) {
                tracing::debug!(target: "nova.breakpoints", breakpoint = %id, error = %err, "transient breakpoint already gone");
            }
        }

        let vm = self.vm.take();
        let ids: Vec<BreakpointId> = self.breakpoints.keys().copied().collect();
        for id in ids {
            self.tracked(id, |manager| {
                if let Some(bp) = manager.breakpoints.get_mut(&id) {
                    match &vm {
                        Some(vm) => bp.delete_requests(&**vm),
                        None => bp.forget_requests(),
                    }
                    bp.reset();
                }
            });
        }
    }

    fn owner_of(&self, request: RequestId) -> Option<BreakpointId> {
        self.breakpoints
            .iter()
            .find(|(_, bp)| bp.owns_request(request))
            .map(|(id, _)| *id)
    }

    /// Route a debuggee event to the breakpoint owning its request.
    ///
    /// Returns `true` when the debuggee should be resumed. Events for
    /// unknown requests, class-prepare events used for resolution and hits
    /// that do not stop all resume; failures are published as error events
    /// rather than returned.
    pub fn dispatch(&mut self, event: &JdwpEvent) -> bool {
        let Some(vm) = self.vm.clone() else {
            return true;
        };
        let Some(request) = event.request_id() else {
            return true;
        };
        let Some(id) = self.owner_of(request) else {
            tracing::trace!(target: "nova.breakpoints", request = %request, "event for unowned request");
            return true;
        };

        if let JdwpEvent::ClassPrepare { class, .. } = event {
            let is_prepare_watch = self
                .breakpoints
                .get(&id)
                .is_some_and(|bp| bp.prepare_request() == Some(request));
            if is_prepare_watch {
                self.tracked(id, |manager| manager.resolve_prepared(id, &*vm, class));
                return true;
            }
        }

        if !self.is_enabled(id) {
            return true;
        }
        let Some(hit_count) = self.tracked(id, |manager| {
            manager
                .breakpoints
                .get_mut(&id)
                .map(Breakpoint::increment_hit_count)
        }) else {
            return true;
        };

        let Some(kind) = self.breakpoints.get(&id).map(|bp| bp.kind().clone()) else {
            return true;
        };
        match kind {
            BreakpointKind::Trace(_) => {
                if self.thread_filter_rejects(id, &*vm, event) {
                    return true;
                }
                self.perform_stop(id, &vm, event, hit_count);
                true
            }
            BreakpointKind::UncaughtException(_) => {
                if UncaughtExceptionBreakpoint::ignores(event) {
                    return true;
                }
                self.perform_stop(id, &vm, event, hit_count)
            }
            _ => {
                if self.should_resume(id, &*vm, event, hit_count) {
                    true
                } else {
                    self.perform_stop(id, &vm, event, hit_count)
                }
            }
        }
    }

    fn resolve_prepared(&mut self, id: BreakpointId, vm: &dyn VirtualMachine, class: &ClassInfo) {
        let Some(bp) = self.breakpoints.get_mut(&id) else {
            return;
        };
        if let Err(err) = bp.resolve_prepared(vm, class) {
            self.publish_resolve_error(id, err);
        }
    }

    fn thread_filter_rejects(&self, id: BreakpointId, vm: &dyn VirtualMachine, event: &JdwpEvent) -> bool {
        let Some(filter) = self.breakpoints.get(&id).and_then(|bp| bp.thread_filter()) else {
            return false;
        };
        let Some(thread) = event.thread() else {
            return false;
        };
        match vm.thread_name(thread) {
            Ok(name) => name != filter,
            Err(err) => {
                tracing::debug!(target: "nova.breakpoints", thread, error = %err, "thread name lookup failed");
                true
            }
        }
    }

    /// Thread filter, then the breakpoint's own conditions, then those of
    /// its group and every ancestor.
    fn should_resume(
        &self,
        id: BreakpointId,
        vm: &dyn VirtualMachine,
        event: &JdwpEvent,
        hit_count: u64,
    ) -> bool {
        if self.thread_filter_rejects(id, vm, event) {
            return true;
        }
        let Some(bp) = self.breakpoints.get(&id) else {
            return true;
        };
        let output = self.output.clone();
        let ctx = HitContext {
            vm,
            event,
            breakpoint: id,
            hit_count,
            output: &*output,
        };

        let mut satisfied = true;
        for condition in bp.conditions().iter() {
            match condition.is_satisfied(&ctx) {
                Ok(true) => {}
                Ok(false) => {
                    satisfied = false;
                    break;
                }
                Err(err) => {
                    tracing::debug!(target: "nova.breakpoints", breakpoint = %id, error = %err, "condition failed");
                    self.publish_error(id, Fault::Eval(err));
                    satisfied = false;
                }
            }
        }
        if !satisfied {
            return true;
        }
        let group = bp.group.unwrap_or(self.default_group);
        !self.group_conditions_satisfied(group, &ctx)
    }

    /// Announce the stop, run monitors up the group chain and honour
    /// delete-on-hit. Returns whether the debuggee should resume.
    fn perform_stop(
        &mut self,
        id: BreakpointId,
        vm: &Arc<dyn VirtualMachine>,
        event: &JdwpEvent,
        hit_count: u64,
    ) -> bool {
        let Some(bp) = self.breakpoints.get(&id) else {
            return true;
        };
        let description = bp.describe(&**vm, event);
        tracing::debug!(target: "nova.breakpoints", breakpoint = %id, hit_count, "{description}");
        self.publish(BreakpointEvent::Stopped {
            breakpoint: id,
            description,
            event: event.clone(),
        });

        let output = self.output.clone();
        let ctx = HitContext {
            vm: &**vm,
            event,
            breakpoint: id,
            hit_count,
            output: &*output,
        };
        for monitor in bp.monitors().iter() {
            if let Err(err) = monitor.perform(&ctx) {
                tracing::debug!(target: "nova.breakpoints", breakpoint = %id, error = %err, "monitor failed");
                self.publish_error(id, Fault::Eval(err));
            }
        }
        self.run_group_monitors(bp.group.unwrap_or(self.default_group), &ctx);

        let resume = bp.effective_suspend_policy() == SuspendPolicy::None;
        if bp.delete_on_hit() {
            self.publish(BreakpointEvent::Expired { breakpoint: id });
            if let Err(err) = self.remove_breakpoint(id) {
                tracing::debug!(target: "nova.breakpoints", breakpoint = %id, error = %err, "delete on hit failed");
            }
        }
        resume
    }
}

fn lookup(values: &[(&'static str, Value)], name: &str) -> Value {
    values
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| v.clone())
        .unwrap_or(Value::Null)
}

fn affects_resolution(name: &str) -> bool {
    !matches!(
        name,
        props::HIT_COUNT
            | props::THREAD_FILTER
            | props::CONDITIONS
            | props::MONITORS
            | props::DELETE_ON_HIT
            | props::DELETE_ON_EXPIRE
            | props::SUSPEND_POLICY
            | props::RESOLVED
    )
}
