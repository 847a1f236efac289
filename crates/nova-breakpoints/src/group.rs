use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use serde_json::{json, Value};

use crate::condition::Condition;
use crate::error::{BreakpointError, Fault};
use crate::event::{BreakpointEvent, EventSource, PropertyChange};
use crate::manager::BreakpointManager;
use crate::monitor::{HitContext, Monitor};
use crate::props;
use crate::snapshot::SnapshotList;
use crate::{BreakpointId, GroupId};

/// Tree node holding breakpoints and subgroups.
///
/// Groups are owned by a [`BreakpointManager`]; parent and child links are
/// handles into the manager's arena.
#[derive(Debug)]
pub struct BreakpointGroup {
    name: String,
    pub(crate) enabled: bool,
    pub(crate) parent: Option<GroupId>,
    pub(crate) breakpoints: Vec<BreakpointId>,
    pub(crate) groups: Vec<GroupId>,
    conditions: SnapshotList<Arc<dyn Condition>>,
    monitors: SnapshotList<Arc<dyn Monitor>>,
    properties: BTreeMap<String, Value>,
}

impl BreakpointGroup {
    pub fn new(name: impl Into<String>) -> Result<Self, BreakpointError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BreakpointError::Empty("group name"));
        }
        Ok(Self::named(name))
    }

    pub(crate) fn named(name: String) -> Self {
        Self {
            name,
            enabled: true,
            parent: None,
            breakpoints: Vec::new(),
            groups: Vec::new(),
            conditions: SnapshotList::new(),
            monitors: SnapshotList::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The group's own flag; see [`BreakpointManager::is_group_enabled`].
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn parent(&self) -> Option<GroupId> {
        self.parent
    }

    /// Direct breakpoints, in insertion order.
    pub fn breakpoints(&self) -> &[BreakpointId] {
        &self.breakpoints
    }

    /// Direct subgroups, in insertion order.
    pub fn groups(&self) -> &[GroupId] {
        &self.groups
    }

    pub fn conditions(&self) -> Arc<Vec<Arc<dyn Condition>>> {
        self.conditions.snapshot()
    }

    pub fn monitors(&self) -> Arc<Vec<Arc<dyn Monitor>>> {
        self.monitors.snapshot()
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn add_condition(&mut self, condition: Arc<dyn Condition>) {
        self.conditions.push(condition);
    }

    /// Group monitors run without the event thread being forced to stay
    /// suspended, so thread-inspecting monitors are refused.
    pub fn add_monitor(&mut self, monitor: Arc<dyn Monitor>) -> Result<(), BreakpointError> {
        if monitor.requires_thread() {
            return Err(BreakpointError::MonitorRequiresThread);
        }
        self.monitors.push(monitor);
        Ok(())
    }

    pub(crate) fn clear_actions(&mut self) {
        self.conditions.clear();
        self.monitors.clear();
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_property(&mut self, name: String, value: Value) {
        if value.is_null() {
            self.properties.remove(&name);
        } else {
            self.properties.insert(name, value);
        }
    }

    fn property_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            (props::NAME, json!(self.name)),
            (props::ENABLED, json!(self.enabled)),
            (
                props::CONDITIONS,
                Value::from_iter(self.conditions.snapshot().iter().map(|c| c.describe())),
            ),
            (
                props::MONITORS,
                Value::from_iter(self.monitors.snapshot().iter().map(|m| m.describe())),
            ),
        ]
    }
}

impl BreakpointManager {
    pub fn group(&self, id: GroupId) -> Option<&BreakpointGroup> {
        self.groups.get(&id)
    }

    /// Breakpoints of `group`, breadth first when `recursive`.
    pub fn group_breakpoints(&self, group: GroupId, recursive: bool) -> Vec<BreakpointId> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([group]);
        while let Some(id) = queue.pop_front() {
            let Some(group) = self.groups.get(&id) else {
                continue;
            };
            out.extend_from_slice(&group.breakpoints);
            if recursive {
                queue.extend(group.groups.iter().copied());
            }
        }
        out
    }

    /// Subgroups of `group` (excluding itself), breadth first when `recursive`.
    pub fn subgroups(&self, group: GroupId, recursive: bool) -> Vec<GroupId> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([group]);
        while let Some(id) = queue.pop_front() {
            let Some(group) = self.groups.get(&id) else {
                continue;
            };
            out.extend_from_slice(&group.groups);
            if !recursive {
                break;
            }
            queue.extend(group.groups.iter().copied());
        }
        out
    }

    pub fn breakpoint_count(&self, group: GroupId, recursive: bool) -> usize {
        self.group_breakpoints(group, recursive).len()
    }

    pub fn group_count(&self, group: GroupId, recursive: bool) -> usize {
        self.subgroups(group, recursive).len()
    }

    /// Whether `group` and every ancestor have their own flag set.
    pub fn is_group_enabled(&self, group: GroupId) -> bool {
        let mut current = Some(group);
        while let Some(id) = current {
            match self.groups.get(&id) {
                Some(group) if group.enabled => current = group.parent,
                _ => return false,
            }
        }
        true
    }

    pub fn group_description(&self, group: GroupId) -> Option<String> {
        let g = self.groups.get(&group)?;
        let mut out = format!(
            "{} ({} breakpoints, {} groups)",
            g.name,
            self.breakpoint_count(group, true),
            self.group_count(group, true)
        );
        if !g.enabled {
            out.push_str(" (disabled)");
        }
        Some(out)
    }

    pub fn add_group(
        &mut self,
        parent: GroupId,
        mut group: BreakpointGroup,
    ) -> Result<GroupId, BreakpointError> {
        if !self.groups.contains_key(&parent) {
            return Err(BreakpointError::UnknownGroup(parent));
        }
        let id = self.allocate_group_id();
        group.parent = Some(parent);
        group.breakpoints.clear();
        group.groups.clear();
        self.groups.insert(id, group);
        if let Some(parent) = self.groups.get_mut(&parent) {
            parent.groups.push(id);
        }
        tracing::debug!(target: "nova.breakpoints", group = %id, parent = %parent, "group added");
        self.publish(BreakpointEvent::GroupAdded {
            group: id,
            parent: Some(parent),
        });
        Ok(id)
    }

    /// Remove `group` with everything below it. Subgroups go first, then
    /// the direct breakpoints, each in reverse order; the group's own
    /// removal is published last.
    pub fn remove_group(&mut self, group: GroupId) -> Result<(), BreakpointError> {
        if group == self.default_group {
            return Err(BreakpointError::DefaultGroup);
        }
        let (children, breakpoints) = {
            let g = self
                .groups
                .get(&group)
                .ok_or(BreakpointError::UnknownGroup(group))?;
            (g.groups.clone(), g.breakpoints.clone())
        };
        for child in children.into_iter().rev() {
            self.remove_group(child)?;
        }
        for bp in breakpoints.into_iter().rev() {
            self.remove_breakpoint(bp)?;
        }
        let Some(removed) = self.groups.remove(&group) else {
            return Err(BreakpointError::UnknownGroup(group));
        };
        if let Some(parent) = removed.parent.and_then(|p| self.groups.get_mut(&p)) {
            parent.groups.retain(|g| *g != group);
        }
        tracing::debug!(target: "nova.breakpoints", group = %group, "group removed");
        self.publish(BreakpointEvent::GroupRemoved {
            group,
            name: removed.name,
        });
        Ok(())
    }

    /// Apply `f` to a group and publish the resulting property changes.
    /// Enablement changes re-resolve every breakpoint below the group.
    pub fn update_group<R>(
        &mut self,
        group: GroupId,
        f: impl FnOnce(&mut BreakpointGroup) -> Result<R, BreakpointError>,
    ) -> Result<R, BreakpointError> {
        let g = self
            .groups
            .get_mut(&group)
            .ok_or(BreakpointError::UnknownGroup(group))?;
        let before = g.property_values();
        let result = f(g)?;
        let after = g.property_values();

        let mut enabled_changed = false;
        for ((name, old), (_, new)) in before.into_iter().zip(after) {
            if old == new {
                continue;
            }
            enabled_changed |= name == props::ENABLED;
            self.publish(BreakpointEvent::PropertyChanged(PropertyChange {
                source: EventSource::Group(group),
                property: name.into(),
                old,
                new,
            }));
        }
        if enabled_changed {
            for bp in self.group_breakpoints(group, true) {
                self.tracked(bp, |manager| manager.refresh(bp));
            }
        }
        Ok(result)
    }

    pub fn set_group_enabled(&mut self, group: GroupId, enabled: bool) -> Result<(), BreakpointError> {
        self.update_group(group, |g| {
            g.enabled = enabled;
            Ok(())
        })
    }

    pub fn rename_group(&mut self, group: GroupId, name: &str) -> Result<(), BreakpointError> {
        if name.trim().is_empty() {
            return Err(BreakpointError::Empty("group name"));
        }
        self.update_group(group, |g| {
            g.set_name(name.to_string());
            Ok(())
        })
    }

    pub fn add_group_condition(
        &mut self,
        group: GroupId,
        condition: Arc<dyn Condition>,
    ) -> Result<(), BreakpointError> {
        self.update_group(group, |g| {
            g.add_condition(condition);
            Ok(())
        })
    }

    pub fn remove_group_condition(
        &mut self,
        group: GroupId,
        condition: &Arc<dyn Condition>,
    ) -> Result<bool, BreakpointError> {
        self.update_group(group, |g| {
            Ok(g.conditions.remove_first(|c| Arc::ptr_eq(c, condition)))
        })
    }

    pub fn add_group_monitor(
        &mut self,
        group: GroupId,
        monitor: Arc<dyn Monitor>,
    ) -> Result<(), BreakpointError> {
        self.update_group(group, |g| g.add_monitor(monitor))
    }

    pub fn remove_group_monitor(
        &mut self,
        group: GroupId,
        monitor: &Arc<dyn Monitor>,
    ) -> Result<bool, BreakpointError> {
        self.update_group(group, |g| Ok(g.monitors.remove_first(|m| Arc::ptr_eq(m, monitor))))
    }

    pub fn set_group_property(
        &mut self,
        group: GroupId,
        name: &str,
        value: Value,
    ) -> Result<(), BreakpointError> {
        let g = self
            .groups
            .get_mut(&group)
            .ok_or(BreakpointError::UnknownGroup(group))?;
        let old = g.property(name).cloned().unwrap_or(Value::Null);
        g.set_property(name.to_string(), value.clone());
        if old != value {
            self.publish(BreakpointEvent::PropertyChanged(PropertyChange {
                source: EventSource::Group(group),
                property: name.to_string().into(),
                old,
                new: value,
            }));
        }
        Ok(())
    }

    /// Zero the hit count of the group's direct breakpoints.
    pub fn reset_group(&mut self, group: GroupId) -> Result<(), BreakpointError> {
        let breakpoints = self
            .groups
            .get(&group)
            .ok_or(BreakpointError::UnknownGroup(group))?
            .breakpoints
            .clone();
        for bp in breakpoints {
            self.reset(bp)?;
        }
        Ok(())
    }

    /// Conditions of `group` and then of each ancestor. The first
    /// unsatisfied or failing condition decides.
    pub(crate) fn group_conditions_satisfied(&self, group: GroupId, ctx: &HitContext<'_>) -> bool {
        let mut current = Some(group);
        while let Some(id) = current {
            let Some(g) = self.groups.get(&id) else {
                return true;
            };
            for condition in g.conditions.snapshot().iter() {
                match condition.is_satisfied(ctx) {
                    Ok(true) => {}
                    Ok(false) => return false,
                    Err(err) => {
                        self.publish_group_error(id, Fault::Eval(err));
                        return false;
                    }
                }
            }
            current = g.parent;
        }
        true
    }

    /// Monitors of `group` and every ancestor up to the root.
    pub(crate) fn run_group_monitors(&self, group: GroupId, ctx: &HitContext<'_>) {
        let mut current = Some(group);
        while let Some(id) = current {
            let Some(g) = self.groups.get(&id) else {
                return;
            };
            for monitor in g.monitors.snapshot().iter() {
                if let Err(err) = monitor.perform(ctx) {
                    self.publish_group_error(id, Fault::Eval(err));
                }
            }
            current = g.parent;
        }
    }

    pub(crate) fn publish_group_error(&self, group: GroupId, fault: Fault) {
        tracing::warn!(target: "nova.breakpoints", group = %group, error = %fault, "breakpoint group error");
        self.publish(BreakpointEvent::GroupError {
            group,
            error: Arc::new(fault),
        });
    }
}
