use nova_jdwp::{
    ClassInfo, EventKind, EventModifier, EventRequest, JdwpError, RequestId, SuspendPolicy,
    VirtualMachine,
};

use super::{Breakpoint, BreakpointKind};
use crate::error::ResolveError;

/// Settings shared by every request a breakpoint installs.
pub(crate) struct RequestSettings<'a> {
    pub(crate) policy: SuspendPolicy,
    pub(crate) class_filter: Option<&'a str>,
}

impl RequestSettings<'_> {
    pub(crate) fn install(
        &self,
        vm: &dyn VirtualMachine,
        mut request: EventRequest,
    ) -> Result<RequestId, JdwpError> {
        request.suspend_policy = self.policy;
        if let Some(filter) = self.class_filter {
            request.modifiers.push(EventModifier::ClassMatch {
                pattern: filter.to_string(),
            });
        }
        request.enabled = true;
        vm.create_event_request(request)
    }

    /// Install every request or none: on failure the ones already created
    /// are deleted before the error is returned.
    pub(crate) fn install_all(
        &self,
        vm: &dyn VirtualMachine,
        requests: impl IntoIterator<Item = EventRequest>,
    ) -> Result<Vec<RequestId>, JdwpError> {
        let mut ids = Vec::new();
        for request in requests {
            match self.install(vm, request) {
                Ok(id) => ids.push(id),
                Err(err) => {
                    for id in ids {
                        ignore_disconnect(vm.delete_event_request(id), "roll back event request");
                    }
                    return Err(err);
                }
            }
        }
        Ok(ids)
    }
}

/// Connection-lost faults during teardown are routine; anything else is
/// logged and otherwise ignored.
pub(crate) fn ignore_disconnect(result: Result<(), JdwpError>, context: &'static str) {
    match result {
        Ok(()) => {}
        Err(err) if err.is_disconnect() => {
            tracing::trace!(target: "nova.breakpoints", context, "debuggee already disconnected");
        }
        Err(err) => {
            tracing::warn!(target: "nova.breakpoints", context, error = %err, "event request cleanup failed");
        }
    }
}

impl Breakpoint {
    /// Resolve against every class already loaded in the debuggee and make
    /// sure a class-prepare request watches for classes loaded later.
    ///
    /// Kinds without a class pattern simply install their requests.
    pub(crate) fn resolve_eagerly(&mut self, vm: &dyn VirtualMachine) -> Result<(), ResolveError> {
        let Some(pattern) = self.kind.class_pattern().cloned() else {
            if self.requests.is_empty() {
                let ids = self.kind.create_requests(vm, &self.request_settings())?;
                self.requests.extend(ids);
            }
            return Ok(());
        };

        if let Some(old) = self.prepare_request.take() {
            ignore_disconnect(vm.delete_event_request(old), "delete class-prepare request");
        }
        let mut request = EventRequest::new(EventKind::ClassPrepare)
            .suspend_policy(SuspendPolicy::EventThread)
            .enabled(true);
        if let Some(filter) = pattern.prepare_filter() {
            request = request.modifier(EventModifier::ClassMatch { pattern: filter });
        }
        if let BreakpointKind::Line(line) = &self.kind {
            if let Some(source) = line.source_filter() {
                if vm.capabilities().can_use_source_name_filters {
                    request = request.modifier(EventModifier::SourceNameMatch {
                        pattern: source.to_string(),
                    });
                }
            }
        }
        self.prepare_request = Some(vm.create_event_request(request)?);

        let candidates = match pattern.exact_name() {
            Some(name) => vm.classes_by_name(name)?,
            None => vm
                .all_classes()?
                .into_iter()
                .filter(|class| pattern.matches(&class.name))
                .collect(),
        };
        tracing::debug!(
            target: "nova.breakpoints",
            pattern = %pattern,
            candidates = candidates.len(),
            "resolving breakpoint against loaded classes"
        );

        // Keep going after a success: the same class may be defined by
        // several class loaders.
        let mut missing = None;
        for class in candidates.iter().filter(|class| class.prepared) {
            if !self.kind.matches(vm, class) {
                continue;
            }
            match self.resolve_against(vm, class) {
                Ok(()) => {}
                Err(err) if err.is_missing_member() => {
                    missing.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }
        match missing {
            Some(err) if self.requests.is_empty() => Err(err),
            _ => Ok(()),
        }
    }

    /// Resolve against a class the debuggee just prepared.
    pub(crate) fn resolve_prepared(
        &mut self,
        vm: &dyn VirtualMachine,
        class: &ClassInfo,
    ) -> Result<(), ResolveError> {
        if !self.kind.matches(vm, class) {
            return Ok(());
        }
        tracing::debug!(target: "nova.breakpoints", class = %class.name, "resolving breakpoint against prepared class");
        self.resolve_against(vm, class)
    }

    fn resolve_against(
        &mut self,
        vm: &dyn VirtualMachine,
        class: &ClassInfo,
    ) -> Result<(), ResolveError> {
        let ids = self
            .kind
            .resolve_reference(vm, class, &self.request_settings())?;
        self.requests.extend(ids);
        Ok(())
    }

    /// Tear down every request this breakpoint owns.
    pub(crate) fn delete_requests(&mut self, vm: &dyn VirtualMachine) {
        for id in self.requests.drain(..).chain(self.prepare_request.take()) {
            ignore_disconnect(vm.delete_event_request(id), "delete event request");
        }
    }

    /// Forget requests without talking to the debuggee (it is gone).
    pub(crate) fn forget_requests(&mut self) {
        self.requests.clear();
        self.prepare_request = None;
    }

    /// Push the effective suspend policy to the live requests.
    pub(crate) fn apply_suspend_policy(&self, vm: &dyn VirtualMachine) {
        let policy = self.effective_suspend_policy();
        for &id in &self.requests {
            // Requests must be disabled while their policy changes.
            let result = vm
                .set_request_enabled(id, false)
                .and_then(|()| vm.set_request_suspend_policy(id, policy))
                .and_then(|()| vm.set_request_enabled(id, true));
            ignore_disconnect(result, "apply suspend policy");
        }
    }
}
