use nova_jdwp::{EventKind, EventRequest, RequestId, VirtualMachine};
use serde_json::{json, Value};

use super::RequestSettings;
use crate::error::ResolveError;
use crate::props;

/// Reports method entry and/or exit without ever stopping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceBreakpoint {
    on_enter: bool,
    on_exit: bool,
}

impl TraceBreakpoint {
    pub fn new(on_enter: bool, on_exit: bool) -> Self {
        Self { on_enter, on_exit }
    }

    pub fn stop_on_enter(&self) -> bool {
        self.on_enter
    }

    pub fn stop_on_exit(&self) -> bool {
        self.on_exit
    }

    pub(crate) fn create_requests(
        &self,
        vm: &dyn VirtualMachine,
        settings: &RequestSettings<'_>,
    ) -> Result<Vec<RequestId>, ResolveError> {
        let kinds = [(self.on_enter, EventKind::MethodEntry), (self.on_exit, EventKind::MethodExit)];
        let requests = kinds
            .into_iter()
            .filter(|(wanted, _)| *wanted)
            .map(|(_, kind)| EventRequest::new(kind));
        Ok(settings.install_all(vm, requests)?)
    }

    pub(crate) fn description(&self) -> String {
        match (self.on_enter, self.on_exit) {
            (true, true) => "trace method entry/exit".to_string(),
            (true, false) => "trace method entry".to_string(),
            (false, true) => "trace method exit".to_string(),
            (false, false) => "trace (inactive)".to_string(),
        }
    }

    pub(crate) fn property_values(&self, out: &mut Vec<(&'static str, Value)>) {
        out.extend([
            (props::STOP_ON_ENTER, json!(self.on_enter)),
            (props::STOP_ON_EXIT, json!(self.on_exit)),
        ]);
    }
}

#[cfg(test)]
mod tests {
    use nova_jdwp::{MockVm, SuspendPolicy};

    use super::*;

    #[test]
    fn installs_entry_and_exit_requests() {
        let vm = MockVm::new();
        let settings = RequestSettings {
            policy: SuspendPolicy::None,
            class_filter: Some("com.x.*"),
        };
        let ids = TraceBreakpoint::new(true, true)
            .create_requests(&vm, &settings)
            .unwrap();
        let kinds: Vec<_> = ids.iter().map(|id| vm.request(*id).unwrap().kind).collect();
        assert_eq!(kinds, vec![EventKind::MethodEntry, EventKind::MethodExit]);
        assert_eq!(vm.request(ids[0]).unwrap().suspend_policy, SuspendPolicy::None);
    }
}
