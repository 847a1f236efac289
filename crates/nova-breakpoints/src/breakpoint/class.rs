use nova_jdwp::{EventKind, EventRequest, RequestId, VirtualMachine};
use serde_json::{json, Value};

use super::RequestSettings;
use crate::error::ResolveError;
use crate::props;

/// Stops when classes are prepared and/or unloaded. The breakpoint's class
/// filter narrows which classes count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClassBreakpoint {
    on_prepare: bool,
    on_unload: bool,
}

impl ClassBreakpoint {
    pub fn new(on_prepare: bool, on_unload: bool) -> Self {
        Self {
            on_prepare,
            on_unload,
        }
    }

    pub fn stop_on_prepare(&self) -> bool {
        self.on_prepare
    }

    pub fn stop_on_unload(&self) -> bool {
        self.on_unload
    }

    pub(crate) fn create_requests(
        &self,
        vm: &dyn VirtualMachine,
        settings: &RequestSettings<'_>,
    ) -> Result<Vec<RequestId>, ResolveError> {
        let kinds = [(self.on_prepare, EventKind::ClassPrepare), (self.on_unload, EventKind::ClassUnload)];
        let requests = kinds
            .into_iter()
            .filter(|(wanted, _)| *wanted)
            .map(|(_, kind)| EventRequest::new(kind));
        Ok(settings.install_all(vm, requests)?)
    }

    pub(crate) fn description(&self) -> String {
        match (self.on_prepare, self.on_unload) {
            (true, true) => "class prepare/unload".to_string(),
            (true, false) => "class prepare".to_string(),
            (false, true) => "class unload".to_string(),
            (false, false) => "class (inactive)".to_string(),
        }
    }

    pub(crate) fn property_values(&self, out: &mut Vec<(&'static str, Value)>) {
        out.extend([
            (props::STOP_ON_PREPARE, json!(self.on_prepare)),
            (props::STOP_ON_UNLOAD, json!(self.on_unload)),
        ]);
    }
}
