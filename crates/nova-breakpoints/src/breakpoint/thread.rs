use nova_jdwp::{EventKind, EventRequest, RequestId, VirtualMachine};
use serde_json::{json, Value};

use super::RequestSettings;
use crate::error::ResolveError;
use crate::props;

/// Stops when threads start and/or die.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThreadBreakpoint {
    on_start: bool,
    on_death: bool,
}

impl ThreadBreakpoint {
    pub fn new(on_start: bool, on_death: bool) -> Self {
        Self { on_start, on_death }
    }

    pub fn stop_on_start(&self) -> bool {
        self.on_start
    }

    pub fn stop_on_death(&self) -> bool {
        self.on_death
    }

    pub(crate) fn create_requests(
        &self,
        vm: &dyn VirtualMachine,
        settings: &RequestSettings<'_>,
    ) -> Result<Vec<RequestId>, ResolveError> {
        let kinds = [(self.on_start, EventKind::ThreadStart), (self.on_death, EventKind::ThreadDeath)];
        let requests = kinds
            .into_iter()
            .filter(|(wanted, _)| *wanted)
            .map(|(_, kind)| EventRequest::new(kind));
        Ok(settings.install_all(vm, requests)?)
    }

    pub(crate) fn description(&self) -> String {
        match (self.on_start, self.on_death) {
            (true, true) => "thread start/death".to_string(),
            (true, false) => "thread start".to_string(),
            (false, true) => "thread death".to_string(),
            (false, false) => "thread (inactive)".to_string(),
        }
    }

    pub(crate) fn property_values(&self, out: &mut Vec<(&'static str, Value)>) {
        out.extend([
            (props::STOP_ON_START, json!(self.on_start)),
            (props::STOP_ON_DEATH, json!(self.on_death)),
        ]);
    }
}
