use nova_jdwp::{EventKind, EventModifier, EventRequest, Location, RequestId, VirtualMachine};
use serde_json::{json, Value};

use super::RequestSettings;
use crate::error::ResolveError;
use crate::props;

/// Breakpoint on an exact code location, e.g. one picked from a stack frame.
///
/// The location is only meaningful for the VM it came from, so these
/// breakpoints are removed when the debuggee disconnects.
#[derive(Clone, Debug, PartialEq)]
pub struct LocationBreakpoint {
    location: Location,
}

impl LocationBreakpoint {
    pub fn new(location: Location) -> Self {
        Self { location }
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub(crate) fn create_requests(
        &self,
        vm: &dyn VirtualMachine,
        settings: &RequestSettings<'_>,
    ) -> Result<Vec<RequestId>, ResolveError> {
        let request = EventRequest::new(EventKind::Breakpoint).modifier(EventModifier::LocationOnly {
            location: self.location,
        });
        Ok(vec![settings.install(vm, request)?])
    }

    pub(crate) fn description(&self) -> String {
        format!(
            "class #{} method #{} index {}",
            self.location.class_id, self.location.method_id, self.location.index
        )
    }

    pub(crate) fn property_values(&self, out: &mut Vec<(&'static str, Value)>) {
        out.push((
            props::LOCATION,
            json!({
                "classId": self.location.class_id,
                "methodId": self.location.method_id,
                "index": self.location.index,
            }),
        ));
    }
}
