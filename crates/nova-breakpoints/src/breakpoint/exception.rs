use nova_jdwp::{
    ClassInfo, EventKind, EventModifier, EventRequest, JdwpEvent, RequestId, VirtualMachine,
};
use serde_json::{json, Value};

use super::RequestSettings;
use crate::error::ResolveError;
use crate::pattern::ClassPattern;
use crate::props;

/// Stops when an exception of a matching type (or a subtype) is thrown.
#[derive(Clone, Debug, PartialEq)]
pub struct ExceptionBreakpoint {
    class: ClassPattern,
    stop_on_caught: bool,
    stop_on_uncaught: bool,
}

impl ExceptionBreakpoint {
    pub fn new(class: ClassPattern, stop_on_caught: bool, stop_on_uncaught: bool) -> Self {
        Self {
            class,
            stop_on_caught,
            stop_on_uncaught,
        }
    }

    pub fn class_pattern(&self) -> &ClassPattern {
        &self.class
    }

    pub fn stop_on_caught(&self) -> bool {
        self.stop_on_caught
    }

    pub fn stop_on_uncaught(&self) -> bool {
        self.stop_on_uncaught
    }

    pub fn set_stop_on_caught(&mut self, stop: bool) {
        self.stop_on_caught = stop;
    }

    pub fn set_stop_on_uncaught(&mut self, stop: bool) {
        self.stop_on_uncaught = stop;
    }

    pub(crate) fn resolve_reference(
        &self,
        vm: &dyn VirtualMachine,
        class: &ClassInfo,
        settings: &RequestSettings<'_>,
    ) -> Result<Vec<RequestId>, ResolveError> {
        let request = EventRequest::new(EventKind::Exception).modifier(EventModifier::ExceptionOnly {
            exception_or_null: Some(class.type_id),
            caught: self.stop_on_caught,
            uncaught: self.stop_on_uncaught,
        });
        Ok(vec![settings.install(vm, request)?])
    }

    pub(crate) fn description(&self) -> String {
        let which = match (self.stop_on_caught, self.stop_on_uncaught) {
            (true, true) => "caught and uncaught",
            (true, false) => "caught",
            (false, true) => "uncaught",
            (false, false) => "no",
        };
        format!("{} ({which})", self.class)
    }

    pub(crate) fn property_values(&self, out: &mut Vec<(&'static str, Value)>) {
        out.extend([
            (props::CLASS_NAME, json!(self.class.to_string())),
            (props::STOP_ON_CAUGHT, json!(self.stop_on_caught)),
            (props::STOP_ON_UNCAUGHT, json!(self.stop_on_uncaught)),
        ]);
    }
}

/// Catch-all for exceptions nobody handles. Every session has one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UncaughtExceptionBreakpoint;

/// Thrown to stop a thread; not an error worth stopping for.
const THREAD_DEATH: &str = "java.lang.ThreadDeath";

impl UncaughtExceptionBreakpoint {
    pub(crate) fn create_requests(
        &self,
        vm: &dyn VirtualMachine,
        settings: &RequestSettings<'_>,
    ) -> Result<Vec<RequestId>, ResolveError> {
        let request = EventRequest::new(EventKind::Exception).modifier(EventModifier::ExceptionOnly {
            exception_or_null: None,
            caught: false,
            uncaught: true,
        });
        Ok(vec![settings.install(vm, request)?])
    }

    pub(crate) fn ignores(event: &JdwpEvent) -> bool {
        matches!(event, JdwpEvent::Exception { exception, .. } if exception.runtime_type == THREAD_DEATH)
    }

    pub(crate) fn description(&self) -> String {
        "uncaught exceptions".to_string()
    }
}
