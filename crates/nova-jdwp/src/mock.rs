use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::poison::lock;
use crate::{
    class_pattern_matches, Capabilities, ClassInfo, EventKind, EventModifier, EventRequest,
    FieldInfo, JdwpError, JdwpEvent, JdwpValue, Location, LocationInfo, MethodInfo,
    ReferenceTypeId, RequestId, StackFrameInfo, SuspendPolicy, ThreadId, VirtualMachine,
};

/// A class definition known to [`MockVm`].
#[derive(Clone, Debug)]
pub struct MockClass {
    pub info: ClassInfo,
    pub source_paths: Vec<String>,
    /// `SourceFile` attribute; defaults to the file name of the first source path.
    pub source_name: Option<String>,
    pub methods: Vec<MethodInfo>,
    pub fields: Vec<FieldInfo>,
    pub lines: BTreeMap<u32, Vec<Location>>,
    pub nested: Vec<ReferenceTypeId>,
    /// Compiled without `-g`; line queries fail with `AbsentInformation`.
    pub absent_information: bool,
}

impl MockClass {
    pub fn new(type_id: ReferenceTypeId, name: impl Into<String>) -> Self {
        Self {
            info: ClassInfo {
                type_id,
                name: name.into(),
                prepared: true,
            },
            source_paths: Vec::new(),
            source_name: None,
            methods: Vec::new(),
            fields: Vec::new(),
            lines: BTreeMap::new(),
            nested: Vec::new(),
            absent_information: false,
        }
    }

    pub fn source_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        if self.source_name.is_none() {
            let name = path.rsplit(['/', '\\']).next().unwrap_or(&path);
            self.source_name = Some(name.to_string());
        }
        self.source_paths.push(path);
        self
    }

    pub fn source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// Add a method whose single executable line is `line`, at bytecode index 0.
    pub fn method(
        mut self,
        method_id: u64,
        name: &str,
        argument_type_names: &[&str],
        line: Option<u32>,
    ) -> Self {
        let location = line.map(|line| {
            let location = Location {
                class_id: self.info.type_id,
                method_id,
                index: 0,
            };
            self.lines.entry(line).or_default().push(location);
            location
        });
        self.methods.push(MethodInfo {
            method_id,
            name: name.to_string(),
            signature: String::new(),
            argument_type_names: argument_type_names.iter().map(|s| s.to_string()).collect(),
            location,
        });
        self
    }

    pub fn field(mut self, field_id: u64, name: &str, type_name: &str) -> Self {
        self.fields.push(FieldInfo {
            field_id,
            declaring_type: self.info.type_id,
            name: name.to_string(),
            type_name: type_name.to_string(),
        });
        self
    }

    pub fn nested(mut self, type_id: ReferenceTypeId) -> Self {
        self.nested.push(type_id);
        self
    }

    pub fn without_debug_info(mut self) -> Self {
        self.absent_information = true;
        self
    }

    pub fn unprepared(mut self) -> Self {
        self.info.prepared = false;
        self
    }
}

#[derive(Default)]
struct MockState {
    disconnected: bool,
    next_request_id: i32,
    classes: BTreeMap<ReferenceTypeId, MockClass>,
    requests: BTreeMap<RequestId, EventRequest>,
    capabilities: Capabilities,
    thread_names: HashMap<ThreadId, String>,
    frames: HashMap<ThreadId, Vec<StackFrameInfo>>,
    evaluations: HashMap<(ThreadId, String), VecDeque<Result<JdwpValue, JdwpError>>>,
    resume_calls: usize,
    deleted_requests: Vec<RequestId>,
    /// Remaining request creations before `create_event_request` fails.
    request_budget: Option<usize>,
}

/// Deterministic, in-memory debuggee.
///
/// Tests load classes and then synthesise the events the real VM would
/// deliver; every request the breakpoint engine creates is recorded and can
/// be inspected.
pub struct MockVm {
    state: Mutex<MockState>,
    events: broadcast::Sender<JdwpEvent>,
}

impl Default for MockVm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVm {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(MockState {
                next_request_id: 1,
                ..MockState::default()
            }),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<JdwpEvent> {
        self.events.subscribe()
    }

    /// Deliver `event` to subscribers. Returns `false` when nobody listens.
    pub fn emit(&self, event: JdwpEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Define (and prepare) a class. Returns the class-prepare events that
    /// matching, enabled `ClassPrepare` requests would report; they are also
    /// emitted to subscribers.
    pub fn load_class(&self, class: MockClass) -> Vec<JdwpEvent> {
        let info = class.info.clone();
        let source = class.source_name.clone();
        let events: Vec<JdwpEvent> = {
            let mut state = lock(&self.state, "MockVm::load_class");
            state.classes.insert(info.type_id, class);
            if !info.prepared {
                return Vec::new();
            }
            state
                .requests
                .iter()
                .filter(|(_, req)| req.enabled && req.kind == EventKind::ClassPrepare)
                .filter(|(_, req)| {
                    let mut patterns = req.class_patterns().peekable();
                    patterns.peek().is_none()
                        || patterns.any(|p| class_pattern_matches(p, &info.name))
                })
                .filter(|(_, req)| {
                    req.source_name_patterns().all(|p| {
                        source
                            .as_deref()
                            .is_some_and(|source| class_pattern_matches(p, source))
                    })
                })
                .map(|(id, _)| JdwpEvent::ClassPrepare {
                    request_id: *id,
                    thread: 1,
                    class: info.clone(),
                })
                .collect()
        };
        for event in &events {
            let _ = self.events.send(event.clone());
        }
        events
    }

    pub fn disconnect(&self) {
        lock(&self.state, "MockVm::disconnect").disconnected = true;
        let _ = self.events.send(JdwpEvent::VmDisconnected);
    }

    /// Let `count` more event requests succeed; later ones fail with a
    /// command error until the budget is lifted with `None`.
    pub fn limit_requests(&self, count: Option<usize>) {
        lock(&self.state, "MockVm::limit_requests").request_budget = count;
    }

    pub fn set_capabilities(&self, capabilities: Capabilities) {
        lock(&self.state, "MockVm::set_capabilities").capabilities = capabilities;
    }

    pub fn set_thread_name(&self, thread: ThreadId, name: impl Into<String>) {
        lock(&self.state, "MockVm::set_thread_name")
            .thread_names
            .insert(thread, name.into());
    }

    pub fn set_stack_frames(&self, thread: ThreadId, frames: Vec<StackFrameInfo>) {
        lock(&self.state, "MockVm::set_stack_frames")
            .frames
            .insert(thread, frames);
    }

    pub fn set_evaluation(
        &self,
        thread: ThreadId,
        expression: impl Into<String>,
        result: Result<JdwpValue, JdwpError>,
    ) {
        lock(&self.state, "MockVm::set_evaluation")
            .evaluations
            .entry((thread, expression.into()))
            .or_default()
            .push_back(result);
    }

    pub fn request(&self, id: RequestId) -> Option<EventRequest> {
        lock(&self.state, "MockVm::request")
            .requests
            .get(&id)
            .cloned()
    }

    /// Live requests, in creation order.
    pub fn requests(&self) -> Vec<(RequestId, EventRequest)> {
        lock(&self.state, "MockVm::requests")
            .requests
            .iter()
            .map(|(id, req)| (*id, req.clone()))
            .collect()
    }

    pub fn requests_of_kind(&self, kind: EventKind) -> Vec<(RequestId, EventRequest)> {
        self.requests()
            .into_iter()
            .filter(|(_, req)| req.kind == kind)
            .collect()
    }

    pub fn deleted_requests(&self) -> Vec<RequestId> {
        lock(&self.state, "MockVm::deleted_requests")
            .deleted_requests
            .clone()
    }

    pub fn resume_calls(&self) -> usize {
        lock(&self.state, "MockVm::resume_calls").resume_calls
    }

    /// Build the event a live `Breakpoint` request at its location would report.
    pub fn breakpoint_hit(&self, id: RequestId, thread: ThreadId) -> Option<JdwpEvent> {
        let request = self.request(id)?;
        if request.kind != EventKind::Breakpoint {
            return None;
        }
        Some(JdwpEvent::Breakpoint {
            request_id: id,
            thread,
            location: request.location()?,
        })
    }

    fn with_connected<R>(
        &self,
        context: &'static str,
        f: impl FnOnce(&mut MockState) -> Result<R, JdwpError>,
    ) -> Result<R, JdwpError> {
        let mut state = lock(&self.state, context);
        if state.disconnected {
            return Err(JdwpError::VmDisconnected);
        }
        f(&mut state)
    }
}

impl MockState {
    fn class(&self, id: ReferenceTypeId) -> Result<&MockClass, JdwpError> {
        self.classes.get(&id).ok_or(JdwpError::InvalidClass(id))
    }

    fn prepared_class(&self, id: ReferenceTypeId) -> Result<&MockClass, JdwpError> {
        let class = self.class(id)?;
        if !class.info.prepared {
            return Err(JdwpError::ClassNotPrepared(id));
        }
        Ok(class)
    }

    fn request_mut(&mut self, id: RequestId) -> Result<&mut EventRequest, JdwpError> {
        self.requests
            .get_mut(&id)
            .ok_or(JdwpError::InvalidRequestState(id))
    }
}

impl VirtualMachine for MockVm {
    fn create_event_request(&self, request: EventRequest) -> Result<RequestId, JdwpError> {
        self.with_connected("MockVm::create_event_request", |state| {
            if let Some(budget) = state.request_budget.as_mut() {
                if *budget == 0 {
                    // JDWP INVALID_EVENT_TYPE
                    return Err(JdwpError::CommandFailed { error_code: 102 });
                }
                *budget -= 1;
            }
            let id = RequestId(state.next_request_id);
            state.next_request_id += 1;
            state.requests.insert(id, request);
            Ok(id)
        })
    }

    fn delete_event_request(&self, id: RequestId) -> Result<(), JdwpError> {
        self.with_connected("MockVm::delete_event_request", |state| {
            if state.requests.remove(&id).is_some() {
                state.deleted_requests.push(id);
            }
            Ok(())
        })
    }

    fn set_request_enabled(&self, id: RequestId, enabled: bool) -> Result<(), JdwpError> {
        self.with_connected("MockVm::set_request_enabled", |state| {
            state.request_mut(id)?.enabled = enabled;
            Ok(())
        })
    }

    fn is_request_enabled(&self, id: RequestId) -> Result<bool, JdwpError> {
        self.with_connected("MockVm::is_request_enabled", |state| {
            Ok(state.request_mut(id)?.enabled)
        })
    }

    fn set_request_suspend_policy(
        &self,
        id: RequestId,
        policy: SuspendPolicy,
    ) -> Result<(), JdwpError> {
        self.with_connected("MockVm::set_request_suspend_policy", |state| {
            let request = state.request_mut(id)?;
            // JDI refuses to mutate an enabled request.
            if request.enabled {
                return Err(JdwpError::InvalidRequestState(id));
            }
            request.suspend_policy = policy;
            Ok(())
        })
    }

    fn all_classes(&self) -> Result<Vec<ClassInfo>, JdwpError> {
        self.with_connected("MockVm::all_classes", |state| {
            Ok(state.classes.values().map(|c| c.info.clone()).collect())
        })
    }

    fn classes_by_name(&self, name: &str) -> Result<Vec<ClassInfo>, JdwpError> {
        self.with_connected("MockVm::classes_by_name", |state| {
            Ok(state
                .classes
                .values()
                .filter(|c| c.info.name == name)
                .map(|c| c.info.clone())
                .collect())
        })
    }

    fn methods(&self, class: ReferenceTypeId) -> Result<Vec<MethodInfo>, JdwpError> {
        self.with_connected("MockVm::methods", |state| {
            Ok(state.prepared_class(class)?.methods.clone())
        })
    }

    fn fields(&self, class: ReferenceTypeId) -> Result<Vec<FieldInfo>, JdwpError> {
        self.with_connected("MockVm::fields", |state| {
            Ok(state.prepared_class(class)?.fields.clone())
        })
    }

    fn nested_types(&self, class: ReferenceTypeId) -> Result<Vec<ClassInfo>, JdwpError> {
        self.with_connected("MockVm::nested_types", |state| {
            let nested = state.class(class)?.nested.clone();
            Ok(nested
                .iter()
                .filter_map(|id| state.classes.get(id))
                .map(|c| c.info.clone())
                .collect())
        })
    }

    fn source_paths(&self, class: ReferenceTypeId) -> Result<Vec<String>, JdwpError> {
        self.with_connected("MockVm::source_paths", |state| {
            let class = state.class(class)?;
            if class.absent_information {
                return Err(JdwpError::AbsentInformation(class.info.name.clone()));
            }
            Ok(class.source_paths.clone())
        })
    }

    fn locations_of_line(
        &self,
        class: ReferenceTypeId,
        source_name: Option<&str>,
        line: u32,
    ) -> Result<Vec<Location>, JdwpError> {
        self.with_connected("MockVm::locations_of_line", |state| {
            let class = state.prepared_class(class)?;
            if class.absent_information {
                return Err(JdwpError::AbsentInformation(class.info.name.clone()));
            }
            if source_name.is_some() && source_name != class.source_name.as_deref() {
                return Ok(Vec::new());
            }
            Ok(class.lines.get(&line).cloned().unwrap_or_default())
        })
    }

    fn location_info(&self, location: Location) -> Result<LocationInfo, JdwpError> {
        self.with_connected("MockVm::location_info", |state| {
            let class = state.class(location.class_id)?;
            let method = class
                .methods
                .iter()
                .find(|m| m.method_id == location.method_id)
                .ok_or_else(|| JdwpError::Other(format!("unknown method {}", location.method_id)))?;
            let line = class
                .lines
                .iter()
                .find(|(_, locs)| locs.contains(&location))
                .map(|(line, _)| *line);
            Ok(LocationInfo {
                class_name: class.info.name.clone(),
                method_name: method.name.clone(),
                method_signature: method.signature.clone(),
                argument_type_names: method.argument_type_names.clone(),
                source_path: class.source_paths.first().cloned(),
                line,
            })
        })
    }

    fn capabilities(&self) -> Capabilities {
        lock(&self.state, "MockVm::capabilities").capabilities
    }

    fn thread_name(&self, thread: ThreadId) -> Result<String, JdwpError> {
        self.with_connected("MockVm::thread_name", |state| {
            state
                .thread_names
                .get(&thread)
                .cloned()
                .ok_or(JdwpError::InvalidThread(thread))
        })
    }

    fn stack_frames(&self, thread: ThreadId) -> Result<Vec<StackFrameInfo>, JdwpError> {
        self.with_connected("MockVm::stack_frames", |state| {
            Ok(state.frames.get(&thread).cloned().unwrap_or_default())
        })
    }

    fn evaluate(&self, thread: ThreadId, expression: &str) -> Result<JdwpValue, JdwpError> {
        self.with_connected("MockVm::evaluate", |state| {
            state
                .evaluations
                .get_mut(&(thread, expression.to_string()))
                .and_then(|queue| {
                    // The last queued result sticks so repeated hits stay deterministic.
                    if queue.len() > 1 {
                        queue.pop_front()
                    } else {
                        queue.front().map(clone_result)
                    }
                })
                .unwrap_or(Err(JdwpError::NotImplemented))
        })
    }

    fn resume(&self) -> Result<(), JdwpError> {
        self.with_connected("MockVm::resume", |state| {
            state.resume_calls += 1;
            Ok(())
        })
    }
}

fn clone_result(result: &Result<JdwpValue, JdwpError>) -> Result<JdwpValue, JdwpError> {
    match result {
        Ok(value) => Ok(value.clone()),
        Err(err) => Err(JdwpError::Other(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_class_reports_matching_prepare_requests() {
        let vm = MockVm::new();
        let wanted = vm
            .create_event_request(
                EventRequest::new(EventKind::ClassPrepare)
                    .modifier(EventModifier::ClassMatch {
                        pattern: "com.example.*".into(),
                    })
                    .enabled(true),
            )
            .unwrap();
        vm.create_event_request(
            EventRequest::new(EventKind::ClassPrepare)
                .modifier(EventModifier::ClassMatch {
                    pattern: "org.other.*".into(),
                })
                .enabled(true),
        )
        .unwrap();

        let events = vm.load_class(MockClass::new(10, "com.example.Main"));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].request_id(), Some(wanted));
    }

    #[test]
    fn prepare_requests_honour_source_name_filters() {
        let vm = MockVm::new();
        let by_source = vm
            .create_event_request(
                EventRequest::new(EventKind::ClassPrepare)
                    .modifier(EventModifier::SourceNameMatch {
                        pattern: "Main.java".into(),
                    })
                    .enabled(true),
            )
            .unwrap();

        assert!(vm
            .load_class(MockClass::new(1, "a.Other").source_path("a/Other.java"))
            .is_empty());
        assert!(vm.load_class(MockClass::new(2, "a.NoSource")).is_empty());
        let events = vm.load_class(MockClass::new(3, "a.Helper").source_path("a/Main.java"));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].request_id(), Some(by_source));
    }

    #[test]
    fn request_budget_fails_later_creations() {
        let vm = MockVm::new();
        vm.limit_requests(Some(1));
        vm.create_event_request(EventRequest::new(EventKind::Breakpoint))
            .unwrap();
        assert!(matches!(
            vm.create_event_request(EventRequest::new(EventKind::Breakpoint)),
            Err(JdwpError::CommandFailed { .. })
        ));
        vm.limit_requests(None);
        vm.create_event_request(EventRequest::new(EventKind::Breakpoint))
            .unwrap();
        assert_eq!(vm.requests().len(), 2);
    }

    #[test]
    fn disconnected_vm_rejects_requests() {
        let vm = MockVm::new();
        vm.disconnect();
        let err = vm
            .create_event_request(EventRequest::new(EventKind::Breakpoint))
            .unwrap_err();
        assert!(err.is_disconnect());
    }

    #[test]
    fn enabled_request_cannot_change_policy() {
        let vm = MockVm::new();
        let id = vm
            .create_event_request(EventRequest::new(EventKind::Breakpoint).enabled(true))
            .unwrap();
        assert!(matches!(
            vm.set_request_suspend_policy(id, SuspendPolicy::None),
            Err(JdwpError::InvalidRequestState(_))
        ));
        vm.set_request_enabled(id, false).unwrap();
        vm.set_request_suspend_policy(id, SuspendPolicy::None)
            .unwrap();
        assert_eq!(vm.request(id).unwrap().suspend_policy, SuspendPolicy::None);
    }

    #[test]
    fn line_lookup_respects_debug_info() {
        let vm = MockVm::new();
        vm.load_class(
            MockClass::new(1, "a.B")
                .source_path("a/B.java")
                .method(7, "run", &[], Some(12)),
        );
        vm.load_class(MockClass::new(2, "a.C").without_debug_info());

        assert_eq!(vm.locations_of_line(1, None, 12).unwrap().len(), 1);
        assert_eq!(vm.locations_of_line(1, Some("B.java"), 12).unwrap().len(), 1);
        assert!(vm.locations_of_line(1, Some("C.java"), 12).unwrap().is_empty());
        assert!(vm.locations_of_line(1, None, 13).unwrap().is_empty());
        assert!(matches!(
            vm.locations_of_line(2, None, 1),
            Err(JdwpError::AbsentInformation(_))
        ));
    }
}
