//! Debuggee connection façade for Nova's breakpoint engine.
//!
//! `nova-breakpoints` consumes this crate to talk to a running JVM. The model
//! mirrors the JDI view of JDWP: event requests are created against the
//! connection, scoped with [`EventModifier`]s, enabled/disabled, and deleted;
//! the VM later reports [`JdwpEvent`]s that carry the id of the request that
//! produced them.
//!
//! The transport itself is out of scope here. [`VirtualMachine`] is the seam a
//! wire client plugs into, and [`MockVm`] is a deterministic in-memory
//! implementation used by tests.

mod mock;
mod poison;

use std::fmt;

use thiserror::Error;

pub use mock::{MockClass, MockVm};

pub type ThreadId = u64;
pub type ObjectId = u64;
pub type ReferenceTypeId = u64;
pub type MethodId = u64;
pub type FieldId = u64;

/// Identifier of an event request registered with the debuggee.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub i32);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which debuggee threads are suspended when a request's event fires.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SuspendPolicy {
    None,
    EventThread,
    #[default]
    All,
}

impl SuspendPolicy {
    /// JDWP `SuspendPolicy` constant.
    pub fn as_jdwp(self) -> u8 {
        match self {
            SuspendPolicy::None => 0,
            SuspendPolicy::EventThread => 1,
            SuspendPolicy::All => 2,
        }
    }

    pub fn from_jdwp(value: u8) -> Option<Self> {
        match value {
            0 => Some(SuspendPolicy::None),
            1 => Some(SuspendPolicy::EventThread),
            2 => Some(SuspendPolicy::All),
            _ => None,
        }
    }
}

/// Event kinds the breakpoint engine subscribes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Breakpoint,
    Exception,
    ThreadStart,
    ThreadDeath,
    ClassPrepare,
    ClassUnload,
    FieldAccess,
    FieldModification,
    MethodEntry,
    MethodExit,
}

impl EventKind {
    /// JDWP `EventKind` constant.
    pub fn as_jdwp(self) -> u8 {
        match self {
            EventKind::Breakpoint => 2,
            EventKind::Exception => 4,
            EventKind::ThreadStart => 6,
            EventKind::ThreadDeath => 7,
            EventKind::ClassPrepare => 8,
            EventKind::ClassUnload => 9,
            EventKind::FieldAccess => 20,
            EventKind::FieldModification => 21,
            EventKind::MethodEntry => 40,
            EventKind::MethodExit => 41,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub class_id: ReferenceTypeId,
    pub method_id: MethodId,
    pub index: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassInfo {
    pub type_id: ReferenceTypeId,
    /// Binary name with dots, e.g. `com.example.Main$Inner`.
    pub name: String,
    pub prepared: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodInfo {
    pub method_id: MethodId,
    pub name: String,
    /// JNI signature, e.g. `(ILjava/lang/String;)V`.
    pub signature: String,
    /// Declared argument types as source-level names (`int`, `java.lang.String`).
    pub argument_type_names: Vec<String>,
    /// First executable location; `None` for abstract and native methods.
    pub location: Option<Location>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldInfo {
    pub field_id: FieldId,
    pub declaring_type: ReferenceTypeId,
    pub name: String,
    pub type_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRef {
    pub id: ObjectId,
    pub runtime_type: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum JdwpValue {
    Null,
    Void,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    String(String),
    Object(ObjectRef),
}

impl JdwpValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            JdwpValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for JdwpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JdwpValue::Null => f.write_str("null"),
            JdwpValue::Void => f.write_str("void"),
            JdwpValue::Boolean(v) => write!(f, "{v}"),
            JdwpValue::Byte(v) => write!(f, "{v}"),
            JdwpValue::Short(v) => write!(f, "{v}"),
            JdwpValue::Int(v) => write!(f, "{v}"),
            JdwpValue::Long(v) => write!(f, "{v}"),
            JdwpValue::Float(v) => write!(f, "{v}"),
            JdwpValue::Double(v) => write!(f, "{v}"),
            JdwpValue::Char(v) => write!(f, "'{v}'"),
            JdwpValue::String(v) => write!(f, "\"{v}\""),
            JdwpValue::Object(obj) => write!(f, "{}@{}", obj.runtime_type, obj.id),
        }
    }
}

/// Source-level view of a [`Location`], used to describe events to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocationInfo {
    pub class_name: String,
    pub method_name: String,
    pub method_signature: String,
    pub argument_type_names: Vec<String>,
    pub source_path: Option<String>,
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrameInfo {
    pub name: String,
    pub source_path: Option<String>,
    pub line: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub can_watch_field_access: bool,
    pub can_watch_field_modification: bool,
    pub can_use_source_name_filters: bool,
    pub can_get_method_return_values: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            can_watch_field_access: true,
            can_watch_field_modification: true,
            can_use_source_name_filters: true,
            can_get_method_return_values: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventModifier {
    ThreadOnly {
        thread: ThreadId,
    },
    /// Restrict to classes whose name matches `pattern` (leading or trailing `*`).
    ClassMatch {
        pattern: String,
    },
    ClassExclude {
        pattern: String,
    },
    LocationOnly {
        location: Location,
    },
    ExceptionOnly {
        exception_or_null: Option<ReferenceTypeId>,
        caught: bool,
        uncaught: bool,
    },
    FieldOnly {
        declaring_type: ReferenceTypeId,
        field_id: FieldId,
    },
    InstanceOnly {
        object: ObjectId,
    },
    SourceNameMatch {
        pattern: String,
    },
}

/// Parameters for a new event request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRequest {
    pub kind: EventKind,
    pub suspend_policy: SuspendPolicy,
    pub modifiers: Vec<EventModifier>,
    pub enabled: bool,
}

impl EventRequest {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            suspend_policy: SuspendPolicy::All,
            modifiers: Vec::new(),
            enabled: false,
        }
    }

    pub fn suspend_policy(mut self, policy: SuspendPolicy) -> Self {
        self.suspend_policy = policy;
        self
    }

    pub fn modifier(mut self, modifier: EventModifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn location(&self) -> Option<Location> {
        self.modifiers.iter().find_map(|m| match m {
            EventModifier::LocationOnly { location } => Some(*location),
            _ => None,
        })
    }

    pub fn class_patterns(&self) -> impl Iterator<Item = &str> {
        self.modifiers.iter().filter_map(|m| match m {
            EventModifier::ClassMatch { pattern } => Some(pattern.as_str()),
            _ => None,
        })
    }

    pub fn source_name_patterns(&self) -> impl Iterator<Item = &str> {
        self.modifiers.iter().filter_map(|m| match m {
            EventModifier::SourceNameMatch { pattern } => Some(pattern.as_str()),
            _ => None,
        })
    }
}

/// An event reported by the debuggee.
#[derive(Clone, Debug, PartialEq)]
pub enum JdwpEvent {
    Breakpoint {
        request_id: RequestId,
        thread: ThreadId,
        location: Location,
    },
    ClassPrepare {
        request_id: RequestId,
        thread: ThreadId,
        class: ClassInfo,
    },
    ClassUnload {
        request_id: RequestId,
        class_name: String,
    },
    Exception {
        request_id: RequestId,
        thread: ThreadId,
        location: Location,
        exception: ObjectRef,
        catch_location: Option<Location>,
    },
    FieldAccess {
        request_id: RequestId,
        thread: ThreadId,
        location: Location,
        field: FieldInfo,
        object: Option<ObjectId>,
    },
    FieldModification {
        request_id: RequestId,
        thread: ThreadId,
        location: Location,
        field: FieldInfo,
        object: Option<ObjectId>,
        value: JdwpValue,
    },
    ThreadStart {
        request_id: RequestId,
        thread: ThreadId,
    },
    ThreadDeath {
        request_id: RequestId,
        thread: ThreadId,
    },
    MethodEntry {
        request_id: RequestId,
        thread: ThreadId,
        location: Location,
    },
    MethodExit {
        request_id: RequestId,
        thread: ThreadId,
        location: Location,
        return_value: Option<JdwpValue>,
    },
    VmDisconnected,
}

impl JdwpEvent {
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            JdwpEvent::Breakpoint { request_id, .. }
            | JdwpEvent::ClassPrepare { request_id, .. }
            | JdwpEvent::ClassUnload { request_id, .. }
            | JdwpEvent::Exception { request_id, .. }
            | JdwpEvent::FieldAccess { request_id, .. }
            | JdwpEvent::FieldModification { request_id, .. }
            | JdwpEvent::ThreadStart { request_id, .. }
            | JdwpEvent::ThreadDeath { request_id, .. }
            | JdwpEvent::MethodEntry { request_id, .. }
            | JdwpEvent::MethodExit { request_id, .. } => Some(*request_id),
            JdwpEvent::VmDisconnected => None,
        }
    }

    pub fn kind(&self) -> Option<EventKind> {
        Some(match self {
            JdwpEvent::Breakpoint { .. } => EventKind::Breakpoint,
            JdwpEvent::ClassPrepare { .. } => EventKind::ClassPrepare,
            JdwpEvent::ClassUnload { .. } => EventKind::ClassUnload,
            JdwpEvent::Exception { .. } => EventKind::Exception,
            JdwpEvent::FieldAccess { .. } => EventKind::FieldAccess,
            JdwpEvent::FieldModification { .. } => EventKind::FieldModification,
            JdwpEvent::ThreadStart { .. } => EventKind::ThreadStart,
            JdwpEvent::ThreadDeath { .. } => EventKind::ThreadDeath,
            JdwpEvent::MethodEntry { .. } => EventKind::MethodEntry,
            JdwpEvent::MethodExit { .. } => EventKind::MethodExit,
            JdwpEvent::VmDisconnected => return None,
        })
    }

    /// Thread the event happened in, if the event is thread-scoped.
    pub fn thread(&self) -> Option<ThreadId> {
        match self {
            JdwpEvent::Breakpoint { thread, .. }
            | JdwpEvent::ClassPrepare { thread, .. }
            | JdwpEvent::Exception { thread, .. }
            | JdwpEvent::FieldAccess { thread, .. }
            | JdwpEvent::FieldModification { thread, .. }
            | JdwpEvent::ThreadStart { thread, .. }
            | JdwpEvent::ThreadDeath { thread, .. }
            | JdwpEvent::MethodEntry { thread, .. }
            | JdwpEvent::MethodExit { thread, .. } => Some(*thread),
            JdwpEvent::ClassUnload { .. } | JdwpEvent::VmDisconnected => None,
        }
    }

    /// Code location of the event, for events that are "locatable" in JDI terms.
    pub fn location(&self) -> Option<Location> {
        match self {
            JdwpEvent::Breakpoint { location, .. }
            | JdwpEvent::Exception { location, .. }
            | JdwpEvent::FieldAccess { location, .. }
            | JdwpEvent::FieldModification { location, .. }
            | JdwpEvent::MethodEntry { location, .. }
            | JdwpEvent::MethodExit { location, .. } => Some(*location),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum JdwpError {
    #[error("debuggee VM is disconnected")]
    VmDisconnected,
    #[error("JDWP operation not implemented")]
    NotImplemented,
    #[error("debug information is absent for {0}")]
    AbsentInformation(String),
    #[error("class {0} is not prepared")]
    ClassNotPrepared(ReferenceTypeId),
    #[error("object {0} has been collected")]
    ObjectCollected(ObjectId),
    #[error("event request {0} is in an invalid state")]
    InvalidRequestState(RequestId),
    #[error("unknown reference type {0}")]
    InvalidClass(ReferenceTypeId),
    #[error("unknown thread {0}")]
    InvalidThread(ThreadId),
    #[error("JDWP command failed with error code {error_code}")]
    CommandFailed { error_code: u16 },
    #[error("{0}")]
    Other(String),
}

impl JdwpError {
    /// Connection-lost faults are expected during teardown races.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, JdwpError::VmDisconnected)
    }
}

/// Mock-friendly interface to a live debuggee.
///
/// Methods take `&self`: implementations are shared between the event loop
/// and whichever thread mutates breakpoints, so they synchronise internally.
pub trait VirtualMachine: Send + Sync {
    fn create_event_request(&self, request: EventRequest) -> Result<RequestId, JdwpError>;
    fn delete_event_request(&self, id: RequestId) -> Result<(), JdwpError>;
    fn set_request_enabled(&self, id: RequestId, enabled: bool) -> Result<(), JdwpError>;
    fn is_request_enabled(&self, id: RequestId) -> Result<bool, JdwpError>;
    fn set_request_suspend_policy(
        &self,
        id: RequestId,
        policy: SuspendPolicy,
    ) -> Result<(), JdwpError>;

    fn all_classes(&self) -> Result<Vec<ClassInfo>, JdwpError>;
    /// Classes with exactly this name; one per defining class loader.
    fn classes_by_name(&self, name: &str) -> Result<Vec<ClassInfo>, JdwpError>;
    fn methods(&self, class: ReferenceTypeId) -> Result<Vec<MethodInfo>, JdwpError>;
    fn fields(&self, class: ReferenceTypeId) -> Result<Vec<FieldInfo>, JdwpError>;
    fn nested_types(&self, class: ReferenceTypeId) -> Result<Vec<ClassInfo>, JdwpError>;
    fn source_paths(&self, class: ReferenceTypeId) -> Result<Vec<String>, JdwpError>;
    fn locations_of_line(
        &self,
        class: ReferenceTypeId,
        source_name: Option<&str>,
        line: u32,
    ) -> Result<Vec<Location>, JdwpError>;
    fn location_info(&self, location: Location) -> Result<LocationInfo, JdwpError>;

    fn capabilities(&self) -> Capabilities;

    fn thread_name(&self, thread: ThreadId) -> Result<String, JdwpError>;
    fn stack_frames(&self, thread: ThreadId) -> Result<Vec<StackFrameInfo>, JdwpError>;

    /// Evaluate `expression` in the top frame of a suspended `thread`.
    fn evaluate(&self, _thread: ThreadId, _expression: &str) -> Result<JdwpValue, JdwpError> {
        Err(JdwpError::NotImplemented)
    }

    /// Resume the threads suspended by the last delivered event set.
    fn resume(&self) -> Result<(), JdwpError>;
}

/// JDWP `ClassMatch` semantics: a single leading or trailing `*`.
pub fn class_pattern_matches(pattern: &str, class_name: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        class_name.ends_with(suffix)
    } else if let Some(prefix) = pattern.strip_suffix('*') {
        class_name.starts_with(prefix)
    } else {
        class_name == pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_match_patterns_follow_jdwp_rules() {
        assert!(class_pattern_matches("*", "a.B"));
        assert!(class_pattern_matches("*Foo", "a.b.Foo"));
        assert!(!class_pattern_matches("*Foo", "a.b.Foobar"));
        assert!(class_pattern_matches("com.x.*", "com.x.Y"));
        assert!(!class_pattern_matches("com.x.*", "com.y.Y"));
        assert!(class_pattern_matches("com.x.Y", "com.x.Y"));
        assert!(!class_pattern_matches("com.x.Y", "com.x.YZ"));
    }

    #[test]
    fn suspend_policy_round_trips_jdwp_constants() {
        for policy in [
            SuspendPolicy::None,
            SuspendPolicy::EventThread,
            SuspendPolicy::All,
        ] {
            assert_eq!(SuspendPolicy::from_jdwp(policy.as_jdwp()), Some(policy));
        }
        assert_eq!(SuspendPolicy::from_jdwp(7), None);
    }

    #[test]
    fn events_expose_request_thread_and_location() {
        let location = Location {
            class_id: 1,
            method_id: 2,
            index: 3,
        };
        let event = JdwpEvent::Breakpoint {
            request_id: RequestId(9),
            thread: 4,
            location,
        };
        assert_eq!(event.request_id(), Some(RequestId(9)));
        assert_eq!(event.thread(), Some(4));
        assert_eq!(event.location(), Some(location));
        assert_eq!(event.kind(), Some(EventKind::Breakpoint));
        assert_eq!(JdwpEvent::VmDisconnected.request_id(), None);
    }
}
