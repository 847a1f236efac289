use std::path::PathBuf;

use nova_jdwp::JdwpError;
use thiserror::Error;

use crate::{BreakpointId, GroupId};

/// Failure to turn a breakpoint specification into event requests.
///
/// These are never fatal: the breakpoint stays unresolved and tries again the
/// next time a matching class is prepared.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("class name is required for `{0}`: no current location to take it from")]
    AmbiguousClassSpec(String),
    #[error("method {class}.{method} is overloaded; specify the parameter types")]
    AmbiguousMethod { class: String, method: String },
    #[error("malformed class name `{0}`")]
    MalformedClassName(String),
    #[error("malformed member name `{0}`")]
    MalformedMemberName(String),
    #[error("invalid parameter type `{0}`")]
    InvalidParameterType(String),
    #[error("invalid line number `{0}`")]
    InvalidLineNumber(String),
    #[error("no debug information available for {0}")]
    AbsentInformation(String),
    #[error("no method {method} in {class}")]
    NoSuchMethod { class: String, method: String },
    #[error("no field {field} in {class}")]
    NoSuchField { class: String, field: String },
    #[error("debuggee cannot {0}")]
    Unsupported(&'static str),
    #[error(transparent)]
    Jdwp(JdwpError),
}

impl ResolveError {
    /// Missing-member failures against one class do not stop resolution
    /// against other candidate classes.
    pub fn is_missing_member(&self) -> bool {
        matches!(
            self,
            ResolveError::NoSuchMethod { .. } | ResolveError::NoSuchField { .. }
        )
    }
}

impl From<JdwpError> for ResolveError {
    fn from(err: JdwpError) -> Self {
        match err {
            JdwpError::AbsentInformation(class) => ResolveError::AbsentInformation(class),
            other => ResolveError::Jdwp(other),
        }
    }
}

/// Precondition violations reported at the call site.
#[derive(Debug, Error)]
pub enum BreakpointError {
    #[error("unknown suspend policy `{0}` (expected all, thread or none)")]
    InvalidSuspendPolicy(String),
    #[error("{0} breakpoints do not support class filters")]
    ClassFilterNotSupported(&'static str),
    #[error("{0} breakpoints do not support thread filters")]
    ThreadFilterNotSupported(&'static str),
    #[error("line numbers start at 1")]
    InvalidLineNumber,
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("monitors that require a suspended thread cannot be attached to a group")]
    MonitorRequiresThread,
    #[error("the default group cannot be removed")]
    DefaultGroup,
    #[error("unknown {0}")]
    UnknownBreakpoint(BreakpointId),
    #[error("unknown {0}")]
    UnknownGroup(GroupId),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Condition or monitor evaluation failure.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("event is not associated with a thread")]
    NoThread,
    #[error("`{expression}` evaluated to {value}, expected a boolean")]
    NotBoolean { expression: String, value: String },
    #[error(transparent)]
    Jdwp(#[from] JdwpError),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to access breakpoint store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed breakpoint store contents: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid persisted breakpoint: {0}")]
    Invalid(#[source] BreakpointError),
}

/// Error carried by [`crate::BreakpointEvent::Error`] and friends.
#[derive(Debug, Error)]
pub enum Fault {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}
