use std::sync::Arc;

use nova_config::DebuggerConfig;
use nova_jdwp::{FieldInfo, Location, ObjectRef, SuspendPolicy};

use crate::breakpoint::{
    Breakpoint, BreakpointKind, ClassBreakpoint, ExceptionBreakpoint, InstanceWatchBreakpoint,
    LineBreakpoint, LocationBreakpoint, MethodBreakpoint, ThreadBreakpoint, TraceBreakpoint,
    UncaughtExceptionBreakpoint, WatchBreakpoint,
};
use crate::condition::{Condition, ExpressionCondition, HitCountCondition, HitCountKind};
use crate::error::{BreakpointError, ResolveError};
use crate::group::BreakpointGroup;
use crate::monitor::{ExpressionMonitor, Monitor};
use crate::pattern::ClassPattern;
use crate::policy_from_config;

/// Where the user currently is, for specs that leave out the class name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DebuggingContext {
    pub class_name: Option<String>,
}

impl DebuggingContext {
    pub fn at_class(class_name: impl Into<String>) -> Self {
        Self {
            class_name: Some(class_name.into()),
        }
    }
}

/// Builds breakpoints, groups, conditions and monitors.
///
/// Every breakpoint created here starts out with the factory's default
/// suspend policy.
#[derive(Clone, Copy, Debug)]
pub struct BreakpointFactory {
    default_suspend_policy: SuspendPolicy,
}

impl Default for BreakpointFactory {
    fn default() -> Self {
        Self::new(SuspendPolicy::All)
    }
}

impl BreakpointFactory {
    pub fn new(default_suspend_policy: SuspendPolicy) -> Self {
        Self {
            default_suspend_policy,
        }
    }

    pub fn from_config(config: &DebuggerConfig) -> Self {
        Self::new(policy_from_config(config.default_suspend_policy))
    }

    pub fn default_suspend_policy(&self) -> SuspendPolicy {
        self.default_suspend_policy
    }

    fn finish(&self, kind: BreakpointKind) -> Breakpoint {
        let mut bp = Breakpoint::new(kind);
        bp.set_suspend_policy(self.default_suspend_policy);
        bp
    }

    pub fn create_line(&self, class: &str, line: u32) -> Result<Breakpoint, BreakpointError> {
        // The source file of a named class is unknown until the VM reports it.
        let bp = LineBreakpoint::new(ClassPattern::parse(class)?, line)?;
        Ok(self.finish(BreakpointKind::Line(bp)))
    }

    /// Line breakpoint on a source file; `package` is the package the file
    /// declares, if known.
    pub fn create_source_line(
        &self,
        url: &str,
        package: Option<&str>,
        line: u32,
    ) -> Result<Breakpoint, BreakpointError> {
        let bp = LineBreakpoint::for_source(url, package, line)?;
        Ok(self.finish(BreakpointKind::Line(bp)))
    }

    pub fn create_method(
        &self,
        class: &str,
        method: &str,
        parameters: Vec<String>,
    ) -> Result<Breakpoint, BreakpointError> {
        let bp = MethodBreakpoint::new(ClassPattern::parse(class)?, method, parameters)?;
        Ok(self.finish(BreakpointKind::Method(bp)))
    }

    pub fn create_exception(
        &self,
        class: &str,
        caught: bool,
        uncaught: bool,
    ) -> Result<Breakpoint, BreakpointError> {
        let bp = ExceptionBreakpoint::new(ClassPattern::parse(class)?, caught, uncaught);
        Ok(self.finish(BreakpointKind::Exception(bp)))
    }

    pub fn create_watch(
        &self,
        class: &str,
        field: &str,
        access: bool,
        modify: bool,
    ) -> Result<Breakpoint, BreakpointError> {
        let bp = WatchBreakpoint::new(ClassPattern::parse(class)?, field, access, modify)?;
        Ok(self.finish(BreakpointKind::Watch(bp)))
    }

    /// Watch `field` on one object only. Dropped when the debuggee goes away.
    pub fn create_instance_watch(
        &self,
        field: FieldInfo,
        object: ObjectRef,
        access: bool,
        modify: bool,
    ) -> Breakpoint {
        self.finish(BreakpointKind::InstanceWatch(InstanceWatchBreakpoint::new(
            field, object, access, modify,
        )))
    }

    pub fn create_location(&self, location: Location) -> Breakpoint {
        self.finish(BreakpointKind::Location(LocationBreakpoint::new(location)))
    }

    pub fn create_thread(&self, on_start: bool, on_death: bool) -> Breakpoint {
        self.finish(BreakpointKind::Thread(ThreadBreakpoint::new(on_start, on_death)))
    }

    pub fn create_class(&self, on_prepare: bool, on_unload: bool) -> Breakpoint {
        self.finish(BreakpointKind::Class(ClassBreakpoint::new(on_prepare, on_unload)))
    }

    pub fn create_trace(&self, on_enter: bool, on_exit: bool) -> Breakpoint {
        self.finish(BreakpointKind::Trace(TraceBreakpoint::new(on_enter, on_exit)))
    }

    pub fn create_uncaught(&self) -> Breakpoint {
        self.finish(BreakpointKind::UncaughtException(UncaughtExceptionBreakpoint))
    }

    pub fn create_group(&self, name: &str) -> Result<BreakpointGroup, BreakpointError> {
        BreakpointGroup::new(name)
    }

    pub fn create_expression_condition(&self, expression: &str) -> Result<Arc<dyn Condition>, BreakpointError> {
        if expression.trim().is_empty() {
            return Err(BreakpointError::Empty("condition expression"));
        }
        Ok(Arc::new(ExpressionCondition::new(expression.trim())))
    }

    pub fn create_hit_count_condition(&self, kind: HitCountKind, value: u64) -> Arc<dyn Condition> {
        Arc::new(HitCountCondition::new(kind, value))
    }

    pub fn create_expression_monitor(&self, expression: &str) -> Result<Arc<dyn Monitor>, BreakpointError> {
        if expression.trim().is_empty() {
            return Err(BreakpointError::Empty("monitor expression"));
        }
        Ok(Arc::new(ExpressionMonitor::new(expression.trim())))
    }

    /// Parse a `[class-or-file:]line` or `[class:]method[(args)]` spec.
    ///
    /// Without a class, the class of `context` is used; if there is none the
    /// spec is ambiguous.
    pub fn create_breakpoint(
        &self,
        spec: &str,
        context: Option<&DebuggingContext>,
    ) -> Result<Breakpoint, BreakpointError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(BreakpointError::Empty("breakpoint spec"));
        }
        // Only a colon ahead of the argument list separates class and member.
        let head_len = spec.find('(').unwrap_or(spec.len());
        let (prefix, member) = match spec[..head_len].rfind(':') {
            Some(idx) => (Some(spec[..idx].trim()), spec[idx + 1..].trim()),
            None => (None, spec),
        };

        if !member.is_empty() && member.bytes().all(|b| b.is_ascii_digit()) {
            let line = member
                .parse::<u32>()
                .ok()
                .filter(|line| *line > 0)
                .ok_or_else(|| ResolveError::InvalidLineNumber(member.to_string()))?;
            return match prefix {
                Some(path) if is_file_path(path) => self.create_source_line(path, None, line),
                Some(class) => self.create_line(class, line),
                None => self.create_line(context_class(spec, context)?, line),
            };
        }

        let class = match prefix {
            Some(class) => class,
            None => context_class(spec, context)?,
        };
        // Validate the class before the member so the first error reported
        // is the leftmost one.
        ClassPattern::parse(class)?;
        let (name, parameters) = parse_method(member)?;
        self.create_method(class, name, parameters)
    }

    /// Command-line form: an optional `go` (never suspend) or `thread`
    /// (suspend the event thread only) prefix followed by a spec.
    pub fn parse_command(
        &self,
        command: &str,
        context: Option<&DebuggingContext>,
    ) -> Result<Breakpoint, BreakpointError> {
        let command = command.trim();
        let (policy, spec) = match command.split_once(char::is_whitespace) {
            Some(("go", rest)) => (Some(SuspendPolicy::None), rest),
            Some(("thread", rest)) => (Some(SuspendPolicy::EventThread), rest),
            _ => (None, command),
        };
        let mut bp = self.create_breakpoint(spec, context)?;
        if let Some(policy) = policy {
            bp.set_suspend_policy(policy);
        }
        Ok(bp)
    }
}

fn is_file_path(prefix: &str) -> bool {
    prefix.contains('/') || prefix.contains('\\') || prefix.ends_with(".java")
}

fn context_class<'a>(
    spec: &str,
    context: Option<&'a DebuggingContext>,
) -> Result<&'a str, ResolveError> {
    context
        .and_then(|ctx| ctx.class_name.as_deref())
        .ok_or_else(|| ResolveError::AmbiguousClassSpec(spec.to_string()))
}

/// `name` or `name(type, type)`.
fn parse_method(member: &str) -> Result<(&str, Vec<String>), ResolveError> {
    let malformed = || ResolveError::MalformedMemberName(member.to_string());
    let (name, parameters) = match member.split_once('(') {
        Some((name, rest)) => {
            let args = rest.strip_suffix(')').ok_or_else(malformed)?;
            let parameters = args
                .split(',')
                .map(str::trim)
                .filter(|arg| !arg.is_empty())
                .map(str::to_string)
                .collect();
            (name.trim(), parameters)
        }
        None => (member, Vec::new()),
    };
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(malformed());
    }
    Ok((name, parameters))
}
