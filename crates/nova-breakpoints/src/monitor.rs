use std::fmt;
use std::sync::Arc;

use nova_jdwp::{JdwpEvent, ThreadId, VirtualMachine};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::BreakpointId;

/// Everything a condition or monitor may look at when a breakpoint is hit.
pub struct HitContext<'a> {
    pub vm: &'a dyn VirtualMachine,
    pub event: &'a JdwpEvent,
    pub breakpoint: BreakpointId,
    /// Hit count of the breakpoint, already incremented for this event.
    pub hit_count: u64,
    pub output: &'a dyn OutputSink,
}

impl HitContext<'_> {
    pub fn thread(&self) -> Result<ThreadId, EvalError> {
        self.event.thread().ok_or(EvalError::NoThread)
    }
}

/// Where monitors write their output.
pub trait OutputSink: Send + Sync {
    fn write_line(&self, line: &str);

    fn beep(&self) {
        self.write_line("\u{7}");
    }
}

/// Default sink: monitor output becomes `info` records on
/// `nova.breakpoints.output`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingOutput;

impl OutputSink for TracingOutput {
    fn write_line(&self, line: &str) {
        tracing::info!(target: "nova.breakpoints.output", "{line}");
    }
}

/// Sink that keeps every line in memory (command-line front ends, tests).
#[derive(Debug, Default)]
pub struct BufferedOutput {
    lines: Mutex<Vec<String>>,
}

impl BufferedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock())
    }
}

impl OutputSink for BufferedOutput {
    fn write_line(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

/// Serialized form of the built-in monitors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorConfig {
    Beep,
    Expression { expression: String },
    StackTrace,
}

impl MonitorConfig {
    pub fn build(&self) -> Arc<dyn Monitor> {
        match self {
            MonitorConfig::Beep => Arc::new(BeepMonitor),
            MonitorConfig::Expression { expression } => {
                Arc::new(ExpressionMonitor::new(expression.clone()))
            }
            MonitorConfig::StackTrace => Arc::new(StackTraceMonitor),
        }
    }
}

/// Side effect run when a breakpoint stops.
pub trait Monitor: Send + Sync + fmt::Debug {
    fn perform(&self, ctx: &HitContext<'_>) -> Result<(), EvalError>;

    /// Monitors that inspect thread state need the event thread to stay
    /// suspended while they run.
    fn requires_thread(&self) -> bool {
        false
    }

    fn describe(&self) -> String;

    /// `None` for monitors that cannot be persisted.
    fn config(&self) -> Option<MonitorConfig> {
        None
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BeepMonitor;

impl Monitor for BeepMonitor {
    fn perform(&self, ctx: &HitContext<'_>) -> Result<(), EvalError> {
        ctx.output.beep();
        Ok(())
    }

    fn describe(&self) -> String {
        "beep".to_string()
    }

    fn config(&self) -> Option<MonitorConfig> {
        Some(MonitorConfig::Beep)
    }
}

/// Evaluates an expression in the event thread and prints the result.
#[derive(Clone, Debug)]
pub struct ExpressionMonitor {
    expression: String,
}

impl ExpressionMonitor {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl Monitor for ExpressionMonitor {
    fn perform(&self, ctx: &HitContext<'_>) -> Result<(), EvalError> {
        let thread = ctx.thread()?;
        let value = ctx.vm.evaluate(thread, &self.expression)?;
        ctx.output
            .write_line(&format!("{} = {}", self.expression, value));
        Ok(())
    }

    fn requires_thread(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("print {}", self.expression)
    }

    fn config(&self) -> Option<MonitorConfig> {
        Some(MonitorConfig::Expression {
            expression: self.expression.clone(),
        })
    }
}

/// Prints the event thread's call stack.
#[derive(Clone, Copy, Debug, Default)]
pub struct StackTraceMonitor;

impl Monitor for StackTraceMonitor {
    fn perform(&self, ctx: &HitContext<'_>) -> Result<(), EvalError> {
        let thread = ctx.thread()?;
        let frames = ctx.vm.stack_frames(thread)?;
        let name = ctx
            .vm
            .thread_name(thread)
            .unwrap_or_else(|_| format!("thread {thread}"));
        ctx.output.write_line(&format!("Stack trace of {name}:"));
        for frame in frames {
            let source = frame.source_path.as_deref().unwrap_or("Unknown Source");
            ctx.output
                .write_line(&format!("    at {} ({}:{})", frame.name, source, frame.line));
        }
        Ok(())
    }

    fn requires_thread(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        "print stack trace".to_string()
    }

    fn config(&self) -> Option<MonitorConfig> {
        Some(MonitorConfig::StackTrace)
    }
}
