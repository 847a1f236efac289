use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::monitor::HitContext;

/// Predicate gating whether a hit actually stops.
pub trait Condition: Send + Sync + fmt::Debug {
    fn is_satisfied(&self, ctx: &HitContext<'_>) -> Result<bool, EvalError>;

    fn describe(&self) -> String;

    /// `None` for conditions that cannot be persisted.
    fn config(&self) -> Option<ConditionConfig> {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitCountKind {
    Equal,
    Greater,
    MultipleOf,
}

/// Serialized form of the built-in conditions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionConfig {
    Expression { expression: String },
    HitCount { kind: HitCountKind, value: u64 },
}

impl ConditionConfig {
    pub fn build(&self) -> Arc<dyn Condition> {
        match self {
            ConditionConfig::Expression { expression } => {
                Arc::new(ExpressionCondition::new(expression.clone()))
            }
            ConditionConfig::HitCount { kind, value } => {
                Arc::new(HitCountCondition::new(*kind, *value))
            }
        }
    }
}

/// Boolean expression evaluated in the event thread.
#[derive(Clone, Debug)]
pub struct ExpressionCondition {
    expression: String,
}

impl ExpressionCondition {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl Condition for ExpressionCondition {
    fn is_satisfied(&self, ctx: &HitContext<'_>) -> Result<bool, EvalError> {
        let thread = ctx.thread()?;
        let value = ctx.vm.evaluate(thread, &self.expression)?;
        value.as_bool().ok_or_else(|| EvalError::NotBoolean {
            expression: self.expression.clone(),
            value: value.to_string(),
        })
    }

    fn describe(&self) -> String {
        self.expression.clone()
    }

    fn config(&self) -> Option<ConditionConfig> {
        Some(ConditionConfig::Expression {
            expression: self.expression.clone(),
        })
    }
}

/// Compares the breakpoint's hit count with a fixed value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HitCountCondition {
    kind: HitCountKind,
    value: u64,
}

impl HitCountCondition {
    pub fn new(kind: HitCountKind, value: u64) -> Self {
        Self { kind, value }
    }

    pub fn kind(&self) -> HitCountKind {
        self.kind
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn matches(&self, hit_count: u64) -> bool {
        match self.kind {
            HitCountKind::Equal => hit_count == self.value,
            HitCountKind::Greater => hit_count > self.value,
            HitCountKind::MultipleOf => self.value != 0 && hit_count % self.value == 0,
        }
    }
}

impl Condition for HitCountCondition {
    fn is_satisfied(&self, ctx: &HitContext<'_>) -> Result<bool, EvalError> {
        Ok(self.matches(ctx.hit_count))
    }

    fn describe(&self) -> String {
        let op = match self.kind {
            HitCountKind::Equal => "==",
            HitCountKind::Greater => ">",
            HitCountKind::MultipleOf => "multiple of",
        };
        format!("hit count {op} {}", self.value)
    }

    fn config(&self) -> Option<ConditionConfig> {
        Some(ConditionConfig::HitCount {
            kind: self.kind,
            value: self.value,
        })
    }
}
