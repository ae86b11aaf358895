// flow_engine/src/conditional/evaluator.rs

//! Condition evaluation for the `if` and `switch` tasks.

use crate::core::context::Context;
use anyhow::{anyhow, bail};
use serde_json::Value;
use std::sync::Arc;

/// Decides whether a step condition holds against the current context.
///
/// An error fails the evaluating step with a `RuntimeError`.
pub trait ConditionEvaluator: Send + Sync {
  fn evaluate(&self, condition: &Value, ctx: &Context) -> anyhow::Result<bool>;
}

pub type SharedConditionEvaluator = Arc<dyn ConditionEvaluator>;

impl<F> ConditionEvaluator for F
where
  F: Fn(&Value, &Context) -> anyhow::Result<bool> + Send + Sync,
{
  fn evaluate(&self, condition: &Value, ctx: &Context) -> anyhow::Result<bool> {
    self(condition, ctx)
  }
}

/// Truthiness of a context value: `null`, `false`, `0` and `""` are false.
pub fn truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
    Value::String(s) => !s.is_empty(),
    Value::Array(_) | Value::Object(_) => true,
  }
}

/// A small expression language covering what assemblies usually need.
///
/// - booleans and numbers evaluate to themselves (non-zero is true),
/// - `"true"` / `"false"`,
/// - `!expr` negates,
/// - `lhs == rhs` and `lhs != rhs` compare operands,
/// - anything else is a context path whose value is tested for truthiness.
///
/// Operands are quoted strings (`'a'` or `"a"`), numbers, `true`, `false`,
/// `null`, or context paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEvaluator;

impl DefaultEvaluator {
  fn expression(&self, text: &str, ctx: &Context) -> anyhow::Result<bool> {
    let text = text.trim();
    if text.is_empty() {
      bail!("empty condition");
    }
    if let Some((lhs, rhs)) = text.split_once("!=") {
      return Ok(self.operand(lhs, ctx)? != self.operand(rhs, ctx)?);
    }
    if let Some((lhs, rhs)) = text.split_once("==") {
      return Ok(self.operand(lhs, ctx)? == self.operand(rhs, ctx)?);
    }
    if let Some(rest) = text.strip_prefix('!') {
      return Ok(!self.expression(rest, ctx)?);
    }
    Ok(truthy(&self.operand(text, ctx)?))
  }

  fn operand(&self, text: &str, ctx: &Context) -> anyhow::Result<Value> {
    let text = text.trim();
    if text.is_empty() {
      bail!("missing operand");
    }
    for quote in ['\'', '"'] {
      if let Some(inner) = text.strip_prefix(quote) {
        let inner = inner
          .strip_suffix(quote)
          .ok_or_else(|| anyhow!("unterminated string literal: {}", text))?;
        return Ok(Value::String(inner.to_string()));
      }
    }
    match text {
      "true" => return Ok(Value::Bool(true)),
      "false" => return Ok(Value::Bool(false)),
      "null" => return Ok(Value::Null),
      _ => {}
    }
    if let Ok(number) = serde_json::from_str::<serde_json::Number>(text) {
      return Ok(Value::Number(number));
    }
    if text.chars().any(char::is_whitespace) {
      bail!("unsupported expression: {}", text);
    }
    Ok(ctx.get(text).unwrap_or(Value::Null))
  }
}

impl ConditionEvaluator for DefaultEvaluator {
  fn evaluate(&self, condition: &Value, ctx: &Context) -> anyhow::Result<bool> {
    match condition {
      Value::Bool(b) => Ok(*b),
      Value::Number(_) => Ok(truthy(condition)),
      Value::String(text) => self.expression(text, ctx),
      Value::Null => bail!("missing condition"),
      other => bail!("unsupported condition: {}", other),
    }
  }
}

