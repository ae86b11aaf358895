// flow_engine/src/core/params.rs

//! Parameter resolution over step configuration trees.

use crate::core::assembly::{CATCH_KEY, EXECUTE_KEY};
use crate::core::context::Context;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Resolves one primitive leaf of a step configuration.
///
/// `key` is the mapping key holding the leaf, or the array index (as a
/// string) for array elements.
pub trait ParamResolver: Send + Sync {
  fn resolve(&self, ctx: &Context, key: &str, value: Value) -> Value;
}

impl<F> ParamResolver for F
where
  F: Fn(&Context, &str, Value) -> Value + Send + Sync,
{
  fn resolve(&self, ctx: &Context, key: &str, value: Value) -> Value {
    self(ctx, key, value)
  }
}

pub type SharedParamResolver = Arc<dyn ParamResolver>;

/// Produces a resolved copy of `config`.
///
/// Without a resolver the input comes back unchanged. `execute` and `catch`
/// entries are structural and copied through as-is at every depth. A
/// configuration that is not a mapping has no keys and is returned unchanged.
pub fn resolve_params(resolver: Option<&dyn ParamResolver>, ctx: &Context, config: &Value) -> Value {
  match (resolver, config) {
    (Some(resolver), Value::Object(map)) => Value::Object(resolve_map(resolver, ctx, map)),
    _ => config.clone(),
  }
}

fn resolve_map(resolver: &dyn ParamResolver, ctx: &Context, map: &Map<String, Value>) -> Map<String, Value> {
  map
    .iter()
    .map(|(key, value)| {
      let resolved = if key == EXECUTE_KEY || key == CATCH_KEY {
        value.clone()
      } else {
        resolve_value(resolver, ctx, key, value)
      };
      (key.clone(), resolved)
    })
    .collect()
}

fn resolve_value(resolver: &dyn ParamResolver, ctx: &Context, key: &str, value: &Value) -> Value {
  match value {
    Value::Object(map) => Value::Object(resolve_map(resolver, ctx, map)),
    Value::Array(items) => Value::Array(
      items
        .iter()
        .enumerate()
        .map(|(idx, item)| resolve_value(resolver, ctx, &idx.to_string(), item))
        .collect(),
    ),
    primitive => resolver.resolve(ctx, key, primitive.clone()),
  }
}

/// Replaces `$(path)` placeholders in string leaves with context values.
///
/// A string that is exactly one placeholder takes the raw value at `path`
/// (so numbers and mappings keep their type); otherwise values are rendered
/// into the string, missing ones as empty text. `$$(` yields a literal `$(`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateResolver;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
  Literal(String),
  Placeholder(String),
}

fn parse_template(input: &str) -> Vec<Segment> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.chars().peekable();

  while let Some(c) = chars.next() {
    if c != '$' {
      literal.push(c);
      continue;
    }
    match chars.peek().copied() {
      Some('$') if chars.clone().nth(1) == Some('(') => {
        chars.next();
        literal.push('$');
      }
      Some('(') => {
        chars.next();
        let mut name = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
          if c == ')' {
            closed = true;
            break;
          }
          name.push(c);
        }
        if closed && !name.is_empty() {
          if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
          }
          segments.push(Segment::Placeholder(name));
        } else {
          literal.push_str("$(");
          literal.push_str(&name);
          if closed {
            literal.push(')');
          }
        }
      }
      _ => literal.push('$'),
    }
  }
  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }
  segments
}

fn render(value: Option<Value>) -> String {
  match value {
    None | Some(Value::Null) => String::new(),
    Some(Value::String(s)) => s,
    Some(other) => other.to_string(),
  }
}

impl TemplateResolver {
  pub fn expand(&self, ctx: &Context, text: &str) -> Value {
    let segments = parse_template(text);
    if let [Segment::Placeholder(path)] = segments.as_slice() {
      return ctx.get(path).unwrap_or(Value::String(String::new()));
    }
    let mut out = String::with_capacity(text.len());
    for segment in segments {
      match segment {
        Segment::Literal(s) => out.push_str(&s),
        Segment::Placeholder(path) => out.push_str(&render(ctx.get(&path))),
      }
    }
    Value::String(out)
  }
}

impl ParamResolver for TemplateResolver {
  fn resolve(&self, ctx: &Context, _key: &str, value: Value) -> Value {
    match value {
      Value::String(text) if text.contains('$') => self.expand(ctx, &text),
      other => other,
    }
  }
}
