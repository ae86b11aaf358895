// flow_engine/src/core/property.rs

//! The property tree behind [`Context`](crate::Context).
//!
//! Everything here runs under the context's lock, so computed properties are
//! never invoked from this module: lookups and writes that hit a getter or a
//! setter hand it back to the caller, which runs it once the lock is released.

use crate::error::ContextError;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type Getter = Arc<dyn Fn() -> Value + Send + Sync>;
pub type Setter = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Clone)]
pub(crate) struct Computed {
  pub(crate) getter: Getter,
  pub(crate) setter: Option<Setter>,
  pub(crate) configurable: bool,
}

pub(crate) enum Slot {
  Branch(Namespace),
  Data(Value),
  Computed(Computed),
}

pub(crate) struct Property {
  slot: Slot,
  read_only: bool,
}

impl Property {
  fn data(value: Value, read_only: bool) -> Self {
    Self {
      slot: Slot::Data(value),
      read_only,
    }
  }

  fn branch() -> Self {
    Self {
      slot: Slot::Branch(Namespace::default()),
      read_only: false,
    }
  }
}

#[derive(Default)]
pub(crate) struct Namespace {
  props: HashMap<String, Property>,
}

impl fmt::Debug for Namespace {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut keys: Vec<&String> = self.props.keys().collect();
    keys.sort();
    f.debug_struct("Namespace").field("keys", &keys).finish()
  }
}

/// A getter still to be run, and where its value goes in the looked-up value.
pub(crate) struct Pending {
  pub(crate) pointer: Vec<String>,
  pub(crate) getter: Getter,
}

pub(crate) enum Lookup {
  Missing,
  /// A value, possibly with computed leaves to fill in.
  Found { value: Value, pending: Vec<Pending> },
  /// The path runs through a computed property; the rest is applied to its value.
  Through { getter: Getter, rest: Vec<String> },
}

pub(crate) enum Write {
  Done,
  CallSetter(Setter, Value),
}

impl Namespace {
  pub(crate) fn lookup(&self, segments: &[String]) -> Lookup {
    let mut node = self;
    for (idx, seg) in segments.iter().enumerate() {
      let Some(prop) = node.props.get(seg) else {
        return Lookup::Missing;
      };
      let rest = &segments[idx + 1..];
      match &prop.slot {
        Slot::Branch(ns) if !rest.is_empty() => node = ns,
        Slot::Branch(ns) => {
          let mut pending = Vec::new();
          let value = ns.materialize(&mut Vec::new(), &mut pending);
          return Lookup::Found { value, pending };
        }
        Slot::Data(value) => {
          return match descend(value, rest) {
            Some(v) => Lookup::Found {
              value: v.clone(),
              pending: Vec::new(),
            },
            None => Lookup::Missing,
          };
        }
        Slot::Computed(computed) => {
          return Lookup::Through {
            getter: computed.getter.clone(),
            rest: rest.to_vec(),
          };
        }
      }
    }
    // Empty path: the whole namespace.
    let mut pending = Vec::new();
    let value = self.materialize(&mut Vec::new(), &mut pending);
    Lookup::Found { value, pending }
  }

  fn materialize(&self, prefix: &mut Vec<String>, pending: &mut Vec<Pending>) -> Value {
    let mut map = Map::new();
    for (key, prop) in &self.props {
      prefix.push(key.clone());
      let value = match &prop.slot {
        Slot::Branch(ns) => ns.materialize(prefix, pending),
        Slot::Data(v) => v.clone(),
        Slot::Computed(c) => {
          pending.push(Pending {
            pointer: prefix.clone(),
            getter: c.getter.clone(),
          });
          Value::Null
        }
      };
      prefix.pop();
      map.insert(key.clone(), value);
    }
    Value::Object(map)
  }

  pub(crate) fn set(&mut self, segments: &[String], value: Value, read_only: bool) -> Result<Write, ContextError> {
    let (last, parents) = segments.split_last().ok_or(ContextError::EmptyPath)?;
    let mut node = self;
    for (idx, seg) in parents.iter().enumerate() {
      let prop = node.props.entry(seg.clone()).or_insert_with(Property::branch);
      match &mut prop.slot {
        Slot::Branch(ns) => node = ns,
        Slot::Data(data) => {
          // Read-only protects the binding, not the contents of a mapping.
          let rest = &segments[idx + 1..];
          assign(data, rest, value).map_err(|_| ContextError::NotAMapping {
            path: segments[..=idx].join("."),
          })?;
          return Ok(Write::Done);
        }
        Slot::Computed(_) => {
          return Err(ContextError::NotAMapping {
            path: segments[..=idx].join("."),
          })
        }
      }
    }

    if let Some(prop) = node.props.get(last) {
      if prop.read_only {
        return Err(ContextError::ReadOnly {
          path: segments.join("."),
        });
      }
      if let Slot::Computed(computed) = &prop.slot {
        return match &computed.setter {
          Some(setter) => Ok(Write::CallSetter(setter.clone(), value)),
          None => Err(ContextError::ReadOnly {
            path: segments.join("."),
          }),
        };
      }
    }
    node.props.insert(last.clone(), Property::data(value, read_only));
    Ok(Write::Done)
  }

  pub(crate) fn delete(&mut self, segments: &[String]) -> Result<bool, ContextError> {
    let (last, parents) = segments.split_last().ok_or(ContextError::EmptyPath)?;
    let mut node = self;
    for (idx, seg) in parents.iter().enumerate() {
      let Some(prop) = node.props.get_mut(seg) else {
        return Ok(false);
      };
      match &mut prop.slot {
        Slot::Branch(ns) => node = ns,
        Slot::Data(data) => return Ok(remove(data, &segments[idx + 1..])),
        Slot::Computed(_) => return Ok(false),
      }
    }

    let blocked = match node.props.get(last) {
      None => return Ok(false),
      Some(prop) if prop.read_only => Some(ContextError::ReadOnly {
        path: segments.join("."),
      }),
      Some(Property {
        slot: Slot::Computed(c),
        ..
      }) if !c.configurable => Some(ContextError::NotConfigurable {
        path: segments.join("."),
      }),
      Some(_) => None,
    };
    match blocked {
      Some(err) => Err(err),
      None => Ok(node.props.remove(last).is_some()),
    }
  }

  pub(crate) fn define(&mut self, segments: &[String], computed: Computed) -> Result<(), ContextError> {
    let (last, parents) = segments.split_last().ok_or(ContextError::EmptyPath)?;
    let mut node = self;
    for (idx, seg) in parents.iter().enumerate() {
      let prop = node.props.entry(seg.clone()).or_insert_with(Property::branch);
      match &mut prop.slot {
        Slot::Branch(ns) => node = ns,
        _ => {
          return Err(ContextError::NotAMapping {
            path: segments[..=idx].join("."),
          })
        }
      }
    }

    if let Some(prop) = node.props.get(last) {
      if prop.read_only {
        return Err(ContextError::ReadOnly {
          path: segments.join("."),
        });
      }
      if let Slot::Computed(existing) = &prop.slot {
        if !existing.configurable {
          return Err(ContextError::NotConfigurable {
            path: segments.join("."),
          });
        }
      }
    }
    node.props.insert(
      last.clone(),
      Property {
        slot: Slot::Computed(computed),
        read_only: false,
      },
    );
    Ok(())
  }
}

pub(crate) fn descend<'a>(value: &'a Value, segments: &[String]) -> Option<&'a Value> {
  segments.iter().try_fold(value, |node, seg| match node {
    Value::Object(map) => map.get(seg),
    Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
    _ => None,
  })
}

/// Writes `value` at `segments` inside a plain JSON value, creating
/// intermediate objects. Fails when a non-mapping is in the way.
fn assign(target: &mut Value, segments: &[String], value: Value) -> Result<(), ()> {
  let Some((last, parents)) = segments.split_last() else {
    *target = value;
    return Ok(());
  };
  let mut node = target;
  for seg in parents {
    let Value::Object(map) = node else {
      return Err(());
    };
    node = map.entry(seg.clone()).or_insert_with(|| Value::Object(Map::new()));
  }
  match node {
    Value::Object(map) => {
      map.insert(last.clone(), value);
      Ok(())
    }
    _ => Err(()),
  }
}

fn remove(target: &mut Value, segments: &[String]) -> bool {
  let Some((last, parents)) = segments.split_last() else {
    return false;
  };
  let mut node = target;
  for seg in parents {
    match node {
      Value::Object(map) => match map.get_mut(seg) {
        Some(next) => node = next,
        None => return false,
      },
      _ => return false,
    }
  }
  match node {
    Value::Object(map) => map.remove(last).is_some(),
    _ => false,
  }
}

/// Fills computed leaves into a materialized value.
pub(crate) fn fill(mut value: Value, pending: Vec<Pending>) -> Value {
  for Pending { pointer, getter } in pending {
    let computed = getter();
    if pointer.is_empty() {
      value = computed;
      continue;
    }
    let _ = assign(&mut value, &pointer, computed);
  }
  value
}
