// tests/common/mod.rs
#![allow(dead_code)] // Not every test file uses every helper

use flow_engine::{
  stateless, task_fn, Context, ErrorDescriptor, FlowConfig, FlowHandle, FlowOptions, FlowStatus, Listener,
  SharedTaskFactory,
};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::Level;

// --- Execution trace shared between tasks and assertions ---
#[derive(Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&self, entry: impl Into<String>) {
    self.0.lock().push(entry.into());
  }

  pub fn entries(&self) -> Vec<String> {
    self.0.lock().clone()
  }

  pub fn count(&self, entry: &str) -> usize {
    self.0.lock().iter().filter(|e| e.as_str() == entry).count()
  }
}

fn label(props: &Value) -> String {
  props.get("label").and_then(Value::as_str).unwrap_or("?").to_string()
}

// --- Common Task Creators ---

/// `log`: records its `label` and proceeds.
pub fn log_task(trace: &Trace) -> SharedTaskFactory {
  let trace = trace.clone();
  stateless(task_fn(move |props: Value, _ctx: Context, flow: FlowHandle| {
    let trace = trace.clone();
    async move {
      trace.push(label(&props));
      flow.proceed();
    }
  }))
}

/// `fail`: records its `label` (if any) and fails with `{ name, message }`.
pub fn fail_task(trace: &Trace) -> SharedTaskFactory {
  let trace = trace.clone();
  stateless(task_fn(move |props: Value, _ctx: Context, flow: FlowHandle| {
    let trace = trace.clone();
    async move {
      if props.get("label").is_some() {
        trace.push(label(&props));
      }
      flow.fail(ErrorDescriptor::from_value(&props));
    }
  }))
}

/// `write`: sets `value` at context path `path` and proceeds.
pub fn write_task() -> SharedTaskFactory {
  stateless(task_fn(|props: Value, ctx: Context, flow: FlowHandle| async move {
    let path = props.get("path").and_then(Value::as_str).unwrap_or("out");
    let value = props.get("value").cloned().unwrap_or(Value::Null);
    match ctx.set(path, value) {
      Ok(()) => {
        flow.proceed();
      }
      Err(err) => {
        flow.fail(ErrorDescriptor::new("ContextError", err.to_string()));
      }
    }
  }))
}

/// Options resolving `log`, `fail` and `write` to the recording tasks.
pub fn recording_options(trace: &Trace) -> FlowOptions {
  FlowOptions::new()
    .with_task("log", log_task(trace))
    .with_task("fail", fail_task(trace))
    .with_task("write", write_task())
}

pub fn config(value: Value) -> FlowConfig {
  FlowConfig::from_value(value).expect("test configuration must parse")
}

/// Listener appending the event name to `trace`.
pub fn recording_listener(trace: &Trace, entry: &str) -> Listener {
  let trace = trace.clone();
  let entry = entry.to_string();
  Listener::new(move |_ctx| {
    let trace = trace.clone();
    let entry = entry.clone();
    async move {
      trace.push(entry);
      Ok(())
    }
  })
}

pub async fn run_flow(value: Value, options: FlowOptions) -> (Result<FlowStatus, ErrorDescriptor>, Context) {
  let ctx = Context::new();
  let result = flow_engine::Flow::new(config(value), ctx.clone(), options).run().await;
  (result, ctx)
}

// --- Helper for Tracing Setup ---
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
