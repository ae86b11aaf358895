// tests/builtin_tasks_tests.rs
mod common;
use common::*;
use flow_engine::{
  ConditionEvaluator, Context, DefaultEvaluator, Flow, FlowOptions, FlowStatus, TaskRegistry,
};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;

#[test]
fn test_default_evaluator() {
  setup_tracing();
  let ctx = Context::new();
  ctx.set("request.verb", "GET").unwrap();
  ctx.set("flags.on", true).unwrap();
  ctx.set("count", 0).unwrap();
  let eval = DefaultEvaluator;

  assert!(eval.evaluate(&json!(true), &ctx).unwrap());
  assert!(!eval.evaluate(&json!("false"), &ctx).unwrap());
  assert!(eval.evaluate(&json!("flags.on"), &ctx).unwrap());
  assert!(!eval.evaluate(&json!("count"), &ctx).unwrap());
  assert!(!eval.evaluate(&json!("missing.path"), &ctx).unwrap());
  assert!(eval.evaluate(&json!("!missing.path"), &ctx).unwrap());
  assert!(eval.evaluate(&json!("request.verb == 'GET'"), &ctx).unwrap());
  assert!(eval.evaluate(&json!("request.verb != \"POST\""), &ctx).unwrap());
  assert!(eval.evaluate(&json!("count == 0"), &ctx).unwrap());

  assert!(eval.evaluate(&json!(""), &ctx).is_err());
  assert!(eval.evaluate(&json!("a == 'b"), &ctx).is_err());
  assert!(eval.evaluate(&json!("a and b"), &ctx).is_err());
  assert!(eval.evaluate(&json!({ "x": 1 }), &ctx).is_err());
}

#[tokio::test]
#[serial]
async fn test_if_runs_nested_assembly_when_condition_holds() {
  setup_tracing();
  let trace = Trace::new();
  let ctx = Context::new();
  ctx.set("request.verb", "POST").unwrap();
  let result = Flow::new(
    config(json!({ "assembly": { "execute": [
      { "if": { "condition": "request.verb == 'POST'", "execute": [ { "log": { "label": "post" } } ] } },
      { "if": { "condition": "request.verb == 'GET'", "execute": [ { "log": { "label": "get" } } ] } },
      { "log": { "label": "end" } }
    ] } })),
    ctx,
    recording_options(&trace),
  )
  .run()
  .await;

  assert_eq!(result, Ok(FlowStatus::Completed));
  assert_eq!(trace.entries(), vec!["post", "end"]);
}

#[tokio::test]
#[serial]
async fn test_if_condition_uses_resolved_parameters() {
  setup_tracing();
  let trace = Trace::new();
  let ctx = Context::new();
  ctx.set("enabled", "true").unwrap();
  let result = Flow::new(
    config(json!({ "assembly": { "execute": [
      { "if": { "condition": "$(enabled)", "execute": [ { "log": { "label": "on" } } ] } }
    ] } })),
    ctx,
    recording_options(&trace).with_param_resolver(flow_engine::TemplateResolver),
  )
  .run()
  .await;

  assert_eq!(result, Ok(FlowStatus::Completed));
  assert_eq!(trace.entries(), vec!["on"]);
}

#[tokio::test]
#[serial]
async fn test_switch_takes_first_matching_case() {
  setup_tracing();
  let trace = Trace::new();
  let ctx = Context::new();
  ctx.set("tier", "gold").unwrap();
  let result = Flow::new(
    config(json!({ "assembly": { "execute": [
      { "switch": { "case": [
        { "condition": "tier == 'silver'", "execute": [ { "log": { "label": "silver" } } ] },
        { "condition": "tier == 'gold'", "execute": [ { "log": { "label": "gold" } } ] },
        { "condition": "tier", "execute": [ { "log": { "label": "any" } } ] },
        { "otherwise": [ { "log": { "label": "otherwise" } } ] }
      ] } },
      { "switch": { "case": [
        { "condition": "tier == 'bronze'", "execute": [ { "log": { "label": "bronze" } } ] },
        { "otherwise": [ { "log": { "label": "fallback" } } ] }
      ] } },
      { "switch": { "case": [ { "condition": false, "execute": [ { "log": { "label": "never" } } ] } ] } },
      { "log": { "label": "end" } }
    ] } })),
    ctx,
    recording_options(&trace),
  )
  .run()
  .await;

  assert_eq!(result, Ok(FlowStatus::Completed));
  assert_eq!(trace.entries(), vec!["gold", "fallback", "end"]);
}

#[tokio::test]
#[serial]
async fn test_switch_evaluation_error_is_runtime_error() {
  setup_tracing();
  let trace = Trace::new();
  let (result, ctx) = run_flow(
    json!({ "assembly": {
      "execute": [ { "switch": { "case": [ { "condition": "a and b", "execute": [ { "log": { "label": "x" } } ] } ] } } ],
      "catch": [ { "errors": ["RuntimeError"], "execute": [ { "log": { "label": "caught" } } ] } ]
    }}),
    recording_options(&trace),
  )
  .await;

  assert_eq!(result, Ok(FlowStatus::Completed));
  assert_eq!(trace.entries(), vec!["caught"]);
  assert_eq!(ctx.error().map(|e| e.name), Some("RuntimeError".to_string()));
}

#[tokio::test]
#[serial]
async fn test_custom_condition_evaluator() {
  setup_tracing();
  let trace = Trace::new();
  let registry = TaskRegistry::with_condition_evaluator(Arc::new(
    |condition: &serde_json::Value, _ctx: &Context| -> anyhow::Result<bool> { Ok(condition == "always") },
  ));
  let options = recording_options(&trace).with_registry(registry);
  let (result, _ctx) = run_flow(
    json!({ "assembly": { "execute": [
      { "if": { "condition": "always", "execute": [ { "log": { "label": "yes" } } ] } },
      { "if": { "condition": "true", "execute": [ { "log": { "label": "no" } } ] } }
    ] } }),
    options,
  )
  .await;

  assert_eq!(result, Ok(FlowStatus::Completed));
  assert_eq!(trace.entries(), vec!["yes"]);
}

#[tokio::test]
#[serial]
async fn test_operation_switch() {
  setup_tracing();
  let trace = Trace::new();
  let assembly = json!({ "assembly": { "execute": [
    { "operation-switch": {
      "case": [
        { "operations": ["getOrder", "listOrders"], "execute": [ { "log": { "label": "read" } } ] },
        { "operations": ["createOrder"], "execute": [ { "log": { "label": "write" } } ] }
      ],
      "otherwise": [ { "log": { "label": "other" } } ]
    } },
    { "operation-switch": {
      "operation-path": "api.op",
      "case": [ { "operations": [7], "execute": [ { "log": { "label": "seven" } } ] } ]
    } },
    { "log": { "label": "end" } }
  ] } });

  for (operation, expected) in [
    ("listOrders", vec!["read", "seven", "end"]),
    ("createOrder", vec!["write", "seven", "end"]),
    ("deleteOrder", vec!["other", "seven", "end"]),
  ] {
    let trace_run = Trace::new();
    let ctx = Context::new();
    ctx.set("operation.id", operation).unwrap();
    ctx.set("api.op", 7).unwrap();
    let result = Flow::new(config(assembly.clone()), ctx, recording_options(&trace_run)).run().await;
    assert_eq!(result, Ok(FlowStatus::Completed));
    assert_eq!(trace_run.entries(), expected);
  }

  // No operation id in context: skipped.
  let (result, _ctx) = run_flow(assembly, recording_options(&trace)).await;
  assert_eq!(result, Ok(FlowStatus::Completed));
  assert_eq!(trace.entries(), vec!["end"]);
}

#[tokio::test]
#[serial]
async fn test_throw_fails_with_configured_descriptor() {
  setup_tracing();
  let trace = Trace::new();
  let (result, _ctx) = run_flow(
    json!({ "assembly": { "execute": [ { "throw": { "name": "Forbidden", "message": "no access" } } ] } }),
    recording_options(&trace),
  )
  .await;

  let err = result.unwrap_err();
  assert_eq!(err.name, "Forbidden");
  assert_eq!(err.message, "no access");
}

#[tokio::test]
#[serial]
async fn test_call_runs_nested_pipeline_then_proceeds() {
  setup_tracing();
  let trace = Trace::new();
  let (result, _ctx) = run_flow(
    json!({ "assembly": { "execute": [
      { "call": { "execute": [ { "log": { "label": "inner-1" } }, { "log": { "label": "inner-2" } } ] } },
      { "call": { "execute": [] } },
      { "log": { "label": "outer" } }
    ] } }),
    recording_options(&trace),
  )
  .await;

  assert_eq!(result, Ok(FlowStatus::Completed));
  assert_eq!(trace.entries(), vec!["inner-1", "inner-2", "outer"]);
}

#[tokio::test]
#[serial]
async fn test_malformed_builtin_configuration_aborts() {
  setup_tracing();
  let trace = Trace::new();
  let (result, _ctx) = run_flow(
    json!({ "assembly": {
      "execute": [ { "log": { "label": "a" } }, { "if": { "condition": true } } ],
      "catch": [ { "default": [ { "log": { "label": "G" } } ] } ]
    }}),
    recording_options(&trace),
  )
  .await;

  assert_eq!(result.map_err(|e| e.name), Err("ConfigurationError".to_string()));
  assert_eq!(trace.entries(), vec!["a"]);
}

#[tokio::test]
#[serial]
async fn test_registry_without_builtins() {
  setup_tracing();
  let registry = TaskRegistry::empty();
  assert!(registry.builtin_kinds().is_empty());
  assert!(registry.resolve("if").is_err());

  let defaults = TaskRegistry::new();
  assert_eq!(defaults.builtin_kinds(), vec!["call", "if", "operation-switch", "switch", "throw"]);

  let (result, _ctx) = run_flow(
    json!({ "assembly": { "execute": [ { "throw": { "name": "x" } } ] } }),
    FlowOptions::new().with_registry(TaskRegistry::empty()),
  )
  .await;
  assert_eq!(result.map_err(|e| e.name), Err("ConfigurationError".to_string()));
}
