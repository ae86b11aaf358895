// tests/recovery_tests.rs
mod common;
use common::*;
use flow_engine::{events, Context, Flow, FlowStatus};
use serde_json::json;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn test_global_catch_recovers_main_failure() {
  setup_tracing();
  let trace = Trace::new();
  let (result, ctx) = run_flow(
    json!({ "assembly": {
      "execute": [
        { "log": { "label": "A" } },
        { "throw": { "name": "boom" } },
        { "log": { "label": "skipped" } }
      ],
      "catch": [ { "errors": ["boom"], "execute": [ { "log": { "label": "B" } } ] } ]
    }}),
    recording_options(&trace),
  )
  .await;

  assert_eq!(result, Ok(FlowStatus::Completed));
  assert_eq!(trace.entries(), vec!["A", "B"]);
  assert_eq!(ctx.error().map(|e| e.name), Some("boom".to_string()));
  assert_eq!(ctx.get("error.name"), Some(json!("boom")));
}

#[tokio::test]
#[serial]
async fn test_uncaught_failure_aborts_with_descriptor() {
  setup_tracing();
  let trace = Trace::new();
  let options = recording_options(&trace);
  let ctx = flow_engine::Context::new();
  let flow = flow_engine::Flow::new(
    config(json!({ "assembly": {
      "execute": [ { "fail": { "name": "nope", "message": "not handled" } }, { "log": { "label": "never" } } ],
      "catch": [ { "errors": ["other"], "execute": [ { "log": { "label": "G" } } ] } ]
    }})),
    ctx,
    options,
  );
  flow.subscribe(events::ERROR, recording_listener(&trace, "ERROR"));
  flow.subscribe(events::FINISH, recording_listener(&trace, "FINISH"));

  let err = flow.run().await.expect_err("flow should abort");
  assert_eq!(err.name, "nope");
  assert_eq!(err.message, "not handled");
  assert_eq!(trace.entries(), vec!["ERROR"]);
}

#[tokio::test]
#[serial]
async fn test_step_catch_is_tried_before_global_catch() {
  setup_tracing();
  let trace = Trace::new();
  let (result, _ctx) = run_flow(
    json!({ "assembly": {
      "execute": [
        { "fail": { "name": "x", "catch": [ { "errors": ["x"], "execute": [ { "log": { "label": "policy" } } ] } ] } },
        { "log": { "label": "next" } }
      ],
      "catch": [ { "default": [ { "log": { "label": "global" } } ] } ]
    }}),
    recording_options(&trace),
  )
  .await;

  assert_eq!(result, Ok(FlowStatus::Completed));
  // The recovered step counts as done; the flow continues after it.
  assert_eq!(trace.entries(), vec!["policy", "next"]);
}

#[tokio::test]
#[serial]
async fn test_nearest_handler_wins_over_global() {
  setup_tracing();
  let trace = Trace::new();
  // main ⊃ S1 ⊃ S2 ⊃ S3; S3 fails with "b", the step in S2 that invoked S3
  // declares a catch for "a", "b" and "c".
  let (result, ctx) = run_flow(
    json!({ "assembly": {
      "execute": [
        { "call": { "execute": [
          { "call": { "execute": [
            { "log": { "label": "s2" } },
            { "call": {
              "execute": [ { "throw": { "name": "b" } }, { "log": { "label": "s3-rest" } } ],
              "catch": [ { "errors": ["a", "b", "c"], "execute": [ { "log": { "label": "L2" } } ] } ]
            } },
            { "log": { "label": "s2-rest" } }
          ] } }
        ] } },
        { "log": { "label": "main-rest" } }
      ],
      "catch": [ { "errors": ["b"], "execute": [ { "log": { "label": "G" } } ] } ]
    }}),
    recording_options(&trace),
  )
  .await;

  assert_eq!(result, Ok(FlowStatus::Completed));
  assert_eq!(trace.entries(), vec!["s2", "L2", "s2-rest", "main-rest"]);
  assert_eq!(trace.count("G"), 0);
  assert_eq!(ctx.error().map(|e| e.name), Some("b".to_string()));
}

#[tokio::test]
#[serial]
async fn test_step_catch_fires_once_per_step() {
  setup_tracing();
  let trace = Trace::new();
  // The step-level handler fails with the same error; it must not be retried.
  let (result, _ctx) = run_flow(
    json!({ "assembly": {
      "execute": [
        { "fail": { "name": "x", "catch": [ { "errors": ["x"], "execute": [
          { "log": { "label": "policy" } },
          { "throw": { "name": "x" } }
        ] } ] } },
        { "log": { "label": "never" } }
      ],
      "catch": [ { "errors": ["x"], "execute": [ { "log": { "label": "global" } } ] } ]
    }}),
    recording_options(&trace),
  )
  .await;

  assert_eq!(result, Ok(FlowStatus::Completed));
  assert_eq!(trace.entries(), vec!["policy", "global"]);
}

#[tokio::test]
#[serial]
async fn test_step_catch_exhausted_aborts_without_global() {
  setup_tracing();
  let trace = Trace::new();
  let (result, _ctx) = run_flow(
    json!({ "assembly": {
      "execute": [
        { "fail": { "name": "x", "catch": [ { "errors": ["x"], "execute": [
          { "log": { "label": "policy" } },
          { "throw": { "name": "x" } }
        ] } ] } }
      ]
    }}),
    recording_options(&trace),
  )
  .await;

  assert_eq!(result.map_err(|e| e.name), Err("x".to_string()));
  assert_eq!(trace.entries(), vec!["policy"]);
}

#[tokio::test]
#[serial]
async fn test_failure_inside_global_handler_is_terminal() {
  setup_tracing();
  let trace = Trace::new();
  let (result, ctx) = run_flow(
    json!({ "assembly": {
      "execute": [ { "throw": { "name": "first" } } ],
      "catch": [ { "default": [ { "log": { "label": "G" } }, { "throw": { "name": "again" } } ] } ]
    }}),
    recording_options(&trace),
  )
  .await;

  assert_eq!(result.map_err(|e| e.name), Err("again".to_string()));
  assert_eq!(trace.entries(), vec!["G"]);
  assert_eq!(ctx.error().map(|e| e.name), Some("again".to_string()));
}

#[tokio::test]
#[serial]
async fn test_flow_catch_of_nested_pipeline_resumes_caller() {
  setup_tracing();
  let trace = Trace::new();
  let (result, _ctx) = run_flow(
    json!({ "assembly": {
      "execute": [
        { "call": { "pipeline": {
          "execute": [ { "throw": { "name": "inner" } }, { "log": { "label": "never" } } ],
          "catch": [ { "errors": ["inner"], "execute": [ { "log": { "label": "flow-handler" } } ] } ]
        } } },
        { "log": { "label": "after" } }
      ]
    }}),
    recording_options(&trace),
  )
  .await;

  assert_eq!(result, Ok(FlowStatus::Completed));
  assert_eq!(trace.entries(), vec!["flow-handler", "after"]);
}

#[tokio::test]
#[serial]
async fn test_unmatched_nested_failure_unwinds_to_global() {
  setup_tracing();
  let trace = Trace::new();
  let (result, _ctx) = run_flow(
    json!({ "assembly": {
      "execute": [
        { "call": { "pipeline": {
          "execute": [ { "call": { "execute": [ { "fail": { "name": "deep" } } ] } } ],
          "catch": [ { "errors": ["shallow"], "execute": [ { "log": { "label": "wrong" } } ] } ]
        } } },
        { "log": { "label": "never" } }
      ],
      "catch": [ { "errors": ["deep"], "execute": [ { "log": { "label": "G" } } ] } ]
    }}),
    recording_options(&trace),
  )
  .await;

  assert_eq!(result, Ok(FlowStatus::Completed));
  assert_eq!(trace.entries(), vec!["G"]);
}

#[tokio::test]
#[serial]
async fn test_cases_match_in_order_and_compare_raw_values() {
  setup_tracing();
  let trace = Trace::new();
  let (result, _ctx) = run_flow(
    json!({ "assembly": {
      "execute": [ { "fail": 404 } ],
      "catch": [
        { "errors": ["500"], "execute": [ { "log": { "label": "500" } } ] },
        { "errors": [404], "execute": [ { "log": { "label": "404" } } ] },
        { "default": [ { "log": { "label": "default" } } ] }
      ]
    }}),
    recording_options(&trace),
  )
  .await;

  assert_eq!(result, Ok(FlowStatus::Completed));
  assert_eq!(trace.entries(), vec!["404"]);
}

#[tokio::test]
#[serial]
async fn test_error_handler_reads_error_from_context() {
  setup_tracing();
  let trace = Trace::new();
  let options = recording_options(&trace).with_param_resolver(flow_engine::TemplateResolver);
  let (result, _ctx) = run_flow(
    json!({ "assembly": {
      "execute": [ { "throw": { "name": "Unauthorized", "message": "bad key" } } ],
      "catch": [ { "default": [ { "log": { "label": "handled $(error.name): $(error.message)" } } ] } ]
    }}),
    options,
  )
  .await;

  assert_eq!(result, Ok(FlowStatus::Completed));
  assert_eq!(trace.entries(), vec!["handled Unauthorized: bad key"]);
}

#[tokio::test]
#[serial]
async fn test_namespaced_context_handler_reads_error() {
  setup_tracing();
  let trace = Trace::new();
  let options = recording_options(&trace).with_param_resolver(flow_engine::TemplateResolver);
  let ctx = Context::with_namespace("fool");
  let result = Flow::new(
    config(json!({ "assembly": {
      "execute": [ { "throw": { "name": "boom" } } ],
      "catch": [ { "default": [ { "log": { "label": "got $(error.name)" } } ] } ]
    }})),
    ctx.clone(),
    options,
  )
  .run()
  .await;

  assert_eq!(result, Ok(FlowStatus::Completed));
  assert_eq!(trace.entries(), vec!["got boom"]);
  assert_eq!(ctx.get("error.name"), Some(json!("boom")));
}
