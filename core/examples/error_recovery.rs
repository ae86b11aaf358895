// flow_engine/examples/error_recovery.rs

use flow_engine::{stateless, task_fn, Context, FlowHandle, FlowOptions, FlowRunner, TemplateResolver};
use serde_json::{json, Value};
use tracing::{info, warn};

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
  info!("--- Error Recovery Example ---");

  let log = stateless(task_fn(|props: Value, _ctx: Context, flow: FlowHandle| async move {
    info!("{}", props.get("message").and_then(serde_json::Value::as_str).unwrap_or_default());
    flow.proceed();
  }));
  let options = FlowOptions::new().with_task("log", log).with_param_resolver(TemplateResolver);

  // Scenario 1: the step catch handles the failure, then the flow continues
  info!("\nScenario 1: step-level catch");
  run(
    json!({ "assembly": { "execute": [
      { "throw": { "name": "RateLimited", "message": "too many requests", "catch": [
        { "errors": ["RateLimited"], "execute": [ { "log": { "message": "recovered: $(error.message)" } } ] }
      ] } },
      { "log": { "message": "continuing after the step catch" } }
    ] } }),
    options.clone(),
  )
  .await;

  // Scenario 2: a failure deep in nested pipelines unwinds to the global catch
  info!("\nScenario 2: global catch");
  run(
    json!({ "assembly": {
      "execute": [
        { "call": { "execute": [
          { "call": { "execute": [ { "throw": { "name": "BackendDown" } } ] } },
          { "log": { "message": "never reached" } }
        ] } }
      ],
      "catch": [
        { "errors": ["BackendDown"], "execute": [ { "log": { "message": "global handler for $(error.name)" } } ] }
      ]
    } }),
    options.clone(),
  )
  .await;

  // Scenario 3: nothing matches, the flow aborts
  info!("\nScenario 3: unhandled failure");
  run(
    json!({ "assembly": {
      "execute": [ { "throw": { "name": "Unexpected" } } ],
      "catch": [ { "errors": ["Other"], "execute": [] } ]
    } }),
    options,
  )
  .await;
}

async fn run(config: Value, options: FlowOptions) {
  let runner = match FlowRunner::from_value(config, options) {
    Ok(runner) => runner,
    Err(e) => {
      warn!("invalid assembly: {}", e);
      return;
    }
  };
  match runner.run(Context::new()).await {
    Ok(status) => info!("finished with {:?}", status),
    Err(e) => warn!("aborted with {}: {}", e.name, e.message),
  }
}
