// flow_engine/examples/basic_assembly.rs

use flow_engine::{stateless, task_fn, Context, FlowHandle, FlowOptions, FlowRunner, TemplateResolver};
use serde_json::{json, Value};
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
  info!("--- Basic Assembly Example ---");

  // 1. Application task types
  let log = stateless(task_fn(|props: Value, _ctx: Context, flow: FlowHandle| async move {
    info!("log step: {}", props.get("message").cloned().unwrap_or(serde_json::Value::Null));
    flow.proceed();
  }));
  let set_header = stateless(task_fn(|props: Value, ctx: Context, flow: FlowHandle| async move {
    let name = props.get("name").and_then(Value::as_str).unwrap_or("x-unnamed");
    let value = props.get("value").cloned().unwrap_or(Value::Null);
    match ctx.set(&format!("message.headers.{}", name), value) {
      Ok(()) => flow.proceed(),
      Err(e) => flow.fail(e.to_string()),
    };
  }));

  let options = FlowOptions::new()
    .with_task("log", log)
    .with_task("set-header", set_header)
    .with_param_resolver(TemplateResolver);

  // 2. The assembly: branch on the request, then set a header from context
  let runner = match FlowRunner::from_value(
    json!({ "assembly": { "execute": [
      { "log": { "message": "request for $(request.path)" } },
      { "switch": { "case": [
        { "condition": "request.verb == 'POST'", "execute": [ { "log": { "message": "write path" } } ] },
        { "otherwise": [ { "log": { "message": "read path" } } ] }
      ] } },
      { "set-header": { "name": "x-client", "value": "$(client.id)" } }
    ] } }),
    options,
  ) {
    Ok(runner) => runner,
    Err(e) => {
      info!("invalid assembly: {}", e);
      return;
    }
  };

  // 3. One run per request, each with its own context
  for verb in ["GET", "POST"] {
    let ctx = Context::new();
    let _ = ctx.set("request", json!({ "verb": verb, "path": "/orders" }));
    let _ = ctx.set("client.id", "acme");

    match runner.run(ctx.clone()).await {
      Ok(status) => info!("{} finished with {:?}, headers = {:?}", verb, status, ctx.get("message.headers")),
      Err(e) => info!("{} aborted: {}", verb, e),
    }
  }
}
