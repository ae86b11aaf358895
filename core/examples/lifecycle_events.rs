// flow_engine/examples/lifecycle_events.rs

use flow_engine::{events, stateless, task_fn, Context, FlowHandle, FlowOptions, FlowRunner, Listener};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
  info!("--- Lifecycle Events Example ---");

  // A task that hands part of its work to a nested pipeline, then finishes.
  let wrap = stateless(task_fn(|props: Value, _ctx: Context, flow: FlowHandle| async move {
    let pipeline = match flow_engine::Pipeline::from_value(&props) {
      Ok(pipeline) => pipeline,
      Err(e) => {
        flow.fail(e);
        return;
      }
    };
    info!(step = flow.step_kind(), "entering nested pipeline");
    if flow.invoke(pipeline).await.is_ok() {
      info!(step = flow.step_kind(), "nested pipeline resumed us");
      flow.proceed();
    }
  }));
  let noop = stateless(task_fn(|_props: Value, _ctx: Context, flow: FlowHandle| async move {
    flow.proceed();
  }));
  let options = FlowOptions::new().with_task("wrap", wrap).with_task("noop", noop);

  let runner = match FlowRunner::from_value(
    json!({ "assembly": { "execute": [
      { "noop": {} },
      { "wrap": { "execute": [ { "noop": {} }, { "noop": {} } ] } }
    ] } }),
    options,
  ) {
    Ok(runner) => runner,
    Err(e) => {
      info!("invalid assembly: {}", e);
      return;
    }
  };

  let ctx = Context::new();
  let flow = runner.flow(ctx.clone());
  let started = Instant::now();

  for event in [
    events::START.to_string(),
    events::pre("noop"),
    events::post("noop"),
    events::pre("wrap"),
    events::post("wrap"),
    events::FINISH.to_string(),
  ] {
    let name = event.clone();
    flow.subscribe(
      event,
      Listener::new(move |_ctx| {
        let name = name.clone();
        async move {
          info!("[{:>6}us] {}", started.elapsed().as_micros(), name);
          Ok(())
        }
      }),
    );
  }

  // Application events on the context observer work the same way.
  ctx.subscribe(
    "audit",
    Listener::new(|ctx: Context| async move {
      info!("audit: flow finished, snapshot = {}", ctx.snapshot());
      Ok(())
    }),
  );

  match flow.run().await {
    Ok(status) => info!("finished with {:?}", status),
    Err(e) => info!("aborted: {}", e),
  }
  let _ = ctx.notify("audit").await;
}
