// flow_engine/src/pipeline/execution.rs

//! The state machine driving a [`Flow`] to completion.
//!
//! Every step's task is spawned onto the runtime and reports back through a
//! one-shot [`Signal`]. The engine waits for that signal, or for the task to
//! end without sending one, and yields to the scheduler between transitions.

use crate::core::assembly::Step;
use crate::core::control::{events, FlowState, FlowStatus};
use crate::core::descriptor::ErrorDescriptor;
use crate::core::params::resolve_params;
use crate::error::{FlowError, FlowResult};
use crate::observer::NotifyControl;
use crate::pipeline::definition::Flow;
use crate::pipeline::frame::{FrameKind, NewFrame};
use crate::pipeline::handle::{FlowHandle, Signal};
use crate::pipeline::recovery::{recover, Recovery};
use crate::registry::SharedTaskFactory;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tracing::{event, info_span, instrument, Instrument, Level, Span};

/// Name of the error a step fails with when its task ends without signalling.
pub const TASK_ERROR: &str = "TaskError";

enum Wake {
  Signal(Option<Signal>),
  Finished(Result<(), JoinError>),
}

impl Flow {
  /// Runs the flow to its end.
  ///
  /// Resolves to the [`FlowStatus`] once the last frame completes (or a task
  /// stopped the flow), or to the [`ErrorDescriptor`] of the failure no catch
  /// clause recovered. Lifecycle events fire on the flow's observer and then
  /// on the context's. A failing listener is logged and never affects the run.
  #[instrument(
    name = "Flow::run",
    skip_all,
    fields(tid = self.id, steps = self.config.assembly.execute.len()),
    err(Display)
  )]
  pub async fn run(mut self) -> Result<FlowStatus, ErrorDescriptor> {
    self.span = Span::current();
    event!(Level::DEBUG, "Flow starting.");

    loop {
      tokio::task::yield_now().await;
      match self.state {
        FlowState::Init => self.init().await,
        FlowState::Running => self.step().await,
        FlowState::PrepareOutput => {
          self.state = FlowState::Done;
        }
        FlowState::Done => {
          self.emit(events::FINISH).await;
          event!(Level::INFO, status = ?self.status, "Flow finished.");
          return Ok(self.status);
        }
        FlowState::Abort => {
          self.stack.clear();
          self.emit(events::ERROR).await;
          return Err(
            self
              .error
              .take()
              .unwrap_or_else(|| ErrorDescriptor::internal("flow aborted without a recorded error")),
          );
        }
      }
    }
  }

  async fn init(&mut self) {
    let config = Arc::clone(&self.config);
    let main = &config.assembly;
    if main.execute.is_empty() {
      event!(Level::ERROR, "Main assembly has no steps.");
      return self.abort(FlowError::Configuration {
        message: "found no step in the main assembly".to_string(),
      });
    }

    let mut new_frame = NewFrame::new(FrameKind::Main, main.execute.clone(), None);
    new_frame.own_catch = main.catch.clone();
    new_frame.overrides = self.options.overrides.clone();
    self.stack.push(new_frame);

    self.emit(events::START).await;
    self.state = FlowState::Running;
  }

  async fn step(&mut self) {
    let current = self
      .stack
      .top_index()
      .zip(self.stack.top())
      .map(|(top_idx, frame)| (top_idx, frame.id, frame.task_index, Arc::clone(&frame.assembly)));
    let Some((top_idx, frame_id, index, assembly)) = current else {
      return self.abort(FlowError::Internal("running with an empty frame stack".to_string()));
    };
    match assembly.get(index) {
      Some(step) => self.execute_step(top_idx, frame_id, index, step).await,
      None => self.finish_frame().await,
    }
  }

  async fn execute_step(&mut self, top_idx: usize, frame_id: u64, index: usize, step: &Step) {
    let kind = step.kind();
    event!(Level::DEBUG, frame = frame_id, index, %kind, "Loading step.");

    let factory = match self.resolve_task(top_idx, kind) {
      Ok(factory) => factory,
      Err(err) => return self.abort(err),
    };
    let task = match factory.make(step.config()) {
      Ok(task) => task,
      Err(err) if err.is_configuration() => return self.abort(err),
      Err(err) => {
        event!(Level::WARN, %kind, error = %err, "Task could not be created.");
        return self.fail(err.into());
      }
    };

    let props = if task.skip_param_resolving() {
      step.config().clone()
    } else {
      let resolver = self.stack.param_resolver(top_idx);
      resolve_params(resolver.as_deref(), &self.context, step.config())
    };

    self.emit(&events::pre(kind)).await;

    let (sender, receiver) = oneshot::channel();
    let span = info_span!(parent: &self.span, "step", %kind, frame = frame_id, index);
    let handle = FlowHandle::new(kind, self.id, sender, self.observer.clone(), span.clone());
    let ctx = self.context.clone();
    let running = tokio::spawn(async move { task.execute(props, ctx, handle).await }.instrument(span));

    self.await_outcome(kind, receiver, Some(running)).await;
  }

  fn resolve_task(&self, from: usize, kind: &str) -> FlowResult<SharedTaskFactory> {
    match self.stack.task_override(from, kind) {
      Some(factory) => Ok(factory),
      None => self.options.registry.resolve(kind),
    }
  }

  /// Waits for the step's signal and acts on it.
  async fn await_outcome(
    &mut self,
    kind: &str,
    mut receiver: oneshot::Receiver<Signal>,
    mut running: Option<JoinHandle<()>>,
  ) {
    let outcome = loop {
      let wake = match running.as_mut() {
        Some(task) => tokio::select! {
          biased;
          signal = &mut receiver => Wake::Signal(signal.ok()),
          joined = task => Wake::Finished(joined),
        },
        None => Wake::Signal((&mut receiver).await.ok()),
      };
      match wake {
        Wake::Signal(Some(signal)) => break Ok(signal),
        Wake::Signal(None) => break Err(unsignalled(kind, running.take()).await),
        Wake::Finished(Err(err)) if err.is_panic() => break Err(panicked(kind)),
        // Clones of the handle may still signal.
        Wake::Finished(_) => running = None,
      }
    };

    match outcome {
      Ok(signal) => self.dispatch(kind, signal, running).await,
      Err(error) => self.fail(error),
    }
  }

  async fn dispatch(&mut self, kind: &str, signal: Signal, running: Option<JoinHandle<()>>) {
    match signal {
      Signal::Proceed => {
        if let Some(frame) = self.stack.top_mut() {
          frame.advance();
        }
        self.emit(&events::post(kind)).await;
      }
      Signal::Stop => {
        if let Some(frame) = self.stack.top_mut() {
          frame.advance();
        }
        event!(Level::INFO, %kind, "Flow stopped by step; skipping remaining steps.");
        self.status = FlowStatus::Stopped;
        self.stack.clear();
        self.state = FlowState::PrepareOutput;
      }
      Signal::Fail(error) => self.fail(error),
      Signal::Invoke {
        pipeline,
        options,
        resume,
      } => {
        let Some(parent) = self.stack.top_index() else {
          return self.abort(FlowError::Internal("invoke with an empty frame stack".to_string()));
        };
        if let Some(frame) = self.stack.top_mut() {
          frame.in_flight = running;
        }
        let mut new_frame = NewFrame::new(FrameKind::Subflow, pipeline.execute, Some(parent));
        new_frame.own_catch = pipeline.catch;
        new_frame.overrides = options.overrides;
        new_frame.resume = Some(resume);
        let depth = self.stack.push(new_frame) + 1;
        event!(Level::DEBUG, %kind, depth, "Running nested pipeline.");
      }
    }
  }

  /// The top frame ran out of steps.
  async fn finish_frame(&mut self) {
    if self.stack.len() == 1 {
      self.stack.pop();
      self.state = FlowState::PrepareOutput;
      return;
    }
    let Some(mut finished) = self.stack.pop() else {
      return;
    };
    event!(Level::DEBUG, frame = finished.id, kind = %finished.kind, "Frame completed.");

    match finished.resume.take() {
      Some(resume) => {
        drop(finished);
        let caller = self.stack.top_mut().map(|caller| {
          let kind = caller.current_step().map(|step| step.kind().to_string()).unwrap_or_default();
          (caller.in_flight.take(), kind)
        });
        let Some((running, kind)) = caller else {
          return self.abort(FlowError::Internal("nested pipeline without a caller".to_string()));
        };

        let (sender, receiver) = oneshot::channel();
        if resume.send(sender).is_err() {
          event!(Level::WARN, %kind, "Step stopped waiting for its nested pipeline.");
          return self.fail(ErrorDescriptor::new(
            TASK_ERROR,
            format!("step '{}' stopped waiting for its nested pipeline", kind),
          ));
        }
        self.await_outcome(&kind, receiver, running).await;
      }
      // A step-level handler completed; the failed step counts as done.
      None => {
        if let Some(frame) = self.stack.top_mut() {
          frame.advance();
        }
      }
    }
  }

  fn fail(&mut self, error: ErrorDescriptor) {
    event!(Level::WARN, name = %error.name, message = %error.message, "Step failed.");
    self.context.set_error(error.clone());
    self.error = Some(error.clone());
    match recover(&mut self.stack, &error) {
      Recovery::Handled(kind) => {
        event!(Level::DEBUG, %kind, "Recovering from failure.");
      }
      Recovery::Unhandled => {
        event!(Level::ERROR, name = %error.name, "No catch clause matched; aborting.");
        self.state = FlowState::Abort;
      }
    }
  }

  /// Records a failure no catch clause may handle.
  fn abort(&mut self, err: FlowError) {
    event!(Level::ERROR, error = %err, "Unrecoverable flow error.");
    let error = ErrorDescriptor::from(err);
    self.context.set_error(error.clone());
    self.error = Some(error);
    self.state = FlowState::Abort;
  }

  async fn emit(&self, name: &str) {
    for observer in [&self.observer, self.context.observer()] {
      let _ = observer
        .notify_with(name, &self.context, |failure| {
          if let Some(err) = failure {
            event!(Level::WARN, event = %name, error = %err, "Listener failed; continuing.");
          }
          NotifyControl::Continue
        })
        .await;
    }
  }
}

fn panicked(kind: &str) -> ErrorDescriptor {
  event!(Level::ERROR, %kind, "Task panicked before signalling.");
  ErrorDescriptor::new(TASK_ERROR, format!("task for step '{}' panicked", kind))
}

async fn unsignalled(kind: &str, running: Option<JoinHandle<()>>) -> ErrorDescriptor {
  if let Some(task) = running {
    if task.is_finished() {
      if let Err(err) = task.await {
        if err.is_panic() {
          return panicked(kind);
        }
      }
    }
  }
  event!(Level::WARN, %kind, "Task finished without signalling.");
  ErrorDescriptor::new(TASK_ERROR, format!("task for step '{}' finished without signalling", kind))
}
