// flow_engine/src/pipeline/handle.rs

//! The handler-facing API bound to one step execution.

use crate::core::assembly::Pipeline;
use crate::core::descriptor::ErrorDescriptor;
use crate::error::{FlowError, FlowResult};
use crate::observer::{Listener, Observer};
use crate::pipeline::definition::InvokeOptions;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{event, Level, Span};

/// What a task tells the engine about its step. Sent at most once per slot.
pub(crate) enum Signal {
  Proceed,
  Fail(ErrorDescriptor),
  Stop,
  Invoke {
    pipeline: Pipeline,
    options: InvokeOptions,
    resume: ResumeSender,
  },
}

impl Signal {
  fn verb(&self) -> &'static str {
    match self {
      Signal::Proceed => "proceed",
      Signal::Fail(_) => "fail",
      Signal::Stop => "stop",
      Signal::Invoke { .. } => "invoke",
    }
  }
}

pub(crate) type SignalSender = oneshot::Sender<Signal>;
/// Hands a fresh signal slot back to a task once its nested pipeline is done.
pub(crate) type ResumeSender = oneshot::Sender<SignalSender>;

/// Passed to every task invocation; the task must call exactly one of
/// [`proceed`](FlowHandle::proceed), [`fail`](FlowHandle::fail) or
/// [`stop`](FlowHandle::stop).
///
/// The outcome travels through a one-shot channel, so only the first signal
/// reaches the engine. Later calls are logged and return `false`.
/// [`invoke`](FlowHandle::invoke) uses up the slot too and hands a new one
/// back when the nested pipeline completes, after which the task signals its
/// own outcome as usual.
#[derive(Clone)]
pub struct FlowHandle {
  kind: Arc<str>,
  flow_id: u64,
  slot: Arc<Mutex<Option<SignalSender>>>,
  observer: Observer,
  span: Span,
}

impl fmt::Debug for FlowHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FlowHandle")
      .field("kind", &self.kind)
      .field("flow_id", &self.flow_id)
      .field("pending", &self.slot.lock().is_some())
      .finish()
  }
}

impl FlowHandle {
  pub(crate) fn new(kind: &str, flow_id: u64, sender: SignalSender, observer: Observer, span: Span) -> Self {
    Self {
      kind: Arc::from(kind),
      flow_id,
      slot: Arc::new(Mutex::new(Some(sender))),
      observer,
      span,
    }
  }

  /// The step type this handle is bound to.
  pub fn step_kind(&self) -> &str {
    &self.kind
  }

  pub fn flow_id(&self) -> u64 {
    self.flow_id
  }

  /// The span of this step; tasks may log under it or instrument their own
  /// futures with it.
  pub fn logger(&self) -> &Span {
    &self.span
  }

  /// Whether an outcome can still be signalled.
  pub fn is_pending(&self) -> bool {
    self.slot.lock().is_some()
  }

  /// The step succeeded; move on to the next one.
  pub fn proceed(&self) -> bool {
    self.signal(Signal::Proceed)
  }

  /// The step failed; start the error-handler search.
  pub fn fail(&self, error: impl Into<ErrorDescriptor>) -> bool {
    self.signal(Signal::Fail(error.into()))
  }

  /// Skip every remaining step in every frame and finish the flow.
  pub fn stop(&self) -> bool {
    self.signal(Signal::Stop)
  }

  fn signal(&self, signal: Signal) -> bool {
    let verb = signal.verb();
    let Some(sender) = self.slot.lock().take() else {
      event!(parent: &self.span, Level::WARN, kind = %self.kind, %verb, "Step already signalled its outcome; ignoring.");
      return false;
    };
    if sender.send(signal).is_err() {
      event!(parent: &self.span, Level::WARN, kind = %self.kind, %verb, "Flow is no longer waiting for this step.");
      return false;
    }
    true
  }

  /// Runs `pipeline` as a nested pipeline on top of the current frame and
  /// waits until it has completed (its own catch clause included).
  ///
  /// Fails with [`FlowError::SubflowAbandoned`] if the flow discarded the
  /// nested pipeline instead, e.g. because an error in it was recovered by an
  /// enclosing handler or a task stopped the flow.
  ///
  /// The outcome slot is handed to the flow as soon as this is called, so
  /// the nested pipeline cannot be cancelled from the task. If the returned
  /// future is dropped (say, by a timeout around it), later `proceed`, `fail`
  /// or `stop` calls return `false`; the flow runs the nested pipeline to its
  /// end and then fails this step with `TaskError`. Apply timeouts inside the
  /// nested pipeline's own steps instead.
  pub async fn invoke(&self, pipeline: Pipeline) -> FlowResult<()> {
    self.invoke_with(pipeline, InvokeOptions::default()).await
  }

  /// Like [`invoke`](FlowHandle::invoke), with task and resolver overrides
  /// applying to the nested pipeline and everything it runs.
  pub async fn invoke_with(&self, pipeline: Pipeline, options: InvokeOptions) -> FlowResult<()> {
    let Some(sender) = self.slot.lock().take() else {
      event!(parent: &self.span, Level::WARN, kind = %self.kind, "Step already signalled its outcome; invoke ignored.");
      return Err(FlowError::AlreadySignalled {
        kind: self.kind.to_string(),
      });
    };
    let (resume_tx, resume_rx) = oneshot::channel();
    let abandoned = || FlowError::SubflowAbandoned {
      kind: self.kind.to_string(),
    };
    sender
      .send(Signal::Invoke {
        pipeline,
        options,
        resume: resume_tx,
      })
      .map_err(|_| abandoned())?;

    let next = resume_rx.await.map_err(|_| abandoned())?;
    *self.slot.lock() = Some(next);
    event!(parent: &self.span, Level::DEBUG, kind = %self.kind, "Nested pipeline completed; resuming.");
    Ok(())
  }

  /// Subscribes to one of the flow's lifecycle events.
  pub fn subscribe(&self, event: impl Into<String>, listener: Listener) {
    self.observer.subscribe(event, listener);
  }

  pub fn unsubscribe(&self, event: &str, listener: &Listener) -> bool {
    self.observer.unsubscribe(event, listener)
  }
}
