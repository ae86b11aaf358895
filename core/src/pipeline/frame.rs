// flow_engine/src/pipeline/frame.rs

//! The execution stack: one [`Frame`] per running pipeline.
//!
//! Frames live in a `Vec` and point at their parent by index. A parent is
//! always below its children, and frames only ever leave from the top, so a
//! parent index stays valid for the whole life of the child.

use crate::core::assembly::{Assembly, CatchClause, Step};
use crate::core::params::SharedParamResolver;
use crate::pipeline::handle::ResumeSender;
use crate::registry::SharedTaskFactory;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// What a frame is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
  /// The main assembly.
  Main,
  /// A nested pipeline invoked by a task.
  Subflow,
  /// A step-level catch case recovering one failed step.
  PolicyErrorHandler,
  /// A flow-level catch case replacing a failed nested pipeline.
  FlowErrorHandler,
  /// A flow-level catch case replacing the main assembly.
  GlobalHandler,
}

impl fmt::Display for FrameKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      FrameKind::Main => "main",
      FrameKind::Subflow => "subflow",
      FrameKind::PolicyErrorHandler => "policy-error-handler",
      FrameKind::FlowErrorHandler => "flow-error-handler",
      FrameKind::GlobalHandler => "global-handler",
    };
    f.write_str(name)
  }
}

/// Task and resolver overrides carried by a frame and inherited by the frames
/// above it.
#[derive(Clone, Default)]
pub struct Overrides {
  pub(crate) tasks: HashMap<String, SharedTaskFactory>,
  pub(crate) param_resolver: Option<SharedParamResolver>,
}

impl fmt::Debug for Overrides {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut tasks: Vec<&String> = self.tasks.keys().collect();
    tasks.sort();
    f.debug_struct("Overrides")
      .field("tasks", &tasks)
      .field("param_resolver", &self.param_resolver.is_some())
      .finish()
  }
}

pub(crate) struct Frame {
  pub(crate) id: u64,
  pub(crate) kind: FrameKind,
  pub(crate) assembly: Arc<Assembly>,
  pub(crate) task_index: usize,
  pub(crate) overrides: Overrides,
  pub(crate) parent: Option<usize>,
  /// Continuation of the task that invoked this pipeline.
  pub(crate) resume: Option<ResumeSender>,
  pub(crate) own_catch: Option<CatchClause>,
  /// Steps whose own catch clause already fired in this frame.
  consumed: HashSet<usize>,
  /// The task of the current step while it is suspended in `invoke`.
  pub(crate) in_flight: Option<JoinHandle<()>>,
}

impl Frame {
  pub(crate) fn current_step(&self) -> Option<&Step> {
    self.assembly.get(self.task_index)
  }

  /// The current step's catch clause, unless it already fired.
  pub(crate) fn step_catch(&self) -> Option<&CatchClause> {
    if self.consumed.contains(&self.task_index) {
      return None;
    }
    self.current_step().and_then(Step::catch)
  }

  pub(crate) fn consume_step_catch(&mut self) {
    self.consumed.insert(self.task_index);
  }

  /// Moves to the next step. A task still suspended on the old step is
  /// cancelled.
  pub(crate) fn advance(&mut self) {
    if let Some(task) = self.in_flight.take() {
      task.abort();
    }
    self.task_index += 1;
  }
}

impl Drop for Frame {
  fn drop(&mut self) {
    if let Some(task) = self.in_flight.take() {
      task.abort();
    }
  }
}

impl fmt::Debug for Frame {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Frame")
      .field("id", &self.id)
      .field("kind", &self.kind)
      .field("task_index", &self.task_index)
      .field("len", &self.assembly.len())
      .field("parent", &self.parent)
      .field("resumable", &self.resume.is_some())
      .field("own_catch", &self.own_catch.is_some())
      .finish()
  }
}

/// Everything needed to push a frame.
pub(crate) struct NewFrame {
  pub(crate) kind: FrameKind,
  pub(crate) assembly: Assembly,
  pub(crate) parent: Option<usize>,
  pub(crate) overrides: Overrides,
  pub(crate) resume: Option<ResumeSender>,
  pub(crate) own_catch: Option<CatchClause>,
}

impl NewFrame {
  pub(crate) fn new(kind: FrameKind, assembly: Assembly, parent: Option<usize>) -> Self {
    Self {
      kind,
      assembly,
      parent,
      overrides: Overrides::default(),
      resume: None,
      own_catch: None,
    }
  }
}

#[derive(Debug, Default)]
pub(crate) struct FrameStack {
  frames: Vec<Frame>,
  next_id: u64,
}

impl FrameStack {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn push(&mut self, new_frame: NewFrame) -> usize {
    let id = self.next_id;
    self.next_id += 1;
    self.frames.push(Frame {
      id,
      kind: new_frame.kind,
      assembly: Arc::new(new_frame.assembly),
      task_index: 0,
      overrides: new_frame.overrides,
      parent: new_frame.parent,
      resume: new_frame.resume,
      own_catch: new_frame.own_catch,
      consumed: HashSet::new(),
      in_flight: None,
    });
    self.frames.len() - 1
  }

  pub(crate) fn pop(&mut self) -> Option<Frame> {
    self.frames.pop()
  }

  pub(crate) fn clear(&mut self) {
    // Top first, so nested tasks are cancelled before their callers.
    while self.frames.pop().is_some() {}
  }

  pub(crate) fn len(&self) -> usize {
    self.frames.len()
  }

  pub(crate) fn top_index(&self) -> Option<usize> {
    self.frames.len().checked_sub(1)
  }

  pub(crate) fn top(&self) -> Option<&Frame> {
    self.frames.last()
  }

  pub(crate) fn top_mut(&mut self) -> Option<&mut Frame> {
    self.frames.last_mut()
  }

  /// Iterates `from` and its ancestors, nearest first.
  fn lineage(&self, from: usize) -> impl Iterator<Item = &Frame> {
    std::iter::successors(self.frames.get(from), move |frame| {
      frame.parent.and_then(|idx| self.frames.get(idx))
    })
  }

  /// The nearest task override for `kind`, starting at frame `from`.
  pub(crate) fn task_override(&self, from: usize, kind: &str) -> Option<SharedTaskFactory> {
    self.lineage(from).find_map(|frame| frame.overrides.tasks.get(kind).cloned())
  }

  /// The nearest parameter resolver, starting at frame `from`.
  pub(crate) fn param_resolver(&self, from: usize) -> Option<SharedParamResolver> {
    self.lineage(from).find_map(|frame| frame.overrides.param_resolver.clone())
  }
}
