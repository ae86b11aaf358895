// flow_engine/src/pipeline/recovery.rs

//! Finding the handler for a failed step.

use crate::core::descriptor::ErrorDescriptor;
use crate::pipeline::frame::{FrameKind, FrameStack, NewFrame};
use std::mem;
use tracing::{event, Level};

/// Where a failure ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recovery {
  /// A handler frame of this kind was pushed.
  Handled(FrameKind),
  /// No catch clause on the stack matched; the stack is now empty.
  Unhandled,
}

/// Walks the stack from the top looking for a catch case matching `error`.
///
/// For each frame, the current step's own catch clause is tried first (each
/// fires at most once per step), then the frame's flow-level catch. A frame
/// with neither is discarded and the walk continues below it. A flow-level
/// match replaces the frame with a handler that keeps the frame's parent,
/// overrides and resume continuation. The main frame's flow-level catch is the
/// global handler, so a failure inside a handler frame that reaches the bottom
/// of the stack is unhandled.
pub(crate) fn recover(stack: &mut FrameStack, error: &ErrorDescriptor) -> Recovery {
  while let Some(top_idx) = stack.top_index() {
    let Some(frame) = stack.top_mut() else { break };

    if let Some(assembly) = frame.step_catch().and_then(|clause| clause.find(error)).cloned() {
      frame.consume_step_catch();
      event!(Level::INFO, frame = frame.id, index = frame.task_index, name = %error.name, "Step catch clause matched.");
      stack.push(NewFrame::new(FrameKind::PolicyErrorHandler, assembly, Some(top_idx)));
      return Recovery::Handled(FrameKind::PolicyErrorHandler);
    }

    let flow_catch = frame.own_catch.as_ref().and_then(|clause| clause.find(error)).cloned();
    let Some(mut failed) = stack.pop() else { break };
    match flow_catch {
      Some(assembly) => {
        let kind = if failed.kind == FrameKind::Main {
          FrameKind::GlobalHandler
        } else {
          FrameKind::FlowErrorHandler
        };
        event!(Level::INFO, frame = failed.id, failed_kind = %failed.kind, %kind, name = %error.name, "Flow catch clause matched.");
        let mut new_frame = NewFrame::new(kind, assembly, failed.parent);
        new_frame.resume = failed.resume.take();
        new_frame.overrides = mem::take(&mut failed.overrides);
        drop(failed);
        stack.push(new_frame);
        return Recovery::Handled(kind);
      }
      None => {
        event!(Level::DEBUG, frame = failed.id, kind = %failed.kind, "No handler in frame; unwinding.");
      }
    }
  }
  Recovery::Unhandled
}
