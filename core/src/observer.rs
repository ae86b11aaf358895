// flow_engine/src/observer.rs

//! Named-event subscription and sequential, fail-soft notification.
//!
//! Both [`Context`] (for ad-hoc application events) and the flow engine (for
//! its lifecycle events) own an [`Observer`]. Listeners for one event run
//! strictly in subscription order, each awaited before the next starts.

use crate::core::context::Context;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{event, Level};

pub type ListenerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A subscribed callback. Identity is the allocation, so subscribing a clone
/// of the same `Listener` twice is a no-op.
#[derive(Clone)]
pub struct Listener(Arc<dyn Fn(Context) -> ListenerFuture + Send + Sync>);

impl Listener {
  pub fn new<F, Fut>(f: F) -> Self
  where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
  {
    Listener(Arc::new(move |ctx| f(ctx).boxed()))
  }

  /// Runs the listener, turning a panic (while building or polling its
  /// future) into an error.
  async fn invoke(&self, ctx: Context) -> anyhow::Result<()> {
    let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| (self.0)(ctx))) {
      Ok(fut) => fut,
      Err(_) => return Err(anyhow::anyhow!("listener panicked")),
    };
    match AssertUnwindSafe(fut).catch_unwind().await {
      Ok(result) => result,
      Err(_) => Err(anyhow::anyhow!("listener panicked")),
    }
  }
}

impl PartialEq for Listener {
  fn eq(&self, other: &Self) -> bool {
    std::ptr::eq(
      Arc::as_ptr(&self.0) as *const (),
      Arc::as_ptr(&other.0) as *const (),
    )
  }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Listener({:p})", Arc::as_ptr(&self.0) as *const ())
  }
}

/// Decision taken after each listener of a notification pass.
#[derive(Debug)]
pub enum NotifyControl {
  Continue,
  Halt(anyhow::Error),
}

/// A subscription registry: `event name -> ordered listeners`.
#[derive(Clone, Default)]
pub struct Observer {
  listeners: Arc<Mutex<HashMap<String, Vec<Listener>>>>,
}

impl fmt::Debug for Observer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let guard = self.listeners.lock();
    let counts: HashMap<&str, usize> = guard.iter().map(|(k, v)| (k.as_str(), v.len())).collect();
    f.debug_struct("Observer").field("listeners", &counts).finish()
  }
}

impl Observer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Appends `listener` for `event` unless it is already subscribed.
  pub fn subscribe(&self, event: impl Into<String>, listener: Listener) {
    let event = event.into();
    let mut guard = self.listeners.lock();
    let list = guard.entry(event.clone()).or_default();
    if !list.contains(&listener) {
      list.push(listener);
      event!(Level::TRACE, %event, count = list.len(), "Listener subscribed.");
    }
  }

  /// Removes the first matching entry. Returns whether one was removed.
  pub fn unsubscribe(&self, event: &str, listener: &Listener) -> bool {
    let mut guard = self.listeners.lock();
    let Some(list) = guard.get_mut(event) else {
      return false;
    };
    match list.iter().position(|l| l == listener) {
      Some(idx) => {
        list.remove(idx);
        event!(Level::TRACE, %event, "Listener unsubscribed.");
        true
      }
      None => false,
    }
  }

  /// Drops every listener subscribed to `event`.
  pub fn clear(&self, event: &str) {
    self.listeners.lock().remove(event);
  }

  pub fn listener_count(&self, event: &str) -> usize {
    self.listeners.lock().get(event).map_or(0, Vec::len)
  }

  fn snapshot(&self, event: &str) -> Vec<Listener> {
    self.listeners.lock().get(event).cloned().unwrap_or_default()
  }

  /// Notifies `event`, halting at the first failing listener.
  pub async fn notify(&self, event: &str, ctx: &Context) -> anyhow::Result<()> {
    self.notify_with(event, ctx, |outcome| match outcome {
      Some(err) => NotifyControl::Halt(err),
      None => NotifyControl::Continue,
    })
    .await
  }

  /// Notifies `event`, asking `intermittent` after every listener whether to
  /// go on. The listener list is captured when the pass starts, so listeners
  /// may subscribe or unsubscribe without affecting the running pass.
  ///
  /// With no subscribers this resolves immediately with `Ok(())`.
  pub async fn notify_with<F>(&self, event: &str, ctx: &Context, mut intermittent: F) -> anyhow::Result<()>
  where
    F: FnMut(Option<anyhow::Error>) -> NotifyControl,
  {
    let listeners = self.snapshot(event);
    if listeners.is_empty() {
      return Ok(());
    }
    event!(Level::TRACE, %event, count = listeners.len(), "Notifying listeners.");
    for listener in listeners {
      let outcome = listener.invoke(ctx.clone()).await.err();
      if let NotifyControl::Halt(err) = intermittent(outcome) {
        return Err(err);
      }
    }
    Ok(())
  }

  /// Notifies each event in turn, halting at the first failing pass.
  pub async fn notify_many(&self, events: &[&str], ctx: &Context) -> anyhow::Result<()> {
    for event in events {
      self.notify(event, ctx).await?;
    }
    Ok(())
  }

  /// Notifies `before <event>`, runs `work`, then notifies `after <event>`.
  /// A failing before-phase short-circuits: `work` does not run.
  pub async fn notify_around<T, W, Fut>(&self, event: &str, ctx: &Context, work: W) -> anyhow::Result<T>
  where
    W: FnOnce(Context) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
  {
    self.notify(&format!("before {}", event), ctx).await?;
    let result = work(ctx.clone()).await?;
    self.notify(&format!("after {}", event), ctx).await?;
    Ok(result)
  }
}
