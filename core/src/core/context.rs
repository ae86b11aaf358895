// flow_engine/src/core/context.rs

//! The namespaced, path-addressable store shared by every step of one request.

use crate::core::descriptor::ErrorDescriptor;
use crate::core::property::{self, Computed, Getter, Lookup, Namespace, Setter, Write};
use crate::error::ContextError;
use crate::observer::{Listener, Observer};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{event, Level};

/// Reserved root property holding the current [`ErrorDescriptor`].
pub const ERROR_SLOT: &str = "error";

struct Shared {
  store: RwLock<Namespace>,
  error: Arc<RwLock<Option<ErrorDescriptor>>>,
  observer: Observer,
}

/// A cheap-to-clone handle on a property tree.
///
/// Paths are dot-separated (`"a.b.c"`); `set` creates missing intermediate
/// mappings. Properties may be read-only or computed (getter plus optional
/// setter). A `Context` may be a view on a namespace of another one, sharing
/// its storage and its observer.
///
/// Lock guards are never held while user code (getters, setters, listeners)
/// runs, so those may freely access the context themselves.
#[derive(Clone)]
pub struct Context {
  shared: Arc<Shared>,
  prefix: Vec<String>,
}

impl Default for Context {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for Context {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Context")
      .field("namespace", &self.prefix.join("."))
      .field("store", &*self.shared.store.read())
      .field("error", &*self.shared.error.read())
      .finish()
  }
}

impl Context {
  pub fn new() -> Self {
    let error = Arc::new(RwLock::new(None::<ErrorDescriptor>));
    let mut store = Namespace::default();

    let read_slot = Arc::clone(&error);
    let write_slot = Arc::clone(&error);
    let slot = Computed {
      getter: Arc::new(move || match &*read_slot.read() {
        Some(descriptor) => descriptor.to_value(),
        None => Value::Null,
      }),
      setter: Some(Arc::new(move |value: Value| {
        *write_slot.write() = match value {
          Value::Null => None,
          other => Some(ErrorDescriptor::from_value(&other)),
        };
      })),
      configurable: false,
    };
    // A fresh namespace accepts any definition.
    let _ = store.define(&[ERROR_SLOT.to_string()], slot);

    Self {
      shared: Arc::new(Shared {
        store: RwLock::new(store),
        error,
        observer: Observer::new(),
      }),
      prefix: Vec::new(),
    }
  }

  /// Creates a context whose paths are rooted at `namespace`.
  pub fn with_namespace(namespace: &str) -> Self {
    Self::new().namespace(namespace)
  }

  /// A view on `namespace` below this context's own root.
  pub fn namespace(&self, namespace: &str) -> Context {
    let mut prefix = self.prefix.clone();
    prefix.extend(namespace.split('.').filter(|s| !s.is_empty()).map(str::to_string));
    Context {
      shared: Arc::clone(&self.shared),
      prefix,
    }
  }

  /// The view's root, or `None` for the unprefixed context.
  pub fn namespace_path(&self) -> Option<String> {
    if self.prefix.is_empty() {
      None
    } else {
      Some(self.prefix.join("."))
    }
  }

  /// The absolute segments of `path`. The error slot always lives at the
  /// store root, whatever the view's namespace.
  fn segments(&self, path: &str) -> Vec<String> {
    let reserved = path.split('.').next() == Some(ERROR_SLOT);
    let mut segments = if reserved { Vec::new() } else { self.prefix.clone() };
    if !path.is_empty() {
      segments.extend(path.split('.').map(str::to_string));
    }
    segments
  }

  /// Reads the value at `path`; `None` when any segment is missing.
  pub fn get(&self, path: &str) -> Option<Value> {
    let segments = self.segments(path);
    if segments.is_empty() {
      return Some(self.snapshot());
    }
    let lookup = self.shared.store.read().lookup(&segments);
    match lookup {
      Lookup::Missing => None,
      Lookup::Found { value, pending } => Some(property::fill(value, pending)),
      Lookup::Through { getter, rest } => {
        let value = getter();
        property::descend(&value, &rest).cloned()
      }
    }
  }

  /// Reads and deserializes the value at `path`.
  pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
    self.get(path).and_then(|v| serde_json::from_value(v).ok())
  }

  /// Writes `value` at `path`. Fails on a read-only or getter-only property.
  pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<(), ContextError> {
    self.set_with(path, value.into(), false)
  }

  /// Writes `value` at `path` and marks the property read-only.
  pub fn set_read_only(&self, path: &str, value: impl Into<Value>) -> Result<(), ContextError> {
    self.set_with(path, value.into(), true)
  }

  pub fn set_with(&self, path: &str, value: Value, read_only: bool) -> Result<(), ContextError> {
    if path.is_empty() {
      return Err(ContextError::EmptyPath);
    }
    let segments = self.segments(path);
    let write = self.shared.store.write().set(&segments, value, read_only);
    match write {
      Ok(Write::Done) => Ok(()),
      Ok(Write::CallSetter(setter, value)) => {
        setter(value);
        Ok(())
      }
      Err(err) => {
        event!(Level::DEBUG, %path, error = %err, "Context write rejected.");
        Err(err)
      }
    }
  }

  /// Deletes the property at `path`. Returns whether something was removed.
  pub fn del(&self, path: &str) -> Result<bool, ContextError> {
    if path.is_empty() {
      return Err(ContextError::EmptyPath);
    }
    let segments = self.segments(path);
    self.shared.store.write().delete(&segments)
  }

  /// Installs a computed property. Without a setter the property is
  /// getter-only; with `configurable == false` it cannot be redefined or
  /// deleted afterwards.
  pub fn define(
    &self,
    path: &str,
    getter: impl Fn() -> Value + Send + Sync + 'static,
    setter: Option<Setter>,
    configurable: bool,
  ) -> Result<(), ContextError> {
    if path.is_empty() {
      return Err(ContextError::EmptyPath);
    }
    let getter: Getter = Arc::new(getter);
    let segments = self.segments(path);
    self.shared.store.write().define(
      &segments,
      Computed {
        getter,
        setter,
        configurable,
      },
    )
  }

  /// Materializes this view's whole tree.
  pub fn snapshot(&self) -> Value {
    let lookup = self.shared.store.read().lookup(&self.prefix);
    match lookup {
      Lookup::Missing => Value::Null,
      Lookup::Found { value, pending } => property::fill(value, pending),
      Lookup::Through { getter, rest } => property::descend(&getter(), &rest).cloned().unwrap_or(Value::Null),
    }
  }

  // --- Error slot ---

  /// The error the current flow is recovering from, if any.
  pub fn error(&self) -> Option<ErrorDescriptor> {
    self.shared.error.read().clone()
  }

  pub(crate) fn set_error(&self, error: ErrorDescriptor) {
    *self.shared.error.write() = Some(error);
  }

  pub fn clear_error(&self) {
    *self.shared.error.write() = None;
  }

  // --- Observer ---

  pub fn observer(&self) -> &Observer {
    &self.shared.observer
  }

  pub fn subscribe(&self, event: impl Into<String>, listener: Listener) {
    self.shared.observer.subscribe(event, listener);
  }

  pub fn unsubscribe(&self, event: &str, listener: &Listener) -> bool {
    self.shared.observer.unsubscribe(event, listener)
  }

  /// Notifies this context's own subscribers of `event`.
  pub async fn notify(&self, event: &str) -> anyhow::Result<()> {
    self.shared.observer.notify(event, self).await
  }

  pub async fn notify_around<T, W, Fut>(&self, event: &str, work: W) -> anyhow::Result<T>
  where
    W: FnOnce(Context) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
  {
    self.shared.observer.notify_around(event, self, work).await
  }
}
