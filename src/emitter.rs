//! EventEmitter — synchronous, reentrant event emission with per-emit
//! contexts.
//!
//! # Emission contract
//!
//! `emit` pushes an [`EmissionContext`] frame and invokes listeners
//! synchronously; it does NOT pop the frame. The caller (or a listener
//! acting on its behalf) must close the context exactly once via
//! [`get_data`](EventEmitter::get_data), [`flush`](EventEmitter::flush) or
//! [`end`](EventEmitter::end). Frames left open accumulate on the stack and
//! are reported by the leak sink past a fixed depth.
//!
//! # Threading model
//!
//! All methods take `&self`; internal state lives behind `parking_lot`
//! mutexes. Two rules keep reentrancy safe:
//!   - no lock is ever held while a listener (or the leak sink) runs, so
//!     listeners may freely call `on()`/`off()`/`emit()`;
//!   - the registry and stack locks are never held simultaneously.
//!
//! A listener that panics propagates the panic out of `emit` and leaves its
//! frame open — the documented leak path, not silently recovered.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::context::{ContextStack, EmissionContext};
use crate::error::{EmitterError, Result};
use crate::leak::{LeakSink, TracingLeakSink, DEFAULT_MAX_LISTENERS, STACK_WARN_DEPTH};
use crate::registry::{Entry, ListenerFn, ListenerId, ListenerRegistry};

/// Meta event fired before a listener is inserted, with the target event
/// type and the new listener's id as arguments.
pub const NEW_LISTENER_EVENT: &str = "newListener";

/// Meta event fired after a successful removal, with the event type and the
/// removed listener's id as arguments.
pub const REMOVE_LISTENER_EVENT: &str = "removeListener";

/// Emitting this type with no listener registered for it surfaces the
/// failure synchronously instead of dispatching.
pub const ERROR_EVENT: &str = "error";

/// `max_listeners` sentinel for "never set" — `get_max_listeners` then
/// reports [`DEFAULT_MAX_LISTENERS`].
const MAX_LISTENERS_UNSET: usize = usize::MAX;

/// Synchronous, reentrant event emitter with a nested emission-context
/// stack.
///
/// ```
/// use evstack::EventEmitter;
/// use serde_json::json;
///
/// let emitter = EventEmitter::new();
/// emitter.on("greet", |em, args| {
///     em.set_data("greeting", args[0].clone()).unwrap();
/// });
///
/// let ctx = emitter.emit("greet", &[json!("hi")]).unwrap().get_data().unwrap();
/// assert_eq!(ctx.payload()["greeting"], json!("hi"));
/// ```
pub struct EventEmitter {
    registry: Mutex<ListenerRegistry>,
    stack: Mutex<ContextStack>,
    max_listeners: AtomicUsize,
    next_id: AtomicU64,
    leak_sink: Arc<dyn LeakSink>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter").finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Create an emitter with the default `tracing`-backed leak sink.
    ///
    /// All state is initialized per instance; nothing is shared between
    /// emitters.
    pub fn new() -> Self {
        Self::with_leak_sink(Arc::new(TracingLeakSink))
    }

    /// Create an emitter routing leak diagnostics to `sink`.
    pub fn with_leak_sink(sink: Arc<dyn LeakSink>) -> Self {
        Self {
            registry: Mutex::new(ListenerRegistry::default()),
            stack: Mutex::new(ContextStack::new()),
            max_listeners: AtomicUsize::new(MAX_LISTENERS_UNSET),
            next_id: AtomicU64::new(1),
            leak_sink: sink,
        }
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register `listener` for `event_type`; returns its [`ListenerId`].
    ///
    /// If a [`NEW_LISTENER_EVENT`] meta-listener is registered, that event is
    /// emitted (and its context closed internally) before the insertion, so
    /// the meta-listener never observes the listener it is being told about.
    pub fn add_listener(
        &self,
        event_type: &str,
        listener: impl Fn(&EventEmitter, &[Value]) + Send + Sync + 'static,
    ) -> ListenerId {
        self.insert_entry(event_type, Arc::new(listener), None)
    }

    /// Alias for [`add_listener`](EventEmitter::add_listener).
    pub fn on(
        &self,
        event_type: &str,
        listener: impl Fn(&EventEmitter, &[Value]) + Send + Sync + 'static,
    ) -> ListenerId {
        self.add_listener(event_type, listener)
    }

    /// Register a listener invoked at most once.
    ///
    /// On its first invocation the entry is removed from the registry
    /// (through the normal removal path, so [`REMOVE_LISTENER_EVENT`] fires)
    /// before the callback runs; `listener_count` drops immediately. The
    /// returned id removes the registration just like a plain listener's.
    pub fn once(
        &self,
        event_type: &str,
        listener: impl Fn(&EventEmitter, &[Value]) + Send + Sync + 'static,
    ) -> ListenerId {
        self.insert_entry(
            event_type,
            Arc::new(listener),
            Some(Arc::new(std::sync::atomic::AtomicBool::new(false))),
        )
    }

    fn insert_entry(
        &self,
        event_type: &str,
        callback: Arc<ListenerFn>,
        once: Option<Arc<std::sync::atomic::AtomicBool>>,
    ) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        // Notify before inserting, so a meta-listener registering itself does
        // not recurse and the new listener cannot observe its own event. The
        // registry is re-read afterwards: the meta-listener may have mutated
        // it.
        if self.registry.lock().has(NEW_LISTENER_EVENT) {
            self.emit_meta(NEW_LISTENER_EVENT, &[Value::from(event_type), Value::from(id)]);
        }

        let max = self.get_max_listeners();
        let warn = {
            let mut registry = self.registry.lock();
            registry.append(event_type, Entry { id, callback, once });
            registry.check_leak(event_type, max)
        };
        if let Some(count) = warn {
            self.leak_sink.listener_leak(event_type, count, max);
        }
        id
    }

    /// Remove the listener registered under `id` for `event_type`.
    ///
    /// A no-op when the id is not present. After a successful removal a
    /// [`REMOVE_LISTENER_EVENT`] meta-listener, if any remains, is notified
    /// with the event type and id.
    pub fn remove_listener(&self, event_type: &str, id: ListenerId) -> &Self {
        let notify = {
            let mut registry = self.registry.lock();
            let removed = registry.remove(event_type, id);
            removed && registry.has(REMOVE_LISTENER_EVENT)
        };
        if notify {
            self.emit_meta(
                REMOVE_LISTENER_EVENT,
                &[Value::from(event_type), Value::from(id)],
            );
        }
        self
    }

    /// Alias for [`remove_listener`](EventEmitter::remove_listener).
    pub fn off(&self, event_type: &str, id: ListenerId) -> &Self {
        self.remove_listener(event_type, id)
    }

    /// Remove every listener for `event_type`, or for all event types when
    /// `None`.
    ///
    /// Without a [`REMOVE_LISTENER_EVENT`] meta-listener this is a plain
    /// clear. With one, listeners are removed one at a time in LIFO order per
    /// type so the meta-listener fires once per removed listener; its own
    /// registrations are processed last.
    pub fn remove_all_listeners(&self, event_type: Option<&str>) -> &Self {
        if !self.registry.lock().has(REMOVE_LISTENER_EVENT) {
            let mut registry = self.registry.lock();
            match event_type {
                None => registry.clear(),
                Some(t) => registry.delete(t),
            }
            return self;
        }

        match event_type {
            None => {
                let types: Vec<String> = self
                    .registry
                    .lock()
                    .event_types()
                    .into_iter()
                    .filter(|t| t != REMOVE_LISTENER_EVENT)
                    .collect();
                for t in &types {
                    self.remove_all_listeners(Some(t));
                }
                self.remove_all_listeners(Some(REMOVE_LISTENER_EVENT));
                // Also drops anything a meta-listener re-registered during
                // the teardown.
                self.registry.lock().clear();
            }
            Some(t) => loop {
                // The lock must be released before remove_listener re-takes
                // it, so no `while let` over the guard here.
                let last = self.registry.lock().last_id(t);
                match last {
                    Some(id) => self.remove_listener(t, id),
                    None => break,
                };
            },
        }
        self
    }

    /// Snapshot of the listeners registered for `event_type`, independent of
    /// the registry.
    pub fn listeners(&self, event_type: &str) -> Vec<Arc<ListenerFn>> {
        self.registry
            .lock()
            .snapshot(event_type)
            .into_iter()
            .map(|entry| entry.callback)
            .collect()
    }

    /// Number of listeners currently registered for `event_type`.
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.registry.lock().count(event_type)
    }

    /// Number of event types with at least one listener.
    pub fn events_count(&self) -> usize {
        self.registry.lock().events_count()
    }

    /// Set the per-event-type listener count past which a leak diagnostic
    /// fires. 0 disables the check.
    pub fn set_max_listeners(&self, n: usize) -> &Self {
        self.max_listeners.store(n, Ordering::Relaxed);
        self
    }

    /// The configured listener limit, or [`DEFAULT_MAX_LISTENERS`] when never
    /// set.
    pub fn get_max_listeners(&self) -> usize {
        match self.max_listeners.load(Ordering::Relaxed) {
            MAX_LISTENERS_UNSET => DEFAULT_MAX_LISTENERS,
            n => n,
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Emit `event_type`, invoking every listener registered for it in
    /// registration order with `(self, args)`.
    ///
    /// A fresh context frame is pushed and deliberately left open; close it
    /// exactly once with [`get_data`](EventEmitter::get_data),
    /// [`flush`](EventEmitter::flush) or [`end`](EventEmitter::end).
    ///
    /// Errors:
    /// - empty `event_type` → [`EmitterError::UnspecifiedEvent`] (nothing is
    ///   pushed);
    /// - `event_type == "error"` with no `"error"` listener → the unhandled-
    ///   error rule: no argument raises
    ///   [`EmitterError::UndefinedErrorEvent`]; an error-like first argument
    ///   (object with a string `"message"`) is re-raised carrying the value
    ///   unchanged; any other value is wrapped with the value attached as
    ///   context. The frame stays pushed, like any failed emission.
    pub fn emit(&self, event_type: &str, args: &[Value]) -> Result<&Self> {
        if event_type.is_empty() {
            return Err(EmitterError::UnspecifiedEvent);
        }

        let (depth, trail) = {
            let mut stack = self.stack.lock();
            let depth = stack.push(EmissionContext::new(event_type));
            let trail = (depth >= STACK_WARN_DEPTH).then(|| stack.trail());
            (depth, trail)
        };
        if let Some(trail) = trail {
            self.leak_sink.stack_leak(depth, &trail);
        }

        let snapshot = self.registry.lock().snapshot(event_type);
        if snapshot.is_empty() {
            if event_type == ERROR_EVENT {
                return Err(EmitterError::unhandled_error_event(args));
            }
            return Ok(self);
        }

        // Listeners may ask `had_listeners()` while running, so the flag is
        // recorded before dispatch starts.
        if let Some(ctx) = self.stack.lock().current_mut() {
            ctx.env_mut().had_listeners = true;
        }

        for entry in snapshot {
            if let Some(fired) = &entry.once {
                // The snapshot may still hold a once entry that a nested emit
                // already consumed; the fired flag keeps it at most once.
                if fired.swap(true, Ordering::SeqCst) {
                    continue;
                }
                self.remove_listener(event_type, entry.id);
            }
            (entry.callback)(self, args);
        }
        Ok(self)
    }

    /// Internal emission of a meta event; the frame is closed here instead of
    /// by the public caller.
    fn emit_meta(&self, event_type: &str, args: &[Value]) {
        // Meta event types are never empty and never "error", so this is
        // best-effort only in the formal sense.
        if let Err(e) = self.emit(event_type, args).and_then(|em| em.flush()) {
            tracing::warn!(event_type = %event_type, error = %e, "meta emission failed");
        }
    }

    // -----------------------------------------------------------------------
    // Context closing
    // -----------------------------------------------------------------------

    /// Pop the active context and return it (environment flags and payload).
    pub fn get_data(&self) -> Result<EmissionContext> {
        self.stack
            .lock()
            .pop()
            .ok_or(EmitterError::NoActiveContext { op: "get_data" })
    }

    /// Pop and discard the active context.
    pub fn flush(&self) -> Result<&Self> {
        self.stack
            .lock()
            .pop()
            .map(|_| self)
            .ok_or(EmitterError::NoActiveContext { op: "flush" })
    }

    /// Pop the active context and pass `value` through unchanged, so a
    /// listener's result can be returned in the same expression that closes
    /// the context.
    pub fn end<T>(&self, value: T) -> Result<T> {
        self.stack
            .lock()
            .pop()
            .map(|_| value)
            .ok_or(EmitterError::NoActiveContext { op: "end" })
    }

    // -----------------------------------------------------------------------
    // Context accessors
    // -----------------------------------------------------------------------

    /// Read `key` from the active context's payload bag.
    pub fn data(&self, key: &str) -> Result<Option<Value>> {
        let stack = self.stack.lock();
        let ctx = stack
            .current()
            .ok_or(EmitterError::NoActiveContext { op: "data" })?;
        Ok(ctx.payload().get(key).cloned())
    }

    /// Write `key` into the active context's payload bag.
    pub fn set_data(&self, key: &str, value: impl Into<Value>) -> Result<&Self> {
        let mut stack = self.stack.lock();
        let ctx = stack
            .current_mut()
            .ok_or(EmitterError::NoActiveContext { op: "set_data" })?;
        ctx.payload_mut().insert(key.to_string(), value.into());
        Ok(self)
    }

    /// Read an environment field of the active context by name:
    /// `"eventType"`, `"hadListeners"` or `"defaultPrevented"`.
    pub fn env(&self, key: &str) -> Result<Value> {
        let stack = self.stack.lock();
        let ctx = stack
            .current()
            .ok_or(EmitterError::NoActiveContext { op: "env" })?;
        match key {
            "eventType" => Ok(Value::from(ctx.event_type())),
            "hadListeners" => Ok(Value::from(ctx.had_listeners())),
            "defaultPrevented" => Ok(Value::from(ctx.default_prevented())),
            other => Err(EmitterError::UnknownEnvKey(other.to_string())),
        }
    }

    /// Write an environment field of the active context by name. Boolean
    /// fields apply JS truthiness to the value; `"eventType"` takes the
    /// string form of the value.
    pub fn set_env(&self, key: &str, value: impl Into<Value>) -> Result<&Self> {
        let value = value.into();
        let mut stack = self.stack.lock();
        let ctx = stack
            .current_mut()
            .ok_or(EmitterError::NoActiveContext { op: "set_env" })?;
        let env = ctx.env_mut();
        match key {
            "eventType" => {
                env.event_type = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                }
            }
            "hadListeners" => env.had_listeners = is_truthy(&value),
            "defaultPrevented" => env.default_prevented = is_truthy(&value),
            other => return Err(EmitterError::UnknownEnvKey(other.to_string())),
        }
        Ok(self)
    }

    /// Set `defaultPrevented` on the active context. Purely cooperative: the
    /// remaining listeners of the same emission still run; other code may
    /// check [`is_default_prevented`](EventEmitter::is_default_prevented)
    /// afterwards.
    pub fn prevent_default(&self) -> Result<&Self> {
        let mut stack = self.stack.lock();
        let ctx = stack
            .current_mut()
            .ok_or(EmitterError::NoActiveContext { op: "prevent_default" })?;
        ctx.env_mut().default_prevented = true;
        Ok(self)
    }

    /// Whether `prevent_default` was called on the active context.
    pub fn is_default_prevented(&self) -> Result<bool> {
        let stack = self.stack.lock();
        stack
            .current()
            .map(EmissionContext::default_prevented)
            .ok_or(EmitterError::NoActiveContext { op: "is_default_prevented" })
    }

    /// Whether the active context's emission found any listeners.
    pub fn had_listeners(&self) -> Result<bool> {
        let stack = self.stack.lock();
        stack
            .current()
            .map(EmissionContext::had_listeners)
            .ok_or(EmitterError::NoActiveContext { op: "had_listeners" })
    }

    /// Event type of the topmost open context, or `""` when none is open.
    pub fn current_event_type(&self) -> String {
        self.stack.lock().event_type_at(0).to_string()
    }

    /// Event type of the context below the topmost one — inside a nested
    /// `emit`, the caller's event type. `""` when absent.
    pub fn parent_event_type(&self) -> String {
        self.stack.lock().event_type_at(1).to_string()
    }

    /// Context-stack depth, sentinel included; 1 means no open context.
    pub fn stack_depth(&self) -> usize {
        self.stack.lock().depth()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// JS truthiness over JSON values, used by `set_env` writes to boolean
/// fields.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
