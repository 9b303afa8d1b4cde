//! evstack — a synchronous, reentrant event emitter with a nested
//! emission-context stack.
//!
//! # Overview
//!
//! [`EventEmitter`] combines a per-instance listener registry with a stack of
//! per-`emit` contexts. Each `emit` pushes a context (event type,
//! `hadListeners`, `defaultPrevented`, an open key/value payload bag),
//! invokes listeners synchronously in registration order, and leaves the
//! context open; the consumer closes it exactly once with `get_data()`,
//! `flush()` or `end()`. Because a listener may itself call `emit`, contexts
//! nest — closing operations always act on the topmost frame.
//!
//! Unclosed contexts are the documented leak path; a configurable
//! [`LeakSink`] reports (non-fatally) when the stack grows past a fixed
//! depth or an event type collects more listeners than `set_max_listeners`
//! allows.
//!
//! # Modules
//!
//! - [`emitter`] — [`EventEmitter`], dispatch and context operations.
//! - [`context`] — [`EmissionContext`], [`EnvEntry`] and the context stack.
//! - [`registry`] — listener storage, [`ListenerId`] / [`ListenerFn`].
//! - [`leak`] — [`LeakSink`], the default `tracing` sink and thresholds.
//! - [`error`] — [`EmitterError`] and the crate [`Result`] alias.

pub mod context;
pub mod emitter;
pub mod error;
pub mod leak;
pub mod registry;

pub use context::{EmissionContext, EnvEntry};
pub use emitter::{EventEmitter, ERROR_EVENT, NEW_LISTENER_EVENT, REMOVE_LISTENER_EVENT};
pub use error::{EmitterError, Result};
pub use leak::{LeakSink, TracingLeakSink, DEFAULT_MAX_LISTENERS, STACK_WARN_DEPTH};
pub use registry::{ListenerFn, ListenerId};
