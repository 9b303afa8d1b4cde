//! Emission contexts and the nested context stack.
//!
//! Every `emit` pushes one [`EmissionContext`] frame; the consumer pops it
//! exactly once via `get_data()` / `flush()` / `end()`. The stack (rather
//! than a single slot) exists because `emit` is reentrant: a listener may
//! itself call `emit`, and closing operations always act on the topmost
//! frame.
//!
//! The stack is initialized with a single `None` sentinel so that "no active
//! context" is an observable state distinct from "stack empty"; the sentinel
//! is never removed.

use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// EnvEntry
// ---------------------------------------------------------------------------

/// Per-context environment flags, separate from the open payload bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvEntry {
    /// The event type this context was opened for.
    pub event_type: String,
    /// Whether the emission found at least one listener for its event type.
    pub had_listeners: bool,
    /// Cooperative cancellation flag set by `prevent_default()`.
    pub default_prevented: bool,
}

impl EnvEntry {
    fn new(event_type: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            had_listeners: false,
            default_prevented: false,
        }
    }
}

// ---------------------------------------------------------------------------
// EmissionContext
// ---------------------------------------------------------------------------

/// One record per in-flight `emit` call: environment flags plus an open
/// key/value payload bag.
///
/// Created when `emit` pushes a frame, owned exclusively by that frame, and
/// returned whole by `get_data()` when the frame is popped.
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionContext {
    env: EnvEntry,
    payload: Map<String, Value>,
}

impl EmissionContext {
    pub(crate) fn new(event_type: &str) -> Self {
        Self {
            env: EnvEntry::new(event_type),
            payload: Map::new(),
        }
    }

    /// The event type this context was opened for.
    pub fn event_type(&self) -> &str {
        &self.env.event_type
    }

    /// Whether the emission that opened this context found any listeners.
    pub fn had_listeners(&self) -> bool {
        self.env.had_listeners
    }

    /// Whether `prevent_default()` was called while this context was active.
    pub fn default_prevented(&self) -> bool {
        self.env.default_prevented
    }

    /// The environment flags.
    pub fn env(&self) -> &EnvEntry {
        &self.env
    }

    pub(crate) fn env_mut(&mut self) -> &mut EnvEntry {
        &mut self.env
    }

    /// The payload bag written through `data`/`set_data`.
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub(crate) fn payload_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.payload
    }

    /// Consume the context, keeping only the payload bag.
    pub fn into_payload(self) -> Map<String, Value> {
        self.payload
    }
}

// ---------------------------------------------------------------------------
// ContextStack
// ---------------------------------------------------------------------------

/// Ordered stack of open emission contexts.
///
/// Invariant: depth ≥ 1 always — the bottom frame is a `None` sentinel that
/// [`ContextStack::pop`] refuses to remove.
#[derive(Debug)]
pub(crate) struct ContextStack {
    frames: Vec<Option<EmissionContext>>,
}

impl ContextStack {
    pub(crate) fn new() -> Self {
        Self { frames: vec![None] }
    }

    /// Push a context frame; returns the resulting depth (sentinel included).
    pub(crate) fn push(&mut self, context: EmissionContext) -> usize {
        self.frames.push(Some(context));
        self.frames.len()
    }

    /// Pop and return the top context, or `None` when the top is the
    /// sentinel. The sentinel itself is never removed.
    pub(crate) fn pop(&mut self) -> Option<EmissionContext> {
        match self.frames.last() {
            Some(Some(_)) => self.frames.pop().flatten(),
            _ => None,
        }
    }

    pub(crate) fn current(&self) -> Option<&EmissionContext> {
        self.frames.last().and_then(Option::as_ref)
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut EmissionContext> {
        self.frames.last_mut().and_then(Option::as_mut)
    }

    /// Depth including the sentinel; never below 1.
    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Event type of the frame `offset` positions below the top (0 = top),
    /// or `""` when that frame is absent or the sentinel.
    pub(crate) fn event_type_at(&self, offset: usize) -> &str {
        let len = self.frames.len();
        if offset >= len {
            return "";
        }
        match &self.frames[len - 1 - offset] {
            Some(ctx) => ctx.event_type(),
            None => "",
        }
    }

    /// Event-type trail for leak diagnostics, top-to-bottom; the sentinel is
    /// rendered as `#null`.
    pub(crate) fn trail(&self) -> Vec<String> {
        self.frames
            .iter()
            .rev()
            .map(|frame| match frame {
                Some(ctx) => ctx.event_type().to_string(),
                None => "#null".to_string(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
