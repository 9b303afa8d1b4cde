//! Leak diagnostics — advisory only, never fatal.
//!
//! Two thresholds are monitored: the per-event-type listener count (settable
//! via `set_max_listeners`, default 10) and the emission-context stack depth
//! (fixed at 8). Exceeding either fires a [`LeakSink`] callback; execution
//! continues unchanged. The sink is injectable so applications can route the
//! diagnostics wherever they like; the default forwards to `tracing::warn!`.

/// Default per-event-type listener limit when `set_max_listeners` was never
/// called. 0 disables the check.
pub const DEFAULT_MAX_LISTENERS: usize = 10;

/// Context-stack depth (sentinel included) at which every further push fires
/// a stack-leak diagnostic.
pub const STACK_WARN_DEPTH: usize = 8;

/// Receiver for leak diagnostics.
///
/// Callbacks are invoked synchronously while no emitter lock is held, so a
/// sink may safely inspect the emitter it observes.
pub trait LeakSink: Send + Sync {
    /// The listener count for `event_type` exceeded `max` for the first time
    /// since the event type's listener list was (re)created.
    fn listener_leak(&self, event_type: &str, count: usize, max: usize);

    /// A context push reached `depth` ≥ [`STACK_WARN_DEPTH`]. `trail` lists
    /// the open frames' event types top-to-bottom, the bottom sentinel
    /// rendered as `#null`.
    fn stack_leak(&self, depth: usize, trail: &[String]);
}

/// Default sink: structured `tracing` warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLeakSink;

impl LeakSink for TracingLeakSink {
    fn listener_leak(&self, event_type: &str, count: usize, max: usize) {
        tracing::warn!(
            event_type = %event_type,
            count,
            max,
            "possible EventEmitter listener leak detected — use set_max_listeners() to raise the limit"
        );
    }

    fn stack_leak(&self, depth: usize, trail: &[String]) {
        tracing::warn!(
            depth,
            trail = %trail.join(", "),
            "possible EventEmitter context leak detected — call get_data()/flush()/end() exactly once after each emit"
        );
    }
}
