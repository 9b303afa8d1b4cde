use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// EmitterError
// ---------------------------------------------------------------------------

/// Contract violations reported synchronously at the call site.
///
/// Leak diagnostics are deliberately NOT part of this enum — they are
/// advisory and flow through [`crate::leak::LeakSink`] instead.
#[derive(Debug, Error)]
pub enum EmitterError {
    /// `emit` was called with an empty event type.
    #[error("Unspecified event")]
    UnspecifiedEvent,

    /// A context accessor or closing operation was called without a matching
    /// unclosed `emit`. Indicates mismatched open/close calls.
    #[error("Bad call to EventEmitter#{op}: no active emission context")]
    NoActiveContext { op: &'static str },

    /// `emit("error")` with no `"error"` listener and no argument.
    #[error(r#"Uncaught, undefined "error" event"#)]
    UndefinedErrorEvent,

    /// `emit("error", value)` with no `"error"` listener, where `value` is
    /// error-like (an object carrying a string `"message"` field). The
    /// original value is preserved unchanged in `value`.
    #[error(r#"Uncaught "error" event: {message}"#)]
    UnhandledErrorEvent { message: String, value: Value },

    /// `emit("error", value)` with no `"error"` listener and a value that is
    /// not error-like; the offending value is attached as context.
    #[error(r#"Uncaught, unspecified "error" event ({context})"#)]
    UnspecifiedErrorEvent { context: Value },

    /// `env`/`set_env` was called with a key that is not one of the
    /// environment fields (`eventType`, `hadListeners`, `defaultPrevented`).
    #[error(r#"Unknown environment key "{0}""#)]
    UnknownEnvKey(String),
}

impl EmitterError {
    /// Classify the arguments of an unhandled `"error"` emission.
    ///
    /// No argument → [`UndefinedErrorEvent`]; an error-like first argument is
    /// re-raised carrying the original value; anything else is wrapped with
    /// the value attached as context.
    ///
    /// [`UndefinedErrorEvent`]: EmitterError::UndefinedErrorEvent
    pub(crate) fn unhandled_error_event(args: &[Value]) -> Self {
        match args.first() {
            None => Self::UndefinedErrorEvent,
            Some(value) => match value.get("message").and_then(Value::as_str) {
                Some(message) => Self::UnhandledErrorEvent {
                    message: message.to_string(),
                    value: value.clone(),
                },
                None => Self::UnspecifiedErrorEvent {
                    context: value.clone(),
                },
            },
        }
    }
}

/// Convenience alias — the default error type is `EmitterError`.
pub type Result<T, E = EmitterError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
