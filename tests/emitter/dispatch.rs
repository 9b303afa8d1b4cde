//! Tests for `emit`: ordering, argument forwarding, snapshot semantics and
//! the unhandled-"error" rule.

use std::sync::{Arc, Mutex};

use evstack::{EmitterError, EventEmitter};
use serde_json::{json, Value};

/// Helper: create a shared call-log that listeners append to.
fn make_log() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

// ============================================================================
// Basic dispatch
// ============================================================================

#[test]
fn emit_invokes_listener_with_forwarded_args_then_flush_closes() {
    let emitter = EventEmitter::new();
    let log = make_log();
    let log_clone = Arc::clone(&log);

    emitter.on("greet", move |_, args| {
        log_clone.lock().unwrap().push(format!("{}", args[0]));
    });

    assert_eq!(emitter.stack_depth(), 1);
    emitter.emit("greet", &[json!("hi")]).unwrap();
    assert_eq!(emitter.stack_depth(), 2);

    emitter.flush().unwrap();
    assert_eq!(emitter.stack_depth(), 1);
    assert_eq!(*log.lock().unwrap(), vec![r#""hi""#]);
}

#[test]
fn listeners_run_in_registration_order_with_the_same_args() {
    let emitter = EventEmitter::new();
    let log = make_log();

    for name in ["a", "b", "c"] {
        let log = Arc::clone(&log);
        emitter.on("save", move |_, args| {
            log.lock().unwrap().push(format!("{name}:{}+{}", args[0], args[1]));
        });
    }

    emitter.emit("save", &[json!(1), json!(2)]).unwrap().flush().unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["a:1+2", "b:1+2", "c:1+2"]);
}

#[test]
fn emit_with_no_listeners_returns_ok_and_leaves_context_open() {
    let emitter = EventEmitter::new();

    emitter.emit("tick", &[]).unwrap();

    assert_eq!(emitter.stack_depth(), 2, "context must stay open for the caller");
    assert_eq!(emitter.current_event_type(), "tick");
    assert!(!emitter.had_listeners().unwrap());
    emitter.flush().unwrap();
}

#[test]
fn emit_with_empty_type_fails_without_pushing() {
    let emitter = EventEmitter::new();

    let err = emitter.emit("", &[]).unwrap_err();

    assert!(matches!(err, EmitterError::UnspecifiedEvent));
    assert_eq!(emitter.stack_depth(), 1, "no frame may be pushed on a rejected emit");
}

#[test]
fn had_listeners_is_set_before_listeners_run() {
    let emitter = EventEmitter::new();
    let observed = Arc::new(Mutex::new(None));
    let observed_clone = Arc::clone(&observed);

    emitter.on("save", move |em, _| {
        *observed_clone.lock().unwrap() = Some(em.had_listeners().unwrap());
    });

    emitter.emit("save", &[]).unwrap();
    let ctx = emitter.get_data().unwrap();

    assert_eq!(*observed.lock().unwrap(), Some(true));
    assert!(ctx.had_listeners());
}

// ============================================================================
// Snapshot semantics during dispatch
// ============================================================================

#[test]
fn listener_removed_mid_dispatch_is_still_called_this_round() {
    let emitter = EventEmitter::new();
    let log = make_log();

    // The remover runs first (registration order) and removes the victim,
    // whose id is filled in after registration.
    let victim_id: Arc<Mutex<Option<u64>>> = Arc::new(Mutex::new(None));
    {
        let log = Arc::clone(&log);
        let victim_id = Arc::clone(&victim_id);
        emitter.on("save", move |em, _| {
            log.lock().unwrap().push("remover".into());
            if let Some(id) = *victim_id.lock().unwrap() {
                em.remove_listener("save", id);
            }
        });
    }
    let id = {
        let log = Arc::clone(&log);
        emitter.on("save", move |_, _| log.lock().unwrap().push("victim".into()))
    };
    *victim_id.lock().unwrap() = Some(id);

    emitter.emit("save", &[]).unwrap().flush().unwrap();
    // Snapshot was taken before dispatch: the victim still ran this round.
    assert_eq!(*log.lock().unwrap(), vec!["remover", "victim"]);

    // Next round it is gone.
    emitter.emit("save", &[]).unwrap().flush().unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["remover", "victim", "remover"],
        "victim must not run after removal"
    );
    assert_eq!(emitter.listener_count("save"), 1);
}

#[test]
fn listener_added_mid_dispatch_does_not_run_this_round() {
    let emitter = EventEmitter::new();
    let log = make_log();

    {
        let log = Arc::clone(&log);
        emitter.on("save", move |em, _| {
            log.lock().unwrap().push("first".into());
            let log2 = Arc::clone(&log);
            em.on("save", move |_, _| log2.lock().unwrap().push("late".into()));
        });
    }

    emitter.emit("save", &[]).unwrap().flush().unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["first"]);

    emitter.emit("save", &[]).unwrap().flush().unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["first", "first", "late"]);
}

// ============================================================================
// The unhandled-"error" rule
// ============================================================================

#[test]
fn error_event_without_listener_or_args_fails() {
    let emitter = EventEmitter::new();

    let err = emitter.emit("error", &[]).unwrap_err();

    assert!(matches!(err, EmitterError::UndefinedErrorEvent));
    // Failed emissions leave their frame open, like a throwing listener.
    assert_eq!(emitter.stack_depth(), 2);
}

#[test]
fn error_event_reraises_error_like_value_unchanged() {
    let emitter = EventEmitter::new();
    let original = json!({ "message": "disk full", "code": "ENOSPC" });

    let err = emitter
        .emit("error", std::slice::from_ref(&original))
        .unwrap_err();

    match err {
        EmitterError::UnhandledErrorEvent { message, value } => {
            assert_eq!(message, "disk full");
            assert_eq!(value, original, "original error value must be preserved");
        }
        other => panic!("expected UnhandledErrorEvent, got {other:?}"),
    }
}

#[test]
fn error_event_wraps_non_error_values_as_context() {
    let emitter = EventEmitter::new();

    let err = emitter.emit("error", &[json!("oops")]).unwrap_err();

    match err {
        EmitterError::UnspecifiedErrorEvent { context } => assert_eq!(context, json!("oops")),
        other => panic!("expected UnspecifiedErrorEvent, got {other:?}"),
    }
}

#[test]
fn error_event_with_listener_dispatches_normally() {
    let emitter = EventEmitter::new();
    let log = make_log();
    let log_clone = Arc::clone(&log);

    emitter.on("error", move |_, args| {
        log_clone.lock().unwrap().push(format!("{}", args[0]));
    });

    emitter
        .emit("error", &[json!({ "message": "handled" })])
        .unwrap()
        .flush()
        .unwrap();

    assert_eq!(log.lock().unwrap().len(), 1);
    assert_eq!(emitter.stack_depth(), 1);
}

// ============================================================================
// Panic propagation
// ============================================================================

#[test]
fn panicking_listener_propagates_and_leaves_the_frame_open() {
    let emitter = EventEmitter::new();
    let log = make_log();
    let log_clone = Arc::clone(&log);

    emitter.on("save", |_, _| panic!("listener failure"));
    emitter.on("save", move |_, _| {
        log_clone.lock().unwrap().push("second".into());
    });

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = emitter.emit("save", &[]);
    }));

    assert!(result.is_err(), "emit must propagate listener panics");
    assert!(
        log.lock().unwrap().is_empty(),
        "iteration stops at the panicking listener"
    );
    assert_eq!(
        emitter.stack_depth(),
        2,
        "the frame stays open — the documented leak path"
    );
}

// ============================================================================
// Chaining
// ============================================================================

#[test]
fn end_closes_the_context_and_passes_the_value_through() {
    let emitter = EventEmitter::new();
    let result = Arc::new(Mutex::new(Value::Null));
    let result_clone = Arc::clone(&result);

    emitter.on("compute", move |_, args| {
        *result_clone.lock().unwrap() = json!(args[0].as_i64().unwrap() * 2);
    });

    emitter.emit("compute", &[json!(21)]).unwrap();
    let doubled = emitter.end(result.lock().unwrap().clone()).unwrap();

    assert_eq!(doubled, json!(42));
    assert_eq!(emitter.stack_depth(), 1);
}

#[test]
fn emit_and_flush_chain_through_results() {
    let emitter = EventEmitter::new();

    let chained: evstack::Result<()> = (|| {
        emitter.emit("a", &[])?.flush()?;
        emitter.emit("b", &[json!(1)])?.flush()?;
        Ok(())
    })();

    chained.unwrap();
    assert_eq!(emitter.stack_depth(), 1);
}
