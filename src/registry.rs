//! Per-instance listener storage.
//!
//! Listeners are stored as `Arc<dyn Fn(&EventEmitter, &[Value])>` keyed by
//! event type, so emission snapshots are cheap (ref-count bumps only).
//! Rust closures have no identity, so each registration is handed a
//! [`ListenerId`]; a `once` registration keeps the id the caller received,
//! which is what lets removal-by-id work uniformly for plain and once-tagged
//! entries (the JS "back-reference" contract).
//!
//! Invariant: an event type with zero remaining listeners has no map slot at
//! all, so the number of registered event types always equals `map.len()`.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde_json::Value;

use crate::emitter::EventEmitter;

/// A listener ID returned by registration methods; pass it to
/// `remove_listener`/`off` to remove the listener.
pub type ListenerId = u64;

/// Closure type for event listeners.
///
/// The emitter is passed as the receiver so listeners can call context
/// accessors (`data`, `prevent_default`, ...) and emit reentrantly; the
/// emission arguments are forwarded positionally.
pub type ListenerFn = dyn Fn(&EventEmitter, &[Value]) + Send + Sync;

/// One registered listener. `once` entries carry a fired flag so the
/// original callback runs at most once even when an in-flight dispatch
/// snapshot still holds the entry after its removal.
#[derive(Clone)]
pub(crate) struct Entry {
    pub(crate) id: ListenerId,
    pub(crate) callback: Arc<ListenerFn>,
    pub(crate) once: Option<Arc<AtomicBool>>,
}

struct ListenerList {
    entries: Vec<Entry>,
    /// Listener-leak diagnostic already fired for this list.
    warned: bool,
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    events: HashMap<String, ListenerList>,
}

impl ListenerRegistry {
    /// Append an entry, creating the event-type slot on first registration.
    pub(crate) fn append(&mut self, event_type: &str, entry: Entry) {
        self.events
            .entry(event_type.to_string())
            .or_insert_with(|| ListenerList {
                entries: Vec::new(),
                warned: false,
            })
            .entries
            .push(entry);
    }

    /// Remove the entry with `id`; returns whether anything was removed.
    /// Removing the last listener for a type deletes the slot entirely.
    pub(crate) fn remove(&mut self, event_type: &str, id: ListenerId) -> bool {
        let Some(list) = self.events.get_mut(event_type) else {
            return false;
        };
        let Some(position) = list.entries.iter().position(|e| e.id == id) else {
            return false;
        };
        list.entries.remove(position);
        if list.entries.is_empty() {
            self.events.remove(event_type);
        }
        true
    }

    /// Delete a whole event-type slot (no per-listener bookkeeping).
    pub(crate) fn delete(&mut self, event_type: &str) {
        self.events.remove(event_type);
    }

    /// Drop every slot.
    pub(crate) fn clear(&mut self) {
        self.events.clear();
    }

    /// Snapshot of the entries for `event_type`, independent of the registry
    /// so mutation during iteration cannot perturb an in-flight dispatch.
    pub(crate) fn snapshot(&self, event_type: &str) -> Vec<Entry> {
        self.events
            .get(event_type)
            .map(|list| list.entries.clone())
            .unwrap_or_default()
    }

    pub(crate) fn has(&self, event_type: &str) -> bool {
        self.events.contains_key(event_type)
    }

    pub(crate) fn count(&self, event_type: &str) -> usize {
        self.events
            .get(event_type)
            .map(|list| list.entries.len())
            .unwrap_or(0)
    }

    /// Id of the most recently registered listener for `event_type` — the
    /// next victim during LIFO bulk removal.
    pub(crate) fn last_id(&self, event_type: &str) -> Option<ListenerId> {
        self.events
            .get(event_type)
            .and_then(|list| list.entries.last())
            .map(|e| e.id)
    }

    pub(crate) fn event_types(&self) -> Vec<String> {
        self.events.keys().cloned().collect()
    }

    /// Number of event types with at least one listener.
    pub(crate) fn events_count(&self) -> usize {
        self.events.len()
    }

    /// Leak check after an append: returns the listener count when it first
    /// exceeds `max` (0 disables the check). Warns once per list; the flag
    /// resets naturally when the slot is deleted and rebuilt.
    pub(crate) fn check_leak(&mut self, event_type: &str, max: usize) -> Option<usize> {
        let list = self.events.get_mut(event_type)?;
        if max > 0 && list.entries.len() > max && !list.warned {
            list.warned = true;
            return Some(list.entries.len());
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
