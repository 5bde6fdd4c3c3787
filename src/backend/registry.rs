use crate::backend::entity::EntityState;
use std::cell::Cell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error};

/// Callback invoked with the new snapshot every time an entity changes.
pub type StateChangeHandler = Box<dyn Fn(&EntityState) + Send + Sync>;

/// Opaque handle returned by a registration, used to unregister it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RegistrationKey {
    entity_id: String,
    id: u64,
}

impl RegistrationKey {
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }
}

thread_local! {
    static DISPATCHING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as running handlers until dropped
struct DispatchGuard;

impl DispatchGuard {
    fn enter() -> Self {
        DISPATCHING.with(|d| d.set(true));
        Self
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCHING.with(|d| d.set(false));
    }
}

/// Re-entering the table from a handler would deadlock on its own lock.
/// Panicking instead lets `dispatch` catch and log it.
fn assert_not_dispatching(operation: &str) {
    assert!(
        !DISPATCHING.with(Cell::get),
        "{operation} called from inside a state change handler"
    );
}

/// Observer table keyed by entity id.
///
/// Handlers for one entity run in registration order while the table lock is
/// held, so once `unregister` returns the handler can no longer be invoked.
/// Handlers must not call back into the registry.
pub struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<String, Vec<(u64, StateChangeHandler)>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handlers: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<(u64, StateChangeHandler)>>> {
        // Handlers are run under catch_unwind, a poisoned lock still holds a consistent table
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, entity_id: &str, handler: StateChangeHandler) -> RegistrationKey {
        assert_not_dispatching("register");
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock()
            .entry(entity_id.to_string())
            .or_default()
            .push((id, handler));

        debug!(entity_id = %entity_id, registration = id, "State change handler registered");
        RegistrationKey {
            entity_id: entity_id.to_string(),
            id,
        }
    }

    /// Remove a registration. Returns false if it was already gone.
    pub fn unregister(&self, key: &RegistrationKey) -> bool {
        assert_not_dispatching("unregister");
        let mut handlers = self.lock();
        let Some(list) = handlers.get_mut(&key.entity_id) else {
            debug!(entity_id = %key.entity_id, registration = key.id, "Unregister for unknown entity ignored");
            return false;
        };

        let before = list.len();
        list.retain(|(id, _)| *id != key.id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(&key.entity_id);
        }

        if removed {
            debug!(entity_id = %key.entity_id, registration = key.id, "State change handler unregistered");
        } else {
            debug!(entity_id = %key.entity_id, registration = key.id, "Handler already unregistered");
        }
        removed
    }

    /// Number of live registrations for an entity
    pub fn count(&self, entity_id: &str) -> usize {
        self.lock().get(entity_id).map_or(0, Vec::len)
    }

    /// Invoke every handler registered for `state.entity_id`.
    ///
    /// A panicking handler is logged and skipped; the remaining handlers
    /// still run. Returns the number of handlers that completed.
    pub fn dispatch(&self, state: &EntityState) -> usize {
        let handlers = self.lock();
        let Some(list) = handlers.get(&state.entity_id) else {
            return 0;
        };

        let _guard = DispatchGuard::enter();
        let mut completed = 0;
        for (id, handler) in list {
            match catch_unwind(AssertUnwindSafe(|| handler(state))) {
                Ok(()) => completed += 1,
                Err(payload) => {
                    error!(
                        entity_id = %state.entity_id,
                        registration = id,
                        panic = %panic_message(payload.as_ref()),
                        "State change handler panicked"
                    );
                }
            }
        }
        completed
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
