//! Single-flight concurrency guard.
//!
//! Only one migration per direction may be in flight. A second caller
//! starting the same-direction operation while one is running neither
//! errors nor launches a redundant pass: it blocks until the first
//! finishes and receives a clone of the same outcome. The slot is freed
//! when the operation completes (success, failure or panic), so the next
//! call always starts fresh.
//!
//! Because only the leader executes the closure, only the leader's
//! progress sink ever sees events; joiners get the final result alone.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct Flight<T> {
    result: Mutex<Option<T>>,
    done: Condvar,
    finished: AtomicBool,
}

impl<T> Flight<T> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: Condvar::new(),
            finished: AtomicBool::new(false),
        }
    }
}

/// Publishes the leader's outcome and frees the slot in one critical
/// section. Running this in `Drop` covers a panicking operation too: the
/// slot is always freed, and joiners are always woken. A finished flight
/// with no result tells a joiner the leader panicked.
struct Completion<'a, T: Clone> {
    owner: &'a SingleFlight<T>,
    flight: &'a Arc<Flight<T>>,
    value: Option<T>,
}

impl<T: Clone> Drop for Completion<'_, T> {
    fn drop(&mut self) {
        let mut slot = self.owner.slot.lock();
        *self.flight.result.lock() = self.value.take();
        self.flight.finished.store(true, Ordering::SeqCst);
        self.flight.done.notify_all();
        *slot = None;
    }
}

/// A per-direction in-flight-operation handle.
pub struct SingleFlight<T: Clone> {
    slot: Mutex<Option<Arc<Flight<T>>>>,
}

impl<T: Clone> SingleFlight<T> {
    /// Creates an idle guard.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Runs `operation` unless one is already in flight, in which case
    /// the calling thread waits for the in-flight outcome instead.
    pub fn run(&self, operation: impl FnOnce() -> T) -> T {
        let (flight, leader) = {
            let mut slot = self.slot.lock();
            match slot.as_ref() {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let flight = Arc::new(Flight::new());
                    *slot = Some(Arc::clone(&flight));
                    (flight, true)
                }
            }
        };

        if leader {
            let mut completion = Completion {
                owner: self,
                flight: &flight,
                value: None,
            };
            let value = operation();
            completion.value = Some(value.clone());
            drop(completion);
            value
        } else {
            let mut result = flight.result.lock();
            loop {
                if let Some(value) = result.as_ref() {
                    return value.clone();
                }
                if flight.finished.load(Ordering::SeqCst) {
                    // The leader ended without publishing (it panicked);
                    // its slot is already freed, so run the operation on
                    // this thread instead.
                    drop(result);
                    return self.run(operation);
                }
                flight.done.wait(&mut result);
            }
        }
    }

    /// Returns true if an operation is currently in flight.
    pub fn is_in_flight(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}
