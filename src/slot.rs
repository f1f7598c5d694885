//! Single-writer / multi-reader snapshot slots.
//!
//! A slot holds the most recent value of some piece of pipeline state (last
//! activity result, breaker counters, last sensor reading). Exactly one
//! `SlotWriter` exists per slot and it is not `Clone`, so ownership of the
//! writer is ownership of the state. Readers take copies; a publish is one
//! pointer swap under a lock that no reader holds for longer than an `Arc` clone.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct Cell<T> {
    value: Mutex<Arc<T>>,
}

impl<T> Cell<T> {
    fn lock(&self) -> MutexGuard<'_, Arc<T>> {
        // The guarded value is swapped whole, so a poisoned lock never holds a torn value.
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a slot seeded with `initial`.
pub fn slot<T>(initial: T) -> (SlotWriter<T>, SlotReader<T>) {
    let cell = Arc::new(Cell {
        value: Mutex::new(Arc::new(initial)),
    });
    (SlotWriter { cell: cell.clone() }, SlotReader { cell })
}

/// Sole mutator of a slot.
pub struct SlotWriter<T> {
    cell: Arc<Cell<T>>,
}

impl<T> SlotWriter<T> {
    /// Replace the value; most recent write wins.
    pub fn publish(&self, value: T) {
        let next = Arc::new(value);
        let previous = std::mem::replace(&mut *self.cell.lock(), next);
        // Drop the old value outside the lock.
        drop(previous);
    }

    pub fn reader(&self) -> SlotReader<T> {
        SlotReader {
            cell: self.cell.clone(),
        }
    }
}

/// Read handle onto a slot. Cheap to clone and share across threads.
pub struct SlotReader<T> {
    cell: Arc<Cell<T>>,
}

impl<T> Clone for SlotReader<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T> SlotReader<T> {
    /// Shared handle onto the current value.
    pub fn load(&self) -> Arc<T> {
        self.cell.lock().clone()
    }
}

impl<T: Clone> SlotReader<T> {
    /// Owned copy of the current value.
    pub fn snapshot(&self) -> T {
        let current = self.load();
        T::clone(&current)
    }
}
