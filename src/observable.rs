//! Process-local publish/subscribe for per-entity change events.
//!
//! Observers are invoked synchronously on the task that mutates the model —
//! they must be side-effect-light (§9 design note "Observers"). Heavy work
//! belongs on a separate task spawned from inside the callback.

use std::sync::Mutex;

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

/// A broadcast point for a single kind of change event.
///
/// Unlike the teacher's fire-and-forget `Observable` (a `Vec` an owner
/// mutates directly), this one is `Sync` so it can live behind a shared
/// `Arc<PanelState>` and be notified from any task that holds a reference.
pub struct Observable<T> {
    observers: Mutex<Vec<Callback<T>>>,
}

impl<T> Observable<T> {
    pub fn new() -> Self {
        Self { observers: Mutex::new(Vec::new()) }
    }

    /// Register a callback. Returns a token that can be passed to `detach`.
    pub fn attach<F>(&self, callback: F) -> usize
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut observers = self.observers.lock().expect("observable lock poisoned");
        observers.push(Box::new(callback));
        observers.len() - 1
    }

    /// Notify every attached observer with the current value.
    pub fn notify(&self, value: &T) {
        let observers = self.observers.lock().expect("observable lock poisoned");
        for observer in observers.iter() {
            observer(value);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().expect("observable lock poisoned").len()
    }
}

impl<T> Default for Observable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn notifies_all_attached_observers() {
        let observable: Observable<u32> = Observable::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c1 = calls.clone();
        observable.attach(move |v| {
            c1.fetch_add(*v as usize, Ordering::SeqCst);
        });
        let c2 = calls.clone();
        observable.attach(move |v| {
            c2.fetch_add(*v as usize, Ordering::SeqCst);
        });

        observable.notify(&5);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }
}
