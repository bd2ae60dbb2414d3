//! Change notification for values the front end mirrors.
//!
//! Setters compare old and new values and only notify on an actual change.
//! Notifications can be fired immediately or collected and fired later, so
//! a component can release its lock before running observer code.

use std::sync::Arc;

/// Callback invoked with the new value after a change.
pub type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Registered observers for one value.
pub struct ObserverList<T> {
    observers: Vec<Observer<T>>,
}

impl<T> Default for ObserverList<T> {
    fn default() -> Self {
        Self {
            observers: Vec::new(),
        }
    }
}

impl<T> ObserverList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, f: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.observers.push(Arc::new(f));
    }

    /// Snapshot the observers together with `value` for firing later.
    pub fn prepare(&self, value: T) -> Notification<T> {
        Notification {
            value,
            observers: self.observers.clone(),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn subscribe<F>(&mut self, f: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.observers.subscribe(f);
    }

    /// Store `value`; returns the pending notification, or `None` if unchanged.
    pub fn replace(&mut self, value: T) -> Option<Notification<T>> {
        if self.value == value {
            return None;
        }
        self.value = value.clone();
        Some(self.observers.prepare(value))
    }

    /// Store `value` and notify right away. Returns whether it changed.
    pub fn set(&mut self, value: T) -> bool {
        match self.replace(value) {
            Some(n) => {
                n.fire();
                true
            }
            None => false,
        }
    }
}

/// Notifications collected while a lock is held, fired after release.
#[derive(Default)]
pub struct PendingNotifications {
    pending: Vec<Box<dyn FnOnce() + Send>>,
}

impl PendingNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<T: Send + 'static>(&mut self, notification: Notification<T>) {
        self.pending.push(Box::new(move || notification.fire()));
    }

    /// Queue arbitrary deferred work (message dispatch, diagnostics).
    pub fn defer<F: FnOnce() + Send + 'static>(&mut self, f: F) {
        self.pending.push(Box::new(f));
    }

    /// Run everything in the order it was queued.
    pub fn fire(self) {
        for f in self.pending {
            f();
        }
    }
}
