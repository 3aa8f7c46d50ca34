//! Observer hooks fired on add and get

use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Callback invoked with a reference to a pooled object
pub type Hook<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub(crate) struct Hooks<T> {
    on_add: RwLock<Vec<Hook<T>>>,
    on_get: RwLock<Vec<Hook<T>>>,
}

impl<T> Hooks<T> {
    pub fn new(on_add: Vec<Hook<T>>, on_get: Vec<Hook<T>>) -> Self {
        Self {
            on_add: RwLock::new(on_add),
            on_get: RwLock::new(on_get),
        }
    }

    pub fn register_add(&self, hook: Hook<T>) {
        self.on_add.write().push(hook);
    }

    pub fn register_get(&self, hook: Hook<T>) {
        self.on_get.write().push(hook);
    }

    pub fn fire_add(&self, item: &T) {
        Self::fire(&self.on_add, item, "add");
    }

    pub fn fire_get(&self, item: &T) {
        Self::fire(&self.on_get, item, "get");
    }

    fn fire(hooks: &RwLock<Vec<Hook<T>>>, item: &T, event: &'static str) {
        // Snapshot so a hook may register further hooks.
        let hooks: Vec<Hook<T>> = hooks.read().clone();
        for hook in hooks {
            if panic::catch_unwind(AssertUnwindSafe(|| hook(item))).is_err() {
                tracing::error!(event, "pool observer panicked; continuing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_hooks_fire_in_registration_order() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let hooks = Hooks::<i32>::new(Vec::new(), Vec::new());
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            hooks.register_add(Arc::new(move |item: &i32| seen.lock().push((tag, *item))));
        }

        hooks.fire_add(&5);
        hooks.fire_get(&5);

        assert_eq!(*seen.lock(), vec![("first", 5), ("second", 5)]);
    }

    #[test]
    fn test_panicking_hook_is_isolated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let panicking: Hook<i32> = Arc::new(|_: &i32| panic!("observer failure"));
        let counting: Hook<i32> = Arc::new(move |_: &i32| {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        let hooks = Hooks::new(Vec::new(), vec![panicking, counting]);

        hooks.fire_get(&1);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
