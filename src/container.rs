//! FIFO storage for objects currently sitting in the pool

use crate::errors::RejectReason;

use parking_lot::{Mutex, ReentrantMutex};
use std::collections::VecDeque;

/// Thread-safe queue of idle objects, bounded and free of duplicates.
pub(crate) struct ItemContainer<T> {
    items: Mutex<VecDeque<T>>,
    /// Held from the admission checks until the push, so checks made before
    /// `on_insert` still hold afterwards. Reentrant for observers that return
    /// objects themselves.
    pushing: ReentrantMutex<()>,
    capacity: usize,
}

impl<T: PartialEq> ItemContainer<T> {
    pub fn new(items: Vec<T>, capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::from(items)),
            pushing: ReentrantMutex::new(()),
            capacity,
        }
    }

    pub fn pop_front(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Append `item` unless an equal object is already queued or the
    /// container is full.
    ///
    /// `on_insert` runs once the object has been accepted and just before it
    /// is queued, with the queue unlocked, so it may call back into the pool.
    pub fn push_unique<F>(&self, item: T, on_insert: F) -> Result<(), (T, RejectReason)>
    where
        F: FnOnce(&T),
    {
        let _pushing = self.pushing.lock();
        if let Some(reason) = self.refusal(&self.items.lock(), &item) {
            return Err((item, reason));
        }

        on_insert(&item);

        let mut items = self.items.lock();
        // Only an observer returning objects on this thread can get here.
        if let Some(reason) = self.refusal(&items, &item) {
            return Err((item, reason));
        }
        items.push_back(item);
        Ok(())
    }

    fn refusal(&self, items: &VecDeque<T>, item: &T) -> Option<RejectReason> {
        if items.contains(item) {
            Some(RejectReason::Duplicate)
        } else if items.len() >= self.capacity {
            Some(RejectReason::Full)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
