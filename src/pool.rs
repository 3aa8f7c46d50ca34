//! Concurrent bounded pool and its checkout handle

use crate::config::{Factory, PoolConfiguration};
use crate::container::ItemContainer;
use crate::counter::{SlotCounter, WaitError};
use crate::errors::{PoolError, PoolResult, Rejected};
use crate::hooks::Hooks;
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics};

use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A checked-out object.
///
/// The handle owns its object exclusively until it is returned. A successful
/// [`return_to_pool`](Self::return_to_pool) moves the object back into the
/// pool and leaves the handle spent; a failed one leaves the handle untouched.
/// Dropping a live handle makes one non-blocking attempt to return the object
/// and discards it if the pool refuses.
pub struct PooledObject<T: PartialEq + Send> {
    item: Option<T>,
    id: usize,
    pool: Weak<Shared<T>>,
}

impl<T: PartialEq + Send> PooledObject<T> {
    fn new(item: T, id: usize, pool: Weak<Shared<T>>) -> Self {
        Self {
            item: Some(item),
            id,
            pool,
        }
    }

    /// Borrow the object, failing once the handle has been returned
    pub fn item(&self) -> PoolResult<&T> {
        self.item.as_ref().ok_or(PoolError::UseAfterReturn)
    }

    /// Mutably borrow the object, failing once the handle has been returned
    pub fn item_mut(&mut self) -> PoolResult<&mut T> {
        self.item.as_mut().ok_or(PoolError::UseAfterReturn)
    }

    /// Whether the object has already gone back to the pool
    pub fn is_returned(&self) -> bool {
        self.item.is_none()
    }

    /// Hand the object back, blocking up to `timeout` for a free slot.
    ///
    /// Returns `true` only if the pool took the object. Calling this on a
    /// returned handle is a no-op that returns `false`.
    pub fn return_to_pool(
        &mut self,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> bool {
        let Some(shared) = self.pool.upgrade() else {
            return false;
        };
        let Some(item) = self.item.take() else {
            return false;
        };

        let waited = shared.admission.acquire_blocking(timeout, cancel);
        self.settle(&shared, item, waited)
    }

    /// Async version of [`return_to_pool`](Self::return_to_pool).
    ///
    /// The object stays in the handle while waiting, so dropping the future
    /// early loses nothing.
    pub async fn return_to_pool_async(
        &mut self,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> bool {
        if self.item.is_none() {
            return false;
        }
        let Some(shared) = self.pool.upgrade() else {
            return false;
        };

        let waited = shared.admission.acquire(timeout, cancel).await;
        // `&mut self` spans the wait, so the object checked above is still here.
        self.item
            .take()
            .is_some_and(|item| self.settle(&shared, item, waited))
    }

    /// Take the object out of circulation for good
    pub fn detach(mut self) -> PoolResult<T> {
        let item = self.item.take().ok_or(PoolError::UseAfterReturn)?;
        if let Some(shared) = self.pool.upgrade() {
            shared.active.remove(&self.id);
        }
        Ok(item)
    }

    fn settle(&mut self, shared: &Shared<T>, item: T, waited: Result<(), WaitError>) -> bool {
        match shared.admit(item, waited) {
            Ok(()) => {
                shared.active.remove(&self.id);
                true
            }
            Err(rejected) => {
                self.item = Some(rejected.into_inner());
                false
            }
        }
    }
}

impl<T: PartialEq + Send> Deref for PooledObject<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the object was already returned; use [`PooledObject::item`]
    /// for a fallible borrow.
    fn deref(&self) -> &Self::Target {
        self.item
            .as_ref()
            .expect("pooled object used after it was returned to the pool")
    }
}

impl<T: PartialEq + Send> DerefMut for PooledObject<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.item
            .as_mut()
            .expect("pooled object used after it was returned to the pool")
    }
}

impl<T: PartialEq + Send> Drop for PooledObject<T> {
    fn drop(&mut self) {
        let Some(item) = self.item.take() else {
            return;
        };
        let Some(shared) = self.pool.upgrade() else {
            return;
        };

        shared.active.remove(&self.id);
        let waited = if shared.admission.try_acquire() {
            Ok(())
        } else {
            Err(WaitError::Timeout)
        };
        if let Err(rejected) = shared.admit(item, waited) {
            tracing::warn!(
                id = self.id,
                reason = %rejected.reason(),
                "dropped pooled object could not be returned; discarding it"
            );
        }
    }
}

impl<T: PartialEq + Send + fmt::Debug> fmt::Debug for PooledObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledObject")
            .field("id", &self.id)
            .field("item", &self.item)
            .finish()
    }
}

/// State shared by every pool handle and every checked-out object
struct Shared<T> {
    container: ItemContainer<T>,
    /// Free capacity slots
    admission: SlotCounter,
    /// Objects sitting in the container
    availability: SlotCounter,
    factory: Option<Factory<T>>,
    capacity: usize,
    hooks: Hooks<T>,
    active: DashMap<usize, ()>,
    next_id: AtomicUsize,
    metrics: MetricsTracker,
}

impl<T: PartialEq + Send> Shared<T> {
    /// Second half of a return, run once the admission wait has finished.
    ///
    /// A refused object gives its admission slot back.
    fn admit(&self, item: T, waited: Result<(), WaitError>) -> Result<(), Rejected<T>> {
        if let Err(err) = waited {
            self.record_wait_failure(err);
            self.metrics.total_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(Rejected::new(item, err.into()));
        }

        // A panicking `PartialEq` must not take the slot down with it.
        let pushed = panic::catch_unwind(AssertUnwindSafe(|| {
            self.container.push_unique(item, |item| self.hooks.fire_add(item))
        }));
        let pushed = match pushed {
            Ok(pushed) => pushed,
            Err(payload) => {
                self.admission.release();
                panic::resume_unwind(payload);
            }
        };

        match pushed {
            Ok(()) => {
                self.availability.release();
                self.metrics.total_returned.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(available = self.container.len(), "object returned to pool");
                Ok(())
            }
            Err((item, reason)) => {
                self.admission.release();
                self.metrics.total_rejected.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%reason, "pool refused returned object");
                Err(Rejected::new(item, reason))
            }
        }
    }

    fn record_wait_failure(&self, err: WaitError) {
        let counter = match err {
            WaitError::Timeout => &self.metrics.timeouts,
            WaitError::Cancelled => &self.metrics.cancellations,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Thread-safe bounded object pool.
///
/// Two counters coordinate access: *admission* counts free capacity and is
/// waited on by returns, *availability* counts queued objects and is waited on
/// by checkouts. When the pool is empty and has a factory, checkout builds a
/// new object instead of waiting; such objects do not take an admission slot,
/// so the number of objects in use may exceed `capacity` while the number held
/// by the pool never does.
///
/// Cloning the pool is cheap; all clones share the same objects.
///
/// # Examples
///
/// ```
/// use esox_concurrentpool::{ConcurrentObjectPool, PoolConfiguration};
/// use std::time::Duration;
///
/// let pool = ConcurrentObjectPool::new(
///     PoolConfiguration::new().with_capacity(4).with_initial_items(vec![1, 2, 3, 4]),
/// ).unwrap();
///
/// let mut obj = pool.get_object(Some(Duration::ZERO), None).unwrap();
/// assert_eq!(*obj, 1);
/// assert!(obj.return_to_pool(None, None));
/// assert!(obj.item().is_err());
/// ```
pub struct ConcurrentObjectPool<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ConcurrentObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: PartialEq + Send> ConcurrentObjectPool<T> {
    /// Create a pool from a validated configuration
    pub fn new(config: PoolConfiguration<T>) -> PoolResult<Self> {
        config.validate()?;

        let PoolConfiguration {
            capacity,
            factory,
            initial_items,
            on_add,
            on_get,
        } = config;
        let seeded = initial_items.len();

        tracing::debug!(
            capacity,
            seeded,
            factory = factory.is_some(),
            "created concurrent object pool"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                container: ItemContainer::new(initial_items, capacity),
                admission: SlotCounter::new(capacity - seeded),
                availability: SlotCounter::new(seeded),
                factory,
                capacity,
                hooks: Hooks::new(on_add, on_get),
                active: DashMap::new(),
                next_id: AtomicUsize::new(0),
                metrics: MetricsTracker::new(),
            }),
        })
    }

    /// Check out an object, blocking the current thread if none is available.
    ///
    /// `timeout` of `None` waits until an object shows up or `cancel` fires;
    /// `Some(Duration::ZERO)` never blocks.
    pub fn get_object(
        &self,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<PooledObject<T>> {
        if let Some(item) = self.create_on_demand() {
            return Ok(self.check_out(item));
        }

        self.shared
            .availability
            .acquire_blocking(timeout, cancel)
            .map_err(|err| self.wait_failed(err, timeout))?;
        Ok(self.take_front())
    }

    /// Check out an object, suspending the current task if none is available
    pub async fn get_object_async(
        &self,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<PooledObject<T>> {
        if let Some(item) = self.create_on_demand() {
            return Ok(self.check_out(item));
        }

        self.shared
            .availability
            .acquire(timeout, cancel)
            .await
            .map_err(|err| self.wait_failed(err, timeout))?;
        Ok(self.take_front())
    }

    /// Check out an object only if one is ready right now
    pub fn try_get_object(&self) -> Option<PooledObject<T>> {
        self.get_object(Some(Duration::ZERO), None).ok()
    }

    /// Put an object into the pool, blocking up to `timeout` for a free slot.
    ///
    /// Objects equal to one already queued, and objects arriving while the pool
    /// is full, are handed back inside the error.
    pub fn return_object(
        &self,
        item: T,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), Rejected<T>> {
        let waited = self.shared.admission.acquire_blocking(timeout, cancel);
        self.shared.admit(item, waited)
    }

    /// Async version of [`return_object`](Self::return_object)
    pub async fn return_object_async(
        &self,
        item: T,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), Rejected<T>> {
        let waited = self.shared.admission.acquire(timeout, cancel).await;
        self.shared.admit(item, waited)
    }

    /// Create `count` objects with the factory and add them one by one.
    ///
    /// Stops quietly at the first object the pool refuses and returns how many
    /// were added.
    pub fn fill(
        &self,
        count: usize,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<usize> {
        let factory = self.fill_factory(count)?;

        let mut added = 0;
        for _ in 0..count {
            if self.return_object(factory(), timeout, cancel).is_err() {
                break;
            }
            added += 1;
        }

        tracing::debug!(requested = count, added, "filled pool from factory");
        Ok(added)
    }

    /// Async version of [`fill`](Self::fill)
    pub async fn fill_async(
        &self,
        count: usize,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<usize> {
        let factory = self.fill_factory(count)?;

        let mut added = 0;
        for _ in 0..count {
            if self.return_object_async(factory(), timeout, cancel).await.is_err() {
                break;
            }
            added += 1;
        }

        tracing::debug!(requested = count, added, "filled pool from factory");
        Ok(added)
    }

    /// Add the given objects in order, stopping quietly at the first refusal
    pub fn fill_with<I>(
        &self,
        items: I,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<usize>
    where
        I: IntoIterator<Item = T>,
    {
        let items = self.fill_items(items)?;
        let requested = items.len();

        let mut added = 0;
        for item in items {
            if self.return_object(item, timeout, cancel).is_err() {
                break;
            }
            added += 1;
        }

        tracing::debug!(requested, added, "filled pool from items");
        Ok(added)
    }

    /// Async version of [`fill_with`](Self::fill_with)
    pub async fn fill_with_async<I>(
        &self,
        items: I,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<usize>
    where
        I: IntoIterator<Item = T>,
    {
        let items = self.fill_items(items)?;
        let requested = items.len();

        let mut added = 0;
        for item in items {
            if self.return_object_async(item, timeout, cancel).await.is_err() {
                break;
            }
            added += 1;
        }

        tracing::debug!(requested, added, "filled pool from items");
        Ok(added)
    }

    /// Register an observer for objects entering the pool.
    ///
    /// Add observers run once an object has been accepted, before it can be
    /// checked out. No queue lock is held, so they may query the pool.
    pub fn on_add<F>(&self, hook: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.shared.hooks.register_add(Arc::new(hook));
    }

    /// Register an observer for checked-out objects
    pub fn on_get<F>(&self, hook: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.shared.hooks.register_get(Arc::new(hook));
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Objects waiting in the pool
    pub fn available_count(&self) -> usize {
        self.shared.container.len()
    }

    /// Checked-out objects whose handles are still live
    pub fn active_count(&self) -> usize {
        self.shared.active.len()
    }

    /// Get pool metrics
    pub fn metrics(&self) -> PoolMetrics {
        self.shared.metrics.get_metrics(
            self.active_count(),
            self.available_count(),
            self.shared.capacity,
        )
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.metrics().export()
    }

    /// Export metrics in Prometheus format
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.metrics(), pool_name, tags)
    }

    /// Run the factory if the pool is empty and has one. No lock is held.
    fn create_on_demand(&self) -> Option<T> {
        let factory = self.shared.factory.as_ref()?;
        if !self.shared.container.is_empty() {
            return None;
        }

        let item = factory();
        self.shared.metrics.total_created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("pool empty; created object on demand");
        Some(item)
    }

    /// Dequeue after an availability slot was taken
    fn take_front(&self) -> PooledObject<T> {
        // Objects are queued before their availability slot is released and
        // only dequeued after one is taken.
        let item = self
            .shared
            .container
            .pop_front()
            .expect("availability slot taken without a queued object");
        self.shared.admission.release();
        self.check_out(item)
    }

    fn check_out(&self, item: T) -> PooledObject<T> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared.active.insert(id, ());
        self.shared.metrics.total_retrieved.fetch_add(1, Ordering::Relaxed);
        self.shared.hooks.fire_get(&item);
        tracing::trace!(id, "object checked out");

        PooledObject::new(item, id, Arc::downgrade(&self.shared))
    }

    fn wait_failed(&self, err: WaitError, timeout: Option<Duration>) -> PoolError {
        self.shared.record_wait_failure(err);
        match err {
            WaitError::Timeout => PoolError::Timeout(timeout.unwrap_or_default()),
            WaitError::Cancelled => PoolError::Cancelled,
        }
    }

    fn fill_factory(&self, count: usize) -> PoolResult<&Factory<T>> {
        let factory = self.shared.factory.as_ref().ok_or_else(|| {
            PoolError::Configuration("filling by count requires a factory".to_string())
        })?;
        if count > self.shared.capacity {
            return Err(PoolError::Configuration(format!(
                "fill count {} exceeds capacity {}",
                count, self.shared.capacity
            )));
        }
        Ok(factory)
    }

    fn fill_items<I>(&self, items: I) -> PoolResult<Vec<T>>
    where
        I: IntoIterator<Item = T>,
    {
        let items: Vec<T> = items.into_iter().collect();
        if items.len() > self.shared.capacity {
            return Err(PoolError::Configuration(format!(
                "{} fill items exceed capacity {}",
                items.len(),
                self.shared.capacity
            )));
        }
        Ok(items)
    }
}

impl<T> fmt::Debug for ConcurrentObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentObjectPool")
            .field("capacity", &self.shared.capacity)
            .field("admission", &self.shared.admission.available())
            .field("availability", &self.shared.availability.available())
            .field("active", &self.shared.active.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RejectReason;
    use std::thread;

    fn seeded(items: Vec<i32>, capacity: usize) -> ConcurrentObjectPool<i32> {
        ConcurrentObjectPool::new(
            PoolConfiguration::new()
                .with_capacity(capacity)
                .with_initial_items(items),
        )
        .unwrap()
    }

    fn slots<T: PartialEq + Send>(pool: &ConcurrentObjectPool<T>) -> (usize, usize) {
        (
            pool.shared.admission.available(),
            pool.shared.availability.available(),
        )
    }

    #[test]
    fn test_counters_start_from_seed() {
        let pool = seeded(vec![1, 2, 3], 5);

        assert_eq!(slots(&pool), (2, 3));
    }

    #[test]
    fn test_checkout_and_return_move_one_slot_each() {
        let pool = seeded(vec![1, 2, 3], 5);

        let mut obj = pool.get_object(Some(Duration::ZERO), None).unwrap();
        assert_eq!(slots(&pool), (3, 2));

        assert!(obj.return_to_pool(Some(Duration::ZERO), None));
        assert_eq!(slots(&pool), (2, 3));
    }

    #[test]
    fn test_cancelled_checkout_leaves_counters_unchanged() {
        let pool = seeded(Vec::new(), 2);
        let token = CancellationToken::new();
        let before = slots(&pool);

        let waiter = {
            let pool = pool.clone();
            let token = token.clone();
            thread::spawn(move || pool.get_object(None, Some(&token)).map(|obj| *obj))
        };
        thread::sleep(Duration::from_millis(50));
        token.cancel();

        assert_eq!(waiter.join().unwrap(), Err(PoolError::Cancelled));
        assert_eq!(slots(&pool), before);
        assert_eq!(pool.metrics().cancellations, 1);
    }

    #[test]
    fn test_cancelled_handle_return_leaves_counters_unchanged() {
        let pool = seeded(vec![1], 1);
        let obj = pool.get_object(Some(Duration::ZERO), None).unwrap();
        pool.return_object(5, Some(Duration::ZERO), None).unwrap();
        assert_eq!(slots(&pool), (0, 1));
        let token = CancellationToken::new();

        let returner = {
            let token = token.clone();
            thread::spawn(move || {
                let mut obj = obj;
                let returned = obj.return_to_pool(None, Some(&token));
                (returned, obj)
            })
        };
        thread::sleep(Duration::from_millis(50));
        token.cancel();

        let (returned, obj) = returner.join().unwrap();
        assert!(!returned);
        assert_eq!(obj.item(), Ok(&1));
        assert_eq!(slots(&pool), (0, 1));
        assert_eq!(pool.metrics().cancellations, 1);
        obj.detach().unwrap();
    }

    #[test]
    fn test_rejected_return_restores_admission_slot() {
        let pool = seeded(vec![1, 2], 4);
        assert_eq!(slots(&pool), (2, 2));

        let rejected = pool.return_object(1, Some(Duration::ZERO), None).unwrap_err();

        assert_eq!(rejected.reason(), RejectReason::Duplicate);
        assert_eq!(slots(&pool), (2, 2));
    }

    #[test]
    fn test_on_demand_creation_skips_admission() {
        let pool = ConcurrentObjectPool::new(
            PoolConfiguration::new().with_capacity(2).with_factory(|| 9),
        )
        .unwrap();

        let obj = pool.get_object(Some(Duration::ZERO), None).unwrap();

        assert_eq!(*obj, 9);
        assert_eq!(slots(&pool), (2, 0));
        assert_eq!(pool.metrics().total_created, 1);
    }

    #[test]
    fn test_drop_returns_object() {
        let pool = seeded(vec![1, 2, 3], 3);

        {
            let obj = pool.get_object(Some(Duration::ZERO), None).unwrap();
            assert_eq!(*obj, 1);
            assert_eq!(pool.active_count(), 1);
        }

        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.available_count(), 3);
        assert_eq!(slots(&pool), (0, 3));
    }

    #[tokio::test]
    async fn test_async_get() {
        let pool = seeded(vec![1, 2, 3], 3);

        let obj = pool.get_object_async(None, None).await.unwrap();

        assert_eq!(*obj, 1);
    }
}
