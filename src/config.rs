//! Pool configuration options

use crate::errors::{PoolError, PoolResult};
use crate::hooks::Hook;

use std::fmt;
use std::sync::Arc;

/// Zero-argument producer of new pooled objects
pub type Factory<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Configuration for a [`ConcurrentObjectPool`](crate::ConcurrentObjectPool)
///
/// # Examples
///
/// ```
/// use esox_concurrentpool::PoolConfiguration;
///
/// let config = PoolConfiguration::new()
///     .with_capacity(8)
///     .with_initial_items(vec![1, 2, 3])
///     .with_factory(|| 0);
///
/// assert_eq!(config.capacity, 8);
/// assert_eq!(config.initial_items.len(), 3);
/// assert!(config.factory.is_some());
/// ```
pub struct PoolConfiguration<T> {
    /// Maximum number of objects the pool holds at once
    pub capacity: usize,

    /// Used to manufacture objects when the pool runs dry
    pub factory: Option<Factory<T>>,

    /// Objects the pool starts with, handed out in this order
    pub initial_items: Vec<T>,

    /// Called after an object is added to the pool
    pub on_add: Vec<Hook<T>>,

    /// Called after an object is checked out
    pub on_get: Vec<Hook<T>>,
}

impl<T> Default for PoolConfiguration<T> {
    fn default() -> Self {
        Self {
            capacity: usize::MAX,
            factory: None,
            initial_items: Vec::new(),
            on_add: Vec::new(),
            on_get: Vec::new(),
        }
    }
}

impl<T> PoolConfiguration<T> {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capacity bound
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the factory used for on-demand creation and `fill`
    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Seed the pool
    pub fn with_initial_items(mut self, items: Vec<T>) -> Self {
        self.initial_items = items;
        self
    }

    /// Register an observer for objects entering the pool
    pub fn with_on_add<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.on_add.push(Arc::new(hook));
        self
    }

    /// Register an observer for checked-out objects
    pub fn with_on_get<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.on_get.push(Arc::new(hook));
        self
    }
}

impl<T: PartialEq> PoolConfiguration<T> {
    /// Check the configuration before a pool is built from it
    pub fn validate(&self) -> PoolResult<()> {
        if self.capacity == 0 {
            return Err(PoolError::Configuration(
                "capacity must be greater than zero".to_string(),
            ));
        }

        if self.initial_items.len() > self.capacity {
            return Err(PoolError::Configuration(format!(
                "{} initial items exceed capacity {}",
                self.initial_items.len(),
                self.capacity
            )));
        }

        let has_duplicates = self
            .initial_items
            .iter()
            .enumerate()
            .any(|(idx, item)| self.initial_items[idx + 1..].contains(item));
        if has_duplicates {
            return Err(PoolError::Configuration(
                "initial items contain duplicates".to_string(),
            ));
        }

        Ok(())
    }
}

impl<T> fmt::Debug for PoolConfiguration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfiguration")
            .field("capacity", &self.capacity)
            .field("factory", &self.factory.is_some())
            .field("initial_items", &self.initial_items.len())
            .field("on_add", &self.on_add.len())
            .field("on_get", &self.on_get.len())
            .finish()
    }
}
