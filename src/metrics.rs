//! Metrics collection and export for object pools

use crossbeam::utils::CachePadded;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Metrics data for a pool
///
/// # Examples
///
/// ```
/// use esox_concurrentpool::{ConcurrentObjectPool, PoolConfiguration};
///
/// let pool = ConcurrentObjectPool::new(
///     PoolConfiguration::new().with_capacity(4).with_initial_items(vec![1, 2, 3]),
/// ).unwrap();
///
/// {
///     let _obj = pool.try_get_object().unwrap();
///     let metrics = pool.metrics();
///     assert_eq!(metrics.total_retrieved, 1);
///     assert_eq!(metrics.active_objects, 1);
///     assert_eq!(metrics.available_objects, 2);
/// }
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Total objects checked out
    pub total_retrieved: usize,

    /// Objects manufactured by the factory on checkout
    pub total_created: usize,

    /// Objects accepted back into the pool
    pub total_returned: usize,

    /// Returns refused as duplicate, over capacity, timed out or cancelled
    pub total_rejected: usize,

    /// Waits that ran out of time
    pub timeouts: usize,

    /// Waits aborted by a cancellation token
    pub cancellations: usize,

    /// Checked-out objects not yet returned
    pub active_objects: usize,

    /// Objects waiting in the pool
    pub available_objects: usize,

    /// Pool utilization ratio (0.0 to 1.0)
    pub utilization: f64,

    /// Maximum pool capacity
    pub max_capacity: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_retrieved".to_string(), self.total_retrieved.to_string());
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_returned".to_string(), self.total_returned.to_string());
        metrics.insert("total_rejected".to_string(), self.total_rejected.to_string());
        metrics.insert("timeouts".to_string(), self.timeouts.to_string());
        metrics.insert("cancellations".to_string(), self.cancellations.to_string());
        metrics.insert("active_objects".to_string(), self.active_objects.to_string());
        metrics.insert("available_objects".to_string(), self.available_objects.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("max_capacity".to_string(), self.max_capacity.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_concurrentpool::{ConcurrentObjectPool, PoolConfiguration};
    /// use std::collections::HashMap;
    ///
    /// let pool = ConcurrentObjectPool::new(
    ///     PoolConfiguration::new().with_initial_items(vec![1, 2, 3]),
    /// ).unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = pool.export_metrics_prometheus("my_pool", Some(&tags));
    /// assert!(output.contains("objectpool_objects_available{pool=\"my_pool\",service=\"api\"} 3"));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let labels = Self::format_labels(pool_name, tags);
        let mut output = String::new();

        let gauges = [
            ("objectpool_objects_active", "Current checked-out objects", metrics.active_objects.to_string()),
            ("objectpool_objects_available", "Current available objects", metrics.available_objects.to_string()),
            ("objectpool_utilization", "Pool utilization ratio", format!("{:.2}", metrics.utilization)),
        ];
        for (name, help, value) in gauges {
            Self::push_metric(&mut output, name, help, "gauge", &labels, &value);
        }

        let counters = [
            ("objectpool_objects_retrieved_total", "Total objects checked out", metrics.total_retrieved),
            ("objectpool_objects_created_total", "Objects created on demand", metrics.total_created),
            ("objectpool_objects_returned_total", "Total objects returned", metrics.total_returned),
            ("objectpool_returns_rejected_total", "Returns refused by the pool", metrics.total_rejected),
            ("objectpool_waits_timed_out_total", "Waits that timed out", metrics.timeouts),
            ("objectpool_waits_cancelled_total", "Waits that were cancelled", metrics.cancellations),
        ];
        for (name, help, value) in counters {
            Self::push_metric(&mut output, name, help, "counter", &labels, &value.to_string());
        }

        output
    }

    fn push_metric(output: &mut String, name: &str, help: &str, kind: &str, labels: &str, value: &str) {
        output.push_str(&format!("# HELP {} {}\n", name, help));
        output.push_str(&format!("# TYPE {} {}\n", name, kind));
        output.push_str(&format!("{}{{{}}} {}\n", name, labels, value));
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut tags: Vec<_> = tags.iter().collect();
            tags.sort();
            for (key, value) in tags {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker
///
/// Counters are bumped from every checkout and return, so each sits on its own
/// cache line.
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub total_retrieved: CachePadded<AtomicUsize>,
    pub total_created: CachePadded<AtomicUsize>,
    pub total_returned: CachePadded<AtomicUsize>,
    pub total_rejected: CachePadded<AtomicUsize>,
    pub timeouts: CachePadded<AtomicUsize>,
    pub cancellations: CachePadded<AtomicUsize>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_metrics(&self, active: usize, available: usize, capacity: usize) -> PoolMetrics {
        let utilization = if capacity > 0 {
            (active as f64 / capacity as f64).min(1.0)
        } else {
            0.0
        };

        PoolMetrics {
            total_retrieved: self.total_retrieved.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_returned: self.total_returned.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            active_objects: active,
            available_objects: available,
            utilization,
            max_capacity: capacity,
        }
    }
}
