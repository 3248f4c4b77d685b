//! Delivery counting for callbacks and channel handlers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Records deliveries under a label and flags duplicates.
///
/// Clones share the same record, so one clone can move into a callback
/// while the test inspects another.
///
/// ```
/// use tether_test_support::DeliveryLog;
///
/// let log = DeliveryLog::<String>::new();
/// let sink = log.clone();
/// let callback = move |value: String| sink.record("req-1", value);
/// callback("ok".to_string());
///
/// assert_eq!(log.count("req-1"), 1);
/// assert_eq!(log.duplicates(), 0);
/// ```
#[derive(Debug)]
pub struct DeliveryLog<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

#[derive(Debug)]
struct Inner<T> {
    entries: Vec<(String, T)>,
    counts: HashMap<String, usize>,
    duplicates: usize,
}

impl<T> Clone for DeliveryLog<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for DeliveryLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DeliveryLog<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: Vec::new(),
                counts: HashMap::new(),
                duplicates: 0,
            })),
        }
    }

    pub fn record(&self, label: impl Into<String>, value: T) {
        let label = label.into();
        let mut inner = self.inner.lock();
        let count = inner.counts.entry(label.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            inner.duplicates += 1;
        }
        inner.entries.push((label, value));
    }

    /// Deliveries recorded under `label`.
    pub fn count(&self, label: &str) -> usize {
        self.inner.lock().counts.get(label).copied().unwrap_or(0)
    }

    /// Deliveries beyond the first for any label.
    pub fn duplicates(&self) -> usize {
        self.inner.lock().duplicates
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> DeliveryLog<T> {
    /// Every recorded value, in delivery order.
    pub fn values(&self) -> Vec<T> {
        self.inner.lock().entries.iter().map(|(_, v)| v.clone()).collect()
    }

    /// Values recorded under `label`, in delivery order.
    pub fn values_for(&self, label: &str) -> Vec<T> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|(l, _)| l == label)
            .map(|(_, v)| v.clone())
            .collect()
    }
}
