//! Membership Set
//!
//! Concurrent set of storage class names backed by a reader/writer lock.
//! Reads happen on every admission request while writes only follow
//! storage class events, so readers share the lock.

use parking_lot::RwLock;
use std::collections::HashSet;

/// Reserved name meaning "the cluster default storage class is driver-backed"
pub const DEFAULT_CLASS_SENTINEL: &str = "";

/// Storage class names backed by the driver
#[derive(Debug, Default)]
pub struct DriverClassSet {
    classes: RwLock<HashSet<String>>,
}

impl DriverClassSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a class is driver-backed
    #[inline]
    pub fn contains(&self, class_name: &str) -> bool {
        self.classes.read().contains(class_name)
    }

    /// Insert a class; returns `true` if it was not already present
    pub fn add(&self, class_name: &str) -> bool {
        let mut classes = self.classes.write();
        if classes.contains(class_name) {
            return false;
        }
        classes.insert(class_name.to_string())
    }

    /// Remove a class; removing an absent class is a no-op
    pub fn remove(&self, class_name: &str) -> bool {
        self.classes.write().remove(class_name)
    }

    /// Number of tracked names, sentinel included
    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }

    /// Sorted copy of the tracked names
    pub fn snapshot(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.read().iter().cloned().collect();
        names.sort();
        names
    }
}
