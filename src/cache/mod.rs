//! Driver Storage Class Cache
//!
//! Tracks which storage class names are provisioned by the configured CSI
//! driver. Written by the class watcher, read by every admission request.
//!
//! # Usage
//!
//! ```
//! use driver_ready_webhook::cache::{DriverClassSet, DEFAULT_CLASS_SENTINEL};
//!
//! let classes = DriverClassSet::new();
//! classes.add("gcs-standard");
//! classes.add(DEFAULT_CLASS_SENTINEL);
//!
//! assert!(classes.contains("gcs-standard"));
//! assert!(classes.contains(DEFAULT_CLASS_SENTINEL));
//! ```

pub mod membership;

pub use membership::*;
