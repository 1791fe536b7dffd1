//! Storage Class Watcher
//!
//! Background task projecting driver-backed storage classes into the
//! [`DriverClassSet`](crate::cache::DriverClassSet).

pub mod storage_class;

pub use storage_class::*;
