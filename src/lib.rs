//! Driver Ready Webhook
//!
//! A mutating admission webhook that constrains pods using a CSI driver to
//! nodes where that driver reports ready.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                          Driver Ready Webhook                               │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐                 ┌──────────────────────────────┐  │
//! │  │ StorageClass Watcher │                 │   HTTP Boundary (axum)       │  │
//! │  │ (list + watch)       │                 │   /mutate-inject-driver-...  │  │
//! │  └──────────┬───────────┘                 │   /healthz                   │  │
//! │             │ add / remove                └──────────────┬───────────────┘  │
//! │             ▼                                            │                  │
//! │  ┌──────────────────────┐      contains     ┌────────────┴───────────────┐  │
//! │  │   DriverClassSet     │ ◄──────────────── │     Decision Engine        │  │
//! │  │   (RwLock<HashSet>)  │                   │  + live PVC lookups        │  │
//! │  └──────────────────────┘                   └────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: Concurrent set of driver-backed storage class names
//! - [`watcher`]: Storage class watch keeping the cache current
//! - [`webhook`]: Decision engine and admission HTTP boundary
//! - [`domain`]: Readiness label, patch and port traits
//! - [`metrics`]: Prometheus metrics
//! - [`error`]: Error types and handling

pub mod cache;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod watcher;
pub mod webhook;

// Re-export commonly used types
pub use cache::{DriverClassSet, DEFAULT_CLASS_SENTINEL};

pub use domain::{driver_ready_label, escape_json_pointer, ClaimResolver, ReadinessPatch};

pub use error::{Error, Result};

pub use metrics::WebhookMetrics;

pub use watcher::{ClassProjection, ClassWatcher};

pub use webhook::{
    Decision, DecisionEngine, KubeClaimResolver, WebhookRouter, WebhookServer,
    WebhookServerConfig,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
