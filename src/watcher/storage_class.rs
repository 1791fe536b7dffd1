//! Storage Class Projection
//!
//! Consumes list-then-watch events for cluster-scoped `StorageClass`
//! objects and keeps the driver class set in step with them.
//!
//! Only a delete removes an entry. An update moving a class away from the
//! driver leaves its name cached, and a relist never evicts.

use crate::cache::{DriverClassSet, DEFAULT_CLASS_SENTINEL};
use crate::metrics::{event, WebhookMetrics};
use futures::{Stream, StreamExt};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client, ResourceExt};
use std::fmt::Display;
use std::pin::pin;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Annotation marking the cluster default storage class
pub const DEFAULT_CLASS_ANNOTATION: &str = "storageclass.kubernetes.io/is-default-class";

// =============================================================================
// Projection
// =============================================================================

/// Applies storage class events to the driver class set
#[derive(Clone)]
pub struct ClassProjection {
    driver_name: String,
    classes: Arc<DriverClassSet>,
    metrics: WebhookMetrics,
}

impl ClassProjection {
    pub fn new(
        driver_name: impl Into<String>,
        classes: Arc<DriverClassSet>,
        metrics: WebhookMetrics,
    ) -> Self {
        Self {
            driver_name: driver_name.into(),
            classes,
            metrics,
        }
    }

    /// Apply one watch event
    pub fn apply(&self, ev: Event<StorageClass>) {
        match ev {
            Event::Applied(sc) => {
                self.metrics.record_class_event(event::APPLIED);
                self.on_apply(&sc);
            }
            Event::Deleted(sc) => {
                self.metrics.record_class_event(event::DELETED);
                self.on_delete(&sc);
            }
            Event::Restarted(list) => {
                self.metrics.record_class_event(event::RESTARTED);
                debug!("Storage class watch (re)listed {} classes", list.len());
                for sc in &list {
                    self.on_apply(sc);
                }
            }
        }
        self.metrics.set_driver_classes(self.classes.len());
    }

    /// Create or update
    fn on_apply(&self, sc: &StorageClass) {
        let Some(name) = sc.metadata.name.as_deref() else {
            warn!("Received storage class without a name: {:?}", sc.metadata);
            return;
        };
        if !self.is_driver_backed(sc) {
            return;
        }

        if self.classes.add(name) {
            debug!("Adding '{}' to known storage classes", name);
        }
        if is_default_class(sc) && self.classes.add(DEFAULT_CLASS_SENTINEL) {
            debug!("Default storage class '{}' is backed by {}", name, self.driver_name);
        }
    }

    fn on_delete(&self, sc: &StorageClass) {
        let Some(name) = sc.metadata.name.as_deref() else {
            warn!("Received delete for storage class without a name: {:?}", sc.metadata);
            return;
        };
        if !self.is_driver_backed(sc) {
            return;
        }

        if self.classes.remove(name) {
            debug!("Removing '{}' from known storage classes", name);
        }
        if is_default_class(sc) {
            self.classes.remove(DEFAULT_CLASS_SENTINEL);
        }
    }

    fn is_driver_backed(&self, sc: &StorageClass) -> bool {
        sc.provisioner == self.driver_name
    }
}

/// Whether a class carries the default-class annotation set to `"true"`
pub fn is_default_class(sc: &StorageClass) -> bool {
    sc.annotations()
        .get(DEFAULT_CLASS_ANNOTATION)
        .map(|v| v == "true")
        .unwrap_or(false)
}

// =============================================================================
// Watcher Task
// =============================================================================

/// Long-lived task watching storage classes cluster-wide
pub struct ClassWatcher {
    client: Client,
    projection: ClassProjection,
}

impl ClassWatcher {
    pub fn new(client: Client, projection: ClassProjection) -> Self {
        Self { client, projection }
    }

    /// Spawn the watch loop onto the runtime
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Consume the cluster-wide watch until cancelled.
    ///
    /// The stream backs off and re-establishes the watch by itself.
    pub async fn run(self, shutdown: CancellationToken) {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();

        info!(
            driver = %self.projection.driver_name,
            "Starting storage class watcher"
        );

        self.projection.consume(stream, &shutdown).await;
    }
}

impl ClassProjection {
    /// Apply events from a watch stream until it ends or `shutdown` fires.
    ///
    /// Stream errors are counted and logged, never returned.
    pub async fn consume<S, E>(&self, stream: S, shutdown: &CancellationToken)
    where
        S: Stream<Item = Result<Event<StorageClass>, E>>,
        E: Display,
    {
        let mut stream = pin!(stream);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Storage class watcher shutting down");
                    break;
                }
                next = stream.next() => match next {
                    Some(Ok(ev)) => self.apply(ev),
                    Some(Err(e)) => {
                        self.metrics.record_class_event(event::ERROR);
                        warn!("Storage class watch error: {}", e);
                    }
                    None => {
                        warn!("Storage class watch stream ended");
                        break;
                    }
                },
            }
        }
    }
}
