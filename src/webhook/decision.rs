//! Admission Decision Engine
//!
//! Decides whether a pod must be pinned to nodes where the driver is ready.
//! Every pod is allowed; the decision only controls whether the readiness
//! patch is attached.

use crate::cache::{DriverClassSet, DEFAULT_CLASS_SENTINEL};
use crate::domain::{ClaimResolver, ReadinessPatch};
use crate::error::Result;
use crate::metrics::WebhookMetrics;
use k8s_openapi::api::core::v1::{NodeSelectorTerm, Pod, Volume};
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, warn};

// =============================================================================
// Decision
// =============================================================================

/// Outcome of evaluating a pod
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The pod already selects or prefers ready nodes
    AlreadyPreferred,
    /// The pod uses the driver and gets the readiness patch
    Mutate,
    /// The pod has no volume backed by the driver
    NotUsingDriver,
}

impl Decision {
    /// Whether the readiness patch is attached
    pub fn patches(&self) -> bool {
        matches!(self, Decision::Mutate)
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Combines pod inspection with the driver class set
pub struct DecisionEngine {
    driver_name: String,
    patch: ReadinessPatch,
    classes: Arc<DriverClassSet>,
    resolver: Arc<dyn ClaimResolver>,
    metrics: WebhookMetrics,
}

impl DecisionEngine {
    pub fn new(
        driver_name: impl Into<String>,
        classes: Arc<DriverClassSet>,
        resolver: Arc<dyn ClaimResolver>,
        metrics: WebhookMetrics,
    ) -> Result<Self> {
        let driver_name = driver_name.into();
        let patch = ReadinessPatch::new(&driver_name)?;
        Ok(Self {
            driver_name,
            patch,
            classes,
            resolver,
            metrics,
        })
    }

    /// Pre-built patch attached to mutated pods
    pub fn patch(&self) -> &ReadinessPatch {
        &self.patch
    }

    /// Evaluate a pod. The pod's namespace must already be populated.
    pub async fn decide(&self, pod: &Pod) -> Decision {
        let namespace = pod.namespace().unwrap_or_default();
        let name = pod.name_any();

        if has_ready_preference(pod, self.patch.label()) {
            debug!(
                "Skipping pod {}/{} already has driver ready preference",
                namespace, name
            );
            return Decision::AlreadyPreferred;
        }

        if self.uses_driver(pod, &namespace).await {
            debug!("Mutating pod {}/{}", namespace, name);
            Decision::Mutate
        } else {
            debug!(
                "Skipping pod {}/{} has no volume backed by {}",
                namespace, name, self.driver_name
            );
            Decision::NotUsingDriver
        }
    }

    async fn uses_driver(&self, pod: &Pod, namespace: &str) -> bool {
        let volumes: &[Volume] = pod
            .spec
            .as_ref()
            .and_then(|spec| spec.volumes.as_deref())
            .unwrap_or_default();

        // Inline CSI volumes need no lookup, check them first
        if volumes.iter().any(|v| self.is_inline_driver_volume(v)) {
            return true;
        }

        for claim in volumes.iter().filter_map(|v| v.persistent_volume_claim.as_ref()) {
            match self
                .resolver
                .storage_class_name(namespace, &claim.claim_name)
                .await
            {
                Ok(class_name) => {
                    let class_name = class_name.as_deref().unwrap_or(DEFAULT_CLASS_SENTINEL);
                    if self.classes.contains(class_name) {
                        return true;
                    }
                }
                Err(e) => {
                    self.metrics.record_claim_lookup_failure();
                    warn!(
                        "Failed to resolve claim {}/{}, assuming it is not backed by {}: {}",
                        namespace, claim.claim_name, self.driver_name, e
                    );
                }
            }
        }

        false
    }

    fn is_inline_driver_volume(&self, volume: &Volume) -> bool {
        volume
            .csi
            .as_ref()
            .map(|csi| csi.driver == self.driver_name)
            .unwrap_or(false)
    }
}

/// Whether the pod's node selector or node affinity already references `label`
pub fn has_ready_preference(pod: &Pod, label: &str) -> bool {
    let Some(spec) = pod.spec.as_ref() else {
        return false;
    };

    if spec
        .node_selector
        .as_ref()
        .map(|selector| selector.contains_key(label))
        .unwrap_or(false)
    {
        return true;
    }

    let Some(node_affinity) = spec.affinity.as_ref().and_then(|a| a.node_affinity.as_ref()) else {
        return false;
    };

    let required = node_affinity
        .required_during_scheduling_ignored_during_execution
        .as_ref()
        .map(|selector| {
            selector
                .node_selector_terms
                .iter()
                .any(|term| term_references(term, label))
        })
        .unwrap_or(false);

    let preferred = node_affinity
        .preferred_during_scheduling_ignored_during_execution
        .as_ref()
        .map(|terms| {
            terms
                .iter()
                .any(|term| term_references(&term.preference, label))
        })
        .unwrap_or(false);

    required || preferred
}

fn term_references(term: &NodeSelectorTerm, label: &str) -> bool {
    term.match_expressions
        .as_ref()
        .map(|exprs| exprs.iter().any(|req| req.key == label))
        .unwrap_or(false)
}
