//! Readiness Label and Patch
//!
//! The node label advertising that a CSI driver is ready on a node, and the
//! JSON-Patch that pins a pod to such nodes.

use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use json_patch::{AddOperation, Patch, PatchOperation};
use serde_json::Value;

/// Value the driver sets on its readiness node label
pub const DRIVER_READY_VALUE: &str = "true";

/// Suffix appended to the driver name to form the readiness label key
const DRIVER_READY_SUFFIX: &str = "driver-ready";

/// Readiness label key for a driver, e.g. `gcs.csi.ofek.dev/driver-ready`
pub fn driver_ready_label(driver_name: &str) -> String {
    format!("{}/{}", driver_name, DRIVER_READY_SUFFIX)
}

/// Escape a single JSON-Pointer reference token (RFC 6901)
pub fn escape_json_pointer(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

// =============================================================================
// Readiness Patch
// =============================================================================

/// Pre-built patch injecting the readiness label into a pod's node selector.
///
/// Serialized once at startup. The base64 form is what an admission response
/// carries in its `patch` field and is attached to every mutating response
/// as is.
#[derive(Debug, Clone)]
pub struct ReadinessPatch {
    label: String,
    encoded: String,
}

impl ReadinessPatch {
    /// Build and serialize the patch for a driver
    pub fn new(driver_name: &str) -> Result<Self> {
        let label = driver_ready_label(driver_name);
        let patch = Patch(vec![PatchOperation::Add(AddOperation {
            path: format!("/spec/nodeSelector/{}", escape_json_pointer(&label)),
            value: Value::String(DRIVER_READY_VALUE.to_string()),
        })]);

        let document = serde_json::to_vec(&patch).map_err(|e| Error::PatchEncode(e.to_string()))?;
        let encoded = STANDARD.encode(document);

        Ok(Self { label, encoded })
    }

    /// Readiness label this patch injects
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Base64 of the serialized JSON-Patch document
    pub fn encoded(&self) -> &str {
        &self.encoded
    }
}
