//! Domain Ports - Core trait definitions for the webhook
//!
//! These traits define the boundaries between the decision logic and the
//! control plane. Adapters implement these traits to provide concrete lookups.

use crate::error::Result;
use async_trait::async_trait;

// =============================================================================
// Claim Resolution
// =============================================================================

/// Resolves a persistent volume claim to the storage class it requests.
///
/// Implementations perform a live read; results are never cached.
#[async_trait]
pub trait ClaimResolver: Send + Sync {
    /// Storage class named by the claim `namespace/claim`.
    ///
    /// `Ok(None)` means the claim does not name a class and falls back to
    /// the cluster default.
    async fn storage_class_name(&self, namespace: &str, claim: &str) -> Result<Option<String>>;
}
