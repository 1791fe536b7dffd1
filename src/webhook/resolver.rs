//! Kubernetes Claim Resolver
//!
//! Reads `PersistentVolumeClaim` objects from the API server on demand.

use crate::domain::ClaimResolver;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::{Api, Client};
use tracing::trace;

/// Live claim lookups through the API server
#[derive(Clone)]
pub struct KubeClaimResolver {
    client: Client,
}

impl KubeClaimResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClaimResolver for KubeClaimResolver {
    async fn storage_class_name(&self, namespace: &str, claim: &str) -> Result<Option<String>> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);

        let pvc = api.get(claim).await.map_err(|e| match e {
            kube::Error::Api(ref ae) if ae.code == 404 => Error::ResourceNotFound {
                kind: "PersistentVolumeClaim".into(),
                name: format!("{}/{}", namespace, claim),
            },
            e => Error::Kube(e),
        })?;

        let class_name = pvc.spec.and_then(|spec| spec.storage_class_name);
        trace!(
            "Claim {}/{} requests storage class {:?}",
            namespace,
            claim,
            class_name
        );
        Ok(class_name)
    }
}
