//! Webhook HTTP Handlers
//!
//! Implements the mutating admission endpoint and the liveness probe.

use crate::error::{Error, Result};
use crate::metrics::{outcome, WebhookMetrics};
use crate::webhook::decision::{Decision, DecisionEngine};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use k8s_openapi::api::core::v1::Pod;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, trace, warn};

/// Path the mutating webhook configuration points at
pub const MUTATE_PATH: &str = "/mutate-inject-driver-ready-selector";

/// Liveness probe path
pub const HEALTHZ_PATH: &str = "/healthz";

const PATCH_TYPE_JSON: &str = "JSONPatch";

// =============================================================================
// Router
// =============================================================================

/// Webhook router builder
pub struct WebhookRouter {
    engine: Arc<DecisionEngine>,
    metrics: WebhookMetrics,
    max_body_size: usize,
}

impl WebhookRouter {
    pub fn new(engine: Arc<DecisionEngine>, metrics: WebhookMetrics, max_body_size: usize) -> Self {
        Self {
            engine,
            metrics,
            max_body_size,
        }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            engine: self.engine,
            metrics: self.metrics,
        };

        Router::new()
            // Other methods on the mutate path are answered 405 Method Not Allowed
            .route(MUTATE_PATH, post(inject_driver_ready_selector))
            .route(HEALTHZ_PATH, get(healthz))
            .layer(DefaultBodyLimit::max(self.max_body_size))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    engine: Arc<DecisionEngine>,
    metrics: WebhookMetrics,
}

// =============================================================================
// Handlers
// =============================================================================

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn inject_driver_ready_selector(State(state): State<AppState>, body: Bytes) -> Response {
    match review(&state.engine, &body).await {
        Ok((bytes, decision)) => {
            let label = if decision.patches() {
                outcome::PATCHED
            } else {
                outcome::SKIPPED
            };
            state.metrics.record_admission(label);
            trace!("Answering '{}'", String::from_utf8_lossy(&bytes));

            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            state.metrics.record_admission(outcome::REJECTED);
            warn!("Rejecting admission review: {}", e);
            (e.status_code(), e.to_string()).into_response()
        }
    }
}

/// Decode a review body, decide, and encode the response review
pub async fn review(engine: &DecisionEngine, body: &[u8]) -> Result<(Vec<u8>, Decision)> {
    let review: AdmissionReview<DynamicObject> =
        serde_json::from_slice(body).map_err(|e| Error::AdmissionDecode(e.to_string()))?;
    let req = TryInto::<AdmissionRequest<DynamicObject>>::try_into(review)
        .map_err(|e| Error::AdmissionDecode(e.to_string()))?;

    if !matches!(req.operation, Operation::Create) {
        return Err(Error::UnsupportedOperation);
    }

    let mut pod = parse_pod(&req)?;
    // The embedded pod may not carry a namespace yet
    pod.metadata.namespace = req.namespace.clone();

    let decision = engine.decide(&pod).await;

    let rsp = AdmissionResponse::from(&req).into_review();
    let mut value = serde_json::to_value(&rsp).map_err(|e| Error::ResponseEncode(e.to_string()))?;
    if decision.patches() {
        attach_patch(&mut value, engine.patch().encoded())?;
    }

    let bytes = serde_json::to_vec(&value).map_err(|e| Error::ResponseEncode(e.to_string()))?;
    Ok((bytes, decision))
}

/// Attach the pre-encoded patch. The `patch` field travels as a base64
/// string, so the typed response field is bypassed.
fn attach_patch(review: &mut Value, encoded: &str) -> Result<()> {
    let response = review
        .get_mut("response")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| Error::ResponseEncode("review carries no response".into()))?;
    response.insert("patchType".into(), Value::String(PATCH_TYPE_JSON.into()));
    response.insert("patch".into(), Value::String(encoded.into()));
    Ok(())
}

fn parse_pod(req: &AdmissionRequest<DynamicObject>) -> Result<Pod> {
    let obj = req
        .object
        .as_ref()
        .ok_or_else(|| Error::PodDecode("request carries no object".into()))?;
    let value = serde_json::to_value(obj).map_err(|e| Error::PodDecode(e.to_string()))?;
    debug!("Received '{}'", value);
    serde_json::from_value(value).map_err(|e| Error::PodDecode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DriverClassSet, DEFAULT_CLASS_SENTINEL};
    use crate::domain::ClaimResolver;
    use assert_matches::assert_matches;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde_json::json;
    use tower::ServiceExt;

    const DRIVER: &str = "gcs.csi.ofek.dev";

    /// Every claim requests the given class
    struct FixedClass(Option<String>);

    #[async_trait::async_trait]
    impl ClaimResolver for FixedClass {
        async fn storage_class_name(&self, _: &str, _: &str) -> Result<Option<String>> {
            Ok(self.0.clone())
        }
    }

    fn app(classes: &[&str], claim_class: Option<&str>) -> (Router, WebhookMetrics) {
        let set = Arc::new(DriverClassSet::new());
        for class in classes {
            set.add(class);
        }
        let metrics = WebhookMetrics::new().unwrap();
        let engine = DecisionEngine::new(
            DRIVER,
            set,
            Arc::new(FixedClass(claim_class.map(String::from))),
            metrics.clone(),
        )
        .unwrap();
        let router = WebhookRouter::new(Arc::new(engine), metrics.clone(), 1024 * 1024).build();
        (router, metrics)
    }

    fn review_body(operation: &str, object: Value) -> String {
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": { "group": "", "version": "v1", "kind": "Pod" },
                "resource": { "group": "", "version": "v1", "resource": "pods" },
                "requestKind": { "group": "", "version": "v1", "kind": "Pod" },
                "requestResource": { "group": "", "version": "v1", "resource": "pods" },
                "name": "web",
                "namespace": "team-a",
                "operation": operation,
                "userInfo": { "username": "admin", "groups": ["system:authenticated"] },
                "object": object,
                "dryRun": false
            }
        })
        .to_string()
    }

    fn pod_with_volume(volume: Value) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "web" },
            "spec": {
                "containers": [{ "name": "app", "image": "nginx" }],
                "volumes": [volume]
            }
        })
    }

    fn csi_pod() -> Value {
        pod_with_volume(json!({ "name": "data", "csi": { "driver": DRIVER } }))
    }

    fn claim_pod() -> Value {
        pod_with_volume(json!({
            "name": "data",
            "persistentVolumeClaim": { "claimName": "data" }
        }))
    }

    async fn send_review(app: Router, body: String) -> (StatusCode, Vec<u8>) {
        let rsp = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(MUTATE_PATH)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = rsp.status();
        let bytes = axum::body::to_bytes(rsp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_healthz() {
        let (app, _) = app(&[], None);
        let rsp = app
            .oneshot(
                Request::builder()
                    .uri(HEALTHZ_PATH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(rsp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(rsp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn test_mutates_csi_pod() {
        let (app, metrics) = app(&[], None);
        let (status, body) = send_review(app, review_body("CREATE", csi_pod())).await;

        assert_eq!(status, StatusCode::OK);
        let review: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(review["apiVersion"], "admission.k8s.io/v1");
        assert_eq!(review["kind"], "AdmissionReview");
        assert_eq!(
            review["response"]["uid"],
            "705ab4f5-6393-11e8-b7cc-42010a800002"
        );
        assert_eq!(review["response"]["allowed"], true);
        assert_eq!(review["response"]["patchType"], "JSONPatch");
        assert_eq!(metrics.admissions(outcome::PATCHED), 1);

        let encoded = review["response"]["patch"].as_str().unwrap();
        let patch: Value = serde_json::from_slice(&STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(
            patch,
            json!([{
                "op": "add",
                "path": "/spec/nodeSelector/gcs.csi.ofek.dev~1driver-ready",
                "value": "true"
            }])
        );
    }

    #[tokio::test]
    async fn test_every_mutation_carries_the_same_patch() {
        let (app, _) = app(&[], None);
        let (_, first) = send_review(app.clone(), review_body("CREATE", csi_pod())).await;
        let (_, second) = send_review(app, review_body("CREATE", csi_pod())).await;

        let first: Value = serde_json::from_slice(&first).unwrap();
        let second: Value = serde_json::from_slice(&second).unwrap();
        assert_eq!(first["response"]["patch"], second["response"]["patch"]);
    }

    #[test]
    fn test_attach_patch_requires_response() {
        let mut review = json!({ "apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview" });
        assert_matches!(
            attach_patch(&mut review, "W10="),
            Err(Error::ResponseEncode(_))
        );
    }

    #[tokio::test]
    async fn test_allows_without_patch_when_not_using_driver() {
        let (app, metrics) = app(&["gcs"], Some("standard"));
        let (status, body) = send_review(app, review_body("CREATE", claim_pod())).await;

        assert_eq!(status, StatusCode::OK);
        let review: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(review["response"]["allowed"], true);
        assert!(review["response"].get("patch").map_or(true, Value::is_null));
        assert!(review["response"].get("patchType").map_or(true, Value::is_null));
        assert_eq!(metrics.admissions(outcome::SKIPPED), 1);
    }

    #[tokio::test]
    async fn test_mutates_claim_on_default_class() {
        let (app, _) = app(&[DEFAULT_CLASS_SENTINEL], None);
        let (status, body) = send_review(app, review_body("CREATE", claim_pod())).await;

        assert_eq!(status, StatusCode::OK);
        let review: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(review["response"]["patchType"], "JSONPatch");
        assert!(review["response"]["patch"].is_string());
    }

    #[tokio::test]
    async fn test_skips_pod_with_ready_selector() {
        let (app, _) = app(&[], None);
        let mut pod = csi_pod();
        pod["spec"]["nodeSelector"] = json!({ "gcs.csi.ofek.dev/driver-ready": "true" });

        let (status, body) = send_review(app, review_body("CREATE", pod)).await;

        assert_eq!(status, StatusCode::OK);
        let review: Value = serde_json::from_slice(&body).unwrap();
        assert!(review["response"].get("patch").map_or(true, Value::is_null));
    }

    #[tokio::test]
    async fn test_rejects_non_json_body() {
        let (app, metrics) = app(&[], None);
        let (status, body) = send_review(app, "not json".to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8(body)
            .unwrap()
            .starts_with("unable to decode request"));
        assert_eq!(metrics.admissions(outcome::REJECTED), 1);
    }

    #[tokio::test]
    async fn test_rejects_review_without_request() {
        let (app, _) = app(&[], None);
        let body = json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview"
        })
        .to_string();

        let (status, _) = send_review(app, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rejects_update_operation() {
        let (app, _) = app(&[], None);
        let (status, body) = send_review(app, review_body("UPDATE", csi_pod())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            String::from_utf8(body).unwrap(),
            "unsupported admission operation, operation must be 'create'"
        );
    }

    #[tokio::test]
    async fn test_rejects_object_that_is_not_a_pod() {
        let (app, _) = app(&[], None);
        let service = json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "name": "web" },
            "spec": { "ports": [{ "port": 80 }] }
        });

        let (status, body) = send_review(app, review_body("CREATE", service)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8(body)
            .unwrap()
            .starts_with("unable to decode request object, expected v1/Pod"));
    }

    #[tokio::test]
    async fn test_get_on_mutate_path_not_allowed() {
        let (app, _) = app(&[], None);
        let rsp = app
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri(MUTATE_PATH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(rsp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_review_populates_namespace_for_claim_lookup() {
        struct NamespaceClass;

        #[async_trait::async_trait]
        impl ClaimResolver for NamespaceClass {
            async fn storage_class_name(&self, namespace: &str, _: &str) -> Result<Option<String>> {
                Ok(Some(format!("{}-class", namespace)))
            }
        }

        let set = Arc::new(DriverClassSet::new());
        set.add("team-a-class");
        let engine = DecisionEngine::new(
            DRIVER,
            set,
            Arc::new(NamespaceClass),
            WebhookMetrics::new().unwrap(),
        )
        .unwrap();

        let body = review_body("CREATE", claim_pod());
        let (_, decision) = tokio_test::assert_ok!(review(&engine, body.as_bytes()).await);
        assert_eq!(decision, Decision::Mutate);
    }
}
