//! Admission server
//!
//! Every mutator is served at `/webhooks/{name}`. Objects are decoded into
//! their typed form, mutated, and the response patch is the JSON diff between
//! the typed object before and after the mutation, so encoding differences of
//! the typed models never show up as changes.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use tracing::{debug, error, info, warn};

use metal_common::client::SeedClient;
use metal_common::{ControllerConfiguration, Error, ImageVector, Result};

use crate::cloudprovider::CloudProviderSecretMutator;
use crate::context::{MutableObject, MutationContext, Mutator, ObjectKind};
use crate::controlplane::ControlPlaneMutator;
use crate::etcd::SeedProviderMutator;
use crate::exposure::ExposureMutator;
use crate::shoot::ShootMutator;

/// Error type for webhook requests
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// No mutator is registered under the requested path
    #[error("unknown webhook: {0}")]
    UnknownWebhook(String),

    /// The admission review could not be turned into a request
    #[error("invalid admission review: {0}")]
    InvalidReview(String),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::UnknownWebhook(_) => StatusCode::NOT_FOUND,
            WebhookError::InvalidReview(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

/// All mutators this extension serves
pub fn default_mutators() -> Vec<Arc<dyn Mutator>> {
    vec![
        Arc::new(ControlPlaneMutator),
        Arc::new(ExposureMutator),
        Arc::new(SeedProviderMutator),
        Arc::new(CloudProviderSecretMutator),
        Arc::new(ShootMutator),
    ]
}

/// Shared state of the admission handlers
pub struct WebhookState {
    config: Arc<ControllerConfiguration>,
    images: Arc<ImageVector>,
    seed: Arc<dyn SeedClient>,
    mutators: BTreeMap<&'static str, Arc<dyn Mutator>>,
}

impl WebhookState {
    /// Register mutators by name
    ///
    /// Fails on duplicate names and on mutators registering for no kind.
    pub fn new(
        config: Arc<ControllerConfiguration>,
        images: Arc<ImageVector>,
        seed: Arc<dyn SeedClient>,
        mutators: Vec<Arc<dyn Mutator>>,
    ) -> Result<Self> {
        let mut registered = BTreeMap::new();
        for mutator in mutators {
            if mutator.kinds().is_empty() {
                return Err(Error::invalid_config(format!(
                    "webhook {} registers for no kind",
                    mutator.name()
                )));
            }
            if registered.insert(mutator.name(), mutator.clone()).is_some() {
                return Err(Error::invalid_config(format!(
                    "webhook {} registered twice",
                    mutator.name()
                )));
            }
        }
        Ok(Self {
            config,
            images,
            seed,
            mutators: registered,
        })
    }

    /// Registered mutators, ordered by name
    pub fn mutators(&self) -> impl Iterator<Item = &Arc<dyn Mutator>> {
        self.mutators.values()
    }

    /// Look up a mutator by webhook name
    pub fn mutator(&self, name: &str) -> Option<&Arc<dyn Mutator>> {
        self.mutators.get(name)
    }
}

/// Create the router with all webhook endpoints and `/healthz`
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/webhooks/{name}", post(mutate_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

/// Handle one AdmissionReview for the webhook named in the path
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    Path(name): Path<String>,
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> std::result::Result<Json<AdmissionReview<DynamicObject>>, WebhookError> {
    let mutator = state
        .mutator(&name)
        .cloned()
        .ok_or(WebhookError::UnknownWebhook(name))?;

    let request: AdmissionRequest<DynamicObject> = body.try_into().map_err(|e| {
        error!(error = %e, "Failed to parse admission request");
        WebhookError::InvalidReview(format!("{e}"))
    })?;

    let response = review(&state, mutator.as_ref(), &request).await;
    Ok(Json(response.into_review()))
}

/// Run a mutator against an admission request
///
/// Errors deny the request with their message.
pub async fn review(
    state: &WebhookState,
    mutator: &dyn Mutator,
    request: &AdmissionRequest<DynamicObject>,
) -> AdmissionResponse {
    let uid = request.uid.clone();

    let patch = match mutate_request(state, mutator, request).await {
        Ok(Some(patch)) => patch,
        Ok(None) => return AdmissionResponse::from(request),
        Err(e) => {
            warn!(
                uid = %uid,
                webhook = mutator.name(),
                namespace = ?request.namespace,
                name = %request.name,
                error = %e,
                "Denying admission request"
            );
            return AdmissionResponse::from(request).deny(e.to_string());
        }
    };

    info!(
        uid = %uid,
        webhook = mutator.name(),
        namespace = ?request.namespace,
        name = %request.name,
        patch_ops = patch.0.len(),
        "Patching object"
    );

    match AdmissionResponse::from(request).with_patch(patch) {
        Ok(response) => response,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to serialize patch");
            AdmissionResponse::from(request).deny(format!("patch serialization error: {e}"))
        }
    }
}

async fn mutate_request(
    state: &WebhookState,
    mutator: &dyn Mutator,
    request: &AdmissionRequest<DynamicObject>,
) -> Result<Option<json_patch::Patch>> {
    if !matches!(request.operation, Operation::Create | Operation::Update) {
        return Ok(None);
    }

    let gvk = &request.kind;
    let Some(kind) = ObjectKind::from_group_kind(&gvk.group, &gvk.kind)
        .filter(|k| mutator.kinds().contains(k))
    else {
        warn!(
            webhook = mutator.name(),
            group = %gvk.group,
            kind = %gvk.kind,
            "Webhook called for unregistered kind, allowing unchanged"
        );
        return Ok(None);
    };

    let Some(object) = &request.object else {
        debug!(uid = %request.uid, "No object in request, allowing unchanged");
        return Ok(None);
    };
    let mut new = MutableObject::decode(kind, serde_json::to_value(object)?)?;
    let old = match &request.old_object {
        Some(old) => Some(MutableObject::decode(kind, serde_json::to_value(old)?)?),
        None => None,
    };

    let namespace = request
        .namespace
        .clone()
        .or_else(|| new.meta().namespace.clone())
        .unwrap_or_default();
    let ctx = MutationContext::new(
        state.config.clone(),
        state.images.clone(),
        state.seed.clone(),
        namespace,
    );

    let before = new.to_value()?;
    mutator.handle(&ctx, &mut new, old.as_ref()).await?;
    let after = new.to_value()?;

    let patch = json_patch::diff(&before, &after);
    Ok((!patch.0.is_empty()).then_some(patch))
}

/// TLS listener settings
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to bind
    pub addr: SocketAddr,
    /// Directory holding `tls.crt` and `tls.key`
    pub cert_dir: PathBuf,
}

/// Serve the admission webhooks over TLS until the handle shuts down
pub async fn start_server(
    config: ServerConfig,
    state: Arc<WebhookState>,
    handle: Handle,
) -> Result<()> {
    let tls_config = RustlsConfig::from_pem_file(
        config.cert_dir.join("tls.crt"),
        config.cert_dir.join("tls.key"),
    )
    .await
    .map_err(|e| {
        Error::invalid_config_field(
            "tlsCertDir",
            format!("failed to load TLS certificates from {}: {e}", config.cert_dir.display()),
        )
    })?;

    info!(
        addr = %config.addr,
        webhooks = ?state.mutators.keys().collect::<Vec<_>>(),
        "Starting admission webhook server"
    );

    axum_server::bind_rustls(config.addr, tls_config)
        .handle(handle)
        .serve(webhook_router(state).into_make_service())
        .await
        .map_err(|e| Error::internal_with_context("webhook", format!("server error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use metal_common::client::MockSeedClient;
    use tower::ServiceExt;

    fn state() -> Arc<WebhookState> {
        Arc::new(
            WebhookState::new(
                Arc::new(ControllerConfiguration::default()),
                Arc::new(ImageVector::default()),
                Arc::new(MockSeedClient::new()),
                default_mutators(),
            )
            .unwrap(),
        )
    }

    fn review_body(group: &str, kind: &str, object: serde_json::Value) -> String {
        serde_json::json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": {"group": group, "version": "v1", "kind": kind},
                "resource": {"group": group, "version": "v1", "resource": "secrets"},
                "name": "cloudprovider",
                "namespace": "shoot--prj--name",
                "operation": "CREATE",
                "userInfo": {"username": "gardenlet"},
                "object": object,
                "dryRun": false
            }
        })
        .to_string()
    }

    async fn post_review(path: &str, body: String) -> (StatusCode, serde_json::Value) {
        let response = webhook_router(state())
            .oneshot(
                Request::post(path)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    // =========================================================================
    // Registration
    // =========================================================================

    #[test]
    fn duplicate_webhooks_are_rejected() {
        let mut mutators = default_mutators();
        mutators.push(Arc::new(ShootMutator));
        let result = WebhookState::new(
            Arc::new(ControllerConfiguration::default()),
            Arc::new(ImageVector::default()),
            Arc::new(MockSeedClient::new()),
            mutators,
        );
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn all_webhooks_are_registered() {
        let state = state();
        let names: Vec<_> = state.mutators().map(|m| m.name()).collect();
        assert_eq!(
            names,
            vec!["cloudprovider", "controlplane", "controlplaneexposure", "seedprovider", "shoot"]
        );
    }

    // =========================================================================
    // HTTP
    // =========================================================================

    #[tokio::test]
    async fn secret_gets_finalizer_patch() {
        let object = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": "cloudprovider", "namespace": "shoot--prj--name"},
            "data": {"metalAPIKey": "c2VjcmV0"}
        });
        let (status, body) =
            post_review("/webhooks/cloudprovider", review_body("", "Secret", object)).await;

        assert_eq!(status, StatusCode::OK);
        let response = &body["response"];
        assert_eq!(response["allowed"], true);
        assert_eq!(response["patchType"], "JSONPatch");
    }

    #[tokio::test]
    async fn unregistered_kind_is_allowed_unchanged() {
        let object = serde_json::json!({
            "apiVersion": "apps/v1",
            "kind": "StatefulSet",
            "metadata": {"name": "x", "namespace": "shoot--prj--name"}
        });
        let (status, body) = post_review(
            "/webhooks/cloudprovider",
            review_body("apps", "StatefulSet", object),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"]["allowed"], true);
        assert!(body["response"].get("patch").is_none());
    }

    #[tokio::test]
    async fn unknown_webhook_is_not_found() {
        let object = serde_json::json!({"metadata": {"name": "cloudprovider"}});
        let (status, _) = post_review("/webhooks/nope", review_body("", "Secret", object)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn healthz_answers() {
        let response = webhook_router(state())
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
