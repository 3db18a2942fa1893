// Path: crates/gateway/src/routes.rs

//! Route handlers. Every error leaves as the federation envelope
//! `{error, message, details?, timestamp}` with the status suggested by the
//! error kind; ciphertext leaves whole or not at all.

use crate::contract::{StoreRequest, VaultApi};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytecave_api::transport::ReplicaMeta;
use bytecave_replication::IncomingReplica;
use bytecave_types::auth::AuthorizationRecord;
use bytecave_types::error::{ErrorCode, VaultError};
use bytecave_types::{now_millis, Cid};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// The wire error wrapper.
struct AppError(VaultError);

/// The federation's error envelope.
fn error_body(error: &VaultError) -> serde_json::Value {
    let mut body = serde_json::json!({
        "error": error.code(),
        "message": error.to_string(),
        "timestamp": now_millis(),
    });
    if let Some(sub) = error.sub_reason() {
        body["details"] = serde_json::json!({ "reason": sub });
    }
    body
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error = self.0;
        let status =
            StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(target: "gateway", event = "request_failed", code = error.code(), error = %error);
        }
        (status, Json(error_body(&error))).into_response()
    }
}

impl From<VaultError> for AppError {
    fn from(e: VaultError) -> Self {
        AppError(e)
    }
}

fn parse_cid(raw: &str) -> Result<Cid, AppError> {
    raw.parse::<Cid>()
        .map_err(|e| AppError(VaultError::InvalidRequest(e.to_string())))
}

type Api = Arc<dyn VaultApi>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreBody {
    /// Ciphertext, base64.
    data: String,
    #[serde(default = "default_mime")]
    mime_type: String,
    authorization: AuthorizationRecord,
}

fn default_mime() -> String {
    "application/octet-stream".to_string()
}

async fn store_handler(
    State(api): State<Api>,
    Json(body): Json<StoreBody>,
) -> Result<impl IntoResponse, AppError> {
    let ciphertext = BASE64
        .decode(&body.data)
        .map_err(|e| AppError(VaultError::InvalidRequest(format!("bad base64 data: {e}"))))?;
    let receipt = api
        .store(StoreRequest {
            ciphertext,
            mime_type: body.mime_type,
            authorization: body.authorization,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn blob_handler(
    State(api): State<Api>,
    Path(cid): Path<String>,
) -> Result<Response, AppError> {
    let cid = parse_cid(&cid)?;
    let blob = api.fetch(&cid).await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, blob.mime_type)],
        blob.bytes,
    )
        .into_response())
}

async fn blobs_handler(State(api): State<Api>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(api.list().await?))
}

async fn health_handler(State(api): State<Api>) -> impl IntoResponse {
    Json(api.health().await)
}

async fn shards_handler(State(api): State<Api>) -> impl IntoResponse {
    Json(api.shard_report().await)
}

async fn gc_status_handler(State(api): State<Api>) -> impl IntoResponse {
    Json(api.gc_status().await)
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GcQuery {
    #[serde(default)]
    dry_run: bool,
}

async fn gc_trigger_handler(
    State(api): State<Api>,
    Query(query): Query<GcQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(api.run_gc(query.dry_run).await?))
}

async fn pin_handler(
    State(api): State<Api>,
    Path(cid): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let cid = parse_cid(&cid)?;
    api.pin(&cid).await?;
    Ok(Json(serde_json::json!({ "pinned": cid })))
}

async fn unpin_handler(
    State(api): State<Api>,
    Path(cid): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let cid = parse_cid(&cid)?;
    api.unpin(&cid).await?;
    Ok(Json(serde_json::json!({ "unpinned": cid })))
}

async fn pin_list_handler(State(api): State<Api>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(api.list_pinned().await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplicateBody {
    cid: String,
    /// Ciphertext, base64.
    data: String,
    #[serde(default = "default_mime")]
    mime_type: String,
    #[serde(flatten)]
    meta: ReplicaMeta,
    peer_public_key: String,
}

async fn replicate_handler(
    State(api): State<Api>,
    Json(body): Json<ReplicateBody>,
) -> Result<impl IntoResponse, AppError> {
    let cid = parse_cid(&body.cid)?;
    let bytes = BASE64
        .decode(&body.data)
        .map_err(|e| AppError(VaultError::InvalidRequest(format!("bad base64 data: {e}"))))?;
    let ack = api
        .replicate_in(IncomingReplica {
            cid,
            bytes,
            mime_type: body.mime_type,
            meta: body.meta,
            peer_public_key: body.peer_public_key,
        })
        .await?;
    Ok(Json(ack))
}

/// Builds the vault's public router.
pub fn router(api: Api, max_body_bytes: usize, request_timeout: Duration) -> Router {
    Router::new()
        .route("/store", post(store_handler))
        .route("/blob/:cid", get(blob_handler))
        .route("/blobs", get(blobs_handler))
        .route("/health", get(health_handler))
        .route("/shards", get(shards_handler))
        .route("/gc/status", get(gc_status_handler))
        .route("/admin/gc", post(gc_trigger_handler))
        .route("/pin/list", get(pin_list_handler))
        .route("/pin/:cid", post(pin_handler).delete(unpin_handler))
        .route("/replicate", post(replicate_handler))
        .layer(
            ServiceBuilder::new()
                .layer(RequestBodyLimitLayer::new(max_body_bytes))
                .layer(CatchPanicLayer::new())
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(api)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytecave_types::error::AuthError;

    #[test]
    fn envelope_carries_code_message_and_timestamp() {
        let body = error_body(&VaultError::StorageFull);
        assert_eq!(body["error"], "STORAGE_FULL");
        assert!(body["message"].as_str().unwrap().contains("Storage full"));
        assert!(body["timestamp"].as_i64().unwrap() > 0);
        assert!(body.get("details").is_none());
    }

    #[test]
    fn auth_sub_reason_lands_in_details() {
        let error: VaultError = AuthError::NonceReplay.into();
        let body = error_body(&error);
        assert_eq!(body["error"], "FORBIDDEN");
        assert_eq!(body["details"]["reason"], "nonce_replay");
    }

    #[test]
    fn malformed_cids_are_invalid_requests() {
        let err = parse_cid("not-a-cid").unwrap_err();
        assert_eq!(err.0.code(), "INVALID_REQUEST");
        assert_eq!(err.0.http_status(), 400);

        let upper = "2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824";
        assert!(parse_cid(upper).is_err());

        let lower = upper.to_ascii_lowercase();
        assert!(parse_cid(&lower).is_ok());
    }
}
