//! Relay HTTP surface for the optional external deployment (spec §6
//! "Relay HTTP (optional external deployment)").

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use bridge_auth::{DeviceRegistry, InMemoryPairingStore, RateLimiter, TokenService};
use serde::{Deserialize, Serialize};

use crate::notifications::{NotificationService, NullSink, PushSink};

pub struct RelayHttpState {
    pub sessions: InMemoryPairingStore,
    pub devices: DeviceRegistry,
    pub tokens: TokenService,
    pub notifications: NotificationService,
    pub push_sink: Arc<dyn PushSink>,
    pub auth_limiter: RateLimiter,
    pub pairing_limiter: RateLimiter,
    pub notification_limiter: RateLimiter,
    pub general_limiter: RateLimiter,
}

impl RelayHttpState {
    pub fn new(access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            sessions: InMemoryPairingStore::new(),
            devices: DeviceRegistry::new(),
            tokens: TokenService::new(None, None, access_ttl_secs, refresh_ttl_secs),
            notifications: NotificationService::new(),
            push_sink: Arc::new(NullSink),
            auth_limiter: RateLimiter::new(10, Duration::from_secs(15 * 60)),
            pairing_limiter: RateLimiter::new(20, Duration::from_secs(3600)),
            notification_limiter: RateLimiter::new(30, Duration::from_secs(60)),
            general_limiter: RateLimiter::new(100, Duration::from_secs(60)),
        }
    }
}

fn rate_limit_headers(remaining: u32, limit: u32, retry_after: Option<u64>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
    if let Some(ra) = retry_after {
        headers.insert("Retry-After", HeaderValue::from(ra));
    }
    headers
}

fn error_json(code: &str, message: impl Into<String>) -> serde_json::Value {
    serde_json::json!({ "code": code, "message": message.into() })
}

// ---- pairing ----

#[derive(Deserialize)]
pub struct PairInitRequest {
    #[serde(rename = "workspaceId")]
    workspace_id: String,
    #[serde(rename = "workspaceName")]
    workspace_name: String,
    #[serde(rename = "localAddress")]
    local_address: Option<String>,
    #[serde(rename = "relayUrl")]
    relay_url: Option<String>,
    // Accepted for API-shape parity (spec §6); the store computes its own
    // digest/PIN rather than trusting a client-presented one.
    #[serde(rename = "tokenHash")]
    #[allow(dead_code)]
    token_hash: Option<String>,
    #[allow(dead_code)]
    pin: Option<String>,
}

#[derive(Serialize)]
pub struct PairInitResponse {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "expiresAt")]
    expires_at: i64,
}

pub async fn pair_init(
    State(state): State<Arc<RelayHttpState>>,
    Json(req): Json<PairInitRequest>,
) -> Response {
    let check = state.pairing_limiter.check(&req.workspace_id).await;
    let headers =
        rate_limit_headers(check.remaining, state.pairing_limiter.limit(), (!check.allowed).then_some(check.retry_after_secs));
    if !check.allowed {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            headers,
            Json(error_json("RATE_LIMITED", "too many pairing attempts")),
        )
            .into_response();
    }

    let pair = state
        .sessions
        .generate_pair(
            &req.workspace_id,
            &req.workspace_name,
            300,
            req.local_address,
            req.relay_url,
        )
        .await;

    (
        StatusCode::CREATED,
        headers,
        Json(PairInitResponse {
            session_id: pair.session_id,
            expires_at: pair.expires_at.timestamp_millis(),
        }),
    )
        .into_response()
}

#[derive(Deserialize)]
pub struct PairCompleteRequest {
    token: Option<String>,
    pin: Option<String>,
    #[serde(rename = "deviceName")]
    device_name: String,
    platform: String,
    #[serde(rename = "appVersion")]
    app_version: String,
}

#[derive(Serialize)]
pub struct WorkspaceInfo {
    id: String,
    name: String,
    #[serde(rename = "localAddress", skip_serializing_if = "Option::is_none")]
    local_address: Option<String>,
    #[serde(rename = "relayUrl", skip_serializing_if = "Option::is_none")]
    relay_url: Option<String>,
}

#[derive(Serialize)]
pub struct PairCompleteResponse {
    #[serde(rename = "deviceId")]
    device_id: String,
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
    workspace: WorkspaceInfo,
}

pub async fn pair_complete(
    State(state): State<Arc<RelayHttpState>>,
    Json(req): Json<PairCompleteRequest>,
) -> Response {
    let session = if let Some(token) = &req.token {
        let digest = bridge_auth::secret::digest_hex(token);
        state.sessions.find_by_digest(&digest).await
    } else if let Some(pin) = &req.pin {
        state.sessions.find_by_pin(pin).await
    } else {
        return (
            StatusCode::BAD_REQUEST,
            Json(error_json("INVALID_REQUEST", "token or pin required")),
        )
            .into_response();
    };

    let session = match session {
        Ok(s) => s,
        Err(e) => {
            let status = match e {
                bridge_auth::AuthError::AlreadyPaired => StatusCode::CONFLICT,
                bridge_auth::AuthError::SessionExpired => StatusCode::GONE,
                _ => StatusCode::NOT_FOUND,
            };
            return (status, Json(error_json(e.code(), e.to_string()))).into_response();
        }
    };

    if let Err(e) = state.sessions.complete(&session.session_id).await {
        return (
            StatusCode::CONFLICT,
            Json(error_json(e.code(), e.to_string())),
        )
            .into_response();
    }

    let device = state
        .devices
        .register(
            &session.workspace_id,
            &req.device_name,
            &req.platform,
            &req.app_version,
        )
        .await;
    let creds = state
        .tokens
        .issue_tokens(&device.device_id, &session.workspace_id, &session.workspace_name)
        .await;

    Json(PairCompleteResponse {
        device_id: device.device_id,
        access_token: creds.access,
        refresh_token: creds.refresh,
        workspace: WorkspaceInfo {
            id: session.workspace_id,
            name: session.workspace_name,
            local_address: session.local_address,
            relay_url: session.relay_url,
        },
    })
    .into_response()
}

// ---- auth ----

#[derive(Deserialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

pub async fn auth_refresh(
    State(state): State<Arc<RelayHttpState>>,
    Json(req): Json<RefreshRequest>,
) -> Response {
    let check = state.auth_limiter.check(&req.refresh_token).await;
    if !check.allowed {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            rate_limit_headers(0, state.auth_limiter.limit(), Some(check.retry_after_secs)),
            Json(error_json("RATE_LIMITED", "too many refresh attempts")),
        )
            .into_response();
    }
    match state.tokens.rotate(&req.refresh_token).await {
        Ok(creds) => Json(RefreshResponse {
            access_token: creds.access,
            refresh_token: creds.refresh,
        })
        .into_response(),
        Err(e) => (
            StatusCode::UNAUTHORIZED,
            Json(error_json(e.code(), e.to_string())),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
pub struct LogoutRequest {
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

pub async fn auth_logout(
    State(state): State<Arc<RelayHttpState>>,
    Json(req): Json<LogoutRequest>,
) -> Response {
    match state.tokens.revoke_refresh(&req.refresh_token).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (
            StatusCode::UNAUTHORIZED,
            Json(error_json(e.code(), e.to_string())),
        )
            .into_response(),
    }
}

#[derive(Serialize)]
pub struct MeResponse {
    #[serde(rename = "deviceId")]
    device_id: String,
    #[serde(rename = "workspaceId")]
    workspace_id: String,
    #[serde(rename = "workspaceName")]
    workspace_name: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers.get("authorization")?.to_str().ok()?.strip_prefix("Bearer ")
}

pub async fn auth_me(State(state): State<Arc<RelayHttpState>>, headers: HeaderMap) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(error_json("UNAUTHORIZED", "missing bearer token")),
        )
            .into_response();
    };
    match state.tokens.verify_access(token) {
        Ok(claims) => Json(MeResponse {
            device_id: claims.device_id,
            workspace_id: claims.workspace_id,
            workspace_name: claims.workspace_name,
        })
        .into_response(),
        Err(e) => (
            StatusCode::UNAUTHORIZED,
            Json(error_json(e.code(), e.to_string())),
        )
            .into_response(),
    }
}

// ---- devices ----

pub async fn list_devices(
    State(state): State<Arc<RelayHttpState>>,
    axum::extract::Query(q): axum::extract::Query<std::collections::HashMap<String, String>>,
) -> Response {
    let workspace_id = q.get("workspaceId").cloned().unwrap_or_default();
    Json(state.devices.list(&workspace_id).await).into_response()
}

pub async fn get_device(State(state): State<Arc<RelayHttpState>>, Path(id): Path<String>) -> Response {
    match state.devices.get(&id).await {
        Some(d) => Json(d).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(error_json("NOT_FOUND", "device not found")),
        )
            .into_response(),
    }
}

pub async fn delete_device(State(state): State<Arc<RelayHttpState>>, Path(id): Path<String>) -> Response {
    match state.devices.remove(&id).await {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(error_json("NOT_FOUND", "device not found")),
        )
            .into_response(),
    }
}

pub async fn ping_device(State(state): State<Arc<RelayHttpState>>, Path(id): Path<String>) -> Response {
    state.devices.touch(&id).await;
    StatusCode::NO_CONTENT.into_response()
}

// ---- notifications ----

#[derive(Deserialize)]
pub struct SendNotificationRequest {
    #[serde(rename = "workspaceId")]
    workspace_id: String,
    #[serde(rename = "deviceId")]
    device_id: String,
    title: String,
    body: String,
}

pub async fn send_notification(
    State(state): State<Arc<RelayHttpState>>,
    Json(req): Json<SendNotificationRequest>,
) -> Response {
    let check = state.notification_limiter.check(&req.device_id).await;
    if !check.allowed {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            rate_limit_headers(0, state.notification_limiter.limit(), Some(check.retry_after_secs)),
            Json(error_json("RATE_LIMITED", "too many notifications")),
        )
            .into_response();
    }
    match state
        .notifications
        .send(
            state.push_sink.as_ref(),
            &req.workspace_id,
            &req.device_id,
            &req.title,
            &req.body,
        )
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(error_json("INTERNAL_ERROR", e.to_string())),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
pub struct RegisterTokenRequest {
    #[serde(rename = "deviceId")]
    device_id: String,
    token: String,
}

pub async fn register_token(
    State(state): State<Arc<RelayHttpState>>,
    Json(req): Json<RegisterTokenRequest>,
) -> Response {
    state.notifications.register_token(&req.device_id, &req.token).await;
    StatusCode::NO_CONTENT.into_response()
}

pub async fn remove_token(State(state): State<Arc<RelayHttpState>>, Path(device_id): Path<String>) -> Response {
    state.notifications.remove_token(&device_id).await;
    StatusCode::NO_CONTENT.into_response()
}

pub async fn notification_history(
    State(state): State<Arc<RelayHttpState>>,
    Path(workspace_id): Path<String>,
) -> Response {
    Json(state.notifications.history(&workspace_id).await).into_response()
}

pub fn router(state: Arc<RelayHttpState>) -> Router {
    Router::new()
        .route("/api/v1/pair/init", post(pair_init))
        .route("/api/v1/pair/complete", post(pair_complete))
        .route("/api/v1/auth/refresh", post(auth_refresh))
        .route("/api/v1/auth/logout", post(auth_logout))
        .route("/api/v1/auth/me", get(auth_me))
        .route("/api/v1/devices", get(list_devices))
        .route("/api/v1/devices/online", get(list_devices))
        .route("/api/v1/devices/{id}", get(get_device).delete(delete_device))
        .route("/api/v1/devices/{id}/ping", post(ping_device))
        .route("/api/v1/notifications/send", post(send_notification))
        .route("/api/v1/notifications/token", post(register_token))
        .route("/api/v1/notifications/token/{deviceId}", delete(remove_token))
        .route(
            "/api/v1/notifications/history/{workspaceId}",
            get(notification_history),
        )
        .with_state(state)
}
