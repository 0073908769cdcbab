//! Route layer: request parsing and response shaping around [`ConnectionService`].
//!
//! Authorize and callback answer with `302 Found`; everything under `/api`
//! answers JSON shaped `{success, data | message | error}`.

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use hub_connect_oauth2::{
    CallbackParams, Connection, ConnectError, ConnectionService, Platform, TokenStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    service: ConnectionService,
}

impl AppState {
    pub fn new(service: ConnectionService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &ConnectionService {
        &self.service
    }
}

/// Build the full router, including tracing and CORS layers.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.service.config().frontend_url);

    Router::new()
        .route("/health", get(health))
        .route("/api/platforms", get(list_platforms))
        .route("/oauth/{platform}/authorize", get(authorize))
        .route("/oauth/{platform}/callback", get(callback))
        .route("/api/connections", get(list_connections))
        .route("/api/connections/{platform}", delete(disconnect))
        .route("/api/connections/{platform}/refresh", post(refresh))
        .route(
            "/api/connections/{platform}/content/{content_type}",
            get(fetch_content),
        )
        .fallback(not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    let origin = url::Url::parse(frontend_url)
        .ok()
        .map(|url| url.origin().ascii_serialization())
        .and_then(|origin| HeaderValue::from_str(&origin).ok());

    match origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE]),
        None => {
            warn!(frontend_url, "Frontend URL has no usable origin, CORS disabled");
            CorsLayer::new()
        }
    }
}

/// JSON error response carrying the status class of a [`ConnectError`].
#[derive(Debug)]
pub struct ApiError(ConnectError);

impl From<ConnectError> for ApiError {
    fn from(err: ConnectError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(status = status.as_u16(), "Request failed: {}", self.0);
        } else {
            debug!(status = status.as_u16(), "Request rejected: {}", self.0);
        }

        let body = json!({
            "success": false,
            "error": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeQuery {
    pub user_id: Option<String>,
    pub shop: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserBody {
    pub user_id: Option<String>,
}

/// A connection as shown to the dashboard. Token material stays server-side.
#[derive(Debug, Serialize)]
pub struct ConnectionSummary {
    pub id: Uuid,
    pub platform: Platform,
    pub platform_user_id: Option<String>,
    pub platform_username: Option<String>,
    pub platform_email: Option<String>,
    pub display_name: Option<String>,
    pub token_status: TokenStatus,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
    pub metadata: Value,
    pub connected_at: DateTime<Utc>,
    pub last_refresh_at: Option<DateTime<Utc>>,
}

impl From<Connection> for ConnectionSummary {
    fn from(connection: Connection) -> Self {
        Self {
            id: connection.id,
            platform: connection.platform,
            platform_user_id: connection.platform_user_id,
            platform_username: connection.platform_username,
            platform_email: connection.platform_email,
            display_name: connection.display_name,
            token_status: connection.token_status,
            token_expires_at: connection.token_expires_at,
            scopes: connection.scopes,
            metadata: connection.metadata,
            connected_at: connection.connected_at,
            last_refresh_at: connection.last_refresh_at,
        }
    }
}

fn parse_platform(raw: &str) -> Result<Platform, ConnectError> {
    raw.parse().map_err(ConnectError::from)
}

fn require_user(user_id: Option<String>) -> Result<String, ConnectError> {
    user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ConnectError::MissingParameter("user_id".to_string()))
}

fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "message": "Creator hub connection service is running",
    }))
}

async fn list_platforms(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Value>> {
    let connected: HashSet<Platform> = match query.user_id.filter(|id| !id.is_empty()) {
        Some(user_id) => state
            .service
            .list_connections(&user_id)
            .await?
            .into_iter()
            .map(|connection| connection.platform)
            .collect(),
        None => HashSet::new(),
    };

    let config = state.service.config();
    let platforms: Vec<Value> = Platform::ALL
        .into_iter()
        .map(|platform| {
            let status = if config.has_credentials(platform) {
                "available"
            } else {
                "unconfigured"
            };
            json!({
                "id": platform.as_str(),
                "name": platform.display_name(),
                "status": status,
                "connected": connected.contains(&platform),
            })
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "data": { "platforms": platforms },
    })))
}

async fn authorize(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Query(query): Query<AuthorizeQuery>,
) -> ApiResult<Response> {
    let platform = parse_platform(&platform)?;
    let user_id = require_user(query.user_id)?;

    let redirect = state
        .service
        .authorize(platform, &user_id, query.shop.as_deref())
        .await?;
    Ok(found(redirect.url))
}

async fn callback(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Query(params): Query<CallbackParams>,
) -> ApiResult<Response> {
    let Ok(platform) = parse_platform(&platform) else {
        warn!(platform = %platform, "Callback for unknown platform");
        return Ok(found(state.service.config().error_redirect("oauth_failed")?));
    };
    let location = state.service.handle_callback(platform, params).await?;
    Ok(found(location))
}

async fn list_connections(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Value>> {
    let user_id = require_user(query.user_id)?;
    let connections: Vec<ConnectionSummary> = state
        .service
        .list_connections(&user_id)
        .await?
        .into_iter()
        .map(ConnectionSummary::from)
        .collect();

    Ok(Json(json!({
        "success": true,
        "data": connections,
    })))
}

async fn disconnect(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    body: Result<Json<UserBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let platform = parse_platform(&platform)?;
    let user_id = require_user(body.ok().and_then(|Json(body)| body.user_id))?;

    state.service.disconnect(platform, &user_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("{} disconnected", platform.display_name()),
    })))
}

async fn refresh(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    body: Result<Json<UserBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let platform = parse_platform(&platform)?;
    let user_id = require_user(body.ok().and_then(|Json(body)| body.user_id))?;

    let connection = state.service.refresh(platform, &user_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("{} token refreshed", platform.display_name()),
        "data": ConnectionSummary::from(connection),
    })))
}

async fn fetch_content(
    State(state): State<AppState>,
    Path((platform, content_type)): Path<(String, String)>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Value>> {
    let platform = parse_platform(&platform)?;
    let user_id = require_user(query.user_id)?;

    let content = state
        .service
        .fetch_content(platform, &user_id, &content_type)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": content,
    })))
}

async fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "message": "Route not found",
        })),
    )
}
